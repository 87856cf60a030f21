use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::association::TargetAssociation;
use crate::index::bucket::Reconciliation;
use crate::index::schema::SchemaIndex;
use crate::index::IndexOptions;

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub roles_examined: u64,
    pub roles_indexed: u64,
    pub entitlements_examined: u64,
    /// One per node commit, direct and flattened passes alike
    pub entitlements_indexed: u64,
    pub targets_added: u64,
    pub targets_retained: u64,
    pub targets_updated: u64,
    pub targets_removed: u64,
    pub targets_reset: u64,
    pub duplicates_removed: u64,
    pub effective_classifications_reset: u64,
    /// Referenced nodes, applications or roles not found in the catalog
    pub missing_objects: u64,
}

impl IndexStats {
    pub fn objects_examined(&self) -> u64 {
        self.roles_examined + self.entitlements_examined
    }

    pub fn objects_indexed(&self) -> u64 {
        self.roles_indexed + self.entitlements_indexed
    }

    pub fn record(&mut self, rec: &Reconciliation) {
        self.targets_added += rec.created.len() as u64;
        self.targets_retained += rec.retained as u64;
        self.targets_updated += rec.updated.len() as u64;
        self.targets_removed += rec.removed.len() as u64;
        self.duplicates_removed += rec.duplicates.len() as u64;
    }
}

/// (application, account attribute, value)
pub type ValueKey = (String, String, String);

/// State shared by every object of one run. Dropped when the run ends.
#[derive(Debug)]
pub struct RunContext {
    pub options: IndexOptions,
    pub schema: SchemaIndex,
    /// Persisted associations of the node a role grant value resolved to
    value_associations: HashMap<ValueKey, Vec<TargetAssociation>>,
    pub stats: IndexStats,
}

impl RunContext {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            schema: SchemaIndex::new(),
            value_associations: HashMap::new(),
            stats: IndexStats::default(),
        }
    }

    pub fn cached_associations(
        &self,
        application: &str,
        attribute: &str,
        value: &str,
    ) -> Option<&Vec<TargetAssociation>> {
        self.value_associations.get(&(
            application.to_string(),
            attribute.to_string(),
            value.to_string(),
        ))
    }

    pub fn cache_associations(
        &mut self,
        application: &str,
        attribute: &str,
        value: &str,
        associations: Vec<TargetAssociation>,
    ) {
        self.value_associations.insert(
            (
                application.to_string(),
                attribute.to_string(),
                value.to_string(),
            ),
            associations,
        );
    }
}
