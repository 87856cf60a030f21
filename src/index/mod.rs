//! Computes and persists, for every node and role, the set of targets it
//! grants directly or through hierarchy and role composition.

pub mod association;
pub mod bucket;
pub mod context;
pub mod direct;
pub mod flatten;
pub mod orchestrator;
pub mod persist;
pub mod role;
pub mod schema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::IndexError;
use association::{OwnerRef, TargetAssociation};
use context::RunContext;

pub use context::IndexStats;
pub use orchestrator::{IndexResult, Indexer};

/// Switches controlling what a run computes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub index_entitlements: bool,
    /// Copy the associations of nodes a role grants
    pub index_role_targets: bool,
    /// Record the literal entitlement values a role grants
    pub index_role_entitlements: bool,
    pub index_role_permissions: bool,
    pub index_unstructured_targets: bool,
    pub index_classifications: bool,
    pub promote_classifications: bool,
    pub full_reset: bool,
    pub refresh_fulltext: bool,
}

impl IndexOptions {
    pub fn indexes_roles(&self) -> bool {
        self.index_role_targets || self.index_role_entitlements || self.index_role_permissions
    }
}

/// Optional restriction of the corpus to named applications and roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub applications: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
}

/// Cooperative cancellation flag, checked between objects.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which persisted associations of an owner form its "current" set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentFilter {
    /// Restrict to flattened (true) or direct (false) records
    pub flattened: Option<bool>,
    pub include_unstructured: bool,
}

impl CurrentFilter {
    pub fn all(include_unstructured: bool) -> Self {
        Self {
            flattened: None,
            include_unstructured,
        }
    }
}

/// Produces the associations an owner is required to have, for the two owner
/// kinds that compute them directly: nodes from their own attributes and
/// permissions, roles from their expanded grants.
#[async_trait]
pub trait RequiredAssociations {
    type Owner: Sync + ?Sized;

    fn owner_ref(&self, owner: &Self::Owner) -> OwnerRef;

    /// Subset of persisted records the required set is reconciled against.
    fn current_filter(&self, options: &IndexOptions) -> CurrentFilter;

    async fn required(
        &self,
        ctx: &mut RunContext,
        owner: &Self::Owner,
    ) -> Result<Vec<TargetAssociation>, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_indexes_roles() {
        let mut options = IndexOptions::default();
        assert!(!options.indexes_roles());
        options.index_role_permissions = true;
        assert!(options.indexes_roles());
    }
}
