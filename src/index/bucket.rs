use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::errors::IndexError;
use crate::index::association::{AssociationKey, OwnerRef, TargetAssociation, TargetKind};

/// Working set of associations for one owner, unique by
/// (application, kind, target name).
///
/// Built either from the owner's persisted "current" associations, in which
/// case repeated keys are set aside as duplicates to purge, or ownerless to
/// collect a freshly computed "required" set.
#[derive(Debug, Default)]
pub struct AssociationBucket {
    owner: Option<OwnerRef>,
    entries: BTreeMap<AssociationKey, TargetAssociation>,
    duplicates: Vec<TargetAssociation>,
}

/// Outcome of reconciling a required set against a bucket of current records.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub owner: Option<OwnerRef>,
    /// New records, owner already assigned
    pub created: Vec<TargetAssociation>,
    /// Persisted records whose content changed, already carrying the new content
    pub updated: Vec<TargetAssociation>,
    pub retained: usize,
    /// Stale records no longer required
    pub removed: Vec<TargetAssociation>,
    /// Persisted records that repeated the key of another current record
    pub duplicates: Vec<TargetAssociation>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.duplicates.is_empty()
    }
}

impl AssociationBucket {
    /// Bucket for collecting a required set before it has an owner.
    pub fn ownerless() -> Self {
        Self::default()
    }

    pub fn new(owner: Option<OwnerRef>, current: Vec<TargetAssociation>) -> Self {
        let mut bucket = Self {
            owner,
            ..Default::default()
        };
        for assoc in current {
            let key = assoc.key();
            if bucket.entries.contains_key(&key) {
                bucket.duplicates.push(assoc);
            } else {
                bucket.entries.insert(key, assoc);
            }
        }
        bucket
    }

    pub fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    pub fn get(
        &self,
        application: Option<&str>,
        kind: &TargetKind,
        name: &str,
    ) -> Option<&TargetAssociation> {
        self.entries
            .get(&AssociationKey::new(application, kind, name))
    }

    /// Entry with the same key as `assoc`, if any.
    pub fn get_matching(&self, assoc: &TargetAssociation) -> Option<&TargetAssociation> {
        self.entries.get(&assoc.key())
    }

    pub fn contains(&self, assoc: &TargetAssociation) -> bool {
        self.entries.contains_key(&assoc.key())
    }

    /// Add unless an entry with the same key exists; the first one wins.
    /// Returns true when the association was added.
    pub fn add(&mut self, assoc: TargetAssociation) -> bool {
        let key = assoc.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, assoc);
        true
    }

    pub fn remove(&mut self, assoc: &TargetAssociation) -> Option<TargetAssociation> {
        self.entries.remove(&assoc.key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duplicates(&self) -> &[TargetAssociation] {
        &self.duplicates
    }

    pub fn associations(&self) -> impl Iterator<Item = &TargetAssociation> {
        self.entries.values()
    }

    pub fn into_associations(self) -> Vec<TargetAssociation> {
        self.entries.into_values().collect()
    }

    /// Diff `required` against the current entries. Each required record is
    /// created, retained or updated; whatever current entries remain
    /// afterwards are stale and removed. Only rights, classifications and the
    /// flattened flag count as a change.
    ///
    /// With `keep_classifications` off, required records lose their
    /// classifications so previously stored tags get cleared.
    pub fn reconcile(
        mut self,
        required: Vec<TargetAssociation>,
        keep_classifications: bool,
    ) -> Result<Reconciliation, IndexError> {
        let mut result = Reconciliation {
            owner: self.owner.clone(),
            ..Default::default()
        };

        for mut req in required {
            if !keep_classifications {
                req.classifications.clear();
            }

            match self.entries.remove(&req.key()) {
                Some(existing) => {
                    if has_changed(&req, &existing) {
                        debug!(association = %existing.describe(), "Updating target association");
                        let mut updated = existing;
                        updated.rights = req.rights;
                        updated.classifications = req.classifications;
                        updated.flattened = req.flattened;
                        updated.hierarchy = req.hierarchy;
                        result.updated.push(updated);
                    } else {
                        debug!(association = %existing.describe(), "Retaining target association");
                        result.retained += 1;
                    }
                }
                None => {
                    debug!(association = %req.describe(), "Creating target association");
                    match &self.owner {
                        Some(owner) => req.owner = Some(owner.clone()),
                        None if req.owner.is_none() => {
                            return Err(IndexError::Configuration(
                                "no owner specified for association bucket".into(),
                            ));
                        }
                        None => {}
                    }
                    result.created.push(req);
                }
            }
        }

        for stale in self.entries.into_values() {
            debug!(association = %stale.describe(), "Removing target association");
            result.removed.push(stale);
        }
        for dup in self.duplicates.drain(..) {
            debug!(association = %dup.describe(), "Removing duplicate target association");
            result.duplicates.push(dup);
        }

        Ok(result)
    }
}

fn has_changed(required: &TargetAssociation, existing: &TargetAssociation) -> bool {
    let ours: BTreeSet<&str> = required.classifications.iter().map(String::as_str).collect();
    let theirs: BTreeSet<&str> = existing.classifications.iter().map(String::as_str).collect();
    ours != theirs || required.rights != existing.rights || required.flattened != existing.flattened
}
