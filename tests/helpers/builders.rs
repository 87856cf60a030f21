use access_index::index::association::{OwnerRef, TargetAssociation, TargetKind};
use access_index::storage;
use sea_orm::DatabaseConnection;

/// Builder for seeding persisted associations, e.g. records gathered by a
/// collector or left behind by an earlier version.
pub struct AssociationBuilder {
    owner: OwnerRef,
    assoc: TargetAssociation,
}

impl AssociationBuilder {
    pub fn permission(owner: OwnerRef, application: &str, target: &str) -> Self {
        Self {
            owner,
            assoc: TargetAssociation::new(Some(application), TargetKind::Permission, target),
        }
    }

    pub fn unstructured(owner: OwnerRef, application: &str, target: &str) -> Self {
        Self {
            owner,
            assoc: TargetAssociation::new(Some(application), TargetKind::Unstructured, target),
        }
    }

    pub fn with_rights(mut self, rights: &str) -> Self {
        self.assoc.rights = Some(rights.to_string());
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: &str) -> Self {
        self.assoc.hierarchy = Some(hierarchy.to_string());
        self
    }

    pub fn flattened(mut self) -> Self {
        self.assoc.flattened = true;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> i64 {
        let mut assoc = self.assoc;
        assoc.owner = Some(self.owner);
        storage::insert_association(db, &assoc)
            .await
            .expect("Failed to seed association")
    }
}
