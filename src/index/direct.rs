use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::types::Node;
use crate::catalog::CatalogSource;
use crate::errors::IndexError;
use crate::index::association::{OwnerRef, TargetAssociation, TargetKind};
use crate::index::bucket::AssociationBucket;
use crate::index::context::RunContext;
use crate::index::schema::{ApplicationInfo, SchemaInfo};
use crate::index::{CurrentFilter, IndexOptions, RequiredAssociations};

/// Associations a node holds on its own: one per distinct value of each
/// indexed attribute, and one per permission target when the schema indexes
/// permissions.
pub struct DirectAssociationBuilder<'a, K: ?Sized> {
    catalog: &'a K,
    application: Arc<ApplicationInfo>,
    schema: SchemaInfo,
}

impl<'a, K> DirectAssociationBuilder<'a, K>
where
    K: CatalogSource + ?Sized,
{
    pub fn new(catalog: &'a K, application: Arc<ApplicationInfo>, schema: SchemaInfo) -> Self {
        Self {
            catalog,
            application,
            schema,
        }
    }

    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }

    pub fn build(&self, ctx: &mut RunContext, node: &Node) -> Vec<TargetAssociation> {
        let app = self.application.name.as_str();
        let path = node.displayable_name();
        let mut bucket = AssociationBucket::ownerless();

        for att in &self.schema.attributes {
            for value in node.values(&att.name) {
                let name = ctx.schema.display_name(self.catalog, app, att, value);
                let kind = TargetKind::Attribute(att.name.clone());
                if bucket.get(Some(app), &kind, &name).is_some() {
                    continue;
                }

                let mut assoc = TargetAssociation::new(Some(app), kind, &name);
                assoc.hierarchy = Some(path.to_string());
                if ctx.options.index_classifications {
                    if let Some(object_type) = att.schema_object_type.as_deref() {
                        if let Some(referenced) = self.catalog.find_node(app, object_type, value) {
                            assoc.classifications = referenced.classifications.clone();
                        }
                    }
                }
                bucket.add(assoc);
            }
        }

        if self.schema.index_permissions {
            for perm in &node.permissions {
                // several permissions on one target keep the first rights seen
                let mut assoc = TargetAssociation::new(Some(app), TargetKind::Permission, &perm.target);
                assoc.rights = perm.rights.clone();
                assoc.hierarchy = Some(path.to_string());
                bucket.add(assoc);
            }
        }

        bucket.into_associations()
    }
}

#[async_trait]
impl<'a, K> RequiredAssociations for DirectAssociationBuilder<'a, K>
where
    K: CatalogSource + ?Sized,
{
    type Owner = Node;

    fn owner_ref(&self, node: &Node) -> OwnerRef {
        OwnerRef::node(&node.id)
    }

    /// Collected unstructured targets are never part of the direct set.
    fn current_filter(&self, _options: &IndexOptions) -> CurrentFilter {
        CurrentFilter {
            flattened: Some(false),
            include_unstructured: false,
        }
    }

    async fn required(
        &self,
        ctx: &mut RunContext,
        node: &Node,
    ) -> Result<Vec<TargetAssociation>, IndexError> {
        Ok(self.build(ctx, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::compile_catalog;
    use crate::catalog::parser::parse_kdl_document;
    use crate::catalog::{Catalog, ObjectRepository};

    const CATALOG: &str = r#"
application "sap" {
    schema "role" {
        identity-attribute "name"
        display-attribute "description"
        index-permissions
        attribute "tcode" indexed=#true
        attribute "profile" indexed=#true object-type="profile"
        attribute "owner"
    }
    schema "profile" {
        identity-attribute "name"
        display-attribute "text"
    }
}
node "sap" "profile" "P_ALL" display="All access" {
    classifications {
        - "Privileged"
    }
}
node "sap" "role" "Z_FI" display="Finance" {
    attribute "tcode" {
        - "FB01"
        - "FB02"
        - "FB01"
    }
    attribute "profile" "P_ALL"
    attribute "owner" "alice"
    permission "Ledger" rights="read"
    permission "Ledger" rights="write"
    permission "Payments"
}
"#;

    fn setup() -> (Catalog, RunContext) {
        let catalog = compile_catalog(vec![parse_kdl_document(CATALOG).unwrap()]).unwrap();
        let options = IndexOptions {
            index_entitlements: true,
            index_classifications: true,
            ..Default::default()
        };
        (catalog, RunContext::new(options))
    }

    #[test]
    fn test_build_direct_associations() {
        let (catalog, mut ctx) = setup();
        let app = ctx.schema.application(&catalog, "sap");
        let schema = app.schema_info("role").unwrap().clone();
        let builder = DirectAssociationBuilder::new(&catalog, app, schema);
        let node = catalog.find_node("sap", "role", "Z_FI").unwrap();

        let required = builder.build(&mut ctx, node);

        let tcodes: Vec<&str> = required
            .iter()
            .filter(|a| a.kind == TargetKind::Attribute("tcode".into()))
            .map(|a| a.target_name.as_str())
            .collect();
        assert_eq!(tcodes, vec!["FB01", "FB02"]);

        let profile = required
            .iter()
            .find(|a| a.kind == TargetKind::Attribute("profile".into()))
            .unwrap();
        assert_eq!(profile.target_name, "All access");
        assert_eq!(profile.classifications, vec!["Privileged"]);

        let ledger = required
            .iter()
            .find(|a| a.target_name == "Ledger")
            .unwrap();
        assert_eq!(ledger.rights.as_deref(), Some("read"));

        assert!(required.iter().all(|a| a.hierarchy.as_deref() == Some("Finance")));
        assert!(required.iter().all(|a| !a.flattened));
        assert!(!required.iter().any(|a| a.target_name == "alice"));
        assert_eq!(required.len(), 5);
    }

    #[test]
    fn test_permissions_skipped_when_not_indexed() {
        let (catalog, mut ctx) = setup();
        let app = ctx.schema.application(&catalog, "sap");
        let mut schema = app.schema_info("role").unwrap().clone();
        schema.index_permissions = false;
        let builder = DirectAssociationBuilder::new(&catalog, app, schema);
        let node = catalog.find_node("sap", "role", "Z_FI").unwrap();

        let required = builder.build(&mut ctx, node);
        assert!(required.iter().all(|a| a.kind != TargetKind::Permission));
    }

    #[test]
    fn test_current_filter_is_direct_only() {
        let (catalog, mut ctx) = setup();
        let app = ctx.schema.application(&catalog, "sap");
        let schema = app.schema_info("role").unwrap().clone();
        let builder = DirectAssociationBuilder::new(&catalog, app, schema);
        let filter = builder.current_filter(&IndexOptions {
            index_unstructured_targets: true,
            ..Default::default()
        });
        assert_eq!(filter.flattened, Some(false));
        assert!(!filter.include_unstructured);
    }
}
