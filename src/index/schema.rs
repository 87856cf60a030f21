use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::types::{Application, HierarchyAttribute, NodeKey, Schema, SCHEMA_ACCOUNT};
use crate::catalog::{ObjectRepository, SchemaCatalog};

/// An attribute whose values either produce associations or reference
/// nodes of another schema.
#[derive(Debug, Clone)]
pub struct IndexedAttribute {
    pub name: String,
    /// Object type of the schema the values reference, if any
    pub schema_object_type: Option<String>,
    /// Referenced schema resolves display names
    pub has_display_name: bool,
    /// Referenced schema produces associations of its own
    pub has_associations: bool,
}

impl IndexedAttribute {
    fn resolve(app: &Application, name: &str, object_type: Option<&str>) -> Self {
        let other = object_type.and_then(|t| app.schema(t));
        Self {
            name: name.to_string(),
            schema_object_type: other.map(|s| s.object_type.clone()),
            has_display_name: other.is_some_and(|s| s.has_display_name()),
            has_associations: other.is_some_and(schema_has_associations),
        }
    }
}

/// What indexing needs to know about one non-account schema.
#[derive(Debug, Clone)]
pub struct SchemaInfo {
    pub object_type: String,
    pub hierarchy: Option<HierarchyAttribute>,
    pub index_permissions: bool,
    pub has_display_name: bool,
    /// Indexed attributes, hierarchy attribute excluded
    pub attributes: Vec<IndexedAttribute>,
}

impl SchemaInfo {
    pub fn has_associations(&self) -> bool {
        !self.attributes.is_empty() || self.index_permissions
    }
}

fn schema_has_associations(schema: &Schema) -> bool {
    schema.has_indexed_attribute() || schema.index_permissions
}

#[derive(Debug, Clone)]
pub struct ApplicationInfo {
    pub name: String,
    /// False for placeholder entries of applications missing from the catalog
    pub known: bool,
    schemas: HashMap<String, SchemaInfo>,
    /// Account attributes referencing a schema with display names or associations
    account_attributes: HashMap<String, IndexedAttribute>,
}

impl ApplicationInfo {
    /// Indexed attributes and the hierarchy of each schema are read through
    /// the catalog; `app` supplies the schema list and account attributes.
    pub fn new<K>(catalog: &K, app: &Application) -> Self
    where
        K: SchemaCatalog + ?Sized,
    {
        let mut schemas = HashMap::new();
        let mut account_attributes = HashMap::new();

        for schema in &app.schemas {
            if schema.object_type == SCHEMA_ACCOUNT {
                for att in &schema.attributes {
                    let indexed = IndexedAttribute::resolve(app, &att.name, att.object_type.as_deref());
                    if indexed.has_display_name || indexed.has_associations {
                        account_attributes.insert(att.name.clone(), indexed);
                    }
                }
            } else {
                let attributes = catalog
                    .indexed_attributes_for(&app.name, &schema.object_type)
                    .iter()
                    .map(|att| IndexedAttribute::resolve(app, &att.name, att.object_type.as_deref()))
                    .collect();
                schemas.insert(
                    schema.object_type.clone(),
                    SchemaInfo {
                        object_type: schema.object_type.clone(),
                        hierarchy: catalog.hierarchy_attribute_for(&app.name, &schema.object_type),
                        index_permissions: schema.index_permissions,
                        has_display_name: schema.has_display_name(),
                        attributes,
                    },
                );
            }
        }

        Self {
            name: app.name.clone(),
            known: true,
            schemas,
            account_attributes,
        }
    }

    /// Entry for an application the catalog doesn't know; it has nothing to index.
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            known: false,
            schemas: HashMap::new(),
            account_attributes: HashMap::new(),
        }
    }

    pub fn has_interesting_account_attributes(&self) -> bool {
        !self.account_attributes.is_empty()
    }

    pub fn account_attribute(&self, name: &str) -> Option<&IndexedAttribute> {
        self.account_attributes.get(name)
    }

    pub fn schema_info(&self, object_type: &str) -> Option<&SchemaInfo> {
        self.schemas.get(object_type)
    }
}

/// Per-run cache of application metadata and value display names.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    applications: HashMap<String, Arc<ApplicationInfo>>,
    display_names: HashMap<NodeKey, String>,
}

impl SchemaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application<K>(&mut self, catalog: &K, name: &str) -> Arc<ApplicationInfo>
    where
        K: SchemaCatalog + ?Sized,
    {
        if let Some(info) = self.applications.get(name) {
            return info.clone();
        }
        let info = match catalog.application(name) {
            Some(app) => ApplicationInfo::new(catalog, app),
            None => {
                warn!(application = name, "Application not found in catalog, nothing to index");
                ApplicationInfo::placeholder(name)
            }
        };
        let info = Arc::new(info);
        self.applications.insert(name.to_string(), info.clone());
        info
    }

    /// Name to record for `value` of `att`: the referenced node's display
    /// name when its schema has one, otherwise the raw value.
    pub fn display_name<K>(
        &mut self,
        catalog: &K,
        application: &str,
        att: &IndexedAttribute,
        value: &str,
    ) -> String
    where
        K: ObjectRepository + ?Sized,
    {
        let Some(object_type) = att.schema_object_type.as_deref() else {
            return value.to_string();
        };
        if !att.has_display_name {
            return value.to_string();
        }

        let key = NodeKey::new(application, object_type, value);
        if let Some(name) = self.display_names.get(&key) {
            return name.clone();
        }

        let name = match catalog
            .find_node(application, object_type, value)
            .and_then(|n| n.display_name.clone())
        {
            Some(name) => name,
            None => {
                info!(application, value, "No display name, using raw value");
                value.to_string()
            }
        };
        self.display_names.insert(key, name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::compile_catalog;
    use crate::catalog::parser::parse_kdl_document;
    use crate::catalog::types::AttributeDefinition;
    use crate::catalog::Catalog;

    fn catalog() -> Catalog {
        let kdl = r#"
application "ad" {
    schema "account" {
        attribute "memberOf" object-type="group"
        attribute "department"
        attribute "manager" object-type="person"
    }
    schema "group" {
        identity-attribute "dn"
        display-attribute "cn"
        hierarchy "memberOf"
        attribute "memberOf" indexed=#true object-type="group"
        index-permissions
    }
    schema "person" {
        identity-attribute "dn"
        display-attribute "dn"
    }
}
node "ad" "group" "cn=g1,ou=groups" display="G1"
node "ad" "group" "cn=g2,ou=groups"
"#;
        compile_catalog(vec![parse_kdl_document(kdl).unwrap()]).unwrap()
    }

    #[test]
    fn test_application_info() {
        let catalog = catalog();
        let mut index = SchemaIndex::new();
        let app = index.application(&catalog, "ad");
        assert!(app.known);
        assert!(app.has_interesting_account_attributes());

        let member_of = app.account_attribute("memberOf").unwrap();
        assert_eq!(member_of.schema_object_type.as_deref(), Some("group"));
        assert!(member_of.has_display_name);
        assert!(member_of.has_associations);

        // plain values and references to schemas with nothing to offer are dropped
        assert!(app.account_attribute("department").is_none());
        assert!(app.account_attribute("manager").is_none());

        let group = app.schema_info("group").unwrap();
        assert!(group.attributes.is_empty());
        assert!(group.has_associations());
        assert!(group.has_display_name);
        assert!(app.schema_info("account").is_none());
    }

    /// Reports no hierarchies and a fixed indexed attribute for every schema.
    struct Overridden(Catalog);

    impl SchemaCatalog for Overridden {
        fn application_names(&self) -> Vec<String> {
            self.0.application_names()
        }

        fn application(&self, name: &str) -> Option<&Application> {
            self.0.application(name)
        }

        fn indexed_attributes_for(
            &self,
            _application: &str,
            _object_type: &str,
        ) -> Vec<AttributeDefinition> {
            vec![AttributeDefinition {
                name: "tcode".into(),
                indexed: true,
                object_type: None,
            }]
        }

        fn hierarchy_attribute_for(
            &self,
            _application: &str,
            _object_type: &str,
        ) -> Option<HierarchyAttribute> {
            None
        }
    }

    #[test]
    fn test_schema_metadata_read_through_catalog() {
        let catalog = Overridden(catalog());
        let mut index = SchemaIndex::new();
        let app = index.application(&catalog, "ad");

        let group = app.schema_info("group").unwrap();
        assert!(group.hierarchy.is_none());
        let names: Vec<&str> = group.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["tcode"]);

        let person = app.schema_info("person").unwrap();
        assert!(person.has_associations());
    }

    #[test]
    fn test_unknown_application_placeholder() {
        let catalog = catalog();
        let mut index = SchemaIndex::new();
        let app = index.application(&catalog, "ghost");
        assert!(!app.known);
        assert!(!app.has_interesting_account_attributes());
        // cached: same Arc on the second lookup
        let again = index.application(&catalog, "ghost");
        assert!(Arc::ptr_eq(&app, &again));
    }

    #[test]
    fn test_display_name_resolution() {
        let catalog = catalog();
        let mut index = SchemaIndex::new();
        let app = index.application(&catalog, "ad");
        let att = app.account_attribute("memberOf").unwrap().clone();

        assert_eq!(index.display_name(&catalog, "ad", &att, "cn=g1,ou=groups"), "G1");
        // no display name on the node
        assert_eq!(
            index.display_name(&catalog, "ad", &att, "cn=g2,ou=groups"),
            "cn=g2,ou=groups"
        );
        // not in the catalog at all
        assert_eq!(index.display_name(&catalog, "ad", &att, "cn=gone"), "cn=gone");

        let plain = IndexedAttribute {
            name: "tcode".into(),
            schema_object_type: None,
            has_display_name: false,
            has_associations: false,
        };
        assert_eq!(index.display_name(&catalog, "ad", &plain, "SU01"), "SU01");
    }
}
