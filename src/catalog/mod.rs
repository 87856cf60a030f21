pub mod errors;
pub mod loader;
pub mod parser;
pub mod plan;
pub mod types;

use std::collections::HashMap;

use errors::CatalogError;
use types::{
    Application, AttributeDefinition, GrantList, HierarchyAttribute, Node, NodeKey, Role, Schema,
};

/// Application and schema metadata: which attributes are indexed and how the
/// hierarchy is stored.
pub trait SchemaCatalog {
    fn application_names(&self) -> Vec<String>;

    fn application(&self, name: &str) -> Option<&Application>;

    fn schema(&self, application: &str, object_type: &str) -> Option<&Schema> {
        self.application(application)?.schema(object_type)
    }

    fn account_schema(&self, application: &str) -> Option<&Schema> {
        self.application(application)?.account_schema()
    }

    fn indexed_attributes_for(&self, application: &str, object_type: &str) -> Vec<AttributeDefinition> {
        self.schema(application, object_type)
            .map(|s| s.indexed_attributes().cloned().collect())
            .unwrap_or_default()
    }

    fn hierarchy_attribute_for(
        &self,
        application: &str,
        object_type: &str,
    ) -> Option<HierarchyAttribute> {
        self.schema(application, object_type)?.hierarchy.clone()
    }
}

/// Read access to nodes and roles.
pub trait ObjectRepository {
    fn node(&self, id: &str) -> Option<&Node>;

    fn find_node(&self, application: &str, object_type: &str, value: &str) -> Option<&Node>;

    /// Lookup without the object type, by the account attribute carrying the value.
    fn find_node_by_attribute(&self, application: &str, attribute: &str, value: &str)
        -> Option<&Node>;

    /// Ids of all nodes of one schema, in catalog order.
    fn node_ids(&self, application: &str, object_type: &str) -> Vec<String>;

    fn role(&self, name: &str) -> Option<&Role>;

    fn role_names(&self, include_disabled: bool) -> Vec<String>;
}

/// Expands a role into what it would provision if assigned.
pub trait PlanCompiler {
    fn expand(&self, role: &Role) -> Result<GrantList, CatalogError>;
}

/// Everything the indexer reads from the outside world.
pub trait CatalogSource: SchemaCatalog + ObjectRepository + PlanCompiler + Send + Sync {}

impl<T: SchemaCatalog + ObjectRepository + PlanCompiler + Send + Sync> CatalogSource for T {}

/// Catalog compiled from KDL files.
/// Immutable after construction; changes require a reload.
#[derive(Debug, Default)]
pub struct Catalog {
    pub applications: Vec<Application>,
    pub nodes: Vec<Node>,
    pub roles: Vec<Role>,
    /// node id -> position in `nodes`
    node_index: HashMap<String, usize>,
    /// role name -> position in `roles`
    role_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(applications: Vec<Application>, nodes: Vec<Node>, roles: Vec<Role>) -> Self {
        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let role_index = roles
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self {
            applications,
            nodes,
            roles,
            node_index,
            role_index,
        }
    }
}

impl SchemaCatalog for Catalog {
    fn application_names(&self) -> Vec<String> {
        self.applications.iter().map(|a| a.name.clone()).collect()
    }

    fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }
}

impl ObjectRepository for Catalog {
    fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    fn find_node(&self, application: &str, object_type: &str, value: &str) -> Option<&Node> {
        self.node(&NodeKey::new(application, object_type, value).to_string())
    }

    fn find_node_by_attribute(
        &self,
        application: &str,
        attribute: &str,
        value: &str,
    ) -> Option<&Node> {
        self.nodes.iter().find(|n| {
            n.application == application
                && n.value == value
                && n.attribute.as_deref() == Some(attribute)
        })
    }

    fn node_ids(&self, application: &str, object_type: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.application == application && n.object_type == object_type)
            .map(|n| n.id.clone())
            .collect()
    }

    fn role(&self, name: &str) -> Option<&Role> {
        self.role_index.get(name).map(|&i| &self.roles[i])
    }

    fn role_names(&self, include_disabled: bool) -> Vec<String> {
        self.roles
            .iter()
            .filter(|r| include_disabled || !r.disabled)
            .map(|r| r.name.clone())
            .collect()
    }
}

impl PlanCompiler for Catalog {
    fn expand(&self, role: &Role) -> Result<GrantList, CatalogError> {
        plan::expand_role(self, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::compile_catalog;
    use crate::catalog::parser::parse_kdl_document;

    const CATALOG: &str = r#"
application "ad" {
    schema "account" {
        attribute "memberOf" object-type="group"
    }
    schema "group" {
        hierarchy "memberOf"
        attribute "memberOf" indexed=#true object-type="group"
        attribute "tcode" indexed=#true
    }
}
node "ad" "group" "cn=g1" attribute="memberOf"
node "ad" "group" "cn=g2" attribute="memberOf"
role "Active"
role "Retired" disabled=#true
"#;

    fn catalog() -> Catalog {
        compile_catalog(vec![parse_kdl_document(CATALOG).unwrap()]).unwrap()
    }

    #[test]
    fn test_schema_lookups() {
        let catalog = catalog();
        let indexed = catalog.indexed_attributes_for("ad", "group");
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].name, "tcode");
        assert_eq!(
            catalog.hierarchy_attribute_for("ad", "group").unwrap().name,
            "memberOf"
        );
        assert!(catalog.account_schema("ad").is_some());
        assert!(catalog.indexed_attributes_for("nope", "group").is_empty());
    }

    #[test]
    fn test_node_lookups() {
        let catalog = catalog();
        assert!(catalog.find_node("ad", "group", "cn=g1").is_some());
        assert!(catalog.find_node("ad", "group", "cn=g9").is_none());
        assert!(catalog
            .find_node_by_attribute("ad", "memberOf", "cn=g2")
            .is_some());
        assert!(catalog.find_node_by_attribute("ad", "owner", "cn=g2").is_none());
        assert_eq!(catalog.node_ids("ad", "group").len(), 2);
    }

    #[test]
    fn test_role_names_skip_disabled() {
        let catalog = catalog();
        assert_eq!(catalog.role_names(false), vec!["Active"]);
        assert_eq!(catalog.role_names(true), vec!["Active", "Retired"]);
    }
}
