use crate::catalog::errors::CatalogError;
use crate::catalog::types::*;
use kdl::{KdlDocument, KdlNode};

/// Parse a KDL document string into typed catalog structs.
pub fn parse_kdl_document(source: &str) -> Result<ParsedCatalog, CatalogError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| CatalogError::KdlParse(e.to_string()))?;

    let mut catalog = ParsedCatalog::default();

    for node in doc.nodes() {
        match node.name().value() {
            "application" => catalog.applications.push(parse_application(node)?),
            "node" => catalog.nodes.push(parse_node(node)?),
            "role" => catalog.roles.push(parse_role(node)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(catalog)
}

fn parse_application(node: &KdlNode) -> Result<Application, CatalogError> {
    let name = first_string_arg(node).ok_or_else(|| {
        CatalogError::InvalidCatalog(
            "application node requires a string argument (e.g. application \"ad\")".into(),
        )
    })?;

    let mut schemas = Vec::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "schema" => schemas.push(parse_schema(&name, child)?),
                other => {
                    return Err(CatalogError::InvalidCatalog(format!(
                        "unexpected child `{other}` in application `{name}` (expected `schema`)"
                    )));
                }
            }
        }
    }

    Ok(Application { name, schemas })
}

fn parse_schema(application: &str, node: &KdlNode) -> Result<Schema, CatalogError> {
    let object_type = first_string_arg(node).ok_or_else(|| {
        CatalogError::InvalidCatalog(format!(
            "schema in application `{application}` requires an object type argument (e.g. schema \"group\")"
        ))
    })?;

    let mut schema = Schema {
        object_type: object_type.clone(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "identity-attribute" => {
                    schema.identity_attribute = first_string_arg(child);
                }
                "display-attribute" => {
                    schema.display_attribute = first_string_arg(child);
                }
                "hierarchy" => {
                    let name = first_string_arg(child).ok_or_else(|| {
                        CatalogError::InvalidCatalog(format!(
                            "hierarchy in schema `{application}/{object_type}` requires an attribute name"
                        ))
                    })?;
                    let direction = match child.get("direction").and_then(|v| v.as_string()) {
                        None => HierarchyDirection::Parent,
                        Some(d) => HierarchyDirection::parse(d).ok_or_else(|| {
                            CatalogError::InvalidCatalog(format!(
                                "invalid hierarchy direction `{d}` in schema `{application}/{object_type}` (expected \"parent\" or \"child\")"
                            ))
                        })?,
                    };
                    schema.hierarchy = Some(HierarchyAttribute { name, direction });
                }
                "index-permissions" => {
                    schema.index_permissions = first_bool_arg(child).unwrap_or(true);
                }
                "attribute" => {
                    let name = first_string_arg(child).ok_or_else(|| {
                        CatalogError::InvalidCatalog(format!(
                            "attribute in schema `{application}/{object_type}` requires a name"
                        ))
                    })?;
                    schema.attributes.push(AttributeDefinition {
                        name,
                        indexed: child
                            .get("indexed")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false),
                        object_type: child
                            .get("object-type")
                            .and_then(|v| v.as_string())
                            .map(|s| s.to_string()),
                    });
                }
                other => {
                    return Err(CatalogError::InvalidCatalog(format!(
                        "unexpected child `{other}` in schema `{application}/{object_type}`"
                    )));
                }
            }
        }
    }

    Ok(schema)
}

fn parse_node(node: &KdlNode) -> Result<Node, CatalogError> {
    let args = string_args(node);
    let [application, object_type, value] = args.as_slice() else {
        return Err(CatalogError::InvalidNode(format!(
            "node requires application, object type and value arguments, got {}",
            args.len()
        )));
    };
    let key = NodeKey::new(application, object_type, value);

    let mut parsed = Node {
        id: key.to_string(),
        application: key.application.clone(),
        object_type: key.object_type.clone(),
        attribute: node
            .get("attribute")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string()),
        value: key.value.clone(),
        display_name: node
            .get("display")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string()),
        attributes: Vec::new(),
        hierarchy: Vec::new(),
        permissions: Vec::new(),
        classifications: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "hierarchy" => {
                    parsed.hierarchy.extend(dash_list(child));
                }
                "attribute" => {
                    let mut values = string_args(child);
                    if values.is_empty() {
                        return Err(CatalogError::InvalidNode(format!(
                            "attribute on node `{key}` requires a name"
                        )));
                    }
                    let name = values.remove(0);
                    values.extend(dash_list(child));
                    parsed.attributes.push(NodeAttribute { name, values });
                }
                "permission" => {
                    let target = first_string_arg(child).ok_or_else(|| {
                        CatalogError::InvalidNode(format!(
                            "permission on node `{key}` requires a target (e.g. permission \"Invoice List\" rights=\"read\")"
                        ))
                    })?;
                    parsed.permissions.push(Permission {
                        target,
                        rights: child
                            .get("rights")
                            .and_then(|v| v.as_string())
                            .map(|s| s.to_string()),
                    });
                }
                "classifications" => {
                    parsed.classifications.extend(dash_list(child));
                }
                other => {
                    return Err(CatalogError::InvalidNode(format!(
                        "unexpected child `{other}` in node `{key}`"
                    )));
                }
            }
        }
    }

    Ok(parsed)
}

fn parse_role(node: &KdlNode) -> Result<Role, CatalogError> {
    let name = first_string_arg(node).ok_or_else(|| {
        CatalogError::InvalidCatalog(
            "role node requires a string argument (e.g. role \"finance_clerk\")".into(),
        )
    })?;

    let mut role = Role {
        name: name.clone(),
        disabled: node
            .get("disabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "includes" => {
                    role.includes = dash_list(child);
                }
                "requires" => {
                    role.requires = dash_list(child);
                }
                "entitlement" => {
                    let mut args = string_args(child);
                    if args.len() < 2 {
                        return Err(CatalogError::InvalidCatalog(format!(
                            "entitlement in role `{name}` requires application and attribute arguments"
                        )));
                    }
                    let application = args.remove(0);
                    let attribute = args.remove(0);
                    args.extend(dash_list(child));
                    role.entitlements.push(RoleEntitlement {
                        application,
                        attribute,
                        values: args,
                    });
                }
                "permission" => {
                    let args = string_args(child);
                    let [application, target] = args.as_slice() else {
                        return Err(CatalogError::InvalidCatalog(format!(
                            "permission in role `{name}` requires application and target arguments"
                        )));
                    };
                    role.permissions.push(RolePermission {
                        application: application.clone(),
                        target: target.clone(),
                        rights: child
                            .get("rights")
                            .and_then(|v| v.as_string())
                            .map(|s| s.to_string()),
                    });
                }
                other => {
                    return Err(CatalogError::InvalidCatalog(format!(
                        "unexpected child `{other}` in role `{name}`"
                    )));
                }
            }
        }
    }

    Ok(role)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

/// All positional string arguments, in order.
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// hierarchy {
///     - "cn=parent,ou=groups"
///     - "cn=other,ou=groups"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_application() {
        let kdl = r#"
application "ad" {
    schema "account" {
        attribute "memberOf" object-type="group"
    }
    schema "group" {
        identity-attribute "dn"
        display-attribute "displayName"
        hierarchy "memberOf" direction="parent"
        index-permissions
        attribute "tcode" indexed=#true
        attribute "owner"
    }
}
"#;
        let catalog = parse_kdl_document(kdl).unwrap();
        assert_eq!(catalog.applications.len(), 1);
        let app = &catalog.applications[0];
        assert_eq!(app.name, "ad");

        let account = app.account_schema().unwrap();
        assert_eq!(account.attributes[0].object_type.as_deref(), Some("group"));
        assert!(!account.attributes[0].indexed);

        let group = app.schema("group").unwrap();
        assert_eq!(group.identity_attribute.as_deref(), Some("dn"));
        assert!(group.has_display_name());
        assert!(group.index_permissions);
        let hierarchy = group.hierarchy.as_ref().unwrap();
        assert_eq!(hierarchy.name, "memberOf");
        assert_eq!(hierarchy.direction, HierarchyDirection::Parent);
        assert_eq!(group.attributes.len(), 2);
        assert!(group.attributes[0].indexed);
        assert!(!group.attributes[1].indexed);
    }

    #[test]
    fn test_parse_child_hierarchy() {
        let kdl = r#"
application "sap" {
    schema "profile" {
        hierarchy "Child Profiles" direction="child"
        index-permissions #false
    }
}
"#;
        let catalog = parse_kdl_document(kdl).unwrap();
        let schema = catalog.applications[0].schema("profile").unwrap();
        assert_eq!(
            schema.hierarchy.as_ref().unwrap().direction,
            HierarchyDirection::Child
        );
        assert!(!schema.index_permissions);
    }

    #[test]
    fn test_parse_invalid_direction() {
        let kdl = r#"
application "sap" {
    schema "profile" {
        hierarchy "Child Profiles" direction="sideways"
    }
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCatalog(_)));
    }

    #[test]
    fn test_parse_node() {
        let kdl = r#"
node "ad" "group" "cn=g1" attribute="memberOf" display="G1" {
    hierarchy {
        - "cn=g2"
    }
    attribute "tcode" {
        - "SU01"
        - "PFCG"
    }
    attribute "owner" "alice"
    permission "Invoice List" rights="read"
    permission "Ledger"
    classifications {
        - "Sensitive"
    }
}
"#;
        let catalog = parse_kdl_document(kdl).unwrap();
        assert_eq!(catalog.nodes.len(), 1);
        let node = &catalog.nodes[0];
        assert_eq!(node.id, "ad/group/cn=g1");
        assert_eq!(node.attribute.as_deref(), Some("memberOf"));
        assert_eq!(node.displayable_name(), "G1");
        assert_eq!(node.hierarchy, vec!["cn=g2"]);
        assert_eq!(node.values("tcode"), ["SU01", "PFCG"]);
        assert_eq!(node.values("owner"), ["alice"]);
        assert!(node.values("missing").is_empty());
        assert_eq!(node.permissions.len(), 2);
        assert_eq!(node.permissions[0].rights.as_deref(), Some("read"));
        assert!(node.permissions[1].rights.is_none());
        assert_eq!(node.classifications, vec!["Sensitive"]);
    }

    #[test]
    fn test_parse_node_missing_value() {
        let kdl = r#"node "ad" "group""#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidNode(_)));
    }

    #[test]
    fn test_parse_role() {
        let kdl = r#"
role "R" {
    includes {
        - "Base"
    }
    requires {
        - "Other"
    }
    entitlement "ad" "memberOf" {
        - "cn=g1"
    }
    entitlement "ad" "memberOf" "cn=g3"
    permission "ad" "Invoice List" rights="read"
}

role "Old" disabled=#true
"#;
        let catalog = parse_kdl_document(kdl).unwrap();
        assert_eq!(catalog.roles.len(), 2);

        let role = &catalog.roles[0];
        assert_eq!(role.name, "R");
        assert!(!role.disabled);
        assert_eq!(role.includes, vec!["Base"]);
        assert_eq!(role.requires, vec!["Other"]);
        assert_eq!(role.entitlements.len(), 2);
        assert_eq!(role.entitlements[0].values, vec!["cn=g1"]);
        assert_eq!(role.entitlements[1].values, vec!["cn=g3"]);
        assert_eq!(role.permissions[0].target, "Invoice List");
        assert_eq!(role.permissions[0].rights.as_deref(), Some("read"));

        assert!(catalog.roles[1].disabled);
    }

    #[test]
    fn test_parse_role_permission_missing_target() {
        let kdl = r#"
role "R" {
    permission "ad"
}
"#;
        let err = parse_kdl_document(kdl).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCatalog(_)));
    }

    #[test]
    fn test_parse_ignores_unknown_top_level() {
        let kdl = r#"
comment "not part of the catalog"
role "R"
"#;
        let catalog = parse_kdl_document(kdl).unwrap();
        assert_eq!(catalog.roles.len(), 1);
    }

    #[test]
    fn test_parse_kdl_syntax_error() {
        let err = parse_kdl_document("role \"R\" {").unwrap_err();
        assert!(matches!(err, CatalogError::KdlParse(_)));
    }
}
