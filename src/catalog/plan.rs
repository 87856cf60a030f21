use std::collections::HashSet;

use crate::catalog::errors::CatalogError;
use crate::catalog::types::{GrantList, Role};
use crate::catalog::{Catalog, ObjectRepository};

/// Expand a role into everything it would provision if assigned: its own
/// entitlements and permissions, then those of inherited roles, then those of
/// required roles, merged per application.
pub fn expand_role(catalog: &Catalog, role: &Role) -> Result<GrantList, CatalogError> {
    let mut grants = GrantList::default();
    let mut visited = HashSet::new();
    collect_grants(catalog, role, &mut grants, &mut visited)?;
    Ok(grants)
}

fn collect_grants(
    catalog: &Catalog,
    role: &Role,
    grants: &mut GrantList,
    visited: &mut HashSet<String>,
) -> Result<(), CatalogError> {
    if !visited.insert(role.name.clone()) {
        return Ok(());
    }

    for ent in &role.entitlements {
        grants
            .account_mut(&ent.application)
            .add_values(&ent.attribute, &ent.values);
    }
    for perm in &role.permissions {
        grants
            .account_mut(&perm.application)
            .add_permission(&perm.target, perm.rights.as_deref());
    }

    for name in role.includes.iter().chain(&role.requires) {
        let next = catalog
            .role(name)
            .ok_or_else(|| CatalogError::UndefinedRole(name.clone()))?;
        collect_grants(catalog, next, grants, visited)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::compile_catalog;
    use crate::catalog::parser::parse_kdl_document;

    fn catalog(kdl: &str) -> Catalog {
        compile_catalog(vec![parse_kdl_document(kdl).unwrap()]).unwrap()
    }

    #[test]
    fn test_expand_own_grants() {
        let catalog = catalog(
            r#"
role "R" {
    entitlement "ad" "memberOf" {
        - "cn=g1"
        - "cn=g2"
    }
    permission "sap" "PFCG" rights="create"
}
"#,
        );
        let grants = expand_role(&catalog, catalog.role("R").unwrap()).unwrap();
        assert_eq!(grants.accounts.len(), 2);
        assert_eq!(grants.accounts[0].application, "ad");
        assert_eq!(grants.accounts[0].attributes[0].values, vec!["cn=g1", "cn=g2"]);
        assert_eq!(grants.accounts[1].permissions[0].target, "PFCG");
    }

    #[test]
    fn test_expand_includes_then_requires() {
        let catalog = catalog(
            r#"
role "Base" {
    entitlement "ad" "memberOf" "cn=base"
}
role "Other" {
    entitlement "ad" "memberOf" "cn=other"
}
role "R" {
    includes {
        - "Base"
    }
    requires {
        - "Other"
    }
    entitlement "ad" "memberOf" "cn=own"
}
"#,
        );
        let grants = expand_role(&catalog, catalog.role("R").unwrap()).unwrap();
        assert_eq!(grants.accounts.len(), 1);
        assert_eq!(
            grants.accounts[0].attributes[0].values,
            vec!["cn=own", "cn=base", "cn=other"]
        );
    }

    #[test]
    fn test_expand_shared_subrole_visited_once() {
        let catalog = catalog(
            r#"
role "Shared" {
    permission "ad" "Invoice List" rights="read"
}
role "A" {
    includes {
        - "Shared"
    }
}
role "R" {
    includes {
        - "A"
        - "Shared"
    }
}
"#,
        );
        let grants = expand_role(&catalog, catalog.role("R").unwrap()).unwrap();
        assert_eq!(grants.accounts[0].permissions.len(), 1);
    }

    #[test]
    fn test_expand_empty_role() {
        let catalog = catalog(r#"role "Empty""#);
        let grants = expand_role(&catalog, catalog.role("Empty").unwrap()).unwrap();
        assert!(grants.is_empty());
    }
}
