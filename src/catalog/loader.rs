use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::catalog::errors::CatalogError;
use crate::catalog::parser::parse_kdl_document;
use crate::catalog::types::*;
use crate::catalog::Catalog;

/// Load all `.kdl` catalog files from the given directory and compile them
/// into a single immutable `Catalog`.
pub fn load_catalog(dir: &Path) -> Result<Catalog, CatalogError> {
    if !dir.is_dir() {
        return Err(CatalogError::InvalidCatalog(format!(
            "catalog directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut all_parsed = Vec::new();
    let mut file_count = 0;

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| CatalogError::CatalogLoadError {
                path: path.display().to_string(),
                source,
            })?;
        let parsed = parse_kdl_document(&contents)?;
        all_parsed.push(parsed);
        file_count += 1;
    }

    let catalog = compile_catalog(all_parsed)?;

    tracing::info!(
        files = file_count,
        applications = catalog.applications.len(),
        nodes = catalog.nodes.len(),
        roles = catalog.roles.len(),
        "Loaded catalog"
    );

    Ok(catalog)
}

/// Merge and validate parsed catalog files. Later definitions of an
/// application or role replace earlier ones; node identities must be unique.
pub fn compile_catalog(parsed: Vec<ParsedCatalog>) -> Result<Catalog, CatalogError> {
    let mut applications: Vec<Application> = Vec::new();
    let mut nodes: Vec<Node> = Vec::new();
    let mut roles: Vec<Role> = Vec::new();

    for p in parsed {
        for app in p.applications {
            match applications.iter_mut().find(|a| a.name == app.name) {
                Some(existing) => *existing = app,
                None => applications.push(app),
            }
        }
        for role in p.roles {
            match roles.iter_mut().find(|r| r.name == role.name) {
                Some(existing) => *existing = role,
                None => roles.push(role),
            }
        }
        nodes.extend(p.nodes);
    }

    // Every node must belong to a declared (application, schema)
    let mut seen = HashSet::new();
    for node in &nodes {
        let app = applications
            .iter()
            .find(|a| a.name == node.application)
            .ok_or_else(|| CatalogError::UndefinedApplication(node.application.clone()))?;
        if app.schema(&node.object_type).is_none() {
            return Err(CatalogError::InvalidNode(format!(
                "node `{}` references undefined schema `{}` of application `{}`",
                node.id, node.object_type, node.application
            )));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(CatalogError::InvalidNode(format!(
                "duplicate node `{}`",
                node.id
            )));
        }
    }

    let role_map: HashMap<&str, &Role> = roles.iter().map(|r| (r.name.as_str(), r)).collect();
    for role in &roles {
        for referenced in role.includes.iter().chain(&role.requires) {
            if !role_map.contains_key(referenced.as_str()) {
                return Err(CatalogError::UndefinedRole(format!(
                    "{referenced} (referenced by {})",
                    role.name
                )));
            }
        }
    }

    // Validate role inheritance: no cycles
    check_role_cycles(&role_map)?;

    Ok(Catalog::new(applications, nodes, roles))
}

/// Check for cycles across `includes` and `requires` using DFS.
fn check_role_cycles(roles: &HashMap<&str, &Role>) -> Result<(), CatalogError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    let mut names: Vec<&str> = roles.keys().copied().collect();
    names.sort_unstable();
    for name in names {
        if !visited.contains(name) {
            dfs_cycle_check(name, roles, &mut visited, &mut in_stack)?;
        }
    }
    Ok(())
}

fn dfs_cycle_check(
    name: &str,
    roles: &HashMap<&str, &Role>,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
) -> Result<(), CatalogError> {
    visited.insert(name.to_string());
    in_stack.insert(name.to_string());

    if let Some(role) = roles.get(name) {
        for next in role.includes.iter().chain(&role.requires) {
            if in_stack.contains(next.as_str()) {
                return Err(CatalogError::CyclicRoleInheritance(format!(
                    "{name} -> {next}"
                )));
            }
            if !visited.contains(next.as_str()) {
                dfs_cycle_check(next, roles, visited, in_stack)?;
            }
        }
    }

    in_stack.remove(name);
    Ok(())
}
