use std::collections::{HashMap, HashSet};

use sea_orm::DatabaseConnection;
use tracing::{debug, warn};

use crate::catalog::types::{HierarchyDirection, Node};
use crate::catalog::{CatalogSource, ObjectRepository};
use crate::errors::IndexError;
use crate::index::association::{AssociationKey, OwnerRef, TargetAssociation};
use crate::index::bucket::AssociationBucket;
use crate::index::context::RunContext;
use crate::index::persist::commit_owner;
use crate::index::schema::SchemaInfo;
use crate::index::{CancelToken, CurrentFilter};
use crate::storage;

/// Hierarchy bookkeeping for one (application, schema), gathered while the
/// direct pass walks its nodes.
///
/// Parent hierarchies only need the list of nodes that have parents. Child
/// hierarchies are inverted into a child -> parents map so both directions
/// flatten the same way.
#[derive(Debug)]
pub struct FlatteningState {
    application: String,
    object_type: String,
    direction: Option<HierarchyDirection>,
    parent_ids: Vec<String>,
    child_hierarchies: HashMap<String, Vec<String>>,
    /// Keys of `child_hierarchies` in first-seen order
    child_order: Vec<String>,
    flattened: HashSet<String>,
    cleaned: HashSet<String>,
}

/// One node to flatten, with its resolved parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenStep {
    pub id: String,
    pub parents: Vec<String>,
}

impl FlatteningState {
    pub fn new(application: &str, schema: &SchemaInfo) -> Self {
        Self {
            application: application.to_string(),
            object_type: schema.object_type.clone(),
            direction: schema.hierarchy.as_ref().map(|h| h.direction),
            parent_ids: Vec::new(),
            child_hierarchies: HashMap::new(),
            child_order: Vec::new(),
            flattened: HashSet::new(),
            cleaned: HashSet::new(),
        }
    }

    /// State built in one pass over `nodes`, for flattening without a direct pass.
    pub fn build<'n, K>(
        catalog: &K,
        application: &str,
        schema: &SchemaInfo,
        nodes: impl IntoIterator<Item = &'n Node>,
    ) -> Self
    where
        K: ObjectRepository + ?Sized,
    {
        let mut state = Self::new(application, schema);
        for node in nodes {
            state.add_hierarchy(catalog, node);
        }
        state
    }

    pub fn has_hierarchy(&self) -> bool {
        self.direction.is_some()
    }

    /// Remember the hierarchy edges of a node.
    pub fn add_hierarchy<K>(&mut self, catalog: &K, node: &Node)
    where
        K: ObjectRepository + ?Sized,
    {
        if node.hierarchy.is_empty() {
            return;
        }
        match self.direction {
            None => {}
            Some(HierarchyDirection::Parent) => self.parent_ids.push(node.id.clone()),
            Some(HierarchyDirection::Child) => {
                for value in &node.hierarchy {
                    let Some(child) = catalog.find_node(&self.application, &self.object_type, value)
                    else {
                        warn!(node = %node.id, child = %value, "Child in hierarchy not found in catalog");
                        continue;
                    };
                    let parents = self
                        .child_hierarchies
                        .entry(child.id.clone())
                        .or_insert_with(|| {
                            self.child_order.push(child.id.clone());
                            Vec::new()
                        });
                    parents.push(node.id.clone());
                }
            }
        }
    }

    /// Ids of the nodes that need flattening, in the order they were seen.
    pub fn ids_to_flatten(&self) -> Vec<String> {
        match self.direction {
            Some(HierarchyDirection::Parent) => self.parent_ids.clone(),
            Some(HierarchyDirection::Child) => self.child_order.clone(),
            None => Vec::new(),
        }
    }

    /// Resolved parents of a node. Parents that no longer resolve are
    /// logged and skipped.
    pub fn parents<'k, K>(&self, catalog: &'k K, node: &Node) -> Vec<&'k Node>
    where
        K: ObjectRepository + ?Sized,
    {
        match self.direction {
            Some(HierarchyDirection::Parent) => node
                .hierarchy
                .iter()
                .filter_map(|value| {
                    let parent = catalog.find_node(&self.application, &self.object_type, value);
                    if parent.is_none() {
                        warn!(node = %node.id, parent = %value, "Orphaned parent reference, skipping");
                    }
                    parent
                })
                .collect(),
            Some(HierarchyDirection::Child) => self
                .child_hierarchies
                .get(&node.id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| {
                            let parent = catalog.node(id);
                            if parent.is_none() {
                                warn!(node = %node.id, parent = %id, "Parent evaporated, skipping");
                            }
                            parent
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn is_flattened(&self, id: &str) -> bool {
        self.flattened.contains(id)
    }

    pub fn mark_flattened(&mut self, id: &str) {
        self.flattened.insert(id.to_string());
    }

    /// True the first time an id is seen; effective classifications are
    /// cleaned once per node per run.
    pub fn mark_cleaned(&mut self, id: &str) -> bool {
        self.cleaned.insert(id.to_string())
    }

    /// Nodes to flatten so that `node` can be: its unflattened ancestors
    /// first, `node` last. Fails when the ancestors loop back on themselves.
    pub fn flatten_order<K>(&self, catalog: &K, node: &Node) -> Result<Vec<FlattenStep>, IndexError>
    where
        K: ObjectRepository + ?Sized,
    {
        let mut in_progress = Vec::new();
        let mut done = HashSet::new();
        let mut steps = Vec::new();
        self.visit(catalog, node, &mut in_progress, &mut done, &mut steps)?;
        Ok(steps)
    }

    fn visit<K>(
        &self,
        catalog: &K,
        node: &Node,
        in_progress: &mut Vec<String>,
        done: &mut HashSet<String>,
        steps: &mut Vec<FlattenStep>,
    ) -> Result<(), IndexError>
    where
        K: ObjectRepository + ?Sized,
    {
        if self.flattened.contains(&node.id) || done.contains(&node.id) {
            return Ok(());
        }
        if let Some(pos) = in_progress.iter().position(|id| *id == node.id) {
            let mut path = in_progress[pos..].to_vec();
            path.push(node.id.clone());
            return Err(IndexError::HierarchyCycle(path.join(" -> ")));
        }

        in_progress.push(node.id.clone());
        let parents = self.parents(catalog, node);
        for parent in &parents {
            self.visit(catalog, parent, in_progress, done, steps)?;
        }
        in_progress.pop();

        done.insert(node.id.clone());
        steps.push(FlattenStep {
            id: node.id.clone(),
            parents: parents.iter().map(|p| p.id.clone()).collect(),
        });
        Ok(())
    }
}

/// Copies every ancestor's associations down to its descendants.
pub struct HierarchyFlattener<'a, K: ?Sized> {
    catalog: &'a K,
    db: &'a DatabaseConnection,
}

impl<'a, K> HierarchyFlattener<'a, K>
where
    K: CatalogSource + ?Sized,
{
    pub fn new(catalog: &'a K, db: &'a DatabaseConnection) -> Self {
        Self { catalog, db }
    }

    /// Flatten every node recorded in `state`.
    pub async fn flatten_all(
        &self,
        ctx: &mut RunContext,
        state: &mut FlatteningState,
        cancel: &CancelToken,
    ) -> Result<(), IndexError> {
        for id in state.ids_to_flatten() {
            if cancel.is_cancelled() {
                break;
            }
            match self.catalog.node(&id) {
                Some(node) => self.flatten(ctx, state, node).await?,
                None => warn!(node = %id, "Node evaporated before flattening"),
            }
        }
        Ok(())
    }

    /// Flatten one node, its ancestors first. Nodes flattened earlier in
    /// this state are not revisited.
    pub async fn flatten(
        &self,
        ctx: &mut RunContext,
        state: &mut FlatteningState,
        node: &Node,
    ) -> Result<(), IndexError> {
        if state.is_flattened(&node.id) {
            debug!(node = %node.id, "Already flattened");
            return Ok(());
        }

        for step in state.flatten_order(self.catalog, node)? {
            self.flatten_one(ctx, state, &step).await?;
        }
        Ok(())
    }

    async fn flatten_one(
        &self,
        ctx: &mut RunContext,
        state: &mut FlatteningState,
        step: &FlattenStep,
    ) -> Result<(), IndexError> {
        let Some(node) = self.catalog.node(&step.id) else {
            warn!(node = %step.id, "Node evaporated before flattening");
            return Ok(());
        };
        debug!(node = %node.id, parents = step.parents.len(), "Flattening");

        let required = self.required_from_parents(ctx, node, &step.parents).await?;
        let clean = ctx.options.promote_classifications && state.mark_cleaned(&node.id);
        let filter = CurrentFilter {
            flattened: Some(true),
            include_unstructured: ctx.options.index_unstructured_targets,
        };
        commit_owner(self.db, ctx, &OwnerRef::node(&node.id), filter, required, clean).await?;

        ctx.stats.entitlements_indexed += 1;
        state.mark_flattened(&node.id);
        Ok(())
    }

    /// Everything the parents hold, copied with this node's name prepended to
    /// the path. When several parents contribute the same target, the first
    /// one wins; a target the node already holds directly is not copied.
    pub async fn required_from_parents(
        &self,
        ctx: &RunContext,
        node: &Node,
        parents: &[String],
    ) -> Result<Vec<TargetAssociation>, IndexError> {
        let include_unstructured = ctx.options.index_unstructured_targets;
        let direct = CurrentFilter {
            flattened: Some(false),
            include_unstructured,
        };
        let own: HashSet<AssociationKey> =
            storage::load_associations(self.db, &OwnerRef::node(&node.id), &direct)
                .await?
                .iter()
                .map(TargetAssociation::key)
                .collect();

        let filter = CurrentFilter::all(include_unstructured);
        let mut bucket = AssociationBucket::ownerless();

        for parent in parents {
            let inherited =
                storage::load_associations(self.db, &OwnerRef::node(parent), &filter).await?;
            for assoc in inherited {
                if own.contains(&assoc.key()) {
                    debug!(node = %node.id, target = %assoc.target_name, "Held directly, not copied");
                    continue;
                }
                if !bucket.contains(&assoc) {
                    bucket.add(assoc.copy_with_prefix(node.displayable_name()));
                }
            }
        }

        Ok(bucket.into_associations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::loader::compile_catalog;
    use crate::catalog::parser::parse_kdl_document;
    use crate::catalog::Catalog;
    use crate::index::schema::ApplicationInfo;

    fn catalog(direction: &str, nodes: &str) -> Catalog {
        let kdl = format!(
            r#"
application "ad" {{
    schema "group" {{
        hierarchy "memberOf" direction="{direction}"
        index-permissions
    }}
}}
{nodes}
"#
        );
        compile_catalog(vec![parse_kdl_document(&kdl).unwrap()]).unwrap()
    }

    fn state_for(catalog: &Catalog) -> FlatteningState {
        let info = ApplicationInfo::new(catalog, &catalog.applications[0]);
        let schema = info.schema_info("group").unwrap().clone();
        FlatteningState::build(catalog, "ad", &schema, catalog.nodes.iter())
    }

    #[test]
    fn test_parent_hierarchy_order() {
        // a -> b -> c, parents first
        let catalog = catalog(
            "parent",
            r#"
node "ad" "group" "a" {
    hierarchy {
        - "b"
    }
}
node "ad" "group" "b" {
    hierarchy {
        - "c"
    }
}
node "ad" "group" "c"
"#,
        );
        let state = state_for(&catalog);
        assert_eq!(state.ids_to_flatten(), vec!["ad/group/a", "ad/group/b"]);

        let a = catalog.find_node("ad", "group", "a").unwrap();
        let steps = state.flatten_order(&catalog, a).unwrap();
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ad/group/c", "ad/group/b", "ad/group/a"]);
        assert!(steps[0].parents.is_empty());
        assert_eq!(steps[2].parents, vec!["ad/group/b"]);
    }

    #[test]
    fn test_child_hierarchy_inverted() {
        // p lists children c1 and c2, c2 is also listed by q
        let catalog = catalog(
            "child",
            r#"
node "ad" "group" "p" {
    hierarchy {
        - "c1"
        - "c2"
    }
}
node "ad" "group" "q" {
    hierarchy {
        - "c2"
        - "missing"
    }
}
node "ad" "group" "c1"
node "ad" "group" "c2"
"#,
        );
        let state = state_for(&catalog);
        assert_eq!(state.ids_to_flatten(), vec!["ad/group/c1", "ad/group/c2"]);

        let c2 = catalog.find_node("ad", "group", "c2").unwrap();
        let parents: Vec<&str> = state
            .parents(&catalog, c2)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(parents, vec!["ad/group/p", "ad/group/q"]);

        let p = catalog.find_node("ad", "group", "p").unwrap();
        assert!(state.parents(&catalog, p).is_empty());
    }

    #[test]
    fn test_orphaned_parent_skipped() {
        let catalog = catalog(
            "parent",
            r#"
node "ad" "group" "a" {
    hierarchy {
        - "gone"
        - "b"
    }
}
node "ad" "group" "b"
"#,
        );
        let state = state_for(&catalog);
        let a = catalog.find_node("ad", "group", "a").unwrap();
        let steps = state.flatten_order(&catalog, a).unwrap();
        assert_eq!(steps.last().unwrap().parents, vec!["ad/group/b"]);
    }

    #[test]
    fn test_cycle_detected() {
        let catalog = catalog(
            "parent",
            r#"
node "ad" "group" "a" {
    hierarchy {
        - "b"
    }
}
node "ad" "group" "b" {
    hierarchy {
        - "a"
    }
}
"#,
        );
        let state = state_for(&catalog);
        let a = catalog.find_node("ad", "group", "a").unwrap();
        let err = state.flatten_order(&catalog, a).unwrap_err();
        match err {
            IndexError::HierarchyCycle(path) => {
                assert_eq!(path, "ad/group/a -> ad/group/b -> ad/group/a")
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_ancestor_visited_once() {
        // diamond: a -> b, a -> c, b -> d, c -> d
        let catalog = catalog(
            "parent",
            r#"
node "ad" "group" "a" {
    hierarchy {
        - "b"
        - "c"
    }
}
node "ad" "group" "b" {
    hierarchy {
        - "d"
    }
}
node "ad" "group" "c" {
    hierarchy {
        - "d"
    }
}
node "ad" "group" "d"
"#,
        );
        let mut state = state_for(&catalog);
        let a = catalog.find_node("ad", "group", "a").unwrap();
        let steps = state.flatten_order(&catalog, a).unwrap();
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ad/group/d", "ad/group/b", "ad/group/c", "ad/group/a"]);

        // memoized nodes drop out of later plans
        state.mark_flattened("ad/group/d");
        state.mark_flattened("ad/group/b");
        let c = catalog.find_node("ad", "group", "c").unwrap();
        let steps = state.flatten_order(&catalog, c).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id, "ad/group/c");
    }

    #[test]
    fn test_mark_cleaned_once() {
        let catalog = catalog("parent", r#"node "ad" "group" "a""#);
        let mut state = state_for(&catalog);
        assert!(state.mark_cleaned("ad/group/a"));
        assert!(!state.mark_cleaned("ad/group/a"));
    }
}
