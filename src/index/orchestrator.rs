use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogSource;
use crate::errors::IndexError;
use crate::index::association::{OwnerKind, OwnerRef};
use crate::index::context::{IndexStats, RunContext};
use crate::index::direct::DirectAssociationBuilder;
use crate::index::flatten::{FlatteningState, HierarchyFlattener};
use crate::index::persist::{clear_owner, commit_owner, index_owner};
use crate::index::role::RoleTargetCompiler;
use crate::index::schema::{ApplicationInfo, SchemaInfo};
use crate::index::{CancelToken, IndexOptions, RequiredAssociations, Scope};
use crate::storage;

/// Outcome of a run. A failed run still reports what it did before the
/// failure.
#[derive(Debug, Serialize)]
pub struct IndexResult {
    pub stats: IndexStats,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<IndexError>,
    /// Cancelled before every object was visited
    pub terminated: bool,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<IndexError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl IndexResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the node pass (direct associations, then hierarchy flattening, per
/// schema) and the role pass over the catalog.
pub struct Indexer<'a, K: ?Sized> {
    catalog: &'a K,
    db: &'a DatabaseConnection,
    options: IndexOptions,
    scope: Scope,
    cancel: CancelToken,
}

impl<'a, K> Indexer<'a, K>
where
    K: CatalogSource + ?Sized,
{
    pub fn new(catalog: &'a K, db: &'a DatabaseConnection, options: IndexOptions) -> Self {
        Self {
            catalog,
            db,
            options,
            scope: Scope::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self) -> IndexResult {
        info!(options = ?self.options, "Starting target indexing");
        let mut ctx = RunContext::new(self.options);

        let error = match self.execute(&mut ctx).await {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Target indexing failed");
                Some(e)
            }
        };

        let terminated = self.cancel.is_cancelled();
        if terminated {
            warn!("Target indexing terminated before completion");
        }

        let stats = ctx.stats;
        info!(
            objects_examined = stats.objects_examined(),
            objects_indexed = stats.objects_indexed(),
            targets_added = stats.targets_added,
            targets_updated = stats.targets_updated,
            targets_removed = stats.targets_removed,
            missing_objects = stats.missing_objects,
            "Target indexing finished"
        );

        IndexResult {
            stats,
            error,
            terminated,
        }
    }

    async fn execute(&self, ctx: &mut RunContext) -> Result<(), IndexError> {
        if self.options.index_entitlements {
            self.index_entitlements(ctx).await?;
        }
        if self.options.indexes_roles() && !self.cancel.is_cancelled() {
            self.index_roles(ctx).await?;
        }
        if self.options.refresh_fulltext {
            info!("Full text refresh requested; no full text index is maintained");
        }
        Ok(())
    }

    async fn index_entitlements(&self, ctx: &mut RunContext) -> Result<(), IndexError> {
        if self.options.full_reset {
            self.reset(ctx, OwnerKind::Node).await?;
        }

        for name in self.applications(ctx) {
            if self.cancel.is_cancelled() {
                break;
            }
            let app = ctx.schema.application(self.catalog, &name);
            for schema in self.indexed_schemas(&app) {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.index_schema(ctx, app.clone(), schema).await?;
            }
        }
        Ok(())
    }

    async fn reset(&self, ctx: &mut RunContext, kind: OwnerKind) -> Result<(), IndexError> {
        let targets = storage::reset_associations(self.db, kind).await?;
        let classifications = storage::reset_effective_classifications(
            self.db,
            kind,
            storage::CLASSIFICATION_SOURCE_TASK,
        )
        .await?;
        info!(owner_kind = %kind, targets, classifications, "Reset associations");

        ctx.stats.targets_reset += targets;
        ctx.stats.effective_classifications_reset += classifications;
        Ok(())
    }

    /// Applications named by the scope, or every application with something
    /// to index.
    fn applications(&self, ctx: &mut RunContext) -> Vec<String> {
        match &self.scope.applications {
            Some(names) => names
                .iter()
                .filter(|name| {
                    let known = self.catalog.application(name).is_some();
                    if !known {
                        warn!(application = %name, "Application not found, skipping");
                        ctx.stats.missing_objects += 1;
                    }
                    known
                })
                .cloned()
                .collect(),
            None => self
                .catalog
                .application_names()
                .into_iter()
                .filter(|name| {
                    let app = ctx.schema.application(self.catalog, name);
                    !self.indexed_schemas(&app).is_empty()
                })
                .collect(),
        }
    }

    /// Non-account schemas that produce associations, in catalog order.
    fn indexed_schemas(&self, app: &ApplicationInfo) -> Vec<SchemaInfo> {
        let Some(definition) = self.catalog.application(&app.name) else {
            return Vec::new();
        };
        definition
            .schemas
            .iter()
            .filter_map(|s| app.schema_info(&s.object_type))
            .filter(|s| s.has_associations())
            .cloned()
            .collect()
    }

    async fn index_schema(
        &self,
        ctx: &mut RunContext,
        app: Arc<ApplicationInfo>,
        schema: SchemaInfo,
    ) -> Result<(), IndexError> {
        info!(application = %app.name, object_type = %schema.object_type, "Indexing entitlements");

        let mut state = FlatteningState::new(&app.name, &schema);
        let builder = DirectAssociationBuilder::new(self.catalog, app.clone(), schema);
        let promote = self.options.promote_classifications;

        for id in self.catalog.node_ids(&app.name, &builder.schema().object_type) {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(node) = self.catalog.node(&id) else {
                continue;
            };
            ctx.stats.entitlements_examined += 1;

            let clean = promote && state.mark_cleaned(&node.id);
            index_owner(self.db, ctx, &builder, node, clean).await?;
            ctx.stats.entitlements_indexed += 1;
            state.add_hierarchy(self.catalog, node);
        }

        if state.has_hierarchy() && !self.cancel.is_cancelled() {
            debug!(application = %app.name, "Flattening hierarchy");
            HierarchyFlattener::new(self.catalog, self.db)
                .flatten_all(ctx, &mut state, &self.cancel)
                .await?;
        }
        Ok(())
    }

    /// Roles named by the scope, or every enabled role.
    fn role_names(&self, ctx: &mut RunContext) -> Vec<String> {
        match &self.scope.roles {
            Some(names) => names
                .iter()
                .filter(|name| {
                    let known = self.catalog.role(name).is_some();
                    if !known {
                        warn!(role = %name, "Role not found, skipping");
                        ctx.stats.missing_objects += 1;
                    }
                    known
                })
                .cloned()
                .collect(),
            None => self.catalog.role_names(false),
        }
    }

    async fn index_roles(&self, ctx: &mut RunContext) -> Result<(), IndexError> {
        if self.options.full_reset {
            self.reset(ctx, OwnerKind::Role).await?;
        }

        let compiler = RoleTargetCompiler::new(self.catalog, self.db);
        let promote = self.options.promote_classifications;

        for name in self.role_names(ctx) {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(role) = self.catalog.role(&name) else {
                continue;
            };
            ctx.stats.roles_examined += 1;

            let owner = OwnerRef::role(&role.name);
            let required = compiler.required(ctx, role).await?;

            if required.is_empty() {
                let removed = clear_owner(self.db, ctx, &owner).await?;
                if removed > 0 {
                    debug!(role = %role.name, removed, "Role grants nothing, cleared");
                    ctx.stats.roles_indexed += 1;
                }
                continue;
            }

            ctx.stats.roles_indexed += 1;
            let filter = compiler.current_filter(&ctx.options);
            commit_owner(self.db, ctx, &owner, filter, required, promote).await?;
        }
        Ok(())
    }
}
