use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{debug, info};

use crate::catalog::types::Role;
use crate::catalog::CatalogSource;
use crate::errors::IndexError;
use crate::index::association::{OwnerRef, TargetAssociation, TargetKind};
use crate::index::bucket::AssociationBucket;
use crate::index::context::RunContext;
use crate::index::schema::IndexedAttribute;
use crate::index::{CurrentFilter, IndexOptions, RequiredAssociations};
use crate::storage;

/// Associations a role grants: copies of the targets of the nodes its
/// entitlement values resolve to, the literal entitlement values, and its
/// permissions. Which of the three are produced follows the run options.
pub struct RoleTargetCompiler<'a, K: ?Sized> {
    catalog: &'a K,
    db: &'a DatabaseConnection,
}

impl<'a, K> RoleTargetCompiler<'a, K>
where
    K: CatalogSource + ?Sized,
{
    pub fn new(catalog: &'a K, db: &'a DatabaseConnection) -> Self {
        Self { catalog, db }
    }

    pub async fn compile(
        &self,
        ctx: &mut RunContext,
        role: &Role,
    ) -> Result<Vec<TargetAssociation>, IndexError> {
        let grants = self.catalog.expand(role)?;
        let options = ctx.options;
        let mut bucket = AssociationBucket::ownerless();

        for account in &grants.accounts {
            let app = ctx.schema.application(self.catalog, &account.application);
            let wants_targets = options.index_role_targets && app.has_interesting_account_attributes();

            if options.index_role_entitlements || wants_targets {
                for grant in &account.attributes {
                    let att = app.account_attribute(&grant.name).cloned();
                    let follows = options.index_role_targets
                        && att.as_ref().is_some_and(|a| a.has_associations);
                    if !options.index_role_entitlements && !follows {
                        continue;
                    }

                    for value in &grant.values {
                        if let Some(att) = att.as_ref().filter(|_| follows) {
                            self.add_indirect_targets(ctx, &mut bucket, role, &app.name, att, value)
                                .await?;
                        }
                        if options.index_role_entitlements {
                            let assoc =
                                self.entitlement(ctx, role, &app.name, &grant.name, att.as_ref(), value);
                            bucket.add(assoc);
                        }
                    }
                }
            }

            if options.index_role_permissions {
                for perm in &account.permissions {
                    let mut assoc =
                        TargetAssociation::new(Some(&app.name), TargetKind::Permission, &perm.target);
                    assoc.rights = perm.rights.clone();
                    assoc.hierarchy = Some(role.name.clone());
                    bucket.add(assoc);
                }
            }
        }

        debug!(role = %role.name, associations = bucket.len(), "Compiled role targets");
        Ok(bucket.into_associations())
    }

    fn entitlement(
        &self,
        ctx: &mut RunContext,
        role: &Role,
        application: &str,
        attribute: &str,
        att: Option<&IndexedAttribute>,
        value: &str,
    ) -> TargetAssociation {
        let name = match att {
            Some(att) => ctx.schema.display_name(self.catalog, application, att, value),
            None => value.to_string(),
        };
        let mut assoc = TargetAssociation::new(
            Some(application),
            TargetKind::Attribute(attribute.to_string()),
            &name,
        );
        assoc.hierarchy = Some(role.name.clone());

        if ctx.options.index_classifications {
            let referenced = att
                .and_then(|a| a.schema_object_type.as_deref())
                .and_then(|t| self.catalog.find_node(application, t, value))
                .or_else(|| self.catalog.find_node_by_attribute(application, attribute, value));
            if let Some(node) = referenced {
                assoc.classifications = node.classifications.clone();
            }
        }
        assoc
    }

    /// Copy the persisted associations of the node `value` resolves to.
    /// Node associations are cached per (application, attribute, value) for
    /// the rest of the run.
    async fn add_indirect_targets(
        &self,
        ctx: &mut RunContext,
        bucket: &mut AssociationBucket,
        role: &Role,
        application: &str,
        att: &IndexedAttribute,
        value: &str,
    ) -> Result<(), IndexError> {
        let associations = match ctx.cached_associations(application, &att.name, value) {
            Some(cached) => cached.clone(),
            None => {
                let Some(object_type) = att.schema_object_type.as_deref() else {
                    return Ok(());
                };
                let Some(node) = self.catalog.find_node(application, object_type, value) else {
                    info!(
                        role = %role.name,
                        application,
                        attribute = %att.name,
                        value,
                        "Granted value not found in catalog"
                    );
                    ctx.stats.missing_objects += 1;
                    return Ok(());
                };

                let filter = CurrentFilter::all(ctx.options.index_unstructured_targets);
                let loaded =
                    storage::load_associations(self.db, &OwnerRef::node(&node.id), &filter).await?;
                ctx.cache_associations(application, &att.name, value, loaded.clone());
                loaded
            }
        };

        for assoc in &associations {
            let mut copy = assoc.copy_with_prefix(&role.name);
            copy.application = Some(application.to_string());
            bucket.add(copy);
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, K> RequiredAssociations for RoleTargetCompiler<'a, K>
where
    K: CatalogSource + ?Sized,
{
    type Owner = Role;

    fn owner_ref(&self, role: &Role) -> OwnerRef {
        OwnerRef::role(&role.name)
    }

    fn current_filter(&self, options: &IndexOptions) -> CurrentFilter {
        CurrentFilter::all(options.index_unstructured_targets)
    }

    async fn required(
        &self,
        ctx: &mut RunContext,
        role: &Role,
    ) -> Result<Vec<TargetAssociation>, IndexError> {
        self.compile(ctx, role).await
    }
}
