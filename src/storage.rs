use crate::entities;
use crate::errors::IndexError;
use crate::index::association::{OwnerKind, OwnerRef, TargetAssociation, TargetKind};
use crate::index::bucket::Reconciliation;
use crate::index::CurrentFilter;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, IntoActiveModel, NotSet, QueryFilter, QueryOrder, Set,
};

/// Source recorded on effective classifications promoted by the indexer.
pub const CLASSIFICATION_SOURCE_TASK: &str = "task";

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, IndexError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

fn to_association(
    model: entities::target_association::Model,
) -> Result<TargetAssociation, IndexError> {
    let kind = OwnerKind::parse(&model.owner_kind).ok_or_else(|| {
        IndexError::Other(format!(
            "unknown owner kind `{}` on association {}",
            model.owner_kind, model.id
        ))
    })?;
    let classifications = match model.classifications.as_deref() {
        Some(json) if !json.is_empty() => serde_json::from_str(json)?,
        _ => Vec::new(),
    };

    Ok(TargetAssociation {
        id: Some(model.id),
        owner: Some(OwnerRef {
            kind,
            id: model.owner_id,
        }),
        application: model.application,
        kind: TargetKind::from_columns(&model.target_kind, &model.target_type)?,
        target_name: model.target_name,
        rights: model.rights,
        hierarchy: model.hierarchy,
        flattened: model.flattened != 0,
        classifications,
    })
}

fn classifications_json(assoc: &TargetAssociation) -> Result<Option<String>, IndexError> {
    if assoc.classifications.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(&assoc.classifications)?))
    }
}

/// Load the persisted associations of one owner, in insertion order.
pub async fn load_associations<C: ConnectionTrait>(
    db: &C,
    owner: &OwnerRef,
    filter: &CurrentFilter,
) -> Result<Vec<TargetAssociation>, IndexError> {
    use entities::target_association::{Column, Entity};

    let mut query = Entity::find()
        .filter(Column::OwnerKind.eq(owner.kind.as_str()))
        .filter(Column::OwnerId.eq(owner.id.as_str()));

    if let Some(flattened) = filter.flattened {
        query = query.filter(Column::Flattened.eq(if flattened { 1 } else { 0 }));
    }
    if !filter.include_unstructured {
        query = query.filter(Column::TargetKind.ne(TargetKind::Unstructured.kind_str()));
    }

    let models = query.order_by_asc(Column::Id).all(db).await?;
    models.into_iter().map(to_association).collect()
}

/// Insert a new association. The owner must already be set.
pub async fn insert_association<C: ConnectionTrait>(
    db: &C,
    assoc: &TargetAssociation,
) -> Result<i64, IndexError> {
    let owner = assoc.owner.as_ref().ok_or_else(|| {
        IndexError::Configuration(format!(
            "association for {} has no owner",
            assoc.describe()
        ))
    })?;

    let model = entities::target_association::ActiveModel {
        id: NotSet,
        owner_kind: Set(owner.kind.as_str().to_string()),
        owner_id: Set(owner.id.clone()),
        application: Set(assoc.application.clone()),
        target_kind: Set(assoc.kind.kind_str().to_string()),
        target_type: Set(assoc.kind.type_name().to_string()),
        target_name: Set(assoc.target_name.clone()),
        rights: Set(assoc.rights.clone()),
        hierarchy: Set(assoc.hierarchy.clone()),
        flattened: Set(if assoc.flattened { 1 } else { 0 }),
        classifications: Set(classifications_json(assoc)?),
    };

    let result = model.insert(db).await?;
    Ok(result.id)
}

/// Rewrite the mutable content of a persisted association.
pub async fn update_association<C: ConnectionTrait>(
    db: &C,
    assoc: &TargetAssociation,
) -> Result<(), IndexError> {
    use entities::target_association::Entity;

    let Some(id) = assoc.id else {
        return Err(IndexError::Other(format!(
            "cannot update unsaved association for {}",
            assoc.describe()
        )));
    };

    if let Some(model) = Entity::find_by_id(id).one(db).await? {
        let mut active = model.into_active_model();
        active.rights = Set(assoc.rights.clone());
        active.hierarchy = Set(assoc.hierarchy.clone());
        active.flattened = Set(if assoc.flattened { 1 } else { 0 });
        active.classifications = Set(classifications_json(assoc)?);
        active.update(db).await?;
    }

    Ok(())
}

pub async fn delete_association<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), IndexError> {
    use entities::target_association::Entity;

    Entity::delete_by_id(id).exec(db).await?;
    Ok(())
}

/// Write the outcome of a reconciliation: inserts, updates, then deletes of
/// stale records and duplicates.
pub async fn apply_reconciliation<C: ConnectionTrait>(
    db: &C,
    rec: &Reconciliation,
) -> Result<(), IndexError> {
    for assoc in &rec.created {
        insert_association(db, assoc).await?;
    }
    for assoc in &rec.updated {
        update_association(db, assoc).await?;
    }
    for assoc in rec.removed.iter().chain(&rec.duplicates) {
        if let Some(id) = assoc.id {
            delete_association(db, id).await?;
        }
    }
    Ok(())
}

/// Delete every association of one owner, regardless of kind.
pub async fn delete_owner_associations<C: ConnectionTrait>(
    db: &C,
    owner: &OwnerRef,
) -> Result<u64, IndexError> {
    use entities::target_association::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::OwnerKind.eq(owner.kind.as_str()))
        .filter(Column::OwnerId.eq(owner.id.as_str()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// Delete the associations of every owner of one kind. Unstructured records
/// gathered by the collector (not flattened copies) survive a node reset,
/// since indexing can't recreate them.
pub async fn reset_associations<C: ConnectionTrait>(
    db: &C,
    kind: OwnerKind,
) -> Result<u64, IndexError> {
    use entities::target_association::{Column, Entity};

    let mut delete = Entity::delete_many().filter(Column::OwnerKind.eq(kind.as_str()));
    if kind == OwnerKind::Node {
        delete = delete.filter(
            Condition::any()
                .add(Column::TargetKind.ne(TargetKind::Unstructured.kind_str()))
                .add(Column::Flattened.eq(1)),
        );
    }

    let result = delete.exec(db).await?;
    Ok(result.rows_affected)
}

/// Associations of the given target name, optionally restricted to one
/// owner kind. Answers "which roles grant access to T".
pub async fn find_target_owners<C: ConnectionTrait>(
    db: &C,
    target_name: &str,
    owner_kind: Option<OwnerKind>,
) -> Result<Vec<TargetAssociation>, IndexError> {
    use entities::target_association::{Column, Entity};

    let mut query = Entity::find().filter(Column::TargetName.eq(target_name));
    if let Some(kind) = owner_kind {
        query = query.filter(Column::OwnerKind.eq(kind.as_str()));
    }

    let models = query
        .order_by_asc(Column::OwnerKind)
        .order_by_asc(Column::OwnerId)
        .order_by_asc(Column::Id)
        .all(db)
        .await?;
    models.into_iter().map(to_association).collect()
}

// Effective classifications

pub async fn add_effective_classification<C: ConnectionTrait>(
    db: &C,
    owner: &OwnerRef,
    classification: &str,
    source: &str,
) -> Result<(), IndexError> {
    use entities::effective_classification::{ActiveModel, Column, Entity};
    use sea_orm::sea_query::OnConflict;

    let model = ActiveModel {
        id: NotSet,
        owner_kind: Set(owner.kind.as_str().to_string()),
        owner_id: Set(owner.id.clone()),
        classification: Set(classification.to_string()),
        source: Set(source.to_string()),
        created_at: Set(Utc::now().timestamp()),
    };

    Entity::insert(model)
        .on_conflict(
            OnConflict::columns([Column::OwnerKind, Column::OwnerId, Column::Classification])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Drop the classifications one source promoted onto an owner.
pub async fn clear_effective_classifications<C: ConnectionTrait>(
    db: &C,
    owner: &OwnerRef,
    source: &str,
) -> Result<u64, IndexError> {
    use entities::effective_classification::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::OwnerKind.eq(owner.kind.as_str()))
        .filter(Column::OwnerId.eq(owner.id.as_str()))
        .filter(Column::Source.eq(source))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

/// Drop the classifications one source promoted onto every owner of a kind.
pub async fn reset_effective_classifications<C: ConnectionTrait>(
    db: &C,
    kind: OwnerKind,
    source: &str,
) -> Result<u64, IndexError> {
    use entities::effective_classification::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::OwnerKind.eq(kind.as_str()))
        .filter(Column::Source.eq(source))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

pub async fn get_effective_classifications<C: ConnectionTrait>(
    db: &C,
    owner: &OwnerRef,
) -> Result<Vec<String>, IndexError> {
    use entities::effective_classification::{Column, Entity};

    let models = Entity::find()
        .filter(Column::OwnerKind.eq(owner.kind.as_str()))
        .filter(Column::OwnerId.eq(owner.id.as_str()))
        .order_by_asc(Column::Classification)
        .all(db)
        .await?;

    Ok(models.into_iter().map(|m| m.classification).collect())
}
