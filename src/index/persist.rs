use std::collections::BTreeSet;

use sea_orm::{DatabaseConnection, TransactionTrait};

use crate::errors::IndexError;
use crate::index::association::{OwnerRef, TargetAssociation};
use crate::index::bucket::{AssociationBucket, Reconciliation};
use crate::index::context::RunContext;
use crate::index::{CurrentFilter, RequiredAssociations};
use crate::storage;

/// Reconcile `required` against the owner's current records and commit the
/// result as one transaction. With classification promotion on, the tags of
/// every required record become effective classifications of the owner;
/// `clean_classifications` first drops the ones promoted earlier.
pub async fn commit_owner(
    db: &DatabaseConnection,
    ctx: &mut RunContext,
    owner: &OwnerRef,
    filter: CurrentFilter,
    required: Vec<TargetAssociation>,
    clean_classifications: bool,
) -> Result<Reconciliation, IndexError> {
    let promote = ctx.options.promote_classifications;
    let promoted: BTreeSet<String> = if promote && ctx.options.index_classifications {
        required
            .iter()
            .flat_map(|a| a.classifications.iter().cloned())
            .collect()
    } else {
        BTreeSet::new()
    };

    let txn = db.begin().await?;

    let current = storage::load_associations(&txn, owner, &filter).await?;
    let bucket = AssociationBucket::new(Some(owner.clone()), current);
    let rec = bucket.reconcile(required, ctx.options.index_classifications)?;
    storage::apply_reconciliation(&txn, &rec).await?;

    if promote {
        if clean_classifications {
            storage::clear_effective_classifications(
                &txn,
                owner,
                storage::CLASSIFICATION_SOURCE_TASK,
            )
            .await?;
        }
        for name in &promoted {
            storage::add_effective_classification(
                &txn,
                owner,
                name,
                storage::CLASSIFICATION_SOURCE_TASK,
            )
            .await?;
        }
    }

    txn.commit().await?;

    ctx.stats.record(&rec);
    Ok(rec)
}

/// Drop every record of an owner that no longer grants anything, along with
/// its promoted classifications, in one transaction. Returns the number of
/// records removed.
pub async fn clear_owner(
    db: &DatabaseConnection,
    ctx: &mut RunContext,
    owner: &OwnerRef,
) -> Result<u64, IndexError> {
    let txn = db.begin().await?;
    let removed = storage::delete_owner_associations(&txn, owner).await?;
    if ctx.options.promote_classifications {
        storage::clear_effective_classifications(&txn, owner, storage::CLASSIFICATION_SOURCE_TASK)
            .await?;
    }
    txn.commit().await?;

    ctx.stats.targets_removed += removed;
    Ok(removed)
}

/// Compute an owner's required set with `producer` and commit it.
pub async fn index_owner<P>(
    db: &DatabaseConnection,
    ctx: &mut RunContext,
    producer: &P,
    owner: &P::Owner,
    clean_classifications: bool,
) -> Result<Reconciliation, IndexError>
where
    P: RequiredAssociations + Sync,
{
    let owner_ref = producer.owner_ref(owner);
    let filter = producer.current_filter(&ctx.options);
    let required = producer.required(ctx, owner).await?;
    commit_owner(db, ctx, &owner_ref, filter, required, clean_classifications).await
}
