use chrono::{DateTime, Utc};
use common::{PurchaseStatus, ResourceStatus};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionSession, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

use crate::entity::{purchase, resource};

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub resource_id: Uuid,
    pub amount_minor_units: i64,
    pub currency: String,
    pub chain: String,
    pub network: String,
}

/// Settlement details reported by the payment facilitator.
#[derive(Debug, Clone, Default)]
pub struct SettlementRecord {
    pub reference: Option<String>,
    pub payer: Option<String>,
}

/// Append-only purchase ledger plus the per-resource counters.
pub struct PurchaseLedger<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PurchaseLedger<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Move a pending purchase to settled. Returns `false` when it was not
    /// pending anymore.
    pub async fn mark_settled(
        &self,
        purchase_id: Uuid,
        settlement: SettlementRecord,
    ) -> Result<bool, DbErr> {
        let result = purchase::Entity::update_many()
            .set(purchase::ActiveModel {
                status: Set(PurchaseStatus::Settled),
                settlement_reference: Set(settlement.reference),
                payer: Set(settlement.payer),
                settled_at: Set(Some(Utc::now())),
                ..Default::default()
            })
            .filter(purchase::Column::Id.eq(purchase_id))
            .filter(purchase::Column::Status.eq(PurchaseStatus::Pending))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Pending purchases created before `cutoff`, in id order, starting
    /// after the `after` id. Ids are time ordered.
    pub async fn pending_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<purchase::Model>, DbErr> {
        let mut query = purchase::Entity::find()
            .filter(purchase::Column::Status.eq(PurchaseStatus::Pending))
            .filter(purchase::Column::CreatedAt.lt(cutoff));
        if let Some(after) = after {
            query = query.filter(purchase::Column::Id.gt(after));
        }
        query
            .order_by_asc(purchase::Column::Id)
            .limit(limit)
            .all(self.conn)
            .await
    }

    pub async fn for_resource(&self, resource_id: Uuid) -> Result<Vec<purchase::Model>, DbErr> {
        purchase::Entity::find()
            .filter(purchase::Column::ResourceId.eq(resource_id))
            .order_by_asc(purchase::Column::CreatedAt)
            .all(self.conn)
            .await
    }
}

impl<C: ConnectionTrait + TransactionTrait> PurchaseLedger<'_, C> {
    /// Insert a pending purchase and bump the resource counters in one
    /// transaction. Fails if the resource is gone or not published.
    pub async fn record_pending(&self, new: NewPurchase) -> Result<purchase::Model, DbErr> {
        let txn = self.conn.begin().await?;
        let now = Utc::now();

        let bumped = resource::Entity::update_many()
            .col_expr(
                resource::Column::PurchaseCount,
                Expr::col(resource::Column::PurchaseCount).add(1),
            )
            .col_expr(
                resource::Column::RevenueMinorUnits,
                Expr::col(resource::Column::RevenueMinorUnits).add(new.amount_minor_units),
            )
            .col_expr(resource::Column::UpdatedAt, Expr::value(now))
            .filter(resource::Column::Id.eq(new.resource_id))
            .filter(resource::Column::Status.eq(ResourceStatus::Published))
            .exec(&txn)
            .await?;

        if bumped.rows_affected == 0 {
            txn.rollback().await?;
            return Err(DbErr::RecordNotFound(format!(
                "published resource {}",
                new.resource_id
            )));
        }

        let inserted = purchase::ActiveModel {
            id: Set(Uuid::now_v7()),
            resource_id: Set(new.resource_id),
            amount_minor_units: Set(new.amount_minor_units),
            currency: Set(new.currency),
            chain: Set(new.chain),
            network: Set(new.network),
            settlement_reference: Set(None),
            payer: Set(None),
            status: Set(PurchaseStatus::Pending),
            created_at: Set(now),
            settled_at: Set(None),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            resource_id = %inserted.resource_id,
            purchase_id = %inserted.id,
            amount_minor_units = inserted.amount_minor_units,
            "Purchase recorded as pending"
        );
        Ok(inserted)
    }
}
