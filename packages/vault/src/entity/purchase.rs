use common::PurchaseStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One paid access to a resource. Rows are never deleted; a row only moves
/// from `Pending` to `Settled`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(indexed)]
    pub resource_id: Uuid,

    pub amount_minor_units: i64,
    pub currency: String,
    pub chain: String,
    pub network: String,

    /// Transaction reference from the settlement receipt.
    pub settlement_reference: Option<String>,
    pub payer: Option<String>,

    #[sea_orm(indexed)]
    pub status: PurchaseStatus,

    pub created_at: DateTimeUtc,
    pub settled_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
