use std::time::Duration;

use chrono::Utc;
use common::PurchaseStatus;
use common::config::DlqConfig;
use common::dlq::{DlqErrorCode, DlqMessageType};
use sea_orm::sea_query::LockType;
use sea_orm::{DatabaseConnection, EntityTrait, QuerySelect, TransactionTrait};
use tracing::{debug, error, info};
use uuid::Uuid;
use vault::PurchaseLedger;
use vault::entity::purchase;

use super::DlqService;

/// Purchases read per page of a scan.
const SCAN_BATCH: u64 = 500;

/// Periodically dead-letter purchases that were verified but never settled.
pub async fn run_stuck_purchase_detector(db: DatabaseConnection, config: DlqConfig) {
    let scan_interval = Duration::from_secs(config.stuck_purchase_scan_interval_secs);

    info!(
        timeout_secs = config.stuck_purchase_timeout_secs,
        scan_interval_secs = config.stuck_purchase_scan_interval_secs,
        "Starting stuck purchase detector"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = detect_stuck_purchases(&db, &config).await {
            error!(error = %e, "Stuck purchase detection failed");
        }
    }
}

/// One scan. Returns how many new DLQ entries were created.
pub async fn detect_stuck_purchases(
    db: &DatabaseConnection,
    config: &DlqConfig,
) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - chrono::Duration::seconds(config.stuck_purchase_timeout_secs as i64);

    let ledger = PurchaseLedger::new(db);
    let dlq = DlqService::new(db);
    let mut after = None;
    let mut created = 0;

    // Escalated purchases stay pending, so page past them instead of
    // rescanning the same head of the table.
    loop {
        let page = ledger.pending_before(cutoff, after, SCAN_BATCH).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        let full = page.len() as u64 == SCAN_BATCH;

        let ids: Vec<String> = page.iter().map(|p| message_id(p.id)).collect();
        let escalated = dlq.existing_message_ids(&ids).await?;

        for purchase in page {
            if escalated.contains(&message_id(purchase.id)) {
                continue;
            }
            match handle_stuck_purchase(db, purchase.id, config).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(purchase_id = %purchase.id, error = %e, "Failed to handle stuck purchase")
                }
            }
        }

        if !full {
            break;
        }
    }

    if created > 0 {
        info!(created, "Moved stuck purchases to DLQ");
    } else {
        debug!("No new stuck purchases");
    }
    Ok(created)
}

fn message_id(purchase_id: Uuid) -> String {
    format!("stuck-purchase-{purchase_id}")
}

async fn handle_stuck_purchase(
    db: &DatabaseConnection,
    purchase_id: Uuid,
    config: &DlqConfig,
) -> anyhow::Result<bool> {
    let txn = db.begin().await?;

    let purchase = purchase::Entity::find_by_id(purchase_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let Some(purchase) = purchase else {
        txn.rollback().await?;
        return Ok(false);
    };

    if purchase.status != PurchaseStatus::Pending {
        txn.rollback().await?;
        return Ok(false);
    }

    let dlq = DlqService::new(&txn);
    let message_id = message_id(purchase.id);

    // Resolved entries count too: an operator already looked at it.
    if dlq.get_by_message_id(&message_id).await?.is_some() {
        txn.rollback().await?;
        return Ok(false);
    }

    let payload = serde_json::json!({
        "purchase_id": purchase.id,
        "resource_id": purchase.resource_id,
        "amount_minor_units": purchase.amount_minor_units,
        "currency": purchase.currency,
        "chain": purchase.chain,
        "network": purchase.network,
        "created_at": purchase.created_at,
    });

    dlq.create_entry(
        message_id,
        DlqMessageType::Purchase,
        Some(purchase.resource_id),
        payload,
        DlqErrorCode::StuckPurchase,
        format!(
            "Purchase pending for over {} seconds without settlement",
            config.stuck_purchase_timeout_secs
        ),
    )
    .await?;

    txn.commit().await?;

    info!(purchase_id = %purchase.id, resource_id = %purchase.resource_id, "Moved stuck purchase to DLQ");

    Ok(true)
}
