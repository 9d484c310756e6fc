use chrono::{Duration, Utc};
use common::PurchaseStatus;
use sea_orm::EntityTrait;
use vault::entity::resource;
use vault::proof::{ProofVerifier, Publication};
use vault::purchase::{NewPurchase, PurchaseLedger, SettlementRecord};

use crate::common::{seed_draft, setup_db};

fn purchase_of(resource: &resource::Model) -> NewPurchase {
    NewPurchase {
        resource_id: resource.id,
        amount_minor_units: resource.price_minor_units,
        currency: resource.currency.clone(),
        chain: resource.chain.clone(),
        network: "solana-devnet".into(),
    }
}

#[tokio::test]
async fn pending_purchase_bumps_counters_then_settles() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let published = ProofVerifier::new(&db)
        .publish(
            id,
            &token,
            &Publication {
                post_id: "p1".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ledger = PurchaseLedger::new(&db);
    let purchase = ledger.record_pending(purchase_of(&published)).await.unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Pending);

    let row = resource::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();
    assert_eq!(row.purchase_count, 1);
    assert_eq!(row.revenue_minor_units, 20);

    let settled = ledger
        .mark_settled(
            purchase.id,
            SettlementRecord {
                reference: Some("tx-1".into()),
                payer: Some("buyer".into()),
            },
        )
        .await
        .unwrap();
    assert!(settled);

    let again = ledger
        .mark_settled(purchase.id, SettlementRecord::default())
        .await
        .unwrap();
    assert!(!again);

    let rows = ledger.for_resource(id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, PurchaseStatus::Settled);
    assert_eq!(rows[0].settlement_reference.as_deref(), Some("tx-1"));
}

#[tokio::test]
async fn draft_resources_cannot_be_bought() {
    let db = setup_db().await;
    let (id, _) = seed_draft(&db, "m1", "secret").await;
    let draft = resource::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();

    let ledger = PurchaseLedger::new(&db);
    assert!(ledger.record_pending(purchase_of(&draft)).await.is_err());
    assert!(ledger.for_resource(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_before_finds_only_old_pending_rows() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let published = ProofVerifier::new(&db)
        .publish(
            id,
            &token,
            &Publication {
                post_id: "p1".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ledger = PurchaseLedger::new(&db);
    let pending = ledger.record_pending(purchase_of(&published)).await.unwrap();
    let settled = ledger.record_pending(purchase_of(&published)).await.unwrap();
    ledger
        .mark_settled(settled.id, SettlementRecord::default())
        .await
        .unwrap();

    let future = Utc::now() + Duration::minutes(1);
    let stuck = ledger.pending_before(future, None, 10).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, pending.id);

    let past = Utc::now() - Duration::minutes(1);
    assert!(ledger.pending_before(past, None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_before_pages_by_id() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let published = ProofVerifier::new(&db)
        .publish(
            id,
            &token,
            &Publication {
                post_id: "p1".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ledger = PurchaseLedger::new(&db);
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(ledger.record_pending(purchase_of(&published)).await.unwrap().id);
    }

    let future = Utc::now() + Duration::minutes(1);
    let first = ledger.pending_before(future, None, 2).await.unwrap();
    let second = ledger
        .pending_before(future, Some(first[1].id), 2)
        .await
        .unwrap();
    let third = ledger
        .pending_before(future, Some(second[1].id), 2)
        .await
        .unwrap();

    let paged: Vec<_> = first.iter().chain(&second).chain(&third).map(|p| p.id).collect();
    assert_eq!(paged, ids);
}
