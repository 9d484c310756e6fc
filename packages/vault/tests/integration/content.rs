use std::time::Duration;

use common::ResourceStatus;
use sea_orm::{ConnectOptions, Database, EntityTrait, PaginatorTrait, TransactionTrait};
use uuid::Uuid;
use vault::content::ContentError;
use vault::entity::resource;

use crate::common::{new_content, setup_db, store};

#[tokio::test]
async fn store_creates_draft_with_defaults() {
    let db = setup_db().await;
    let stored = store()
        .store(&db, new_content("m1", "hello buyers"))
        .await
        .unwrap();

    assert!(stored.is_new);

    let row = resource::Entity::find_by_id(stored.resource_id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ResourceStatus::Draft);
    assert_eq!(row.price_minor_units, 20);
    assert_eq!(row.currency, "USDC");
    assert_eq!(row.chain, "solana");
    assert_eq!(row.content_type, "text/plain");
    assert_eq!(row.source_platform, "twitter");
    assert_eq!(row.source_message_id, "m1");
    assert!(row.proof_used_at.is_none());
    assert_eq!(row.iv.len(), 12);
    assert_eq!(row.auth_tag.len(), 16);
    assert_ne!(row.ciphertext, b"hello buyers".to_vec());
    assert_ne!(row.proof_hash, stored.proof_token);
}

#[tokio::test]
async fn duplicate_source_message_returns_original() {
    let db = setup_db().await;
    let first = store().store(&db, new_content("m1", "one")).await.unwrap();
    let second = store()
        .store(&db, new_content("m1", "something else"))
        .await
        .unwrap();

    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.resource_id, second.resource_id);
    assert_eq!(first.proof_token, second.proof_token);
    assert_eq!(resource::Entity::find().count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn same_message_id_on_other_platform_is_distinct() {
    let db = setup_db().await;
    let mut other = new_content("m1", "body");
    other.source_platform = "api".into();

    let a = store().store(&db, new_content("m1", "body")).await.unwrap();
    let b = store().store(&db, other).await.unwrap();

    assert!(a.is_new && b.is_new);
    assert_ne!(a.resource_id, b.resource_id);
}

#[tokio::test]
async fn separator_in_platform_does_not_alias_another_source() {
    let db = setup_db().await;
    let mut first = new_content("z", "alice's draft");
    first.source_platform = "x:y".into();
    let mut second = new_content("y:z", "mallory's draft");
    second.source_platform = "x".into();
    second.owner_id = "user-2".into();
    second.owner_handle = "mallory".into();

    let a = store().store(&db, first).await.unwrap();
    let b = store().store(&db, second).await.unwrap();

    assert!(a.is_new && b.is_new);
    assert_ne!(a.resource_id, b.resource_id);
    assert_ne!(a.proof_token, b.proof_token);
    assert_eq!(resource::Entity::find().count(&db).await.unwrap(), 2);
}

#[tokio::test]
async fn insert_race_on_same_source_returns_winner() {
    let path = std::env::temp_dir().join(format!("proofgate-race-{}.db", Uuid::now_v7()));
    let mut opt = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    opt.max_connections(2).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    vault::database::sync_schema(&db).await.unwrap();

    // The winner's row stays uncommitted until the loser has passed its lookup.
    let txn = db.begin().await.unwrap();
    let winner = store()
        .store(&txn, new_content("m-race", "first"))
        .await
        .unwrap();

    let loser_store = store();
    let (loser, committed) = tokio::join!(
        loser_store.store(&db, new_content("m-race", "second")),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            txn.commit().await
        }
    );
    committed.unwrap();
    let loser = loser.unwrap();

    assert!(winner.is_new);
    assert!(!loser.is_new);
    assert_eq!(winner.resource_id, loser.resource_id);
    assert_eq!(winner.proof_token, loser.proof_token);
    assert_eq!(resource::Entity::find().count(&db).await.unwrap(), 1);

    drop(db);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn open_round_trips_plaintext() {
    let db = setup_db().await;
    let body = "multi-line\nbody with ünïcode";
    let stored = store().store(&db, new_content("m2", body)).await.unwrap();

    let row = store()
        .find(&db, stored.resource_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store().open(&row).unwrap(), body.as_bytes());
}

#[tokio::test]
async fn open_detects_hash_mismatch() {
    let db = setup_db().await;
    let stored = store().store(&db, new_content("m3", "body")).await.unwrap();
    let mut row = store()
        .find(&db, stored.resource_id)
        .await
        .unwrap()
        .unwrap();

    row.content_hash = "00".repeat(32);
    assert!(matches!(store().open(&row), Err(ContentError::Corrupted)));
}

#[tokio::test]
async fn open_detects_tampered_ciphertext() {
    let db = setup_db().await;
    let stored = store().store(&db, new_content("m4", "body")).await.unwrap();
    let mut row = store()
        .find(&db, stored.resource_id)
        .await
        .unwrap()
        .unwrap();

    row.ciphertext[0] ^= 0x01;
    assert!(matches!(store().open(&row), Err(ContentError::Corrupted)));
}

#[tokio::test]
async fn rejects_invalid_input() {
    let db = setup_db().await;

    let empty = new_content("m5", "");
    assert!(matches!(
        store().store(&db, empty).await,
        Err(ContentError::Validation(_))
    ));

    let mut free = new_content("m6", "body");
    free.price_minor_units = Some(0);
    assert!(matches!(
        store().store(&db, free).await,
        Err(ContentError::Validation(_))
    ));

    assert_eq!(resource::Entity::find().count(&db).await.unwrap(), 0);
}
