use common::ResourceStatus;
use sea_orm::EntityTrait;
use uuid::Uuid;
use vault::entity::resource;
use vault::proof::{ConsumeOutcome, ProofError, ProofRejection, ProofVerifier, Publication};

use crate::common::{seed_draft, setup_db};

fn publication(post_id: &str) -> Publication {
    Publication {
        post_id: post_id.into(),
        post_url: Some(format!("https://x.com/alice/status/{post_id}")),
        price_override_minor_units: None,
    }
}

fn rejection(err: ProofError) -> ProofRejection {
    match err {
        ProofError::Rejected(r) => r,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_token_then_right_token_then_replay() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let verifier = ProofVerifier::new(&db);

    let err = verifier
        .publish(id, "dead-beef-dead-beef", &publication("p1"))
        .await
        .unwrap_err();
    assert_eq!(rejection(err), ProofRejection::InvalidToken);

    let row = resource::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();
    assert_eq!(row.status, ResourceStatus::Draft);

    let published = verifier.publish(id, &token, &publication("p1")).await.unwrap();
    assert_eq!(published.status, ResourceStatus::Published);
    assert!(published.proof_used_at.is_some());
    assert_eq!(published.social_post_id.as_deref(), Some("p1"));
    assert_eq!(
        published.social_post_url.as_deref(),
        Some("https://x.com/alice/status/p1")
    );

    let err = verifier.verify(id, &token).await.unwrap_err();
    assert_eq!(rejection(err), ProofRejection::AlreadyUsed);
}

#[tokio::test]
async fn verify_is_read_only() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let verifier = ProofVerifier::new(&db);

    verifier.verify(id, &token).await.unwrap();
    verifier.verify(id, &token).await.unwrap();

    let row = resource::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();
    assert_eq!(row.status, ResourceStatus::Draft);
    assert!(row.proof_used_at.is_none());
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let db = setup_db().await;
    let err = ProofVerifier::new(&db)
        .verify(Uuid::now_v7(), "aaaa-bbbb-cccc-dddd")
        .await
        .unwrap_err();
    assert_eq!(rejection(err), ProofRejection::NotFound);
}

#[tokio::test]
async fn second_consume_of_same_verification_loses() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let verifier = ProofVerifier::new(&db);

    let a = verifier.verify(id, &token).await.unwrap();
    let b = verifier.verify(id, &token).await.unwrap();

    assert!(matches!(
        verifier.consume(&a, &publication("p1")).await.unwrap(),
        ConsumeOutcome::Published(_)
    ));
    assert!(matches!(
        verifier.consume(&b, &publication("p2")).await.unwrap(),
        ConsumeOutcome::Lost
    ));

    let row = resource::Entity::find_by_id(id).one(&db).await.unwrap().unwrap();
    assert_eq!(row.social_post_id.as_deref(), Some("p1"));
}

#[tokio::test]
async fn concurrent_publish_has_exactly_one_winner() {
    let db = setup_db().await;
    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let verifier = ProofVerifier::new(&db);

    let (p1, p2) = (publication("p1"), publication("p2"));
    let (first, second) = tokio::join!(
        verifier.publish(id, &token, &p1),
        verifier.publish(id, &token, &p2),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = outcomes.into_iter().find(|r| r.is_err()).unwrap();
    assert_eq!(rejection(loser.unwrap_err()), ProofRejection::AlreadyUsed);
}

#[tokio::test]
async fn price_override_applies_only_when_positive() {
    let db = setup_db().await;
    let verifier = ProofVerifier::new(&db);

    let (id, token) = seed_draft(&db, "m1", "secret").await;
    let mut with_price = publication("p1");
    with_price.price_override_minor_units = Some(50);
    let published = verifier.publish(id, &token, &with_price).await.unwrap();
    assert_eq!(published.price_minor_units, 50);

    let (id, token) = seed_draft(&db, "m2", "secret").await;
    let mut zero = publication("p2");
    zero.price_override_minor_units = Some(0);
    let published = verifier.publish(id, &token, &zero).await.unwrap();
    assert_eq!(published.price_minor_units, 20);
}
