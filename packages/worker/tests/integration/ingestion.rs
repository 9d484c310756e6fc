use chrono::Utc;
use common::jobs::new_job_id;
use common::{IngestionJob, ReplyTarget, ResourceStatus};
use vault::ProofVerifier;
use worker::handlers::IngestionHandler;
use worker::runner::{JobContext, JobHandler, JobOutcome};

use crate::common::{BOT_USERNAME, REPLY_QUEUE, TestEnv};

fn handler(env: &TestEnv) -> IngestionHandler {
    IngestionHandler::new(
        env.db.clone(),
        env.store.clone(),
        env.jobs.clone(),
        REPLY_QUEUE,
        BOT_USERNAME,
    )
}

fn job(message_id: &str, content: &str) -> IngestionJob {
    IngestionJob {
        job_id: new_job_id(),
        owner_id: "user-alice".into(),
        handle: "alice".into(),
        content: content.into(),
        source_platform: "twitter".into(),
        source_message_id: message_id.into(),
        content_type: None,
        price_minor_units: None,
        received_at: Utc::now(),
    }
}

const FIRST: JobContext = JobContext { attempt: 1 };

#[tokio::test]
async fn new_content_is_stored_and_owner_gets_proof() {
    let env = TestEnv::new().await;

    let outcome = handler(&env)
        .handle(&job("dm-1", "the secret recipe"), FIRST)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let replies = env.replies();
    assert_eq!(replies.len(), 1);
    let receipt = &replies[0];
    assert_eq!(
        receipt.target,
        ReplyTarget::DirectMessage {
            user_id: "user-alice".into()
        }
    );

    let id = receipt.resource_id.expect("receipt names the resource");
    let resource = env.resource(id).await;
    assert_eq!(resource.status, ResourceStatus::Draft);
    assert_eq!(resource.price_minor_units, 20);
    assert_eq!(env.store.open(&resource).unwrap(), b"the secret recipe");

    let proof = receipt
        .text
        .lines()
        .find_map(|l| l.strip_prefix("🔐 Proof: "))
        .expect("receipt carries the proof");
    assert!(
        receipt
            .text
            .contains(&format!("@{BOT_USERNAME} lock:0.2 id:{id} proof:{proof}"))
    );
    ProofVerifier::new(&env.db)
        .verify(id, proof)
        .await
        .expect("proof in the receipt is valid");
}

#[tokio::test]
async fn replayed_job_does_not_notify_twice() {
    let env = TestEnv::new().await;
    let handler = handler(&env);
    let job = job("dm-2", "hello");

    handler.handle(&job, FIRST).await.unwrap();
    let outcome = handler.handle(&job, FIRST).await.unwrap();

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(env.resource_count().await, 1);
    assert_eq!(env.replies().len(), 1);
}

#[tokio::test]
async fn retried_job_resends_the_same_proof() {
    let env = TestEnv::new().await;
    let handler = handler(&env);
    let job = job("dm-3", "hello");

    env.jobs.set_failing(true);
    assert!(handler.handle(&job, FIRST).await.is_err());
    assert_eq!(env.resource_count().await, 1);

    env.jobs.set_failing(false);
    let outcome = handler
        .handle(&job, JobContext { attempt: 2 })
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(env.resource_count().await, 1);

    let replies = env.replies();
    assert_eq!(replies.len(), 1);
    let id = replies[0].resource_id.unwrap();
    let proof = replies[0]
        .text
        .lines()
        .find_map(|l| l.strip_prefix("🔐 Proof: "))
        .unwrap();
    assert!(ProofVerifier::new(&env.db).verify(id, proof).await.is_ok());
}

#[tokio::test]
async fn invalid_content_is_not_retried() {
    let env = TestEnv::new().await;

    let outcome = handler(&env).handle(&job("dm-4", ""), FIRST).await.unwrap();

    assert!(matches!(outcome, JobOutcome::Unsuccessful(_)));
    assert_eq!(env.resource_count().await, 0);
    assert!(env.replies().is_empty());
}

#[tokio::test]
async fn submitted_price_is_kept() {
    let env = TestEnv::new().await;
    let mut job = job("api-1", "priced");
    job.source_platform = "api".into();
    job.price_minor_units = Some(150);

    handler(&env).handle(&job, FIRST).await.unwrap();

    let id = env.replies()[0].resource_id.unwrap();
    assert_eq!(env.resource(id).await.price_minor_units, 150);
}
