use chrono::Utc;
use common::jobs::new_job_id;
use common::{ReplyTarget, ResourceStatus, VerificationJob};
use uuid::Uuid;
use worker::handlers::VerificationHandler;
use worker::runner::{JobContext, JobHandler, JobOutcome};

use crate::common::{REPLY_QUEUE, TestEnv, worker_config};

fn handler(env: &TestEnv) -> VerificationHandler {
    VerificationHandler::new(env.db.clone(), env.jobs.clone(), REPLY_QUEUE, worker_config())
}

fn job(post_id: &str, resource_id: &str, proof: &str, price: Option<&str>) -> VerificationJob {
    VerificationJob {
        job_id: new_job_id(),
        post_id: post_id.into(),
        author_id: "user-alice".into(),
        handle: "alice".into(),
        raw_text: format!("@proofgate_bot id:{resource_id} proof:{proof}"),
        resource_id: resource_id.into(),
        proof: proof.into(),
        price: price.map(str::to_string),
        timestamp: Utc::now(),
    }
}

const FIRST: JobContext = JobContext { attempt: 1 };

fn post_reply(env: &TestEnv, index: usize) -> (String, String) {
    let reply = &env.replies()[index];
    match &reply.target {
        ReplyTarget::Post { post_id } => (post_id.clone(), reply.text.clone()),
        other => panic!("expected a post reply, got {other:?}"),
    }
}

#[tokio::test]
async fn valid_proof_publishes_with_price_override() {
    let env = TestEnv::new().await;
    let (id, proof) = env.draft("dm-1", "premium").await;

    let outcome = handler(&env)
        .handle(&job("1790", &id.to_string(), &proof, Some("0.5")), FIRST)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Completed);

    let resource = env.resource(id).await;
    assert_eq!(resource.status, ResourceStatus::Published);
    assert!(resource.proof_used_at.is_some());
    assert_eq!(resource.price_minor_units, 50);
    assert_eq!(resource.social_post_id.as_deref(), Some("1790"));
    assert_eq!(
        resource.social_post_url.as_deref(),
        Some("https://x.com/alice/status/1790")
    );

    let (post_id, text) = post_reply(&env, 0);
    assert_eq!(post_id, "1790");
    assert!(text.contains("Pay $0.50 USDC"));
    assert!(text.contains(&format!("https://pay.example.com/api/v1/resources/{id}")));
}

#[tokio::test]
async fn default_price_applies_without_override() {
    let env = TestEnv::new().await;
    let (id, proof) = env.draft("dm-2", "standard").await;

    handler(&env)
        .handle(&job("1791", &id.to_string(), &proof, None), FIRST)
        .await
        .unwrap();

    assert_eq!(env.resource(id).await.price_minor_units, 20);
    assert!(post_reply(&env, 0).1.contains("Pay $0.20 USDC"));
}

#[tokio::test]
async fn wrong_proof_is_reported_and_leaves_draft() {
    let env = TestEnv::new().await;
    let (id, _proof) = env.draft("dm-3", "content").await;

    let outcome = handler(&env)
        .handle(
            &job("1792", &id.to_string(), "aaaa-bbbb-cccc-dddd", None),
            FIRST,
        )
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(env.resource(id).await.status, ResourceStatus::Draft);
    assert_eq!(
        post_reply(&env, 0).1,
        "Invalid proof. Please check your proof token."
    );
}

#[tokio::test]
async fn unknown_or_malformed_id_is_reported() {
    let env = TestEnv::new().await;
    let handler = handler(&env);

    handler
        .handle(
            &job("1793", &Uuid::now_v7().to_string(), "abcd-abcd-abcd-abcd", None),
            FIRST,
        )
        .await
        .unwrap();
    handler
        .handle(&job("1794", "not-a-uuid", "abcd-abcd-abcd-abcd", None), FIRST)
        .await
        .unwrap();

    let expected = "Invalid resource ID. Please check and try again.";
    assert_eq!(post_reply(&env, 0).1, expected);
    assert_eq!(post_reply(&env, 1).1, expected);
}

#[tokio::test]
async fn second_post_with_same_proof_is_rejected() {
    let env = TestEnv::new().await;
    let (id, proof) = env.draft("dm-4", "content").await;
    let handler = handler(&env);

    handler
        .handle(&job("1795", &id.to_string(), &proof, Some("1")), FIRST)
        .await
        .unwrap();
    handler
        .handle(&job("1796", &id.to_string(), &proof, Some("9")), FIRST)
        .await
        .unwrap();

    let resource = env.resource(id).await;
    assert_eq!(resource.social_post_id.as_deref(), Some("1795"));
    assert_eq!(resource.price_minor_units, 100);

    let (post_id, text) = post_reply(&env, 1);
    assert_eq!(post_id, "1796");
    assert_eq!(text, "This content is already published.");
}

#[tokio::test]
async fn redelivered_job_repeats_the_success_reply() {
    let env = TestEnv::new().await;
    let (id, proof) = env.draft("dm-5", "content").await;
    let handler = handler(&env);
    let job = job("1797", &id.to_string(), &proof, None);

    env.jobs.set_failing(true);
    assert!(handler.handle(&job, FIRST).await.is_err());
    assert_eq!(env.resource(id).await.status, ResourceStatus::Published);

    env.jobs.set_failing(false);
    let outcome = handler
        .handle(&job, JobContext { attempt: 2 })
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Completed);
    let (post_id, text) = post_reply(&env, 0);
    assert_eq!(post_id, "1797");
    assert!(text.starts_with("🔒 Paywalled Content!"));
}

#[tokio::test]
async fn concurrent_verifications_publish_once() {
    let env = TestEnv::new().await;
    let (id, proof) = env.draft("dm-6", "content").await;
    let handler = handler(&env);
    let a = job("1798", &id.to_string(), &proof, None);
    let b = job("1799", &id.to_string(), &proof, None);

    let (ra, rb) = tokio::join!(handler.handle(&a, FIRST), handler.handle(&b, FIRST));
    assert_eq!(ra.unwrap(), JobOutcome::Completed);
    assert_eq!(rb.unwrap(), JobOutcome::Completed);

    let texts: Vec<String> = env.replies().into_iter().map(|r| r.text).collect();
    assert_eq!(texts.len(), 2);
    assert_eq!(
        texts
            .iter()
            .filter(|t| t.starts_with("🔒 Paywalled Content!"))
            .count(),
        1
    );
    assert_eq!(
        texts
            .iter()
            .filter(|t| *t == "This content is already published.")
            .count(),
        1
    );
}
