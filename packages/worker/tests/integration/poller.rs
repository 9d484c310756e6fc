use std::sync::Arc;

use common::VerificationJob;
use mq::MemoryJobSink;
use worker::dedup::{DedupStore, DedupTracker, MemoryDedupStore};
use worker::poller::{MentionPoller, PollReport};
use worker::social::SocialError;

use crate::common::{BOT_USER_ID, FakeSocial, VERIFICATION_QUEUE, mention, secs};

struct Harness {
    social: Arc<FakeSocial>,
    dedup: Arc<MemoryDedupStore>,
    jobs: Arc<MemoryJobSink>,
    poller: MentionPoller,
}

fn harness() -> Harness {
    let social = FakeSocial::new();
    let dedup = Arc::new(MemoryDedupStore::new(secs(7 * 86_400)));
    let jobs = Arc::new(MemoryJobSink::new());
    let poller = MentionPoller::new(
        social.clone(),
        DedupTracker::new(dedup.clone()),
        jobs.clone(),
        VERIFICATION_QUEUE,
        BOT_USER_ID,
    );
    Harness {
        social,
        dedup,
        jobs,
        poller,
    }
}

#[tokio::test]
async fn actionable_mention_becomes_verification_job() {
    let mut h = harness();
    h.social.push_page(
        vec![mention(
            "1790",
            Some("alice"),
            "@proofgate_bot lock:0.5 id:0190aaaa-0000-7000-8000-000000000001 proof:ab12-cd34-ef56-7890",
        )],
        Some("1790"),
    );

    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(
        report,
        PollReport {
            fetched: 1,
            enqueued: 1,
            ..Default::default()
        }
    );
    let jobs: Vec<VerificationJob> = h.jobs.jobs(VERIFICATION_QUEUE);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].post_id, "1790");
    assert_eq!(jobs[0].handle, "alice");
    assert_eq!(jobs[0].author_id, "user-alice");
    assert_eq!(jobs[0].resource_id, "0190aaaa-0000-7000-8000-000000000001");
    assert_eq!(jobs[0].proof, "ab12-cd34-ef56-7890");
    assert_eq!(jobs[0].price.as_deref(), Some("0.5"));
    assert!(h.dedup.is_handled("1790").await.unwrap());
    assert_eq!(h.poller.since_id(), Some("1790"));
}

#[tokio::test]
async fn mention_seen_twice_is_queued_once() {
    let mut h = harness();
    let m = mention("1791", Some("alice"), "@proofgate_bot id:abc proof:def");
    h.social.push_page(vec![m.clone()], Some("1791"));
    h.social.push_page(vec![m], Some("1791"));

    h.poller.poll_once().await.unwrap();
    let second = h.poller.poll_once().await.unwrap();

    assert_eq!(second.already_handled, 1);
    assert_eq!(second.enqueued, 0);
    assert_eq!(h.jobs.len(VERIFICATION_QUEUE), 1);
    assert_eq!(
        *h.social.since_ids.lock().unwrap(),
        vec![None, Some("1791".to_string())]
    );
}

#[tokio::test]
async fn non_actionable_mention_is_marked_and_dropped() {
    let mut h = harness();
    h.social.push_page(
        vec![
            mention("1792", Some("bob"), "@proofgate_bot how does this work?"),
            mention("1793", Some("bob"), "@proofgate_bot id:abc but no proof"),
        ],
        Some("1793"),
    );

    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(report.ignored, 2);
    assert_eq!(h.jobs.len(VERIFICATION_QUEUE), 0);
    assert!(h.dedup.is_handled("1792").await.unwrap());
    assert!(h.dedup.is_handled("1793").await.unwrap());
}

#[tokio::test]
async fn unresolved_author_is_left_unhandled() {
    let mut h = harness();
    h.social.push_page(
        vec![mention("1794", None, "@proofgate_bot id:abc proof:def")],
        Some("1794"),
    );

    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(h.jobs.len(VERIFICATION_QUEUE), 0);
    assert!(!h.dedup.is_handled("1794").await.unwrap());
    assert_eq!(h.poller.since_id(), None);
}

#[tokio::test]
async fn cursor_stops_before_first_deferred_mention() {
    let mut h = harness();
    h.social.push_page(
        vec![
            mention("1800", Some("alice"), "@proofgate_bot id:a proof:p"),
            mention("1801", None, "@proofgate_bot id:b proof:q"),
            mention("1802", Some("bob"), "@proofgate_bot id:c proof:r"),
        ],
        Some("1802"),
    );
    h.social.push_page(
        vec![mention("1801", Some("carol"), "@proofgate_bot id:b proof:q")],
        Some("1801"),
    );

    let first = h.poller.poll_once().await.unwrap();
    assert_eq!(first.enqueued, 2);
    assert_eq!(first.deferred, 1);
    assert_eq!(h.poller.since_id(), Some("1800"));

    let second = h.poller.poll_once().await.unwrap();
    assert_eq!(second.enqueued, 1);
    assert_eq!(h.poller.since_id(), Some("1801"));
    assert_eq!(
        *h.social.since_ids.lock().unwrap(),
        vec![None, Some("1800".to_string())]
    );

    let resource_ids: Vec<String> = h
        .jobs
        .jobs::<VerificationJob>(VERIFICATION_QUEUE)
        .into_iter()
        .map(|j| j.resource_id)
        .collect();
    assert_eq!(resource_ids, ["a", "c", "b"]);
}

#[tokio::test]
async fn backlog_across_pages_is_drained_before_moving_cursor() {
    let mut h = harness();
    // Newest page first, as the platform serves them.
    h.social.push_partial_page(
        vec![
            mention("1812", Some("alice"), "@proofgate_bot id:r12 proof:p"),
            mention("1813", Some("alice"), "@proofgate_bot id:r13 proof:p"),
        ],
        Some("1813"),
        Some("page-2"),
    );
    h.social.push_partial_page(
        vec![
            mention("1810", Some("bob"), "@proofgate_bot id:r10 proof:p"),
            mention("1811", Some("bob"), "@proofgate_bot id:r11 proof:p"),
        ],
        Some("1811"),
        None,
    );

    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(report.fetched, 4);
    assert_eq!(report.enqueued, 4);
    assert_eq!(h.poller.since_id(), Some("1813"));
    assert_eq!(
        *h.social.pagination_tokens.lock().unwrap(),
        vec![None, Some("page-2".to_string())]
    );
    assert_eq!(*h.social.since_ids.lock().unwrap(), vec![None, None]);

    let post_ids: Vec<String> = h
        .jobs
        .jobs::<VerificationJob>(VERIFICATION_QUEUE)
        .into_iter()
        .map(|j| j.post_id)
        .collect();
    assert_eq!(post_ids, ["1810", "1811", "1812", "1813"]);
}

#[tokio::test]
async fn failed_enqueue_keeps_cursor_and_mention_for_retry() {
    let mut h = harness();
    let m = mention("1795", Some("alice"), "@proofgate_bot id:abc proof:def");
    h.social.push_page(vec![m.clone()], Some("1795"));
    h.social.push_page(vec![m], Some("1795"));

    h.jobs.set_failing(true);
    let first = h.poller.poll_once().await.unwrap();
    assert_eq!(first.deferred, 1);
    assert_eq!(h.poller.since_id(), None);
    assert!(!h.dedup.is_handled("1795").await.unwrap());

    h.jobs.set_failing(false);
    let second = h.poller.poll_once().await.unwrap();
    assert_eq!(second.enqueued, 1);
    assert_eq!(h.poller.since_id(), Some("1795"));
}

#[tokio::test]
async fn bot_own_posts_are_skipped() {
    let mut h = harness();
    let mut own = mention("1796", Some("proofgate_bot"), "@proofgate_bot id:abc proof:def");
    own.author_id = BOT_USER_ID.to_string();
    h.social.push_page(vec![own], Some("1796"));

    let report = h.poller.poll_once().await.unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.enqueued, 0);
    assert_eq!(h.jobs.len(VERIFICATION_QUEUE), 0);
}

#[tokio::test]
async fn fetch_error_is_returned_without_moving_cursor() {
    let mut h = harness();
    h.social.push_fetch_error(SocialError::RateLimited {
        retry_after: Some(secs(60)),
    });

    let err = h.poller.poll_once().await.unwrap_err();

    assert!(matches!(err, SocialError::RateLimited { .. }));
    assert_eq!(h.poller.since_id(), None);
}
