use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{IngestionJob, PurchaseStatus, ResourceStatus};
use serde_json::json;
use server::payment::{SettleResponse, VerifyResponse};
use uuid::Uuid;
use vault::PurchaseLedger;

use crate::common::{Outcome, PAY_TO, TestApp, payment_header, routes};

mod paid_access {
    use super::*;

    #[tokio::test]
    async fn missing_payment_returns_requirements() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "Alpha: the launch is on Friday.").await;

        let res = app.get_without_token(&routes::resource(id)).await;
        assert_eq!(res.status, 402);
        assert_eq!(res.body["x402Version"], 1);
        assert_eq!(res.body["error"], "X-PAYMENT header is required");

        let accepts = res.body["accepts"].as_array().expect("accepts should be array");
        assert_eq!(accepts.len(), 1);
        let req = &accepts[0];
        assert_eq!(req["scheme"], "exact");
        assert_eq!(req["network"], "solana-devnet");
        // 20 cents at 6 decimals
        assert_eq!(req["maxAmountRequired"], "200000");
        assert_eq!(req["payTo"], PAY_TO);
        assert_eq!(
            req["resource"],
            format!("https://pay.example.com/api/v1/resources/{id}")
        );
        assert_eq!(req["mimeType"], "text/plain");
        assert_eq!(req["maxTimeoutSeconds"], 60);

        assert_eq!(app.resource(id).await.purchase_count, 0);
    }

    #[tokio::test]
    async fn valid_payment_releases_content_and_settles() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "Alpha: the launch is on Friday.").await;

        let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
        assert_eq!(res.status, 200, "body: {}", res.text);
        assert_eq!(res.body["content"], "Alpha: the launch is on Friday.");
        assert_eq!(res.body["encoding"], "utf8");
        assert_eq!(res.body["metadata"]["resource_id"], id.to_string());
        assert_eq!(res.body["metadata"]["owner_handle"], "alice");

        let receipt = res
            .headers
            .get("x-payment-response")
            .expect("receipt header should be present")
            .to_str()
            .unwrap();
        let decoded: SettleResponse =
            serde_json::from_slice(&STANDARD.decode(receipt).unwrap()).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.transaction.as_deref(), Some("5igTx"));

        let resource = app.resource(id).await;
        assert_eq!(resource.purchase_count, 1);
        assert_eq!(resource.revenue_minor_units, 20);

        let purchases = PurchaseLedger::new(&app.db).for_resource(id).await.unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].status, PurchaseStatus::Settled);
        assert_eq!(purchases[0].settlement_reference.as_deref(), Some("5igTx"));
        assert_eq!(purchases[0].payer.as_deref(), Some("BuyerWa11et"));

        // The facilitator saw the same requirements the 402 advertised.
        let verified = app.facilitator.verified.lock().unwrap().clone();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].max_amount_required, "200000");
        assert_eq!(app.facilitator.settle_calls(), 1);
    }

    #[tokio::test]
    async fn each_payment_is_a_separate_purchase() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "body").await;

        for _ in 0..2 {
            let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
            assert_eq!(res.status, 200);
        }

        assert_eq!(app.resource(id).await.purchase_count, 2);
        let purchases = PurchaseLedger::new(&app.db).for_resource(id).await.unwrap();
        assert_eq!(purchases.len(), 2);
        assert_ne!(purchases[0].id, purchases[1].id);
    }

    #[tokio::test]
    async fn rejected_payment_is_402_without_purchase() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "body").await;
        app.facilitator.set_verify(Outcome::Reply(VerifyResponse {
            is_valid: false,
            invalid_reason: Some("insufficient_funds".into()),
            payer: None,
        }));

        let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
        assert_eq!(res.status, 402);
        assert_eq!(res.body["code"], "PAYMENT_INVALID");

        assert_eq!(app.resource(id).await.purchase_count, 0);
        assert!(PurchaseLedger::new(&app.db).for_resource(id).await.unwrap().is_empty());
        assert_eq!(app.facilitator.settle_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_header_is_402() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "body").await;

        let res = app.get_with_payment(&routes::resource(id), "%%%not-base64").await;
        assert_eq!(res.status, 402);
        assert_eq!(res.body["code"], "PAYMENT_INVALID");
        assert!(app.facilitator.verified.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_facilitator_is_503() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "body").await;
        app.facilitator.set_verify(Outcome::Unreachable);

        let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
        assert_eq!(res.status, 503);
        assert_eq!(res.body["code"], "SERVICE_UNAVAILABLE");
        assert_eq!(app.resource(id).await.purchase_count, 0);
    }

    #[tokio::test]
    async fn failed_settlement_keeps_purchase_pending() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "body").await;
        app.facilitator.set_settle(Outcome::Reply(SettleResponse {
            success: false,
            error_reason: Some("blockhash_expired".into()),
            ..Default::default()
        }));

        let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
        assert_eq!(res.status, 502);
        assert_eq!(res.body["code"], "SETTLEMENT_FAILED");

        let purchases = PurchaseLedger::new(&app.db).for_resource(id).await.unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn draft_resources_are_not_sold() {
        let app = TestApp::spawn().await;
        let (id, _) = app.create_draft("m1", "body").await;

        let res = app.get_without_token(&routes::resource(id)).await;
        assert_eq!(res.status, 404);

        let res = app.get_with_payment(&routes::resource(id), &payment_header()).await;
        assert_eq!(res.status, 404);
        assert!(app.facilitator.verified.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_resource_is_404() {
        let app = TestApp::spawn().await;
        let res = app.get_without_token(&routes::resource(Uuid::now_v7())).await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod creation {
    use super::*;

    #[tokio::test]
    async fn create_requires_token() {
        let app = TestApp::spawn().await;
        let res = app
            .post_without_token(routes::RESOURCES, &json!({ "content": "x" }))
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn create_stores_a_draft() {
        let app = TestApp::spawn().await;
        let (id, proof) = app.create_draft("m1", "secret body").await;

        assert_eq!(proof.split('-').count(), 4);
        let resource = app.resource(id).await;
        assert_eq!(resource.status, ResourceStatus::Draft);
        assert_eq!(resource.owner_id, "user-1");
        assert_eq!(resource.price_minor_units, 20);
        assert!(!resource.ciphertext.windows(6).any(|w| w == b"secret"));
    }

    #[tokio::test]
    async fn same_source_message_is_idempotent() {
        let app = TestApp::spawn().await;
        let (id, proof) = app.create_draft("m1", "first").await;

        let token = app.owner_token("user-1", "alice");
        let res = app
            .post_with_token(
                routes::RESOURCES,
                &json!({
                    "content": "second",
                    "source_platform": "twitter",
                    "source_message_id": "m1",
                }),
                &token,
            )
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["duplicate"], true);
        assert_eq!(res.body["resource_id"], id.to_string());
        assert_eq!(res.body["proof_token"], proof);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.owner_token("user-1", "alice");
        let res = app
            .post_with_token(routes::RESOURCES, &json!({ "content": "" }), &token)
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn submission_enqueues_ingestion_job() {
        let app = TestApp::spawn().await;
        let token = app.owner_token("user-1", "alice");

        let res = app
            .post_with_token(
                routes::SUBMISSIONS,
                &json!({ "content": "queued body", "price_minor_units": 50 }),
                &token,
            )
            .await;
        assert_eq!(res.status, 202, "body: {}", res.text);

        let jobs: Vec<IngestionJob> = app.jobs.jobs("ingestion");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, res.body["job_id"].as_str().unwrap());
        assert_eq!(jobs[0].owner_id, "user-1");
        assert_eq!(jobs[0].handle, "alice");
        assert_eq!(jobs[0].source_platform, "api");
        assert_eq!(jobs[0].price_minor_units, Some(50));
    }

    #[tokio::test]
    async fn submission_without_queue_is_503() {
        let app = TestApp::spawn_without_queue().await;
        let token = app.owner_token("user-1", "alice");

        let res = app
            .post_with_token(routes::SUBMISSIONS, &json!({ "content": "x" }), &token)
            .await;
        assert_eq!(res.status, 503);
        assert_eq!(res.body["code"], "SERVICE_UNAVAILABLE");
    }
}

mod preview {
    use super::*;

    #[tokio::test]
    async fn preview_shows_metadata_only() {
        let app = TestApp::spawn().await;
        let id = app.create_published("m1", "hidden body").await;

        let res = app.get_without_token(&routes::preview(id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["owner_handle"], "alice");
        assert_eq!(res.body["price"]["usd"], "0.20");
        assert_eq!(res.body["price"]["minor_units"], 20);
        assert_eq!(res.body["chain"], "solana");
        assert_eq!(res.body["network"], "solana-devnet");
        assert_eq!(res.body["status"], "published");
        assert_eq!(res.body["social_post_id"], "post-m1");
        assert!(!res.text.contains("hidden body"));
        assert!(res.body.get("proof_hash").is_none());
        assert!(res.body.get("ciphertext").is_none());
    }

    #[tokio::test]
    async fn drafts_can_be_previewed() {
        let app = TestApp::spawn().await;
        let (id, _) = app.create_draft("m1", "body").await;

        let res = app.get_without_token(&routes::preview(id)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["status"], "draft");
    }

    #[tokio::test]
    async fn unknown_preview_is_404() {
        let app = TestApp::spawn().await;
        let res = app.get_without_token(&routes::preview(Uuid::now_v7())).await;
        assert_eq!(res.status, 404);
    }
}
