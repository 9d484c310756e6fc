use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use common::IngestionJob;
use common::jobs::new_job_id;
use mq::JobSinkExt;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vault::NewContent;

use crate::delivery::{Delivery, DeliveryService};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::extractors::payment::PaymentHeader;
use crate::models::resource::*;
use crate::payment::PAYMENT_RESPONSE_HEADER;
use crate::state::AppState;

const DEFAULT_PLATFORM: &str = "api";

fn source_of(req: &CreateResourceRequest) -> (String, String) {
    let platform = req
        .source_platform
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PLATFORM)
        .to_ascii_lowercase();
    let message_id = req
        .source_message_id
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("api-{}", Uuid::now_v7()));
    (platform, message_id)
}

/// Store content as a draft and issue its proof token.
#[utoipa::path(
    post,
    path = "/resources",
    tag = "Resources",
    operation_id = "createResource",
    summary = "Lock new content",
    description = "Encrypts the body, stores it as a draft and returns the single-use proof token \
        needed to publish it. Re-sending the same `source_platform`/`source_message_id` returns \
        the original resource and token with `duplicate: true`.",
    request_body = CreateResourceRequest,
    responses(
        (status = 201, description = "Resource created", body = CreateResourceResponse),
        (status = 200, description = "Already ingested", body = CreateResourceResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(owner_id = %auth_user.owner_id))]
pub async fn create_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateResourceRequest>,
) -> Result<Response, AppError> {
    let (source_platform, source_message_id) = source_of(&payload);

    let stored = state
        .store
        .store(
            &state.db,
            NewContent {
                owner_id: auth_user.owner_id,
                owner_handle: auth_user.handle,
                content: payload.content.into_bytes(),
                source_platform,
                source_message_id,
                content_type: payload.content_type,
                price_minor_units: payload.price_minor_units,
            },
        )
        .await?;

    let status = if stored.is_new {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreateResourceResponse {
            resource_id: stored.resource_id,
            proof_token: stored.proof_token,
            duplicate: !stored.is_new,
        }),
    )
        .into_response())
}

/// Queue content for ingestion. The proof token arrives by direct message.
#[utoipa::path(
    post,
    path = "/resources/submissions",
    tag = "Resources",
    operation_id = "submitResource",
    summary = "Queue content for ingestion",
    description = "Publishes an ingestion job. The worker stores the content and sends the proof \
        token to the owner by direct message.",
    request_body = CreateResourceRequest,
    responses(
        (status = 202, description = "Job accepted", body = SubmitResourceResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 503, description = "Queue unavailable (SERVICE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(owner_id = %auth_user.owner_id))]
pub async fn submit_resource(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateResourceRequest>,
) -> Result<(StatusCode, Json<SubmitResourceResponse>), AppError> {
    if payload.content.is_empty() {
        return Err(AppError::Validation("content must not be empty".into()));
    }
    if payload.price_minor_units.is_some_and(|p| p <= 0) {
        return Err(AppError::Validation("price must be positive".into()));
    }

    let Some(jobs) = state.jobs.as_ref() else {
        return Err(AppError::ServiceUnavailable(
            "Message queue not available".into(),
        ));
    };

    let (source_platform, source_message_id) = source_of(&payload);
    let job = IngestionJob {
        job_id: new_job_id(),
        owner_id: auth_user.owner_id,
        handle: auth_user.handle,
        content: payload.content,
        source_platform,
        source_message_id,
        content_type: payload.content_type,
        price_minor_units: payload.price_minor_units,
        received_at: Utc::now(),
    };

    jobs.submit(&state.config.mq.ingestion.name, &job)
        .await
        .map_err(|e| {
            warn!(job_id = %job.job_id, error = %e, "Failed to enqueue ingestion job");
            AppError::ServiceUnavailable("Failed to enqueue job".into())
        })?;

    info!(job_id = %job.job_id, "Ingestion job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResourceResponse { job_id: job.job_id }),
    ))
}

/// Paid access to a published resource.
#[utoipa::path(
    get,
    path = "/resources/{id}",
    tag = "Resources",
    operation_id = "getResourceContent",
    summary = "Fetch paid content",
    description = "Without an `X-PAYMENT` header this returns 402 with the payment requirements. \
        With a valid payment the content is decrypted, the payment settled and the body returned; \
        the settlement receipt is in the `X-PAYMENT-RESPONSE` header.",
    params(
        ("id" = Uuid, Path, description = "Resource ID"),
        ("X-PAYMENT" = Option<String>, Header, description = "Base64 encoded x402 payment payload"),
    ),
    responses(
        (status = 200, description = "Content released", body = ContentResponse),
        (status = 402, description = "Payment required, or payment invalid (PAYMENT_INVALID)", body = PaymentRequiredResponse),
        (status = 404, description = "Not found or not published (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Integrity failure (CONTENT_CORRUPTED)", body = ErrorBody),
        (status = 502, description = "Settlement failed (SETTLEMENT_FAILED)", body = ErrorBody),
        (status = 503, description = "Facilitator unreachable (SERVICE_UNAVAILABLE)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payment), fields(id = %id))]
pub async fn get_resource_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payment: PaymentHeader,
) -> Result<Response, AppError> {
    let delivery = DeliveryService::new(&state)
        .deliver(id, payment.0.as_deref())
        .await?;

    match delivery {
        Delivery::PaymentRequired(requirements) => Ok((
            StatusCode::PAYMENT_REQUIRED,
            Json(PaymentRequiredResponse::new(requirements)),
        )
            .into_response()),
        Delivery::Content(delivered) => {
            let receipt = delivered.receipt.to_header();
            let mut response = Json(ContentResponse::from(*delivered)).into_response();
            match receipt.map(|r| HeaderValue::from_str(&r)) {
                Ok(Ok(value)) => {
                    response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                }
                _ => warn!(%id, "Could not encode settlement receipt header"),
            }
            Ok(response)
        }
    }
}

/// Public metadata of a resource.
#[utoipa::path(
    get,
    path = "/resources/{id}/preview",
    tag = "Resources",
    operation_id = "previewResource",
    summary = "Preview a resource",
    description = "Owner, price, chain and publication status. Never the body or proof data.",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Resource metadata", body = ResourcePreviewResponse),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id = %id))]
pub async fn preview_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourcePreviewResponse>, AppError> {
    let resource = state
        .store
        .find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resource {id} not found")))?;

    Ok(Json(ResourcePreviewResponse::new(
        resource,
        &state.config.payment.network,
    )))
}
