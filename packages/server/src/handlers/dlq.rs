use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::dlq::DlqMessageType;
use common::{IngestionJob, ReplyJob, VerificationJob};
use mq::{JobSink, JobSinkExt, error::MqError};
use sea_orm::TransactionTrait;
use tracing::{info, instrument, warn};

use crate::dlq::{DlqService, ResolveResult, dlq_service};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, DLQ_MANAGE};
use crate::models::dlq::*;
use crate::models::shared::{Pagination, page_bounds};
use crate::state::AppState;

/// List dead letter messages.
#[utoipa::path(
    get,
    path = "/dlq",
    tag = "Dead Letter Queue",
    operation_id = "listDlqMessages",
    summary = "List dead letter messages",
    description = "Returns a paginated list of dead letter messages, newest first. Requires `dlq:manage` permission.",
    params(ListDlqParams),
    responses(
        (status = 200, description = "List of DLQ messages", body = DlqListResponse),
        (status = 400, description = "Unknown message type (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn list_dlq_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListDlqParams>,
) -> Result<Json<DlqListResponse>, AppError> {
    auth_user.require_permission(DLQ_MANAGE)?;

    let message_type = params
        .message_type
        .map(|mt| mt.parse::<DlqMessageType>())
        .transpose()
        .map_err(AppError::Validation)?;

    let (page, per_page) = page_bounds(params.page, params.per_page);

    let (messages, total) = dlq_service(&state.db)
        .list(message_type, params.resolved, page, per_page)
        .await?;

    Ok(Json(DlqListResponse {
        data: messages.into_iter().map(Into::into).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}

/// Get DLQ statistics.
#[utoipa::path(
    get,
    path = "/dlq/stats",
    tag = "Dead Letter Queue",
    operation_id = "getDlqStats",
    summary = "Get DLQ statistics",
    description = "Unresolved counts by message type and error code. Requires `dlq:manage` permission.",
    responses(
        (status = 200, description = "DLQ statistics", body = DlqStatsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user))]
pub async fn get_dlq_stats(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DlqStatsResponse>, AppError> {
    auth_user.require_permission(DLQ_MANAGE)?;

    let stats = dlq_service(&state.db).stats().await?;

    Ok(Json(stats.into()))
}

/// Get a single DLQ message by ID.
#[utoipa::path(
    get,
    path = "/dlq/{id}",
    tag = "Dead Letter Queue",
    operation_id = "getDlqMessage",
    summary = "Get DLQ message details",
    description = "Full details including payload and retry history. Requires `dlq:manage` permission.",
    params(("id" = i32, Path, description = "DLQ message ID")),
    responses(
        (status = 200, description = "DLQ message details", body = DlqMessageDetailResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn get_dlq_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DlqMessageDetailResponse>, AppError> {
    auth_user.require_permission(DLQ_MANAGE)?;

    let message = dlq_service(&state.db)
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("DLQ message {} not found", id)))?;

    Ok(Json(message.into()))
}

/// Decode `payload` as the job type behind `message_type` and publish it.
async fn requeue(
    sink: &dyn JobSink,
    state: &AppState,
    message_type: DlqMessageType,
    payload: serde_json::Value,
) -> Result<String, AppError> {
    let queues = &state.config.mq;
    let bad_payload =
        |e: serde_json::Error| AppError::Validation(format!("Stored payload does not decode: {e}"));

    let (queue, sent): (&str, Result<(), MqError>) = match message_type {
        DlqMessageType::Ingestion => {
            let job: IngestionJob = serde_json::from_value(payload).map_err(bad_payload)?;
            (
                queues.ingestion.name.as_str(),
                sink.submit(&queues.ingestion.name, &job).await,
            )
        }
        DlqMessageType::Verification => {
            let job: VerificationJob = serde_json::from_value(payload).map_err(bad_payload)?;
            (
                queues.verification.name.as_str(),
                sink.submit(&queues.verification.name, &job).await,
            )
        }
        DlqMessageType::Reply => {
            let job: ReplyJob = serde_json::from_value(payload).map_err(bad_payload)?;
            (
                queues.reply.name.as_str(),
                sink.submit(&queues.reply.name, &job).await,
            )
        }
        DlqMessageType::Purchase => {
            return Err(AppError::Validation(
                "Purchase entries cannot be requeued. Check settlement manually and resolve.".into(),
            ));
        }
    };

    sent.map_err(|e| AppError::Internal(format!("Failed to re-enqueue message: {}", e)))?;
    Ok(queue.to_string())
}

/// Retry a DLQ message by re-enqueuing it.
#[utoipa::path(
    post,
    path = "/dlq/{id}/retry",
    tag = "Dead Letter Queue",
    operation_id = "retryDlqMessage",
    summary = "Retry a DLQ message",
    description = "Re-enqueues the stored job on its original queue and marks the entry resolved. \
        Purchase entries cannot be retried. Requires `dlq:manage` permission.",
    params(("id" = i32, Path, description = "DLQ message ID")),
    responses(
        (status = 200, description = "Message requeued", body = DlqRetryResponse),
        (status = 400, description = "Not requeueable (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Message already resolved (CONFLICT)", body = ErrorBody),
        (status = 503, description = "Queue unavailable (SERVICE_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn retry_dlq_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DlqRetryResponse>, AppError> {
    auth_user.require_permission(DLQ_MANAGE)?;

    let Some(sink) = state.jobs.clone() else {
        return Err(AppError::ServiceUnavailable(
            "Message queue not available".into(),
        ));
    };

    let txn = state.db.begin().await?;
    let dlq = DlqService::new(&txn);

    let message = dlq
        .get_by_id_for_update(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("DLQ message {} not found", id)))?;

    if message.resolved {
        return Err(AppError::Conflict("Message already resolved".into()));
    }

    let message_type = message
        .message_type
        .parse::<DlqMessageType>()
        .map_err(AppError::Internal)?;
    if !message_type.is_requeueable() {
        return Err(AppError::Validation(
            "Purchase entries cannot be requeued. Check settlement manually and resolve.".into(),
        ));
    }

    match dlq.resolve(id, Some(auth_user.owner_id.clone())).await? {
        ResolveResult::Resolved => {}
        ResolveResult::AlreadyResolved => {
            warn!(id, "DLQ message was resolved concurrently during retry");
        }
        ResolveResult::NotFound => {
            return Err(AppError::Internal(
                "DLQ message disappeared during retry".into(),
            ));
        }
    }

    let queue = requeue(sink.as_ref(), &state, message_type, message.payload.clone()).await?;

    txn.commit().await.map_err(|e| {
        tracing::error!(
            id,
            message_id = %message.message_id,
            error = %e,
            "Job republished but DB commit failed; DLQ entry remains unresolved"
        );
        AppError::Internal(format!("DB commit failed after publish: {}", e))
    })?;

    info!(id, message_id = %message.message_id, %queue, "DLQ message retried");

    Ok(Json(DlqRetryResponse {
        message: format!("Message requeued on {queue}"),
        queue,
    }))
}

/// Delete (resolve) a DLQ message.
#[utoipa::path(
    delete,
    path = "/dlq/{id}",
    tag = "Dead Letter Queue",
    operation_id = "deleteDlqMessage",
    summary = "Delete (resolve) a DLQ message",
    description = "Marks a DLQ message as resolved without retrying. Requires `dlq:manage` permission.",
    params(("id" = i32, Path, description = "DLQ message ID")),
    responses(
        (status = 204, description = "Message resolved"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Message not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_dlq_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission(DLQ_MANAGE)?;

    match dlq_service(&state.db)
        .resolve(id, Some(auth_user.owner_id))
        .await?
    {
        ResolveResult::Resolved => {
            info!(id, "DLQ message resolved");
            Ok(StatusCode::NO_CONTENT)
        }
        ResolveResult::AlreadyResolved => Ok(StatusCode::NO_CONTENT),
        ResolveResult::NotFound => Err(AppError::NotFound(format!("DLQ message {} not found", id))),
    }
}
