use axum::{
    Extension, Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::{
    ApiError, ApiResponse, AppState, CreateRecordRequest, DeleteRecordParams, RecordDto,
    RecordListResponse, ReadRecordsParams, UpdateRecordRequest,
};
use crate::db::RecordPatch;

/// POST /actions/create_record
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateRecordRequest>,
) -> Result<Json<ApiResponse<RecordDto>>, ApiError> {
    if payload.title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if payload.record_type.is_empty() {
        return Err(ApiError::validation("Record type is required"));
    }

    let record = state
        .store
        .create_record(
            &user.username,
            &payload.record_type,
            &payload.title,
            payload.description,
        )
        .await?;

    metrics::counter!("user_actions_total", "action" => "create", "user" => user.username)
        .increment(1);

    Ok(Json(ApiResponse::success(record.into())))
}

/// POST /actions/update_record
/// Partial update: omitted fields are left unchanged. Any authenticated
/// caller may edit any record, not just the creator.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateRecordRequest>,
) -> Result<Json<ApiResponse<RecordDto>>, ApiError> {
    let patch = RecordPatch {
        title: payload.title,
        description: payload.description,
    };

    let record = state.store.update_record(payload.record_id, patch).await?;

    metrics::counter!("user_actions_total", "action" => "update", "user" => user.username)
        .increment(1);

    Ok(Json(ApiResponse::success(record.into())))
}

/// DELETE /actions/delete_record?record_id=
/// Soft delete. A second delete of the same id observes 404.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<DeleteRecordParams>,
) -> Result<Json<ApiResponse<RecordDto>>, ApiError> {
    let record = state.store.soft_delete_record(params.record_id).await?;

    metrics::counter!("user_actions_total", "action" => "delete", "user" => user.username)
        .increment(1);

    Ok(Json(ApiResponse::success(record.into())))
}

/// GET /actions/read_records?record_type=&limit=
pub async fn read_records(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ReadRecordsParams>,
) -> Result<Json<ApiResponse<RecordListResponse>>, ApiError> {
    let records = state
        .store
        .list_records(params.record_type.as_deref(), params.limit)
        .await?;

    metrics::counter!("user_actions_total", "action" => "read", "user" => user.username)
        .increment(1);

    let records: Vec<RecordDto> = records.into_iter().map(RecordDto::from).collect();

    Ok(Json(ApiResponse::success(RecordListResponse {
        count: records.len(),
        records,
    })))
}
