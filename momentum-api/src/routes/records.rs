use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::AuthUser,
    domain::models::{
        ActivityId, ActivityRecord, PageRequest, RecordDraft, RecordFilter, RecordId, RecordPage,
        RecordSource,
    },
    routes::ApiError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_record).get(list_records))
        .route("/running", get(list_running_records))
        .route(
            "/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/:id/finish", patch(finish_record))
}

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    activity_id: ActivityId,
    source: RecordSource,
    /// Seconds; required for MANUAL, absent for LIVE.
    duration: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    executed_at: OffsetDateTime,
}

impl From<RecordPayload> for RecordDraft {
    fn from(payload: RecordPayload) -> Self {
        Self {
            activity_id: payload.activity_id,
            source: payload.source,
            duration: payload.duration,
            executed_at: payload.executed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRecordPayload {
    #[serde(with = "time::serde::rfc3339")]
    end_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    id: RecordId,
    activity_id: ActivityId,
    source: RecordSource,
    duration: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    executed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    updated_at: OffsetDateTime,
}

impl From<ActivityRecord> for RecordResponse {
    fn from(record: ActivityRecord) -> Self {
        Self {
            id: record.id,
            activity_id: record.activity_id,
            source: record.source,
            duration: record.duration,
            executed_at: record.executed_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagedRecordResponse {
    data: Vec<RecordResponse>,
    page: u32,
    size: u32,
    total: i64,
}

impl From<RecordPage> for PagedRecordResponse {
    fn from(page: RecordPage) -> Self {
        Self {
            data: page.items.into_iter().map(RecordResponse::from).collect(),
            page: page.page,
            size: page.size,
            total: page.total,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsParams {
    activity_id: Option<ActivityId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    to: Option<OffsetDateTime>,
    source: Option<RecordSource>,
    running: Option<bool>,
    #[serde(default)]
    page: u32,
    #[serde(default = "default_page_size")]
    size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunningParams {
    activity_id: Option<ActivityId>,
    #[serde(default)]
    page: u32,
    #[serde(default = "default_page_size")]
    size: u32,
}

fn default_page_size() -> u32 {
    20
}

fn page_request(page: u32, size: u32) -> Result<PageRequest, ApiError> {
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(ApiError::validation(format!(
            "size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(PageRequest { page, size })
}

#[instrument(name = "create_record", skip(app_state, user, payload), fields(user_id = %user.id))]
async fn create_record(
    user: AuthUser,
    State(app_state): State<AppState>,
    Json(payload): Json<RecordPayload>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let record = app_state
        .record_service
        .create(user.id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

#[instrument(name = "finish_record", skip(app_state, user), fields(user_id = %user.id))]
async fn finish_record(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(payload): Json<FinishRecordPayload>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = app_state
        .record_service
        .finish(user.id, id, payload.end_at)
        .await?;

    Ok(Json(record.into()))
}

#[instrument(name = "update_record", skip(app_state, user, payload), fields(user_id = %user.id))]
async fn update_record(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(payload): Json<RecordPayload>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = app_state
        .record_service
        .update(user.id, id, payload.into())
        .await?;

    Ok(Json(record.into()))
}

#[instrument(name = "delete_record", skip(app_state, user), fields(user_id = %user.id))]
async fn delete_record(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, ApiError> {
    app_state.record_service.delete(user.id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[instrument(name = "get_record", skip(app_state, user), fields(user_id = %user.id))]
async fn get_record(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<RecordResponse>, ApiError> {
    let record = app_state.record_service.get(user.id, id).await?;

    Ok(Json(record.into()))
}

#[instrument(name = "list_records", skip(app_state, user, params), fields(user_id = %user.id))]
async fn list_records(
    user: AuthUser,
    State(app_state): State<AppState>,
    Query(params): Query<ListRecordsParams>,
) -> Result<Json<PagedRecordResponse>, ApiError> {
    let page = page_request(params.page, params.size)?;
    let filter = RecordFilter {
        activity_id: params.activity_id,
        from: params.from,
        to: params.to,
        source: params.source,
        running_only: params.running.unwrap_or(false),
    };

    let records = app_state.record_service.list(user.id, filter, page).await?;

    Ok(Json(records.into()))
}

#[instrument(name = "list_running_records", skip(app_state, user, params), fields(user_id = %user.id))]
async fn list_running_records(
    user: AuthUser,
    State(app_state): State<AppState>,
    Query(params): Query<ListRunningParams>,
) -> Result<Json<PagedRecordResponse>, ApiError> {
    let page = page_request(params.page, params.size)?;
    let records = app_state
        .record_service
        .list_running(user.id, params.activity_id, page)
        .await?;

    Ok(Json(records.into()))
}
