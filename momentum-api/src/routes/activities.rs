use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::AuthUser,
    domain::models::{ActivityId, ActivityPatch},
    domain::services::{ActivityDraft, ActivityWithStats},
    routes::ApiError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_activities).post(create_activity))
        .route(
            "/:id",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityPayload {
    name: String,
    /// Weekly target in minutes.
    target_time: i32,
    color: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivityPayload {
    name: Option<String>,
    /// Weekly target in minutes.
    target_time: Option<i32>,
    color: Option<String>,
    icon: Option<String>,
}

#[instrument(name = "create_activity", skip(app_state, user, payload), fields(user_id = %user.id))]
async fn create_activity(
    user: AuthUser,
    State(app_state): State<AppState>,
    Json(payload): Json<CreateActivityPayload>,
) -> Result<(StatusCode, Json<ActivityWithStats>), ApiError> {
    let activity = app_state
        .activity_service
        .create(
            user.id,
            ActivityDraft {
                name: payload.name,
                target_minutes: payload.target_time,
                color: payload.color,
                icon: payload.icon,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(activity)))
}

#[instrument(name = "list_activities", skip(app_state, user), fields(user_id = %user.id))]
async fn list_activities(
    user: AuthUser,
    State(app_state): State<AppState>,
) -> Result<Json<Vec<ActivityWithStats>>, ApiError> {
    let activities = app_state.activity_service.list(user.id).await?;

    Ok(Json(activities))
}

#[instrument(name = "get_activity", skip(app_state, user), fields(user_id = %user.id))]
async fn get_activity(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<ActivityId>,
) -> Result<Json<ActivityWithStats>, ApiError> {
    let activity = app_state.activity_service.get(user.id, id).await?;

    Ok(Json(activity))
}

#[instrument(name = "update_activity", skip(app_state, user, payload), fields(user_id = %user.id))]
async fn update_activity(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<ActivityId>,
    Json(payload): Json<UpdateActivityPayload>,
) -> Result<Json<ActivityWithStats>, ApiError> {
    let activity = app_state
        .activity_service
        .update(
            user.id,
            id,
            ActivityPatch {
                name: payload.name,
                target_minutes: payload.target_time,
                color: payload.color,
                icon: payload.icon,
            },
        )
        .await?;

    Ok(Json(activity))
}

#[instrument(name = "delete_activity", skip(app_state, user), fields(user_id = %user.id))]
async fn delete_activity(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<ActivityId>,
) -> Result<StatusCode, ApiError> {
    app_state.activity_service.delete(user.id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
