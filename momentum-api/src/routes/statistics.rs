use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::AuthUser,
    domain::models::ActivityId,
    domain::services::{ActivityStatistics, ActivityStatsSimple, Summary, WeeklyTrendItem},
    routes::ApiError,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(get_summary))
        .route("/activities/:id", get(get_activity_stats))
        .route("/activities/:id/detailed", get(get_activity_stats_detailed))
        .route("/weekly-trend", get(get_weekly_trend))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    period: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    period: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendParams {
    activity_id: Option<ActivityId>,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    data: Vec<WeeklyTrendItem>,
}

/// An explicit date range takes precedence over a named period.
#[instrument(name = "get_summary", skip(app_state, user, params), fields(user_id = %user.id))]
async fn get_summary(
    user: AuthUser,
    State(app_state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Summary>, ApiError> {
    let summary = match (params.start_date, params.end_date) {
        (Some(start), Some(end)) => {
            app_state
                .statistics_service
                .summary_for_range(user.id, &start, &end)
                .await?
        }
        _ => {
            app_state
                .statistics_service
                .summary_for_period(user.id, params.period.as_deref())
                .await?
        }
    };

    Ok(Json(summary))
}

#[instrument(name = "get_activity_stats", skip(app_state, user), fields(user_id = %user.id))]
async fn get_activity_stats(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<ActivityId>,
) -> Result<Json<ActivityStatsSimple>, ApiError> {
    let stats = app_state
        .statistics_service
        .activity_stats(user.id, id)
        .await?;

    Ok(Json(stats))
}

#[instrument(name = "get_activity_stats_detailed", skip(app_state, user, params), fields(user_id = %user.id))]
async fn get_activity_stats_detailed(
    user: AuthUser,
    State(app_state): State<AppState>,
    Path(id): Path<ActivityId>,
    Query(params): Query<PeriodParams>,
) -> Result<Json<ActivityStatistics>, ApiError> {
    let stats = app_state
        .statistics_service
        .activity_stats_detailed(user.id, id, params.period.as_deref())
        .await?;

    Ok(Json(stats))
}

#[instrument(name = "get_weekly_trend", skip(app_state, user, params), fields(user_id = %user.id))]
async fn get_weekly_trend(
    user: AuthUser,
    State(app_state): State<AppState>,
    Query(params): Query<TrendParams>,
) -> Result<Json<TrendResponse>, ApiError> {
    let trend = app_state
        .statistics_service
        .weekly_trend(user.id, params.activity_id)
        .await?;

    Ok(Json(TrendResponse { data: trend }))
}
