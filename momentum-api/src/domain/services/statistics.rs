use std::sync::Arc;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::Duration;
use tracing::instrument;

use crate::domain::clock::Clock;
use crate::domain::models::{ActivityId, FinishedSlice, UserId};
use crate::domain::period::{
    bounds, custom_bounds, day_start, format_date, week_start_of, Period, PeriodBounds,
    TRACKING_OFFSET,
};
use crate::domain::DomainError;
use crate::repositories::{ActivityRecordRepository, ActivityRepository};

use super::{map_repo, owned_activity};

const TREND_WEEKS: i64 = 8;

/// Cross-activity summary for one time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Finished minutes in the window.
    pub weekly_total_time: i64,
    /// Name of the activity with the most tracked time, if any.
    pub most_frequent_activity: Option<String>,
    /// Tracked minutes over the scaled sum of weekly targets.
    pub completion_rate: f64,
}

/// Compact per-activity numbers for list views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatsSimple {
    /// All-time finished minutes.
    pub total_time: i64,
    /// Finished minutes in the current week.
    pub weekly_time: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrendItem {
    /// Monday of the week, formatted YYYY-MM-DD in the tracking zone.
    pub week_start: String,
    pub minutes: i64,
}

/// Per-activity statistics for one named period, with trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatistics {
    pub activity_id: ActivityId,
    pub period: String,
    pub period_start: String,
    pub period_end: String,
    /// Finished minutes in the period.
    pub total_time: i64,
    /// Weekly target in minutes.
    pub weekly_target: i32,
    pub scale: f64,
    pub completion_rate: f64,
    pub weekly_trend: Vec<WeeklyTrendItem>,
}

/// Read-only aggregation over finished records.
pub struct StatisticsService<R, A> {
    records: Arc<R>,
    activities: Arc<A>,
    clock: Arc<dyn Clock>,
}

impl<R, A> StatisticsService<R, A>
where
    R: ActivityRecordRepository,
    A: ActivityRepository,
{
    pub fn new(records: Arc<R>, activities: Arc<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records,
            activities,
            clock,
        }
    }

    /// Summary for a named period containing now; defaults to the week.
    #[instrument(skip(self))]
    pub async fn summary_for_period(
        &self,
        user_id: UserId,
        period: Option<&str>,
    ) -> Result<Summary, DomainError> {
        let period = match period {
            Some(p) => Period::parse(p)?,
            None => Period::Week,
        };
        let window = bounds(period, self.clock.now());
        self.summary(user_id, window).await
    }

    /// Summary for an inclusive calendar-date range.
    #[instrument(skip(self))]
    pub async fn summary_for_range(
        &self,
        user_id: UserId,
        start_date: &str,
        end_date: &str,
    ) -> Result<Summary, DomainError> {
        let window = custom_bounds(start_date, end_date)?;
        self.summary(user_id, window).await
    }

    async fn summary(&self, user_id: UserId, window: PeriodBounds) -> Result<Summary, DomainError> {
        let total_seconds = self
            .records
            .finished_seconds(user_id, None, Some((window.start, window.end)))
            .await
            .map_err(map_repo)?;
        let total_minutes = total_seconds / 60;

        let most_frequent_activity = match self
            .records
            .top_activity_in_range(user_id, window.start, window.end)
            .await
            .map_err(map_repo)?
        {
            Some(id) => self
                .activities
                .find_by_id(id)
                .await
                .map_err(map_repo)?
                .map(|a| a.name),
            None => None,
        };

        let target_minutes = self
            .activities
            .target_seconds_sum(user_id)
            .await
            .map_err(map_repo)?
            / 60;

        Ok(Summary {
            weekly_total_time: total_minutes,
            most_frequent_activity,
            completion_rate: completion_rate(total_minutes, target_minutes, window.scale),
        })
    }

    /// All-time and current-week totals for one activity.
    #[instrument(skip(self))]
    pub async fn activity_stats(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<ActivityStatsSimple, DomainError> {
        let activity = owned_activity(self.activities.as_ref(), user_id, activity_id).await?;

        let total_minutes = self
            .records
            .finished_seconds(user_id, Some(activity_id), None)
            .await
            .map_err(map_repo)?
            / 60;

        let week = bounds(Period::Week, self.clock.now());
        let weekly_minutes = self
            .records
            .finished_seconds(user_id, Some(activity_id), Some((week.start, week.end)))
            .await
            .map_err(map_repo)?
            / 60;

        Ok(ActivityStatsSimple {
            total_time: total_minutes,
            weekly_time: weekly_minutes,
            completion_rate: completion_rate(weekly_minutes, activity.target_minutes() as i64, 1.0),
        })
    }

    /// Period totals, completion and the eight-week trend for one activity.
    #[instrument(skip(self))]
    pub async fn activity_stats_detailed(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        period: Option<&str>,
    ) -> Result<ActivityStatistics, DomainError> {
        let period = match period {
            Some(p) => Period::parse(p)?,
            None => Period::Week,
        };
        let activity = owned_activity(self.activities.as_ref(), user_id, activity_id).await?;
        let window = bounds(period, self.clock.now());

        let total_minutes = self
            .records
            .finished_seconds(user_id, Some(activity_id), Some((window.start, window.end)))
            .await
            .map_err(map_repo)?
            / 60;

        let weekly_target = activity.target_minutes();
        let weekly_trend = self.trend(user_id, Some(activity_id)).await?;

        Ok(ActivityStatistics {
            activity_id,
            period: period.to_string(),
            period_start: format_rfc3339(window.start),
            period_end: format_rfc3339(window.end),
            total_time: total_minutes,
            weekly_target,
            scale: window.scale,
            completion_rate: completion_rate(total_minutes, weekly_target as i64, window.scale),
            weekly_trend,
        })
    }

    /// Minutes per week over the last eight weeks, oldest first; for one
    /// activity or across all of the user's records.
    #[instrument(skip(self))]
    pub async fn weekly_trend(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
    ) -> Result<Vec<WeeklyTrendItem>, DomainError> {
        if let Some(activity_id) = activity_id {
            owned_activity(self.activities.as_ref(), user_id, activity_id).await?;
        }
        self.trend(user_id, activity_id).await
    }

    async fn trend(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
    ) -> Result<Vec<WeeklyTrendItem>, DomainError> {
        let earliest = week_start_of(self.clock.now()) - Duration::weeks(TREND_WEEKS - 1);
        let window_start = day_start(earliest);
        let window_end = window_start + Duration::weeks(TREND_WEEKS);

        let slices = self
            .records
            .finished_in_range(user_id, activity_id, window_start, window_end)
            .await
            .map_err(map_repo)?;

        let mut buckets = [0i64; TREND_WEEKS as usize];
        for FinishedSlice {
            executed_at,
            duration,
        } in slices
        {
            let day = executed_at.to_offset(TRACKING_OFFSET).date();
            let idx = (day - earliest).whole_days() / 7;
            buckets[idx as usize] += i64::from(duration);
        }

        Ok(buckets
            .iter()
            .enumerate()
            .map(|(i, seconds)| WeeklyTrendItem {
                week_start: format_date(earliest + Duration::weeks(i as i64)),
                minutes: seconds / 60,
            })
            .collect())
    }
}

/// Tracked minutes over the target scaled to the window length. A missing or
/// zero target yields 0.0 rather than a division by zero.
fn completion_rate(total_minutes: i64, target_minutes: i64, scale: f64) -> f64 {
    if target_minutes <= 0 {
        return 0.0;
    }
    total_minutes as f64 / (target_minutes as f64 * scale)
}

fn format_rfc3339(at: time::OffsetDateTime) -> String {
    at.to_offset(TRACKING_OFFSET)
        .format(&Rfc3339)
        .expect("offset datetimes format as RFC 3339")
}
