mod activities;
mod records;
mod statistics;

pub use activities::{ActivityDraft, ActivityService, ActivityWithStats};
pub use records::RecordService;
pub use statistics::{
    ActivityStatistics, ActivityStatsSimple, StatisticsService, Summary, WeeklyTrendItem,
};

use crate::domain::models::{Activity, ActivityId, UserId};
use crate::domain::DomainError;
use crate::repositories::{ActivityRepository, RepositoryError};

/// Converts repository failures into their domain-level meaning. Database
/// errors stay opaque and bubble up as such.
fn map_repo(err: RepositoryError) -> DomainError {
    match err {
        RepositoryError::NotFound(msg) => DomainError::NotFound(msg),
        RepositoryError::Conflict(msg) => DomainError::Conflict(msg),
        RepositoryError::DatabaseError(_) => DomainError::Repository(err),
    }
}

/// Loads an activity and checks ownership. An activity owned by someone else
/// is indistinguishable from a missing one.
async fn owned_activity<A: ActivityRepository>(
    activities: &A,
    user_id: UserId,
    activity_id: ActivityId,
) -> Result<Activity, DomainError> {
    activities
        .find_by_id(activity_id)
        .await
        .map_err(map_repo)?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| DomainError::NotFound(format!("Activity not found: {activity_id}")))
}
