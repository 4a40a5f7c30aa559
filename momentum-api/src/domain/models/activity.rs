use time::OffsetDateTime;

use super::{ActivityId, UserId};

/// A user-defined activity with a weekly time target.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Activity {
    pub id: ActivityId,
    pub user_id: UserId,
    pub name: String,
    /// Weekly target in seconds.
    pub target_time: i32,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Activity {
    pub fn target_minutes(&self) -> i32 {
        self.target_time / 60
    }
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: UserId,
    pub name: String,
    /// Weekly target in seconds.
    pub target_time: i32,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Partial update of an activity; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
    pub name: Option<String>,
    /// Weekly target in minutes, as supplied by the caller.
    pub target_minutes: Option<i32>,
    pub color: Option<String>,
    pub icon: Option<String>,
}
