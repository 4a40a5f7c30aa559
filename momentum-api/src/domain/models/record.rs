use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{ActivityId, RecordId, UserId};

/// How a record entered the system: tracked live or entered by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "record_source", rename_all = "UPPERCASE")]
pub enum RecordSource {
    Live,
    Manual,
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordSource::Live => write!(f, "LIVE"),
            RecordSource::Manual => write!(f, "MANUAL"),
        }
    }
}

impl std::str::FromStr for RecordSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LIVE" => Ok(RecordSource::Live),
            "MANUAL" => Ok(RecordSource::Manual),
            _ => Err(format!("Unknown record source: {}", s)),
        }
    }
}

/// A single tracked block of time for an activity.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ActivityRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub source: RecordSource,
    /// Seconds; `None` only while a LIVE record is still running.
    pub duration: Option<i32>,
    /// When the activity happened (MANUAL) or when tracking started (LIVE).
    pub executed_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ActivityRecord {
    pub fn is_running(&self) -> bool {
        self.source == RecordSource::Live && self.duration.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub source: RecordSource,
    pub duration: Option<i32>,
    pub executed_at: OffsetDateTime,
}

/// The caller-supplied fields of a record, used by both create and update.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub activity_id: ActivityId,
    pub source: RecordSource,
    pub duration: Option<i32>,
    pub executed_at: OffsetDateTime,
}

/// Filters for the record listing; each dimension is independent and optional.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub activity_id: Option<ActivityId>,
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
    pub source: Option<RecordSource>,
    pub running_only: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }
}

#[derive(Debug, Clone)]
pub struct RecordPage {
    pub items: Vec<ActivityRecord>,
    pub page: u32,
    pub size: u32,
    /// Count of all matches, not just this page.
    pub total: i64,
}

/// A finished record projected down to what aggregation needs.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct FinishedSlice {
    pub executed_at: OffsetDateTime,
    /// Seconds.
    pub duration: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn record_source_round_trips_through_str() {
        assert_eq!(RecordSource::from_str("LIVE").unwrap(), RecordSource::Live);
        assert_eq!(
            RecordSource::from_str("manual").unwrap(),
            RecordSource::Manual
        );
        assert!(RecordSource::from_str("BATCH").is_err());
        assert_eq!(RecordSource::Live.to_string(), "LIVE");
    }
}
