use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::domain::clock::Clock;
use crate::domain::models::{Activity, ActivityId, ActivityPatch, NewActivity, UserId};
use crate::domain::period::{bounds, Period};
use crate::domain::DomainError;
use crate::repositories::{ActivityRecordRepository, ActivityRepository, RepositoryError};

use super::{map_repo, owned_activity};

const MAX_NAME_LEN: usize = 100;
const MAX_LABEL_LEN: usize = 16;
/// Largest weekly target that still fits the seconds column.
const MAX_TARGET_MINUTES: i32 = i32::MAX / 60;

/// Caller-supplied fields for a new activity. The target is in minutes, as on
/// the wire; storage is in seconds.
#[derive(Debug, Clone)]
pub struct ActivityDraft {
    pub name: String,
    pub target_minutes: i32,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// An activity together with its tracked totals, as list views render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityWithStats {
    pub id: ActivityId,
    pub name: String,
    /// All-time finished minutes.
    pub total_time: i64,
    /// Finished minutes in the current week.
    pub weekly_time: i64,
    /// Weekly target in minutes.
    pub target_time: i32,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// CRUD over a user's activities.
pub struct ActivityService<A, R> {
    activities: Arc<A>,
    records: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<A, R> ActivityService<A, R>
where
    A: ActivityRepository,
    R: ActivityRecordRepository,
{
    pub fn new(activities: Arc<A>, records: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            activities,
            records,
            clock,
        }
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(
        &self,
        user_id: UserId,
        draft: ActivityDraft,
    ) -> Result<ActivityWithStats, DomainError> {
        validate_name(&draft.name)?;
        validate_target(draft.target_minutes)?;
        validate_label("color", draft.color.as_deref())?;
        validate_label("icon", draft.icon.as_deref())?;

        if self
            .activities
            .exists_by_user_and_name(user_id, &draft.name)
            .await
            .map_err(map_repo)?
        {
            return Err(duplicate_name(&draft.name));
        }

        let activity = self
            .activities
            .insert(&NewActivity {
                user_id,
                name: draft.name.clone(),
                target_time: draft.target_minutes * 60,
                color: draft.color,
                icon: draft.icon,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => duplicate_name(&draft.name),
                other => map_repo(other),
            })?;

        self.with_stats(activity).await
    }

    pub async fn list(&self, user_id: UserId) -> Result<Vec<ActivityWithStats>, DomainError> {
        let activities = self
            .activities
            .list_by_user(user_id)
            .await
            .map_err(map_repo)?;

        let mut out = Vec::with_capacity(activities.len());
        for activity in activities {
            out.push(self.with_stats(activity).await?);
        }
        Ok(out)
    }

    pub async fn get(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<ActivityWithStats, DomainError> {
        let activity = owned_activity(self.activities.as_ref(), user_id, activity_id).await?;
        self.with_stats(activity).await
    }

    /// Partial update; absent fields keep their current value.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        patch: ActivityPatch,
    ) -> Result<ActivityWithStats, DomainError> {
        let mut activity = owned_activity(self.activities.as_ref(), user_id, activity_id).await?;

        if let Some(name) = patch.name {
            validate_name(&name)?;
            if name != activity.name
                && self
                    .activities
                    .exists_by_user_and_name(user_id, &name)
                    .await
                    .map_err(map_repo)?
            {
                return Err(duplicate_name(&name));
            }
            activity.name = name;
        }
        if let Some(target_minutes) = patch.target_minutes {
            validate_target(target_minutes)?;
            activity.target_time = target_minutes * 60;
        }
        if let Some(color) = patch.color {
            validate_label("color", Some(&color))?;
            activity.color = Some(color);
        }
        if let Some(icon) = patch.icon {
            validate_label("icon", Some(&icon))?;
            activity.icon = Some(icon);
        }

        let name = activity.name.clone();
        let updated = self
            .activities
            .update(&activity)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => duplicate_name(&name),
                other => map_repo(other),
            })?;

        self.with_stats(updated).await
    }

    /// Removes the activity and, through the schema, all of its records.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: UserId, activity_id: ActivityId) -> Result<(), DomainError> {
        owned_activity(self.activities.as_ref(), user_id, activity_id).await?;
        self.activities
            .delete(activity_id)
            .await
            .map_err(map_repo)
    }

    async fn with_stats(&self, activity: Activity) -> Result<ActivityWithStats, DomainError> {
        let total_minutes = self
            .records
            .finished_seconds(activity.user_id, Some(activity.id), None)
            .await
            .map_err(map_repo)?
            / 60;

        let week = bounds(Period::Week, self.clock.now());
        let weekly_minutes = self
            .records
            .finished_seconds(activity.user_id, Some(activity.id), Some((week.start, week.end)))
            .await
            .map_err(map_repo)?
            / 60;

        let target_time = activity.target_minutes();
        Ok(ActivityWithStats {
            id: activity.id,
            name: activity.name,
            total_time: total_minutes,
            weekly_time: weekly_minutes,
            target_time,
            color: activity.color,
            icon: activity.icon,
        })
    }
}

fn duplicate_name(name: &str) -> DomainError {
    DomainError::InvalidInput(format!(
        "Activity with name '{name}' already exists for this user"
    ))
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation(
            "Activity name must not be blank".to_string(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "Activity name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_target(target_minutes: i32) -> Result<(), DomainError> {
    if target_minutes < 0 {
        return Err(DomainError::Validation(
            "Target time must not be negative".to_string(),
        ));
    }
    if target_minutes > MAX_TARGET_MINUTES {
        return Err(DomainError::Validation(format!(
            "Target time must be at most {MAX_TARGET_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn validate_label(field: &str, value: Option<&str>) -> Result<(), DomainError> {
    match value {
        Some(v) if v.len() > MAX_LABEL_LEN => Err(DomainError::Validation(format!(
            "{field} must be at most {MAX_LABEL_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::FixedClock;
    use crate::domain::models::{NewRecord, RecordSource};
    use crate::repositories::InMemoryStore;
    use time::macros::datetime;

    const USER: UserId = UserId::new(1);
    const NOW: time::OffsetDateTime = datetime!(2025-08-20 15:00 +8);

    fn service(store: &InMemoryStore) -> ActivityService<InMemoryStore, InMemoryStore> {
        ActivityService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(FixedClock(NOW)),
        )
    }

    fn draft(name: &str, target_minutes: i32) -> ActivityDraft {
        ActivityDraft {
            name: name.to_string(),
            target_minutes,
            color: None,
            icon: None,
        }
    }

    #[tokio::test]
    async fn create_stores_target_in_seconds_and_reports_minutes() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        let activity = svc.create(USER, draft("reading", 90)).await.unwrap();
        assert_eq!(activity.target_time, 90);
        assert_eq!(activity.total_time, 0);

        let stored = ActivityRepository::find_by_id(&store, activity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.target_time, 5400);
    }

    #[tokio::test]
    async fn create_validates_fields() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        for bad in [
            draft("", 30),
            draft("   ", 30),
            draft(&"x".repeat(101), 30),
            draft("reading", -1),
            draft("reading", 40_000_000),
            ActivityDraft {
                color: Some("a-very-long-color-name".to_string()),
                ..draft("reading", 30)
            },
        ] {
            let err = svc.create(USER, bad).await.unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn target_is_bounded_by_the_seconds_column() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        // the largest target whose seconds value still fits i32
        let activity = svc
            .create(USER, draft("reading", MAX_TARGET_MINUTES))
            .await
            .unwrap();
        assert_eq!(activity.target_time, MAX_TARGET_MINUTES);

        let err = svc
            .update(
                USER,
                activity.id,
                ActivityPatch {
                    target_minutes: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_per_user() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        svc.create(USER, draft("reading", 30)).await.unwrap();
        let err = svc.create(USER, draft("reading", 60)).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        // a different user may reuse the name
        svc.create(UserId::new(2), draft("reading", 30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        let activity = svc
            .create(
                USER,
                ActivityDraft {
                    color: Some("red".to_string()),
                    ..draft("reading", 30)
                },
            )
            .await
            .unwrap();

        let updated = svc
            .update(
                USER,
                activity.id,
                ActivityPatch {
                    target_minutes: Some(60),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "reading");
        assert_eq!(updated.target_time, 60);
        assert_eq!(updated.color.as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn rename_to_existing_name_is_rejected() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        svc.create(USER, draft("reading", 30)).await.unwrap();
        let writing = svc.create(USER, draft("writing", 30)).await.unwrap();

        let err = svc
            .update(
                USER,
                writing.id,
                ActivityPatch {
                    name: Some("reading".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        // renaming to its own name is fine
        svc.update(
            USER,
            writing.id,
            ActivityPatch {
                name: Some("writing".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn list_carries_totals_per_activity() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        let reading = svc.create(USER, draft("reading", 60)).await.unwrap();
        svc.create(USER, draft("writing", 60)).await.unwrap();

        ActivityRecordRepository::insert(
            &store,
            &NewRecord {
                user_id: USER,
                activity_id: reading.id,
                source: RecordSource::Manual,
                duration: Some(1800),
                executed_at: datetime!(2025-08-19 10:00 +8),
            },
        )
        .await
        .unwrap();
        // previous week counts toward the all-time total only
        ActivityRecordRepository::insert(
            &store,
            &NewRecord {
                user_id: USER,
                activity_id: reading.id,
                source: RecordSource::Manual,
                duration: Some(600),
                executed_at: datetime!(2025-08-10 10:00 +8),
            },
        )
        .await
        .unwrap();

        let listed = svc.list(USER).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "reading");
        assert_eq!(listed[0].total_time, 40);
        assert_eq!(listed[0].weekly_time, 30);
        assert_eq!(listed[1].total_time, 0);
    }

    #[tokio::test]
    async fn delete_requires_ownership_and_cascades() {
        let store = InMemoryStore::new();
        let svc = service(&store);

        let activity = svc.create(USER, draft("reading", 30)).await.unwrap();
        ActivityRecordRepository::insert(
            &store,
            &NewRecord {
                user_id: USER,
                activity_id: activity.id,
                source: RecordSource::Manual,
                duration: Some(600),
                executed_at: NOW,
            },
        )
        .await
        .unwrap();

        let err = svc.delete(UserId::new(2), activity.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        svc.delete(USER, activity.id).await.unwrap();
        assert_eq!(store.record_count(), 0);
        assert!(matches!(
            svc.get(USER, activity.id).await.unwrap_err(),
            DomainError::NotFound(_)
        ));
    }
}
