use std::sync::Arc;

use time::OffsetDateTime;
use tracing::instrument;

use crate::domain::models::{
    ActivityId, ActivityRecord, PageRequest, RecordDraft, RecordFilter, RecordId, RecordPage,
    RecordSource, UserId,
};
use crate::domain::DomainError;
use crate::repositories::{ActivityRecordRepository, ActivityRepository, RepositoryError};

use super::{map_repo, owned_activity};

const RECORD_NOT_FOUND: &str = "Record not found or does not belong to user";
const RUNNING_CONFLICT: &str = "A LIVE record is already running for this activity";
const NOT_RUNNING: &str = "Record is not a running LIVE record";
const UPDATE_RUNNING: &str =
    "Cannot update a running LIVE record. Use finish endpoint or delete and recreate.";

/// Lifecycle operations on activity records.
pub struct RecordService<R, A> {
    records: Arc<R>,
    activities: Arc<A>,
}

impl<R, A> RecordService<R, A>
where
    R: ActivityRecordRepository,
    A: ActivityRepository,
{
    pub fn new(records: Arc<R>, activities: Arc<A>) -> Self {
        Self {
            records,
            activities,
        }
    }

    #[instrument(skip(self, draft), fields(activity_id = %draft.activity_id, source = %draft.source))]
    pub async fn create(
        &self,
        user_id: UserId,
        draft: RecordDraft,
    ) -> Result<ActivityRecord, DomainError> {
        validate_source_rules(draft.source, draft.duration)?;
        owned_activity(self.activities.as_ref(), user_id, draft.activity_id).await?;

        let new_record = crate::domain::models::NewRecord {
            user_id,
            activity_id: draft.activity_id,
            source: draft.source,
            duration: draft.duration,
            executed_at: draft.executed_at,
        };
        // The partial unique index is the arbiter under concurrency; a repo
        // conflict maps straight onto the domain message.
        self.records.insert(&new_record).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => DomainError::Conflict(RUNNING_CONFLICT.to_string()),
            other => map_repo(other),
        })
    }

    /// Stops a running LIVE record, deriving the duration from the elapsed
    /// wall time. Finishing is one-way.
    #[instrument(skip(self))]
    pub async fn finish(
        &self,
        user_id: UserId,
        record_id: RecordId,
        end_at: OffsetDateTime,
    ) -> Result<ActivityRecord, DomainError> {
        let record = self
            .records
            .find_by_id_and_user(record_id, user_id)
            .await
            .map_err(map_repo)?
            .ok_or_else(|| DomainError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        if !record.is_running() {
            return Err(DomainError::Conflict(NOT_RUNNING.to_string()));
        }
        if end_at <= record.executed_at {
            return Err(DomainError::InvalidInput(
                "End time must be after execution time".to_string(),
            ));
        }

        let seconds = (end_at - record.executed_at).whole_seconds();
        if seconds == 0 {
            return Err(DomainError::InvalidInput(
                "End time must be at least one second after execution time".to_string(),
            ));
        }
        let duration = i32::try_from(seconds)
            .map_err(|_| DomainError::InvalidInput("Duration too large".to_string()))?;

        // The guarded update matches zero rows if another request finished the
        // record in the meantime.
        self.records
            .finish(record_id, user_id, duration)
            .await
            .map_err(map_repo)?
            .ok_or_else(|| DomainError::Conflict(NOT_RUNNING.to_string()))
    }

    #[instrument(skip(self, draft))]
    pub async fn update(
        &self,
        user_id: UserId,
        record_id: RecordId,
        draft: RecordDraft,
    ) -> Result<ActivityRecord, DomainError> {
        validate_source_rules(draft.source, draft.duration)?;

        let record = self
            .records
            .find_by_id_and_user(record_id, user_id)
            .await
            .map_err(map_repo)?
            .ok_or_else(|| DomainError::NotFound(RECORD_NOT_FOUND.to_string()))?;

        if record.is_running() {
            return Err(DomainError::Conflict(UPDATE_RUNNING.to_string()));
        }
        if record.activity_id != draft.activity_id {
            owned_activity(self.activities.as_ref(), user_id, draft.activity_id)
                .await
                .map_err(|_| {
                    DomainError::NotFound(
                        "Target activity not found or does not belong to user".to_string(),
                    )
                })?;
        }

        self.records
            .update(record_id, user_id, &draft)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => DomainError::Conflict(RUNNING_CONFLICT.to_string()),
                other => map_repo(other),
            })?
            .ok_or_else(|| DomainError::NotFound(RECORD_NOT_FOUND.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: UserId, record_id: RecordId) -> Result<(), DomainError> {
        self.records
            .delete(record_id, user_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => {
                    DomainError::NotFound(RECORD_NOT_FOUND.to_string())
                }
                other => map_repo(other),
            })
    }

    pub async fn get(
        &self,
        user_id: UserId,
        record_id: RecordId,
    ) -> Result<ActivityRecord, DomainError> {
        self.records
            .find_by_id_and_user(record_id, user_id)
            .await
            .map_err(map_repo)?
            .ok_or_else(|| DomainError::NotFound(RECORD_NOT_FOUND.to_string()))
    }

    #[instrument(skip(self, filter))]
    pub async fn list(
        &self,
        user_id: UserId,
        filter: RecordFilter,
        page: PageRequest,
    ) -> Result<RecordPage, DomainError> {
        self.records
            .list(user_id, &filter, page)
            .await
            .map_err(map_repo)
    }

    /// Currently running LIVE records, optionally narrowed to one activity.
    pub async fn list_running(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        page: PageRequest,
    ) -> Result<RecordPage, DomainError> {
        let filter = RecordFilter {
            activity_id,
            running_only: true,
            ..Default::default()
        };
        self.records
            .list(user_id, &filter, page)
            .await
            .map_err(map_repo)
    }
}

fn validate_source_rules(source: RecordSource, duration: Option<i32>) -> Result<(), DomainError> {
    match source {
        RecordSource::Manual => match duration {
            Some(d) if d > 0 => Ok(()),
            _ => Err(DomainError::InvalidInput(
                "Duration is required and must be positive for MANUAL records".to_string(),
            )),
        },
        RecordSource::Live => match duration {
            None => Ok(()),
            Some(_) => Err(DomainError::InvalidInput(
                "Duration must be null for LIVE records".to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NewActivity;
    use crate::repositories::InMemoryStore;
    use time::Duration;
    use uuid::Uuid;

    const USER: UserId = UserId::new(1);
    const OTHER_USER: UserId = UserId::new(2);

    fn service(store: &InMemoryStore) -> RecordService<InMemoryStore, InMemoryStore> {
        RecordService::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    async fn seed_activity(store: &InMemoryStore, user: UserId, name: &str) -> ActivityId {
        ActivityRepository::insert(
            store,
            &NewActivity {
                user_id: user,
                name: name.to_string(),
                target_time: 3600,
                color: None,
                icon: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn manual(activity_id: ActivityId, seconds: i32, at: OffsetDateTime) -> RecordDraft {
        RecordDraft {
            activity_id,
            source: RecordSource::Manual,
            duration: Some(seconds),
            executed_at: at,
        }
    }

    fn live(activity_id: ActivityId, at: OffsetDateTime) -> RecordDraft {
        RecordDraft {
            activity_id,
            source: RecordSource::Live,
            duration: None,
            executed_at: at,
        }
    }

    #[tokio::test]
    async fn create_manual_record() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        let record = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();

        assert_eq!(record.duration, Some(600));
        assert!(!record.is_running());
    }

    #[tokio::test]
    async fn manual_record_requires_positive_duration() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        for duration in [None, Some(0), Some(-5)] {
            let draft = RecordDraft {
                activity_id: activity,
                source: RecordSource::Manual,
                duration,
                executed_at: OffsetDateTime::UNIX_EPOCH,
            };
            let err = svc.create(USER, draft).await.unwrap_err();
            assert!(matches!(err, DomainError::InvalidInput(_)), "{duration:?}");
        }
    }

    #[tokio::test]
    async fn live_record_rejects_duration() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        let draft = RecordDraft {
            activity_id: activity,
            source: RecordSource::Live,
            duration: Some(60),
            executed_at: OffsetDateTime::UNIX_EPOCH,
        };
        let err = svc.create(USER, draft).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_rejects_foreign_activity() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, OTHER_USER, "reading").await;
        let svc = service(&store);

        let err = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let err = svc
            .create(
                USER,
                manual(
                    ActivityId::new(Uuid::new_v4()),
                    600,
                    OffsetDateTime::UNIX_EPOCH,
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_live_record_conflicts() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let other = seed_activity(&store, USER, "writing").await;
        let svc = service(&store);

        svc.create(USER, live(activity, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let err = svc
            .create(USER, live(activity, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        // a different activity may run concurrently
        svc.create(USER, live(other, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finish_computes_whole_second_duration() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);
        let start = OffsetDateTime::UNIX_EPOCH;

        let record = svc.create(USER, live(activity, start)).await.unwrap();
        let finished = svc
            .finish(USER, record.id, start + Duration::seconds(90) + Duration::milliseconds(700))
            .await
            .unwrap();

        assert_eq!(finished.duration, Some(90));
    }

    #[tokio::test]
    async fn finish_rejects_end_before_start() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);
        let start = OffsetDateTime::UNIX_EPOCH;

        let record = svc.create(USER, live(activity, start)).await.unwrap();

        let err = svc
            .finish(USER, record.id, start - Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let err = svc.finish(USER, record.id, start).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        // after the start but rounding down to zero seconds
        let err = svc
            .finish(USER, record.id, start + Duration::milliseconds(400))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn finish_twice_conflicts() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);
        let start = OffsetDateTime::UNIX_EPOCH;

        let record = svc.create(USER, live(activity, start)).await.unwrap();
        svc.finish(USER, record.id, start + Duration::minutes(5))
            .await
            .unwrap();

        let err = svc
            .finish(USER, record.id, start + Duration::minutes(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn finish_a_manual_record_conflicts() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        let record = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let err = svc
            .finish(USER, record.id, OffsetDateTime::UNIX_EPOCH + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_rewrites_a_finished_record() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let target = seed_activity(&store, USER, "writing").await;
        let svc = service(&store);

        let record = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let updated = svc
            .update(
                USER,
                record.id,
                manual(target, 1200, OffsetDateTime::UNIX_EPOCH + Duration::hours(1)),
            )
            .await
            .unwrap();

        assert_eq!(updated.activity_id, target);
        assert_eq!(updated.duration, Some(1200));
    }

    #[tokio::test]
    async fn update_running_record_conflicts() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        let record = svc
            .create(USER, live(activity, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let err = svc
            .update(USER, record.id, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_rejects_foreign_target_activity() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let foreign = seed_activity(&store, OTHER_USER, "writing").await;
        let svc = service(&store);

        let record = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();
        let err = svc
            .update(USER, record.id, manual(foreign, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn records_are_scoped_to_their_owner() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let svc = service(&store);

        let record = svc
            .create(USER, manual(activity, 600, OffsetDateTime::UNIX_EPOCH))
            .await
            .unwrap();

        assert!(matches!(
            svc.get(OTHER_USER, record.id).await.unwrap_err(),
            DomainError::NotFound(_)
        ));
        assert!(matches!(
            svc.delete(OTHER_USER, record.id).await.unwrap_err(),
            DomainError::NotFound(_)
        ));
        // still there for the owner
        svc.get(USER, record.id).await.unwrap();
        svc.delete(USER, record.id).await.unwrap();
        assert!(matches!(
            svc.get(USER, record.id).await.unwrap_err(),
            DomainError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_running_ignores_time_filters() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, USER, "reading").await;
        let other = seed_activity(&store, USER, "writing").await;
        let svc = service(&store);
        let start = OffsetDateTime::UNIX_EPOCH;

        svc.create(USER, manual(activity, 600, start)).await.unwrap();
        let running = svc.create(USER, live(activity, start)).await.unwrap();
        svc.create(USER, live(other, start)).await.unwrap();

        let page = svc
            .list_running(USER, None, PageRequest { page: 0, size: 20 })
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = svc
            .list_running(USER, Some(activity), PageRequest { page: 0, size: 20 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, running.id);
    }

    #[tokio::test]
    async fn list_filters_compose() {
        let store = InMemoryStore::new();
        let reading = seed_activity(&store, USER, "reading").await;
        let writing = seed_activity(&store, USER, "writing").await;
        let svc = service(&store);
        let base = OffsetDateTime::UNIX_EPOCH;

        svc.create(USER, manual(reading, 600, base)).await.unwrap();
        svc.create(USER, manual(reading, 600, base + Duration::days(2)))
            .await
            .unwrap();
        svc.create(USER, manual(writing, 600, base + Duration::days(2)))
            .await
            .unwrap();

        let filter = RecordFilter {
            activity_id: Some(reading),
            from: Some(base + Duration::days(1)),
            ..Default::default()
        };
        let page = svc
            .list(USER, filter, PageRequest { page: 0, size: 20 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        // `to` is exclusive
        let filter = RecordFilter {
            to: Some(base + Duration::days(2)),
            ..Default::default()
        };
        let page = svc
            .list(USER, filter, PageRequest { page: 0, size: 20 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
