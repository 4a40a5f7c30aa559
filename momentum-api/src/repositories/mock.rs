//! In-memory repository implementations for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::models::{
    Activity, ActivityId, ActivityRecord, FinishedSlice, NewActivity, NewRecord, PageRequest,
    RecordDraft, RecordFilter, RecordId, RecordPage, RecordSource, UserId,
};

use super::activity_repo::ActivityRepository;
use super::record_repo::ActivityRecordRepository;
use super::repo_error::RepositoryError;

const RUNNING_CONFLICT: &str = "a LIVE record is already running for this activity";

/// Activity and record store backed by in-memory HashMaps.
///
/// Mirrors the Postgres repositories closely enough for service tests: the
/// unique activity name per user, the single-running-record rule, cascade
/// delete, and the listing sort order all behave as in the real schema.
/// Timestamps come from a per-store counter so insertion order is total.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    activities: Arc<RwLock<HashMap<ActivityId, Activity>>>,
    records: Arc<RwLock<HashMap<RecordId, ActivityRecord>>>,
    seq: Arc<AtomicI64>,
}

#[allow(dead_code)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value of the store clock; strictly increasing.
    fn tick(&self) -> OffsetDateTime {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(n)
    }

    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Get a record regardless of owner (for test assertions).
    pub fn record(&self, id: RecordId) -> Option<ActivityRecord> {
        self.records.read().unwrap().get(&id).cloned()
    }
}

fn matches_filter(record: &ActivityRecord, user_id: UserId, filter: &RecordFilter) -> bool {
    if record.user_id != user_id {
        return false;
    }
    if let Some(activity_id) = filter.activity_id {
        if record.activity_id != activity_id {
            return false;
        }
    }

    if filter.running_only {
        return record.is_running();
    }

    if let Some(source) = filter.source {
        if record.source != source {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if record.executed_at < from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if record.executed_at >= to {
            return false;
        }
    }

    true
}

fn is_finished_in(
    record: &ActivityRecord,
    user_id: UserId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> bool {
    record.user_id == user_id
        && record.duration.is_some()
        && record.executed_at >= start
        && record.executed_at < end
}

#[async_trait]
impl ActivityRepository for InMemoryStore {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError> {
        Ok(self.activities.read().unwrap().get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Activity>, RepositoryError> {
        let mut activities: Vec<Activity> = self
            .activities
            .read()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        activities.sort_by_key(|a| a.created_at);
        Ok(activities)
    }

    async fn exists_by_user_and_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .activities
            .read()
            .unwrap()
            .values()
            .any(|a| a.user_id == user_id && a.name == name))
    }

    async fn insert(&self, activity: &NewActivity) -> Result<Activity, RepositoryError> {
        let now = self.tick();
        let mut activities = self.activities.write().unwrap();
        if activities
            .values()
            .any(|a| a.user_id == activity.user_id && a.name == activity.name)
        {
            return Err(RepositoryError::Conflict(
                "activity name already in use".to_string(),
            ));
        }

        let inserted = Activity {
            id: ActivityId::new(Uuid::new_v4()),
            user_id: activity.user_id,
            name: activity.name.clone(),
            target_time: activity.target_time,
            color: activity.color.clone(),
            icon: activity.icon.clone(),
            created_at: now,
            updated_at: now,
        };
        activities.insert(inserted.id, inserted.clone());
        Ok(inserted)
    }

    async fn update(&self, activity: &Activity) -> Result<Activity, RepositoryError> {
        let now = self.tick();
        let mut activities = self.activities.write().unwrap();
        if activities
            .values()
            .any(|a| a.user_id == activity.user_id && a.name == activity.name && a.id != activity.id)
        {
            return Err(RepositoryError::Conflict(
                "activity name already in use".to_string(),
            ));
        }

        let existing = activities
            .get_mut(&activity.id)
            .ok_or_else(|| RepositoryError::NotFound(activity.id.to_string()))?;
        existing.name = activity.name.clone();
        existing.target_time = activity.target_time;
        existing.color = activity.color.clone();
        existing.icon = activity.icon.clone();
        existing.updated_at = now;
        Ok(existing.clone())
    }

    async fn delete(&self, id: ActivityId) -> Result<(), RepositoryError> {
        let mut activities = self.activities.write().unwrap();
        if activities.remove(&id).is_none() {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        // ON DELETE CASCADE
        self.records
            .write()
            .unwrap()
            .retain(|_, r| r.activity_id != id);
        Ok(())
    }

    async fn target_seconds_sum(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        Ok(self
            .activities
            .read()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.target_time as i64)
            .sum())
    }
}

#[async_trait]
impl ActivityRecordRepository for InMemoryStore {
    async fn find_by_id_and_user(
        &self,
        id: RecordId,
        user_id: UserId,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn insert(&self, record: &NewRecord) -> Result<ActivityRecord, RepositoryError> {
        let now = self.tick();
        let mut records = self.records.write().unwrap();
        let running = record.source == RecordSource::Live && record.duration.is_none();
        if running
            && records
                .values()
                .any(|r| r.user_id == record.user_id && r.activity_id == record.activity_id && r.is_running())
        {
            return Err(RepositoryError::Conflict(RUNNING_CONFLICT.to_string()));
        }

        let inserted = ActivityRecord {
            id: RecordId::new(Uuid::new_v4()),
            user_id: record.user_id,
            activity_id: record.activity_id,
            source: record.source,
            duration: record.duration,
            executed_at: record.executed_at,
            created_at: now,
            updated_at: now,
        };
        records.insert(inserted.id, inserted.clone());
        Ok(inserted)
    }

    async fn finish(
        &self,
        id: RecordId,
        user_id: UserId,
        duration_seconds: i32,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let now = self.tick();
        let mut records = self.records.write().unwrap();
        let Some(record) = records.get_mut(&id).filter(|r| r.user_id == user_id) else {
            return Ok(None);
        };
        if !record.is_running() {
            return Ok(None);
        }
        record.duration = Some(duration_seconds);
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn update(
        &self,
        id: RecordId,
        user_id: UserId,
        draft: &RecordDraft,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let now = self.tick();
        let mut records = self.records.write().unwrap();
        match records.get(&id) {
            Some(r) if r.user_id == user_id && !r.is_running() => {}
            _ => return Ok(None),
        }

        let becomes_running = draft.source == RecordSource::Live && draft.duration.is_none();
        if becomes_running
            && records
                .values()
                .any(|r| r.user_id == user_id && r.activity_id == draft.activity_id && r.is_running() && r.id != id)
        {
            return Err(RepositoryError::Conflict(RUNNING_CONFLICT.to_string()));
        }

        let Some(record) = records.get_mut(&id) else {
            return Ok(None);
        };
        record.activity_id = draft.activity_id;
        record.source = draft.source;
        record.duration = draft.duration;
        record.executed_at = draft.executed_at;
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: RecordId, user_id: UserId) -> Result<(), RepositoryError> {
        let mut records = self.records.write().unwrap();
        match records.get(&id) {
            Some(r) if r.user_id == user_id => {
                records.remove(&id);
                Ok(())
            }
            _ => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn list(
        &self,
        user_id: UserId,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<RecordPage, RepositoryError> {
        let records = self.records.read().unwrap();
        let mut matched: Vec<ActivityRecord> = records
            .values()
            .filter(|r| matches_filter(r, user_id, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.executed_at
                .cmp(&a.executed_at)
                .then(b.created_at.cmp(&a.created_at))
                .then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect();

        Ok(RecordPage {
            items,
            page: page.page,
            size: page.size,
            total,
        })
    }

    async fn finished_seconds(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        range: Option<(OffsetDateTime, OffsetDateTime)>,
    ) -> Result<i64, RepositoryError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| activity_id.is_none_or(|id| r.activity_id == id))
            .filter(|r| {
                range.is_none_or(|(start, end)| r.executed_at >= start && r.executed_at < end)
            })
            .filter_map(|r| r.duration)
            .map(i64::from)
            .sum())
    }

    async fn top_activity_in_range(
        &self,
        user_id: UserId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<ActivityId>, RepositoryError> {
        let records = self.records.read().unwrap();
        let mut totals: HashMap<ActivityId, (i64, OffsetDateTime)> = HashMap::new();
        for record in records
            .values()
            .filter(|r| is_finished_in(r, user_id, start, end))
        {
            let duration = i64::from(record.duration.unwrap_or(0));
            let entry = totals
                .entry(record.activity_id)
                .or_insert((0, record.executed_at));
            entry.0 += duration;
            entry.1 = entry.1.max(record.executed_at);
        }

        Ok(totals
            .into_iter()
            .max_by_key(|(_, (sum, latest))| (*sum, *latest))
            .map(|(activity_id, _)| activity_id))
    }

    async fn finished_in_range(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<FinishedSlice>, RepositoryError> {
        Ok(self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| is_finished_in(r, user_id, start, end))
            .filter(|r| activity_id.is_none_or(|id| r.activity_id == id))
            .filter_map(|r| {
                r.duration.map(|duration| FinishedSlice {
                    executed_at: r.executed_at,
                    duration,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_record(user: i32, activity: ActivityId, at: OffsetDateTime) -> NewRecord {
        NewRecord {
            user_id: UserId::new(user),
            activity_id: activity,
            source: RecordSource::Live,
            duration: None,
            executed_at: at,
        }
    }

    fn manual_record(
        user: i32,
        activity: ActivityId,
        seconds: i32,
        at: OffsetDateTime,
    ) -> NewRecord {
        NewRecord {
            user_id: UserId::new(user),
            activity_id: activity,
            source: RecordSource::Manual,
            duration: Some(seconds),
            executed_at: at,
        }
    }

    async fn seed_activity(store: &InMemoryStore, user: i32, name: &str) -> Activity {
        ActivityRepository::insert(
            store,
            &NewActivity {
                user_id: UserId::new(user),
                name: name.to_string(),
                target_time: 3600,
                color: None,
                icon: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn second_running_record_for_same_activity_conflicts() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, 1, "reading").await;
        let now = OffsetDateTime::UNIX_EPOCH;

        ActivityRecordRepository::insert(&store, &live_record(1, activity.id, now))
            .await
            .unwrap();

        let err = ActivityRecordRepository::insert(&store, &live_record(1, activity.id, now))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // another user is unaffected
        ActivityRecordRepository::insert(&store, &live_record(2, activity.id, now))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finish_is_one_way() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, 1, "reading").await;
        let now = OffsetDateTime::UNIX_EPOCH;
        let record = ActivityRecordRepository::insert(&store, &live_record(1, activity.id, now))
            .await
            .unwrap();

        let finished = store.finish(record.id, UserId::new(1), 90).await.unwrap();
        assert_eq!(finished.unwrap().duration, Some(90));

        // a second finish finds no running record
        let again = store.finish(record.id, UserId::new(1), 30).await.unwrap();
        assert!(again.is_none());
        assert_eq!(store.record(record.id).unwrap().duration, Some(90));
    }

    #[tokio::test]
    async fn deleting_activity_cascades_to_records() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, 1, "reading").await;
        let other = seed_activity(&store, 1, "writing").await;
        let now = OffsetDateTime::UNIX_EPOCH;

        ActivityRecordRepository::insert(&store, &manual_record(1, activity.id, 60, now))
            .await
            .unwrap();
        let kept = ActivityRecordRepository::insert(&store, &manual_record(1, other.id, 60, now))
            .await
            .unwrap();

        ActivityRepository::delete(&store, activity.id).await.unwrap();
        assert_eq!(store.record_count(), 1);
        assert!(store.record(kept.id).is_some());
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_counts_all_matches() {
        let store = InMemoryStore::new();
        let activity = seed_activity(&store, 1, "reading").await;
        let base = OffsetDateTime::UNIX_EPOCH;

        let older = ActivityRecordRepository::insert(
            &store,
            &manual_record(1, activity.id, 60, base + Duration::hours(1)),
        )
        .await
        .unwrap();
        let newer = ActivityRecordRepository::insert(
            &store,
            &manual_record(1, activity.id, 60, base + Duration::hours(2)),
        )
        .await
        .unwrap();
        // same executed_at as `older`, created later, so it wins the tie
        let tied = ActivityRecordRepository::insert(
            &store,
            &manual_record(1, activity.id, 60, base + Duration::hours(1)),
        )
        .await
        .unwrap();

        let page = store
            .list(
                UserId::new(1),
                &RecordFilter::default(),
                PageRequest { page: 0, size: 2 },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, newer.id);
        assert_eq!(page.items[1].id, tied.id);

        let rest = store
            .list(
                UserId::new(1),
                &RecordFilter::default(),
                PageRequest { page: 1, size: 2 },
            )
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].id, older.id);
    }

    #[tokio::test]
    async fn top_activity_breaks_ties_by_most_recent() {
        let store = InMemoryStore::new();
        let reading = seed_activity(&store, 1, "reading").await;
        let writing = seed_activity(&store, 1, "writing").await;
        let base = OffsetDateTime::UNIX_EPOCH;

        ActivityRecordRepository::insert(
            &store,
            &manual_record(1, reading.id, 600, base + Duration::hours(1)),
        )
        .await
        .unwrap();
        ActivityRecordRepository::insert(
            &store,
            &manual_record(1, writing.id, 600, base + Duration::hours(2)),
        )
        .await
        .unwrap();

        let top = store
            .top_activity_in_range(UserId::new(1), base, base + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(top, Some(writing.id));
    }
}
