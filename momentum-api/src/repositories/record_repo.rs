use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::domain::models::{
    ActivityId, ActivityRecord, FinishedSlice, NewRecord, PageRequest, RecordDraft, RecordFilter,
    RecordId, RecordPage, UserId,
};

use super::repo_error::RepositoryError;

#[async_trait]
pub trait ActivityRecordRepository: Send + Sync {
    async fn find_by_id_and_user(
        &self,
        id: RecordId,
        user_id: UserId,
    ) -> Result<Option<ActivityRecord>, RepositoryError>;
    /// Inserts a record. Racing inserts of a second running LIVE record for
    /// the same (user, activity) fail with `Conflict` via the partial unique
    /// index.
    async fn insert(&self, record: &NewRecord) -> Result<ActivityRecord, RepositoryError>;
    /// Sets the duration of a running LIVE record. `None` means the record is
    /// not (or no longer) running.
    async fn finish(
        &self,
        id: RecordId,
        user_id: UserId,
        duration_seconds: i32,
    ) -> Result<Option<ActivityRecord>, RepositoryError>;
    /// Overwrites a non-running record. `None` means the record went missing
    /// or is running.
    async fn update(
        &self,
        id: RecordId,
        user_id: UserId,
        draft: &RecordDraft,
    ) -> Result<Option<ActivityRecord>, RepositoryError>;
    async fn delete(&self, id: RecordId, user_id: UserId) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        user_id: UserId,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<RecordPage, RepositoryError>;
    /// Sum of finished durations (seconds), optionally narrowed to one
    /// activity and/or a half-open `[start, end)` window.
    async fn finished_seconds(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        range: Option<(OffsetDateTime, OffsetDateTime)>,
    ) -> Result<i64, RepositoryError>;
    /// Activity with the largest finished-duration sum in the window; ties go
    /// to the one tracked most recently.
    async fn top_activity_in_range(
        &self,
        user_id: UserId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<ActivityId>, RepositoryError>;
    async fn finished_in_range(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<FinishedSlice>, RepositoryError>;
}

pub struct PgActivityRecordRepository {
    pool: PgPool,
}

impl PgActivityRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RECORD_COLUMNS: &str =
    "id, user_id, activity_id, source, duration, executed_at, created_at, updated_at";

/// Composes the optional list filters into one WHERE clause instead of
/// enumerating every filter combination.
fn push_record_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    user_id: UserId,
    filter: &RecordFilter,
) {
    builder.push(" WHERE user_id = ").push_bind(user_id);

    if let Some(activity_id) = filter.activity_id {
        builder.push(" AND activity_id = ").push_bind(activity_id);
    }

    if filter.running_only {
        builder.push(" AND source = 'LIVE' AND duration IS NULL");
        return;
    }

    if let Some(source) = filter.source {
        builder.push(" AND source = ").push_bind(source);
    }
    if let Some(from) = filter.from {
        builder.push(" AND executed_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND executed_at < ").push_bind(to);
    }
}

#[async_trait]
impl ActivityRecordRepository for PgActivityRecordRepository {
    async fn find_by_id_and_user(
        &self,
        id: RecordId,
        user_id: UserId,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, ActivityRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM activity_records WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert(&self, record: &NewRecord) -> Result<ActivityRecord, RepositoryError> {
        let inserted = sqlx::query_as::<_, ActivityRecord>(&format!(
            "INSERT INTO activity_records (user_id, activity_id, source, duration, executed_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(record.user_id)
        .bind(record.activity_id)
        .bind(record.source)
        .bind(record.duration)
        .bind(record.executed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                "a LIVE record is already running for this activity".to_string(),
            ),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(inserted)
    }

    async fn finish(
        &self,
        id: RecordId,
        user_id: UserId,
        duration_seconds: i32,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, ActivityRecord>(&format!(
            "UPDATE activity_records \
             SET duration = $1, updated_at = now() \
             WHERE id = $2 AND user_id = $3 AND source = 'LIVE' AND duration IS NULL \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(duration_seconds)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update(
        &self,
        id: RecordId,
        user_id: UserId,
        draft: &RecordDraft,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, ActivityRecord>(&format!(
            "UPDATE activity_records \
             SET activity_id = $1, source = $2, duration = $3, executed_at = $4, updated_at = now() \
             WHERE id = $5 AND user_id = $6 AND NOT (source = 'LIVE' AND duration IS NULL) \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(draft.activity_id)
        .bind(draft.source)
        .bind(draft.duration)
        .bind(draft.executed_at)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                "a LIVE record is already running for this activity".to_string(),
            ),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(record)
    }

    async fn delete(&self, id: RecordId, user_id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM activity_records WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list(
        &self,
        user_id: UserId,
        filter: &RecordFilter,
        page: PageRequest,
    ) -> Result<RecordPage, RepositoryError> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM activity_records");
        push_record_filters(&mut count_query, user_id, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM activity_records"
        ));
        push_record_filters(&mut query, user_id, filter);
        query.push(" ORDER BY executed_at DESC, created_at DESC, id");
        query.push(" LIMIT ").push_bind(page.size as i64);
        query.push(" OFFSET ").push_bind(page.offset());

        let items = query
            .build_query_as::<ActivityRecord>()
            .fetch_all(&self.pool)
            .await?;

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
        let mut query = QueryBuilder::new(
            "SELECT COALESCE(SUM(duration), 0)::bigint FROM activity_records \
             WHERE duration IS NOT NULL AND user_id = ",
        );
        query.push_bind(user_id);
        if let Some(activity_id) = activity_id {
            query.push(" AND activity_id = ").push_bind(activity_id);
        }
        if let Some((start, end)) = range {
            query.push(" AND executed_at >= ").push_bind(start);
            query.push(" AND executed_at < ").push_bind(end);
        }

        let sum: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(sum)
    }

    async fn top_activity_in_range(
        &self,
        user_id: UserId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Option<ActivityId>, RepositoryError> {
        let top = sqlx::query_scalar::<_, ActivityId>(
            "SELECT activity_id FROM activity_records \
             WHERE user_id = $1 AND duration IS NOT NULL \
               AND executed_at >= $2 AND executed_at < $3 \
             GROUP BY activity_id \
             ORDER BY SUM(duration) DESC, MAX(executed_at) DESC \
             LIMIT 1",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(top)
    }

    async fn finished_in_range(
        &self,
        user_id: UserId,
        activity_id: Option<ActivityId>,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<FinishedSlice>, RepositoryError> {
        let mut query = QueryBuilder::new(
            "SELECT executed_at, duration FROM activity_records \
             WHERE duration IS NOT NULL AND user_id = ",
        );
        query.push_bind(user_id);
        if let Some(activity_id) = activity_id {
            query.push(" AND activity_id = ").push_bind(activity_id);
        }
        query.push(" AND executed_at >= ").push_bind(start);
        query.push(" AND executed_at < ").push_bind(end);

        let slices = query
            .build_query_as::<FinishedSlice>()
            .fetch_all(&self.pool)
            .await?;

        Ok(slices)
    }
}
