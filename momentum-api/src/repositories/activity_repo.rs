use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::models::{Activity, ActivityId, NewActivity, UserId};

use super::repo_error::RepositoryError;

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError>;
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Activity>, RepositoryError>;
    async fn exists_by_user_and_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<bool, RepositoryError>;
    async fn insert(&self, activity: &NewActivity) -> Result<Activity, RepositoryError>;
    async fn update(&self, activity: &Activity) -> Result<Activity, RepositoryError>;
    async fn delete(&self, id: ActivityId) -> Result<(), RepositoryError>;
    /// Sum of weekly targets (seconds) across all of the user's activities.
    async fn target_seconds_sum(&self, user_id: UserId) -> Result<i64, RepositoryError>;
}

pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACTIVITY_COLUMNS: &str = "id, user_id, name, target_time, color, icon, created_at, updated_at";

fn map_unique_violation(err: sqlx::Error, message: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(message.to_string())
        }
        _ => RepositoryError::DatabaseError(err),
    }
}

#[async_trait]
impl ActivityRepository for PgActivityRepository {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError> {
        let activity = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(activity)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Activity>, RepositoryError> {
        let activities = sqlx::query_as::<_, Activity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    async fn exists_by_user_and_name(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM activities WHERE user_id = $1 AND name = $2)",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, activity: &NewActivity) -> Result<Activity, RepositoryError> {
        let inserted = sqlx::query_as::<_, Activity>(&format!(
            "INSERT INTO activities (user_id, name, target_time, color, icon) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ACTIVITY_COLUMNS}"
        ))
        .bind(activity.user_id)
        .bind(&activity.name)
        .bind(activity.target_time)
        .bind(&activity.color)
        .bind(&activity.icon)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "activity name already in use"))?;

        Ok(inserted)
    }

    async fn update(&self, activity: &Activity) -> Result<Activity, RepositoryError> {
        let updated = sqlx::query_as::<_, Activity>(&format!(
            "UPDATE activities \
             SET name = $1, target_time = $2, color = $3, icon = $4, updated_at = now() \
             WHERE id = $5 \
             RETURNING {ACTIVITY_COLUMNS}"
        ))
        .bind(&activity.name)
        .bind(activity.target_time)
        .bind(&activity.color)
        .bind(&activity.icon)
        .bind(activity.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "activity name already in use"))?;

        updated.ok_or_else(|| RepositoryError::NotFound(activity.id.to_string()))
    }

    async fn delete(&self, id: ActivityId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn target_seconds_sum(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(target_time), 0)::bigint FROM activities WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}
