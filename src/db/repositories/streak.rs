use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Pool, Postgres};
use tracing::instrument;

use crate::db::models::streak::UserId;
use crate::db::prelude::Tx;
use crate::streak::store::{StoreResult, StreakStore};

#[derive(Debug, Clone, Copy)]
pub struct StreakRepository {
    pool: &'static Pool<Postgres>,
}

impl StreakRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreakStore for StreakRepository {
    type Tx = Tx<'static>;

    async fn begin(&self) -> StoreResult<Tx<'static>> {
        Tx::begin(self.pool).await
    }

    #[instrument(skip(self))]
    async fn streak_count(&self, user_id: UserId) -> StoreResult<Option<i32>> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT streak_count
              FROM streaks
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn break_missed_streaks(&self, yesterday: NaiveDate, threshold: i32) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE streaks
               SET streak_count = 0
             WHERE last_count_date = $1
               AND daily_count < $2
            "#,
        )
        .bind(yesterday)
        .bind(threshold)
        .execute(self.pool)
        .await;

        match result {
            Ok(res) => Ok(res.rows_affected()),
            Err(e) => {
                tracing::error!(error = ?e, "failure while breaking missed streaks");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn reset_daily_counts(&self, today: NaiveDate, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE streaks
               SET daily_count = 0,
                   last_count_date = $1,
                   updated_at = $2
            "#,
        )
        .bind(today)
        .bind(now)
        .execute(self.pool)
        .await;

        match result {
            Ok(res) => Ok(res.rows_affected()),
            Err(e) => {
                tracing::error!(error = ?e, "failure while resetting daily counts");
                Err(e.into())
            }
        }
    }
}
