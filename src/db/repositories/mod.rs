use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};
use tracing::instrument;

use crate::db::models::ranking::{NewRanking, Ranking};
use crate::db::models::streak::{StreakRecord, UserId};
use crate::ranking::RankingTx;
use crate::streak::store::{StoreError, StoreResult, StreakTx};

pub mod streak;

/// Postgres transaction handle.
///
/// The inner sqlx transaction rolls back when dropped, so a `Tx` abandoned on an error path
/// never commits.
pub struct Tx<'a> {
    inner: Option<Transaction<'a, Postgres>>,
}

impl<'a> Tx<'a> {
    #[instrument(skip(pool))]
    pub async fn begin(pool: &'a Pool<Postgres>) -> StoreResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    fn inner_mut(&mut self) -> StoreResult<&mut Transaction<'a, Postgres>> {
        self.inner.as_mut().ok_or(StoreError::Completed)
    }
}

#[async_trait]
impl StreakTx for Tx<'_> {
    #[instrument(skip(self))]
    async fn lock_and_read(&mut self, user_id: UserId) -> StoreResult<Option<StreakRecord>> {
        let record = sqlx::query_as::<_, StreakRecord>(&format!(
            "SELECT {} FROM streaks WHERE user_id = $1 FOR UPDATE",
            sql_fragment::STREAK_FIELDS
        ))
        .bind(user_id)
        .fetch_optional(&mut **self.inner_mut()?)
        .await?;

        Ok(record)
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id))]
    async fn insert_row(&mut self, record: &StreakRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO streaks (
                user_id,
                daily_count,
                streak_count,
                last_count_date,
                last_streak_date,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id)
            DO NOTHING
            "#,
        )
        .bind(record.user_id)
        .bind(record.daily_count)
        .bind(record.streak_count)
        .bind(record.last_count_date)
        .bind(record.last_streak_date)
        .bind(record.updated_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id))]
    async fn update_row(&mut self, record: &StreakRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE streaks
               SET daily_count = $2,
                   streak_count = $3,
                   last_count_date = $4,
                   last_streak_date = $5,
                   updated_at = $6
             WHERE user_id = $1
            "#,
        )
        .bind(record.user_id)
        .bind(record.daily_count)
        .bind(record.streak_count)
        .bind(record.last_count_date)
        .bind(record.last_streak_date)
        .bind(record.updated_at)
        .execute(&mut **self.inner_mut()?)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn commit(&mut self) -> StoreResult<()> {
        match self.inner.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(StoreError::Completed),
        }
    }

    #[instrument(skip(self))]
    async fn rollback(&mut self) -> StoreResult<()> {
        match self.inner.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Err(StoreError::Completed),
        }
    }
}

#[async_trait]
impl RankingTx for Tx<'_> {
    #[instrument(skip(self, ranking), fields(user_id = %ranking.user_id, song_id = ranking.song_id))]
    async fn insert_ranking(
        &mut self,
        ranking: &NewRanking,
        now: DateTime<Utc>,
    ) -> StoreResult<Ranking> {
        let ranking = sqlx::query_as::<_, Ranking>(
            r#"
            INSERT INTO rankings (
                song_id,
                user_id,
                rank,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $4)
            RETURNING
                ranking_id,
                song_id,
                user_id,
                rank,
                created_at,
                updated_at
            "#,
        )
        .bind(ranking.song_id)
        .bind(ranking.user_id)
        .bind(ranking.rank)
        .bind(now)
        .fetch_one(&mut **self.inner_mut()?)
        .await?;

        Ok(ranking)
    }
}

pub mod sql_fragment {
    pub const STREAK_FIELDS: &str = r#"
        user_id,
        daily_count,
        streak_count,
        last_count_date,
        last_streak_date,
        updated_at
    "#;
}
