use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::db::models::streak::{StreakRecord, UserId};

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("transaction already completed")]
    Completed,
}

/// A transaction over the streaks table.
///
/// Dropping a transaction that was never committed rolls it back, so an early `?` return
/// can't leave a half-applied update behind.
#[async_trait]
pub trait StreakTx: Send {
    /// Reads the user's row and holds an exclusive lock on it until the transaction ends.
    async fn lock_and_read(&mut self, user_id: UserId) -> StoreResult<Option<StreakRecord>>;

    /// Inserts `record` unless a row for the same user already exists.
    async fn insert_row(&mut self, record: &StreakRecord) -> StoreResult<()>;

    async fn update_row(&mut self, record: &StreakRecord) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

#[async_trait]
pub trait StreakStore: Send + Sync {
    type Tx: StreakTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn streak_count(&self, user_id: UserId) -> StoreResult<Option<i32>>;

    /// Zeroes `streak_count` for every row last counted on `yesterday` that stayed below
    /// `threshold`. Runs as one atomic statement.
    async fn break_missed_streaks(&self, yesterday: NaiveDate, threshold: i32) -> StoreResult<u64>;

    /// Sets `daily_count = 0` and `last_count_date = today` on every row. Runs as one atomic
    /// statement.
    async fn reset_daily_counts(&self, today: NaiveDate, now: DateTime<Utc>) -> StoreResult<u64>;
}
