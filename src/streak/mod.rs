//! Daily ranking streaks.
//!
//! Every qualifying event bumps the user's `daily_count` for the current reference-timezone
//! day. The event that brings the count to exactly [`ACTIVITY_THRESHOLD`] advances
//! `streak_count`; later events the same day keep counting past the threshold and never
//! match it again. Once a day, [`StreakEngine::reset_daily_window`] breaks the streaks of
//! users who fell short yesterday and zeroes everyone's daily count.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::streak::{StreakRecord, UserId};

pub mod clock;
#[cfg(test)]
pub mod memory;
pub mod scheduler;
pub mod store;


use clock::ReferenceClock;
use store::{StoreError, StreakStore, StreakTx};

/// Rankings needed in one calendar day to advance a streak.
pub const ACTIVITY_THRESHOLD: i32 = 10;

pub type StreakResult<T> = core::result::Result<T, StreakError>;

#[derive(Debug, Error)]
pub enum StreakError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("streak row for user {0} missing after baseline insert")]
    MissingBaseline(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
    pub streaks_broken: u64,
    pub rows_reset: u64,
}

/// Applies one qualifying event that happened on `today` to `record`.
pub fn advance(record: &StreakRecord, today: NaiveDate, now: DateTime<Utc>) -> StreakRecord {
    let is_same_day = record.last_count_date == Some(today);
    let daily_count = if is_same_day {
        record.daily_count + 1
    } else {
        1
    };

    let mut next = StreakRecord {
        daily_count,
        last_count_date: Some(today),
        updated_at: now,
        ..record.clone()
    };

    // exact match: events past the threshold keep counting up and never re-trigger
    if daily_count == ACTIVITY_THRESHOLD {
        next.streak_count += 1;
        next.last_streak_date = Some(today);
    }

    next
}

#[derive(Debug)]
pub struct StreakEngine<S> {
    store: S,
    clock: ReferenceClock,
}

impl<S: StreakStore> StreakEngine<S> {
    pub fn new(store: S, tz: Tz) -> Self {
        Self {
            store,
            clock: ReferenceClock::new(tz),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &ReferenceClock {
        &self.clock
    }

    /// Records one qualifying event for `user_id` in its own transaction.
    ///
    /// Either the whole update commits or nothing does; storage errors are returned as-is
    /// and never retried here.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn record_activity_event(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StreakResult<StreakRecord> {
        let mut tx = self.store.begin().await?;

        match self.apply_event(&mut tx, user_id, now).await {
            Ok(record) => {
                tx.commit().await?;
                tracing::debug!(
                    daily_count = record.daily_count,
                    streak_count = record.streak_count,
                    "recorded streak activity"
                );
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = ?rollback_err, "streak rollback failed");
                }
                tracing::error!(error = ?e, "failed to record streak activity");
                Err(e)
            }
        }
    }

    /// Records one qualifying event inside a transaction owned by the caller, who is
    /// responsible for committing or rolling back.
    pub async fn apply_event(
        &self,
        tx: &mut S::Tx,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StreakResult<StreakRecord> {
        let today = self.clock.today(now);

        let current = match tx.lock_and_read(user_id).await? {
            Some(record) => record,
            None => {
                tx.insert_row(&StreakRecord::baseline(user_id, now)).await?;
                tx.lock_and_read(user_id)
                    .await?
                    .ok_or(StreakError::MissingBaseline(user_id))?
            }
        };

        let next = advance(&current, today, now);
        if next.streak_count != current.streak_count {
            tracing::info!(user_id = %user_id, streak_count = next.streak_count, %today, "streak advanced");
        }

        tx.update_row(&next).await?;
        Ok(next)
    }

    /// Closes out the previous reference day: breaks the streak of anyone who was counted
    /// yesterday without reaching the threshold, then zeroes every daily count and stamps
    /// today's date.
    ///
    /// Users whose last counted day is older than yesterday are not touched by the first
    /// step and keep their streak.
    #[instrument(skip(self))]
    pub async fn reset_daily_window(&self, now: DateTime<Utc>) -> StreakResult<ResetSummary> {
        let today = self.clock.today(now);
        let yesterday = self.clock.yesterday(now);

        let streaks_broken = self
            .store
            .break_missed_streaks(yesterday, ACTIVITY_THRESHOLD)
            .await?;
        let rows_reset = self.store.reset_daily_counts(today, now).await?;

        let summary = ResetSummary {
            today,
            yesterday,
            streaks_broken,
            rows_reset,
        };
        tracing::info!(?summary, "daily streak window reset");

        Ok(summary)
    }

    /// Current streak for `user_id`; users who never ranked anything have a streak of 0.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_streak_count(&self, user_id: UserId) -> StreakResult<i32> {
        Ok(self.store.streak_count(user_id).await?.unwrap_or(0))
    }
}
