//! In-process store with per-user row locks, used to exercise the engine without a database.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::db::models::ranking::{NewRanking, Ranking};
use crate::db::models::streak::{StreakRecord, UserId};
use crate::ranking::RankingTx;
use crate::streak::store::{StoreError, StoreResult, StreakStore, StreakTx};

type Row = Arc<RowLock<Option<StreakRecord>>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Mutex<BTreeMap<UserId, Row>>,
    rankings: Mutex<Vec<Ranking>>,
    next_ranking_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write to the streaks table fail with
    /// a pool timeout, the way an exhausted Postgres pool would. Ranking inserts are unaffected.
    pub fn fail_streak_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Committed state of a user's row.
    pub async fn record(&self, user_id: UserId) -> Option<StreakRecord> {
        let row = self.inner.row(user_id);
        row.lock().await.clone()
    }

    /// Overwrites a user's row outside of any transaction.
    pub async fn seed(&self, record: StreakRecord) {
        let row = self.inner.row(record.user_id);
        *row.lock().await = Some(record);
    }

    pub fn rankings(&self) -> Vec<Ranking> {
        self.inner
            .rankings
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Inner {
    fn row(&self, user_id: UserId) -> Row {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.entry(user_id).or_default().clone()
    }

    fn all_rows(&self) -> Vec<Row> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.values().cloned().collect()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    /// Locks every row in key order and applies `f` to each existing record.
    async fn update_all<F>(&self, mut f: F) -> StoreResult<u64>
    where
        F: FnMut(&mut StreakRecord) -> bool + Send,
    {
        self.check_writable()?;

        let mut guards = Vec::new();
        for row in self.all_rows() {
            guards.push(row.lock_owned().await);
        }

        let mut affected = 0;
        for guard in guards.iter_mut() {
            if let Some(record) = (**guard).as_mut() {
                if f(record) {
                    affected += 1;
                }
            }
        }

        Ok(affected)
    }
}

pub struct MemoryTx {
    store: Arc<Inner>,
    locked: HashMap<UserId, (OwnedMutexGuard<Option<StreakRecord>>, Option<StreakRecord>)>,
    staged_rankings: Vec<Ranking>,
    completed: bool,
}

impl MemoryTx {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.completed {
            Err(StoreError::Completed)
        } else {
            Ok(())
        }
    }

    async fn staged(&mut self, user_id: UserId) -> &mut Option<StreakRecord> {
        let (_, staged) = match self.locked.entry(user_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let guard = self.store.row(user_id).lock_owned().await;
                let snapshot = (*guard).clone();
                e.insert((guard, snapshot))
            }
        };
        staged
    }
}

#[async_trait]
impl StreakTx for MemoryTx {
    async fn lock_and_read(&mut self, user_id: UserId) -> StoreResult<Option<StreakRecord>> {
        self.ensure_open()?;
        Ok(self.staged(user_id).await.clone())
    }

    async fn insert_row(&mut self, record: &StreakRecord) -> StoreResult<()> {
        self.ensure_open()?;
        self.store.check_writable()?;

        let staged = self.staged(record.user_id).await;
        if staged.is_none() {
            *staged = Some(record.clone());
        }
        Ok(())
    }

    async fn update_row(&mut self, record: &StreakRecord) -> StoreResult<()> {
        self.ensure_open()?;
        self.store.check_writable()?;

        let staged = self.staged(record.user_id).await;
        if staged.is_some() {
            *staged = Some(record.clone());
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.completed = true;

        for (_, (mut guard, staged)) in self.locked.drain() {
            *guard = staged;
        }

        let mut rankings = self.store.rankings.lock().unwrap_or_else(|e| e.into_inner());
        rankings.append(&mut self.staged_rankings);
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.completed = true;
        self.locked.clear();
        self.staged_rankings.clear();
        Ok(())
    }
}

#[async_trait]
impl RankingTx for MemoryTx {
    async fn insert_ranking(
        &mut self,
        ranking: &NewRanking,
        now: DateTime<Utc>,
    ) -> StoreResult<Ranking> {
        self.ensure_open()?;

        let ranking = Ranking {
            ranking_id: self.store.next_ranking_id.fetch_add(1, Ordering::SeqCst) + 1,
            song_id: ranking.song_id,
            user_id: ranking.user_id,
            rank: ranking.rank,
            created_at: now,
            updated_at: now,
        };
        self.staged_rankings.push(ranking.clone());
        Ok(ranking)
    }
}

#[async_trait]
impl StreakStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            store: self.inner.clone(),
            locked: HashMap::new(),
            staged_rankings: Vec::new(),
            completed: false,
        })
    }

    async fn streak_count(&self, user_id: UserId) -> StoreResult<Option<i32>> {
        Ok(self.record(user_id).await.map(|r| r.streak_count))
    }

    async fn break_missed_streaks(&self, yesterday: NaiveDate, threshold: i32) -> StoreResult<u64> {
        self.inner
            .update_all(|r| {
                if r.last_count_date == Some(yesterday) && r.daily_count < threshold {
                    r.streak_count = 0;
                    true
                } else {
                    false
                }
            })
            .await
    }

    async fn reset_daily_counts(&self, today: NaiveDate, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner
            .update_all(|r| {
                r.daily_count = 0;
                r.last_count_date = Some(today);
                r.updated_at = now;
                true
            })
            .await
    }
}
