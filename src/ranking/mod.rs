//! Ranking submission: persists a ranking and feeds the streak engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::ranking::{NewRanking, Ranking};
use crate::db::models::streak::StreakRecord;
use crate::streak::store::{StoreError, StreakStore, StreakTx};
use crate::streak::{StreakEngine, StreakError};
use crate::util::env::StreakWritePolicy;


/// Transactions that can also write to the rankings table.
#[async_trait]
pub trait RankingTx: StreakTx {
    async fn insert_ranking(
        &mut self,
        ranking: &NewRanking,
        now: DateTime<Utc>,
    ) -> Result<Ranking, StoreError>;
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Streak(#[from] StreakError),

    /// The ranking committed but the streak update that followed it did not.
    #[error("ranking {} was saved but the streak update failed: {source}", ranking.ranking_id)]
    StreakAfterRanking {
        ranking: Ranking,
        #[source]
        source: StreakError,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RankOutcome {
    pub ranking: Ranking,
    pub streak: StreakRecord,
}

#[derive(Debug)]
pub struct RankingService<S> {
    engine: Arc<StreakEngine<S>>,
    policy: StreakWritePolicy,
}

impl<S> RankingService<S>
where
    S: StreakStore,
    S::Tx: RankingTx,
{
    pub fn new(engine: Arc<StreakEngine<S>>, policy: StreakWritePolicy) -> Self {
        Self { engine, policy }
    }

    #[instrument(skip(self), fields(user_id = %new.user_id, policy = ?self.policy))]
    pub async fn rank_song(
        &self,
        new: NewRanking,
        now: DateTime<Utc>,
    ) -> Result<RankOutcome, RankingError> {
        match self.policy {
            StreakWritePolicy::Independent => self.rank_then_record(&new, now).await,
            StreakWritePolicy::Atomic => self.rank_and_record(&new, now).await,
        }
    }

    async fn rank_then_record(
        &self,
        new: &NewRanking,
        now: DateTime<Utc>,
    ) -> Result<RankOutcome, RankingError> {
        let mut tx = self.engine.store().begin().await?;
        let ranking = tx.insert_ranking(new, now).await?;
        tx.commit().await?;

        match self.engine.record_activity_event(new.user_id, now).await {
            Ok(streak) => Ok(RankOutcome { ranking, streak }),
            Err(source) => Err(RankingError::StreakAfterRanking { ranking, source }),
        }
    }

    async fn rank_and_record(
        &self,
        new: &NewRanking,
        now: DateTime<Utc>,
    ) -> Result<RankOutcome, RankingError> {
        let mut tx = self.engine.store().begin().await?;

        let result = async {
            let ranking = tx.insert_ranking(new, now).await?;
            let streak = self.engine.apply_event(&mut tx, new.user_id, now).await?;
            Ok::<_, RankingError>(RankOutcome { ranking, streak })
        }
        .await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = ?rollback_err, "ranking rollback failed");
                }
                Err(e)
            }
        }
    }
}
