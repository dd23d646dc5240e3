use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::middleware::identity::AuthedUser;
use crate::api::server::{AppState, JsonResult};
use crate::db::models::ranking::NewRanking;
use crate::ranking::{RankOutcome, RankingTx};
use crate::streak::ResetSummary;
use crate::streak::store::StreakStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct StreakCount {
    pub streaks: i32,
}

#[derive(Debug, Deserialize)]
pub struct RankSongRequest {
    pub song_id: i64,
    pub rank: i32,
}

#[instrument(skip(state))]
pub async fn streak_count<S>(
    State(state): State<Arc<AppState<S>>>,
    AuthedUser(user_id): AuthedUser,
) -> JsonResult<StreakCount>
where
    S: StreakStore + 'static,
{
    let streaks = state.engine.get_streak_count(user_id).await?;
    Ok(Json(StreakCount { streaks }))
}

#[instrument(skip(state))]
pub async fn rank_song<S>(
    State(state): State<Arc<AppState<S>>>,
    AuthedUser(user_id): AuthedUser,
    Json(body): Json<RankSongRequest>,
) -> JsonResult<RankOutcome>
where
    S: StreakStore + 'static,
    S::Tx: RankingTx,
{
    let new = NewRanking {
        song_id: body.song_id,
        user_id,
        rank: body.rank,
    };

    let outcome = state.rankings.rank_song(new, Utc::now()).await?;
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn reset_streaks<S>(State(state): State<Arc<AppState<S>>>) -> JsonResult<ResetSummary>
where
    S: StreakStore + 'static,
{
    let summary = state.engine.reset_daily_window(Utc::now()).await?;
    Ok(Json(summary))
}
