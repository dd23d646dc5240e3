use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::streak::UserId;

/// Base rankings table model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ranking {
    pub ranking_id: i64,
    pub song_id: i64,
    pub user_id: UserId,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRanking {
    pub song_id: i64,
    pub user_id: UserId,
    pub rank: i32,
}
