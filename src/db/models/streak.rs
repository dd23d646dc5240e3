use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

/// Base streaks table model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreakRecord {
    pub user_id: UserId,
    pub daily_count: i32,
    pub streak_count: i32,
    /// Reference-timezone date `daily_count` was last written for.
    pub last_count_date: Option<NaiveDate>,
    /// Reference-timezone date on which `streak_count` last advanced.
    pub last_streak_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl StreakRecord {
    /// Zeroed row inserted the first time a user records any activity.
    pub fn baseline(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            daily_count: 0,
            streak_count: 0,
            last_count_date: None,
            last_streak_date: None,
            updated_at: now,
        }
    }
}

impl FromStr for UserId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
