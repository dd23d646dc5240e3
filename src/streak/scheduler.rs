use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::streak::store::StreakStore;
use crate::streak::{ResetSummary, StreakEngine, StreakResult};

/// Fallback wait when the next midnight can't be computed.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Wall-clock readings for the reset loop.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Time to wait from `now` until the next reference-timezone midnight.
pub fn until_next_reset<S: StreakStore>(engine: &StreakEngine<S>, now: DateTime<Utc>) -> Duration {
    engine
        .clock()
        .next_midnight(now)
        .and_then(|next| (next - now).to_std().ok())
        .unwrap_or(FALLBACK_INTERVAL)
}

/// Sleeps until the next reference midnight, then closes out the day that just ended.
///
/// The sleep runs on the monotonic clock, which can finish before the wall clock reaches
/// midnight. The reset is therefore stamped no earlier than the midnight it was scheduled
/// for, so it never runs against the day that is still ending.
pub async fn run_next_reset<S, C>(engine: &StreakEngine<S>, wall: &C) -> StreakResult<ResetSummary>
where
    S: StreakStore,
    C: WallClock,
{
    let scheduled_from = wall.now();
    let deadline = engine.clock().next_midnight(scheduled_from);
    let wait = until_next_reset(engine, scheduled_from);

    tracing::info!(wait_secs = wait.as_secs(), ?deadline, "next streak reset scheduled");
    tokio::time::sleep(wait).await;

    let woke_at = wall.now();
    let fired_at = match deadline {
        Some(deadline) if woke_at < deadline => {
            tracing::warn!(%woke_at, %deadline, "woke before midnight, resetting as of midnight");
            deadline
        }
        _ => woke_at,
    };

    engine.reset_daily_window(fired_at).await
}

/// Spawns the in-process daily reset loop.
///
/// Failures are logged and the loop waits for the following midnight; a missed reset is
/// not retried within the same day.
#[instrument(skip(engine, wall))]
pub fn spawn_daily_reset<S, C>(engine: Arc<StreakEngine<S>>, wall: C) -> JoinHandle<()>
where
    S: StreakStore + 'static,
    C: WallClock + 'static,
{
    tokio::task::spawn(async move {
        loop {
            if let Err(e) = run_next_reset(&engine, &wall).await {
                tracing::error!(error = ?e, "scheduled streak reset failed");
            }
        }
    })
}
