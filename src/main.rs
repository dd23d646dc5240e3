use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use thiserror::Error;

use crate::api::server::AppState;
use crate::db::prelude::*;
use crate::ranking::{RankingService, RankingTx};
use crate::streak::scheduler::{self, SystemClock};
use crate::streak::store::StreakStore;
use crate::streak::{StreakEngine, StreakError};
use crate::util::env::{self, Env, EnvErr};
use crate::util::telemetry;

mod api;
mod db;
mod ranking;
mod streak;
mod util;

#[derive(Debug, Parser)]
#[command(version, about = "Ranktify ranking and streak API")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Run the daily streak reset once and exit, for use from an external cron
    ResetStreaks,
}

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Db(#[from] PgError),

    #[error(transparent)]
    Streak(#[from] StreakError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = env::env().await?;
    let telemetry_registry = telemetry::Telemetry::new(env)?.register();

    let result = start(args.command.unwrap_or(Command::Serve), env).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting with error");
    }

    // flush batched otlp exports before the error reaches the caller
    telemetry_registry.shutdown();
    result
}

async fn start(command: Command, env: &Env) -> Result<()> {
    let tz = env.reference_timezone().inspect_err(|e| {
        tracing::error!(error = %e, "cannot compute streak day boundaries, refusing to start");
    })?;

    let engine = Arc::new(StreakEngine::new(StreakRepository::new(db_pool().await?), tz));
    tracing::info!(timezone = %tz, "streak engine ready");

    run(command, engine, env).await
}

async fn run<S>(command: Command, engine: Arc<StreakEngine<S>>, env: &Env) -> Result<()>
where
    S: StreakStore + 'static,
    S::Tx: RankingTx,
{
    match command {
        Command::ResetStreaks => {
            let summary = engine.reset_daily_window(Utc::now()).await?;
            tracing::info!(?summary, "streaks reset");
        }
        Command::Serve => {
            let state = Arc::new(AppState {
                rankings: RankingService::new(engine.clone(), env.streak_write_policy),
                engine: engine.clone(),
                internal_token: env.internal_token.clone(),
            });

            let app = api::server::router(state, api::middleware::cors(&env.cors_allow_origins));

            let mut handles = vec![api::server::start_server(app, env.server_api_port).await?];
            if env.streak_reset_scheduler {
                handles.push(scheduler::spawn_daily_reset(engine, SystemClock));
            }

            _ = join_all(handles).await;
        }
    }

    Ok(())
}
