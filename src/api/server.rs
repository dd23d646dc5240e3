use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next, from_fn};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::*;
use crate::api::middleware::verify_internal::verify_internal_ident;
use crate::ranking::{RankingError, RankingService, RankingTx};
use crate::streak::store::StreakStore;
use crate::streak::{StreakEngine, StreakError};

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

#[derive(Debug)]
pub struct AppState<S> {
    pub engine: Arc<StreakEngine<S>>,
    pub rankings: RankingService<S>,
    pub internal_token: String,
}

pub fn router<S>(state: Arc<AppState<S>>, cors: CorsLayer) -> Router
where
    S: StreakStore + 'static,
    S::Tx: RankingTx,
{
    let internal_routes = Router::new()
        .route("/internal/streaks/reset", post(reset_streaks::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_internal_ident::<S>,
        ));

    let api = Router::new()
        .merge(internal_routes)
        .route("/streaks", get(streak_count::<S>))
        .route("/rankings", post(rank_song::<S>));

    Router::new()
        .route("/", get(|| async { Response::new(Body::empty()) }))
        .nest("/ranktify", api)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

/// Logs `RouteError`s that handlers stashed in the response extensions.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

/// Binds the API listener on `0.0.0.0:port` and serves `app` in a background task.
#[instrument(skip(app))]
pub async fn start_server(app: Router, port: u16) -> std::io::Result<JoinHandle<()>> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", listener.local_addr()?.port()),
        "server ready"
    );

    Ok(tokio::task::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "api server exited");
        }
    }))
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Streak(#[from] StreakError),

    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error("{0}")]
    AuthError(StatusCode),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let (status, message, err) = match &self {
            RouteError::AuthError(status) => (
                status.to_owned(),
                String::from("missing or invalid caller identity"),
                None,
            ),

            // storage details stay in the logs; see `log_route_errors`
            RouteError::Streak(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("failed to read or record streak"),
                Some(self),
            ),

            // the ranking itself is durable here; say so rather than implying nothing happened
            RouteError::Ranking(RankingError::StreakAfterRanking { ranking, .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "song ranked (ranking {}) but the streak update failed",
                    ranking.ranking_id
                ),
                Some(self),
            ),

            RouteError::Ranking(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("failed to rank song"),
                Some(self),
            ),
        };

        let mut response = (status, Json(ErrorResponse { message })).into_response();
        if let Some(err) = err {
            response.extensions_mut().insert(Arc::new(err));
        }

        response
    }
}
