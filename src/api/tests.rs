use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use chrono_tz::America::Puerto_Rico;
use http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crate::api::middleware::cors;
use crate::api::server::{AppState, router};
use crate::db::models::streak::{StreakRecord, UserId};
use crate::ranking::RankingService;
use crate::streak::StreakEngine;
use crate::streak::memory::MemoryStore;
use crate::util::env::StreakWritePolicy;

const TOKEN: &str = "internal-test-token";

fn app(store: MemoryStore) -> Router {
    let engine = Arc::new(StreakEngine::new(store, Puerto_Rico));
    let state = Arc::new(AppState {
        rankings: RankingService::new(engine.clone(), StreakWritePolicy::Independent),
        engine,
        internal_token: TOKEN.to_string(),
    });

    router(state, cors("*"))
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn rank_request(user: &str) -> Request<Body> {
    Request::post("/ranktify/rankings")
        .header("x-user-id", user)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"song_id": 77, "rank": 4}"#))
        .unwrap()
}

#[tokio::test]
async fn test_streaks_without_record_is_zero() {
    let res = app(MemoryStore::new())
        .oneshot(
            Request::get("/ranktify/streaks")
                .header("x-user-id", "42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, serde_json::json!({ "streaks": 0 }));
}

#[tokio::test]
async fn test_streaks_requires_identity() {
    let app = app(MemoryStore::new());

    let missing = app
        .clone()
        .oneshot(Request::get("/ranktify/streaks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let malformed = app
        .oneshot(
            Request::get("/ranktify/streaks")
                .header("x-user-id", "not-a-number")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rank_song_records_activity() {
    let store = MemoryStore::new();
    let app = app(store.clone());

    let res = app.clone().oneshot(rank_request("7")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = json_body(res).await;
    assert_eq!(body["ranking"]["song_id"], 77);
    assert_eq!(body["ranking"]["rank"], 4);
    assert_eq!(body["streak"]["daily_count"], 1);
    assert_eq!(store.rankings().len(), 1);
    assert_eq!(store.record(UserId(7)).await.unwrap().daily_count, 1);
}

#[tokio::test]
async fn test_rank_song_reports_streak_failure_after_ranking() {
    let store = MemoryStore::new();
    let app = app(store.clone());

    store.fail_streak_writes(true);
    let res = app.oneshot(rank_request("7")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(res).await;
    assert!(body["message"].as_str().unwrap().starts_with("song ranked"));
    assert_eq!(store.rankings().len(), 1);
    assert!(store.record(UserId(7)).await.is_none());
}

#[tokio::test]
async fn test_rank_song_rejects_bad_body() {
    let res = app(MemoryStore::new())
        .oneshot(
            Request::post("/ranktify/rankings")
                .header("x-user-id", "7")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"song_id": "abc"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn test_internal_reset_requires_token() {
    let store = MemoryStore::new();
    let app = app(store.clone());

    let denied = app
        .clone()
        .oneshot(
            Request::post("/ranktify/internal/streaks/reset")
                .header("authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let missing = app
        .clone()
        .oneshot(
            Request::post("/ranktify/internal/streaks/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    store
        .seed(StreakRecord {
            daily_count: 3,
            ..StreakRecord::baseline(UserId(9), chrono::Utc::now())
        })
        .await;

    let allowed = app
        .oneshot(
            Request::post("/ranktify/internal/streaks/reset")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let body = json_body(allowed).await;
    assert_eq!(body["rows_reset"], 1);
    assert_eq!(store.record(UserId(9)).await.unwrap().daily_count, 0);
}

#[tokio::test]
async fn test_storage_errors_are_not_exposed() {
    let store = MemoryStore::new();
    let app = app(store.clone());
    store.fail_streak_writes(true);

    let res = app
        .oneshot(
            Request::post("/ranktify/internal/streaks/reset")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(res).await;
    assert_eq!(body["message"], "failed to read or record streak");
}
