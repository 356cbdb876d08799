//! Transaction middleware tests
//!
//! The first group runs without a database (a lazily-connecting pool is
//! enough for units of work that never begin); the rest drive the full
//! router against a containerized PostgreSQL server.

use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;

use test_utils::TestDatabase;
use unitwork_http::config::ApiConfig;
use unitwork_http::create_router;
use unitwork_http::middleware::{transaction_middleware, RequestTx};
use unitwork_http::registry::ContextRegistry;
use unitwork_http::AppState;

fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(1))
        .connect_lazy("postgres://postgres@127.0.0.1:1/unitwork_test")
        .expect("lazy pool")
}

fn test_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        config: ApiConfig::default(),
        registry: ContextRegistry::new(),
    }
}

/// Builds a router with the transaction middleware and catch-panic layer,
/// mirroring the layering of `create_router` but with injectable routes.
fn wrap_routes(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            transaction_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

#[tokio::test]
async fn request_without_begin_needs_no_database() {
    let state = test_state(lazy_pool());
    let app = wrap_routes(Router::new().route("/ping", get(ping)), state.clone());
    let server = TestServer::new(app).unwrap();

    let response = server.get("/ping").await;
    response.assert_status_ok();
    response.assert_text("pong");

    // finalize ran and the binding is gone
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn health_endpoint_works_without_database() {
    let server = TestServer::new(create_router(lazy_pool(), ApiConfig::default())).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn readiness_fails_without_database() {
    let server = TestServer::new(create_router(lazy_pool(), ApiConfig::default())).unwrap();

    let response = server.get("/health/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn handler_writes_are_committed() {
    let db = TestDatabase::new().await.unwrap();
    db.create_people_table().await.unwrap();

    let server =
        TestServer::new(create_router(db.pool().clone(), ApiConfig::default())).unwrap();

    let response = server
        .post("/api/v1/people")
        .json(&json!({"name": "Dave"}))
        .await;
    response.assert_status(StatusCode::CREATED);

    // the middleware committed; the row is visible to later queries
    assert_eq!(db.count_people().await.unwrap(), 1);

    let listing = server.get("/api/v1/people").await;
    listing.assert_status_ok();
    listing.assert_json(&json!([{"name": "Dave"}]));
}

#[tokio::test]
async fn marked_rollback_discards_handler_writes() {
    let db = TestDatabase::new().await.unwrap();
    db.create_people_table().await.unwrap();

    let server =
        TestServer::new(create_router(db.pool().clone(), ApiConfig::default())).unwrap();

    let response = server
        .post("/api/v1/people")
        .json(&json!({"name": "Kerry", "dry_run": true}))
        .await;
    response.assert_status(StatusCode::CREATED);

    assert_eq!(db.count_people().await.unwrap(), 0);
}

async fn insert_then_panic(tx: RequestTx) -> &'static str {
    {
        let mut ctx = tx.lock().await;
        let txn = ctx.begin().await.unwrap();
        sqlx::query("INSERT INTO people (name) VALUES ('Ghost')")
            .execute(&mut **txn)
            .await
            .unwrap();
    }
    panic!("handler exploded");
}

#[tokio::test]
async fn handler_panic_rolls_back_and_unbinds() {
    let db = TestDatabase::new().await.unwrap();
    db.create_people_table().await.unwrap();

    let state = test_state(db.pool().clone());
    let app = wrap_routes(
        Router::new().route("/boom", get(insert_then_panic)),
        state.clone(),
    );
    let server = TestServer::new(app).unwrap();

    let response = server.get("/boom").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // teardown ran on the panic path: nothing persisted, nothing bound
    assert_eq!(db.count_people().await.unwrap(), 0);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn concurrent_requests_get_independent_contexts() {
    let db = TestDatabase::new().await.unwrap();
    db.create_people_table().await.unwrap();

    let server =
        TestServer::new(create_router(db.pool().clone(), ApiConfig::default())).unwrap();

    let committed = server
        .post("/api/v1/people")
        .json(&json!({"name": "Kept"}));
    let discarded = server
        .post("/api/v1/people")
        .json(&json!({"name": "Dropped", "dry_run": true}));
    let (kept, dropped) = tokio::join!(committed, discarded);
    kept.assert_status(StatusCode::CREATED);
    dropped.assert_status(StatusCode::CREATED);

    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM people")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(names, vec!["Kept".to_string()]);
}
