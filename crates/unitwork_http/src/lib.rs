//! HTTP Layer
//!
//! This crate wires per-request transaction contexts into an Axum service:
//!
//! - **Middleware**: wraps every inbound request in a lazily-opened
//!   transaction context and finalizes it on every exit path
//! - **Registry**: binds one context per in-flight request identity
//! - **Handlers**: health checks plus a demo `people` resource exercising
//!   the transaction flow
//! - **Error handling**: consistent JSON error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use unitwork_http::{config::ApiConfig, create_router};
//!
//! let app = create_router(pool, ApiConfig::default());
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod registry;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{health, people};
use crate::middleware::transaction_middleware;
use crate::registry::ContextRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: ApiConfig,
    pub registry: ContextRegistry,
}

/// Creates the main API router
///
/// Every route runs inside the transaction middleware; routes that never
/// call begin pay no transaction overhead. Panics unwinding past the
/// middleware are rendered as 500s by the catch-panic layer after the
/// transaction context has been torn down.
pub fn create_router(pool: PgPool, config: ApiConfig) -> Router {
    let state = AppState {
        pool,
        config,
        registry: ContextRegistry::new(),
    };

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let people_routes = Router::new()
        .route("/", post(people::create_person))
        .route("/", get(people::list_people));

    let api_routes = Router::new().nest("/people", people_routes);

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            transaction_middleware,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new()),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
