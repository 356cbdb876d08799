//! API middleware
//!
//! The transaction middleware gives every inbound request its own lazily
//! opened database transaction: a fresh [`TxContext`] is created and bound
//! in the [`ContextRegistry`] before the inner handler runs, and finalized
//! (commit or rollback per its flag) and unbound afterward on every exit
//! path, including handler panics.

use std::panic::AssertUnwindSafe;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::FutureExt;
use tower_http::request_id::RequestId;
use tracing::{error, info, warn};
use unitwork_db::{SharedTxContext, TxContext, TxOutcome};
use uuid::Uuid;

use crate::error::ApiError;
use crate::registry::ContextRegistry;
use crate::AppState;

/// Handle to the current request's transaction context
///
/// Inserted into request extensions by [`transaction_middleware`]; handlers
/// take it as an extractor (or via `Extension<RequestTx>`) and call
/// [`RequestTx::lock`] to begin the transaction and execute statements.
#[derive(Debug, Clone)]
pub struct RequestTx {
    /// Identity of the unit of work this context is bound to
    pub request_id: Uuid,
    ctx: SharedTxContext,
}

impl RequestTx {
    /// Locks the underlying transaction context
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, TxContext> {
        self.ctx.lock().await
    }

    /// Marks the current unit of work for rollback at finalize
    pub async fn mark_rollback(&self) {
        self.lock().await.mark_rollback();
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestTx
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestTx>().cloned().ok_or_else(|| {
            ApiError::Internal("transaction middleware is not installed on this route".to_string())
        })
    }
}

/// Transaction middleware
///
/// Finalization policy is decided here, centrally: a finalize failure on
/// the normal path replaces the handler's response with a 500 (a failed
/// commit must never look like success); on the panic path the context is
/// rolled back, torn down, and the panic re-raised for the catch-panic
/// layer to render.
pub async fn transaction_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request_identity(&request);
    let start = Utc::now();

    let ctx = TxContext::shared(state.pool.clone());
    if let Err(err) = state.registry.bind(request_id, ctx.clone()) {
        error!(%request_id, %err, "failed to bind transaction context");
        return ApiError::from(err).into_response();
    }
    request.extensions_mut().insert(RequestTx { request_id, ctx });

    let handler_result = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let finalize_result =
        finalize_and_unbind(&state.registry, request_id, handler_result.is_err()).await;

    match handler_result {
        Err(panic) => {
            if let Err(err) = finalize_result {
                error!(%request_id, %err, "failed to finalize transaction context after panic");
            }
            std::panic::resume_unwind(panic)
        }
        Ok(response) => {
            let duration = Utc::now() - start;
            match finalize_result {
                Ok(outcome) => {
                    info!(
                        method = %method,
                        uri = %uri,
                        %request_id,
                        outcome = ?outcome,
                        status = %response.status().as_u16(),
                        duration_ms = duration.num_milliseconds(),
                        "request complete"
                    );
                    response
                }
                Err(err) => {
                    error!(%request_id, %err, "failed to finalize transaction context");
                    err.into_response()
                }
            }
        }
    }
}

/// Finalizes and unbinds the context for one request identity.
///
/// The binding is removed even when finalize fails; a dead context must not
/// linger in the registry.
async fn finalize_and_unbind(
    registry: &ContextRegistry,
    request_id: Uuid,
    panicked: bool,
) -> Result<TxOutcome, ApiError> {
    let result = match registry.lookup(request_id) {
        Ok(ctx) => {
            let mut guard = ctx.lock().await;
            if panicked {
                warn!(%request_id, "handler panicked; rolling back");
                guard.mark_rollback();
            }
            guard.finalize().await.map_err(ApiError::from)
        }
        Err(err) => Err(ApiError::from(err)),
    };
    registry.unbind(request_id);
    result
}

/// Derives the unit-of-work identity for a request from the `request-id`
/// layer, falling back to a fresh UUID when absent or unparsable.
fn request_identity(request: &Request<Body>) -> Uuid {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4)
}
