//! People handlers
//!
//! A small resource demonstrating the per-request transaction flow: writes
//! go through the request's transaction context and are committed by the
//! middleware when the handler returns, unless the unit of work was marked
//! for rollback.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::RequestTx;

#[derive(Debug, Deserialize)]
pub struct CreatePersonRequest {
    pub name: String,
    /// When set, the insert runs and the whole unit of work is then marked
    /// for rollback, so nothing persists.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct PersonResponse {
    pub name: String,
}

/// Creates a person inside the request transaction
pub async fn create_person(
    tx: RequestTx,
    Json(request): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<PersonResponse>), ApiError> {
    if request.name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    let mut ctx = tx.lock().await;
    let txn = ctx.begin().await?;
    sqlx::query("INSERT INTO people (name) VALUES ($1)")
        .bind(&request.name)
        .execute(&mut **txn)
        .await?;

    if request.dry_run {
        ctx.mark_rollback();
    }

    Ok((
        StatusCode::CREATED,
        Json(PersonResponse { name: request.name }),
    ))
}

/// Lists people through the request transaction
pub async fn list_people(tx: RequestTx) -> Result<Json<Vec<PersonResponse>>, ApiError> {
    let mut ctx = tx.lock().await;
    let txn = ctx.begin().await?;
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM people ORDER BY name")
        .fetch_all(&mut **txn)
        .await?;

    Ok(Json(
        names
            .into_iter()
            .map(|name| PersonResponse { name })
            .collect(),
    ))
}
