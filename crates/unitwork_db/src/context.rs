//! Per-unit-of-work transaction contexts
//!
//! A [`TxContext`] wraps at most one database transaction for one logical
//! unit of work (typically one HTTP request). The transaction is opened
//! lazily on the first [`TxContext::begin`] call, so units of work that
//! never touch the database pay no transaction overhead. At the end of the
//! unit of work, [`TxContext::finalize`] runs exactly once and either
//! commits or rolls back depending on the commit-intent flag.
//!
//! Handlers opt into rollback by calling [`TxContext::mark_rollback`]
//! anywhere before finalize, without threading an error value back up
//! through every call level.
//!
//! # Lifecycle
//!
//! ```rust,ignore
//! let mut ctx = TxContext::new(pool);
//! let tx = ctx.begin().await?;            // opens the transaction
//! sqlx::query("...").execute(&mut **tx).await?;
//! ctx.mark_rollback();                    // optional
//! let outcome = ctx.finalize().await?;    // commits or rolls back, once
//! ```
//!
//! If the owning task is dropped before finalize, the underlying
//! `sqlx::Transaction` rolls back on drop; a unit of work is never left
//! half-committed.

use std::sync::Arc;

use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, warn};

use crate::error::DatabaseError;

/// The live transaction handle a context hands out
pub type PgTransaction = Transaction<'static, Postgres>;

/// A transaction context shared between middleware and handlers
///
/// The context itself is single-owner per unit of work, but middleware and
/// handler both need access during a request, so it travels behind an async
/// mutex.
pub type SharedTxContext = Arc<tokio::sync::Mutex<TxContext>>;

/// How a context was finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    /// A transaction was open and committed
    Committed,
    /// A transaction was open and rolled back
    RolledBack,
    /// No transaction was ever opened; finalize was a no-op
    NoTransaction,
}

/// A lazily-opened database transaction bound to one unit of work
///
/// Invariants:
/// - at most one transaction is opened per context; repeated `begin` calls
///   return the same handle
/// - the commit-intent flag only ever transitions true to false
/// - finalize runs at most once; `begin` after finalize is an error
#[derive(Debug)]
pub struct TxContext {
    pool: PgPool,
    tx: Option<PgTransaction>,
    commit: bool,
    finalized: bool,
}

impl TxContext {
    /// Creates a new context bound to `pool`, with commit intent and no
    /// transaction open yet.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            commit: true,
            finalized: false,
        }
    }

    /// Creates a new context already wrapped for sharing across a request.
    pub fn shared(pool: PgPool) -> SharedTxContext {
        Arc::new(tokio::sync::Mutex::new(Self::new(pool)))
    }

    /// Returns the active transaction handle, opening one on first use.
    ///
    /// Idempotent: subsequent calls within the same context return the same
    /// live handle without re-opening.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::ConnectionFailed` if a transaction cannot be opened
    /// - `DatabaseError::ContextFinalized` if the context was already
    ///   finalized; a context is never silently reopened
    pub async fn begin(&mut self) -> Result<&mut PgTransaction, DatabaseError> {
        if self.finalized {
            return Err(DatabaseError::ContextFinalized);
        }

        match &mut self.tx {
            Some(tx) => Ok(tx),
            slot => {
                debug!("opening transaction");
                let tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
                Ok(slot.insert(tx))
            }
        }
    }

    /// Marks the transaction for rollback when the context is finalized.
    ///
    /// If this is never called, the transaction is committed on finalize.
    /// Calling it twice is a no-op; calling it after finalize has no effect
    /// beyond a warning.
    pub fn mark_rollback(&mut self) {
        if self.finalized {
            warn!("mark_rollback called on a finalized transaction context");
            return;
        }
        self.commit = false;
    }

    /// Finalizes the context by committing or rolling back.
    ///
    /// If no transaction was ever opened this is a no-op that performs no
    /// database calls and reports [`TxOutcome::NoTransaction`].
    ///
    /// # Errors
    ///
    /// - `DatabaseError::TransactionFailed` if the underlying commit or
    ///   rollback call fails; a failed commit must not be treated by the
    ///   caller as success
    /// - `DatabaseError::ContextFinalized` on a second finalize
    pub async fn finalize(&mut self) -> Result<TxOutcome, DatabaseError> {
        if self.finalized {
            return Err(DatabaseError::ContextFinalized);
        }
        self.finalized = true;

        let Some(tx) = self.tx.take() else {
            return Ok(TxOutcome::NoTransaction);
        };

        if self.commit {
            tx.commit()
                .await
                .map_err(|e| DatabaseError::TransactionFailed(format!("commit failed: {e}")))?;
            Ok(TxOutcome::Committed)
        } else {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::TransactionFailed(format!("rollback failed: {e}")))?;
            Ok(TxOutcome::RolledBack)
        }
    }

    /// Whether finalize will commit (true until `mark_rollback` is called)
    pub fn will_commit(&self) -> bool {
        self.commit
    }

    /// Whether the context has been finalized
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether a transaction is currently open
    pub fn has_open_transaction(&self) -> bool {
        self.tx.is_some()
    }
}
