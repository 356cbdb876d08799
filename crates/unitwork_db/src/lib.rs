//! Database Infrastructure Layer
//!
//! This crate provides the database plumbing for unitwork services on
//! PostgreSQL using SQLx:
//!
//! - **Pool**: connection pool configuration and creation
//! - **Context**: a per-unit-of-work transaction context that opens a
//!   transaction lazily and commits or rolls back exactly once at the end
//! - **Migrate**: a linear, apply-once SQL migration runner backed by a
//!   ledger table
//!
//! # Example
//!
//! ```rust,ignore
//! use unitwork_db::{create_pool_from_url, TxContext};
//!
//! let pool = create_pool_from_url("postgres://localhost/app").await?;
//! let mut ctx = TxContext::new(pool.clone());
//! let tx = ctx.begin().await?;
//! sqlx::query("INSERT INTO people (name) VALUES ($1)")
//!     .bind("Dave")
//!     .execute(&mut **tx)
//!     .await?;
//! ctx.finalize().await?;
//! ```

pub mod context;
pub mod error;
pub mod migrate;
pub mod pool;

pub use context::{PgTransaction, SharedTxContext, TxContext, TxOutcome};
pub use error::DatabaseError;
pub use migrate::{run_migrations, MigrationRecord, MigrationReport};
pub use pool::{create_pool, create_pool_from_url, DatabaseConfig, DatabasePool};
