//! Test Utilities Crate
//!
//! Provides shared test infrastructure for the unitwork test suite.
//!
//! # Modules
//!
//! - `database`: containerized PostgreSQL management for integration tests
//! - `migrations`: temp-directory scaffolding for migration script files

pub mod database;
pub mod migrations;

pub use database::*;
pub use migrations::*;
