//! Linear SQL migration runner
//!
//! Applies an ordered list of SQL script files at most once each, tracked by
//! base filename in a `migrations` ledger table. The runner executes scripts
//! strictly in the order given by the caller; it does not sort, infer
//! dependency order, or deduplicate the input list.
//!
//! Each script's full text is executed as one load-and-run unit. On the
//! first failure the entire run aborts; the failing file is never recorded
//! as applied, so a later run retries it. Previously applied files stay
//! applied; there is no rollback of migrations.
//!
//! Concurrent runners racing on the same ledger are not guarded; migrations
//! are assumed to run from a single deploying process. A losing
//! check-then-insert race surfaces as [`DatabaseError::DuplicateEntry`].

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// Ledger table holding one row per applied migration file.
///
/// `filename` is the identity key (directory path stripped); `created_at`
/// is server-assigned at insertion.
const LEDGER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    filename      varchar(2048)   NOT NULL PRIMARY KEY,
    created_at    timestamptz     NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// One row of the migration ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MigrationRecord {
    /// Base filename of the applied script
    pub filename: String,
    /// When the script was recorded as applied
    pub created_at: DateTime<Utc>,
}

/// Summary of one runner invocation
#[derive(Debug, Default, Clone, Serialize)]
pub struct MigrationReport {
    /// Identity keys executed and recorded during this run, in order
    pub applied: Vec<String>,
    /// Identity keys skipped because the ledger already held them
    pub skipped: Vec<String>,
}

/// Computes the ledger identity key for a script path: the base filename
/// with all directory components stripped.
pub fn identity_key(path: &Path) -> Result<String, DatabaseError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| DatabaseError::migration(path.display().to_string(), "path has no file name"))
}

/// Creates the ledger table if it does not exist. Idempotent.
pub async fn ensure_ledger(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query(LEDGER_DDL).execute(pool).await?;
    Ok(())
}

/// Has a migration with this identity key been applied?
///
/// All file path information is stripped before the lookup, so the same
/// script is recognized regardless of the directory it was loaded from.
pub async fn is_applied(pool: &PgPool, filename: &str) -> Result<bool, DatabaseError> {
    let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM migrations WHERE filename = $1")
        .bind(filename)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Returns every ledger entry, oldest first.
pub async fn applied_migrations(pool: &PgPool) -> Result<Vec<MigrationRecord>, DatabaseError> {
    let records = sqlx::query_as::<_, MigrationRecord>(
        "SELECT filename, created_at FROM migrations ORDER BY created_at, filename",
    )
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Records an identity key as applied.
async fn mark_applied(pool: &PgPool, filename: &str) -> Result<(), DatabaseError> {
    sqlx::query("INSERT INTO migrations (filename) VALUES ($1)")
        .bind(filename)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;
    Ok(())
}

/// Runs each migration in the order given, skipping files whose identity
/// key the ledger already holds.
///
/// The ledger table itself is created first if absent. Each pending file is
/// read and executed as a single multi-statement batch, then recorded.
///
/// # Errors
///
/// Aborts on the first failure with `DatabaseError::MigrationFailed` naming
/// the offending file; files after it are not attempted, files before it
/// stay applied.
pub async fn run_migrations<P: AsRef<Path>>(
    pool: &PgPool,
    paths: &[P],
) -> Result<MigrationReport, DatabaseError> {
    ensure_ledger(pool).await?;

    let mut report = MigrationReport::default();
    for path in paths {
        let path = path.as_ref();
        let key = identity_key(path)?;

        if is_applied(pool, &key).await? {
            debug!(file = %key, "migration already applied, skipping");
            report.skipped.push(key);
            continue;
        }

        info!(file = %key, "applying migration");
        let sql = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DatabaseError::migration(key.clone(), e))?;
        sqlx::raw_sql(&sql)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::migration(key.clone(), e))?;
        mark_applied(pool, &key).await?;
        report.applied.push(key);
    }

    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "migration run complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn identity_key_strips_directories() {
        let key = identity_key(Path::new("/var/lib/app/migrations/001_init.sql")).unwrap();
        assert_eq!(key, "001_init.sql");
    }

    #[test]
    fn identity_key_of_bare_filename() {
        let key = identity_key(Path::new("002_seed.sql")).unwrap();
        assert_eq!(key, "002_seed.sql");
    }

    #[test]
    fn identity_key_rejects_directory_paths() {
        assert!(identity_key(Path::new("/")).is_err());
        assert!(identity_key(Path::new("migrations/..")).is_err());
    }

    proptest! {
        #[test]
        fn identity_key_ignores_source_directory(
            dirs in prop::collection::vec("[a-z]{1,8}", 0..4),
            name in "[a-z0-9_]{1,12}\\.sql",
        ) {
            let mut path = PathBuf::new();
            for dir in &dirs {
                path.push(dir);
            }
            path.push(&name);
            prop_assert_eq!(identity_key(&path).unwrap(), name);
        }
    }
}
