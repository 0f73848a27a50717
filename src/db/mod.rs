//! Database module

pub mod queries;
pub mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha384};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Run embedded migrations.
///
/// The `_sqlx_migrations` bookkeeping is reconciled with the binary first:
/// records for migrations that no longer ship are dropped, and stored
/// checksums are rewritten when only line endings differ. Any other
/// mismatch is left for the migrator to reject.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let applied = applied_migrations(pool).await?;
    let shipped: Vec<i64> = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| m.version)
        .collect();
    info!("Shipped migrations: {:?}, applied: {}", shipped, applied.len());

    for (version, checksum) in &applied {
        match MIGRATOR.iter().find(|m| m.version == *version) {
            None => {
                warn!("Dropping record of migration {} (no longer shipped)", version);
                sqlx::query("DELETE FROM _sqlx_migrations WHERE version = $1")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
            Some(m) if m.checksum.as_ref() == checksum.as_slice() => {}
            Some(m) if differs_only_in_line_endings(checksum, &m.sql) => {
                warn!("Migration {} ({}) line endings changed; updating checksum", m.version, m.description);
                sqlx::query("UPDATE _sqlx_migrations SET checksum = $1 WHERE version = $2")
                    .bind(m.checksum.as_ref())
                    .bind(m.version)
                    .execute(pool)
                    .await?;
            }
            Some(m) => {
                error!("Migration {} ({}) was edited after it was applied", m.version, m.description);
            }
        }
    }

    MIGRATOR.run(pool).await.context("Failed to run migrations")?;
    info!("Database migrations complete");
    Ok(())
}

/// Whether `stored` is the checksum of `sql` with LF or CRLF line endings
fn differs_only_in_line_endings(stored: &[u8], sql: &str) -> bool {
    let lf = sql.replace("\r\n", "\n");
    let crlf = lf.replace('\n', "\r\n");
    [lf, crlf]
        .iter()
        .any(|variant| Sha384::digest(variant.as_bytes()).as_slice() == stored)
}

/// (version, checksum) of every applied migration; empty on a fresh database
async fn applied_migrations(pool: &PgPool) -> Result<Vec<(i64, Vec<u8>)>> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(Vec::new());
    }

    let rows: Vec<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT version, checksum FROM _sqlx_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQL: &str = "CREATE TABLE branches (id UUID);\nCREATE INDEX idx ON branches (id);\n";

    #[test]
    fn test_crlf_checksum_is_recognized() {
        let crlf = Sha384::digest(SQL.replace('\n', "\r\n").as_bytes());
        assert!(differs_only_in_line_endings(crlf.as_slice(), SQL));

        let lf = Sha384::digest(SQL.as_bytes());
        let shipped_crlf = SQL.replace('\n', "\r\n");
        assert!(differs_only_in_line_endings(lf.as_slice(), &shipped_crlf));
    }

    #[test]
    fn test_edited_migration_is_not_line_endings() {
        let edited = Sha384::digest(b"CREATE TABLE branches (id UUID, name TEXT);\n");
        assert!(!differs_only_in_line_endings(edited.as_slice(), SQL));
    }

    #[test]
    fn test_shipped_checksum_is_sha384_of_sql() {
        for migration in MIGRATOR.iter() {
            assert_eq!(
                Sha384::digest(migration.sql.as_bytes()).as_slice(),
                migration.checksum.as_ref()
            );
        }
    }
}
