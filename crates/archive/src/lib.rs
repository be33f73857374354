//! Durable archive for log records evicted from the in-memory documents.
//!
//! Records live in a SQLite database (`<data_dir>/log/log.db` by default)
//! next to one metadata row per log. Inserts are keyed by a natural key so
//! re-archiving the same record is a no-op.

pub mod error;
pub mod schema;
pub mod store;
pub mod store_sqlite;

pub use {
    error::{Error, Result},
    schema::{ArchivedRecord, FilterFlags, InsertOutcome, LogMetadata, StoredRecord, UploadFields},
    store::LogArchive,
    store_sqlite::SqliteLogArchive,
};

/// Create or upgrade the archive tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
