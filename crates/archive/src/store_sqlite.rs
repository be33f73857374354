//! SQLite-backed log archive using sqlx.

use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    },
    tracing::debug,
};

use crate::{
    Error, Result,
    error::Context,
    schema::{ArchivedRecord, InsertOutcome, LogMetadata, LogRow, StoredRecord, UploadFields},
    store::LogArchive,
};

const LOG_COLUMNS: &str = "id, group_id, name, created_at, updated_at, recording, \
                           record_begin_at, last_warn, filter_outside, filter_command, \
                           filter_bot, filter_media, filter_forum_code, upload_time, \
                           upload_file, upload_note, url";

/// Archive stored in a single SQLite file.
pub struct SqliteLogArchive {
    pool: SqlitePool,
}

impl SqliteLogArchive {
    /// Open (creating if needed) the archive at `path` and run migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("creating archive directory {}", parent.display())
            })?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        crate::run_migrations(&pool).await?;
        debug!(path = %path.display(), "archive opened");

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Call [`crate::run_migrations`] first.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn not_found(id: &str) -> Error {
    Error::LogNotFound { id: id.to_string() }
}

#[async_trait]
impl LogArchive for SqliteLogArchive {
    async fn upsert_log(&self, meta: &LogMetadata) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (id, group_id, name, created_at, updated_at, recording,
                               record_begin_at, last_warn, filter_outside, filter_command,
                               filter_bot, filter_media, filter_forum_code, upload_time,
                               upload_file, upload_note, url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                group_id = excluded.group_id,
                name = excluded.name,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                recording = excluded.recording,
                record_begin_at = excluded.record_begin_at,
                last_warn = excluded.last_warn,
                filter_outside = excluded.filter_outside,
                filter_command = excluded.filter_command,
                filter_bot = excluded.filter_bot,
                filter_media = excluded.filter_media,
                filter_forum_code = excluded.filter_forum_code,
                upload_time = excluded.upload_time,
                upload_file = excluded.upload_file,
                upload_note = excluded.upload_note,
                url = excluded.url",
        )
        .bind(&meta.id)
        .bind(&meta.group_id)
        .bind(&meta.name)
        .bind(&meta.created_at)
        .bind(&meta.updated_at)
        .bind(meta.recording)
        .bind(&meta.record_begin_at)
        .bind(&meta.last_warn)
        .bind(meta.filters.outside)
        .bind(meta.filters.command)
        .bind(meta.filters.bot)
        .bind(meta.filters.media)
        .bind(meta.filters.forum_code)
        .bind(&meta.upload.time)
        .bind(&meta.upload.file)
        .bind(&meta.upload.note)
        .bind(&meta.upload.url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_record(&self, record: &ArchivedRecord) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO records (log_id, time, user_id, nickname, content, source, message_id, natural_key)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(log_id, natural_key) DO NOTHING",
        )
        .bind(&record.log_id)
        .bind(&record.time)
        .bind(&record.user_id)
        .bind(&record.nickname)
        .bind(&record.content)
        .bind(&record.source)
        .bind(&record.message_id)
        .bind(record.natural_key())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn fetch_records(&self, log_id: &str, limit: Option<usize>) -> Result<Vec<StoredRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, StoredRecord>(
            "SELECT id, log_id, time, user_id, nickname, content, source, message_id
             FROM records WHERE log_id = ?
             ORDER BY time ASC, id ASC
             LIMIT ?",
        )
        .bind(log_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_records(&self, log_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE log_id = ?")
            .bind(log_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn logs_by_group(&self, group_id: &str) -> Result<Vec<LogMetadata>> {
        let rows = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE group_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn log_by_id(&self, id: &str) -> Result<Option<LogMetadata>> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = ?");
        let row = sqlx::query_as::<_, LogRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn log_id_by_name(&self, group_id: &str, name: &str) -> Result<Option<String>> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT id FROM logs WHERE group_id = ? AND LOWER(name) = LOWER(?) LIMIT 1",
        )
        .bind(group_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn set_recording(&self, id: &str, recording: bool) -> Result<()> {
        let result = sqlx::query("UPDATE logs SET recording = ? WHERE id = ?")
            .bind(recording)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn update_upload(&self, id: &str, upload: &UploadFields) -> Result<()> {
        let result = sqlx::query(
            "UPDATE logs SET upload_time = ?, upload_file = ?, upload_note = ?, url = ?
             WHERE id = ?",
        )
        .bind(&upload.time)
        .bind(&upload.file)
        .bind(&upload.note)
        .bind(&upload.url)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn delete_records_by_message_id(&self, log_id: &str, message_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE log_id = ? AND message_id = ?")
            .bind(log_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_records_for_log(&self, log_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE log_id = ?")
            .bind(log_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_log(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM logs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
