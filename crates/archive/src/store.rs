//! Persistence trait for the log archive.

use async_trait::async_trait;

use crate::{
    Result,
    schema::{ArchivedRecord, InsertOutcome, LogMetadata, StoredRecord, UploadFields},
};

/// Durable storage for logs and their overflow records.
///
/// `upsert_log` and `insert_record` are what a retention pass needs; the
/// remaining methods serve inspection and the live bot.
#[async_trait]
pub trait LogArchive: Send + Sync {
    async fn upsert_log(&self, meta: &LogMetadata) -> Result<()>;
    /// Insert one record; an existing natural key yields `Duplicate`.
    async fn insert_record(&self, record: &ArchivedRecord) -> Result<InsertOutcome>;

    /// Records of a log in chronological order, at most `limit` when given.
    async fn fetch_records(&self, log_id: &str, limit: Option<usize>) -> Result<Vec<StoredRecord>>;
    async fn count_records(&self, log_id: &str) -> Result<u64>;
    async fn logs_by_group(&self, group_id: &str) -> Result<Vec<LogMetadata>>;
    async fn log_by_id(&self, id: &str) -> Result<Option<LogMetadata>>;
    /// Case-insensitive name lookup within a group.
    async fn log_id_by_name(&self, group_id: &str, name: &str) -> Result<Option<String>>;
    async fn set_recording(&self, id: &str, recording: bool) -> Result<()>;
    async fn update_upload(&self, id: &str, upload: &UploadFields) -> Result<()>;
    async fn delete_records_by_message_id(&self, log_id: &str, message_id: &str) -> Result<u64>;
    async fn delete_records_for_log(&self, log_id: &str) -> Result<u64>;
    /// Delete a log and, through the foreign key, all its records.
    async fn delete_log(&self, id: &str) -> Result<()>;
}
