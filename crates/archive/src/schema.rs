//! Row types for the archive database.

use {
    serde::Serialize,
    sha2::{Digest, Sha256},
};

/// Group-level recording filters copied onto each archived log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterFlags {
    pub outside: bool,
    pub command: bool,
    pub bot: bool,
    pub media: bool,
    pub forum_code: bool,
}

/// Upload bookkeeping for a finished log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadFields {
    pub time: Option<String>,
    pub file: Option<String>,
    pub note: Option<String>,
    pub url: Option<String>,
}

/// Parent row for archived records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogMetadata {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub recording: bool,
    pub record_begin_at: Option<String>,
    pub last_warn: Option<String>,
    pub filters: FilterFlags,
    pub upload: UploadFields,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LogRow {
    id: String,
    group_id: String,
    name: String,
    created_at: Option<String>,
    updated_at: Option<String>,
    recording: bool,
    record_begin_at: Option<String>,
    last_warn: Option<String>,
    filter_outside: bool,
    filter_command: bool,
    filter_bot: bool,
    filter_media: bool,
    filter_forum_code: bool,
    upload_time: Option<String>,
    upload_file: Option<String>,
    upload_note: Option<String>,
    url: Option<String>,
}

impl From<LogRow> for LogMetadata {
    fn from(r: LogRow) -> Self {
        Self {
            id: r.id,
            group_id: r.group_id,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
            recording: r.recording,
            record_begin_at: r.record_begin_at,
            last_warn: r.last_warn,
            filters: FilterFlags {
                outside: r.filter_outside,
                command: r.filter_command,
                bot: r.filter_bot,
                media: r.filter_media,
                forum_code: r.filter_forum_code,
            },
            upload: UploadFields {
                time: r.upload_time,
                file: r.upload_file,
                note: r.upload_note,
                url: r.url,
            },
        }
    }
}

/// A transcript line on its way into the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivedRecord {
    pub log_id: String,
    pub time: String,
    pub user_id: String,
    pub nickname: String,
    pub content: String,
    pub source: String,
    pub message_id: Option<String>,
}

impl ArchivedRecord {
    /// Deduplication key, unique per log.
    ///
    /// `msg:<message_id>` when the platform supplied one, otherwise
    /// `rec:<sha256(time, user_id, content)>`.
    #[must_use]
    pub fn natural_key(&self) -> String {
        if let Some(id) = self.message_id.as_deref().filter(|id| !id.is_empty()) {
            return format!("msg:{id}");
        }
        let mut hasher = Sha256::new();
        for part in [&self.time, &self.user_id, &self.content] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let hex: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("rec:{hex}")
    }
}

/// Result of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same natural key was already archived.
    Duplicate,
}

/// A record read back from the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub log_id: String,
    pub time: String,
    pub user_id: String,
    pub nickname: String,
    pub content: String,
    pub source: String,
    pub message_id: Option<String>,
}
