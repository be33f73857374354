//! Moving overflow records into the archive.

use {
    dicelog_archive::{
        ArchivedRecord, FilterFlags, InsertOutcome, LogArchive, LogMetadata, UploadFields,
    },
    dicelog_logbook::{IdValue, LogEntry, LogFilters, Record, Shaped, scalar},
    serde::Serialize,
    tracing::{debug, warn},
};

/// Archived `source` for a record that does not name one.
const DEFAULT_SOURCE: &str = "user";

/// What happened to one entry's overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    /// Records newly written to the archive.
    pub inserted: usize,
    /// Records the archive already held.
    pub duplicates: usize,
    /// Overflow items that were not record objects.
    pub malformed: usize,
    /// Set when the archive failed; `inserted` counts what landed before.
    pub error: Option<String>,
}

impl MigrationOutcome {
    #[must_use]
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Writes a log's overflow records through a borrowed archive handle.
pub struct MigrationAdapter<'a> {
    archive: &'a dyn LogArchive,
}

impl<'a> MigrationAdapter<'a> {
    pub fn new(archive: &'a dyn LogArchive) -> Self {
        Self { archive }
    }

    /// Upsert the parent log, then insert each overflow record oldest-first.
    ///
    /// Never returns an error: an archive failure stops the entry and is
    /// reported in the outcome.
    pub async fn migrate(
        &self,
        meta: &LogMetadata,
        overflow: &[Shaped<Record>],
    ) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();

        if let Err(e) = self.archive.upsert_log(meta).await {
            warn!(group = %meta.group_id, log = %meta.id, "log upsert failed: {e}");
            outcome.error = Some(e.to_string());
            return outcome;
        }

        for item in overflow {
            let Some(record) = item.as_valid() else {
                debug!(log = %meta.id, "overflow item is not a record; skipped");
                outcome.malformed += 1;
                continue;
            };
            match self.archive.insert_record(&to_archived(&meta.id, record)).await {
                Ok(InsertOutcome::Inserted) => outcome.inserted += 1,
                Ok(InsertOutcome::Duplicate) => outcome.duplicates += 1,
                Err(e) => {
                    warn!(
                        group = %meta.group_id,
                        log = %meta.id,
                        inserted = outcome.inserted,
                        "record migration stopped: {e}"
                    );
                    outcome.error = Some(e.to_string());
                    break;
                },
            }
        }

        debug!(
            log = %meta.id,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "overflow migrated"
        );
        outcome
    }
}

/// Archive row for a log entry, including its group's filters.
#[must_use]
pub fn log_metadata(
    group_id: &str,
    log_id: &str,
    entry: &LogEntry,
    filters: &LogFilters,
) -> LogMetadata {
    let upload = entry.upload().map_or_else(UploadFields::default, |u| UploadFields {
        time: scalar(&u.time).cloned(),
        file: scalar(&u.file).cloned(),
        note: scalar(&u.note).cloned(),
        url: scalar(&u.url).cloned(),
    });
    let flag = |f: &Option<Option<bool>>| scalar(f).copied().unwrap_or(false);
    LogMetadata {
        id: log_id.to_string(),
        group_id: group_id.to_string(),
        name: scalar(&entry.name)
            .cloned()
            .unwrap_or_else(|| log_id.to_string()),
        created_at: scalar(&entry.created_at).cloned(),
        updated_at: scalar(&entry.updated_at).cloned(),
        recording: flag(&entry.recording),
        record_begin_at: scalar(&entry.record_begin_at).cloned(),
        last_warn: scalar(&entry.last_warn).cloned(),
        filters: FilterFlags {
            outside: flag(&filters.outside),
            command: flag(&filters.command),
            bot: flag(&filters.bot),
            media: flag(&filters.media),
            forum_code: flag(&filters.forum_code),
        },
        upload,
    }
}

fn to_archived(log_id: &str, record: &Record) -> ArchivedRecord {
    ArchivedRecord {
        log_id: log_id.to_string(),
        time: scalar(&record.time).cloned().unwrap_or_default(),
        user_id: scalar(&record.user_id)
            .map(IdValue::as_string)
            .unwrap_or_default(),
        nickname: scalar(&record.nickname).cloned().unwrap_or_default(),
        content: scalar(&record.content).cloned().unwrap_or_default(),
        source: scalar(&record.source)
            .cloned()
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        message_id: scalar(&record.message_id)
            .map(IdValue::as_string)
            .filter(|id| !id.is_empty()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        dicelog_archive::{SqliteLogArchive, StoredRecord},
        serde_json::json,
    };

    async fn make_archive() -> SqliteLogArchive {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        dicelog_archive::run_migrations(&pool).await.unwrap();
        SqliteLogArchive::with_pool(pool)
    }

    fn overflow(n: usize) -> Vec<Shaped<Record>> {
        (0..n)
            .map(|i| {
                serde_json::from_value(json!({
                    "time": format!("2024/05/01 20:{:02}:00", i % 60),
                    "user_id": 42,
                    "nickname": "Ann",
                    "content": format!("line {i}"),
                    "source": "user"
                }))
                .unwrap()
            })
            .collect()
    }

    fn meta() -> LogMetadata {
        let entry: LogEntry = serde_json::from_value(json!({
            "name": "Session",
            "recording": true,
            "upload": {"url": "https://example.invalid/x"}
        }))
        .unwrap();
        let filters = LogFilters {
            command: Some(Some(true)),
            ..Default::default()
        };
        log_metadata("g1", "l1", &entry, &filters)
    }

    #[test]
    fn metadata_carries_filters_and_upload() {
        let meta = meta();
        assert_eq!(meta.name, "Session");
        assert!(meta.recording);
        assert!(meta.filters.command);
        assert!(!meta.filters.bot);
        assert_eq!(meta.upload.url.as_deref(), Some("https://example.invalid/x"));
    }

    #[test]
    fn unnamed_log_is_archived_under_its_id() {
        for body in [json!({}), json!({"name": null})] {
            let entry: LogEntry = serde_json::from_value(body).unwrap();
            let meta = log_metadata("g1", "l9", &entry, &LogFilters::default());
            assert_eq!(meta.name, "l9");
            assert!(!meta.recording);
        }
    }

    #[test]
    fn record_without_source_is_archived_as_user() {
        let record: Record =
            serde_json::from_value(json!({"time": "t", "user_id": "1", "source": null})).unwrap();
        assert_eq!(to_archived("l1", &record).source, "user");
        let bot: Record = serde_json::from_value(json!({"source": "bot"})).unwrap();
        assert_eq!(to_archived("l1", &bot).source, "bot");
    }

    #[test]
    fn numeric_ids_become_strings() {
        let record: Record =
            serde_json::from_value(json!({"user_id": 42, "message_id": 991})).unwrap();
        let archived = to_archived("l1", &record);
        assert_eq!(archived.user_id, "42");
        assert_eq!(archived.message_id.as_deref(), Some("991"));
    }

    #[tokio::test]
    async fn second_migration_inserts_nothing() {
        let archive = make_archive().await;
        let adapter = MigrationAdapter::new(&archive);
        let records = overflow(70);

        let first = adapter.migrate(&meta(), &records).await;
        assert_eq!(first.inserted, 70);
        assert!(!first.failed());

        let second = adapter.migrate(&meta(), &records).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 70);
        assert_eq!(archive.count_records("l1").await.unwrap(), 70);

        let stored: Vec<StoredRecord> = archive.fetch_records("l1", Some(1)).await.unwrap();
        assert_eq!(stored[0].user_id, "42");
    }

    #[tokio::test]
    async fn malformed_overflow_items_are_skipped() {
        let archive = make_archive().await;
        let mut records = overflow(2);
        records.insert(1, Shaped::Malformed(json!("garbage")));

        let outcome = MigrationAdapter::new(&archive).migrate(&meta(), &records).await;
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.malformed, 1);
    }

    #[tokio::test]
    async fn closed_archive_reports_failure() {
        let archive = make_archive().await;
        archive.close().await;

        let outcome = MigrationAdapter::new(&archive).migrate(&meta(), &overflow(3)).await;
        assert!(outcome.failed());
        assert_eq!(outcome.inserted, 0);
    }
}
