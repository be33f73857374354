//! Drives a retention pass over every account document under a root.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    dicelog_archive::LogArchive,
    dicelog_config::RetentionConfig,
    dicelog_logbook::{AccountDocument, DocumentStore, LogDocument, Snapshot},
    futures::{StreamExt, stream},
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    limits::RetentionLimits,
    pipeline::DocumentPipeline,
    report::{DocumentReport, RetentionSummary},
};

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limits: RetentionLimits,
    /// Documents processed at once; `0` is treated as `1`.
    pub concurrency: usize,
    /// Deadline for reading, snapshotting and trimming one document.
    pub timeout: Option<Duration>,
    /// Report only: no snapshot, no archive writes, no rewrite.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl From<&RetentionConfig> for RunOptions {
    fn from(cfg: &RetentionConfig) -> Self {
        Self {
            limits: RetentionLimits::from(cfg),
            concurrency: cfg.concurrency,
            timeout: (cfg.document_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.document_timeout_secs)),
            dry_run: cfg.dry_run,
        }
    }
}

struct Staged {
    report: DocumentReport,
    document: LogDocument,
    original_len: u64,
}

impl Staged {
    fn new(
        doc: &AccountDocument,
        mut report: DocumentReport,
        document: LogDocument,
        original: &[u8],
        backup_path: Option<PathBuf>,
    ) -> Self {
        report.account = doc.account.clone();
        report.path = doc.path.clone();
        report.backup_path = backup_path;
        report.bytes_before = original.len() as u64;
        Self {
            report,
            document,
            original_len: original.len() as u64,
        }
    }
}

/// Snapshot, trim, and rewrite each discovered document.
pub struct RetentionOrchestrator {
    store: DocumentStore,
    archive: Option<Arc<dyn LogArchive>>,
    options: RunOptions,
}

impl RetentionOrchestrator {
    pub fn new(store: DocumentStore, options: RunOptions) -> Self {
        Self {
            store,
            archive: None,
            options,
        }
    }

    /// Migrate overflow records into `archive` instead of only trimming them.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn LogArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Process every document under the store root.
    ///
    /// Fails only when a limit is zero or the root cannot be listed;
    /// per-document failures are recorded in [`RetentionSummary::skipped`].
    pub async fn run(&self) -> Result<RetentionSummary> {
        self.options.limits.check()?;
        let documents = self.store.discover().await?;
        info!(
            root = %self.store.root.display(),
            documents = documents.len(),
            dry_run = self.options.dry_run,
            archive = self.archive.is_some(),
            "retention pass started"
        );

        let mut summary = RetentionSummary::new(self.store.root.clone(), self.options.dry_run);
        let mut results = stream::iter(documents)
            .map(|doc| async move {
                let result = self.process(&doc).await;
                (doc, result)
            })
            .buffered(self.options.concurrency.max(1));

        while let Some((doc, result)) = results.next().await {
            match result {
                Ok(report) => {
                    info!(
                        account = %report.account,
                        groups = report.groups,
                        logs = report.logs,
                        migrated = report.counts.records_migrated,
                        records_trimmed = report.counts.records_trimmed,
                        persisted = report.persisted,
                        "document processed"
                    );
                    summary.record(report);
                },
                Err(e) => {
                    warn!(path = %doc.path.display(), "document skipped: {e}");
                    summary.skip(doc.path, e.to_string());
                },
            }
        }

        info!(
            files = summary.files_processed,
            skipped = summary.skipped.len(),
            migrated = summary.counts.records_migrated,
            "retention pass finished"
        );
        Ok(summary)
    }

    /// Process a single document.
    ///
    /// A document within every limit is neither snapshotted nor rewritten.
    /// Otherwise the original file is only rewritten after its snapshot is on
    /// disk.
    pub async fn process(&self, doc: &AccountDocument) -> Result<DocumentReport> {
        let staged = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.stage(doc))
                .await
                .map_err(|_| Error::Timeout { limit })?,
            None => self.stage(doc).await,
        }?;

        let Staged {
            mut report,
            document,
            original_len,
        } = staged;
        report.bytes_after = original_len;

        if report.counts.is_zero() {
            return Ok(report);
        }
        let bytes = document.to_pretty_bytes()?;
        report.bytes_after = bytes.len() as u64;
        if self.options.dry_run {
            return Ok(report);
        }
        DocumentStore::write(&doc.path, bytes).await?;
        report.persisted = true;
        Ok(report)
    }

    async fn stage(&self, doc: &AccountDocument) -> Result<Staged> {
        let read = DocumentStore::read(&doc.path).await?;
        let mut document = LogDocument::from_slice(&read)?;
        let pipeline = DocumentPipeline::new(self.options.limits, None);

        // Dry runs and documents within every limit skip the snapshot.
        if self.options.dry_run || !pipeline.exceeds_limits(&document) {
            let report = pipeline.run(&mut document).await;
            return Ok(Staged::new(doc, report, document, &read, None));
        }

        let snapshot = Snapshot::create(&doc.path).await?;
        if snapshot.bytes != read {
            document = LogDocument::from_slice(&snapshot.bytes)?;
        }
        let report = DocumentPipeline::new(self.options.limits, self.archive.as_deref())
            .run(&mut document)
            .await;
        Ok(Staged::new(
            doc,
            report,
            document,
            &snapshot.bytes,
            Some(snapshot.backup_path),
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::path::Path};

    fn seed(root: &Path, account: &str, body: &serde_json::Value) -> PathBuf {
        let dir = root.join(account);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("log_session.json");
        std::fs::write(&path, serde_json::to_vec(body).unwrap()).unwrap();
        path
    }

    fn overflowing() -> serde_json::Value {
        let records: Vec<_> = (0..60)
            .map(|i| json!({"time": format!("t{i:03}"), "user_id": "1", "content": format!("c{i}")}))
            .collect();
        json!({"g": {"logs": {"l": {"records": records}}}})
    }

    fn orchestrator(root: &Path, options: RunOptions) -> RetentionOrchestrator {
        RetentionOrchestrator::new(DocumentStore::new(root, "log_session.json"), options)
    }

    #[tokio::test]
    async fn dry_run_leaves_files_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = seed(tmp.path(), "1", &overflowing());
        let before = std::fs::read(&path).unwrap();

        let options = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = orchestrator(tmp.path(), options).run().await.unwrap();
        assert_eq!(summary.counts.records_trimmed, 10);
        assert!(!summary.documents[0].persisted);
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(std::fs::read_dir(tmp.path().join("1")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn unchanged_document_is_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = seed(tmp.path(), "1", &json!({"g": {"logs": {"l": {"records": []}}}}));
        let before = std::fs::read(&path).unwrap();

        let summary = orchestrator(tmp.path(), RunOptions::default()).run().await.unwrap();
        assert_eq!(summary.files_processed, 1);
        assert!(!summary.documents[0].persisted);
        assert!(summary.documents[0].backup_path.is_none());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(std::fs::read_dir(tmp.path().join("1")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_skipped_and_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let good = seed(tmp.path(), "1", &overflowing());
        let dir = tmp.path().join("2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("log_session.json"), "{ not json").unwrap();

        let summary = orchestrator(tmp.path(), RunOptions::default()).run().await.unwrap();
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert!(summary.skipped[0].path.ends_with("2/log_session.json"));
        assert_eq!(summary.counts.records_trimmed, 10);

        let rewritten: serde_json::Value =
            serde_json::from_slice(&std::fs::read(good).unwrap()).unwrap();
        assert_eq!(rewritten["g"]["logs"]["l"]["records"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn missing_root_fails_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let err = orchestrator(&tmp.path().join("absent"), RunOptions::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Logbook(dicelog_logbook::Error::RootNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn zero_limit_refuses_to_run() {
        let tmp = tempfile::tempdir().unwrap();
        let path = seed(tmp.path(), "1", &overflowing());
        let before = std::fs::read(&path).unwrap();

        let cfg = RetentionConfig {
            records_limit: 0,
            participants_limit: 0,
            ..Default::default()
        };
        let err = orchestrator(tmp.path(), RunOptions::from(&cfg))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ZeroLimit { name: "records_limit" }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(std::fs::read_dir(tmp.path().join("1")).unwrap().count(), 1);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let cfg = RetentionConfig {
            document_timeout_secs: 0,
            ..Default::default()
        };
        assert!(RunOptions::from(&cfg).timeout.is_none());
        assert_eq!(
            RunOptions::default().timeout,
            Some(Duration::from_secs(300))
        );
    }
}
