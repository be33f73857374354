//! Per-document reports and the run summary.

use std::{fmt, ops::AddAssign, path::PathBuf};

use serde::Serialize;

/// Deltas produced by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimCounts {
    pub records_migrated: usize,
    pub records_trimmed: usize,
    pub participants_trimmed: usize,
    pub dice_users_trimmed: usize,
    pub colors_trimmed: usize,
}

impl TrimCounts {
    /// `true` when nothing was migrated or removed.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for TrimCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.records_migrated += rhs.records_migrated;
        self.records_trimmed += rhs.records_trimmed;
        self.participants_trimmed += rhs.participants_trimmed;
        self.dice_users_trimmed += rhs.dice_users_trimmed;
        self.colors_trimmed += rhs.colors_trimmed;
    }
}

/// Outcome of one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentReport {
    /// Account directory name; empty when the pipeline ran detached.
    pub account: String,
    pub path: PathBuf,
    pub groups: usize,
    pub logs: usize,
    pub counts: TrimCounts,
    /// Units skipped because they did not have the expected shape.
    pub anomalies: usize,
    /// Entries whose archive migration failed part-way.
    pub migration_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Whether the document was rewritten.
    pub persisted: bool,
}

/// A document left untouched because processing it failed.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Totals for a whole retention run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionSummary {
    pub root: PathBuf,
    pub dry_run: bool,
    pub files_processed: usize,
    pub groups: usize,
    pub logs: usize,
    pub counts: TrimCounts,
    pub anomalies: usize,
    pub migration_failures: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub documents: Vec<DocumentReport>,
    pub skipped: Vec<SkippedDocument>,
}

impl RetentionSummary {
    pub fn new(root: PathBuf, dry_run: bool) -> Self {
        Self {
            root,
            dry_run,
            ..Default::default()
        }
    }

    /// Fold a finished document into the totals.
    pub fn record(&mut self, report: DocumentReport) {
        self.files_processed += 1;
        self.groups += report.groups;
        self.logs += report.logs;
        self.counts += report.counts;
        self.anomalies += report.anomalies;
        self.migration_failures += report.migration_failures;
        self.bytes_before += report.bytes_before;
        self.bytes_after += report.bytes_after;
        self.documents.push(report);
    }

    pub fn skip(&mut self, path: PathBuf, reason: impl Into<String>) {
        self.skipped.push(SkippedDocument {
            path,
            reason: reason.into(),
        });
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

impl fmt::Display for RetentionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        if self.dry_run {
            writeln!(f, "Dry run: no files or archive rows were written.")?;
        }
        writeln!(f, "Retention summary for {}", self.root.display())?;
        writeln!(f, "  files processed:      {}", self.files_processed)?;
        writeln!(f, "  groups:               {}", self.groups)?;
        writeln!(f, "  logs:                 {}", self.logs)?;
        writeln!(f, "  records migrated:     {}", c.records_migrated)?;
        writeln!(f, "  records trimmed:      {}", c.records_trimmed)?;
        writeln!(f, "  participants trimmed: {}", c.participants_trimmed)?;
        writeln!(f, "  dice users trimmed:   {}", c.dice_users_trimmed)?;
        writeln!(f, "  colors trimmed:       {}", c.colors_trimmed)?;
        if self.anomalies > 0 {
            writeln!(f, "  malformed units:      {}", self.anomalies)?;
        }
        if self.migration_failures > 0 {
            writeln!(f, "  migration failures:   {}", self.migration_failures)?;
        }
        writeln!(
            f,
            "  size:                 {} -> {}",
            format_bytes(self.bytes_before),
            format_bytes(self.bytes_after)
        )?;
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped {} document(s):", self.skipped.len())?;
            for s in &self.skipped {
                writeln!(f, "  {}: {}", s.path.display(), s.reason)?;
            }
        }
        Ok(())
    }
}
