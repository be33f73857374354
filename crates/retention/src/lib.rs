//! Retention engine for log session documents.
//!
//! A pass over one document walks every log entry and, in order: moves
//! records beyond the in-memory limit into the archive, trims the records,
//! trims participant and dice-user stats by count, then trims the color map
//! favoring users that are still participants. The orchestrator snapshots
//! each document before rewriting it and keeps going when one fails.

pub mod error;
pub mod limits;
pub mod migrate;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod trim;

pub use {
    error::{Error, Result},
    limits::RetentionLimits,
    migrate::{MigrationAdapter, MigrationOutcome},
    orchestrator::{RetentionOrchestrator, RunOptions},
    pipeline::DocumentPipeline,
    reconcile::{Reconciled, reconcile_colors},
    report::{DocumentReport, RetentionSummary, SkippedDocument, TrimCounts},
    trim::{Trimmed, rank_count, trim_by_count},
};
