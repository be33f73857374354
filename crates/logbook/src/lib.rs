//! Log session documents: typed model, on-disk store, and snapshots.
//!
//! Each bot account keeps one JSON document at
//! `<root>/<account>/log_session.json` mapping group ids to their logs.
//! Files are read and rewritten under an advisory file lock.

pub mod error;
pub mod model;
pub mod snapshot;
pub mod store;

pub use {
    error::{Error, Result},
    model::{
        DiceFace, Extras, GroupLogs, IdValue, LogDocument, LogEntry, LogFilters, Record, Shaped,
        Stats, UploadInfo, scalar,
    },
    snapshot::Snapshot,
    store::{AccountDocument, DocumentStore},
};
