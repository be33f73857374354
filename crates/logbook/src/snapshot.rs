//! Timestamped copies of a document taken before it is rewritten.

use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    error::{Error, Result},
    store::read_locked,
};

/// A completed snapshot.
///
/// `bytes` is exactly what was written to `backup_path`, so callers can parse
/// the snapshotted state instead of re-reading the live file.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub source: PathBuf,
    pub backup_path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Snapshot {
    /// Copy `source` to `<source>.backup.<YYYYmmdd_HHMMSS>` and fsync it.
    ///
    /// Never overwrites an earlier snapshot; a second snapshot in the same
    /// second gets a `-1`, `-2`, ... suffix.
    pub async fn create(source: &Path) -> Result<Self> {
        let source = source.to_path_buf();
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        tokio::task::spawn_blocking(move || create_blocking(source, &stamp)).await?
    }
}

fn create_blocking(source: PathBuf, stamp: &str) -> Result<Snapshot> {
    let snapshot_err = |e: std::io::Error| Error::Snapshot {
        path: source.clone(),
        source: e,
    };

    let bytes = match read_locked(&source) {
        Ok(bytes) => bytes,
        Err(Error::Io(e)) => return Err(snapshot_err(e)),
        Err(e) => return Err(e),
    };

    let base = format!("{}.backup.{stamp}", source.display());
    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            PathBuf::from(&base)
        } else {
            PathBuf::from(format!("{base}-{attempt}"))
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut file) => {
                file.write_all(&bytes).map_err(snapshot_err)?;
                file.sync_all().map_err(snapshot_err)?;
                debug!(backup = %candidate.display(), bytes = bytes.len(), "snapshot written");
                return Ok(Snapshot {
                    source,
                    backup_path: candidate,
                    bytes,
                });
            },
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(snapshot_err(e)),
        }
    }
}
