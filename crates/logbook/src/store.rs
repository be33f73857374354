use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use fd_lock::RwLock;

use crate::error::{Context, Error, Result};

/// One account's log document on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDocument {
    /// Account directory name (the bot's account id).
    pub account: String,
    pub path: PathBuf,
}

/// Finds and rewrites `<root>/<account>/<document_name>` files.
pub struct DocumentStore {
    pub root: PathBuf,
    pub document_name: String,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, document_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            document_name: document_name.into(),
        }
    }

    /// List account directories that hold a document, sorted by account.
    ///
    /// Directories without the document are ignored.
    pub async fn discover(&self) -> Result<Vec<AccountDocument>> {
        let root = self.root.clone();
        let document_name = self.document_name.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<AccountDocument>> {
            if !root.is_dir() {
                return Err(Error::RootNotFound { path: root });
            }
            let mut found = Vec::new();
            let entries =
                fs::read_dir(&root).with_context(|| format!("listing {}", root.display()))?;
            for entry in entries {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let path = entry.path().join(&document_name);
                if !path.is_file() {
                    continue;
                }
                found.push(AccountDocument {
                    account: entry.file_name().to_string_lossy().into_owned(),
                    path,
                });
            }
            found.sort_by(|a, b| a.account.cmp(&b.account));
            Ok(found)
        })
        .await?
    }

    /// Read a document's raw bytes under a shared lock.
    pub async fn read(path: &Path) -> Result<Vec<u8>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            read_locked(&path).with_context(|| format!("reading {}", path.display()))
        })
        .await?
    }

    /// Replace a document's contents under an exclusive lock and flush to disk.
    pub async fn write(path: &Path, bytes: Vec<u8>) -> Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .with_context(|| format!("opening {} for rewrite", path.display()))?;
            let mut lock = RwLock::new(file);
            let mut guard = lock
                .write()
                .map_err(|e| Error::lock_failed(e.to_string()))?;
            guard
                .set_len(0)
                .and_then(|()| guard.write_all(&bytes))
                .and_then(|()| guard.sync_all())
                .with_context(|| format!("rewriting {}", path.display()))
        })
        .await?
    }
}

pub(crate) fn read_locked(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)?;
    let lock = RwLock::new(file);
    let guard = lock
        .read()
        .map_err(|e| Error::lock_failed(e.to_string()))?;
    let mut bytes = Vec::new();
    (&*guard).read_to_end(&mut bytes)?;
    Ok(bytes)
}
