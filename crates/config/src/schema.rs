/// Config schema types (paths and retention limits).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DicelogConfig {
    pub paths: PathsConfig,
    pub retention: RetentionConfig,
}

/// Where the bot keeps its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Bot data root. Account directories live under `<data_dir>/<bot_subdir>`.
    pub data_dir: PathBuf,
    /// Directory under `data_dir` holding one sub-directory per bot account.
    pub bot_subdir: String,
    /// File name of the log document inside each account directory.
    pub document_name: String,
    /// Archive database path. Defaults to `<data_dir>/log/log.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_db: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            bot_subdir: "Bot".into(),
            document_name: "log_session.json".into(),
            archive_db: None,
        }
    }
}

impl PathsConfig {
    /// Directory scanned for account directories.
    #[must_use]
    pub fn documents_root(&self) -> PathBuf {
        self.data_dir.join(&self.bot_subdir)
    }

    /// Resolved archive database path.
    #[must_use]
    pub fn archive_db_path(&self) -> PathBuf {
        self.archive_db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("log").join("log.db"))
    }
}

/// Retention limits and run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Records kept in memory per log; older ones move to the archive.
    pub records_limit: usize,
    /// Participants kept per log, ranked by message count.
    pub participants_limit: usize,
    /// Users kept per dice face, ranked by roll count.
    pub dice_users_limit: usize,
    /// Color assignments kept per log.
    pub color_map_limit: usize,
    /// Documents processed at the same time.
    pub concurrency: usize,
    /// Deadline for reading, snapshotting and trimming one document.
    /// `0` disables the deadline.
    pub document_timeout_secs: u64,
    /// Compute the report without touching disk or the archive.
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            records_limit: 50,
            participants_limit: 500,
            dice_users_limit: 100,
            color_map_limit: 500,
            concurrency: 1,
            document_timeout_secs: 300,
            dry_run: false,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_defaults_under_data_dir() {
        let paths = PathsConfig {
            data_dir: PathBuf::from("/srv/dice/Data"),
            ..Default::default()
        };
        assert_eq!(
            paths.archive_db_path(),
            PathBuf::from("/srv/dice/Data/log/log.db")
        );
        assert_eq!(paths.documents_root(), PathBuf::from("/srv/dice/Data/Bot"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: DicelogConfig = toml::from_str("[retention]\nrecords_limit = 20\n").unwrap();
        assert_eq!(cfg.retention.records_limit, 20);
        assert_eq!(cfg.retention.participants_limit, 500);
        assert_eq!(cfg.paths.document_name, "log_session.json");
    }
}
