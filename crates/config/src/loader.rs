use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::DicelogConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "dicelog.toml",
    "dicelog.yaml",
    "dicelog.yml",
    "dicelog.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<DicelogConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./dicelog.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/dicelog/dicelog.{toml,yaml,yml,json}` (user-global)
///
/// Returns `DicelogConfig::default()` if no config file is found or the
/// file fails to parse.
pub fn discover_and_load() -> DicelogConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    DicelogConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/dicelog/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "dicelog").map(|d| d.config_dir().to_path_buf())
}

/// Apply `DICELOG_DATA_DIR` / `DICELOG_ARCHIVE_DB` from the environment.
pub fn apply_env_overrides(config: DicelogConfig) -> DicelogConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: DicelogConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> DicelogConfig {
    if let Some(dir) = lookup("DICELOG_DATA_DIR").filter(|v| !v.is_empty()) {
        debug!(data_dir = %dir, "data dir overridden from environment");
        config.paths.data_dir = PathBuf::from(dir);
    }
    if let Some(db) = lookup("DICELOG_ARCHIVE_DB").filter(|v| !v.is_empty()) {
        debug!(archive_db = %db, "archive path overridden from environment");
        config.paths.archive_db = Some(PathBuf::from(db));
    }
    config
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<DicelogConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
