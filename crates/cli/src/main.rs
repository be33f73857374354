mod archive_commands;
mod config_commands;
mod db_commands;
mod retain_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    dicelog_config::DicelogConfig,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "dicelog",
    version,
    about = "Retention and archiving for DicePP log sessions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./dicelog.toml and the user config dir).
    #[arg(long, global = true, env = "DICELOG_CONFIG")]
    config: Option<PathBuf>,

    /// Bot data directory (overrides config value).
    #[arg(long, global = true, env = "DICELOG_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trim every log document and move overflow records into the archive.
    Retain(retain_commands::RetainArgs),
    /// Inspect and manage archived logs.
    Archive {
        #[command(subcommand)]
        action: archive_commands::ArchiveAction,
    },
    /// Archive database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Log to stderr so command output on stdout stays machine-readable.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Effective config: file, then environment, then command-line flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<DicelogConfig> {
    let config = match cli.config {
        Some(ref path) => dicelog_config::load_config(path)?,
        None => dicelog_config::discover_and_load(),
    };
    let mut config = dicelog_config::apply_env_overrides(config);
    if let Some(ref dir) = cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "dicelog starting");

    match cli.command {
        Commands::Config { ref action } => {
            config_commands::handle_config(action, cli.config.as_deref(), || resolve_config(&cli))
        },
        Commands::Retain(ref args) => {
            retain_commands::handle_retain(args, resolve_config(&cli)?).await
        },
        Commands::Archive { ref action } => {
            archive_commands::handle_archive(action, &resolve_config(&cli)?).await
        },
        Commands::Db { ref action } => db_commands::handle_db(action, &resolve_config(&cli)?).await,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn data_dir_flag_overrides_config() {
        let cli = Cli::try_parse_from([
            "dicelog",
            "--data-dir",
            "/srv/dice/Data",
            "retain",
            "--dry-run",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/dice/Data"));
        assert_eq!(
            config.paths.documents_root(),
            PathBuf::from("/srv/dice/Data/Bot")
        );
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[retention]\nrecords_limit = 20\n").unwrap();

        let cli = Cli::try_parse_from([
            "dicelog",
            "--config",
            path.to_str().unwrap(),
            "config",
            "show",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.retention.records_limit, 20);
    }

    #[tokio::test]
    async fn retain_rejects_zero_limits_before_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let account = dir.path().join("Bot").join("10001");
        std::fs::create_dir_all(&account).unwrap();
        let doc = account.join("log_session.json");
        std::fs::write(&doc, r#"{"g": {"logs": {"l": {"records": [{"time": "t"}]}}}}"#).unwrap();
        let config_path = dir.path().join("dicelog.toml");
        std::fs::write(&config_path, "[retention]\nrecords_limit = 0\n").unwrap();

        let cli = Cli::try_parse_from([
            "dicelog",
            "--config",
            config_path.to_str().unwrap(),
            "--data-dir",
            dir.path().to_str().unwrap(),
            "retain",
        ])
        .unwrap();
        let Commands::Retain(ref args) = cli.command else {
            panic!("expected retain");
        };
        let err = retain_commands::handle_retain(args, resolve_config(&cli).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("records_limit"));
        assert_eq!(std::fs::read_dir(&account).unwrap().count(), 1);
        assert!(!dir.path().join("log").exists());
    }
}
