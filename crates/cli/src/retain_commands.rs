use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Result,
    clap::Args,
    dicelog_archive::{LogArchive, SqliteLogArchive},
    dicelog_config::DicelogConfig,
    dicelog_logbook::DocumentStore,
    dicelog_retention::{RetentionOrchestrator, RunOptions},
    tracing::warn,
};

#[derive(Args)]
pub struct RetainArgs {
    /// Directory holding one sub-directory per bot account
    /// (default: `<data_dir>/Bot`).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Archive database (default: `<data_dir>/log/log.db`).
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Report what would change without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Trim overflow records without archiving them.
    #[arg(long, conflicts_with = "archive")]
    no_archive: bool,

    /// Documents processed at the same time.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

pub async fn handle_retain(args: &RetainArgs, config: DicelogConfig) -> Result<()> {
    let root = args
        .root
        .clone()
        .unwrap_or_else(|| config.paths.documents_root());

    let mut options = RunOptions::from(&config.retention);
    options.dry_run |= args.dry_run;
    if let Some(n) = args.concurrency {
        options.concurrency = n;
    }
    options.limits.check()?;

    let archive = if args.no_archive || options.dry_run {
        None
    } else {
        let path = args
            .archive
            .clone()
            .unwrap_or_else(|| config.paths.archive_db_path());
        match SqliteLogArchive::connect(&path).await {
            Ok(archive) => Some(Arc::new(archive)),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "archive unavailable, overflow records will only be trimmed: {e}"
                );
                None
            },
        }
    };

    let store = DocumentStore::new(root, config.paths.document_name.clone());
    let mut orchestrator = RetentionOrchestrator::new(store, options);
    if let Some(ref archive) = archive {
        orchestrator = orchestrator.with_archive(Arc::clone(archive) as Arc<dyn LogArchive>);
    }

    let result = orchestrator.run().await;
    if let Some(archive) = archive {
        archive.close().await;
    }
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}
