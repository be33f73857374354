use {
    anyhow::{Result, bail},
    clap::Subcommand,
    dicelog_archive::{LogArchive, SqliteLogArchive},
    dicelog_config::DicelogConfig,
};

#[derive(Subcommand)]
pub enum ArchiveAction {
    /// List archived logs of a group.
    Logs { group: String },
    /// Print archived records of a log, oldest first.
    Records {
        log_id: String,
        /// Print at most this many records.
        #[arg(long)]
        limit: Option<usize>,
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Find a log id by its name within a group (case-insensitive).
    Find { group: String, name: String },
    /// Delete a log and all of its archived records.
    Delete { log_id: String },
}

async fn open(config: &DicelogConfig) -> Result<SqliteLogArchive> {
    let path = config.paths.archive_db_path();
    if !path.exists() {
        bail!(
            "archive not found: {} (run `dicelog retain` or `dicelog db migrate` first)",
            path.display()
        );
    }
    Ok(SqliteLogArchive::connect(&path).await?)
}

pub async fn handle_archive(action: &ArchiveAction, config: &DicelogConfig) -> Result<()> {
    let archive = open(config).await?;
    let result = run(&archive, action).await;
    archive.close().await;
    result
}

async fn run(archive: &dyn LogArchive, action: &ArchiveAction) -> Result<()> {
    match action {
        ArchiveAction::Logs { group } => {
            let logs = archive.logs_by_group(group).await?;
            if logs.is_empty() {
                println!("No archived logs for group {group}.");
            }
            for log in &logs {
                let count = archive.count_records(&log.id).await?;
                let state = if log.recording { " [recording]" } else { "" };
                println!(
                    "  {}  {}  created {}  {count} record(s){state}",
                    log.id,
                    log.name,
                    log.created_at.as_deref().unwrap_or("-"),
                );
            }
        },
        ArchiveAction::Records {
            log_id,
            limit,
            json,
        } => {
            let records = archive.fetch_records(log_id, *limit).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!("[{}] {}({}): {}", r.time, r.nickname, r.user_id, r.content);
                }
            }
        },
        ArchiveAction::Find { group, name } => match archive.log_id_by_name(group, name).await? {
            Some(id) => println!("{id}"),
            None => bail!("no log named {name:?} in group {group}"),
        },
        ArchiveAction::Delete { log_id } => {
            let records = archive.count_records(log_id).await?;
            archive.delete_log(log_id).await?;
            println!("Deleted log {log_id} and {records} archived record(s).");
        },
    }
    Ok(())
}
