use std::path::{Path, PathBuf};

use {
    anyhow::Result, clap::Subcommand, dicelog_archive::SqliteLogArchive,
    dicelog_config::DicelogConfig,
};

#[derive(Subcommand)]
pub enum DbAction {
    /// Create the archive database or apply pending migrations.
    Migrate,
    /// Delete the archive database files completely.
    Reset,
}

pub async fn handle_db(action: &DbAction, config: &DicelogConfig) -> Result<()> {
    let path = config.paths.archive_db_path();
    match action {
        DbAction::Migrate => {
            let archive = SqliteLogArchive::connect(&path).await?;
            archive.close().await;
            println!("Archive schema is up to date: {}", path.display());
            Ok(())
        },
        DbAction::Reset => reset(&path),
    }
}

fn reset(path: &Path) -> Result<()> {
    let mut deleted = false;

    // SQLite may have left WAL and SHM files next to the database.
    for suffix in ["", "-wal", "-shm"] {
        let file = PathBuf::from(format!("{}{suffix}", path.display()));
        if file.exists() {
            std::fs::remove_file(&file)?;
            println!("Deleted: {}", file.display());
            deleted = true;
        }
    }

    if deleted {
        println!("Archive deleted. Run `dicelog db migrate` to recreate it.");
    } else {
        println!("No archive found at {}.", path.display());
    }
    Ok(())
}
