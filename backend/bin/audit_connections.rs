use anyhow::Result;
use chrono::Utc;
use clap::{Arg, Command};
use quantum5ocial::db::{get_db_pool, DatabaseConfig, PgConnectionStore};
use quantum5ocial::services::{find_duplicate_pairs, DuplicatePair};
use quantum5ocial::utils::init_logging;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let matches = Command::new("audit-connections")
        .about("Find connection records that share a user pair")
        .arg(
            Arg::new("fix")
                .long("fix")
                .help("Delete every duplicate except the most advanced record per pair")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("confirm")
                .long("confirm")
                .help("Confirm deletion (required with --fix)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .help("Directory for the JSON backup written before deleting")
                .default_value("./db_backups"),
        )
        .get_matches();

    let fix = matches.get_flag("fix");
    let confirm = matches.get_flag("confirm");
    let output_dir = matches
        .get_one::<String>("output-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./db_backups"));

    let db_config = DatabaseConfig::for_maintenance()?;
    let pool = get_db_pool(&db_config).await?;
    let store = PgConnectionStore::new(pool);

    let records = store.list_all().await?;
    let duplicates = find_duplicate_pairs(&records);
    info!("Scanned {} connection records", records.len());

    if duplicates.is_empty() {
        info!("No duplicate pairs found");
        return Ok(());
    }

    for dup in &duplicates {
        info!(
            "Pair {} <-> {}: keeping {} ({}), {} extra record(s)",
            dup.pair.0,
            dup.pair.1,
            dup.keep.id,
            dup.keep.status,
            dup.discard.len()
        );
    }

    if !fix {
        info!("Report only. Re-run with --fix --confirm to remove duplicates.");
        return Ok(());
    }
    if !confirm {
        warn!("Deletion not confirmed. Use --confirm together with --fix.");
        return Ok(());
    }

    let backup_file = write_backup(&output_dir, &duplicates)?;
    info!("Backup written to {}", backup_file.display());

    let ids: Vec<Uuid> = duplicates
        .iter()
        .flat_map(|dup| dup.discard.iter().map(|c| c.id))
        .collect();
    let deleted = store.delete_ids(&ids).await?;
    info!("Deleted {} duplicate connection records", deleted);

    Ok(())
}

fn write_backup(output_dir: &Path, duplicates: &[DuplicatePair]) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let path = output_dir.join(format!("connections_duplicates_{}.json", timestamp));
    fs::write(&path, serde_json::to_string_pretty(duplicates)?)?;

    Ok(path)
}
