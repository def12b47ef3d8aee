// Snapshot inspection commands

use std::path::Path;

use anyhow::{Context, Result};
use chargeside_session::{FileSnapshotStore, SnapshotStore};
use clap::Subcommand;

use crate::output::{print_snapshot, OutputFormat};

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Show the persisted snapshot
    Show,

    /// Delete the persisted snapshot, as on a fresh install
    Clear,
}

pub async fn run(command: SnapshotCommand, state_dir: &Path, output: OutputFormat) -> Result<()> {
    let store = FileSnapshotStore::new(state_dir);
    match command {
        SnapshotCommand::Show => show(&store, output).await,
        SnapshotCommand::Clear => clear(&store, output).await,
    }
}

async fn show(store: &FileSnapshotStore, output: OutputFormat) -> Result<()> {
    let snapshot = store
        .load()
        .await
        .with_context(|| format!("Failed to read snapshot at {}", store.path().display()))?;

    match snapshot {
        Some(snapshot) => print_snapshot(output, &snapshot),
        None if output.is_text() => {
            println!("No snapshot at {}", store.path().display());
            Ok(())
        }
        None => output.print_value(&serde_json::Value::Null),
    }
}

async fn clear(store: &FileSnapshotStore, output: OutputFormat) -> Result<()> {
    store
        .clear()
        .await
        .with_context(|| format!("Failed to remove snapshot at {}", store.path().display()))?;

    if output.is_text() {
        println!("Cleared {}", store.path().display());
    }
    Ok(())
}
