use crate::infra::build_store;
use clap::Args;
use intake_gateway::config::AppConfig;
use intake_gateway::error::AppError;
use intake_gateway::gateway::{
    export_spending, DocumentFields, DocumentStore, StoredDocument, SPENDING_COLLECTION,
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Args, Debug, Default)]
pub(crate) struct ExportArgs {
    /// Write the CSV to this file instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// JSON file holding an array of spending records
    #[arg(long)]
    pub(crate) file: PathBuf,
}

pub(crate) async fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = build_store(&config)?;
    write_export(store.as_ref(), args.output.as_deref()).await
}

pub(crate) async fn run_seed(args: SeedArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = build_store(&config)?;
    if store.backend() == "memory" {
        eprintln!(
            "warning: no persistent store configured; seeded records are discarded on exit"
        );
    }

    let raw = tokio::fs::read_to_string(&args.file).await?;
    let documents = seed_spending(store.as_ref(), &raw).await?;
    for document in &documents {
        let month = document
            .fields
            .get("month")
            .and_then(|value| value.as_str())
            .unwrap_or("-");
        println!("Added document {} for {}", document.id, month);
    }
    println!("Seeded {} spending records", documents.len());
    Ok(())
}

async fn write_export(store: &dyn DocumentStore, output: Option<&Path>) -> Result<(), AppError> {
    let csv = export_spending(store).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, csv.as_bytes()).await?;
            eprintln!("Wrote spending export to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(csv.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// Append every record of a JSON array to the spending collection, in order.
async fn seed_spending(
    store: &dyn DocumentStore,
    raw: &str,
) -> Result<Vec<StoredDocument>, AppError> {
    let records: Vec<DocumentFields> = serde_json::from_str(raw)?;
    let mut stored = Vec::with_capacity(records.len());
    for record in records {
        stored.push(store.append(SPENDING_COLLECTION, record).await?);
    }
    Ok(stored)
}
