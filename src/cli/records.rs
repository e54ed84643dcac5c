use crate::config::{DEFAULT_SPREADSHEET_NAME, GoogleConfig, SheetConfig};
use crate::error::Result;
use crate::models::NewsRecord;
use crate::sheets::{RecordStore, SheetsClient, SpreadsheetLocator};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum RecordsCommand {
    /// Store a batch of records from a JSON file
    Store {
        /// Source label the records are attributed to
        #[arg(long)]
        source: String,
        /// Path to a JSON array of records
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_SPREADSHEET_NAME)]
        name: String,
    },
    /// Read and print every stored record
    List {
        #[arg(long, default_value = DEFAULT_SPREADSHEET_NAME)]
        name: String,
    },
}

impl RecordsCommand {
    pub async fn execute(&self) -> Result<()> {
        match self {
            RecordsCommand::Store { source, file, name } => store(name, source, file).await,
            RecordsCommand::List { name } => list(name).await,
        }
    }
}

async fn store(name: &str, source: &str, file: &Path) -> Result<()> {
    let records: Vec<NewsRecord> = serde_json::from_str(&fs::read_to_string(file)?)?;

    let config = GoogleConfig::resolve()?;
    let client = SheetsClient::new(&config).await?;
    let locator = SpreadsheetLocator::new(client.clone(), SheetConfig::open()?);

    let sheet = locator.resolve(name).await?;
    let record_store = RecordStore::new(client);

    let inserted = record_store.store_records(&sheet, &records, source).await?;

    info!(
        inserted,
        total = records.len(),
        url = %sheet.url(),
        "Records stored"
    );

    Ok(())
}

async fn list(name: &str) -> Result<()> {
    let config = GoogleConfig::resolve()?;
    let client = SheetsClient::new(&config).await?;
    let locator = SpreadsheetLocator::new(client.clone(), SheetConfig::open()?);

    let sheet = locator.resolve(name).await?;
    let record_store = RecordStore::new(client);

    let records = record_store.read_all_records(&sheet).await?;
    for record in &records {
        println!(
            "{} [{}] {} {}",
            record.date, record.source, record.title, record.url
        );
    }

    info!(count = records.len(), "Records read");

    Ok(())
}
