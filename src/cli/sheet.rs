use crate::config::{DEFAULT_SPREADSHEET_NAME, GoogleConfig, SheetConfig};
use crate::error::Result;
use crate::sheets::{SheetsClient, SpreadsheetLocator};
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum SheetCommand {
    /// Find or create the spreadsheet and persist its id
    Resolve {
        #[arg(long, default_value = DEFAULT_SPREADSHEET_NAME)]
        name: String,
    },
}

impl SheetCommand {
    pub async fn execute(&self) -> Result<()> {
        match self {
            SheetCommand::Resolve { name } => resolve(name).await,
        }
    }
}

async fn resolve(name: &str) -> Result<()> {
    let config = GoogleConfig::resolve()?;
    let client = SheetsClient::new(&config).await?;
    let locator = SpreadsheetLocator::new(client, SheetConfig::open()?);

    let sheet = locator.resolve(name).await?;

    info!(name = %sheet.name, id = %sheet.id, url = %sheet.url(), "Spreadsheet resolved");

    Ok(())
}
