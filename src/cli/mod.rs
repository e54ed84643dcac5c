mod auth;
mod records;
mod sheet;
mod show;

use crate::error::Result;
use clap::{Parser, Subcommand};

pub use auth::AuthCommand;
pub use records::RecordsCommand;
pub use sheet::SheetCommand;
pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "news-sheets")]
#[command(about = "Store scraped news records in a Google Sheets-backed store", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Auth { command } => command.execute().await,
            Commands::Sheet { command } => command.execute().await,
            Commands::Records { command } => command.execute().await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage Google authorization
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Resolve or create the backing spreadsheet
    Sheet {
        #[command(subcommand)]
        command: SheetCommand,
    },
    /// Store and read news records
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
    /// Show local paths used by the tool
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}
