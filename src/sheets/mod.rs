mod auth;
mod client;
mod locator;
mod records;

pub use client::SheetsClient;
pub use locator::SpreadsheetLocator;
pub use records::RecordStore;

// Re-export for CLI usage
pub use auth::{GoogleAuth, clear_tokens as clear_google_tokens};

use crate::error::Result;
use async_trait::async_trait;

/// Tab holding the record rows inside the backing spreadsheet.
pub const DATA_SHEET_NAME: &str = "News Data";

/// A resolved spreadsheet: the stable remote identifier plus the logical
/// name it was resolved from. Never mutated, only replaced when the cached
/// config is cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadsheetRef {
    pub id: String,
    pub name: String,
}

impl SpreadsheetRef {
    pub fn url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.id)
    }
}

/// Remote spreadsheet operations, kept narrow so the locator and record
/// store can be exercised against an in-memory double.
#[async_trait]
pub trait SheetsApi {
    /// First exact-title match in Drive listing order, `None` when absent.
    async fn find_spreadsheet(&self, name: &str) -> Result<Option<String>>;

    /// Create a spreadsheet with the data tab and header layout; returns
    /// the new identifier.
    async fn create_spreadsheet(&self, name: &str) -> Result<String>;

    /// Create the data tab if the spreadsheet doesn't have one yet.
    async fn ensure_data_sheet(&self, spreadsheet_id: &str) -> Result<()>;

    /// All rows of the data tab, header included.
    async fn read_rows(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>>;

    /// Append rows below the existing content in a single batch.
    async fn append_rows(&self, spreadsheet_id: &str, rows: Vec<Vec<String>>) -> Result<()>;
}
