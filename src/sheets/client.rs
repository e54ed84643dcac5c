use super::{DATA_SHEET_NAME, SheetsApi};
use crate::config::GoogleConfig;
use crate::error::{AppError, Result};
use crate::models::{NewsRecord, ToSheetRows};
use crate::sheets::auth::SheetsAuthenticator;
use async_trait::async_trait;
use google_drive3::api::DriveHub;
use google_sheets4::Error as ApiError;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, GridProperties, Request, Sheet,
    SheetProperties, Sheets, Spreadsheet, SpreadsheetProperties, ValueRange,
};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const SHEETS_SCOPE: google_sheets4::api::Scope = google_sheets4::api::Scope::Spreadsheet;
const DRIVE_SCOPE: google_drive3::api::Scope = google_drive3::api::Scope::File;

const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

type Connector = HttpsConnector<HttpConnector>;

struct ClientInner {
    sheets: Sheets<Connector>,
    drive: DriveHub<Connector>,
}

/// Authenticated Google Sheets/Drive client implementing [`SheetsApi`].
#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<ClientInner>,
}

impl SheetsClient {
    /// Create a new SheetsClient with authenticated access
    #[instrument(name = "Authenticating to Google Sheets", skip_all)]
    pub async fn new(config: &GoogleConfig) -> Result<Self> {
        let auth = SheetsAuthenticator::new(config)?;

        // Surface a missing or unusable credential before any API call
        auth.get_valid_tokens().await?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .unwrap()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);

        let sheets = Sheets::new(client.clone(), auth.clone());
        let drive = DriveHub::new(client, auth);

        Ok(Self {
            inner: Arc::new(ClientInner { sheets, drive }),
        })
    }
}

/// Classify a Google API failure into the retryable/terminal error kinds.
/// The context string names the operation and remote id, never the token.
fn map_api_error(context: &str, e: ApiError) -> AppError {
    match e {
        ApiError::Failure(response) => {
            let status = response.status();
            match status.as_u16() {
                429 => AppError::Quota(format!("{}: rate limited", context)),
                401 | 403 => AppError::Auth(format!("{}: rejected with status {}", context, status)),
                _ => AppError::Network(format!("{}: failed with status {}", context, status)),
            }
        }
        ApiError::BadRequest(value) => {
            let code = value
                .pointer("/error/code")
                .and_then(|c| c.as_i64())
                .unwrap_or(0);
            match code {
                429 => AppError::Quota(format!("{}: quota exceeded", context)),
                401 | 403 => AppError::Auth(format!("{}: not authorized", context)),
                _ => AppError::Network(format!("{}: {}", context, value)),
            }
        }
        ApiError::MissingToken(e) => AppError::Auth(format!("{}: {}", context, e)),
        other => AppError::Network(format!("{}: {}", context, other)),
    }
}

/// Bounded exponential backoff around a remote call. Only transient errors
/// are retried; auth failures propagate immediately.
async fn with_backoff<T, Fut>(op: &str, mut call: impl FnMut() -> Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match call().await {
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn data_range() -> String {
    format!("'{}'!A:E", DATA_SHEET_NAME)
}

#[async_trait]
impl SheetsApi for SheetsClient {
    #[instrument(name = "Finding existing spreadsheet", skip(self))]
    async fn find_spreadsheet(&self, name: &str) -> Result<Option<String>> {
        let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
        let query = format!(
            "name='{}' and mimeType='application/vnd.google-apps.spreadsheet' and trashed=false",
            escaped
        );

        let query = query.as_str();

        let (_, file_list) = with_backoff("files.list", || async move {
            self.inner
                .drive
                .files()
                .list()
                .q(query)
                .spaces("drive")
                .page_size(1)
                .add_scope(DRIVE_SCOPE)
                .doit()
                .await
                .map_err(|e| map_api_error("Searching for spreadsheet", e))
        })
        .await?;

        // First match in listing order; ties between same-named
        // spreadsheets are not broken here
        let spreadsheet_id = file_list
            .files
            .and_then(|files| files.into_iter().next())
            .and_then(|file| file.id);

        Ok(spreadsheet_id)
    }

    #[instrument(name = "Creating new spreadsheet", skip(self))]
    async fn create_spreadsheet(&self, name: &str) -> Result<String> {
        let spreadsheet = Spreadsheet {
            properties: Some(SpreadsheetProperties {
                title: Some(name.to_string()),
                time_zone: Some("UTC".to_string()),
                ..Default::default()
            }),
            sheets: Some(vec![Sheet {
                properties: Some(SheetProperties {
                    title: Some(DATA_SHEET_NAME.to_string()),
                    sheet_type: Some("GRID".to_string()),
                    grid_properties: Some(GridProperties {
                        frozen_row_count: Some(1),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let (_, result) = with_backoff("spreadsheets.create", || {
            let spreadsheet = spreadsheet.clone();
            async move {
                self.inner
                    .sheets
                    .spreadsheets()
                    .create(spreadsheet)
                    .add_scope(SHEETS_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| map_api_error("Creating spreadsheet", e))
            }
        })
        .await?;

        let spreadsheet_id = result
            .spreadsheet_id
            .ok_or_else(|| AppError::Data("Created spreadsheet has empty ID".to_string()))?;

        // Write the header row so every reader sees the layout
        let no_records: &[NewsRecord] = &[];
        self.append_rows(&spreadsheet_id, no_records.to_sheet_rows()?)
            .await?;

        Ok(spreadsheet_id)
    }

    async fn ensure_data_sheet(&self, spreadsheet_id: &str) -> Result<()> {
        let (_, spreadsheet) = with_backoff("spreadsheets.get", || async move {
            self.inner
                .sheets
                .spreadsheets()
                .get(spreadsheet_id)
                .include_grid_data(false)
                .add_scope(SHEETS_SCOPE)
                .doit()
                .await
                .map_err(|e| map_api_error(&format!("Fetching spreadsheet {}", spreadsheet_id), e))
        })
        .await?;

        let exists = spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .any(|sheet| {
                sheet
                    .properties
                    .as_ref()
                    .map(|props| props.title.as_deref() == Some(DATA_SHEET_NAME))
                    .unwrap_or(false)
            });

        if exists {
            return Ok(());
        }

        debug!(spreadsheet_id, "Data sheet missing, creating it");

        let request = Request {
            add_sheet: Some(AddSheetRequest {
                properties: Some(SheetProperties {
                    title: Some(DATA_SHEET_NAME.to_string()),
                    sheet_type: Some("GRID".to_string()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };

        let batch_update = BatchUpdateSpreadsheetRequest {
            requests: Some(vec![request]),
            ..Default::default()
        };

        with_backoff("spreadsheets.batchUpdate", || {
            let batch_update = batch_update.clone();
            async move {
                self.inner
                    .sheets
                    .spreadsheets()
                    .batch_update(batch_update, spreadsheet_id)
                    .add_scope(SHEETS_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| {
                        map_api_error(&format!("Creating data sheet in {}", spreadsheet_id), e)
                    })
            }
        })
        .await?;

        Ok(())
    }

    #[instrument(name = "Reading sheet rows", skip(self))]
    async fn read_rows(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>> {
        let range = data_range();
        let range = range.as_str();

        let (_, response) = with_backoff("values.get", || async move {
            self.inner
                .sheets
                .spreadsheets()
                .values_get(spreadsheet_id, range)
                .date_time_render_option("FORMATTED_STRING")
                .major_dimension("ROWS")
                .value_render_option("UNFORMATTED_VALUE")
                .add_scope(SHEETS_SCOPE)
                .doit()
                .await
                .map_err(|e| map_api_error(&format!("Reading sheet {}", spreadsheet_id), e))
        })
        .await?;

        let values = response.values.unwrap_or_default();
        let rows = values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();

        Ok(rows)
    }

    #[instrument(name = "Appending sheet rows", skip(self, rows), fields(count = rows.len()))]
    async fn append_rows(&self, spreadsheet_id: &str, rows: Vec<Vec<String>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let range = data_range();
        let values: Vec<Vec<serde_json::Value>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(serde_json::Value::String).collect())
            .collect();

        let value_range = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            range: Some(range.clone()),
            values: Some(values),
        };

        let range = range.as_str();

        with_backoff("values.append", || {
            let value_range = value_range.clone();
            async move {
                self.inner
                    .sheets
                    .spreadsheets()
                    .values_append(value_range, spreadsheet_id, range)
                    .value_input_option("RAW")
                    .insert_data_option("INSERT_ROWS")
                    .add_scope(SHEETS_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| map_api_error(&format!("Appending to sheet {}", spreadsheet_id), e))
            }
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_retries_transient_errors() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let result: Result<u32> = with_backoff("test", || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(AppError::Network("flaky".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_does_not_retry_auth_errors() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let result: Result<()> = with_backoff("test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Auth("expired".to_string()))
        })
        .await;

        assert!(matches!(result.unwrap_err(), AppError::Auth(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_backoff_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let result: Result<()> = with_backoff("test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Quota("rate limited".to_string()))
        })
        .await;

        assert!(matches!(result.unwrap_err(), AppError::Quota(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
