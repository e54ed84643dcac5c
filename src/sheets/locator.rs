use super::{SheetsApi, SpreadsheetRef};
use crate::config::SheetConfig;
use crate::error::Result;
use tracing::{debug, info, instrument};

/// Resolves a logical spreadsheet name to its stable remote identifier,
/// creating the spreadsheet on first use and caching the id in the config
/// store so later runs skip the Drive search.
pub struct SpreadsheetLocator<A> {
    api: A,
    config: SheetConfig,
}

impl<A> SpreadsheetLocator<A>
where
    A: SheetsApi + Sync,
{
    pub fn new(api: A, config: SheetConfig) -> Self {
        Self { api, config }
    }

    /// Cached config first, then a Drive search, then creation.
    ///
    /// find-then-create is not atomic: two resolvers racing on the same
    /// name can produce duplicate same-named spreadsheets. There is no
    /// remote lock; this is a documented limitation.
    #[instrument(name = "Resolving spreadsheet", skip(self))]
    pub async fn resolve(&self, name: &str) -> Result<SpreadsheetRef> {
        if let Some(id) = self.config.get() {
            debug!(%id, "Using cached spreadsheet id");
            return Ok(SpreadsheetRef {
                id,
                name: name.to_string(),
            });
        }

        if let Some(id) = self.api.find_spreadsheet(name).await? {
            info!(%id, "Found existing spreadsheet");
            self.config.set(&id)?;
            return Ok(SpreadsheetRef {
                id,
                name: name.to_string(),
            });
        }

        let id = self.api.create_spreadsheet(name).await?;
        info!(%id, "Created new spreadsheet");
        self.config.set(&id)?;

        Ok(SpreadsheetRef {
            id,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::test_api::MockSheetsApi;

    fn temp_config(dir: &tempfile::TempDir) -> SheetConfig {
        SheetConfig::new(dir.path().join("sheets_config.json"))
    }

    #[tokio::test]
    async fn test_resolve_creates_when_absent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockSheetsApi::new();
        let locator = SpreadsheetLocator::new(api.clone(), temp_config(&dir));

        let sheet = locator.resolve("Financial News Scraper Data").await.unwrap();
        assert_eq!(api.find_calls(), 1);
        assert_eq!(api.create_calls(), 1);

        // The id landed in the config file for later runs
        assert_eq!(temp_config(&dir).get(), Some(sheet.id.clone()));
    }

    #[tokio::test]
    async fn test_resolve_finds_existing_without_creating() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockSheetsApi::with_existing("Financial News Scraper Data", "existing_id");
        let locator = SpreadsheetLocator::new(api.clone(), temp_config(&dir));

        let sheet = locator.resolve("Financial News Scraper Data").await.unwrap();
        assert_eq!(sheet.id, "existing_id");
        assert_eq!(api.find_calls(), 1);
        assert_eq!(api.create_calls(), 0, "find succeeded, create must not run");
    }

    #[tokio::test]
    async fn test_resolve_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let api = MockSheetsApi::new();
        let locator = SpreadsheetLocator::new(api.clone(), temp_config(&dir));

        let first = locator.resolve("My Sheet").await.unwrap();
        let second = locator.resolve("My Sheet").await.unwrap();
        assert_eq!(first.id, second.id);

        // The second call was answered from config, not the API
        assert_eq!(api.find_calls(), 1);
        assert_eq!(api.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_skips_search_in_subsequent_run() {
        let dir = tempfile::tempdir().unwrap();

        let first_run = MockSheetsApi::new();
        let id = {
            let locator = SpreadsheetLocator::new(first_run.clone(), temp_config(&dir));
            locator.resolve("My Sheet").await.unwrap().id
        };

        // A fresh process with the same config file resolves without any
        // network search
        let second_run = MockSheetsApi::new();
        let locator = SpreadsheetLocator::new(second_run.clone(), temp_config(&dir));
        let sheet = locator.resolve("My Sheet").await.unwrap();

        assert_eq!(sheet.id, id);
        assert_eq!(second_run.find_calls(), 0);
        assert_eq!(second_run.create_calls(), 0);
    }

    #[test]
    fn test_spreadsheet_url() {
        let sheet = SpreadsheetRef {
            id: "abc123".to_string(),
            name: "My Sheet".to_string(),
        };
        assert_eq!(
            sheet.url(),
            "https://docs.google.com/spreadsheets/d/abc123"
        );
    }
}
