use super::{SheetsApi, SpreadsheetRef};
use crate::error::Result;
use crate::models::{FromSheetRows, NewsRecord, RecordKey, ToSheetRows};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Deduplicated ingestion and retrieval of news records against a resolved
/// spreadsheet.
pub struct RecordStore<A> {
    api: A,
}

impl<A> RecordStore<A>
where
    A: SheetsApi + Sync,
{
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Append only records whose dedup key is not already present in the
    /// sheet, in one batch write, and return the count actually appended.
    ///
    /// Incoming records are stamped with the source label, and duplicates
    /// within the batch itself collapse too, so re-submitting the same
    /// batch always appends zero rows. The read-then-append sequence holds
    /// no remote lock; a concurrent writer can interleave, which makes a
    /// full retry of this call safe but not atomic.
    #[instrument(
        name = "Storing records",
        skip(self, records),
        fields(sheet = %sheet.id, incoming = records.len())
    )]
    pub async fn store_records(
        &self,
        sheet: &SpreadsheetRef,
        records: &[NewsRecord],
        source: &str,
    ) -> Result<usize> {
        self.api.ensure_data_sheet(&sheet.id).await?;

        let existing_rows = self.api.read_rows(&sheet.id).await?;
        let existing = NewsRecord::from_sheet_rows(&existing_rows)?;

        let mut seen: HashSet<RecordKey> = existing.iter().map(|r| r.dedup_key()).collect();

        let mut fresh = Vec::new();
        for record in records {
            let record = NewsRecord {
                source: source.to_string(),
                ..record.clone()
            };
            if seen.insert(record.dedup_key()) {
                fresh.push(record);
            }
        }

        if fresh.is_empty() {
            debug!("All records already stored");
            return Ok(0);
        }

        let mut rows = fresh.as_slice().to_sheet_rows()?;
        if !existing_rows.is_empty() {
            // Sheet already starts with a header row
            rows.remove(0);
        }

        let inserted = fresh.len();
        self.api.append_rows(&sheet.id, rows).await?;

        info!(inserted, skipped = records.len() - inserted, "Records stored");

        Ok(inserted)
    }

    /// Every record in the sheet, header excluded. Malformed rows are
    /// skipped during parsing, not fatal.
    #[instrument(name = "Reading records", skip(self), fields(sheet = %sheet.id))]
    pub async fn read_all_records(&self, sheet: &SpreadsheetRef) -> Result<Vec<NewsRecord>> {
        self.api.ensure_data_sheet(&sheet.id).await?;

        let rows = self.api.read_rows(&sheet.id).await?;
        NewsRecord::from_sheet_rows(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::test_helpers::mock_record;
    use crate::sheets::test_api::MockSheetsApi;

    fn mock_sheet() -> SpreadsheetRef {
        SpreadsheetRef {
            id: "sheet_abc".to_string(),
            name: "Test Sheet".to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_records_is_idempotent() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        let records = vec![mock_record("a1", "x"), mock_record("a2", "x")];

        let first = store.store_records(&sheet, &records, "X").await.unwrap();
        assert_eq!(first, 2);

        let second = store.store_records(&sheet, &records, "X").await.unwrap();
        assert_eq!(second, 0, "resubmitting the same batch must append nothing");

        let stored = store.read_all_records(&sheet).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.source == "X"));
    }

    #[tokio::test]
    async fn test_store_records_collapses_duplicates_within_batch() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        // Same url twice in one batch
        let records = vec![mock_record("a1", "x"), mock_record("a1", "x")];

        let inserted = store.store_records(&sheet, &records, "X").await.unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.read_all_records(&sheet).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_records_round_trip() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        let record = mock_record("a1", "ignored");
        store.store_records(&sheet, &[record.clone()], "reuters").await.unwrap();

        let stored = store.read_all_records(&sheet).await.unwrap();
        assert_eq!(
            stored,
            vec![NewsRecord {
                source: "reuters".to_string(),
                ..record
            }]
        );
    }

    #[tokio::test]
    async fn test_store_records_dedups_by_composite_key_when_url_empty() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        let record = NewsRecord {
            url: String::new(),
            ..mock_record("a1", "x")
        };

        assert_eq!(
            store.store_records(&sheet, &[record.clone()], "X").await.unwrap(),
            1
        );
        assert_eq!(
            store.store_records(&sheet, &[record], "X").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_store_records_same_url_different_source_is_distinct() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        let record = mock_record("a1", "x");
        assert_eq!(
            store.store_records(&sheet, &[record.clone()], "X").await.unwrap(),
            1
        );
        assert_eq!(
            store.store_records(&sheet, &[record], "Y").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_store_records_writes_header_once() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api.clone());
        let sheet = mock_sheet();

        store
            .store_records(&sheet, &[mock_record("a1", "x")], "X")
            .await
            .unwrap();
        store
            .store_records(&sheet, &[mock_record("a2", "x")], "X")
            .await
            .unwrap();

        let rows = api.rows(&sheet.id);
        assert_eq!(rows.len(), 3, "one header row plus two data rows");
        assert_eq!(rows[0][0], "Title");
    }

    #[tokio::test]
    async fn test_read_all_records_skips_malformed_rows() {
        let api = MockSheetsApi::new();
        let sheet = mock_sheet();

        api.append_rows(
            &sheet.id,
            vec![
                vec![
                    "Title".to_string(),
                    "URL".to_string(),
                    "Date".to_string(),
                    "Content".to_string(),
                    "Source".to_string(),
                ],
                vec![
                    "Good".to_string(),
                    "https://example.com/good".to_string(),
                    "2024-01-01".to_string(),
                    "body".to_string(),
                    "x".to_string(),
                ],
                // Too many columns
                vec!["a".to_string(); 7],
            ],
        )
        .await
        .unwrap();

        let store = RecordStore::new(api);
        let records = store.read_all_records(&sheet).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Good");
    }

    #[tokio::test]
    async fn test_read_all_records_empty_sheet() {
        let api = MockSheetsApi::new();
        let store = RecordStore::new(api);

        let records = store.read_all_records(&mock_sheet()).await.unwrap();
        assert_eq!(records, vec![]);
    }
}
