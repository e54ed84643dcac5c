use crate::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A scraped news item. One record maps to one sheet row; records are
/// immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NewsRecord {
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub date: String,
    pub content: String,
    pub source: String,
}

/// Identity of a record within the store.
///
/// The url is the primary key component; when it is empty the
/// (title, date, source) tuple is used instead. Key fields are trimmed so
/// whitespace variants of the same record collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Url { url: String, source: String },
    Composite { title: String, date: String, source: String },
}

impl NewsRecord {
    pub fn dedup_key(&self) -> RecordKey {
        let url = self.url.trim();
        let source = self.source.trim().to_string();
        if url.is_empty() {
            RecordKey::Composite {
                title: self.title.trim().to_string(),
                date: self.date.trim().to_string(),
                source,
            }
        } else {
            RecordKey::Url {
                url: url.to_string(),
                source,
            }
        }
    }
}

pub trait FromSheetRows: Sized {
    /// Convert a vector of rows (first row as headers) to a list of records.
    fn from_sheet_rows(rows: &[Vec<String>]) -> crate::error::Result<Vec<Self>>;
}

pub trait ToSheetRows {
    /// Convert a list of records to a vector of rows (strings), always
    /// including headers.
    fn to_sheet_rows(&self) -> crate::error::Result<Vec<Vec<String>>>;
}

impl FromSheetRows for NewsRecord {
    fn from_sheet_rows(rows: &[Vec<String>]) -> crate::error::Result<Vec<Self>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        // Use the first row as headers for deserialization
        let headers_row = &rows[0];
        let headers = csv::StringRecord::from(headers_row.clone());

        let mut records = Vec::new();

        for (idx, row) in rows.iter().enumerate().skip(1) {
            // Rows with extra columns don't match the layout; skip them
            if row.len() > headers.len() {
                warn!(row = idx + 1, columns = row.len(), "Skipping malformed row");
                continue;
            }

            // The values API omits trailing empty cells, so short rows are
            // padded rather than rejected
            let mut row_vec = row.clone();
            while row_vec.len() < headers.len() {
                row_vec.push(String::new());
            }

            let string_record = csv::StringRecord::from(row_vec);
            match string_record.deserialize::<NewsRecord>(Some(&headers)) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(row = idx + 1, error = %e, "Skipping unparseable row");
                }
            }
        }

        Ok(records)
    }
}

impl ToSheetRows for [NewsRecord] {
    fn to_sheet_rows(&self) -> crate::error::Result<Vec<Vec<String>>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(vec![]);

        // Serialize all records, or a dummy if empty to get headers
        // https://github.com/BurntSushi/rust-csv/issues/161
        if self.is_empty() {
            let dummy = NewsRecord {
                title: String::new(),
                url: String::new(),
                date: String::new(),
                content: String::new(),
                source: String::new(),
            };
            writer
                .serialize(&dummy)
                .map_err(|e| AppError::Data(format!("Failed to serialize: {}", e)))?;
        } else {
            for record in self {
                writer
                    .serialize(record)
                    .map_err(|e| AppError::Data(format!("Failed to serialize: {}", e)))?;
            }
        }

        let data = String::from_utf8(
            writer
                .into_inner()
                .map_err(|e| AppError::Data(format!("Failed to get CSV data: {}", e)))?,
        )
        .map_err(|e| AppError::Data(format!("Invalid UTF-8: {}", e)))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true) // Separates headers from data
            .from_reader(data.as_bytes());

        let mut rows = Vec::new();

        // Add headers
        let headers = reader
            .headers()
            .map_err(|e| AppError::Data(format!("Failed to read headers: {}", e)))?;
        rows.push(headers.iter().map(|s| s.to_string()).collect());

        // Add data rows only if we had real data
        if !self.is_empty() {
            for result in reader.records() {
                let record = result
                    .map_err(|e| AppError::Data(format!("Failed to read CSV record: {}", e)))?;
                rows.push(record.iter().map(|s| s.to_string()).collect());
            }
        }

        Ok(rows)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_helpers::mock_record;

    fn header_row() -> Vec<String> {
        ["Title", "URL", "Date", "Content", "Source"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_to_sheet_rows_with_data() {
        let records = vec![mock_record("a1", "reuters")];
        let rows = records.as_slice().to_sheet_rows().unwrap();
        let expected = vec![
            vec!["Title", "URL", "Date", "Content", "Source"],
            vec![
                "Article a1",
                "https://example.com/a1",
                "2024-01-01",
                "Content for article a1",
                "reuters",
            ],
        ];
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_to_sheet_rows_empty() {
        let records: Vec<NewsRecord> = vec![];
        let rows = records.as_slice().to_sheet_rows().unwrap();
        assert_eq!(rows, vec![header_row()]);
    }

    #[test]
    fn test_round_trip() {
        let records = vec![mock_record("a1", "reuters"), mock_record("a2", "bbc")];
        let rows = records.as_slice().to_sheet_rows().unwrap();
        let parsed = NewsRecord::from_sheet_rows(&rows).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_from_sheet_rows_pads_short_rows() {
        let rows = vec![
            header_row(),
            vec!["Headline".to_string(), "https://example.com/x".to_string()],
        ];

        let records = NewsRecord::from_sheet_rows(&rows).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Headline");
        assert_eq!(records[0].content, "");
        assert_eq!(records[0].source, "");
    }

    #[test]
    fn test_from_sheet_rows_skips_malformed_rows() {
        let mut wide_row: Vec<String> = header_row();
        wide_row.push("extra column".to_string());

        let rows = vec![
            header_row(),
            wide_row,
            vec![
                "Good".to_string(),
                "https://example.com/good".to_string(),
                "2024-01-02".to_string(),
                "body".to_string(),
                "bbc".to_string(),
            ],
        ];

        let records = NewsRecord::from_sheet_rows(&rows).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Good");
    }

    #[test]
    fn test_from_sheet_rows_empty() {
        let records = NewsRecord::from_sheet_rows(&[]).unwrap();
        assert_eq!(records, vec![]);
    }

    #[test]
    fn test_dedup_key_prefers_url() {
        let record = mock_record("a1", "reuters");
        assert_eq!(
            record.dedup_key(),
            RecordKey::Url {
                url: "https://example.com/a1".to_string(),
                source: "reuters".to_string(),
            }
        );
    }

    #[test]
    fn test_dedup_key_falls_back_to_composite() {
        let record = NewsRecord {
            url: "  ".to_string(),
            ..mock_record("a1", "reuters")
        };
        assert_eq!(
            record.dedup_key(),
            RecordKey::Composite {
                title: "Article a1".to_string(),
                date: "2024-01-01".to_string(),
                source: "reuters".to_string(),
            }
        );
    }

    #[test]
    fn test_dedup_key_trims_whitespace() {
        let a = mock_record("a1", "reuters");
        let b = NewsRecord {
            url: " https://example.com/a1 ".to_string(),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
