pub mod record;

pub use record::{FromSheetRows, NewsRecord, RecordKey, ToSheetRows};
