//! receipts-core: receipt model, persisted store, and query layer

pub mod error;
pub mod events;
pub mod query;
pub mod receipt;
pub mod storage;
pub mod store;
pub mod time;

pub use error::{DecodeError, DecodeKind, StorageError, StoreError};
pub use events::{ChangeFeed, StoreEvent};
pub use query::{
    ReceiptQuery, distinct_categories, distinct_dates, filter_by_category, filter_by_date,
    filter_by_search_text, sort_by_date_descending, total_amount, total_by_category,
};
pub use receipt::{Receipt, decode_receipts, encode_receipts};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{
    DEFAULT_SLOT, DuplicatePolicy, Durability, LoadReport, MutationReport, ReceiptStore,
    StoreConfig,
};
pub use time::{TimeError, parse_day, parse_timestamp, parse_timezone};

pub use chrono_tz::Tz;
pub use rust_decimal::Decimal;
