//! receipts-ingest: bundled seed-data schema and the candidate-path loader.

pub mod loader;
pub mod types;

pub use loader::{BundleError, BundleLoader, LoadedBundle};
pub use types::{BundledReceipt, Company, LineItem, Totals, decode_bundle};
