//! Receipt record and the persisted collection codec

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::time::local_day;

/// A single expense record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    /// Opaque identifier, assigned once at creation
    #[serde(rename = "identifier", alias = "id")]
    pub id: String,
    /// When the expense happened
    #[serde(with = "crate::time::iso_timestamp")]
    pub date: DateTime<Utc>,
    pub merchant: String,
    /// Currency amount; sign is not checked. Written as the exact decimal
    /// number token, never through f64.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    /// Ordered labels, the first one is the primary category
    #[serde(default)]
    pub categories: Vec<String>,
    /// Reference to an attached image; the bytes live elsewhere
    #[serde(
        rename = "imageURL",
        alias = "image_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Receipt {
    /// Create a receipt with a fresh UUID identifier
    pub fn new(date: DateTime<Utc>, merchant: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            merchant: merchant.into(),
            amount,
            categories: Vec::new(),
            image_url: None,
            notes: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_categories<I, C>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// First category, if any
    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    /// Calendar day of the receipt in `tz`
    pub fn local_date(&self, tz: &Tz) -> NaiveDate {
        local_day(self.date, tz)
    }
}

/// Encode the whole collection as the persisted JSON blob.
pub fn encode_receipts(receipts: &[Receipt]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(receipts)
}

/// Decode a persisted blob back into receipts.
///
/// Field names and value formats are checked by the decoder; afterwards every
/// record must carry a non-blank identifier.
pub fn decode_receipts(bytes: &[u8]) -> Result<Vec<Receipt>, DecodeError> {
    let receipts: Vec<Receipt> =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::from_json("receipts", &e))?;

    if let Some(pos) = receipts.iter().position(|r| r.id.trim().is_empty()) {
        return Err(DecodeError::invalid(
            "receipts",
            format!("receipt #{pos} has a blank identifier"),
        ));
    }

    Ok(receipts)
}
