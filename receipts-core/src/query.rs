//! Read-only derivations over a receipt snapshot.
//!
//! Every function takes a slice and returns fresh data; the input is never
//! touched. `ReceiptQuery` composes the filters in a fixed order
//! (date, category, search text) and then sorts newest first.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use chrono_tz::Tz;
use rust_decimal::Decimal;

use crate::receipt::Receipt;

/// Label used by `total_by_category` for receipts without categories
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Receipts falling on `day` in timezone `tz`
pub fn filter_by_date(snapshot: &[Receipt], day: NaiveDate, tz: &Tz) -> Vec<Receipt> {
    snapshot
        .iter()
        .filter(|r| r.local_date(tz) == day)
        .cloned()
        .collect()
}

/// Receipts whose categories contain `category` exactly (case-sensitive)
pub fn filter_by_category(snapshot: &[Receipt], category: &str) -> Vec<Receipt> {
    snapshot
        .iter()
        .filter(|r| r.categories.iter().any(|c| c == category))
        .cloned()
        .collect()
}

/// Case-insensitive match on merchant, notes or any category.
/// Empty `text` keeps everything.
pub fn filter_by_search_text(snapshot: &[Receipt], text: &str) -> Vec<Receipt> {
    if text.is_empty() {
        return snapshot.to_vec();
    }
    let needle = text.to_lowercase();
    let hit = |s: &str| s.to_lowercase().contains(&needle);

    snapshot
        .iter()
        .filter(|r| {
            hit(r.merchant.as_str())
                || r.notes.as_deref().is_some_and(hit)
                || r.categories.iter().any(|c| hit(c.as_str()))
        })
        .cloned()
        .collect()
}

/// Newest first; equal dates keep their original relative order
pub fn sort_by_date_descending(snapshot: &[Receipt]) -> Vec<Receipt> {
    let mut out = snapshot.to_vec();
    // sort_by is stable
    out.sort_by(|a, b| b.date.cmp(&a.date));
    out
}

pub fn total_amount(snapshot: &[Receipt]) -> Decimal {
    snapshot.iter().map(|r| r.amount).sum()
}

/// Distinct local days, newest first
pub fn distinct_dates(snapshot: &[Receipt], tz: &Tz) -> Vec<NaiveDate> {
    let days: BTreeSet<NaiveDate> = snapshot.iter().map(|r| r.local_date(tz)).collect();
    days.into_iter().rev().collect()
}

/// Distinct category labels in lexicographic order
pub fn distinct_categories(snapshot: &[Receipt]) -> Vec<String> {
    let labels: BTreeSet<&str> = snapshot
        .iter()
        .flat_map(|r| r.categories.iter().map(String::as_str))
        .collect();
    labels.into_iter().map(str::to_string).collect()
}

/// Sum of amounts per primary category, ordered by label
pub fn total_by_category(snapshot: &[Receipt]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for r in snapshot {
        let key = r.primary_category().unwrap_or(UNCATEGORIZED);
        *totals.entry(key.to_string()).or_default() += r.amount;
    }
    totals
}

/// Filter set applied as date → category → search text, then sorted.
#[derive(Debug, Clone, Default)]
pub struct ReceiptQuery {
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub search: Option<String>,
    /// Timezone for day matching; UTC when unset
    pub tz: Option<Tz>,
}

impl ReceiptQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matching(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn in_timezone(mut self, tz: Tz) -> Self {
        self.tz = Some(tz);
        self
    }

    pub fn apply(&self, snapshot: &[Receipt]) -> Vec<Receipt> {
        let tz = self.tz.unwrap_or(Tz::UTC);
        let mut out = snapshot.to_vec();

        if let Some(day) = self.date {
            out = filter_by_date(&out, day, &tz);
        }
        if let Some(category) = &self.category {
            out = filter_by_category(&out, category);
        }
        if let Some(text) = &self.search {
            out = filter_by_search_text(&out, text);
        }

        sort_by_date_descending(&out)
    }
}
