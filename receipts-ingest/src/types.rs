//! Bundled seed-data schema.
//!
//! This is NOT the persisted `Receipt` format: bundled documents describe a
//! printed ticket (issuing company, line items, payment split, tax lines).
//! They are decoded on their own and only become receipts through
//! `BundledReceipt::to_receipt`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use receipts_core::{DecodeError, Receipt};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Company {
    pub name: String,
    /// Spanish tax id (CIF); some tickets omit it
    #[serde(default)]
    pub cif: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineItem {
    pub name: String,
    /// Units or weight, so not necessarily whole
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Totals {
    pub total: Decimal,
    #[serde(default)]
    pub paid_card: Decimal,
    #[serde(default)]
    pub paid_cash: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BundledReceipt {
    pub company: Company,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub totals: Totals,
    /// Tax label ("IVA 21%") to amount
    #[serde(default)]
    pub taxes: BTreeMap<String, Decimal>,
}

impl BundledReceipt {
    /// Checks the decoder cannot express: non-blank names, non-negative quantities.
    pub fn validate(&self) -> Result<(), String> {
        if self.company.name.trim().is_empty() {
            return Err("company.name is blank".to_string());
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(format!("items[{i}].name is blank"));
            }
            if item.quantity.is_sign_negative() && !item.quantity.is_zero() {
                return Err(format!("items[{i}].quantity is negative ({})", item.quantity));
            }
        }
        Ok(())
    }

    pub fn tax_total(&self) -> Decimal {
        self.taxes.values().copied().sum()
    }

    /// Build a new store receipt dated `date`.
    ///
    /// merchant = company name, amount = ticket total, categories = tax labels
    /// (sorted), notes = one "qty x name" entry per line item.
    pub fn to_receipt(&self, date: DateTime<Utc>) -> Receipt {
        let mut receipt = Receipt::new(date, self.company.name.trim(), self.totals.total)
            .with_categories(self.taxes.keys().cloned());

        if !self.items.is_empty() {
            let summary = self
                .items
                .iter()
                .map(|it| format!("{} x {}", it.quantity.normalize(), it.name.trim()))
                .collect::<Vec<_>>()
                .join(", ");
            receipt = receipt.with_notes(summary);
        }
        receipt
    }
}

/// Decode a bundled JSON document (an array of tickets) and validate each one.
/// `what` names the source in errors.
pub fn decode_bundle(bytes: &[u8], what: &str) -> Result<Vec<BundledReceipt>, DecodeError> {
    let tickets: Vec<BundledReceipt> =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::from_json(what, &e))?;

    for (i, t) in tickets.iter().enumerate() {
        t.validate()
            .map_err(|msg| DecodeError::invalid(what, format!("ticket #{i}: {msg}")))?;
    }

    Ok(tickets)
}
