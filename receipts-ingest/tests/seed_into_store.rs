use chrono::{TimeZone, Utc};
use receipts_core::{
    Decimal, MemoryStore, ReceiptStore, StoreConfig, distinct_categories, filter_by_category,
    total_amount,
};
use receipts_ingest::BundleLoader;
use std::path::PathBuf;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// The bundled fixture decodes through the fallback candidate list.
#[test]
fn test_load_fixture_via_fallback() {
    let loader = BundleLoader::new([fixtures().join("does-not-exist.json")])
        .with_candidate(fixtures().join("receipts_bundle.json"));
    let bundle = loader.load().expect("fixture should decode");

    assert_eq!(bundle.source, fixtures().join("receipts_bundle.json"));
    assert_eq!(bundle.receipts.len(), 3);

    let fuel = &bundle.receipts[2];
    assert_eq!(fuel.company.name, "Gasolinera Norte");
    assert_eq!(fuel.totals.paid_card + fuel.totals.paid_cash, fuel.totals.total);
    assert_eq!(fuel.items[0].quantity, Decimal::new(325, 1));
}

/// Seed data converted into receipts and imported into a store.
#[test]
fn test_seed_store_from_fixture() {
    let tickets = BundleLoader::new([fixtures().join("receipts_bundle.json")]).load_or_empty();
    let date = Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap();

    let mut store = ReceiptStore::open(MemoryStore::new(), StoreConfig::default());
    let report = store
        .add_all(tickets.iter().map(|t| t.to_receipt(date)))
        .unwrap();
    assert_eq!(report.affected, 3);
    assert!(report.is_persisted());

    let snapshot = store.snapshot();
    assert_eq!(total_amount(&snapshot), Decimal::new(6120, 2));
    assert_eq!(
        distinct_categories(&snapshot),
        ["IVA 10%", "IVA 21%", "IVA 4%"]
    );
    assert_eq!(filter_by_category(&snapshot, "IVA 4%").len(), 2);
    assert_eq!(
        snapshot[1].notes.as_deref(),
        Some("1 x Ibuprofeno 400mg")
    );
}
