//! ReceiptStore: the canonical receipt collection and its persisted mirror.
//!
//! The collection lives in memory in arrival order. After every mutation the
//! whole collection is re-encoded and written over one named slot. Storage
//! and codec failures never abort an operation:
//! - load failures start the store empty and are kept in `last_load()`
//! - persist failures keep the in-memory change and come back as
//!   `Durability::Failed` in the `MutationReport`
//!
//! Single writer: every mutation goes through `&mut self`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, StorageError, StoreError};
use crate::events::{ChangeFeed, StoreEvent};
use crate::receipt::{Receipt, decode_receipts, encode_receipts};
use crate::storage::KeyValueStore;

pub const DEFAULT_SLOT: &str = "receipts";

/// What `add` does when the identifier is already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Append anyway and log a warning; later update/delete hit the first match
    #[default]
    Allow,
    /// Refuse with `StoreError::DuplicateId`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key of the persisted slot
    pub slot: String,
    pub duplicate_ids: DuplicatePolicy,
    /// Buffered change events per subscriber
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            slot: DEFAULT_SLOT.to_string(),
            duplicate_ids: DuplicatePolicy::Allow,
            event_capacity: 64,
        }
    }
}

/// Outcome of the most recent load
#[derive(Debug)]
pub enum LoadReport {
    Loaded(usize),
    /// Slot absent
    Empty,
    /// Slot present but undecodable; the store started empty
    Corrupt(DecodeError),
    /// Slot could not be read; the store started empty
    Unavailable(StorageError),
}

impl LoadReport {
    pub fn is_degraded(&self) -> bool {
        matches!(self, LoadReport::Corrupt(_) | LoadReport::Unavailable(_))
    }
}

/// Whether a mutation reached the persisted slot
#[derive(Debug)]
pub enum Durability {
    Persisted,
    /// Nothing changed, nothing written
    Skipped,
    /// Memory changed, the slot still holds the previous blob
    Failed(StoreError),
}

#[derive(Debug)]
pub struct MutationReport {
    /// Records added, replaced or removed
    pub affected: usize,
    pub durability: Durability,
}

impl MutationReport {
    fn unchanged() -> Self {
        Self {
            affected: 0,
            durability: Durability::Skipped,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.durability, Durability::Persisted)
    }
}

pub struct ReceiptStore<S: KeyValueStore> {
    storage: S,
    config: StoreConfig,
    receipts: Vec<Receipt>,
    last_load: LoadReport,
    feed: ChangeFeed,
}

impl<S: KeyValueStore> ReceiptStore<S> {
    /// Build the store and load whatever the slot holds.
    pub fn open(storage: S, config: StoreConfig) -> Self {
        let feed = ChangeFeed::new(config.event_capacity);
        let mut store = Self {
            storage,
            config,
            receipts: Vec::new(),
            last_load: LoadReport::Empty,
            feed,
        };
        store.reload();
        store
    }

    /// Re-read the slot, replacing the in-memory collection.
    pub fn reload(&mut self) -> &LoadReport {
        let slot = self.config.slot.as_str();
        let (receipts, report) = match self.storage.get(slot) {
            Ok(None) => {
                debug!(slot, "no persisted receipts");
                (Vec::new(), LoadReport::Empty)
            }
            Ok(Some(bytes)) => match decode_receipts(&bytes) {
                Ok(receipts) => {
                    debug!(slot, count = receipts.len(), "receipts loaded");
                    let n = receipts.len();
                    (receipts, LoadReport::Loaded(n))
                }
                Err(e) => {
                    warn!(slot, error = %e, "persisted receipts are undecodable; starting empty");
                    (Vec::new(), LoadReport::Corrupt(e))
                }
            },
            Err(e) => {
                warn!(slot, error = %e, "persisted receipts unreadable; starting empty");
                (Vec::new(), LoadReport::Unavailable(e))
            }
        };

        self.receipts = receipts;
        self.last_load = report;
        self.feed.publish(StoreEvent::Loaded {
            count: self.receipts.len(),
        });
        &self.last_load
    }

    pub fn last_load(&self) -> &LoadReport {
        &self.last_load
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Owned copy for derivations that must not observe later mutations
    pub fn snapshot(&self) -> Vec<Receipt> {
        self.receipts.clone()
    }

    /// First receipt with this identifier
    pub fn get(&self, id: &str) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// Append a receipt and persist.
    ///
    /// Only `DuplicatePolicy::Reject` can make this fail; storage failures are
    /// reported through the returned `Durability`.
    pub fn add(&mut self, receipt: Receipt) -> Result<MutationReport, StoreError> {
        self.check_duplicate(&receipt.id)?;

        let id = receipt.id.clone();
        self.receipts.push(receipt);
        let durability = self.persist();
        self.feed.publish(StoreEvent::Added { id });

        Ok(MutationReport {
            affected: 1,
            durability,
        })
    }

    /// Append a batch in order with a single persist. With
    /// `DuplicatePolicy::Reject` the whole batch is refused if any identifier
    /// collides with the store or with an earlier batch entry.
    pub fn add_all(
        &mut self,
        receipts: impl IntoIterator<Item = Receipt>,
    ) -> Result<MutationReport, StoreError> {
        let batch: Vec<Receipt> = receipts.into_iter().collect();
        if batch.is_empty() {
            return Ok(MutationReport::unchanged());
        }

        for (i, r) in batch.iter().enumerate() {
            let earlier = batch[..i].iter().any(|o| o.id == r.id);
            if earlier {
                self.on_duplicate(&r.id)?;
            } else {
                self.check_duplicate(&r.id)?;
            }
        }

        let count = batch.len();
        self.receipts.extend(batch);
        let durability = self.persist();
        info!(count, total = self.receipts.len(), "receipts imported");
        self.feed.publish(StoreEvent::Imported { count });

        Ok(MutationReport {
            affected: count,
            durability,
        })
    }

    /// Replace the first receipt sharing `receipt.id`, keeping its position.
    /// An unknown identifier is a no-op: nothing is written.
    pub fn update(&mut self, receipt: Receipt) -> MutationReport {
        let Some(slot) = self.receipts.iter_mut().find(|r| r.id == receipt.id) else {
            debug!(id = %receipt.id, "update ignored; identifier not in store");
            return MutationReport::unchanged();
        };

        let id = receipt.id.clone();
        *slot = receipt;
        let durability = self.persist();
        self.feed.publish(StoreEvent::Updated { id });

        MutationReport {
            affected: 1,
            durability,
        }
    }

    /// Remove every receipt sharing `receipt.id`.
    pub fn delete(&mut self, receipt: &Receipt) -> MutationReport {
        self.delete_id(&receipt.id)
    }

    /// Remove every receipt with this identifier, then persist (even when
    /// nothing matched).
    pub fn delete_id(&mut self, id: &str) -> MutationReport {
        let before = self.receipts.len();
        self.receipts.retain(|r| r.id != id);
        let removed = before - self.receipts.len();

        let durability = self.persist();
        self.feed.publish(StoreEvent::Deleted {
            id: id.to_string(),
            removed,
        });

        MutationReport {
            affected: removed,
            durability,
        }
    }

    pub fn clear(&mut self) -> MutationReport {
        let removed = self.receipts.len();
        self.receipts.clear();
        let durability = self.persist();
        self.feed.publish(StoreEvent::Cleared { removed });

        MutationReport {
            affected: removed,
            durability,
        }
    }

    fn check_duplicate(&self, id: &str) -> Result<(), StoreError> {
        if self.contains(id) {
            self.on_duplicate(id)?;
        }
        Ok(())
    }

    fn on_duplicate(&self, id: &str) -> Result<(), StoreError> {
        match self.config.duplicate_ids {
            DuplicatePolicy::Reject => Err(StoreError::DuplicateId { id: id.to_string() }),
            DuplicatePolicy::Allow => {
                warn!(id, "adding a receipt whose identifier is already present");
                Ok(())
            }
        }
    }

    /// Overwrite the slot with the full collection.
    fn persist(&mut self) -> Durability {
        match self.write_slot() {
            Ok(bytes) => {
                debug!(slot = %self.config.slot, count = self.receipts.len(), bytes, "receipts persisted");
                Durability::Persisted
            }
            Err(e) => {
                warn!(slot = %self.config.slot, error = %e, "persisting receipts failed; change kept in memory only");
                self.feed.publish(StoreEvent::PersistFailed {
                    reason: e.to_string(),
                });
                Durability::Failed(e)
            }
        }
    }

    fn write_slot(&mut self) -> Result<usize, StoreError> {
        let blob = encode_receipts(&self.receipts)?;
        self.storage.set(&self.config.slot, &blob)?;
        Ok(blob.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::broadcast::error::TryRecvError;

    fn receipt(id: &str, merchant: &str) -> Receipt {
        Receipt::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
            merchant,
            Decimal::new(1000, 2),
        )
        .with_id(id)
    }

    fn ids<S: KeyValueStore>(store: &ReceiptStore<S>) -> Vec<&str> {
        store.receipts().iter().map(|r| r.id.as_str()).collect()
    }

    fn empty_store() -> ReceiptStore<MemoryStore> {
        ReceiptStore::open(MemoryStore::new(), StoreConfig::default())
    }

    #[test]
    fn test_open_on_empty_slot() {
        let store = empty_store();
        assert!(store.is_empty());
        assert!(matches!(store.last_load(), LoadReport::Empty));
    }

    #[test]
    fn test_add_keeps_arrival_order_and_persists() {
        let mut store = empty_store();
        assert!(store.add(receipt("r1", "Bakery")).unwrap().is_persisted());
        assert!(store.add(receipt("r2", "Pharmacy")).unwrap().is_persisted());
        assert_eq!(ids(&store), ["r1", "r2"]);

        let reopened = ReceiptStore::open(store.into_storage(), StoreConfig::default());
        assert!(matches!(reopened.last_load(), LoadReport::Loaded(2)));
        assert_eq!(ids(&reopened), ["r1", "r2"]);
    }

    #[test]
    fn test_duplicate_ids_allowed_by_default() {
        let mut store = empty_store();
        store.add(receipt("dup", "First")).unwrap();
        store.add(receipt("dup", "Second")).unwrap();
        assert_eq!(store.len(), 2);

        // first match wins on update
        let report = store.update(receipt("dup", "Edited"));
        assert_eq!(report.affected, 1);
        assert_eq!(store.receipts()[0].merchant, "Edited");
        assert_eq!(store.receipts()[1].merchant, "Second");

        // delete removes every match
        let report = store.delete_id("dup");
        assert_eq!(report.affected, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected_when_configured() {
        let config = StoreConfig {
            duplicate_ids: DuplicatePolicy::Reject,
            ..StoreConfig::default()
        };
        let mut store = ReceiptStore::open(MemoryStore::new(), config);
        store.add(receipt("a", "One")).unwrap();

        let err = store.add(receipt("a", "Two")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { ref id } if id == "a"));
        assert_eq!(store.len(), 1);

        let err = store
            .add_all([receipt("b", "B"), receipt("b", "B again")])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
        assert_eq!(ids(&store), ["a"]);
    }

    #[test]
    fn test_update_unknown_id_is_silent_noop() {
        let mut store = empty_store();
        store.add(receipt("r1", "Bakery")).unwrap();
        let mut rx = store.subscribe();

        let report = store.update(receipt("missing", "Nobody"));
        assert_eq!(report.affected, 0);
        assert!(matches!(report.durability, Durability::Skipped));
        assert_eq!(ids(&store), ["r1"]);
        assert_eq!(store.receipts()[0].merchant, "Bakery");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut store = empty_store();
        for id in ["a", "b", "c"] {
            store.add(receipt(id, "Shop")).unwrap();
        }
        let edited = receipt("b", "Renamed").with_notes("fixed typo");
        assert!(store.update(edited.clone()).is_persisted());
        assert_eq!(ids(&store), ["a", "b", "c"]);
        assert_eq!(store.get("b"), Some(&edited));
    }

    #[test]
    fn test_delete_keeps_relative_order_of_others() {
        let mut store = empty_store();
        for id in ["a", "x", "b", "x", "c"] {
            store.add(receipt(id, "Shop")).unwrap();
        }
        let report = store.delete(&receipt("x", "whatever"));
        assert_eq!(report.affected, 2);
        assert_eq!(ids(&store), ["a", "b", "c"]);
    }

    #[test]
    fn test_persist_failure_keeps_memory_and_old_blob() {
        let mut store = empty_store();
        store.add(receipt("r1", "Bakery")).unwrap();

        store.storage_mut().set_fail_writes(Some("read-only volume"));
        let mut rx = store.subscribe();
        let report = store.add(receipt("r2", "Pharmacy")).unwrap();

        assert!(matches!(
            report.durability,
            Durability::Failed(StoreError::Storage(StorageError::Rejected { .. }))
        ));
        assert_eq!(ids(&store), ["r1", "r2"]);
        assert!(matches!(rx.try_recv(), Ok(StoreEvent::PersistFailed { .. })));
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Added { id: "r2".into() });

        // what survives a restart is the last good blob
        let mut storage = store.into_storage();
        storage.set_fail_writes(None);
        let reopened = ReceiptStore::open(storage, StoreConfig::default());
        assert_eq!(ids(&reopened), ["r1"]);
    }

    #[test]
    fn test_corrupt_slot_degrades_to_empty() {
        let mut storage = MemoryStore::new();
        storage.set(DEFAULT_SLOT, b"{not json").unwrap();
        let mut store = ReceiptStore::open(storage, StoreConfig::default());

        assert!(store.is_empty());
        assert!(store.last_load().is_degraded());
        assert!(matches!(store.last_load(), LoadReport::Corrupt(_)));

        // the next write replaces the corrupt blob
        store.add(receipt("r1", "Bakery")).unwrap();
        assert!(matches!(store.reload(), LoadReport::Loaded(1)));
    }

    #[test]
    fn test_events_follow_mutations() {
        let mut store = empty_store();
        let mut rx = store.subscribe();

        store.add(receipt("a", "Shop")).unwrap();
        store.update(receipt("a", "Shop 2"));
        store.delete_id("a");
        store.add_all([receipt("b", "B"), receipt("c", "C")]).unwrap();
        store.clear();
        store.reload();

        let got: Vec<StoreEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            got,
            vec![
                StoreEvent::Added { id: "a".into() },
                StoreEvent::Updated { id: "a".into() },
                StoreEvent::Deleted { id: "a".into(), removed: 1 },
                StoreEvent::Imported { count: 2 },
                StoreEvent::Cleared { removed: 2 },
                StoreEvent::Loaded { count: 0 },
            ]
        );
    }

    #[test]
    fn test_custom_slot_name() {
        let config = StoreConfig {
            slot: "receipts-2024".into(),
            ..StoreConfig::default()
        };
        let mut store = ReceiptStore::open(MemoryStore::new(), config);
        store.add(receipt("a", "Shop")).unwrap();
        assert!(store.storage().get("receipts-2024").unwrap().is_some());
        assert!(store.storage().get(DEFAULT_SLOT).unwrap().is_none());
    }
}
