use crate::request::{NOT_SENT, TrackingKey, TrackingRequest};
use indexmap::IndexMap;
use indexmap::map::Entry;
use parking_lot::Mutex;

/// Tracking attempts made during the lifetime of this store, keyed by their
/// deduplication key. Entries are never evicted.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Mutex<IndexMap<TrackingKey, TrackingRequest>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `request` unless its key is already known. Returns `true` if
    /// the caller now owns the delivery attempt for this key.
    pub fn insert_if_absent(&self, request: &TrackingRequest) -> bool {
        let mut entries = self.entries.lock();
        match entries.entry(request.tracking_key().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                true
            }
        }
    }

    /// Stores the response status for `key`. A status is only recorded once;
    /// returns `false` if the key is unknown or already has a status.
    pub fn record_status(&self, key: &TrackingKey, status: u16) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(request) if request.request_status() == NOT_SENT => {
                request.set_request_status(status);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &TrackingKey) -> Option<TrackingRequest> {
        self.entries.lock().get(key).cloned()
    }

    /// Copy of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<TrackingRequest> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::request_for;
    use std::sync::Arc;

    #[test]
    fn insert_is_idempotent_per_key() {
        let store = HistoryStore::new();
        let request = request_for("app1", "1.0", "sp1");

        assert!(store.insert_if_absent(&request));
        assert!(!store.insert_if_absent(&request));
        assert!(!store.insert_if_absent(&request_for("app1", "1.0", "sp1")));
        assert_eq!(store.len(), 1);

        assert!(store.insert_if_absent(&request_for("app1", "2.0", "sp1")));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn status_is_recorded_once() {
        let store = HistoryStore::new();
        let request = request_for("app1", "1.0", "sp1");
        let key = request.tracking_key().clone();
        store.insert_if_absent(&request);

        assert_eq!(store.get(&key).unwrap().request_status(), NOT_SENT);
        assert!(store.record_status(&key, 201));
        assert!(!store.record_status(&key, 500));
        assert_eq!(store.get(&key).unwrap().request_status(), 201);

        let unknown = request_for("other", "1.0", "sp1");
        assert!(!store.record_status(unknown.tracking_key(), 200));
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let store = HistoryStore::new();
        assert!(store.is_empty());

        for version in ["3", "1", "2"] {
            store.insert_if_absent(&request_for("app", version, "space"));
        }

        let versions: Vec<_> = store
            .snapshot()
            .iter()
            .map(|r| r.application_version().to_string())
            .collect();
        assert_eq!(versions, vec!["3", "1", "2"]);
    }

    #[test]
    fn concurrent_inserts_admit_one_owner() {
        let store = Arc::new(HistoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.insert_if_absent(&request_for("app1", "1.0", "sp1"))
                })
            })
            .collect();

        let owners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|owned| *owned)
            .count();
        assert_eq!(owners, 1);
        assert_eq!(store.len(), 1);
    }
}
