use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use range_index::RangeIndexKey;
use serde_json::Value;

/// In-memory ordered key-value stores backing one replica.
///
/// Point values are keyed by the record key text. Range entries are keyed by
/// their composite index key so a byte-ordered scan over `[from, to)` yields
/// every record of one key with its range field inside the interval.
#[derive(Debug, Default)]
pub struct MirrorStore {
    values: RwLock<BTreeMap<String, Value>>,
    ranges: RwLock<BTreeMap<RangeIndexKey, Value>>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn put_range(&self, index: RangeIndexKey, value: Value) {
        self.ranges
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn values(&self) -> Vec<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Entries with `from <= index < to`, in index order.
    pub fn scan(&self, from: &RangeIndexKey, to: &RangeIndexKey) -> Vec<Value> {
        if from >= to {
            return Vec::new();
        }
        self.ranges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range(from.clone()..to.clone())
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(text: &str) -> RangeIndexKey {
        serde_json::from_value(json!(text)).unwrap()
    }

    #[test]
    fn point_values_overwrite() {
        let store = MirrorStore::new();
        store.put("a", json!(1));
        store.put("a", json!(2));
        assert_eq!(store.get("a"), Some(json!(2)));
        assert_eq!(store.get("b"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scan_is_half_open() {
        let store = MirrorStore::new();
        store.put_range(index("1_0000000001"), json!(1));
        store.put_range(index("1_0000000002"), json!(2));
        store.put_range(index("1_0000000003"), json!(3));
        store.put_range(index("10_0000000002"), json!("other key"));

        let values = store.scan(&index("1_0000000001"), &index("1_0000000003"));
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    #[test]
    fn inverted_bounds_scan_nothing() {
        let store = MirrorStore::new();
        store.put_range(index("1_0000000002"), json!(2));
        assert!(store
            .scan(&index("1_0000000003"), &index("1_0000000001"))
            .is_empty());
    }
}
