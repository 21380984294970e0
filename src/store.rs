//! Fail-soft persistence over a synchronous key-value store.
//!
//! Every other module reaches the store through [`Persistence`]. Read
//! failures turn into "absent", write failures leave the previous value in
//! place; both are logged and never propagated.

use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> AppResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove_item(&self, key: &str) -> AppResult<()>;
}

/// In-process store. `with_quota` caps the total stored bytes (keys plus
/// values) so quota failures can be reproduced.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let used = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum::<usize>();
            if used + key.len() + value.len() > quota {
                return Err(AppError::Storage(format!(
                    "quota exceeded writing {} ({} bytes, quota {})",
                    key,
                    value.len(),
                    quota
                )));
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_text(key)?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "stored value is not valid json; treating as absent");
                None
            }
        }
    }

    pub fn read_json_or<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.read_json(key).unwrap_or(fallback)
    }

    /// Returns `false` when nothing was written; the prior value is untouched.
    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.write_text(key, &raw),
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "failed to serialize value for storage");
                false
            }
        }
    }

    pub fn read_text(&self, key: &str) -> Option<String> {
        match self.store.get_item(key) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "failed to read stored value");
                None
            }
        }
    }

    pub fn write_text(&self, key: &str, value: &str) -> bool {
        match self.store.set_item(key, value) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "failed to write stored value");
                false
            }
        }
    }

    pub fn remove_key(&self, key: &str) {
        if let Err(error) = self.store.remove_item(key) {
            tracing::warn!(key = %key, error = %error, "failed to remove stored value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyValueStore, MemoryStore, Persistence};
    use crate::blocks::storage_key;
    use crate::models::BlockKind;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn payloads_read_back_deeply_equal() {
        let persistence = Persistence::in_memory();
        let payloads = [
            (
                BlockKind::Sequence,
                json!({ "name": "GFP", "sequence": "MSKGEELFTG", "savedAt": "2024-05-01T10:00:00Z" }),
            ),
            (
                BlockKind::Table,
                json!({ "columns": ["Condition", "Viability (%)"], "rows": [{ "Condition": "ΔF508", "Viability (%)": "37.2" }] }),
            ),
            (
                BlockKind::Protocol,
                json!({ "title": "Ussing", "description": "", "steps": ["Equilibrate", "Add PKA"], "notes": null }),
            ),
        ];

        for (kind, payload) in payloads {
            let key = storage_key(kind, "b1");
            assert!(persistence.write_json(&key, &payload));
            assert_eq!(persistence.read_json::<serde_json::Value>(&key), Some(payload));
        }
    }

    #[test]
    fn corrupt_json_reads_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set_item("table-block-T1", "{not json").expect("set");
        let persistence = Persistence::new(store);

        assert_eq!(persistence.read_json::<serde_json::Value>("table-block-T1"), None);
        assert_eq!(persistence.read_json_or("table-block-T1", json!([])), json!([]));
        assert_eq!(persistence.read_json::<serde_json::Value>("missing"), None);
    }

    #[test]
    fn quota_failure_keeps_prior_value() {
        let store = Arc::new(MemoryStore::with_quota(64));
        let persistence = Persistence::new(store.clone());

        assert!(persistence.write_text("labNotebookDocument", "<p>short</p>"));
        let huge = "x".repeat(200);
        assert!(!persistence.write_text("labNotebookDocument", &huge));
        assert_eq!(
            persistence.read_text("labNotebookDocument").as_deref(),
            Some("<p>short</p>")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_key_is_idempotent() {
        let persistence = Persistence::in_memory();
        persistence.write_json("protein-block-p1", &json!({ "pdb": "ATOM" }));
        persistence.remove_key("protein-block-p1");
        persistence.remove_key("protein-block-p1");
        assert!(persistence.read_text("protein-block-p1").is_none());
    }
}
