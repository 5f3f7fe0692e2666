use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{Result, TriageError};

// ---------------------------------------------------------------------------
// LogStore
// ---------------------------------------------------------------------------

/// Narrow query surface the run_query executor depends on. Lookups are exact
/// matches on a single dimension; a value no record carries simply returns
/// nothing.
pub trait LogStore: Send + Sync {
    fn by_ip(&self, ip: &str) -> Result<Vec<Value>>;
    fn by_user(&self, user: &str) -> Result<Vec<Value>>;
}

// ---------------------------------------------------------------------------
// SampleLogStore
// ---------------------------------------------------------------------------

/// JSON-file-backed log store: the file is read once on first query and the
/// parsed entries are cached in the service object for the process lifetime.
pub struct SampleLogStore {
    path: PathBuf,
    cache: Mutex<Option<Arc<Vec<Value>>>>,
}

impl SampleLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    fn entries(&self) -> Result<Arc<Vec<Value>>> {
        let mut cache = self.cache.lock().expect("log cache poisoned");
        if let Some(entries) = cache.as_ref() {
            return Ok(entries.clone());
        }

        let data = std::fs::read(&self.path).map_err(|e| {
            TriageError::LogStore(format!("log store not found: {}: {e}", self.path.display()))
        })?;
        let parsed: Value = serde_json::from_slice(&data)
            .map_err(|e| TriageError::LogStore(format!("invalid log store: {e}")))?;
        let entries = match parsed {
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|i| !i.is_object()) {
                    return Err(TriageError::LogStore(format!(
                        "log entry is not an object: {bad}"
                    )));
                }
                items
            }
            _ => {
                return Err(TriageError::LogStore(
                    "log store must be a JSON array of objects".to_string(),
                ))
            }
        };

        let entries = Arc::new(entries);
        *cache = Some(entries.clone());
        Ok(entries)
    }

    fn filter_eq(&self, field: &str, value: &str) -> Result<Vec<Value>> {
        let entries = self.entries()?;
        Ok(entries
            .iter()
            .filter(|entry| {
                entry
                    .get(field)
                    .map(|v| match v {
                        Value::String(s) => s == value,
                        other => other.to_string() == value,
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

impl LogStore for SampleLogStore {
    fn by_ip(&self, ip: &str) -> Result<Vec<Value>> {
        self.filter_eq("ip", ip)
    }

    fn by_user(&self, user: &str) -> Result<Vec<Value>> {
        self.filter_eq("user", user)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_store(contents: &str) -> (TempDir, SampleLogStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample_logs.json");
        std::fs::write(&path, contents).unwrap();
        (dir, SampleLogStore::new(path))
    }

    #[test]
    fn by_ip_returns_matching_entries() {
        let (_dir, store) = sample_store(
            r#"[
                {"ip": "10.0.0.5", "user": "alice", "event": "login"},
                {"ip": "10.0.0.9", "user": "bob", "event": "login"},
                {"ip": "10.0.0.5", "user": "alice", "event": "logout"}
            ]"#,
        );
        let hits = store.by_ip("10.0.0.5").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h["ip"] == "10.0.0.5"));
    }

    #[test]
    fn by_user_unmatched_returns_empty() {
        let (_dir, store) = sample_store(r#"[{"ip": "10.0.0.5", "user": "alice"}]"#);
        assert!(store.by_user("mallory").unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = SampleLogStore::new(dir.path().join("absent.json"));
        assert!(matches!(
            store.by_ip("10.0.0.5").unwrap_err(),
            TriageError::LogStore(_)
        ));
    }

    #[test]
    fn non_array_store_is_an_error() {
        let (_dir, store) = sample_store(r#"{"not": "a list"}"#);
        assert!(store.by_user("alice").is_err());
    }

    #[test]
    fn file_is_read_once_and_cached() {
        let (dir, store) = sample_store(r#"[{"user": "alice"}]"#);
        assert_eq!(store.by_user("alice").unwrap().len(), 1);
        // Remove the backing file; the cached entries keep serving.
        std::fs::remove_file(dir.path().join("sample_logs.json")).unwrap();
        assert_eq!(store.by_user("alice").unwrap().len(), 1);
    }
}
