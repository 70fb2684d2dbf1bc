//! Key-value configuration storage.
//!
//! The controller talks to exactly one [`ConfigStore`], picked at startup.
//! [`FileConfigStore`] keeps a JSON document on disk; [`MemoryConfigStore`]
//! is used by tests and can be told to fail.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::errors::TubePaceError;
use crate::settings::{Settings, SETTINGS_KEY};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read `key`, or `default` when nothing is stored under it.
    async fn get(&self, key: &str, default: Value) -> Result<Value, TubePaceError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), TubePaceError>;
}

/// JSON document on disk holding one entry per key.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `--config` when given, else `<config dir>/tubepace/settings.json`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, TubePaceError> {
        match explicit {
            Some(path) => Ok(Self::new(path)),
            None => Self::default_path().map(Self::new),
        }
    }

    pub fn default_path() -> Result<PathBuf, TubePaceError> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| TubePaceError::storage("no configuration directory on this platform"))?;
        path.push("tubepace");
        path.push("settings.json");
        Ok(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, TubePaceError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(TubePaceError::storage(format!(
                    "read {}: {err}",
                    self.path.display()
                )))
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) | Err(_) => {
                // An unreadable document is treated as empty; the next write replaces it.
                warn!(
                    target: "tubepace",
                    path = %self.path.display(),
                    "configuration file is not a JSON object, ignoring its contents"
                );
                Ok(Map::new())
            }
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn get(&self, key: &str, default: Value) -> Result<Value, TubePaceError> {
        let document = self.read_document().await?;
        Ok(document.get(key).cloned().unwrap_or(default))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TubePaceError> {
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| {
                    TubePaceError::storage(format!("create {}: {err}", parent.display()))
                })?;
            }
        }

        let rendered = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|err| TubePaceError::storage(err.to_string()))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, rendered)
            .await
            .map_err(|err| TubePaceError::storage(format!("write {}: {err}", staging.display())))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|err| TubePaceError::storage(format!("replace {}: {err}", self.path.display())))?;
        debug!(target: "tubepace", key, path = %self.path.display(), "configuration saved");
        Ok(())
    }
}

/// In-process store with failure injection.
#[derive(Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        let store = Self::default();
        store.values.lock().insert(key.to_string(), value);
        store
    }

    pub fn fail_reads(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::Relaxed);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str, default: Value) -> Result<Value, TubePaceError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(TubePaceError::storage("injected read failure"));
        }
        Ok(self.values.lock().get(key).cloned().unwrap_or(default))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TubePaceError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(TubePaceError::storage("injected write failure"));
        }
        self.values.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Load settings, writing back a corrected record when needed.
///
/// A failed read degrades to defaults; a failed write-back is only logged.
pub async fn load_settings(store: &dyn ConfigStore) -> Settings {
    let defaults = Settings::default();
    let stored = match store.get(SETTINGS_KEY, defaults.to_value()).await {
        Ok(value) => value,
        Err(err) => {
            warn!(target: "tubepace", %err, "settings unavailable, using defaults");
            return defaults;
        }
    };

    let (settings, corrected) = Settings::from_stored(&stored);
    if corrected {
        info!(
            target: "tubepace",
            rate = %settings.target_rate,
            "stored settings were incomplete or invalid, writing corrected record"
        );
        if let Err(err) = store.set(SETTINGS_KEY, settings.to_value()).await {
            warn!(target: "tubepace", %err, "could not write corrected settings");
        }
    }
    settings
}

pub async fn save_settings(store: &dyn ConfigStore, settings: &Settings) -> Result<(), TubePaceError> {
    store.set(SETTINGS_KEY, settings.to_value()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_round_trips_and_keeps_other_keys() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested/settings.json"));

        assert_eq!(store.get("missing", json!(7)).await.unwrap(), json!(7));
        store.set("a", json!({"x": 1})).await.unwrap();
        store.set("b", json!(true)).await.unwrap();

        assert_eq!(store.get("a", Value::Null).await.unwrap(), json!({"x": 1}));
        assert_eq!(store.get("b", Value::Null).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn unreadable_document_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileConfigStore::new(&path);

        assert_eq!(store.get(SETTINGS_KEY, json!(null)).await.unwrap(), json!(null));
        store.set(SETTINGS_KEY, json!(1)).await.unwrap();
        assert_eq!(store.get(SETTINGS_KEY, json!(null)).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn corrupt_record_is_corrected_and_written_back() {
        let store = MemoryConfigStore::with_value(SETTINGS_KEY, json!({"target_rate": 9.0}));
        let settings = load_settings(&store).await;

        assert_eq!(settings, Settings::default());
        assert_eq!(store.writes(), 1);
        assert_eq!(store.value(SETTINGS_KEY), Some(Settings::default().to_value()));
    }

    #[tokio::test]
    async fn clean_record_is_not_rewritten() {
        let stored = Settings::default().to_value();
        let store = MemoryConfigStore::with_value(SETTINGS_KEY, stored);
        load_settings(&store).await;
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn integer_rate_is_not_rewritten() {
        let store = MemoryConfigStore::with_value(
            SETTINGS_KEY,
            json!({
                "target_rate": 2,
                "categories": {"live": true, "premiere": false, "shorts": true, "music": false},
                "debug_enabled": false,
            }),
        );
        let settings = load_settings(&store).await;
        assert_eq!(settings.target_rate.value(), 2.0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn read_failure_degrades_to_defaults() {
        let store = MemoryConfigStore::with_value(SETTINGS_KEY, json!({"target_rate": 2.0}));
        store.fail_reads(true);
        assert_eq!(load_settings(&store).await, Settings::default());
        assert_eq!(store.writes(), 0);
    }
}
