//! Encrypted key store and confirmation preferences.
//!
//! Records hold ciphertext only; nothing here can decrypt without a PRF
//! output from a live ceremony. `put` is write-then-read-back: a record is
//! not considered stored until the backend returns it unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{OrchestratorError, Result};
use crate::types::ConfirmationConfig;

/// One account-device key record at rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyRecord {
    pub near_account_id: String,
    pub device_number: u32,
    /// Base64url ChaCha20-Poly1305 ciphertext of the private key string.
    pub encrypted_data: String,
    /// Base64url 12-byte nonce.
    pub iv: String,
    /// Milliseconds since epoch at write time.
    pub timestamp: u64,
}

/// Whole-record key/value persistence. Writes replace the full value for a
/// key; a failed write must leave the prior value readable.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn write(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStoreBackend {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStoreBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStoreBackend {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}

/// Single-file JSON backend. The whole map is staged to a temp file and
/// renamed over the target, so an interrupted write leaves the old file.
pub struct JsonFileStoreBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStoreBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileStoreBackend {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<HashMap<String, serde_json::Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let map = serde_json::from_slice(&bytes).map_err(|e| {
                    OrchestratorError::Store(format!(
                        "Corrupt store file {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                Ok(map)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, serde_json::Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| OrchestratorError::Store(format!("Failed to serialize store: {}", e)))?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for JsonFileStoreBackend {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn write(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.keys().cloned().collect())
    }
}

fn record_key(near_account_id: &str, device_number: u32) -> String {
    format!("{}#{}", near_account_id, device_number)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encrypted key records keyed by (account, device number).
#[derive(Clone)]
pub struct EncryptedKeyStore {
    backend: Arc<dyn StoreBackend>,
}

impl EncryptedKeyStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        EncryptedKeyStore { backend }
    }

    /// Build a record with the current timestamp.
    pub fn record(
        near_account_id: &str,
        device_number: u32,
        encrypted_data: &str,
        iv: &str,
    ) -> EncryptedKeyRecord {
        EncryptedKeyRecord {
            near_account_id: near_account_id.to_string(),
            device_number,
            encrypted_data: encrypted_data.to_string(),
            iv: iv.to_string(),
            timestamp: now_millis(),
        }
    }

    /// Store a record and read it back; a record that does not read back
    /// field-for-field identical was never stored.
    pub async fn put(&self, record: &EncryptedKeyRecord) -> Result<()> {
        let key = record_key(&record.near_account_id, record.device_number);
        self.backend
            .write(&key, serde_json::to_value(record)?)
            .await?;

        let read_back = self.backend.read(&key).await?.ok_or_else(|| {
            OrchestratorError::Store(format!("Post-write verification read failed for {}", key))
        })?;
        let read_back: EncryptedKeyRecord = serde_json::from_value(read_back)
            .map_err(|e| OrchestratorError::Store(format!("Corrupt record for {}: {}", key, e)))?;
        if &read_back != record {
            return Err(OrchestratorError::Store(format!(
                "Post-write verification mismatch for {}",
                key
            )));
        }
        debug!("Stored encrypted key record for {}", key);
        Ok(())
    }

    /// Latest record for the account: the one with the highest device number.
    pub async fn get(&self, near_account_id: &str) -> Result<Option<EncryptedKeyRecord>> {
        let prefix = format!("{}#", near_account_id);
        let mut latest: Option<EncryptedKeyRecord> = None;
        for key in self.backend.keys().await? {
            if !key.starts_with(&prefix) {
                continue;
            }
            let Some(value) = self.backend.read(&key).await? else {
                continue;
            };
            let record: EncryptedKeyRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping corrupt key record {}: {}", key, e);
                    continue;
                }
            };
            let newer = latest
                .as_ref()
                .map(|current| record.device_number > current.device_number)
                .unwrap_or(true);
            if newer {
                latest = Some(record);
            }
        }
        Ok(latest)
    }

    pub async fn get_device(
        &self,
        near_account_id: &str,
        device_number: u32,
    ) -> Result<Option<EncryptedKeyRecord>> {
        let key = record_key(near_account_id, device_number);
        match self.backend.read(&key).await? {
            Some(value) => {
                let record = serde_json::from_value(value).map_err(|e| {
                    OrchestratorError::Store(format!("Corrupt record for {}: {}", key, e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Remove every device record for the account. Idempotent.
    pub async fn delete(&self, near_account_id: &str) -> Result<()> {
        let prefix = format!("{}#", near_account_id);
        for key in self.backend.keys().await? {
            if key.starts_with(&prefix) {
                self.backend.remove(&key).await?;
            }
        }
        Ok(())
    }

    /// True iff `get` would return a record.
    pub async fn verify(&self, near_account_id: &str) -> Result<bool> {
        Ok(self.get(near_account_id).await?.is_some())
    }
}

/// Per-account confirmation configuration, plain read-then-write.
#[derive(Clone)]
pub struct ConfirmationPreferences {
    backend: Arc<dyn StoreBackend>,
}

impl ConfirmationPreferences {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        ConfirmationPreferences { backend }
    }

    pub async fn get_confirmation_config(
        &self,
        near_account_id: &str,
    ) -> Result<Option<ConfirmationConfig>> {
        match self.backend.read(near_account_id).await? {
            Some(value) => {
                let config = serde_json::from_value(value).map_err(|e| {
                    OrchestratorError::Store(format!(
                        "Corrupt confirmation config for {}: {}",
                        near_account_id, e
                    ))
                })?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    pub async fn set_confirmation_config(
        &self,
        near_account_id: &str,
        config: &ConfirmationConfig,
    ) -> Result<()> {
        self.backend
            .write(near_account_id, serde_json::to_value(config)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfirmationBehavior, ConfirmationUIMode};

    fn sample_record(account: &str, device: u32) -> EncryptedKeyRecord {
        EncryptedKeyStore::record(account, device, "Y2lwaGVydGV4dA", "bm9uY2UxMjM0NTY")
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        let record = sample_record("alice.testnet", 0);
        store.put(&record).await.unwrap();

        let fetched = store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert!(store.verify("alice.testnet").await.unwrap());
    }

    #[tokio::test]
    async fn get_returns_highest_device_number() {
        let store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        store.put(&sample_record("alice.testnet", 0)).await.unwrap();
        store.put(&sample_record("alice.testnet", 2)).await.unwrap();
        store.put(&sample_record("alice.testnet", 1)).await.unwrap();

        let fetched = store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(fetched.device_number, 2);

        let device0 = store
            .get_device("alice.testnet", 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device0.device_number, 0);
    }

    #[tokio::test]
    async fn delete_removes_all_devices_and_is_idempotent() {
        let store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        store.put(&sample_record("alice.testnet", 0)).await.unwrap();
        store.put(&sample_record("alice.testnet", 1)).await.unwrap();
        store.put(&sample_record("bob.testnet", 0)).await.unwrap();

        store.delete("alice.testnet").await.unwrap();
        assert!(store.get("alice.testnet").await.unwrap().is_none());
        assert!(!store.verify("alice.testnet").await.unwrap());
        assert!(store.verify("bob.testnet").await.unwrap());

        // second delete is a no-op
        store.delete("alice.testnet").await.unwrap();
    }

    #[tokio::test]
    async fn account_prefix_does_not_leak_across_accounts() {
        let store = EncryptedKeyStore::new(Arc::new(MemoryStoreBackend::new()));
        store.put(&sample_record("ali", 5)).await.unwrap();
        store.put(&sample_record("alice.testnet", 1)).await.unwrap();

        let fetched = store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(fetched.device_number, 1);
        assert_eq!(fetched.near_account_id, "alice.testnet");
    }

    #[tokio::test]
    async fn file_backend_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        {
            let store = EncryptedKeyStore::new(Arc::new(JsonFileStoreBackend::new(&path)));
            store.put(&sample_record("alice.testnet", 0)).await.unwrap();
        }

        // fresh backend over the same file sees the record
        let store = EncryptedKeyStore::new(Arc::new(JsonFileStoreBackend::new(&path)));
        let fetched = store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(fetched.near_account_id, "alice.testnet");
    }

    /// Backend that accepts the first write and fails the rest, leaving the
    /// stored value untouched.
    struct FirstWriteOnlyBackend {
        inner: MemoryStoreBackend,
        writes: Mutex<u32>,
    }

    #[async_trait]
    impl StoreBackend for FirstWriteOnlyBackend {
        async fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, value: serde_json::Value) -> Result<()> {
            let mut writes = self.writes.lock().await;
            if *writes >= 1 {
                return Err(OrchestratorError::Store("write interrupted".to_string()));
            }
            *writes += 1;
            self.inner.write(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }

        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }
    }

    #[tokio::test]
    async fn interrupted_write_leaves_prior_record() {
        let store = EncryptedKeyStore::new(Arc::new(FirstWriteOnlyBackend {
            inner: MemoryStoreBackend::new(),
            writes: Mutex::new(0),
        }));
        let original = sample_record("alice.testnet", 0);
        store.put(&original).await.unwrap();

        let replacement = EncryptedKeyRecord {
            encrypted_data: "bmV3LWNpcGhlcnRleHQ".to_string(),
            ..original.clone()
        };
        let err = store.put(&replacement).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Store(_)));

        let fetched = store.get("alice.testnet").await.unwrap().unwrap();
        assert_eq!(fetched, original, "failed put must not destroy the old record");
    }

    #[tokio::test]
    async fn preferences_round_trip() {
        let prefs = ConfirmationPreferences::new(Arc::new(MemoryStoreBackend::new()));
        assert!(prefs
            .get_confirmation_config("alice.testnet")
            .await
            .unwrap()
            .is_none());

        let config = ConfirmationConfig {
            ui_mode: ConfirmationUIMode::Drawer,
            behavior: ConfirmationBehavior::AutoProceedWithDelay,
            auto_proceed_delay: Some(500),
            theme: Some("light".to_string()),
        };
        prefs
            .set_confirmation_config("alice.testnet", &config)
            .await
            .unwrap();

        let stored = prefs
            .get_confirmation_config("alice.testnet")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, config);
    }
}
