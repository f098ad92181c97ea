//! Durable, checksummed run checkpoints.
//!
//! On disk a checkpoint is an envelope `{version, checksum, payload}` where
//! `checksum` is the hex SHA-256 of the payload text. A checkpoint that fails
//! the checksum or does not parse is treated as absent: the run restarts
//! from scratch rather than resuming from bad state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{CheckpointConfig, EntityKey, FailedTarget, NameCollision};
use crate::storage::StorageBackend;

const ENVELOPE_VERSION: u32 = 1;
const SAVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accumulated results plus resumption state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    pub completed: BTreeMap<EntityKey, T>,
    /// First cursor not yet confirmed complete (paginated harvests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<u64>,
    /// Source references already folded (event harvests)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub processed: BTreeSet<String>,
    /// Id-less name clashes seen so far (listing harvests)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<NameCollision>,
    #[serde(default)]
    pub failed: Vec<FailedTarget>,
    pub saved_at: DateTime<Utc>,
}

impl<T> Checkpoint<T> {
    pub fn new() -> Self {
        Self {
            completed: BTreeMap::new(),
            cursor: None,
            processed: BTreeSet::new(),
            collisions: Vec::new(),
            failed: Vec::new(),
            saved_at: Utc::now(),
        }
    }
}

impl<T> Default for Checkpoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    checksum: String,
    payload: &'a RawValue,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    checksum: String,
    payload: Box<RawValue>,
}

/// Summary used by `info`.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointStatus {
    Missing,
    Corrupt(String),
    Present {
        saved_at: DateTime<Utc>,
        completed: usize,
        cursor: Option<u64>,
        processed: usize,
        failed: usize,
    },
}

fn checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Reads and writes one checkpoint key.
pub struct CheckpointStore {
    backend: Arc<dyn StorageBackend>,
    name: String,
    interval: usize,
    save_attempts: u32,
    since_save: usize,
}

impl CheckpointStore {
    pub fn new(backend: Arc<dyn StorageBackend>, name: impl Into<String>, config: &CheckpointConfig) -> Self {
        Self {
            backend,
            name: name.into(),
            interval: config.interval.max(1),
            save_attempts: config.save_attempts.max(1),
            since_save: 0,
        }
    }

    pub fn key(&self) -> String {
        format!("checkpoints/{}.json", self.name)
    }

    /// Count newly completed items; `true` once a save is due.
    pub fn record_progress(&mut self, completed: usize) -> bool {
        self.since_save += completed;
        self.since_save >= self.interval
    }

    /// Serialize and atomically replace the checkpoint, retrying a bounded
    /// number of times before giving up with [`AppError::Storage`].
    pub async fn save<T: Serialize>(&mut self, checkpoint: &Checkpoint<T>) -> Result<()> {
        let payload = serde_json::to_string(checkpoint)?;
        let raw = RawValue::from_string(payload)?;
        let envelope = EnvelopeOut {
            version: ENVELOPE_VERSION,
            checksum: checksum(raw.get()),
            payload: &raw,
        };
        let bytes = serde_json::to_vec(&envelope)?;
        let key = self.key();

        let mut last_error = None;
        for attempt in 1..=self.save_attempts {
            match self.backend.write_bytes(&key, &bytes).await {
                Ok(()) => {
                    self.since_save = 0;
                    log::debug!(
                        "Checkpoint {} saved ({} completed, {} bytes)",
                        self.name,
                        checkpoint.completed.len(),
                        bytes.len()
                    );
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Checkpoint {} save attempt {}/{} failed: {}",
                        self.name,
                        attempt,
                        self.save_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.save_attempts {
                        tokio::time::sleep(SAVE_RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(AppError::storage(
            self.save_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string()),
        ))
    }

    /// Strict load: `Err(CheckpointCorrupt)` on a bad envelope or payload.
    pub async fn try_load<T: DeserializeOwned>(&self) -> Result<Option<Checkpoint<T>>> {
        let Some(bytes) = self
            .backend
            .read_bytes(&self.key())
            .await
            .map_err(AppError::corrupt)?
        else {
            return Ok(None);
        };
        let envelope: EnvelopeIn = serde_json::from_slice(&bytes).map_err(AppError::corrupt)?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(AppError::corrupt(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        let actual = checksum(envelope.payload.get());
        if actual != envelope.checksum {
            return Err(AppError::corrupt(format!(
                "checksum mismatch (expected {}, got {})",
                envelope.checksum, actual
            )));
        }
        let checkpoint = serde_json::from_str(envelope.payload.get()).map_err(AppError::corrupt)?;
        Ok(Some(checkpoint))
    }

    /// Load for resumption. Corrupt or unreadable checkpoints count as absent.
    pub async fn load<T: DeserializeOwned>(&self) -> Option<Checkpoint<T>> {
        match self.try_load().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                log::error!(
                    "Ignoring checkpoint {} and starting fresh: {}",
                    self.key(),
                    e
                );
                None
            }
        }
    }

    /// Move the checkpoint to `checkpoints/archive/<name>.<timestamp>.json`.
    pub async fn archive(&self) -> Result<Option<String>> {
        let target = format!(
            "checkpoints/archive/{}.{}.json",
            self.name,
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        );
        if self.backend.rename(&self.key(), &target).await? {
            log::info!("Archived checkpoint {} to {}", self.name, target);
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// Describe the checkpoint without needing its record type.
    pub async fn status(&self) -> CheckpointStatus {
        match self.try_load::<serde::de::IgnoredAny>().await {
            Ok(None) => CheckpointStatus::Missing,
            Ok(Some(checkpoint)) => CheckpointStatus::Present {
                saved_at: checkpoint.saved_at,
                completed: checkpoint.completed.len(),
                cursor: checkpoint.cursor,
                processed: checkpoint.processed.len(),
                failed: checkpoint.failed.len(),
            },
            Err(e) => CheckpointStatus::Corrupt(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::models::{EntityRecord, FailureReason};
    use crate::storage::LocalStorage;

    fn store(dir: &TempDir) -> (Arc<LocalStorage>, CheckpointStore) {
        let backend = Arc::new(LocalStorage::new(dir.path()));
        let config = CheckpointConfig {
            interval: 2,
            ..CheckpointConfig::default()
        };
        (backend.clone(), CheckpointStore::new(backend, "listing", &config))
    }

    fn sample() -> Checkpoint<EntityRecord> {
        let mut checkpoint = Checkpoint::new();
        let record = EntityRecord::new(Some("1".into()), "Alpha", 500);
        checkpoint.completed.insert(record.key(), record);
        checkpoint.cursor = Some(40);
        checkpoint
            .failed
            .push(FailedTarget::new("cursor:20", FailureReason::Unauthorized));
        checkpoint
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let (_, mut store) = store(&dir);
        let checkpoint = sample();

        store.save(&checkpoint).await.unwrap();
        let loaded: Checkpoint<EntityRecord> = store.load().await.unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[tokio::test]
    async fn tampered_payload_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let (backend, mut store) = store(&dir);
        store.save(&sample()).await.unwrap();

        let bytes = backend.read_bytes(&store.key()).await.unwrap().unwrap();
        let tampered = String::from_utf8(bytes).unwrap().replace("500", "900");
        backend
            .write_bytes(&store.key(), tampered.as_bytes())
            .await
            .unwrap();

        assert!(matches!(
            store.try_load::<EntityRecord>().await,
            Err(AppError::CheckpointCorrupt(_))
        ));
        assert!(store.load::<EntityRecord>().await.is_none());
        assert!(matches!(store.status().await, CheckpointStatus::Corrupt(_)));
    }

    #[tokio::test]
    async fn truncated_file_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = store(&dir);
        backend
            .write_bytes(&store.key(), b"{\"version\":1,\"check")
            .await
            .unwrap();
        assert!(store.load::<EntityRecord>().await.is_none());
    }

    #[tokio::test]
    async fn archive_moves_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (_, mut store) = store(&dir);
        store.save(&sample()).await.unwrap();

        let target = store.archive().await.unwrap().unwrap();
        assert!(target.starts_with("checkpoints/archive/listing."));
        assert_eq!(store.status().await, CheckpointStatus::Missing);
        assert!(dir.path().join(&target).exists());
        assert!(store.archive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_summarizes() {
        let dir = TempDir::new().unwrap();
        let (_, mut store) = store(&dir);
        store.save(&sample()).await.unwrap();
        assert!(matches!(
            store.status().await,
            CheckpointStatus::Present {
                completed: 1,
                cursor: Some(40),
                failed: 1,
                ..
            }
        ));
    }

    #[test]
    fn save_due_after_interval() {
        let dir = TempDir::new().unwrap();
        let (_, mut store) = store(&dir);
        assert!(!store.record_progress(1));
        assert!(store.record_progress(1));
    }

    struct FlakyBackend {
        failures_left: AtomicU32,
        inner: LocalStorage,
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write_bytes(key, bytes).await
        }

        async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.read_bytes(key).await
        }

        async fn rename(&self, from: &str, to: &str) -> Result<bool> {
            self.inner.rename(from, to).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn save_retries_then_fails_hard() {
        let dir = TempDir::new().unwrap();
        let flaky = |failures| {
            Arc::new(FlakyBackend {
                failures_left: AtomicU32::new(failures),
                inner: LocalStorage::new(dir.path()),
            })
        };

        let mut recovering = CheckpointStore::new(flaky(2), "events", &CheckpointConfig::default());
        recovering.save(&sample()).await.unwrap();

        let mut broken = CheckpointStore::new(flaky(5), "events", &CheckpointConfig::default());
        assert!(matches!(
            broken.save(&sample()).await,
            Err(AppError::Storage { attempts: 3, .. })
        ));
    }
}
