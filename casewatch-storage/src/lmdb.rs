//! LMDB-backed snapshot store.
//!
//! Uses the heed crate (Rust bindings for LMDB). LMDB serialises write
//! transactions across every process that opens the same environment, so
//! several watcher processes on one host can share a store directory. A
//! snapshot write and its first-writer registration commit in the same
//! write transaction.
//!
//! # Layout
//!
//! Four named databases, prefixed with the configured namespace:
//! - `{ns}:snapshots`: case number -> JSON `Snapshot`
//! - `{ns}:first_writers`: `case_number \0 update_time` -> JSON `FirstWriter`
//! - `{ns}:assets`: registry key -> JSON `TrackedAsset`
//! - `{ns}:channels`: case number -> JSON list of channel ids

use std::path::Path;

use async_trait::async_trait;
use casewatch_core::{
    new_guid, CaseRecord, FirstWriter, Guid, Snapshot, StorageError, Timestamp, TrackedAsset,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{version_key, version_prefix, AssetRegistry, CaseChannels, SnapshotStore};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Invalid map size: {0} MB")]
    MapSize(usize),

    #[error("Serialization error for {key}: {reason}")]
    Serialization { key: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization { key, reason } => {
                StorageError::Serialization { key, reason }
            }
            LmdbStoreError::Transaction(reason) => StorageError::TransactionFailed { reason },
            other => StorageError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, LmdbStoreError> {
    serde_json::to_vec(value).map_err(|e| LmdbStoreError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, LmdbStoreError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Serialization {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

/// Durable store shared by every watcher process of one deployment.
#[derive(Clone)]
pub struct LmdbStore {
    env: Env,
    snapshots: Database<Bytes, Bytes>,
    first_writers: Database<Bytes, Bytes>,
    assets: Database<Bytes, Bytes>,
    channels: Database<Bytes, Bytes>,
    namespace: String,
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl LmdbStore {
    /// Open (or create) the store directory at `path`.
    ///
    /// `namespace` keeps deployments for different projects apart inside one
    /// environment; `max_size_mb` bounds the memory map.
    pub fn open<P: AsRef<Path>>(
        path: P,
        namespace: &str,
        max_size_mb: usize,
    ) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .filter(|size| *size > 0)
            .ok_or(LmdbStoreError::MapSize(max_size_mb))?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(16)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let mut open = |suffix: &str| -> Result<Database<Bytes, Bytes>, LmdbStoreError> {
            let name = format!("{namespace}:{suffix}");
            env.create_database(&mut wtxn, Some(&name))
                .map_err(|e| LmdbStoreError::DbOpen {
                    name,
                    reason: e.to_string(),
                })
        };
        let snapshots = open("snapshots")?;
        let first_writers = open("first_writers")?;
        let assets = open("assets")?;
        let channels = open("channels")?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(
            path = %path.as_ref().display(),
            namespace,
            max_size_mb,
            "Opened LMDB snapshot store"
        );

        Ok(Self {
            env,
            snapshots,
            first_writers,
            assets,
            channels,
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn read_all<T: DeserializeOwned>(
        &self,
        db: Database<Bytes, Bytes>,
    ) -> Result<Vec<T>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut out = Vec::new();
        for entry in db.iter(&rtxn).map_err(txn_err)? {
            let (key, value) = entry.map_err(txn_err)?;
            out.push(decode(key, value)?);
        }
        Ok(out)
    }

    fn read_one<T: DeserializeOwned>(
        &self,
        txn: &RoTxn,
        db: Database<Bytes, Bytes>,
        key: &str,
    ) -> Result<Option<T>, LmdbStoreError> {
        match db.get(txn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Ok(Some(decode(key.as_bytes(), bytes)?)),
            None => Ok(None),
        }
    }

    fn channel_list(&self, txn: &RoTxn, case_number: &str) -> Result<Vec<String>, LmdbStoreError> {
        Ok(self
            .read_one(txn, self.channels, case_number)?
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotStore for LmdbStore {
    async fn list_all(&self) -> Result<Vec<Snapshot>, StorageError> {
        Ok(self.read_all(self.snapshots)?)
    }

    async fn write(&self, record: &CaseRecord) -> Result<Guid, StorageError> {
        let guid = new_guid();
        let key = record.case_number.as_str();
        let marker_key = version_key(key, record.update_time);

        let snapshot = encode(
            key,
            &Snapshot {
                record: record.clone(),
                guid,
            },
        )?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.snapshots
            .put(&mut wtxn, key.as_bytes(), &snapshot)
            .map_err(txn_err)?;

        let marked = self
            .first_writers
            .get(&wtxn, marker_key.as_bytes())
            .map_err(txn_err)?
            .is_some();
        if !marked {
            let marker = encode(
                &marker_key,
                &FirstWriter {
                    guid,
                    record: record.clone(),
                },
            )?;
            self.first_writers
                .put(&mut wtxn, marker_key.as_bytes(), &marker)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        tracing::trace!(case_number = key, %guid, first = !marked, "Snapshot written");
        Ok(guid)
    }

    async fn first_writer(
        &self,
        case_number: &str,
        update_time: Timestamp,
    ) -> Result<Option<FirstWriter>, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read_one(
            &rtxn,
            self.first_writers,
            &version_key(case_number, update_time),
        )?)
    }

    async fn delete(&self, case_number: &str) -> Result<(), StorageError> {
        let prefix = version_prefix(case_number);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        self.snapshots
            .delete(&mut wtxn, case_number.as_bytes())
            .map_err(txn_err)?;

        let mut stale = Vec::new();
        for entry in self.first_writers.iter(&wtxn).map_err(txn_err)? {
            let (key, _) = entry.map_err(txn_err)?;
            if key.starts_with(prefix.as_bytes()) {
                stale.push(key.to_vec());
            }
        }
        for key in &stale {
            self.first_writers.delete(&mut wtxn, key).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;

        tracing::trace!(case_number, markers = stale.len(), "Snapshot deleted");
        Ok(())
    }
}

#[async_trait]
impl AssetRegistry for LmdbStore {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StorageError> {
        Ok(self.read_all(self.assets)?)
    }

    async fn upsert_asset(&self, asset: &TrackedAsset) -> Result<(), StorageError> {
        let key = asset.registry_key();
        let value = encode(&key, asset)?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.assets
            .put(&mut wtxn, key.as_bytes(), &value)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn remove_asset(&self, asset: &TrackedAsset) -> Result<bool, StorageError> {
        let key = asset.registry_key();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = self
            .assets
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}

#[async_trait]
impl CaseChannels for LmdbStore {
    async fn channels_for_case(&self, case_number: &str) -> Result<Vec<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.channel_list(&rtxn, case_number)?)
    }

    async fn track_case(&self, channel_id: &str, case_number: &str) -> Result<(), StorageError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut channels = self.channel_list(&wtxn, case_number)?;
        if !channels.iter().any(|c| c == channel_id) {
            channels.push(channel_id.to_string());
            channels.sort();
            let value = encode(case_number, &channels)?;
            self.channels
                .put(&mut wtxn, case_number.as_bytes(), &value)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn untrack_case(
        &self,
        channel_id: &str,
        case_number: &str,
    ) -> Result<bool, StorageError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut channels = self.channel_list(&wtxn, case_number)?;
        let before = channels.len();
        channels.retain(|c| c != channel_id);
        let removed = channels.len() != before;
        if channels.is_empty() {
            self.channels
                .delete(&mut wtxn, case_number.as_bytes())
                .map_err(txn_err)?;
        } else if removed {
            let value = encode(case_number, &channels)?;
            self.channels
                .put(&mut wtxn, case_number.as_bytes(), &value)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }
}
