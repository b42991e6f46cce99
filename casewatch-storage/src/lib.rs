//! Casewatch Storage - Snapshot Store Traits and Backends
//!
//! The snapshot store is the only state shared between watcher processes.
//! Every write registers its token as the first writer of the written
//! `(case_number, update_time)` unless a writer is already recorded; that
//! registration is the whole concurrency-control story. Readers compare the
//! recorded token with their own to decide who announces a change.

pub mod lmdb;

pub use lmdb::{LmdbStore, LmdbStoreError};

use async_trait::async_trait;
use casewatch_core::{
    new_guid, CaseRecord, FirstWriter, Guid, Snapshot, StorageError, Timestamp, TrackedAsset,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

// ============================================================================
// STORE TRAITS
// ============================================================================

/// Durable snapshots plus first-writer markers.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Snapshot>, StorageError>;

    /// Persist `record` under its case number and return the token minted
    /// for this write. Safe to call concurrently for the same case.
    async fn write(&self, record: &CaseRecord) -> Result<Guid, StorageError>;

    /// The first write recorded for this case version, if any.
    async fn first_writer(
        &self,
        case_number: &str,
        update_time: Timestamp,
    ) -> Result<Option<FirstWriter>, StorageError>;

    /// Remove the snapshot and its first-writer markers. Deleting an absent
    /// case is not an error.
    async fn delete(&self, case_number: &str) -> Result<(), StorageError>;
}

/// Assets whose new cases get automatic subscribers.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StorageError>;

    /// Insert or replace by channel, kind and id.
    async fn upsert_asset(&self, asset: &TrackedAsset) -> Result<(), StorageError>;

    /// Returns whether an entry was removed.
    async fn remove_asset(&self, asset: &TrackedAsset) -> Result<bool, StorageError>;
}

/// Which chat channels follow which cases.
#[async_trait]
pub trait CaseChannels: Send + Sync {
    async fn channels_for_case(&self, case_number: &str) -> Result<Vec<String>, StorageError>;

    async fn track_case(&self, channel_id: &str, case_number: &str) -> Result<(), StorageError>;

    async fn untrack_case(&self, channel_id: &str, case_number: &str)
        -> Result<bool, StorageError>;
}

/// Key of a first-writer marker.
pub(crate) fn version_key(case_number: &str, update_time: Timestamp) -> String {
    format!(
        "{}\u{0}{}",
        case_number,
        update_time.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    )
}

/// Prefix shared by every marker of one case.
pub(crate) fn version_prefix(case_number: &str) -> String {
    format!("{}\u{0}", case_number)
}

// ============================================================================
// MOCK STORE
// ============================================================================

#[derive(Debug, Default)]
struct MockState {
    snapshots: BTreeMap<String, Snapshot>,
    first_writers: HashMap<String, FirstWriter>,
    assets: BTreeMap<String, TrackedAsset>,
    channels: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory store. One lock guards every map so a write and its
/// first-writer registration are atomic, as they are in LMDB.
#[derive(Debug, Default)]
pub struct MockStore {
    state: Arc<RwLock<MockState>>,
    fail_writes: AtomicBool,
}

impl MockStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self, case_number: &str) -> Option<Snapshot> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.snapshots.get(case_number).cloned())
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.read().map(|s| s.snapshots.len()).unwrap_or(0)
    }

    pub fn first_writer_count(&self) -> usize {
        self.state.read().map(|s| s.first_writers.len()).unwrap_or(0)
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "writes disabled".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MockStore {
    async fn list_all(&self) -> Result<Vec<Snapshot>, StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state.snapshots.values().cloned().collect())
    }

    async fn write(&self, record: &CaseRecord) -> Result<Guid, StorageError> {
        self.check_writable()?;
        let guid = new_guid();
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.snapshots.insert(
            record.case_number.clone(),
            Snapshot {
                record: record.clone(),
                guid,
            },
        );
        state
            .first_writers
            .entry(version_key(&record.case_number, record.update_time))
            .or_insert_with(|| FirstWriter {
                guid,
                record: record.clone(),
            });
        Ok(guid)
    }

    async fn first_writer(
        &self,
        case_number: &str,
        update_time: Timestamp,
    ) -> Result<Option<FirstWriter>, StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state
            .first_writers
            .get(&version_key(case_number, update_time))
            .cloned())
    }

    async fn delete(&self, case_number: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.snapshots.remove(case_number);
        let prefix = version_prefix(case_number);
        state.first_writers.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }
}

#[async_trait]
impl AssetRegistry for MockStore {
    async fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state.assets.values().cloned().collect())
    }

    async fn upsert_asset(&self, asset: &TrackedAsset) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.assets.insert(asset.registry_key(), asset.clone());
        Ok(())
    }

    async fn remove_asset(&self, asset: &TrackedAsset) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state.assets.remove(&asset.registry_key()).is_some())
    }
}

#[async_trait]
impl CaseChannels for MockStore {
    async fn channels_for_case(&self, case_number: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state
            .channels
            .get(case_number)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn track_case(&self, channel_id: &str, case_number: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state
            .channels
            .entry(case_number.to_string())
            .or_default()
            .insert(channel_id.to_string());
        Ok(())
    }

    async fn untrack_case(
        &self,
        channel_id: &str,
        case_number: &str,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(set) = state.channels.get_mut(case_number) else {
            return Ok(false);
        };
        let removed = set.remove(channel_id);
        if set.is_empty() {
            state.channels.remove(case_number);
        }
        Ok(removed)
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod tests {
    use super::test_support::{asset, record};
    use super::*;
    use casewatch_core::{mark_for_closure, AssetKind};

    #[tokio::test]
    async fn test_first_write_wins_marker() {
        let store = MockStore::new();
        let rec = record("1", 0);

        let first = store.write(&rec).await.unwrap();
        let second = store.write(&rec).await.unwrap();
        assert_ne!(first, second);

        let marker = store
            .first_writer("1", rec.update_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker.guid, first);

        // The snapshot itself reflects the latest write.
        assert_eq!(store.snapshot("1").unwrap().guid, second);
    }

    #[tokio::test]
    async fn test_first_writer_absent_for_unknown_version() {
        let store = MockStore::new();
        let rec = record("1", 0);
        store.write(&rec).await.unwrap();
        let other = record("1", 5);
        assert!(store
            .first_writer("1", other.update_time)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_purges_markers() {
        let store = MockStore::new();
        let rec = record("7", 0);
        store.write(&rec).await.unwrap();
        store.write(&mark_for_closure(&rec)).await.unwrap();
        store.write(&record("70", 0)).await.unwrap();
        assert_eq!(store.first_writer_count(), 3);

        store.delete("7").await.unwrap();
        assert!(store.snapshot("7").is_none());
        // Markers of case "70" share a textual prefix but survive.
        assert_eq!(store.first_writer_count(), 1);
        assert_eq!(store.snapshot_count(), 1);

        // Idempotent
        store.delete("7").await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MockStore::new();
        store.set_fail_writes(true);
        let err = store.write(&record("1", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));
        store.set_fail_writes(false);
        assert!(store.write(&record("1", 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_asset_registry_upsert_replaces() {
        let store = MockStore::new();
        let mut a = asset("C1", AssetKind::Folder, "folders/9");
        store.upsert_asset(&a).await.unwrap();
        a.cc_list.push("second@example.com".to_string());
        a.asset_id = "9".to_string();
        store.upsert_asset(&a).await.unwrap();

        let assets = store.tracked_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].cc_list.len(), 2);

        assert!(store.remove_asset(&a).await.unwrap());
        assert!(!store.remove_asset(&a).await.unwrap());
    }

    #[tokio::test]
    async fn test_case_channels() {
        let store = MockStore::new();
        store.track_case("C2", "100").await.unwrap();
        store.track_case("C1", "100").await.unwrap();
        store.track_case("C1", "100").await.unwrap();
        assert_eq!(
            store.channels_for_case("100").await.unwrap(),
            vec!["C1".to_string(), "C2".to_string()]
        );
        assert!(store.untrack_case("C1", "100").await.unwrap());
        assert!(!store.untrack_case("C9", "100").await.unwrap());
        assert!(store.channels_for_case("404").await.unwrap().is_empty());
    }
}
