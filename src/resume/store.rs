use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use super::ResumeSink;
use super::error::{ResumeError, Result};
use super::keys::{decode_resume_key, encode_failure_key, encode_resume_key};
use crate::model::ItemId;

/// Fjall-backed storage for per-item engine resume data
#[derive(Clone)]
pub struct FjallResumeStore {
    keyspace: Keyspace,
    resume: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallResumeStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening resume store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let resume = keyspace.open_partition("resume", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Resume store opened successfully");
        Ok(Self {
            keyspace,
            resume,
            metadata,
        })
    }

    /// Store the latest resume blob for an item, clearing any failure note
    pub fn upsert(&self, item: ItemId, data: &[u8]) -> Result<()> {
        self.resume.insert(encode_resume_key(item), data)?;
        self.metadata.remove(encode_failure_key(item))?;
        debug!(item_id = %item, bytes = data.len(), "Stored resume data");
        Ok(())
    }

    pub fn load(&self, item: ItemId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .resume
            .get(encode_resume_key(item))?
            .map(|value| value.to_vec()))
    }

    /// Every stored blob, in item id order
    pub fn load_all(&self) -> Result<Vec<(ItemId, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.resume.iter() {
            let (key, value) = item?;
            let id = decode_resume_key(&key)
                .ok_or_else(|| ResumeError::InvalidKey(String::from_utf8_lossy(&key).into()))?;
            entries.push((id, value.to_vec()));
        }
        Ok(entries)
    }

    pub fn remove(&self, item: ItemId) -> Result<()> {
        self.resume.remove(encode_resume_key(item))?;
        self.metadata.remove(encode_failure_key(item))?;
        Ok(())
    }

    pub fn record_failure(&self, item: ItemId, message: &str) -> Result<()> {
        self.metadata
            .insert(encode_failure_key(item), message.as_bytes())?;
        Ok(())
    }

    pub fn last_failure(&self, item: ItemId) -> Result<Option<String>> {
        Ok(self
            .metadata
            .get(encode_failure_key(item))?
            .map(|value| String::from_utf8_lossy(&value).to_string()))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut resume_count = 0;
        let mut failure_count = 0;

        for item in self.resume.iter() {
            item?;
            resume_count += 1;
        }

        for item in self.metadata.iter() {
            item?;
            failure_count += 1;
        }

        Ok(StoreStats {
            resume_count,
            failure_count,
        })
    }
}

impl ResumeSink for FjallResumeStore {
    fn save(&self, item: ItemId, data: &[u8]) -> Result<()> {
        self.upsert(item, data)
    }

    fn report_failure(&self, item: ItemId, message: &str) {
        warn!(item_id = %item, reason = message, "Engine failed to produce resume data");
        if let Err(err) = self.record_failure(item, message) {
            warn!(item_id = %item, error = %err, "Failed to record resume failure");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub resume_count: usize,
    pub failure_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FjallResumeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallResumeStore::open(temp_dir.path().join("resume")).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_save_and_load() {
        let (store, _temp) = create_test_store();
        store.save(ItemId(1), b"d8:info-hash").unwrap();

        assert_eq!(store.load(ItemId(1)).unwrap().unwrap(), b"d8:info-hash");
        assert!(store.load(ItemId(2)).unwrap().is_none());
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let (store, _temp) = create_test_store();
        store.save(ItemId(1), b"old").unwrap();
        store.save(ItemId(1), b"new").unwrap();
        assert_eq!(store.load(ItemId(1)).unwrap().unwrap(), b"new");
        assert_eq!(store.stats().unwrap().resume_count, 1);
    }

    #[test]
    fn test_load_all_in_id_order() {
        let (store, _temp) = create_test_store();
        store.save(ItemId(10), b"b").unwrap();
        store.save(ItemId(2), b"a").unwrap();

        let ids: Vec<_> = store.load_all().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![ItemId(2), ItemId(10)]);
    }

    #[test]
    fn test_failure_note_cleared_by_save() {
        let (store, _temp) = create_test_store();
        store.report_failure(ItemId(3), "no metadata yet");
        assert_eq!(
            store.last_failure(ItemId(3)).unwrap().as_deref(),
            Some("no metadata yet")
        );

        store.save(ItemId(3), b"blob").unwrap();
        assert!(store.last_failure(ItemId(3)).unwrap().is_none());
    }

    #[test]
    fn test_remove_and_persist() {
        let (store, _temp) = create_test_store();
        store.save(ItemId(5), b"blob").unwrap();
        store.remove(ItemId(5)).unwrap();
        store.persist().unwrap();
        assert_eq!(
            store.stats().unwrap(),
            StoreStats {
                resume_count: 0,
                failure_count: 0
            }
        );
    }
}
