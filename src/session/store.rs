// src/session/store.rs

use std::{collections::HashMap, fmt, io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Checkpoint;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "checkpoint I/O failed: {}", e),
            StoreError::Format(e) => write!(f, "checkpoint is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Format(e)
    }
}

/// Where a session keeps its progress between reloads.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, instance_id: i64) -> Result<Option<Checkpoint>, StoreError>;
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
    async fn clear(&self, instance_id: i64) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self, instance_id: i64) -> Result<Option<Checkpoint>, StoreError> {
        (**self).load(instance_id).await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        (**self).save(checkpoint).await
    }

    async fn clear(&self, instance_id: i64) -> Result<(), StoreError> {
        (**self).clear(instance_id).await
    }
}

/// In-process store, lost with the process.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<i64, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, instance_id: i64) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.entries.lock().await.get(&instance_id).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(checkpoint.instance_id, checkpoint.clone());
        Ok(())
    }

    async fn clear(&self, instance_id: i64) -> Result<(), StoreError> {
        self.entries.lock().await.remove(&instance_id);
        Ok(())
    }
}

/// One JSON file per test instance inside `dir`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, instance_id: i64) -> PathBuf {
        self.dir.join(format!("test-{}.json", instance_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, instance_id: i64) -> Result<Option<Checkpoint>, StoreError> {
        match tokio::fs::read(self.path_for(instance_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(checkpoint.instance_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(checkpoint)?).await?;
        // Rename so a crash mid-write never leaves a truncated checkpoint.
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, instance_id: i64) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(instance_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn checkpoint(instance_id: i64) -> Checkpoint {
        Checkpoint {
            instance_id,
            pointer: 2,
            selections: BTreeMap::from([(10, vec![101]), (20, vec![201, 203])]),
        }
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load(1).await.unwrap().is_none());

        store.save(&checkpoint(1)).await.unwrap();
        assert_eq!(store.load(1).await.unwrap(), Some(checkpoint(1)));

        store.clear(1).await.unwrap();
        assert!(store.load(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sessions");

        FileCheckpointStore::new(&root).save(&checkpoint(7)).await.unwrap();

        let reopened = FileCheckpointStore::new(&root);
        assert_eq!(reopened.load(7).await.unwrap(), Some(checkpoint(7)));
        assert!(reopened.load(8).await.unwrap().is_none());

        reopened.clear(7).await.unwrap();
        reopened.clear(7).await.unwrap();
        assert!(reopened.load(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        tokio::fs::write(dir.path().join("test-3.json"), b"{not json")
            .await
            .unwrap();
        assert!(matches!(store.load(3).await, Err(StoreError::Format(_))));
    }
}
