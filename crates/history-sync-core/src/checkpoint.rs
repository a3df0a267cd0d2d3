use chrono::{DateTime, Utc};
use history_sync_models::{SyncCursor, SyncMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::report::SyncReport;
use crate::store::write_atomic;

/// A walk that stopped early and still has older pages to cover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingWalk {
    pub cursor: SyncCursor,
    pub mode: SyncMode,
}

/// Persisted state between cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Final cursor of the last cycle.
    pub cursor: SyncCursor,
    #[serde(default)]
    pub pending: Vec<PendingWalk>,
    #[serde(default)]
    pub last_report: Option<SyncReport>,
    pub updated_at: DateTime<Utc>,
}

/// JSON checkpoint file, replaced atomically on every save.
pub struct CheckpointStore {
    path: PathBuf,
    writes: AtomicUsize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let checkpoint = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(checkpoint).map_err(|source| StoreError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &content)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Saved checkpoint (cursor max={} view_at={}, {} pending)",
            checkpoint.cursor.max,
            checkpoint.cursor.view_at,
            checkpoint.pending.len()
        );
        Ok(())
    }

    /// Remove the checkpoint so the next cycle runs as a full backfill.
    pub fn clear(&self) -> Result<bool, StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed checkpoint {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Number of successful saves through this handle.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().unwrap().is_none());

        let checkpoint = Checkpoint {
            cursor: SyncCursor::new(10, 1_700_000_000),
            pending: vec![PendingWalk {
                cursor: SyncCursor::new(5, 1_600_000_000),
                mode: SyncMode::Full,
            }],
            last_report: None,
            updated_at: Utc::now(),
        };
        store.save(&checkpoint).unwrap();
        assert_eq!(store.writes(), 1);
        assert_eq!(store.load().unwrap(), Some(checkpoint));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn test_corrupt_checkpoint_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{").unwrap();
        let store = CheckpointStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }
}
