use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Cross-process run lock backed by a file created exclusively.
///
/// The file is removed when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock. `Ok(None)` means another live cycle holds it.
    ///
    /// A lock older than `stale_after` (or unreadable) is assumed to belong to a
    /// crashed process and is taken over.
    pub fn acquire(path: &Path, stale_after: chrono::Duration) -> Result<Option<Self>, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let content = serde_json::to_vec(&info).map_err(|source| StoreError::Serialize {
                        path: path.to_path_buf(),
                        source,
                    })?;
                    file.write_all(&content).map_err(|e| StoreError::io(path, e))?;
                    debug!("Acquired run lock {:?}", path);
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !Self::is_stale(path, stale_after) {
                        return Ok(None);
                    }
                    warn!("Reclaiming stale run lock {:?}", path);
                    match std::fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(StoreError::io(path, e)),
                    }
                }
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Ok(None)
    }

    fn is_stale(path: &Path, stale_after: chrono::Duration) -> bool {
        let info = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok());
        match info {
            Some(info) => Utc::now() - info.acquired_at > stale_after,
            // Half-written or foreign file: only reclaim once it is old enough
            None => std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|modified| {
                    let modified: DateTime<Utc> = modified.into();
                    Utc::now() - modified > stale_after
                })
                .unwrap_or(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove run lock {:?}: {}", self.path, e);
        } else {
            debug!("Released run lock {:?}", self.path);
        }
    }
}
