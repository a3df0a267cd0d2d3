use history_sync_models::EntryKey;
use history_sync_sources::FetchError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure of the on-disk record store or checkpoint.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("entry {key} belongs to {expected:?}, not bucket {date}")]
    WrongBucket {
        key: EntryKey,
        date: NaiveDate,
        expected: Option<NaiveDate>,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal error of a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transient fetch error after {attempts} attempt(s): {message}")]
    TransientFetch { attempts: u32, message: String },
    #[error("malformed page after {attempts} attempt(s): {message}")]
    MalformedPage { attempts: u32, message: String },
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("sync cycle cancelled")]
    Cancelled,
    #[error("a sync cycle is already running")]
    AlreadyRunning,
}

impl SyncError {
    pub fn from_fetch(error: FetchError, attempts: u32) -> Self {
        match error {
            FetchError::Auth(message) => SyncError::Auth(message),
            FetchError::Transient(message) => SyncError::TransientFetch { attempts, message },
            FetchError::Malformed(message) => SyncError::MalformedPage { attempts, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Auth(_) => ErrorKind::Auth,
            SyncError::TransientFetch { .. } => ErrorKind::TransientFetch,
            SyncError::MalformedPage { .. } => ErrorKind::MalformedPage,
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::AlreadyRunning => ErrorKind::AlreadyRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    TransientFetch,
    MalformedPage,
    Storage,
    Cancelled,
    AlreadyRunning,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::TransientFetch => "transient_fetch",
            ErrorKind::MalformedPage => "malformed_page",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::AlreadyRunning => "already_running",
        };
        f.write_str(name)
    }
}
