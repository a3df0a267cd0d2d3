use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How far a sync cycle walks the remote feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Stop as soon as a page contains nothing new.
    #[default]
    Incremental,
    /// Walk until the remote feed is exhausted regardless of local state.
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::Full => f.write_str("full"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "incremental" => Ok(SyncMode::Incremental),
            "full" => Ok(SyncMode::Full),
            other => Err(format!("Invalid sync mode: {}. Use 'incremental' or 'full'", other)),
        }
    }
}
