use chrono::{DateTime, NaiveDate, Utc};
use history_sync_models::SyncMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ErrorKind, SyncError};

/// Why a pagination walk stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The remote returned an empty page (or stopped moving).
    Exhausted,
    /// An incremental walk reached a page with nothing new.
    CaughtUp,
    Failed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("exhausted"),
            StopReason::CaughtUp => f.write_str("caught up"),
            StopReason::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Succeeded,
    PartialFailure,
    AlreadyRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SyncError> for ReportError {
    fn from(error: &SyncError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Inclusive range of bucket dates merged before the cycle ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn include(&mut self, date: NaiveDate) {
        if date < self.from {
            self.from = date;
        }
        if date > self.to {
            self.to = date;
        }
    }

    pub fn extend(range: &mut Option<DateRange>, date: NaiveDate) {
        match range {
            Some(r) => r.include(date),
            None => *range = Some(DateRange::single(date)),
        }
    }
}

/// Structured outcome of one `run_cycle` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub requested_mode: SyncMode,
    /// Mode actually used; incremental without a checkpoint runs as full.
    pub mode: SyncMode,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub added_by_date: BTreeMap<NaiveDate, usize>,
    pub fetch_calls: u32,
    pub pages_merged: u32,
    #[serde(default)]
    pub resumed_walks: usize,
    #[serde(default)]
    pub pending_walks: usize,
    #[serde(default)]
    pub secured_range: Option<DateRange>,
    #[serde(default)]
    pub error: Option<ReportError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub(crate) fn started(requested_mode: SyncMode, started_at: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Succeeded,
            requested_mode,
            mode: requested_mode,
            stop_reason: None,
            added_by_date: BTreeMap::new(),
            fetch_calls: 0,
            pages_merged: 0,
            resumed_walks: 0,
            pending_walks: 0,
            secured_range: None,
            error: None,
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn already_running(requested_mode: SyncMode) -> Self {
        let now = Utc::now();
        let mut report = Self::started(requested_mode, now);
        report.status = SyncStatus::AlreadyRunning;
        report.error = Some(ReportError::from(&SyncError::AlreadyRunning));
        report
    }

    pub(crate) fn fail(&mut self, error: &SyncError) {
        self.status = SyncStatus::PartialFailure;
        self.stop_reason = Some(StopReason::Failed);
        self.error = Some(ReportError::from(error));
    }

    pub fn total_added(&self) -> usize {
        self.added_by_date.values().sum()
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Succeeded
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_extend() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let mut range = None;
        DateRange::extend(&mut range, d(10));
        DateRange::extend(&mut range, d(2));
        DateRange::extend(&mut range, d(5));
        assert_eq!(range, Some(DateRange { from: d(2), to: d(10) }));
    }

    #[test]
    fn test_report_roundtrip_keeps_dates_as_keys() {
        let mut report = SyncReport::started(SyncMode::Incremental, Utc::now());
        report
            .added_by_date
            .insert(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 3);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"2024-01-02\":3"));
        let back: SyncReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_added(), 3);
    }
}
