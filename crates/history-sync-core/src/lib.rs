pub mod checkpoint;
pub mod classify;
pub mod error;
pub mod integrity;
pub mod merge;
pub mod reader;
pub mod report;
pub mod run_lock;
pub mod stats;
pub mod store;
pub mod sync;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use checkpoint::{Checkpoint, CheckpointStore, PendingWalk};
pub use classify::Classifier;
pub use error::{ErrorKind, StoreError, SyncError};
pub use integrity::{verify_store, IntegrityReport};
pub use merge::{MergeEngine, MergeOutcome};
pub use reader::HistoryReader;
pub use report::{DateRange, ReportError, StopReason, SyncReport, SyncStatus};
pub use run_lock::RunLock;
pub use store::RecordStore;
pub use sync::SyncOrchestrator;
pub use walker::{PaginationWalker, WalkOutcome, WalkSettings};
