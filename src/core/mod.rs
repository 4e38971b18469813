pub mod checkpoint;
pub mod classifier;
pub mod engine;
pub mod migrate;
pub mod retry;
pub mod scanner;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use classifier::{classify, AssetRecord, Category, ClassificationReport, MediaType};
pub use engine::{FileOutcome, SkipReason, SyncConfig, SyncEngine, SyncReport, TransferOutcome};
pub use migrate::{list_all, MigrationOperator, MigrationSummary, RenameJob, RenameOutcome};
pub use retry::{
    BackoffConfig, BackoffPolicy, Completion, Operation, Pacer, RetryController, RetryError,
};
pub use scanner::{FileScanner, LocalFile, ScanConfig, ScanError};
