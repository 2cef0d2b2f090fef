// review-flow library: generalized review workflow engine for agency work
// items. Exposes the engine, its storage backends and the ambient
// configuration and telemetry setup used by the CLI.

pub mod config;
pub mod storage;
pub mod telemetry;
pub mod workflows;

#[cfg(feature = "database")]
pub mod database;

// Re-export key types for easy access
pub use config::{config, ReviewFlowConfig, StorageBackend};
pub use storage::{FileStore, MemoryStore, StoreError, WorkItemStore, WriteOutcome};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    Action, Actor, BulkNotes, BulkReport, BulkRequest, CommentTrail, ErrorKind, LineItemDraft, LineItemInput,
    NewWorkItem, ReviewEngine, Role, State, WorkItem, WorkItemFilter, WorkItemId, WorkItemKind, WorkflowError,
};

#[cfg(feature = "database")]
pub use database::SqliteStore;
