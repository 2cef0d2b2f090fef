// Persistence contract for the review engine.
//
// The engine never writes a work item unconditionally: every update and
// delete goes through a version-guarded primitive, which is the only thing a
// storage backend has to get right for the concurrency guarantees to hold.

use async_trait::async_trait;
use thiserror::Error;

use crate::workflows::types::{Comment, NewComment, State, WorkItem, WorkItemId};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(feature = "database")]
pub use crate::database::SqliteStore;

/// Errors that can occur inside a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Work item {0} already exists")]
    Duplicate(WorkItemId),

    #[error("Lock acquisition failed: {reason}")]
    Lock { reason: String },

    #[error("State corruption detected: {reason}")]
    Corruption { reason: String },

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result of a version-guarded write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Stored version differs from the expected one; nothing was written
    Conflict { current_version: u64, current_state: State },
    /// No work item with that id exists (anymore)
    Missing,
}

/// Storage backend for work items and their comment ledgers
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Stores a brand-new work item. Fails with `Duplicate` if the id is taken.
    async fn insert(&self, item: &WorkItem) -> Result<(), StoreError>;

    async fn fetch(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StoreError>;

    /// All work items, oldest first
    async fn list(&self) -> Result<Vec<WorkItem>, StoreError>;

    /// Replaces the stored item iff its stored version equals `expected_version`
    async fn compare_and_swap(&self, expected_version: u64, item: &WorkItem) -> Result<WriteOutcome, StoreError>;

    /// Deletes the item and its comments iff its stored version equals `expected_version`
    async fn delete_if_version(&self, id: &WorkItemId, expected_version: u64) -> Result<WriteOutcome, StoreError>;

    /// Appends to the item's ledger, assigning the next sequence number.
    /// Returns `None` when the work item does not exist.
    async fn append_comment(&self, id: &WorkItemId, comment: NewComment) -> Result<Option<Comment>, StoreError>;

    /// The item's ledger in append order
    async fn list_comments(&self, id: &WorkItemId) -> Result<Vec<Comment>, StoreError>;
}
