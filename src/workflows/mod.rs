// Review workflow engine: per-kind transition tables, the engine that applies
// them, line-item edits, comments, bulk transitions and the version guard.

pub mod bulk;
pub mod comments;
pub mod concurrency;
pub mod engine;
pub mod errors;
pub mod line_items;
pub mod notifications;
pub mod transition_table;
pub mod types;

pub use bulk::{BulkNotes, BulkOutcome, BulkReport, BulkRequest};
pub use comments::CommentTrail;
pub use concurrency::{check_version, retry_on_stale, RetryPolicy};
pub use engine::{EngineSettings, NewWorkItem, ReviewEngine, WorkItemFilter};
pub use errors::{ErrorKind, WorkflowError};
pub use line_items::{compute_financials, LineItemDraft, LineItemInput};
pub use notifications::{LogNotifier, NotificationDispatcher, TransitionNotice};
pub use transition_table::{allowed_actions, required_role, resulting_state, table_for, KindTable, NotAllowed};
pub use types::{
    Action, Actor, Comment, LineItem, LineItemDetails, LineItemId, Role, State, WorkItem, WorkItemId, WorkItemKind,
};

#[cfg(any(test, feature = "testing"))]
pub use notifications::MockNotificationDispatcher;
