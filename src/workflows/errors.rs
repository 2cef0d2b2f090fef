use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{Action, LineItemId, Role, State, WorkItem, WorkItemId, WorkItemKind};
use crate::storage::StoreError;

/// Errors surfaced by the review engine.
///
/// Every variant except `Storage` is an expected, recoverable condition and
/// carries enough context (current state, current version) for the caller
/// to decide what to do next. No variant is returned after a partial write.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid transition: {action} is not allowed for {kind} in state {state} (version {version})")]
    InvalidTransition {
        kind: WorkItemKind,
        state: State,
        action: Action,
        version: u64,
    },

    #[error("Forbidden: {role} may not {operation}: {reason} (state {state}, version {version})")]
    Forbidden {
        operation: String,
        role: Role,
        reason: String,
        state: State,
        version: u64,
    },

    #[error("Stale version: expected {expected}, current is {current} (state {state}); re-fetch and retry")]
    StaleVersion { expected: u64, current: u64, state: State },

    #[error("Not editable: {kind} in state {state} (version {version}) does not accept edits")]
    NotEditable {
        kind: WorkItemKind,
        state: State,
        version: u64,
    },

    #[error("Work item not found: {id}")]
    NotFound { id: WorkItemId },

    #[error("Line item {line_item_id} not found on work item {work_item_id}")]
    LineItemNotFound {
        work_item_id: WorkItemId,
        line_item_id: LineItemId,
    },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Flat, serializable classification of a `WorkflowError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    Forbidden,
    StaleVersion,
    NotEditable,
    NotFound,
    Validation,
    Storage,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            WorkflowError::Forbidden { .. } => ErrorKind::Forbidden,
            WorkflowError::StaleVersion { .. } => ErrorKind::StaleVersion,
            WorkflowError::NotEditable { .. } => ErrorKind::NotEditable,
            WorkflowError::NotFound { .. } | WorkflowError::LineItemNotFound { .. } => ErrorKind::NotFound,
            WorkflowError::Validation { .. } => ErrorKind::Validation,
            WorkflowError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Only a version conflict is worth retrying after a re-fetch
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::StaleVersion { .. })
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        WorkflowError::Validation { reason: reason.into() }
    }

    pub(crate) fn forbidden(item: &WorkItem, operation: impl Into<String>, role: Role, reason: impl Into<String>) -> Self {
        WorkflowError::Forbidden {
            operation: operation.into(),
            role,
            reason: reason.into(),
            state: item.state,
            version: item.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stale_version_is_retryable() {
        let stale = WorkflowError::StaleVersion {
            expected: 3,
            current: 4,
            state: State::Submitted,
        };
        assert!(stale.is_retryable());
        assert_eq!(stale.kind(), ErrorKind::StaleVersion);

        let invalid = WorkflowError::InvalidTransition {
            kind: WorkItemKind::Invoice,
            state: State::Paid,
            action: Action::Approve,
            version: 5,
        };
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_messages_carry_current_state_and_version() {
        let err = WorkflowError::NotEditable {
            kind: WorkItemKind::SubmissionList,
            state: State::UnderReview,
            version: 7,
        };
        let message = err.to_string();
        assert!(message.contains("UNDER_REVIEW"));
        assert!(message.contains("version 7"));

        let err = WorkflowError::Forbidden {
            operation: "approve".to_string(),
            role: Role::Owner,
            reason: "approve requires the counterparty role".to_string(),
            state: State::Sent,
            version: 2,
        };
        assert_eq!(
            err.to_string(),
            "Forbidden: owner may not approve: approve requires the counterparty role (state SENT, version 2)"
        );
    }
}
