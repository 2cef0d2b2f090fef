// Declarative transition tables, one per work item kind.
//
// New kinds and actions are added here as data. Nothing else in the crate
// matches on (kind, state, action) triples.

use serde::Serialize;

use super::types::{Action, Role, State, TimestampField, WorkItemKind};

/// One legal move: `from --action--> to`, invocable only by `role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: State,
    pub action: Action,
    pub to: State,
    pub role: Role,
}

const fn edge(from: State, action: Action, to: State, role: Role) -> Edge {
    Edge { from, action, to, role }
}

/// States and edges for a single kind
#[derive(Debug, Serialize)]
pub struct KindTable {
    pub kind: WorkItemKind,
    /// State a freshly created work item starts in. Always editable.
    pub initial: State,
    pub states: &'static [State],
    /// States in which line items may be added, changed or removed
    pub editable: &'static [State],
    pub edges: &'static [Edge],
}

/// `resulting_state` found no edge for the requested action
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{action} is not allowed for {kind} in state {state}")]
pub struct NotAllowed {
    pub kind: WorkItemKind,
    pub state: State,
    pub action: Action,
}

use Action::*;
use Role::{Counterparty, Owner};
use State::*;

static SUBMISSION_LIST: KindTable = KindTable {
    kind: WorkItemKind::SubmissionList,
    initial: Draft,
    states: &[Draft, Submitted, UnderReview, RevisionRequested, Approved, Rejected],
    editable: &[Draft, RevisionRequested],
    edges: &[
        edge(Draft, Submit, Submitted, Owner),
        edge(Submitted, StartReview, UnderReview, Counterparty),
        // A reviewer may also resolve a list without opening a review first
        edge(Submitted, Approve, Approved, Counterparty),
        edge(Submitted, Reject, Rejected, Counterparty),
        edge(Submitted, RequestRevision, RevisionRequested, Counterparty),
        edge(UnderReview, Approve, Approved, Counterparty),
        edge(UnderReview, Reject, Rejected, Counterparty),
        edge(UnderReview, RequestRevision, RevisionRequested, Counterparty),
        edge(RevisionRequested, Resubmit, Submitted, Owner),
    ],
};

static CONTENT_SUBMISSION: KindTable = KindTable {
    kind: WorkItemKind::ContentSubmission,
    initial: Pending,
    states: &[Pending, Submitted, RevisionRequested, Approved, Rejected],
    editable: &[Pending, RevisionRequested],
    edges: &[
        edge(Pending, Approve, Approved, Counterparty),
        edge(Pending, Reject, Rejected, Counterparty),
        edge(Pending, RequestRevision, RevisionRequested, Counterparty),
        edge(Submitted, Approve, Approved, Counterparty),
        edge(Submitted, Reject, Rejected, Counterparty),
        edge(Submitted, RequestRevision, RevisionRequested, Counterparty),
        edge(RevisionRequested, Resubmit, Submitted, Owner),
    ],
};

static INVOICE: KindTable = KindTable {
    kind: WorkItemKind::Invoice,
    initial: Draft,
    states: &[Draft, Sent, Delayed, Verified, Paid, Voided],
    editable: &[Draft],
    edges: &[
        edge(Draft, Send, Sent, Owner),
        edge(Sent, Approve, Verified, Counterparty),
        edge(Sent, Reject, Voided, Counterparty),
        edge(Sent, Delay, Delayed, Counterparty),
        edge(Delayed, Approve, Verified, Counterparty),
        edge(Verified, MarkPaid, Paid, Counterparty),
    ],
};

static QUOTATION: KindTable = KindTable {
    kind: WorkItemKind::Quotation,
    initial: PendingReview,
    states: &[PendingReview, InProgress, Approved, Rejected],
    editable: &[PendingReview],
    edges: &[
        edge(PendingReview, StartWork, InProgress, Counterparty),
        edge(PendingReview, Reject, Rejected, Counterparty),
        edge(InProgress, Approve, Approved, Counterparty),
        edge(InProgress, Reject, Rejected, Counterparty),
    ],
};

/// The full table for `kind`
pub fn table_for(kind: WorkItemKind) -> &'static KindTable {
    match kind {
        WorkItemKind::SubmissionList => &SUBMISSION_LIST,
        WorkItemKind::ContentSubmission => &CONTENT_SUBMISSION,
        WorkItemKind::Invoice => &INVOICE,
        WorkItemKind::Quotation => &QUOTATION,
    }
}

impl KindTable {
    pub fn edge(&self, state: State, action: Action) -> Option<&'static Edge> {
        self.edges
            .iter()
            .find(|edge| edge.from == state && edge.action == action)
    }

    pub fn contains(&self, state: State) -> bool {
        self.states.contains(&state)
    }

    pub fn is_editable(&self, state: State) -> bool {
        self.editable.contains(&state)
    }

    pub fn is_terminal(&self, state: State) -> bool {
        self.contains(state) && !self.edges.iter().any(|edge| edge.from == state)
    }

    pub fn terminal_states(&self) -> Vec<State> {
        self.states
            .iter()
            .copied()
            .filter(|state| self.is_terminal(*state))
            .collect()
    }
}

/// Actions with an outgoing edge from `state`, in table order
pub fn allowed_actions(kind: WorkItemKind, state: State) -> Vec<Action> {
    table_for(kind)
        .edges
        .iter()
        .filter(|edge| edge.from == state)
        .map(|edge| edge.action)
        .collect()
}

pub fn resulting_state(kind: WorkItemKind, state: State, action: Action) -> Result<State, NotAllowed> {
    table_for(kind)
        .edge(state, action)
        .map(|edge| edge.to)
        .ok_or(NotAllowed { kind, state, action })
}

/// Role allowed to invoke `action` on `kind`, or `None` when the kind has no
/// edge labelled with that action at all
pub fn required_role(kind: WorkItemKind, action: Action) -> Option<Role> {
    table_for(kind)
        .edges
        .iter()
        .find(|edge| edge.action == action)
        .map(|edge| edge.role)
}

pub fn initial_state(kind: WorkItemKind) -> State {
    table_for(kind).initial
}

pub fn states(kind: WorkItemKind) -> &'static [State] {
    table_for(kind).states
}

pub fn editable_states(kind: WorkItemKind) -> &'static [State] {
    table_for(kind).editable
}

pub fn is_editable(kind: WorkItemKind, state: State) -> bool {
    table_for(kind).is_editable(state)
}

pub fn is_terminal(kind: WorkItemKind, state: State) -> bool {
    table_for(kind).is_terminal(state)
}

/// Timestamp written when a work item enters `state`
pub fn timestamp_for(state: State) -> Option<TimestampField> {
    match state {
        Submitted | Sent => Some(TimestampField::Submitted),
        UnderReview | InProgress | RevisionRequested | Delayed => Some(TimestampField::Reviewed),
        Approved | Verified => Some(TimestampField::Approved),
        Rejected | Voided => Some(TimestampField::Rejected),
        Paid => Some(TimestampField::Paid),
        Draft | Pending | PendingReview => None,
    }
}
