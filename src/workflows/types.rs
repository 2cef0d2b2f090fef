// Work item domain types shared by the transition table, the engine and the stores

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a work item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub String);

impl WorkItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WorkItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of a line item, unique within its parent work item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub String);

impl LineItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for LineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LineItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Error returned when a kind/state/action/role name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value}")]
pub struct ParseNameError {
    pub what: &'static str,
    pub value: String,
}

// Lower-cased name with separators removed, so "request-revision",
// "request_revision" and "requestRevision" all compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The reviewable entities handled by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    /// Talent shortlist sent to a brand
    SubmissionList,
    /// Post awaiting brand or staff sign-off
    ContentSubmission,
    /// Creator payment request
    Invoice,
    /// Brand pricing request
    Quotation,
}

impl WorkItemKind {
    pub const ALL: [WorkItemKind; 4] = [
        WorkItemKind::SubmissionList,
        WorkItemKind::ContentSubmission,
        WorkItemKind::Invoice,
        WorkItemKind::Quotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemKind::SubmissionList => "submission_list",
            WorkItemKind::ContentSubmission => "content_submission",
            WorkItemKind::Invoice => "invoice",
            WorkItemKind::Quotation => "quotation",
        }
    }
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemKind {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|kind| normalize(kind.as_str()) == wanted)
            .ok_or_else(|| ParseNameError {
                what: "work item kind",
                value: s.to_string(),
            })
    }
}

/// Every state used by any kind. Which ones are valid for a given kind is
/// decided by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Draft,
    Pending,
    PendingReview,
    Submitted,
    Sent,
    UnderReview,
    InProgress,
    RevisionRequested,
    Delayed,
    Approved,
    Verified,
    Paid,
    Rejected,
    Voided,
}

impl State {
    pub const ALL: [State; 14] = [
        State::Draft,
        State::Pending,
        State::PendingReview,
        State::Submitted,
        State::Sent,
        State::UnderReview,
        State::InProgress,
        State::RevisionRequested,
        State::Delayed,
        State::Approved,
        State::Verified,
        State::Paid,
        State::Rejected,
        State::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Draft => "DRAFT",
            State::Pending => "PENDING",
            State::PendingReview => "PENDING_REVIEW",
            State::Submitted => "SUBMITTED",
            State::Sent => "SENT",
            State::UnderReview => "UNDER_REVIEW",
            State::InProgress => "IN_PROGRESS",
            State::RevisionRequested => "REVISION_REQUESTED",
            State::Delayed => "DELAYED",
            State::Approved => "APPROVED",
            State::Verified => "VERIFIED",
            State::Paid => "PAID",
            State::Rejected => "REJECTED",
            State::Voided => "VOIDED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|state| normalize(state.as_str()) == wanted)
            .ok_or_else(|| ParseNameError {
                what: "state",
                value: s.to_string(),
            })
    }
}

/// Actions that move a work item along an edge of its transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Submit,
    Resubmit,
    Send,
    StartReview,
    StartWork,
    Approve,
    Reject,
    RequestRevision,
    Delay,
    MarkPaid,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Submit,
        Action::Resubmit,
        Action::Send,
        Action::StartReview,
        Action::StartWork,
        Action::Approve,
        Action::Reject,
        Action::RequestRevision,
        Action::Delay,
        Action::MarkPaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Submit => "submit",
            Action::Resubmit => "resubmit",
            Action::Send => "send",
            Action::StartReview => "startReview",
            Action::StartWork => "startWork",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::RequestRevision => "requestRevision",
            Action::Delay => "delay",
            Action::MarkPaid => "markPaid",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|action| normalize(action.as_str()) == wanted)
            .ok_or_else(|| ParseNameError {
                what: "action",
                value: s.to_string(),
            })
    }
}

/// The side of the review an actor is acting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Drafts, edits and submits the work item
    Owner,
    /// Reviews the work item and resolves it
    Counterparty,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Counterparty => "counterparty",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "owner" => Ok(Role::Owner),
            "counterparty" | "reviewer" => Ok(Role::Counterparty),
            _ => Err(ParseNameError {
                what: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Caller identity as supplied by the auth provider. The engine never
/// authenticates it, it only authorizes against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn owner(id: impl Into<String>) -> Self {
        Self::new(id, Role::Owner)
    }

    pub fn counterparty(id: impl Into<String>) -> Self {
        Self::new(id, Role::Counterparty)
    }
}

/// Lifecycle timestamps a transition may stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampField {
    Submitted,
    Reviewed,
    Approved,
    Rejected,
    Paid,
}

/// Priced invoice line with its derived VAT fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialLine {
    pub price: Decimal,
    pub vat_applicable: bool,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

/// Kind-specific payload of a line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItemDetails {
    /// Shortlisted talent, optionally priced
    Roster { price: Option<Decimal> },
    /// Submitted content with its reported metrics
    Asset {
        content_url: String,
        #[serde(default)]
        metrics: BTreeMap<String, u64>,
    },
    Financial(FinancialLine),
}

/// Sub-resource owned by exactly one work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    /// Referenced entity, usually the influencer id
    pub reference_id: String,
    pub notes: Option<String>,
    pub details: LineItemDetails,
}

/// Audit entry appended for every accepted transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub to: State,
    pub action: Action,
    pub actor_id: String,
    pub actor_role: Role,
    /// Version the work item reached through this transition
    pub version: u64,
    pub at: DateTime<Utc>,
}

/// The mutable record owned by the work item store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub kind: WorkItemKind,
    #[serde(default)]
    pub title: String,
    pub owner_id: String,
    pub counterparty_id: String,
    pub state: State,
    pub version: u64,
    pub line_items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl WorkItem {
    pub fn timestamp(&self, field: TimestampField) -> Option<DateTime<Utc>> {
        match field {
            TimestampField::Submitted => self.submitted_at,
            TimestampField::Reviewed => self.reviewed_at,
            TimestampField::Approved => self.approved_at,
            TimestampField::Rejected => self.rejected_at,
            TimestampField::Paid => self.paid_at,
        }
    }

    /// Sets the timestamp only if it is still empty. Returns whether it was written.
    pub fn stamp(&mut self, field: TimestampField, at: DateTime<Utc>) -> bool {
        let slot = match field {
            TimestampField::Submitted => &mut self.submitted_at,
            TimestampField::Reviewed => &mut self.reviewed_at,
            TimestampField::Approved => &mut self.approved_at,
            TimestampField::Rejected => &mut self.rejected_at,
            TimestampField::Paid => &mut self.paid_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }

    /// The party id an actor in `role` must present
    pub fn party_for(&self, role: Role) -> &str {
        match role {
            Role::Owner => &self.owner_id,
            Role::Counterparty => &self.counterparty_id,
        }
    }

    pub fn line_item(&self, id: &LineItemId) -> Option<&LineItem> {
        self.line_items.iter().find(|item| &item.id == id)
    }

    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.last()
    }
}

/// Immutable note attached to a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub work_item_id: WorkItemId,
    pub author_id: String,
    pub author_role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Store-assigned append position, strictly increasing per work item
    pub sequence: u64,
}

/// Comment as handed to a store before it is given an id and a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub author_id: String,
    pub author_role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl NewComment {
    /// Turns the draft into the ledger entry that follows `previous`.
    ///
    /// The sequence is one past the previous entry and `created_at` never
    /// goes backwards, so ordering by `(created_at, sequence)` is append order
    /// even if the wall clock steps back between two appends.
    pub fn into_comment_after(self, work_item_id: WorkItemId, previous: Option<&Comment>) -> Comment {
        let (sequence, created_at) = match previous {
            Some(last) => (last.sequence + 1, self.created_at.max(last.created_at)),
            None => (1, self.created_at),
        };
        Comment {
            id: CommentId::generate(),
            work_item_id,
            author_id: self.author_id,
            author_role: self.author_role,
            body: self.body,
            created_at,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_in_any_separator_style() {
        assert_eq!("requestRevision".parse::<Action>().unwrap(), Action::RequestRevision);
        assert_eq!("request-revision".parse::<Action>().unwrap(), Action::RequestRevision);
        assert_eq!("MARK_PAID".parse::<Action>().unwrap(), Action::MarkPaid);
        assert_eq!("revision_requested".parse::<State>().unwrap(), State::RevisionRequested);
        assert_eq!("content-submission".parse::<WorkItemKind>().unwrap(), WorkItemKind::ContentSubmission);
        assert_eq!("reviewer".parse::<Role>().unwrap(), Role::Counterparty);
        assert!("archive".parse::<Action>().is_err());
    }

    #[test]
    fn test_comment_time_never_precedes_the_previous_entry() {
        let previous = NewComment {
            author_id: "brand-1".to_string(),
            author_role: Role::Counterparty,
            body: "first".to_string(),
            created_at: Utc::now(),
        }
        .into_comment_after(WorkItemId::from("list-1"), None);
        assert_eq!(previous.sequence, 1);

        // Wall clock stepped back between the two appends
        let earlier = previous.created_at - chrono::Duration::seconds(30);
        let next = NewComment {
            author_id: "staff-1".to_string(),
            author_role: Role::Owner,
            body: "second".to_string(),
            created_at: earlier,
        }
        .into_comment_after(WorkItemId::from("list-1"), Some(&previous));
        assert_eq!(next.sequence, 2);
        assert_eq!(next.created_at, previous.created_at);
        assert_ne!(next.id, previous.id);

        // A later clock is kept as is
        let later = previous.created_at + chrono::Duration::seconds(5);
        let third = NewComment {
            author_id: "staff-1".to_string(),
            author_role: Role::Owner,
            body: "third".to_string(),
            created_at: later,
        }
        .into_comment_after(WorkItemId::from("list-1"), Some(&next));
        assert_eq!((third.sequence, third.created_at), (3, later));
    }

    #[test]
    fn test_serde_names_match_display() {
        for state in State::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
        for action in Action::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    #[test]
    fn test_stamp_writes_once() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(5);
        let mut item = WorkItem {
            id: WorkItemId::from("wi-1"),
            kind: WorkItemKind::Invoice,
            title: String::new(),
            owner_id: "creator".to_string(),
            counterparty_id: "agency".to_string(),
            state: State::Draft,
            version: 1,
            line_items: vec![],
            created_at: now,
            updated_at: now,
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            rejected_at: None,
            paid_at: None,
            history: vec![],
        };

        assert!(item.stamp(TimestampField::Submitted, now));
        assert!(!item.stamp(TimestampField::Submitted, later));
        assert_eq!(item.timestamp(TimestampField::Submitted), Some(now));
        assert_eq!(item.party_for(Role::Counterparty), "agency");
    }
}
