// Review engine: the only code path that changes a work item's state,
// version or timestamps. Every mutation is validated against the transition
// table, checked against the caller's expected version and committed through
// the store's compare-and-swap, so a failed call never leaves a partial write.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::concurrency::check_version;
use super::errors::WorkflowError;
use super::line_items::{build_line_item, LineItemInput};
use super::notifications::{LogNotifier, NotificationDispatcher, TransitionNotice};
use super::transition_table::{initial_state, required_role, resulting_state, timestamp_for};
use super::types::{Action, Actor, NewComment, Role, State, TransitionRecord, WorkItem, WorkItemId, WorkItemKind};
use crate::config::ReviewFlowConfig;
use crate::storage::{WorkItemStore, WriteOutcome};
use crate::telemetry::create_workflow_span;

/// Engine knobs taken from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_vat_rate: Decimal,
    pub max_bulk_batch: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ReviewFlowConfig::default())
    }
}

impl From<&ReviewFlowConfig> for EngineSettings {
    fn from(config: &ReviewFlowConfig) -> Self {
        Self {
            default_vat_rate: config.invoices.default_vat_rate,
            max_bulk_batch: config.bulk.max_batch_size,
        }
    }
}

/// Everything needed to open a new work item
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub kind: WorkItemKind,
    pub owner_id: String,
    pub counterparty_id: String,
    pub title: String,
    pub line_items: Vec<LineItemInput>,
}

impl NewWorkItem {
    pub fn new(kind: WorkItemKind, owner_id: impl Into<String>, counterparty_id: impl Into<String>) -> Self {
        Self {
            kind,
            owner_id: owner_id.into(),
            counterparty_id: counterparty_id.into(),
            title: String::new(),
            line_items: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_line_item(mut self, input: LineItemInput) -> Self {
        self.line_items.push(input);
        self
    }
}

/// Optional narrowing for [`ReviewEngine::list`]; empty fields match everything
#[derive(Debug, Clone, Default)]
pub struct WorkItemFilter {
    pub kind: Option<WorkItemKind>,
    pub state: Option<State>,
    /// Matches either the owner or the counterparty
    pub party_id: Option<String>,
}

impl WorkItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        self.kind.is_none_or(|kind| item.kind == kind)
            && self.state.is_none_or(|state| item.state == state)
            && self
                .party_id
                .as_deref()
                .is_none_or(|party| item.owner_id == party || item.counterparty_id == party)
    }
}

pub struct ReviewEngine {
    pub(crate) store: Arc<dyn WorkItemStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    pub(crate) settings: EngineSettings,
}

impl std::fmt::Debug for ReviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ReviewEngine {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(LogNotifier),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Opens a work item in its kind's initial state at version 1
    pub async fn create(&self, request: NewWorkItem) -> Result<WorkItem, WorkflowError> {
        let NewWorkItem {
            kind,
            owner_id,
            counterparty_id,
            title,
            line_items,
        } = request;

        if owner_id.trim().is_empty() || counterparty_id.trim().is_empty() {
            return Err(WorkflowError::validation("owner and counterparty ids are required"));
        }
        if owner_id == counterparty_id {
            return Err(WorkflowError::validation("owner and counterparty must be different parties"));
        }

        let line_items = line_items
            .into_iter()
            .map(|input| build_line_item(kind, input, None, self.settings.default_vat_rate))
            .collect::<Result<Vec<_>, _>>()?;

        let now = Utc::now();
        let item = WorkItem {
            id: WorkItemId::generate(),
            kind,
            title: title.trim().to_string(),
            owner_id,
            counterparty_id,
            state: initial_state(kind),
            version: 1,
            line_items,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            rejected_at: None,
            paid_at: None,
            history: Vec::new(),
        };

        self.store.insert(&item).await?;
        info!(
            work_item.id = %item.id,
            work_item.kind = %kind,
            owner.id = %item.owner_id,
            line_items = item.line_items.len(),
            "Created work item"
        );
        Ok(item)
    }

    /// Current snapshot. Reads never change the version.
    pub async fn get(&self, id: &WorkItemId) -> Result<WorkItem, WorkflowError> {
        self.store
            .fetch(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { id: id.clone() })
    }

    pub async fn list(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>, WorkflowError> {
        let mut items = self.store.list().await?;
        items.retain(|item| filter.matches(item));
        Ok(items)
    }

    /// Moves a work item along one edge of its transition table
    pub async fn transition(
        &self,
        id: &WorkItemId,
        action: Action,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WorkItem, WorkflowError> {
        self.transition_with_note(id, action, expected_version, actor, None).await
    }

    /// Like [`ReviewEngine::transition`], appending `note` to the comment
    /// ledger once the transition is committed
    pub async fn transition_with_note(
        &self,
        id: &WorkItemId,
        action: Action,
        expected_version: u64,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<WorkItem, WorkflowError> {
        let span = create_workflow_span(action.as_str(), Some(id), None, None);
        async move {
            let current = self.get(id).await?;
            tracing::Span::current().record("work_item.kind", current.kind.as_str());

            let result = self.apply_transition(&current, action, expected_version, actor).await;
            let updated = match result {
                Ok(updated) => updated,
                Err(err) => {
                    warn!(
                        action = %action,
                        actor.id = %actor.id,
                        actor.role = %actor.role,
                        state = %current.state,
                        expected_version,
                        error = %err,
                        "Transition rejected"
                    );
                    return Err(err);
                }
            };

            info!(
                from_state = %current.state,
                to_state = %updated.state,
                action = %action,
                actor.id = %actor.id,
                version = updated.version,
                "Work item state transition"
            );

            if let Some(body) = note.map(str::trim).filter(|body| !body.is_empty()) {
                self.append_note(&updated, actor, body).await;
            }
            self.dispatch(&updated, action, actor).await;
            Ok::<_, WorkflowError>(updated)
        }
        .instrument(span)
        .await
    }

    async fn apply_transition(
        &self,
        current: &WorkItem,
        action: Action,
        expected_version: u64,
        actor: &Actor,
    ) -> Result<WorkItem, WorkflowError> {
        authorize_action(current, action, actor)?;
        check_version(current, expected_version)?;
        let next_state =
            resulting_state(current.kind, current.state, action).map_err(|_| WorkflowError::InvalidTransition {
                kind: current.kind,
                state: current.state,
                action,
                version: current.version,
            })?;

        let now = Utc::now();
        let mut next = current.clone();
        next.state = next_state;
        next.version = current.version + 1;
        next.updated_at = now;
        if let Some(field) = timestamp_for(next_state) {
            next.stamp(field, now);
        }
        next.history.push(TransitionRecord {
            from: current.state,
            to: next_state,
            action,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            version: next.version,
            at: now,
        });

        self.commit(expected_version, next).await
    }

    /// Removes a work item that never left its initial state
    pub async fn delete(&self, id: &WorkItemId, actor: &Actor) -> Result<(), WorkflowError> {
        let current = self.get(id).await?;
        authorize_owner(&current, actor, "delete")?;
        if current.state != initial_state(current.kind) {
            return Err(WorkflowError::NotEditable {
                kind: current.kind,
                state: current.state,
                version: current.version,
            });
        }

        match self.store.delete_if_version(id, current.version).await? {
            WriteOutcome::Applied => {
                info!(work_item.id = %id, actor.id = %actor.id, "Deleted work item");
                Ok(())
            }
            WriteOutcome::Conflict {
                current_version,
                current_state,
            } => Err(WorkflowError::StaleVersion {
                expected: current.version,
                current: current_version,
                state: current_state,
            }),
            WriteOutcome::Missing => Err(WorkflowError::NotFound { id: id.clone() }),
        }
    }

    /// Persists `next` iff the stored version is still `expected_version`
    pub(crate) async fn commit(&self, expected_version: u64, next: WorkItem) -> Result<WorkItem, WorkflowError> {
        match self.store.compare_and_swap(expected_version, &next).await? {
            WriteOutcome::Applied => Ok(next),
            WriteOutcome::Conflict {
                current_version,
                current_state,
            } => Err(WorkflowError::StaleVersion {
                expected: expected_version,
                current: current_version,
                state: current_state,
            }),
            WriteOutcome::Missing => Err(WorkflowError::NotFound { id: next.id }),
        }
    }

    async fn append_note(&self, item: &WorkItem, actor: &Actor, body: &str) {
        let comment = NewComment {
            author_id: actor.id.clone(),
            author_role: actor.role,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.append_comment(&item.id, comment).await {
            warn!(work_item.id = %item.id, error = %err, "Transition committed but its note was not recorded");
        }
    }

    async fn dispatch(&self, item: &WorkItem, action: Action, actor: &Actor) {
        let notice = TransitionNotice {
            work_item_id: item.id.clone(),
            kind: item.kind,
            action,
            new_state: item.state,
            actor_id: actor.id.clone(),
            version: item.version,
        };
        if let Err(err) = self.notifier.notify(&notice).await {
            warn!(work_item.id = %item.id, error = %err, "Notification dispatch failed; transition kept");
        }
    }
}

/// Role and identity check for a table action
fn authorize_action(item: &WorkItem, action: Action, actor: &Actor) -> Result<(), WorkflowError> {
    let Some(role) = required_role(item.kind, action) else {
        return Err(WorkflowError::InvalidTransition {
            kind: item.kind,
            state: item.state,
            action,
            version: item.version,
        });
    };
    if role != actor.role {
        return Err(WorkflowError::forbidden(
            item,
            action.as_str(),
            actor.role,
            format!("{action} on a {} requires the {role} role", item.kind),
        ));
    }
    authorize_identity(item, actor, action.as_str())
}

/// Edits and deletes belong to the owner
pub(crate) fn authorize_owner(item: &WorkItem, actor: &Actor, operation: &str) -> Result<(), WorkflowError> {
    if actor.role != Role::Owner {
        return Err(WorkflowError::forbidden(
            item,
            operation,
            actor.role,
            format!("{operation} requires the owner role"),
        ));
    }
    authorize_identity(item, actor, operation)
}

fn authorize_identity(item: &WorkItem, actor: &Actor, operation: &str) -> Result<(), WorkflowError> {
    if item.party_for(actor.role) != actor.id {
        return Err(WorkflowError::forbidden(
            item,
            operation,
            actor.role,
            format!("{} is not the {} of work item {}", actor.id, actor.role, item.id),
        ));
    }
    Ok(())
}
