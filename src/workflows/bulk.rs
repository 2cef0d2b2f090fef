// Bulk transitions: one action applied to many work items, each one
// committed or rejected on its own. There is no cross-item atomicity and
// successes are never rolled back.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, Instrument};

use super::engine::ReviewEngine;
use super::errors::{ErrorKind, WorkflowError};
use super::types::{Action, Actor, State, WorkItem, WorkItemId};
use crate::telemetry::{create_workflow_span, generate_correlation_id};

/// Notes appended to each transitioned item's comment ledger
#[derive(Debug, Clone, Default)]
pub enum BulkNotes {
    #[default]
    None,
    /// Same note on every item
    Shared(String),
    /// Note per item; items without an entry get none
    PerItem(HashMap<WorkItemId, String>),
}

impl BulkNotes {
    fn for_item(&self, id: &WorkItemId) -> Option<&str> {
        match self {
            BulkNotes::None => None,
            BulkNotes::Shared(note) => Some(note.as_str()),
            BulkNotes::PerItem(notes) => notes.get(id).map(String::as_str),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub ids: Vec<WorkItemId>,
    pub action: Action,
    pub actor: Actor,
    pub notes: BulkNotes,
    /// Versions the caller observed. Items missing from the map are
    /// transitioned from whatever version is read at processing time.
    pub expected_versions: HashMap<WorkItemId, u64>,
}

impl BulkRequest {
    pub fn new(ids: Vec<WorkItemId>, action: Action, actor: Actor) -> Self {
        Self {
            ids,
            action,
            actor,
            notes: BulkNotes::None,
            expected_versions: HashMap::new(),
        }
    }

    pub fn with_notes(mut self, notes: BulkNotes) -> Self {
        self.notes = notes;
        self
    }

    pub fn expecting(mut self, id: WorkItemId, version: u64) -> Self {
        self.expected_versions.insert(id, version);
        self
    }
}

/// Per-item outcome of a bulk transition
#[derive(Debug)]
pub struct BulkReport {
    pub action: Action,
    pub results: BTreeMap<WorkItemId, Result<WorkItem, WorkflowError>>,
}

/// Serializable line of a [`BulkReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub id: WorkItemId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkReport {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|result| result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn error_kind(&self, id: &WorkItemId) -> Option<ErrorKind> {
        match self.results.get(id)? {
            Ok(_) => None,
            Err(err) => Some(err.kind()),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&WorkItemId, &WorkflowError)> {
        self.results
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|err| (id, err)))
    }

    pub fn outcomes(&self) -> Vec<BulkOutcome> {
        self.results
            .iter()
            .map(|(id, result)| match result {
                Ok(item) => BulkOutcome {
                    id: id.clone(),
                    ok: true,
                    state: Some(item.state),
                    version: Some(item.version),
                    error_kind: None,
                    error: None,
                },
                Err(err) => BulkOutcome {
                    id: id.clone(),
                    ok: false,
                    state: None,
                    version: None,
                    error_kind: Some(err.kind()),
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }
}

impl ReviewEngine {
    /// Applies `request.action` to every listed work item concurrently.
    ///
    /// Duplicate ids are processed once. Only an oversized batch fails the
    /// whole call; every other problem is reported per item.
    pub async fn bulk_transition(&self, request: BulkRequest) -> Result<BulkReport, WorkflowError> {
        let BulkRequest {
            ids,
            action,
            actor,
            notes,
            expected_versions,
        } = request;

        let mut seen = BTreeSet::new();
        let ids: Vec<WorkItemId> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        if ids.len() > self.settings.max_bulk_batch {
            return Err(WorkflowError::validation(format!(
                "bulk request has {} work items, the limit is {}",
                ids.len(),
                self.settings.max_bulk_batch
            )));
        }

        let correlation_id = generate_correlation_id();
        let span = create_workflow_span("bulk_transition", None, None, Some(&correlation_id));

        async {
            let tasks = ids.iter().map(|id| {
                let expected = expected_versions.get(id).copied();
                let note = notes.for_item(id);
                let actor = &actor;
                async move {
                    let result = match expected {
                        Some(version) => self.transition_with_note(id, action, version, actor, note).await,
                        None => match self.get(id).await {
                            Ok(current) => {
                                self.transition_with_note(id, action, current.version, actor, note)
                                    .await
                            }
                            Err(err) => Err(err),
                        },
                    };
                    (id.clone(), result)
                }
            });

            let report = BulkReport {
                action,
                results: join_all(tasks).await.into_iter().collect(),
            };
            info!(
                action = %action,
                actor.id = %actor.id,
                requested = report.results.len(),
                succeeded = report.succeeded(),
                failed = report.failed(),
                "Bulk transition finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::workflows::engine::{EngineSettings, NewWorkItem};
    use crate::workflows::types::WorkItemKind;
    use std::sync::Arc;

    async fn content(engine: &ReviewEngine, n: usize) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for _ in 0..n {
            items.push(
                engine
                    .create(NewWorkItem::new(WorkItemKind::ContentSubmission, "creator-1", "brand-1"))
                    .await
                    .unwrap(),
            );
        }
        items
    }

    #[tokio::test]
    async fn test_partial_success_is_not_rolled_back() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
        let items = content(&engine, 3).await;
        let brand = Actor::counterparty("brand-1");

        // Push the middle item into a state where approve is illegal
        engine
            .transition(&items[1].id, Action::RequestRevision, 1, &brand)
            .await
            .unwrap();

        let ids = items.iter().map(|item| item.id.clone()).collect();
        let report = engine
            .bulk_transition(
                BulkRequest::new(ids, Action::Approve, brand.clone()).with_notes(BulkNotes::Shared("looks great".into())),
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.error_kind(&items[1].id), Some(ErrorKind::InvalidTransition));

        for index in [0, 2] {
            let stored = engine.get(&items[index].id).await.unwrap();
            assert_eq!(stored.state, State::Approved);
            assert_eq!(stored.version, 2);
            assert_eq!(engine.list_comments(&stored.id).await.unwrap().len(), 1);
        }
        let untouched = engine.get(&items[1].id).await.unwrap();
        assert_eq!(untouched.state, State::RevisionRequested);
        assert!(engine.list_comments(&untouched.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expected_versions_and_missing_ids_are_reported() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new()));
        let items = content(&engine, 2).await;
        let missing = WorkItemId::from("missing");

        let request = BulkRequest::new(
            vec![items[0].id.clone(), items[1].id.clone(), missing.clone(), items[0].id.clone()],
            Action::Reject,
            Actor::counterparty("brand-1"),
        )
        .expecting(items[1].id.clone(), 5);

        let report = engine.bulk_transition(request).await.unwrap();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.error_kind(&items[1].id), Some(ErrorKind::StaleVersion));
        assert_eq!(report.error_kind(&missing), Some(ErrorKind::NotFound));
        assert_eq!(report.failures().count(), 2);

        let outcomes = report.outcomes();
        let first = outcomes.iter().find(|o| o.id == items[0].id).unwrap();
        assert_eq!(first.state, Some(State::Rejected));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_up_front() {
        let engine = ReviewEngine::new(Arc::new(MemoryStore::new())).with_settings(EngineSettings {
            max_bulk_batch: 2,
            ..EngineSettings::default()
        });
        let items = content(&engine, 3).await;
        let ids = items.iter().map(|item| item.id.clone()).collect();

        let err = engine
            .bulk_transition(BulkRequest::new(ids, Action::Approve, Actor::counterparty("brand-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
        for item in items {
            assert_eq!(engine.get(&item.id).await.unwrap().version, 1);
        }
    }
}
