use anyhow::Result;
use std::collections::HashMap;

use super::{print_json, Command};
use crate::cli::ActorArgs;
use review_flow::workflows::types::{Action, Actor, WorkItemId};
use review_flow::workflows::{retry_on_stale, BulkNotes, BulkRequest, ReviewEngine, RetryPolicy};

pub struct TransitionCommand {
    pub id: WorkItemId,
    pub action: Action,
    pub version: Option<u64>,
    pub actor: ActorArgs,
    pub note: Option<String>,
    pub retry: RetryPolicy,
}

impl Command for TransitionCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let actor = Actor::new(&self.actor.actor_id, self.actor.role);
        let note = self.note.as_deref();

        let item = match self.version {
            Some(version) => {
                engine
                    .transition_with_note(&self.id, self.action, version, &actor, note)
                    .await?
            }
            // No observed version: read it fresh on every attempt
            None => {
                retry_on_stale(&self.retry, |_| {
                    let actor = &actor;
                    async move {
                        let current = engine.get(&self.id).await?;
                        engine
                            .transition_with_note(&self.id, self.action, current.version, actor, note)
                            .await
                    }
                })
                .await?
            }
        };
        print_json(&item)
    }
}

pub struct BulkCommand {
    pub action: Action,
    pub ids: Vec<WorkItemId>,
    pub expected: Vec<(WorkItemId, u64)>,
    pub actor: ActorArgs,
    pub note: Option<String>,
}

impl Command for BulkCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let actor = Actor::new(&self.actor.actor_id, self.actor.role);
        let mut request = BulkRequest::new(self.ids.clone(), self.action, actor);
        request.expected_versions = self.expected.iter().cloned().collect::<HashMap<_, _>>();
        if let Some(note) = &self.note {
            request = request.with_notes(BulkNotes::Shared(note.clone()));
        }

        let report = engine.bulk_transition(request).await?;
        print_json(&serde_json::json!({
            "action": report.action,
            "succeeded": report.succeeded(),
            "failed": report.failed(),
            "results": report.outcomes(),
        }))
    }
}
