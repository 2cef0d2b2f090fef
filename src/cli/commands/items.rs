use anyhow::Result;

use super::{print_json, Command};
use crate::cli::ActorArgs;
use review_flow::workflows::types::{Actor, State, WorkItemId, WorkItemKind};
use review_flow::workflows::{LineItemInput, NewWorkItem, ReviewEngine, WorkItemFilter};

pub struct CreateCommand {
    pub kind: WorkItemKind,
    pub owner: String,
    pub counterparty: String,
    pub title: String,
    pub lines: Vec<LineItemInput>,
}

impl Command for CreateCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let mut request = NewWorkItem::new(self.kind, &self.owner, &self.counterparty).with_title(&self.title);
        for line in &self.lines {
            request = request.with_line_item(line.clone());
        }
        let item = engine.create(request).await?;
        print_json(&item)
    }
}

pub struct ShowCommand {
    pub id: WorkItemId,
}

impl Command for ShowCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        print_json(&engine.get(&self.id).await?)
    }
}

pub struct ListCommand {
    pub kind: Option<WorkItemKind>,
    pub state: Option<State>,
    pub party: Option<String>,
}

impl Command for ListCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let filter = WorkItemFilter {
            kind: self.kind,
            state: self.state,
            party_id: self.party.clone(),
        };
        print_json(&engine.list(&filter).await?)
    }
}

pub struct DeleteCommand {
    pub id: WorkItemId,
    pub actor: ActorArgs,
}

impl Command for DeleteCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let actor = Actor::new(&self.actor.actor_id, self.actor.role);
        engine.delete(&self.id, &actor).await?;
        print_json(&serde_json::json!({ "deleted": self.id }))
    }
}
