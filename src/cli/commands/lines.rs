use anyhow::Result;

use super::{print_json, Command};
use crate::cli::ActorArgs;
use review_flow::workflows::types::{Actor, LineItemId, WorkItemId};
use review_flow::workflows::{LineItemInput, ReviewEngine};

/// add-line, update-line and remove-line
pub enum LineEdit {
    Add(LineItemInput),
    Update(LineItemId, LineItemInput),
    Remove(LineItemId),
}

pub struct LineCommand {
    pub id: WorkItemId,
    pub version: u64,
    pub edit: LineEdit,
    pub actor: ActorArgs,
}

impl Command for LineCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let actor = Actor::new(&self.actor.actor_id, self.actor.role);
        let item = match &self.edit {
            LineEdit::Add(input) => engine.add_line_item(&self.id, input.clone(), self.version, &actor).await?,
            LineEdit::Update(line_item_id, input) => {
                engine
                    .update_line_item(&self.id, line_item_id, input.clone(), self.version, &actor)
                    .await?
            }
            LineEdit::Remove(line_item_id) => {
                engine
                    .remove_line_item(&self.id, line_item_id, self.version, &actor)
                    .await?
            }
        };
        print_json(&item)
    }
}
