use anyhow::Result;

use super::{print_json, Command};
use crate::cli::ActorArgs;
use review_flow::workflows::types::WorkItemId;
use review_flow::workflows::ReviewEngine;

pub struct CommentCommand {
    pub id: WorkItemId,
    pub body: String,
    pub actor: ActorArgs,
}

impl Command for CommentCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        let comment = engine
            .add_comment(&self.id, &self.actor.actor_id, self.actor.role, &self.body)
            .await?;
        print_json(&comment)
    }
}

pub struct CommentsCommand {
    pub id: WorkItemId,
}

impl Command for CommentsCommand {
    async fn execute(&self, engine: &ReviewEngine) -> Result<()> {
        print_json(&engine.list_comments(&self.id).await?)
    }
}
