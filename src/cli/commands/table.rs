use anyhow::Result;

use super::{print_json, Command};
use review_flow::workflows::transition_table::{table_for, KindTable};
use review_flow::workflows::types::WorkItemKind;
use review_flow::workflows::ReviewEngine;

pub struct TableCommand {
    pub kind: Option<WorkItemKind>,
}

impl Command for TableCommand {
    async fn execute(&self, _engine: &ReviewEngine) -> Result<()> {
        let tables: Vec<&KindTable> = match self.kind {
            Some(kind) => vec![table_for(kind)],
            None => WorkItemKind::ALL.into_iter().map(table_for).collect(),
        };
        print_json(&tables)
    }
}
