use clap::{Args, Parser, Subcommand};
use review_flow::workflows::types::{Action, LineItemId, Role, State, WorkItemId, WorkItemKind};
use review_flow::workflows::LineItemInput;

pub mod commands;

#[derive(Parser)]
#[command(name = "review-flow")]
#[command(about = "Review workflows for agency work items")]
#[command(long_about = "review-flow moves submission lists, content submissions, invoices and quotations \
                       through their review lifecycles. Every mutation carries the version the caller last \
                       saw; outdated versions are rejected instead of overwriting newer changes.")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who is performing the operation
#[derive(Args, Debug, Clone)]
pub struct ActorArgs {
    /// Caller identity as issued by the auth provider
    #[arg(long = "actor")]
    pub actor_id: String,
    /// Side of the review the caller acts on (owner or counterparty)
    #[arg(long, default_value = "owner")]
    pub role: Role,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a work item in its kind's initial state
    Create {
        #[arg(long)]
        kind: WorkItemKind,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        counterparty: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Line item as JSON, e.g. '{"reference_id":"inf-1","details":{"type":"roster"}}'
        #[arg(long = "line", value_parser = parse_line_item)]
        lines: Vec<LineItemInput>,
    },
    /// Print a work item snapshot
    Show { id: WorkItemId },
    /// List work items, optionally filtered
    List {
        #[arg(long)]
        kind: Option<WorkItemKind>,
        #[arg(long)]
        state: Option<State>,
        /// Owner or counterparty id
        #[arg(long)]
        party: Option<String>,
    },
    /// Apply an action to a work item
    Transition {
        id: WorkItemId,
        action: Action,
        /// Version the caller last saw. When omitted the current version is
        /// read and the call is retried on version conflicts.
        #[arg(long)]
        version: Option<u64>,
        #[command(flatten)]
        actor: ActorArgs,
        /// Comment appended after the transition succeeds
        #[arg(long)]
        note: Option<String>,
    },
    /// Apply one action to many work items
    Bulk {
        action: Action,
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<WorkItemId>,
        /// Expected version for an item, as ID=VERSION; may be repeated
        #[arg(long = "expect", value_parser = parse_expected_version)]
        expected: Vec<(WorkItemId, u64)>,
        #[command(flatten)]
        actor: ActorArgs,
        /// Comment appended to every transitioned item
        #[arg(long)]
        note: Option<String>,
    },
    /// Add a line item to an editable work item
    AddLine {
        id: WorkItemId,
        #[arg(long)]
        version: u64,
        #[arg(long = "line", value_parser = parse_line_item)]
        line: LineItemInput,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Replace a line item's content
    UpdateLine {
        id: WorkItemId,
        line_item: LineItemId,
        #[arg(long)]
        version: u64,
        #[arg(long = "line", value_parser = parse_line_item)]
        line: LineItemInput,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Remove a line item
    RemoveLine {
        id: WorkItemId,
        line_item: LineItemId,
        #[arg(long)]
        version: u64,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Delete a work item that is still in its initial state
    Delete {
        id: WorkItemId,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Append a comment
    Comment {
        id: WorkItemId,
        #[arg(long)]
        body: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print a work item's comments in order
    Comments { id: WorkItemId },
    /// Print transition tables
    Table {
        #[arg(long)]
        kind: Option<WorkItemKind>,
    },
}

fn parse_line_item(value: &str) -> Result<LineItemInput, String> {
    serde_json::from_str(value).map_err(|e| format!("invalid line item JSON: {e}"))
}

fn parse_expected_version(value: &str) -> Result<(WorkItemId, u64), String> {
    let (id, version) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VERSION, got '{value}'"))?;
    let version = version
        .parse::<u64>()
        .map_err(|e| format!("invalid version in '{value}': {e}"))?;
    Ok((WorkItemId::from(id), version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_transition_with_actor() {
        let cli = Cli::try_parse_from([
            "review-flow",
            "transition",
            "wi-1",
            "request-revision",
            "--version",
            "4",
            "--actor",
            "brand-1",
            "--role",
            "counterparty",
        ])
        .unwrap();
        match cli.command {
            Commands::Transition {
                action, version, actor, ..
            } => {
                assert_eq!(action, Action::RequestRevision);
                assert_eq!(version, Some(4));
                assert_eq!(actor.role, Role::Counterparty);
            }
            _ => panic!("expected transition"),
        }
    }

    #[test]
    fn test_parses_bulk_expectations() {
        let cli = Cli::try_parse_from([
            "review-flow",
            "bulk",
            "approve",
            "--ids",
            "a,b",
            "--expect",
            "a=3",
            "--actor",
            "brand-1",
            "--role",
            "counterparty",
        ])
        .unwrap();
        match cli.command {
            Commands::Bulk { ids, expected, .. } => {
                assert_eq!(ids.len(), 2);
                assert_eq!(expected, vec![(WorkItemId::from("a"), 3)]);
            }
            _ => panic!("expected bulk"),
        }
        assert!(parse_expected_version("a:3").is_err());
    }
}
