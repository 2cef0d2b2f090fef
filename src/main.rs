use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::comments::{CommentCommand, CommentsCommand};
use cli::commands::items::{CreateCommand, DeleteCommand, ListCommand, ShowCommand};
use cli::commands::lines::{LineCommand, LineEdit};
use cli::commands::table::TableCommand;
use cli::commands::transition::{BulkCommand, TransitionCommand};
use cli::commands::{open_engine, Command};
use cli::{Cli, Commands};
use review_flow::config::{config, ReviewFlowConfig};
use review_flow::telemetry::init_telemetry;
use review_flow::workflows::RetryPolicy;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?;

    let mut observability = config.observability.clone();
    observability.json_logs |= cli.json_logs;
    init_telemetry(&observability)?;

    tokio::runtime::Runtime::new()?.block_on(async { run(cli.command, config).await })
}

async fn run(command: Commands, config: &ReviewFlowConfig) -> Result<()> {
    let engine = open_engine(config).await?;

    match command {
        Commands::Create {
            kind,
            owner,
            counterparty,
            title,
            lines,
        } => {
            CreateCommand {
                kind,
                owner,
                counterparty,
                title,
                lines,
            }
            .execute(&engine)
            .await
        }
        Commands::Show { id } => ShowCommand { id }.execute(&engine).await,
        Commands::List { kind, state, party } => ListCommand { kind, state, party }.execute(&engine).await,
        Commands::Transition {
            id,
            action,
            version,
            actor,
            note,
        } => {
            TransitionCommand {
                id,
                action,
                version,
                actor,
                note,
                retry: RetryPolicy::from(&config.concurrency),
            }
            .execute(&engine)
            .await
        }
        Commands::Bulk {
            action,
            ids,
            expected,
            actor,
            note,
        } => {
            BulkCommand {
                action,
                ids,
                expected,
                actor,
                note,
            }
            .execute(&engine)
            .await
        }
        Commands::AddLine {
            id,
            version,
            line,
            actor,
        } => {
            LineCommand {
                id,
                version,
                edit: LineEdit::Add(line),
                actor,
            }
            .execute(&engine)
            .await
        }
        Commands::UpdateLine {
            id,
            line_item,
            version,
            line,
            actor,
        } => {
            LineCommand {
                id,
                version,
                edit: LineEdit::Update(line_item, line),
                actor,
            }
            .execute(&engine)
            .await
        }
        Commands::RemoveLine {
            id,
            line_item,
            version,
            actor,
        } => {
            LineCommand {
                id,
                version,
                edit: LineEdit::Remove(line_item),
                actor,
            }
            .execute(&engine)
            .await
        }
        Commands::Delete { id, actor } => DeleteCommand { id, actor }.execute(&engine).await,
        Commands::Comment { id, body, actor } => CommentCommand { id, body, actor }.execute(&engine).await,
        Commands::Comments { id } => CommentsCommand { id }.execute(&engine).await,
        Commands::Table { kind } => TableCommand { kind }.execute(&engine).await,
    }
}
