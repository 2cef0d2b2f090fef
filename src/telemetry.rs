use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::workflows::types::{WorkItemId, WorkItemKind};

/// Initialize tracing with structured logging.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
    }

    tracing::debug!("review-flow telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span carrying the work item being operated on
pub fn create_workflow_span(
    operation: &str,
    work_item_id: Option<&WorkItemId>,
    kind: Option<WorkItemKind>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "review_workflow",
        operation = operation,
        work_item.id = work_item_id.map(|id| id.as_str()),
        work_item.kind = kind.map(|kind| kind.as_str()),
        correlation.id = correlation_id,
    )
}
