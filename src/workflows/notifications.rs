// Notification seam invoked after a transition has been committed.
//
// Delivery (email, toast, webhook) lives outside the engine. A failing
// dispatcher is logged and otherwise ignored: the transition stays applied.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::types::{Action, State, WorkItemId, WorkItemKind};

/// What happened, as handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub work_item_id: WorkItemId,
    pub kind: WorkItemKind,
    pub action: Action,
    pub new_state: State,
    pub actor_id: String,
    pub version: u64,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notice: &TransitionNotice) -> anyhow::Result<()>;
}

/// Writes every notice to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(&self, notice: &TransitionNotice) -> anyhow::Result<()> {
        info!(
            work_item.id = %notice.work_item_id,
            work_item.kind = %notice.kind,
            action = %notice.action,
            new_state = %notice.new_state,
            actor.id = %notice.actor_id,
            version = notice.version,
            "Work item transitioned"
        );
        Ok(())
    }
}
