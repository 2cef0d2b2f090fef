// In-process store. One write lock covers the read-modify-write of a
// compare-and-swap, so concurrent callers on the same version serialize and
// exactly one of them observes a matching version.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{StoreError, WorkItemStore, WriteOutcome};
use crate::workflows::types::{Comment, NewComment, WorkItem, WorkItemId};

#[derive(Debug)]
struct Record {
    item: WorkItem,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<WorkItemId, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn insert(&self, item: &WorkItem) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&item.id) {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        records.insert(
            item.id.clone(),
            Record {
                item: item.clone(),
                comments: Vec::new(),
            },
        );
        debug!(work_item.id = %item.id, "Inserted work item");
        Ok(())
    }

    async fn fetch(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        Ok(self.records.read().await.get(id).map(|record| record.item.clone()))
    }

    async fn list(&self) -> Result<Vec<WorkItem>, StoreError> {
        let records = self.records.read().await;
        let mut items: Vec<WorkItem> = records.values().map(|record| record.item.clone()).collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn compare_and_swap(&self, expected_version: u64, item: &WorkItem) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&item.id) else {
            return Ok(WriteOutcome::Missing);
        };
        if record.item.version != expected_version {
            debug!(
                work_item.id = %item.id,
                expected_version,
                current_version = record.item.version,
                "Compare-and-swap conflict"
            );
            return Ok(WriteOutcome::Conflict {
                current_version: record.item.version,
                current_state: record.item.state,
            });
        }
        record.item = item.clone();
        Ok(WriteOutcome::Applied)
    }

    async fn delete_if_version(&self, id: &WorkItemId, expected_version: u64) -> Result<WriteOutcome, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get(id) else {
            return Ok(WriteOutcome::Missing);
        };
        if record.item.version != expected_version {
            return Ok(WriteOutcome::Conflict {
                current_version: record.item.version,
                current_state: record.item.state,
            });
        }
        records.remove(id);
        Ok(WriteOutcome::Applied)
    }

    async fn append_comment(&self, id: &WorkItemId, comment: NewComment) -> Result<Option<Comment>, StoreError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };
        let comment = comment.into_comment_after(id.clone(), record.comments.last());
        record.comments.push(comment.clone());
        Ok(Some(comment))
    }

    async fn list_comments(&self, id: &WorkItemId) -> Result<Vec<Comment>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(id)
            .map(|record| record.comments.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::types::{Role, State, WorkItemKind};
    use chrono::Utc;
    use std::sync::Arc;

    fn item(id: &str) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: WorkItemId::from(id),
            kind: WorkItemKind::ContentSubmission,
            title: String::new(),
            owner_id: "creator-1".to_string(),
            counterparty_id: "brand-1".to_string(),
            state: State::Pending,
            version: 1,
            line_items: vec![],
            created_at: now,
            updated_at: now,
            submitted_at: None,
            reviewed_at: None,
            approved_at: None,
            rejected_at: None,
            paid_at: None,
            history: vec![],
        }
    }

    #[tokio::test]
    async fn test_only_one_concurrent_swap_wins() {
        let store = Arc::new(MemoryStore::new());
        let original = item("cs-1");
        store.insert(&original).await.unwrap();

        let mut handles = Vec::new();
        for state in [State::Approved, State::Rejected, State::RevisionRequested] {
            let store = store.clone();
            let mut next = original.clone();
            next.state = state;
            next.version = 2;
            handles.push(tokio::spawn(async move { store.compare_and_swap(1, &next).await.unwrap() }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == WriteOutcome::Applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(store.fetch(&original.id).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_missing_items_and_comment_ledgers() {
        let store = MemoryStore::new();
        let ghost = item("ghost");
        assert_eq!(store.compare_and_swap(1, &ghost).await.unwrap(), WriteOutcome::Missing);

        let draft = NewComment {
            author_id: "brand-1".to_string(),
            author_role: Role::Counterparty,
            body: "hello".to_string(),
            created_at: Utc::now(),
        };
        assert!(store.append_comment(&ghost.id, draft).await.unwrap().is_none());
        assert!(store.list_comments(&ghost.id).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }
}
