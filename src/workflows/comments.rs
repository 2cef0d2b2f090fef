// Append-only comment ledger. Comments are allowed in every state and never
// bump the work item version.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::engine::ReviewEngine;
use super::errors::WorkflowError;
use super::types::{Comment, NewComment, Role, WorkItemId};

/// Ordered snapshot of a work item's comments.
///
/// Iterating never consumes the trail, so callers can walk it as often as
/// they like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CommentTrail {
    comments: Vec<Comment>,
}

impl CommentTrail {
    fn new(mut comments: Vec<Comment>) -> Self {
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        Self { comments }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Comment> {
        self.comments.iter()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn last(&self) -> Option<&Comment> {
        self.comments.last()
    }
}

impl<'a> IntoIterator for &'a CommentTrail {
    type Item = &'a Comment;
    type IntoIter = std::slice::Iter<'a, Comment>;

    fn into_iter(self) -> Self::IntoIter {
        self.comments.iter()
    }
}

impl ReviewEngine {
    pub async fn add_comment(
        &self,
        id: &WorkItemId,
        author_id: &str,
        author_role: Role,
        body: &str,
    ) -> Result<Comment, WorkflowError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(WorkflowError::validation("comment body must not be empty"));
        }
        if author_id.trim().is_empty() {
            return Err(WorkflowError::validation("comment author must not be empty"));
        }

        let draft = NewComment {
            author_id: author_id.to_string(),
            author_role,
            body: body.to_string(),
            created_at: Utc::now(),
        };
        let comment = self
            .store
            .append_comment(id, draft)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { id: id.clone() })?;

        info!(
            work_item.id = %id,
            author.id = %comment.author_id,
            sequence = comment.sequence,
            "Comment added"
        );
        Ok(comment)
    }

    pub async fn list_comments(&self, id: &WorkItemId) -> Result<CommentTrail, WorkflowError> {
        // Distinguish "no comments yet" from "no such work item"
        self.get(id).await?;
        let comments = self.store.list_comments(id).await?;
        Ok(CommentTrail::new(comments))
    }
}
