// SQLite-backed work item store (feature `database`).
//
// Each row carries the work item's version in its own column, so the
// conditional write is a single `UPDATE ... WHERE version = ?`.

use async_trait::async_trait;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::storage::{StoreError, WorkItemStore, WriteOutcome};
use crate::workflows::types::{Comment, NewComment, State, WorkItem, WorkItemId};

/// Work item store on top of a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (and creates, if needed) the database, running migrations when asked
    pub async fn new(database_url: &str, max_connections: u32, auto_migrate: bool) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }

    async fn current_version(&self, id: &WorkItemId) -> Result<WriteOutcome, StoreError> {
        let row = sqlx::query("SELECT version, state FROM work_items WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(WriteOutcome::Missing);
        };
        let version: i64 = row.get("version");
        let state: String = row.get("state");
        Ok(WriteOutcome::Conflict {
            current_version: version as u64,
            current_state: parse_state(&state)?,
        })
    }
}

fn parse_state(value: &str) -> Result<State, StoreError> {
    State::from_str(value).map_err(|err| StoreError::Corruption { reason: err.to_string() })
}

fn decode_item(document: &str) -> Result<WorkItem, StoreError> {
    Ok(serde_json::from_str(document)?)
}

#[async_trait]
impl WorkItemStore for SqliteStore {
    async fn insert(&self, item: &WorkItem) -> Result<(), StoreError> {
        let document = serde_json::to_string(item)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO work_items (id, kind, state, version, document, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(item.id.as_str())
        .bind(item.kind.as_str())
        .bind(item.state.as_str())
        .bind(item.version as i64)
        .bind(document)
        .bind(item.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        debug!(work_item.id = %item.id, "Inserted work item");
        Ok(())
    }

    async fn fetch(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        let row = sqlx::query("SELECT document FROM work_items WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| decode_item(row.get::<&str, _>("document")))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<WorkItem>, StoreError> {
        let rows = sqlx::query("SELECT document FROM work_items ORDER BY created_at ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| decode_item(row.get::<&str, _>("document")))
            .collect()
    }

    async fn compare_and_swap(&self, expected_version: u64, item: &WorkItem) -> Result<WriteOutcome, StoreError> {
        let document = serde_json::to_string(item)?;
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET state = ?1, version = ?2, document = ?3
            WHERE id = ?4 AND version = ?5
            "#,
        )
        .bind(item.state.as_str())
        .bind(item.version as i64)
        .bind(document)
        .bind(item.id.as_str())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }
        let outcome = self.current_version(&item.id).await?;
        debug!(work_item.id = %item.id, expected_version, ?outcome, "Compare-and-swap did not apply");
        Ok(outcome)
    }

    async fn delete_if_version(&self, id: &WorkItemId, expected_version: u64) -> Result<WriteOutcome, StoreError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let result = sqlx::query("DELETE FROM work_items WHERE id = ?1 AND version = ?2")
            .bind(id.as_str())
            .bind(expected_version as i64)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return self.current_version(id).await;
        }

        sqlx::query("DELETE FROM comments WHERE work_item_id = ?1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(WriteOutcome::Applied)
    }

    async fn append_comment(&self, id: &WorkItemId, comment: NewComment) -> Result<Option<Comment>, StoreError> {
        // Take the write lock up front: a deferred read-then-write upgrade
        // fails with SQLITE_BUSY instead of waiting on the busy timeout.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let exists = sqlx::query("SELECT 1 FROM work_items WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            tx.rollback().await?;
            return Ok(None);
        }

        let previous = sqlx::query(
            "SELECT document FROM comments WHERE work_item_id = ?1 ORDER BY sequence DESC LIMIT 1",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| serde_json::from_str::<Comment>(row.get::<&str, _>("document")))
        .transpose()?;

        let comment = comment.into_comment_after(id.clone(), previous.as_ref());
        sqlx::query("INSERT INTO comments (work_item_id, sequence, id, document) VALUES (?1, ?2, ?3, ?4)")
            .bind(id.as_str())
            .bind(comment.sequence as i64)
            .bind(comment.id.0.as_str())
            .bind(serde_json::to_string(&comment)?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(comment))
    }

    async fn list_comments(&self, id: &WorkItemId) -> Result<Vec<Comment>, StoreError> {
        let rows = sqlx::query("SELECT document FROM comments WHERE work_item_id = ?1 ORDER BY sequence ASC")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| serde_json::from_str(row.get::<&str, _>("document")).map_err(StoreError::from))
            .collect()
    }
}
