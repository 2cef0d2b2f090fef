// JSON-on-disk store used by the CLI.
//
// Layout under the root directory:
//   items/<id>.json      one work item per file
//   comments/<id>.json   the item's ledger as a JSON array
//   .lock                advisory lock held for every read-modify-write
//
// The lock file serializes writers across processes; the in-process mutex
// keeps tasks of one process from queueing on the blocking file lock.

use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{StoreError, WorkItemStore, WriteOutcome};
use crate::workflows::types::{Comment, NewComment, WorkItem, WorkItemId};

#[derive(Debug, Clone)]
struct Layout {
    root: PathBuf,
}

impl Layout {
    fn items_dir(&self) -> PathBuf {
        self.root.join("items")
    }

    fn comments_dir(&self) -> PathBuf {
        self.root.join("comments")
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// `None` for ids that cannot name a file inside the store
    fn item_path(&self, id: &WorkItemId) -> Option<PathBuf> {
        file_stem(id).map(|stem| self.items_dir().join(format!("{stem}.json")))
    }

    fn comments_path(&self, id: &WorkItemId) -> Option<PathBuf> {
        file_stem(id).map(|stem| self.comments_dir().join(format!("{stem}.json")))
    }

    fn ensure_directories(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.items_dir())?;
        fs::create_dir_all(self.comments_dir())?;
        Ok(())
    }
}

fn file_stem(id: &WorkItemId) -> Option<&str> {
    let stem = id.as_str();
    let valid = !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(stem)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

// Write-then-rename so a crash never leaves a half-written document behind
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug)]
pub struct FileStore {
    layout: Layout,
    writers: Mutex<()>,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let layout = Layout { root: root.into() };
        layout.ensure_directories()?;
        debug!(root = %layout.root.display(), "Opened file store");
        Ok(Self {
            layout,
            writers: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.layout.root
    }

    async fn locked<T, F>(&self, exclusive: bool, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Layout) -> Result<T, StoreError> + Send + 'static,
    {
        let _writer = if exclusive { Some(self.writers.lock().await) } else { None };
        let layout = self.layout.clone();

        tokio::task::spawn_blocking(move || {
            let file: File = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(layout.lock_path())?;
            let mut lock = FileLock::new(file);
            if exclusive {
                let _guard = lock.write()?;
                operation(&layout)
            } else {
                let _guard = lock.read()?;
                operation(&layout)
            }
        })
        .await
        .map_err(|e| StoreError::Lock {
            reason: format!("file store task failed: {e}"),
        })?
    }
}

fn guarded_outcome(
    layout: &Layout,
    id: &WorkItemId,
    expected_version: u64,
) -> Result<(WriteOutcome, Option<PathBuf>), StoreError> {
    let Some(path) = layout.item_path(id) else {
        return Ok((WriteOutcome::Missing, None));
    };
    let Some(stored) = read_json::<WorkItem>(&path)? else {
        return Ok((WriteOutcome::Missing, None));
    };
    if stored.version != expected_version {
        return Ok((
            WriteOutcome::Conflict {
                current_version: stored.version,
                current_state: stored.state,
            },
            None,
        ));
    }
    Ok((WriteOutcome::Applied, Some(path)))
}

#[async_trait]
impl WorkItemStore for FileStore {
    async fn insert(&self, item: &WorkItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.locked(true, move |layout| {
            let path = layout.item_path(&item.id).ok_or_else(|| StoreError::Corruption {
                reason: format!("work item id {:?} cannot be stored on disk", item.id.as_str()),
            })?;
            if path.exists() {
                return Err(StoreError::Duplicate(item.id.clone()));
            }
            write_json(&path, &item)?;
            debug!(work_item.id = %item.id, path = %path.display(), "Inserted work item");
            Ok(())
        })
        .await
    }

    async fn fetch(&self, id: &WorkItemId) -> Result<Option<WorkItem>, StoreError> {
        let id = id.clone();
        self.locked(false, move |layout| match layout.item_path(&id) {
            Some(path) => read_json(&path),
            None => Ok(None),
        })
        .await
    }

    async fn list(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.locked(false, |layout| {
            let mut items = Vec::new();
            for entry in fs::read_dir(layout.items_dir())? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                if let Some(item) = read_json::<WorkItem>(&path)? {
                    items.push(item);
                }
            }
            items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Ok(items)
        })
        .await
    }

    async fn compare_and_swap(&self, expected_version: u64, item: &WorkItem) -> Result<WriteOutcome, StoreError> {
        let item = item.clone();
        self.locked(true, move |layout| {
            let (outcome, path) = guarded_outcome(layout, &item.id, expected_version)?;
            if let Some(path) = path {
                write_json(&path, &item)?;
            }
            Ok(outcome)
        })
        .await
    }

    async fn delete_if_version(&self, id: &WorkItemId, expected_version: u64) -> Result<WriteOutcome, StoreError> {
        let id = id.clone();
        self.locked(true, move |layout| {
            let (outcome, path) = guarded_outcome(layout, &id, expected_version)?;
            if let Some(path) = path {
                fs::remove_file(path)?;
                if let Some(comments) = layout.comments_path(&id) {
                    remove_if_exists(&comments)?;
                }
            }
            Ok(outcome)
        })
        .await
    }

    async fn append_comment(&self, id: &WorkItemId, comment: NewComment) -> Result<Option<Comment>, StoreError> {
        let id = id.clone();
        self.locked(true, move |layout| {
            let (Some(item_path), Some(comments_path)) = (layout.item_path(&id), layout.comments_path(&id)) else {
                return Ok(None);
            };
            if !item_path.exists() {
                return Ok(None);
            }
            let mut ledger: Vec<Comment> = read_json(&comments_path)?.unwrap_or_default();
            let comment = comment.into_comment_after(id.clone(), ledger.last());
            ledger.push(comment.clone());
            write_json(&comments_path, &ledger)?;
            Ok(Some(comment))
        })
        .await
    }

    async fn list_comments(&self, id: &WorkItemId) -> Result<Vec<Comment>, StoreError> {
        let id = id.clone();
        self.locked(false, move |layout| match layout.comments_path(&id) {
            Some(path) => Ok(read_json(&path)?.unwrap_or_default()),
            None => Ok(Vec::new()),
        })
        .await
    }
}
