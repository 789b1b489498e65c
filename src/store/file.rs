//! store::file
//!
//! Document store backed by a local JSON dataset file.
//!
//! # Storage
//!
//! The dataset is a JSON array of document revisions (the same shape the
//! content API exports). A missing file is an empty dataset.
//!
//! # Invariants
//!
//! - Every call holds an exclusive OS lock on `<dataset>.lock` for its
//!   whole read-modify-write cycle
//! - Writes go to a temp file that is renamed over the dataset
//! - A failed mutation leaves the file untouched
//!
//! Operation semantics are those of [`MemoryStore`], which this store loads
//! the dataset into for each call.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::debug;

use super::memory::MemoryStore;
use super::traits::{DocumentStore, Filter, Patch, StoreError};
use crate::core::types::{Document, DocumentId};

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

/// Exclusive lock on a dataset, released on drop.
#[derive(Debug)]
struct DatasetLock {
    file: File,
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl FileStore {
    /// Open a dataset file. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the dataset file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn lock(&self) -> Result<DatasetLock, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        file.lock_exclusive().map_err(|e| io_error(&lock_path, e))?;
        Ok(DatasetLock { file })
    }

    /// Read all revisions from the dataset file.
    pub fn load(&self) -> Result<Vec<Document>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| io_error(&self.path, e))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            StoreError::Io(format!(
                "failed to parse dataset '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn open(&self) -> Result<MemoryStore, StoreError> {
        Ok(MemoryStore::with_documents(self.load()?))
    }

    /// Write all revisions to the dataset file atomically.
    pub fn save(&self, documents: &[Document]) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(documents)
            .map_err(|e| StoreError::Io(format!("failed to serialize dataset: {e}")))?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut file = File::create(&temp_path).map_err(|e| io_error(&temp_path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| io_error(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| io_error(&self.path, e))?;

        debug!(path = %self.path.display(), revisions = documents.len(), "dataset written");
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl DocumentStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let _lock = self.lock()?;
        self.open()?.get(id).await
    }

    async fn fetch(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let _lock = self.lock()?;
        self.open()?.fetch(filter).await
    }

    async fn patch(&self, patch: Patch) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let store = self.open()?;
        store.patch(patch).await?;
        self.save(&store.all_documents())
    }

    async fn publish(&self, id: &DocumentId) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let store = self.open()?;
        store.publish(id).await?;
        self.save(&store.all_documents())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let store = self.open()?;
        if store.document(id).is_none() {
            return Ok(());
        }
        store.delete(id).await?;
        self.save(&store.all_documents())
    }
}
