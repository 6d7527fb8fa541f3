use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const CONTENT_DIR: &str = "content";
const BACKUP_DIR: &str = "backup";
const RECORD_FILE: &str = "transaction.json";

/// On-disk layout of the transaction store: one directory per transaction
/// holding its persisted record, its staged content, and its backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transaction_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.transaction_dir(id).join(RECORD_FILE)
    }

    pub fn content_dir(&self, id: &str) -> PathBuf {
        self.transaction_dir(id).join(CONTENT_DIR)
    }

    pub fn backup_dir(&self, id: &str) -> PathBuf {
        self.transaction_dir(id).join(BACKUP_DIR)
    }

    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))
    }

    pub fn ensure_content_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.content_dir(id);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    pub fn ensure_backup_dir(&self, id: &str) -> Result<PathBuf> {
        let dir = self.backup_dir(id);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}
