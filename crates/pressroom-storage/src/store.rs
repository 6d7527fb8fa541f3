use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use pressroom_core::{Transaction, TransactionRecord};

use crate::layout::StoreLayout;

/// Creates transactions, owns their staging directories, and persists their
/// records. Holds the canonical in-memory instance of every open transaction.
pub struct TransactionStore {
    layout: StoreLayout,
    open: DashMap<String, Arc<Transaction>>,
    writer: Option<Sender<Arc<Transaction>>>,
    worker: Option<JoinHandle<()>>,
    // Serializes every record write, sync or async, so a stale snapshot can
    // never land on top of a newer one.
    write_lock: Arc<Mutex<()>>,
}

impl TransactionStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let layout = StoreLayout::new(root);
        layout.ensure_root()?;

        let write_lock = Arc::new(Mutex::new(()));
        let (sender, receiver) = unbounded::<Arc<Transaction>>();
        let writer_layout = layout.clone();
        let writer_lock = write_lock.clone();
        let worker = thread::Builder::new()
            .name("pressroom-store-writer".to_string())
            .spawn(move || {
                for transaction in receiver {
                    if let Err(err) = write_record(&writer_layout, &writer_lock, &transaction) {
                        error!(id = transaction.id(), "failed to persist transaction: {err:#}");
                    }
                }
            })
            .context("failed to spawn transaction store writer thread")?;

        Ok(Self {
            layout,
            open: DashMap::new(),
            writer: Some(sender),
            worker: Some(worker),
            write_lock,
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn create(&self) -> Result<Arc<Transaction>> {
        let transaction = Arc::new(Transaction::new());
        let id = transaction.id().to_string();
        let dir = self.layout.transaction_dir(&id);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        self.update(&transaction)?;
        self.open.insert(id.clone(), transaction.clone());
        info!(id = %id, "transaction created");
        Ok(transaction)
    }

    /// Looks a transaction up by id, reloading its persisted record when it
    /// is not held in memory.
    pub fn get(&self, id: &str) -> Option<Arc<Transaction>> {
        if let Some(existing) = self.open.get(id) {
            return Some(existing.clone());
        }
        let record = read_record(&self.layout, id).ok().flatten()?;
        let entry = self
            .open
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Transaction::from_record(record)));
        Some(entry.value().clone())
    }

    /// Synchronous persistence of the transaction's current state.
    /// Idempotent; safe to call repeatedly.
    pub fn update(&self, transaction: &Transaction) -> Result<()> {
        write_record(&self.layout, &self.write_lock, transaction)
    }

    /// Schedules persistence without blocking the caller. The background
    /// writer snapshots the transaction at write time, so a queued request
    /// can never clobber newer state with an older snapshot.
    pub fn update_async(&self, transaction: &Arc<Transaction>) {
        if let Some(writer) = &self.writer {
            if writer.send(transaction.clone()).is_ok() {
                return;
            }
        }
        if let Err(err) = self.update(transaction) {
            error!(id = transaction.id(), "failed to persist transaction: {err:#}");
        }
    }

    /// The transaction's staged-content directory, created on first use.
    pub fn content_root(&self, id: &str) -> Result<PathBuf> {
        self.layout.ensure_content_dir(id)
    }

    /// The transaction's backup directory, created on first use.
    pub fn backup_root(&self, id: &str) -> Result<PathBuf> {
        self.layout.ensure_backup_dir(id)
    }
}

impl Drop for TransactionStore {
    fn drop(&mut self) {
        drop(self.writer.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn write_record(layout: &StoreLayout, lock: &Mutex<()>, transaction: &Transaction) -> Result<()> {
    let _write = lock.lock();
    let record = transaction.record();
    let path = layout.record_path(&record.id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload =
        serde_json::to_vec_pretty(&record).context("failed to serialize transaction record")?;
    fs::write(&path, payload)
        .with_context(|| format!("failed to write transaction record: {}", path.display()))?;
    debug!(id = %record.id, status = %record.status, "transaction persisted");
    Ok(())
}

fn read_record(layout: &StoreLayout, id: &str) -> Result<Option<TransactionRecord>> {
    let path = layout.record_path(id);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to read transaction record: {}", path.display())
            });
        }
    };
    let record = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse transaction record: {}", path.display()))?;
    Ok(Some(record))
}
