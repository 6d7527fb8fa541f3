use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uri_info::{normalize_uri, UriInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "publishing")]
    Publishing,
    #[serde(rename = "committed")]
    Committed,
    #[serde(rename = "commit-failed")]
    CommitFailed,
    #[serde(rename = "rolled-back")]
    RolledBack,
    #[serde(rename = "rollback-failed")]
    RollbackFailed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Publishing => "publishing",
            Self::Committed => "committed",
            Self::CommitFailed => "commit-failed",
            Self::RolledBack => "rolled-back",
            Self::RollbackFailed => "rollback-failed",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Started | Self::Publishing)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One publish attempt: every staged addition and deletion, plus any errors
/// encountered along the way.
///
/// The transaction is the unit of synchronization. All mutation goes through
/// methods that hold the per-instance lock, and the collections are swapped
/// copy-on-write, so readers get a consistent `Arc` snapshot without ever
/// taking the lock themselves.
#[derive(Debug)]
pub struct Transaction {
    id: String,
    inner: Mutex<TransactionState>,
}

#[derive(Debug)]
struct TransactionState {
    status: TransactionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    additions: Arc<BTreeMap<String, UriInfo>>,
    deletions: Arc<BTreeMap<String, UriInfo>>,
    errors: Arc<Vec<String>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            inner: Mutex::new(TransactionState {
                status: TransactionStatus::Started,
                started_at: crate::timefmt::now(),
                ended_at: None,
                additions: Arc::new(BTreeMap::new()),
                deletions: Arc::new(BTreeMap::new()),
                errors: Arc::new(Vec::new()),
            }),
        }
    }

    pub fn from_record(record: TransactionRecord) -> Self {
        let additions = record
            .additions
            .into_iter()
            .map(|info| (info.uri.clone(), info))
            .collect();
        let deletions = record
            .deletions
            .into_iter()
            .map(|info| (info.uri.clone(), info))
            .collect();
        Self {
            id: record.id,
            inner: Mutex::new(TransactionState {
                status: record.status,
                started_at: record.started_at,
                ended_at: record.ended_at,
                additions: Arc::new(additions),
                deletions: Arc::new(deletions),
                errors: Arc::new(record.errors),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.lock().started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().ended_at
    }

    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    pub fn additions(&self) -> Arc<BTreeMap<String, UriInfo>> {
        self.inner.lock().additions.clone()
    }

    pub fn deletions(&self) -> Arc<BTreeMap<String, UriInfo>> {
        self.inner.lock().deletions.clone()
    }

    pub fn errors(&self) -> Arc<Vec<String>> {
        self.inner.lock().errors.clone()
    }

    /// The addition record for `uri`, or a synthesized unknown record if the
    /// uri was never staged in this transaction.
    pub fn uri_info(&self, uri: &str) -> UriInfo {
        let key = normalize_uri(uri);
        self.additions()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| UriInfo::unknown(&key))
    }

    /// Records a staged addition. A second record for the same uri replaces
    /// the first.
    pub fn add_uri(&self, info: UriInfo) {
        let mut state = self.inner.lock();
        let mut updated = (*state.additions).clone();
        updated.insert(info.uri.clone(), info);
        state.additions = Arc::new(updated);
        state.begin_publishing();
    }

    pub fn add_uri_delete(&self, info: UriInfo) {
        let mut state = self.inner.lock();
        let mut updated = (*state.deletions).clone();
        updated.insert(info.uri.clone(), info);
        state.deletions = Arc::new(updated);
        state.begin_publishing();
    }

    pub fn add_uri_deletes(&self, infos: Vec<UriInfo>) {
        let mut state = self.inner.lock();
        let mut updated = (*state.deletions).clone();
        for info in infos {
            updated.insert(info.uri.clone(), info);
        }
        state.deletions = Arc::new(updated);
        state.begin_publishing();
    }

    pub fn add_error(&self, error: impl Into<String>) {
        let mut state = self.inner.lock();
        let mut updated = (*state.errors).clone();
        updated.push(error.into());
        state.errors = Arc::new(updated);
    }

    /// True when a transaction-level error was recorded, or when any addition
    /// carries a non-blank per-file error.
    pub fn has_errors(&self) -> bool {
        let state = self.inner.lock();
        !state.errors.is_empty() || state.additions.values().any(UriInfo::has_error)
    }

    /// Marks the addition matching `uri` committed. Returns false when no
    /// addition matches.
    pub fn mark_addition_committed(&self, uri: &str) -> bool {
        let key = normalize_uri(uri);
        let mut state = self.inner.lock();
        if !state.additions.contains_key(&key) {
            return false;
        }
        let mut updated = (*state.additions).clone();
        if let Some(info) = updated.get_mut(&key) {
            info.mark_committed();
        }
        state.additions = Arc::new(updated);
        true
    }

    /// Marks the addition matching `uri` commit-failed and records the error
    /// on it. Returns false when no addition matches.
    pub fn mark_addition_commit_failed(&self, uri: &str, error: impl Into<String>) -> bool {
        let key = normalize_uri(uri);
        let mut state = self.inner.lock();
        if !state.additions.contains_key(&key) {
            return false;
        }
        let mut updated = (*state.additions).clone();
        if let Some(info) = updated.get_mut(&key) {
            info.fail(error);
        }
        state.additions = Arc::new(updated);
        true
    }

    pub fn mark_deletion_committed(&self, uri: &str) -> bool {
        let key = normalize_uri(uri);
        let mut state = self.inner.lock();
        if !state.deletions.contains_key(&key) {
            return false;
        }
        let mut updated = (*state.deletions).clone();
        if let Some(info) = updated.get_mut(&key) {
            info.mark_committed();
        }
        state.deletions = Arc::new(updated);
        true
    }

    pub fn mark_additions_rolled_back(&self) {
        let mut state = self.inner.lock();
        let mut updated = (*state.additions).clone();
        for info in updated.values_mut() {
            info.mark_rolled_back();
        }
        state.additions = Arc::new(updated);
    }

    pub fn end_commit(&self, success: bool) {
        let mut state = self.inner.lock();
        state.ended_at = Some(crate::timefmt::now());
        state.status = if success {
            TransactionStatus::Committed
        } else {
            TransactionStatus::CommitFailed
        };
    }

    pub fn end_rollback(&self, success: bool) {
        let mut state = self.inner.lock();
        state.ended_at = Some(crate::timefmt::now());
        state.status = if success {
            TransactionStatus::RolledBack
        } else {
            TransactionStatus::RollbackFailed
        };
    }

    /// Consistent snapshot of the whole transaction for persistence.
    pub fn record(&self) -> TransactionRecord {
        let state = self.inner.lock();
        TransactionRecord {
            id: self.id.clone(),
            status: state.status,
            started_at: state.started_at,
            ended_at: state.ended_at,
            additions: state.additions.values().cloned().collect(),
            deletions: state.deletions.values().cloned().collect(),
            errors: (*state.errors).clone(),
        }
    }
}

impl TransactionState {
    fn begin_publishing(&mut self) {
        if self.status.is_open() {
            self.status = TransactionStatus::Publishing;
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        write!(f, "{} ({} uris)", self.id, state.additions.len())
    }
}

/// The persisted shape of a transaction. Round-trips through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub status: TransactionStatus,
    #[serde(rename = "start_date", with = "crate::timefmt::timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(
        rename = "end_date",
        with = "crate::timefmt::timestamp_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additions: Vec<UriInfo>,
    #[serde(default)]
    pub deletions: Vec<UriInfo>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl TransactionRecord {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.additions.iter().any(UriInfo::has_error)
    }

    /// Compact copy carrying only the errored additions, for operator-facing
    /// rendering of a failed publish.
    pub fn errors_only(&self) -> TransactionRecord {
        TransactionRecord {
            id: self.id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            additions: self
                .additions
                .iter()
                .filter(|info| info.has_error())
                .cloned()
                .collect(),
            deletions: Vec::new(),
            errors: self.errors.clone(),
        }
    }
}
