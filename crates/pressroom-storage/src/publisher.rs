use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use pressroom_core::{normalize_uri, Manifest, Transaction, UriInfo};

use crate::digest::sha256_hex_file;
use crate::paths::resolve_uri;
use crate::store::TransactionStore;

/// The staging/commit/rollback engine. Stateless apart from the store it
/// resolves staging directories through; safe to share across threads.
pub struct Publisher {
    store: Arc<TransactionStore>,
}

impl Publisher {
    pub fn new(store: Arc<TransactionStore>) -> Self {
        Self { store }
    }

    /// Stages one payload into the transaction's content root and returns its
    /// fingerprint.
    ///
    /// A uri that cannot be resolved inside the content root fails without
    /// touching the transaction. An I/O failure while writing or hashing is
    /// recorded on the transaction as an upload-failed addition and returned
    /// as this call's error; sibling stages in a batch are unaffected.
    pub fn stage_file(
        &self,
        transaction: &Arc<Transaction>,
        uri: &str,
        payload: &mut dyn Read,
        started_at: DateTime<Utc>,
    ) -> Result<String> {
        let content = self.store.content_root(transaction.id())?;
        let Some(target) = resolve_uri(&content, uri) else {
            return Err(anyhow!(
                "uri '{uri}' cannot be resolved inside the transaction content root"
            ));
        };

        let mut info = UriInfo::new(uri, started_at);
        match write_and_fingerprint(&target, payload) {
            Ok(sha256) => {
                info.stop(Some(sha256.clone()));
                transaction.add_uri(info);
                self.store.update_async(transaction);
                debug!(id = transaction.id(), uri = %normalize_uri(uri), %sha256, "staged file");
                Ok(sha256)
            }
            Err(err) => {
                info.stop(None);
                info.record_error(format!("{err:#}"));
                transaction.add_uri(info);
                self.store.update_async(transaction);
                Err(err)
            }
        }
    }

    /// Stages a batch of named payloads under `base_uri`. Entry failures are
    /// recorded per file and do not stop the batch; returns false when at
    /// least one entry failed.
    pub fn stage_many<R: Read>(
        &self,
        transaction: &Arc<Transaction>,
        base_uri: &str,
        payloads: impl IntoIterator<Item = (String, R)>,
    ) -> Result<bool> {
        let base = normalize_uri(base_uri);
        let base = base.trim_end_matches('/');
        let mut all_staged = true;
        for (name, mut reader) in payloads {
            let uri = format!("{base}/{}", name.trim_start_matches('/'));
            if let Err(err) = self.stage_file(transaction, &uri, &mut reader, Utc::now()) {
                warn!(id = transaction.id(), uri = %uri, "failed to stage payload: {err:#}");
                all_staged = false;
            }
        }
        Ok(all_staged)
    }

    /// Records deletions to be executed against the website root at commit.
    /// Returns how many were staged; an empty list stages nothing.
    pub fn stage_deletes(&self, transaction: &Arc<Transaction>, uris: &[String]) -> Result<usize> {
        if uris.is_empty() {
            return Ok(0);
        }
        let content = self.store.content_root(transaction.id())?;
        let started_at = Utc::now();
        let mut deletes = Vec::with_capacity(uris.len());
        for uri in uris {
            if resolve_uri(&content, uri).is_none() {
                return Err(anyhow!(
                    "uri '{uri}' cannot be resolved inside the transaction content root"
                ));
            }
            deletes.push(UriInfo::new(uri, started_at));
        }

        let count = deletes.len();
        transaction.add_uri_deletes(deletes);
        self.store.update(transaction)?;
        Ok(count)
    }

    /// Copies an already-published file into the content root at
    /// `target_uri`. When a file is already published at the target, the
    /// call is a no-op returning false.
    pub fn stage_from_website(
        &self,
        transaction: &Arc<Transaction>,
        source_uri: &str,
        target_uri: &str,
        website_root: &Path,
    ) -> Result<bool> {
        let content = self.store.content_root(transaction.id())?;
        let Some(source) = resolve_uri(website_root, source_uri) else {
            return Err(anyhow!(
                "uri '{source_uri}' cannot be resolved inside the website root"
            ));
        };
        let Some(published_target) = resolve_uri(website_root, target_uri) else {
            return Err(anyhow!(
                "uri '{target_uri}' cannot be resolved inside the website root"
            ));
        };
        let Some(staged_target) = resolve_uri(&content, target_uri) else {
            return Err(anyhow!(
                "uri '{target_uri}' cannot be resolved inside the transaction content root"
            ));
        };

        if published_target.exists() {
            return Ok(false);
        }
        if !source.is_file() {
            return Err(anyhow!("no published file at '{source_uri}'"));
        }

        let mut info = UriInfo::new(target_uri, Utc::now());
        if let Some(parent) = staged_target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&source, &staged_target).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                staged_target.display()
            )
        })?;
        let sha256 = sha256_hex_file(&staged_target)?;
        info.stop(Some(sha256));
        transaction.add_uri(info);
        self.store.update_async(transaction);
        Ok(true)
    }

    /// Applies a manifest: stages its copies and its deletions. Returns
    /// `(copied, deletions_staged)`.
    pub fn apply_manifest(
        &self,
        transaction: &Arc<Transaction>,
        manifest: &Manifest,
        website_root: &Path,
    ) -> Result<(usize, usize)> {
        let mut copied = 0;
        for copy in &manifest.files_to_copy {
            if self.stage_from_website(transaction, &copy.source, &copy.target, website_root)? {
                copied += 1;
            }
        }
        let deleted = self.stage_deletes(transaction, &manifest.uris_to_delete)?;
        Ok((copied, deleted))
    }

    /// The staged path for `uri`, if a regular file is staged there.
    pub fn get_file(&self, transaction: &Transaction, uri: &str) -> Result<Option<PathBuf>> {
        let content = self.store.content_root(transaction.id())?;
        let Some(path) = resolve_uri(&content, uri) else {
            return Ok(None);
        };
        if path.is_file() {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    /// Every regular file currently staged in the transaction.
    pub fn list_files(&self, transaction: &Transaction) -> Result<Vec<PathBuf>> {
        let content = self.store.content_root(transaction.id())?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&content).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", content.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Moves staged content into the website root, backing up anything it
    /// overwrites, then executes staged deletions.
    ///
    /// Commit is atomic per file, not per transaction: the first failure
    /// halts processing, files already moved stay moved, and a single
    /// transaction-level error records the failing path and the backup
    /// location. The outcome is carried on the transaction itself.
    pub fn commit(&self, transaction: &Arc<Transaction>, website_root: &Path) -> Result<()> {
        if !transaction.is_open() {
            return Err(anyhow!(
                "transaction {} is already {}",
                transaction.id(),
                transaction.status()
            ));
        }
        let content = self.store.content_root(transaction.id())?;
        let backup = self.store.backup_root(transaction.id())?;

        let mut failed = false;
        if let Err(err) = self.commit_additions(transaction, &content, &backup, website_root) {
            transaction.add_error(format!(
                "commit halted: {err:#}; backed up files are in '{}'",
                backup.display()
            ));
            failed = true;
        }
        if !failed {
            if let Err(err) = self.commit_deletions(transaction, &backup, website_root) {
                transaction.add_error(format!(
                    "delete failed during commit: {err:#}; backed up files are in '{}'",
                    backup.display()
                ));
                failed = true;
            }
        }

        transaction.end_commit(!failed);
        self.store.update(transaction)?;
        info!(
            id = transaction.id(),
            status = %transaction.status(),
            "commit finished"
        );
        Ok(())
    }

    fn commit_additions(
        &self,
        transaction: &Arc<Transaction>,
        content: &Path,
        backup: &Path,
        website_root: &Path,
    ) -> Result<()> {
        for entry in WalkDir::new(content).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", content.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let staged = entry.path();
            let relative = staged
                .strip_prefix(content)
                .with_context(|| format!("failed to relativize {}", staged.display()))?
                .to_path_buf();
            let uri = uri_for_relative(&relative);
            let target = website_root.join(&relative);

            if let Err(err) = place_file(staged, &target, backup, &relative) {
                transaction.mark_addition_commit_failed(&uri, format!("{err:#}"));
                return Err(err);
            }

            if !transaction.mark_addition_committed(&uri) {
                warn!(
                    id = transaction.id(),
                    uri = %uri,
                    "committed file has no matching addition record"
                );
            }
            self.store.update(transaction)?;
            debug!(id = transaction.id(), uri = %uri, "committed file");
        }
        Ok(())
    }

    fn commit_deletions(
        &self,
        transaction: &Arc<Transaction>,
        backup: &Path,
        website_root: &Path,
    ) -> Result<()> {
        let deletions = transaction.deletions();
        for uri in deletions.keys() {
            let Some(target) = resolve_uri(website_root, uri) else {
                return Err(anyhow!(
                    "delete uri '{uri}' cannot be resolved inside the website root"
                ));
            };
            if target.exists() {
                let relative = target
                    .strip_prefix(website_root)
                    .with_context(|| format!("failed to relativize {}", target.display()))?
                    .to_path_buf();
                let saved = backup.join(&relative);
                move_path(&target, &saved)
                    .with_context(|| format!("failed to back up '{}'", target.display()))?;
                prune_empty_parent(&target, website_root)?;
            }
            transaction.mark_deletion_committed(uri);
            self.store.update(transaction)?;
            debug!(id = transaction.id(), uri = %uri, "deleted published uri");
        }
        Ok(())
    }

    /// Discards the transaction's staged content without touching the live
    /// destination. Already-committed files are not restored.
    pub fn rollback(&self, transaction: &Arc<Transaction>) -> Result<bool> {
        if !transaction.is_open() {
            return Err(anyhow!(
                "transaction {} is already {}",
                transaction.id(),
                transaction.status()
            ));
        }

        let content = self.store.layout().content_dir(transaction.id());
        let success = match remove_dir_all_if_exists(&content) {
            Ok(()) => true,
            Err(err) => {
                transaction.add_error(format!("failed to clear staged content: {err:#}"));
                false
            }
        };

        transaction.mark_additions_rolled_back();
        transaction.end_rollback(success);
        self.store.update(transaction)?;
        info!(id = transaction.id(), success, "transaction rolled back");
        Ok(success)
    }
}

/// Backs up anything already published at `target`, then moves the staged
/// file into place.
fn place_file(staged: &Path, target: &Path, backup: &Path, relative: &Path) -> Result<()> {
    if target.exists() {
        let saved = backup.join(relative);
        move_path(target, &saved)
            .with_context(|| format!("failed to back up '{}'", target.display()))?;
    }
    move_path(staged, target).with_context(|| format!("failed to commit '{}'", target.display()))
}

fn write_and_fingerprint(target: &Path, payload: &mut dyn Read) -> Result<String> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = File::create(target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    io::copy(payload, &mut file)
        .with_context(|| format!("failed to write staged file: {}", target.display()))?;
    sha256_hex_file(target)
}

fn uri_for_relative(relative: &Path) -> String {
    let mut uri = String::new();
    for component in relative.components() {
        uri.push('/');
        uri.push_str(&component.as_os_str().to_string_lossy());
    }
    if uri.is_empty() {
        uri.push('/');
    }
    uri
}

/// Moves a file or directory, falling back to copy + remove when rename
/// fails (e.g. across filesystems).
fn move_path(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    if src.is_dir() {
        copy_dir_recursive(src, dst)?;
        fs::remove_dir_all(src).with_context(|| format!("failed to remove {}", src.display()))?;
    } else {
        fs::copy(src, dst).with_context(|| {
            format!("failed to copy {} to {}", src.display(), dst.display())
        })?;
        fs::remove_file(src).with_context(|| format!("failed to remove {}", src.display()))?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

fn prune_empty_parent(target: &Path, website_root: &Path) -> Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    if parent == website_root {
        return Ok(());
    }
    let Ok(mut entries) = fs::read_dir(parent) else {
        return Ok(());
    };
    if entries.next().is_none() {
        fs::remove_dir(parent)
            .with_context(|| format!("failed to remove empty directory: {}", parent.display()))?;
    }
    Ok(())
}

fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}
