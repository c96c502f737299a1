//! Per-version snapshot record and its commit protocol.
//!
//! A [`SnapshotMeta`] describes one stored version of a spec: its identity,
//! where its files live, and the SHA-256 digest of each document. Documents
//! are staged with [`SnapshotMeta::add_document`] and become durable only
//! through [`SnapshotMeta::commit`].
//!
//! # Commit protocol
//!
//! ```text
//! stage ──▶ lock ──▶ resolve digests ──▶ write all into .tmp-write-<uuid>/
//!                                              │ any write fails → remove temp, error
//!                                              ▼
//!                          back up each existing file, rename new file over it
//!                                              │ any rename fails → restore backups, error
//!                                              ▼
//!                          staged state becomes canonical, temp removed, unlock
//! ```
//!
//! The lock is not a mutex: a second caller fails immediately with
//! [`SpecnovaError::AlreadyLocked`] instead of waiting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{
    is_safe_segment, DocumentFormat, FileNames, MetaFormat, SnapshotExtension, SnapshotFolder,
    SpecnovaConfig,
};
use crate::digest::{DigestState, Sha256Digest};
use crate::document::{Info, ParsedSource};
use crate::env::resolve_within;
use crate::error::{Result, SpecnovaError};

const TEMP_PREFIX: &str = ".tmp-write-";
const BACKUP_DIR: &str = ".backup";

/// Document role within a snapshot version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Source,
    Normalized,
    Meta,
}

impl Slot {
    pub fn digest_slot(self) -> Option<DigestSlot> {
        match self {
            Slot::Source => Some(DigestSlot::Source),
            Slot::Normalized => Some(DigestSlot::Normalized),
            Slot::Meta => None,
        }
    }
}

/// Slots whose content is tracked by digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestSlot {
    Source,
    Normalized,
}

impl DigestSlot {
    pub const ALL: [DigestSlot; 2] = [DigestSlot::Source, DigestSlot::Normalized];

    pub fn slot(self) -> Slot {
        match self {
            DigestSlot::Source => Slot::Source,
            DigestSlot::Normalized => Slot::Normalized,
        }
    }
}

/// File names (with extension) and resolved formats of a version's files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFiles {
    pub names: FileNames,
    pub extensions: ResolvedExtensions,
}

impl SnapshotFiles {
    pub fn name(&self, slot: Slot) -> &str {
        match slot {
            Slot::Source => &self.names.source,
            Slot::Normalized => &self.names.normalized,
            Slot::Meta => &self.names.meta,
        }
    }

    fn extension(&self, slot: Slot) -> &'static str {
        match slot {
            Slot::Source => self.extensions.source.as_str(),
            Slot::Normalized => self.extensions.normalized.as_str(),
            Slot::Meta => self.extensions.meta.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExtensions {
    pub source: DocumentFormat,
    pub normalized: DocumentFormat,
    pub meta: MetaFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Sha256Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<Sha256Digest>,
}

impl Digests {
    pub fn get(&self, slot: DigestSlot) -> Option<&Sha256Digest> {
        match slot {
            DigestSlot::Source => self.source.as_ref(),
            DigestSlot::Normalized => self.normalized.as_ref(),
        }
    }

    fn set(&mut self, slot: DigestSlot, digest: Sha256Digest) {
        match slot {
            DigestSlot::Source => self.source = Some(digest),
            DigestSlot::Normalized => self.normalized = Some(digest),
        }
    }
}

/// The persisted meta document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetaData {
    pub info: Info,
    /// Version directory, relative to the project root.
    pub path: String,
    pub files: SnapshotFiles,
    pub sha256: Digests,
}

/// Result of checking stored digests against the files on disk.
///
/// `None` means no digest is recorded for the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestReport {
    pub source: Option<bool>,
    pub normalized: Option<bool>,
}

impl DigestReport {
    /// No recorded digest disagrees with its file.
    pub fn is_clean(&self) -> bool {
        self.source != Some(false) && self.normalized != Some(false)
    }
}

#[derive(Debug, Default)]
struct Staging {
    documents: BTreeMap<Slot, String>,
    digests: BTreeMap<DigestSlot, DigestState>,
}

/// A snapshot version record with staged, not yet committed, changes.
#[derive(Debug)]
pub struct SnapshotMeta {
    root: PathBuf,
    data: Mutex<SnapshotMetaData>,
    staging: Mutex<Staging>,
    locked: AtomicBool,
}

/// Directory holding every version, relative to the project root.
pub fn snapshot_base(config: &SpecnovaConfig) -> String {
    match &config.snapshot.folder {
        SnapshotFolder::Path(root) => root.trim_end_matches('/').to_string(),
        SnapshotFolder::Nested { root, subfolder } => {
            format!("{}/{}", root.trim_end_matches('/'), subfolder)
        }
    }
}

/// Version directory for `version`, relative to the project root.
pub fn build_meta_path(config: &SpecnovaConfig, version: &str) -> Result<String> {
    let base = snapshot_base(config);
    if !is_safe_segment(version) {
        return Err(SpecnovaError::InvalidPath {
            path: PathBuf::from(&base).join(version),
            root: PathBuf::from(base),
        });
    }
    Ok(format!("{}/{}", base, version))
}

/// Resolve configured extensions against the source format and build the
/// per-slot file names.
pub fn build_files(config: &SpecnovaConfig, source_format: DocumentFormat) -> SnapshotFiles {
    let resolve = |ext: SnapshotExtension| match ext {
        SnapshotExtension::Json => DocumentFormat::Json,
        SnapshotExtension::Yaml | SnapshotExtension::Yml => DocumentFormat::Yaml,
        SnapshotExtension::Infer => source_format,
    };
    let extensions = ResolvedExtensions {
        source: resolve(config.snapshot.extensions.source),
        normalized: resolve(config.snapshot.extensions.normalized),
        meta: MetaFormat::Json,
    };
    let base = &config.snapshot.names;
    let names = FileNames {
        source: format!("{}.{}", base.source, extensions.source.as_str()),
        normalized: format!("{}.{}", base.normalized, extensions.normalized.as_str()),
        meta: format!("{}.{}", base.meta, extensions.meta.as_str()),
    };
    SnapshotFiles { names, extensions }
}

/// Path of the meta document for `version`, relative to the project root.
pub fn meta_file_path(config: &SpecnovaConfig, version: &str) -> Result<String> {
    let path = build_meta_path(config, version)?;
    Ok(format!(
        "{}/{}.{}",
        path,
        config.snapshot.names.meta,
        MetaFormat::Json.as_str()
    ))
}

fn lock_poisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SnapshotMeta {
    /// A new record for a freshly parsed source, with no digests yet.
    pub fn fresh(
        source: &ParsedSource,
        config: &SpecnovaConfig,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let data = SnapshotMetaData {
            info: source.info.clone(),
            path: build_meta_path(config, &source.info.version)?,
            files: build_files(config, source.format),
            sha256: Digests::default(),
        };
        Self::from_data(data, root)
    }

    /// Wrap a record read from disk, checking its invariants.
    pub fn from_data(data: SnapshotMetaData, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        validate_data(&data)?;
        resolve_within(&root, &data.path)?;
        Ok(Self {
            root,
            data: Mutex::new(data),
            staging: Mutex::new(Staging::default()),
            locked: AtomicBool::new(false),
        })
    }

    /// Read a meta document at `path` (relative to `root`).
    pub fn from_file(root: impl Into<PathBuf>, path: impl AsRef<Path>) -> Result<Self> {
        let root = root.into();
        let full = resolve_within(&root, path)?;
        let text = std::fs::read_to_string(&full).map_err(|e| SpecnovaError::io(&full, e))?;
        let data: SnapshotMetaData = serde_json::from_str(&text)
            .map_err(|e| SpecnovaError::MetaInvalid(format!("{}: {}", full.display(), e)))?;
        Self::from_data(data, root)
    }

    /// Load the committed record of `version`.
    pub fn pull(version: &str, config: &SpecnovaConfig, root: impl Into<PathBuf>) -> Result<Self> {
        Self::from_file(root, meta_file_path(config, version)?)
    }

    /// Whether a committed record exists for `version`.
    pub fn exists(version: &str, config: &SpecnovaConfig, root: &Path) -> bool {
        meta_file_path(config, version)
            .map(|p| root.join(p).is_file())
            .unwrap_or(false)
    }

    /// The canonical (last committed or loaded) record.
    pub fn get(&self) -> SnapshotMetaData {
        lock_poisoned(&self.data).clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute version directory.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&lock_poisoned(&self.data).path)
    }

    /// Absolute path of a slot's file.
    pub fn file_path(&self, slot: Slot) -> PathBuf {
        let data = lock_poisoned(&self.data);
        self.root.join(&data.path).join(data.files.name(slot))
    }

    /// Path of a slot's file relative to the project root.
    pub fn relative_file_path(&self, slot: Slot) -> String {
        let data = lock_poisoned(&self.data);
        format!("{}/{}", data.path, data.files.name(slot))
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn has_staged(&self) -> bool {
        !lock_poisoned(&self.staging).documents.is_empty()
    }

    /// Stage a document. Source and normalized documents start hashing in
    /// the background right away.
    pub fn add_document(&self, slot: Slot, text: impl Into<String>) -> Result<()> {
        if self.is_locked() {
            return Err(SpecnovaError::AlreadyLocked);
        }
        let text = text.into();
        let mut staging = lock_poisoned(&self.staging);
        if let Some(digest_slot) = slot.digest_slot() {
            staging
                .digests
                .insert(digest_slot, DigestState::pending(text.clone()));
        }
        staging.documents.insert(slot, text);
        Ok(())
    }

    /// Drop a staged document and its pending digest.
    pub fn unstage(&self, slot: Slot) -> Result<()> {
        if self.is_locked() {
            return Err(SpecnovaError::AlreadyLocked);
        }
        let mut staging = lock_poisoned(&self.staging);
        if let Some(digest_slot) = slot.digest_slot() {
            staging.digests.remove(&digest_slot);
        }
        staging.documents.remove(&slot);
        Ok(())
    }

    /// Take the commit lock. The lock is released when the guard drops.
    pub fn begin_commit(&self) -> Result<CommitGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SpecnovaError::AlreadyLocked)?;
        Ok(CommitGuard { meta: self })
    }

    /// Write every staged document atomically into the version directory.
    ///
    /// The lock is taken when `commit` is called, not when the returned
    /// future is first polled, so nothing can be staged in between.
    pub fn commit(&self) -> impl Future<Output = Result<()>> + '_ {
        let guard = self.begin_commit();
        async move { guard?.finish().await }
    }

    /// Recompute the digest of a slot's file and compare it with the stored
    /// one. False when no digest is stored or the file is unreadable.
    pub async fn validate_digest(&self, slot: DigestSlot) -> bool {
        let expected = lock_poisoned(&self.data).sha256.get(slot).cloned();
        match expected {
            Some(digest) => digest.matches_file(&self.file_path(slot.slot())).await,
            None => false,
        }
    }

    /// Check every recorded digest.
    pub async fn verify(&self) -> DigestReport {
        let data = self.get();
        let check = |slot: DigestSlot| {
            let recorded = data.sha256.get(slot).is_some();
            async move {
                if recorded {
                    Some(self.validate_digest(slot).await)
                } else {
                    None
                }
            }
        };
        let (source, normalized) =
            tokio::join!(check(DigestSlot::Source), check(DigestSlot::Normalized));
        DigestReport { source, normalized }
    }

    /// Same API family: equal titles and equal licenses.
    pub fn soft_compare(&self, other: &SnapshotMeta) -> bool {
        let this = self.get();
        let other = other.get();
        this.info.title == other.info.title && this.info.license == other.info.license
    }

    /// Identical copies: same path, same version, and for each slot either
    /// no digest on both sides or both digests valid against their files.
    pub async fn strict_compare(&self, other: &SnapshotMeta) -> bool {
        let this_data = self.get();
        let other_data = other.get();
        if this_data.path != other_data.path || this_data.info.version != other_data.info.version
        {
            return false;
        }
        let (source, normalized) = tokio::join!(
            self.slot_agrees(other, &this_data, &other_data, DigestSlot::Source),
            self.slot_agrees(other, &this_data, &other_data, DigestSlot::Normalized),
        );
        source && normalized
    }

    async fn slot_agrees(
        &self,
        other: &SnapshotMeta,
        this_data: &SnapshotMetaData,
        other_data: &SnapshotMetaData,
        slot: DigestSlot,
    ) -> bool {
        match (this_data.sha256.get(slot), other_data.sha256.get(slot)) {
            (None, None) => true,
            (Some(_), Some(_)) => {
                let (a, b) = tokio::join!(self.validate_digest(slot), other.validate_digest(slot));
                a && b
            }
            _ => false,
        }
    }

    async fn resolve_staged_digests(&self) -> Result<Vec<(DigestSlot, Sha256Digest)>> {
        let pending = std::mem::take(&mut lock_poisoned(&self.staging).digests);
        let mut resolved = Vec::with_capacity(pending.len());
        let mut failure = None;
        for (slot, state) in pending {
            match state.resolve().await {
                Ok(digest) => resolved.push((slot, digest)),
                Err(e) => failure = Some(e),
            }
        }
        let mut staging = lock_poisoned(&self.staging);
        for (slot, digest) in &resolved {
            staging
                .digests
                .insert(*slot, DigestState::Resolved(digest.clone()));
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(resolved),
        }
    }
}

fn validate_data(data: &SnapshotMetaData) -> Result<()> {
    if data.path.trim().is_empty() {
        return Err(SpecnovaError::MetaInvalid("empty path".to_string()));
    }
    for slot in [Slot::Source, Slot::Normalized, Slot::Meta] {
        let name = data.files.name(slot);
        let ext = data.files.extension(slot);
        if !is_safe_segment(name) || !name.ends_with(&format!(".{}", ext)) {
            return Err(SpecnovaError::MetaInvalid(format!(
                "file name '{}' does not match extension '{}'",
                name, ext
            )));
        }
    }
    Ok(())
}

/// Holds the commit lock of a [`SnapshotMeta`].
#[derive(Debug)]
pub struct CommitGuard<'a> {
    meta: &'a SnapshotMeta,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.meta.locked.store(false, Ordering::SeqCst);
    }
}

impl CommitGuard<'_> {
    /// Run the commit protocol. On failure the staged documents are kept
    /// and the on-disk state is left as it was.
    pub async fn finish(self) -> Result<()> {
        let meta = self.meta;

        let mut next = meta.get();
        for (slot, digest) in meta.resolve_staged_digests().await? {
            next.sha256.set(slot, digest);
        }

        let meta_text = serde_json::to_string_pretty(&next)
            .map_err(|e| SpecnovaError::MetaInvalid(e.to_string()))?;
        let mut documents = lock_poisoned(&meta.staging).documents.clone();
        documents.insert(Slot::Meta, meta_text);

        let dest = meta.root.join(&next.path);
        let created = create_missing_dirs(&dest).await?;

        let outcome = write_into(&dest, &next.files, &documents).await;
        if outcome.is_err() {
            remove_created_dirs(&created).await;
        }
        outcome?;

        *lock_poisoned(&meta.data) = next;
        *lock_poisoned(&meta.staging) = Staging::default();
        Ok(())
    }
}

/// Create `dir` and its missing parents. Returns the directories that were
/// created, innermost first.
async fn create_missing_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut current = Some(dir);
    while let Some(path) = current {
        if tokio::fs::symlink_metadata(path).await.is_ok() {
            break;
        }
        missing.push(path.to_path_buf());
        current = path.parent();
    }
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        remove_created_dirs(&missing).await;
        return Err(SpecnovaError::commit(dir, e));
    }
    Ok(missing)
}

async fn remove_created_dirs(created: &[PathBuf]) {
    for dir in created {
        match tokio::fs::remove_dir(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                eprintln!("Warning: could not remove {}: {}", dir.display(), e);
                return;
            }
        }
    }
}

/// Stage every document in a fresh temp directory under `dest`, then move
/// them into place. The temp directory is removed whatever the outcome.
async fn write_into(
    dest: &Path,
    files: &SnapshotFiles,
    documents: &BTreeMap<Slot, String>,
) -> Result<()> {
    let temp = dest.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
    tokio::fs::create_dir(&temp)
        .await
        .map_err(|e| SpecnovaError::commit(&temp, e))?;

    let outcome = match write_all(&temp, files, documents).await {
        Ok(()) => move_into_place(&temp, dest, files, documents).await,
        Err(e) => Err(e),
    };

    if let Err(e) = tokio::fs::remove_dir_all(&temp).await {
        eprintln!(
            "Warning: could not remove temp directory {}: {}",
            temp.display(),
            e
        );
    }
    outcome
}

/// Write every document into `temp` concurrently. All writes are awaited
/// even when one fails, so nothing is still writing when the caller removes
/// the directory.
async fn write_all(
    temp: &Path,
    files: &SnapshotFiles,
    documents: &BTreeMap<Slot, String>,
) -> Result<()> {
    let mut writes = JoinSet::new();
    for (slot, text) in documents {
        let target = temp.join(files.name(*slot));
        let text = text.clone();
        writes.spawn(async move {
            tokio::fs::write(&target, text)
                .await
                .map_err(|e| SpecnovaError::commit(target, e))
        });
    }

    let mut first_error = None;
    while let Some(joined) = writes.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            Err(SpecnovaError::commit(
                temp,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            ))
        });
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Rename staged files over their destinations, keeping a backup of each
/// replaced file so a failed rename can be rolled back.
async fn move_into_place(
    temp: &Path,
    dest: &Path,
    files: &SnapshotFiles,
    documents: &BTreeMap<Slot, String>,
) -> Result<()> {
    let backup_dir = temp.join(BACKUP_DIR);
    tokio::fs::create_dir(&backup_dir)
        .await
        .map_err(|e| SpecnovaError::commit(&backup_dir, e))?;

    let mut replaced: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();
    for slot in documents.keys() {
        let name = files.name(*slot);
        let staged = temp.join(name);
        let target = dest.join(name);

        let backup = match tokio::fs::metadata(&target).await {
            Ok(m) if m.is_file() => {
                let backup = backup_dir.join(name);
                if let Err(e) = tokio::fs::rename(&target, &backup).await {
                    rollback(&replaced).await;
                    return Err(SpecnovaError::commit(&target, e));
                }
                Some(backup)
            }
            _ => None,
        };

        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            if let Some(backup) = &backup {
                let _ = tokio::fs::rename(backup, &target).await;
            }
            rollback(&replaced).await;
            return Err(SpecnovaError::commit(&target, e));
        }
        replaced.push((target, backup));
    }
    Ok(())
}

async fn rollback(replaced: &[(PathBuf, Option<PathBuf>)]) {
    for (target, backup) in replaced.iter().rev() {
        let restored = match backup {
            Some(backup) => tokio::fs::rename(backup, target).await,
            None => tokio::fs::remove_file(target).await,
        };
        if let Err(e) = restored {
            eprintln!(
                "Warning: could not roll back {}: {}",
                target.display(),
                e
            );
        }
    }
}
