//! Snapshot orchestration: load a spec, stage its documents, commit, pin.
//!
//! ```text
//! load(source) ──▶ prepare_source ─┐
//!                  prepare_normalized ─┴──▶ commit ──▶ set_main
//! ```
//!
//! A [`Snapshot`] holds at most one parsed source and one
//! [`SnapshotMeta`]. Loading a second source that belongs to a different
//! API (different title or license) is refused with
//! [`SpecnovaError::SpecMismatch`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::{MetaFormat, SpecnovaConfig};
use crate::document::{to_text, ParsedSource, SpecLoader};
use crate::error::{Result, SpecnovaError};
use crate::merge::has_normalize;
use crate::meta::{snapshot_base, SnapshotMeta, SnapshotMetaData, Slot};
use crate::normalize::{normalize_document, OperationIdNormalizer};
use crate::package::{PackageEdit, PackageManifest};

pub struct Snapshot {
    root: PathBuf,
    config: SpecnovaConfig,
    loader: Arc<dyn SpecLoader>,
    manifest_path: PathBuf,
    source: Option<ParsedSource>,
    meta: Option<SnapshotMeta>,
}

impl Snapshot {
    /// `root` is the project root all snapshot paths are relative to;
    /// `manifest_path` points at the `package.json` carrying the pin.
    pub fn new(
        root: impl Into<PathBuf>,
        config: SpecnovaConfig,
        loader: Arc<dyn SpecLoader>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            loader,
            manifest_path: manifest_path.into(),
            source: None,
            meta: None,
        }
    }

    pub fn config(&self) -> &SpecnovaConfig {
        &self.config
    }

    pub fn source(&self) -> Result<&ParsedSource> {
        self.source.as_ref().ok_or(SpecnovaError::NoSourceLoaded)
    }

    pub fn meta(&self) -> Result<&SnapshotMeta> {
        self.meta.as_ref().ok_or(SpecnovaError::NoMetaLoaded)
    }

    /// Parse `source` and pick its meta: a fresh one for remote sources, the
    /// stored one for local sources whose version already has a snapshot.
    pub async fn load(&mut self, source: &str) -> Result<&mut Self> {
        let parsed = self.loader.load(source).await?;
        let version = &parsed.info.version;

        let meta = if !parsed.is_external && SnapshotMeta::exists(version, &self.config, &self.root)
        {
            SnapshotMeta::pull(version, &self.config, &self.root)?
        } else {
            SnapshotMeta::fresh(&parsed, &self.config, &self.root)?
        };

        if let Some(held) = &self.meta {
            if !held.soft_compare(&meta) {
                return Err(SpecnovaError::SpecMismatch {
                    expected: held.get().info.title,
                    found: parsed.info.title,
                });
            }
        }

        self.source = Some(parsed);
        self.meta = Some(meta);
        Ok(self)
    }

    /// Load the pinned snapshot from `package.json`, or the origin when
    /// nothing is pinned yet.
    pub async fn load_main(&mut self) -> Result<&mut Self> {
        let package = PackageManifest::open(&self.manifest_path)?.specnova()?;
        let source = package
            .target()
            .unwrap_or(package.source.as_str())
            .to_string();
        self.load(&source).await
    }

    /// Load the stored source of a snapshot version.
    pub async fn load_version(&mut self, version: &str) -> Result<&mut Self> {
        let meta = SnapshotMeta::pull(version, &self.config, &self.root)?;
        let source = meta.relative_file_path(Slot::Source);
        self.load(&source).await
    }

    /// Stage the source document, re-serialized in the source slot format.
    pub fn prepare_source(&self) -> Result<()> {
        let text = self.render_source()?;
        self.meta()?.add_document(Slot::Source, text)
    }

    /// Stage the normalized document. Returns false, staging nothing, when
    /// no normalization is configured.
    pub fn prepare_normalized(&self) -> Result<bool> {
        match self.render_normalized()? {
            Some(text) => {
                self.meta()?.add_document(Slot::Normalized, text)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stage both documents. They are serialized concurrently and staged
    /// only if both succeed; otherwise nothing is staged and the first error
    /// is returned.
    pub fn prepare_all(&self) -> Result<()> {
        let (source, normalized) = std::thread::scope(|scope| {
            let normalized = scope.spawn(|| self.render_normalized());
            let source = self.render_source();
            let normalized = normalized
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (source, normalized)
        });
        let (source, normalized) = (source?, normalized?);

        let meta = self.meta()?;
        meta.add_document(Slot::Source, source)?;
        if let Some(text) = normalized {
            if let Err(e) = meta.add_document(Slot::Normalized, text) {
                meta.unstage(Slot::Source)?;
                return Err(e);
            }
        }
        Ok(())
    }

    fn render_source(&self) -> Result<String> {
        let source = self.source()?;
        let format = self.meta()?.get().files.extensions.source;
        to_text(&source.document, format)
    }

    fn render_normalized(&self) -> Result<Option<String>> {
        if !has_normalize(&self.config) {
            return Ok(None);
        }
        let source = self.source()?;
        let meta = self.meta()?;

        let mut document = source.document.clone();
        let operation_id = self
            .config
            .normalized
            .as_ref()
            .and_then(|n| n.operation_id.as_ref());
        if let Some(operation_id) = operation_id {
            let normalizer = OperationIdNormalizer::new(operation_id)?;
            normalize_document(&mut document, &normalizer);
        }

        let format = meta.get().files.extensions.normalized;
        to_text(&document, format).map(Some)
    }

    pub async fn commit(&self) -> Result<()> {
        self.meta()?.commit().await
    }

    /// Stage everything and commit. Nothing is written unless both
    /// documents were staged.
    pub async fn prepare_all_and_commit(&self) -> Result<()> {
        self.prepare_all()?;
        self.commit().await
    }

    /// Pin the loaded version in `package.json`: the normalized document,
    /// or the source when normalization is off.
    pub fn set_main(&self) -> Result<()> {
        let meta = self.meta()?;
        let slot = if has_normalize(&self.config) {
            Slot::Normalized
        } else {
            Slot::Source
        };
        let mut manifest = PackageManifest::open(&self.manifest_path)?;
        manifest.edit(PackageEdit {
            version: Some(meta.get().info.version),
            target: Some(meta.relative_file_path(slot)),
            sync_version: self.config.sync_version,
        })
    }

    pub fn list_versions(&self) -> Result<Vec<SnapshotMetaData>> {
        list_versions(&self.root, &self.config)
    }
}

/// Every committed snapshot under the configured folder, ordered by path.
/// Unreadable meta documents are skipped with a warning.
pub fn list_versions(root: &Path, config: &SpecnovaConfig) -> Result<Vec<SnapshotMetaData>> {
    let base = root.join(snapshot_base(config));
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let meta_name = format!("{}.{}", config.snapshot.names.meta, MetaFormat::Json.as_str());

    let mut versions = Vec::new();
    for entry in WalkDir::new(&base)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&base).to_path_buf();
            SpecnovaError::io(
                path,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed")),
            )
        })?;
        if !entry.file_type().is_file() || entry.file_name().to_string_lossy() != meta_name {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        match SnapshotMeta::from_file(root, relative) {
            Ok(meta) => versions.push(meta.get()),
            Err(e) => eprintln!("Warning: skipping {}: {}", entry.path().display(), e),
        }
    }
    Ok(versions)
}
