//! CLI command implementations.
//!
//! Each `run_*` function backs one `specnova` subcommand. Library errors are
//! wrapped with [`anyhow::Context`] so the binary can print a readable chain.
//! Commands that produce a value also return it, so `main` can forward it to
//! the GitHub Actions step output.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SpecnovaConfig;
use crate::document::{DefaultLoader, SpecLoader};
use crate::env::Env;
use crate::merge::has_normalize;
use crate::meta::SnapshotMeta;
use crate::package::PackageManifest;
use crate::plugin::define_plugin;
use crate::resolver::ConfigResolver;
use crate::snapshot::{list_versions, Snapshot};

/// Variable naming the GitHub Actions step output file.
pub const GITHUB_OUTPUT_VAR: &str = "GITHUB_OUTPUT";

/// Resolved inputs shared by every command.
pub struct Project {
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    pub config: SpecnovaConfig,
}

impl Project {
    /// Read `.env` files, resolve the config chain and locate `package.json`.
    pub fn open(cwd: &Path, package: &Path) -> Result<Self> {
        let env = Env::load(cwd).context("Failed to read environment")?;
        let config = ConfigResolver::new(env.clone())
            .resolve()
            .context("Failed to resolve specnova config")?;
        Ok(Self {
            manifest_path: env.root.join(package),
            root: env.root,
            config,
        })
    }

    fn manifest(&self) -> Result<PackageManifest> {
        Ok(PackageManifest::open(&self.manifest_path)?)
    }

    fn loader(&self) -> Result<Arc<dyn SpecLoader>> {
        Ok(Arc::new(DefaultLoader::new(&self.root)?))
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(
            &self.root,
            self.config.clone(),
            self.loader()?,
            &self.manifest_path,
        ))
    }
}

/// Fetch the origin and store it as a snapshot. Returns the fetched version.
pub async fn run_fetch(project: &Project) -> Result<String> {
    let origin = project.manifest()?.specnova()?.source;
    let mut snapshot = project.snapshot()?;
    snapshot
        .load(&origin)
        .await
        .with_context(|| format!("Failed to load {}", origin))?;

    let info = snapshot.source()?.info.clone();
    println!("Fetched {} {}", info.title, info.version);

    if !project.config.snapshot.enabled {
        println!("Snapshots are disabled (snapshot.enabled = false); nothing written.");
        return Ok(info.version);
    }

    store(project, &snapshot, &info.version).await?;
    println!(
        "Stored snapshot in {}",
        snapshot.meta()?.dir().display()
    );
    Ok(info.version)
}

async fn store(project: &Project, snapshot: &Snapshot, version: &str) -> Result<()> {
    if !has_normalize(&project.config) {
        println!("No normalization settings found; storing the source only.");
    }
    snapshot
        .prepare_all_and_commit()
        .await
        .with_context(|| format!("Failed to store snapshot {}", version))
}

/// Fetch the origin, store it and pin it in `package.json`.
pub async fn run_pull(project: &Project) -> Result<String> {
    let origin = project.manifest()?.specnova()?.source;
    let mut snapshot = project.snapshot()?;
    snapshot
        .load(&origin)
        .await
        .with_context(|| format!("Failed to load {}", origin))?;

    let info = snapshot.source()?.info.clone();
    println!("Fetched {} {}", info.title, info.version);

    if !project.config.snapshot.enabled {
        println!("Snapshots are disabled (snapshot.enabled = false); nothing written or pinned.");
        return Ok(info.version);
    }

    store(project, &snapshot, &info.version).await?;
    snapshot
        .set_main()
        .with_context(|| format!("Failed to update {}", project.manifest_path.display()))?;
    println!("Pinned {} in {}", info.version, project.manifest_path.display());
    Ok(info.version)
}

/// Compare the pinned version with the origin's. Returns true when the
/// origin has moved on.
pub async fn run_lookup(project: &Project) -> Result<bool> {
    let package = project.manifest()?.specnova()?;
    let origin = project
        .loader()?
        .load(&package.source)
        .await
        .with_context(|| format!("Failed to load {}", package.source))?;

    let pinned = package.version.unwrap_or_default();
    if pinned == origin.info.version {
        println!("Local snapshot is up to date ({}).", pinned);
        return Ok(false);
    }
    let shown = if pinned.is_empty() { "none" } else { pinned.as_str() };
    println!("Update available: {} -> {}", shown, origin.info.version);
    Ok(true)
}

/// Print the resolved config.
pub fn run_config(project: &Project, json: bool) -> Result<()> {
    if json {
        let registration = define_plugin(project.config.clone());
        println!("{}", serde_json::to_string_pretty(&registration)?);
    } else {
        print!("{}", toml::to_string_pretty(&project.config)?);
    }
    Ok(())
}

/// Check stored digests of a version (the pinned one by default).
/// Fails when any recorded digest no longer matches its file.
pub async fn run_verify(project: &Project, version: Option<String>) -> Result<()> {
    let version = match version {
        Some(version) => version,
        None => match project.manifest()?.specnova()?.version {
            Some(version) => version,
            None => bail!("No version given and none pinned in package.json"),
        },
    };
    let meta = SnapshotMeta::pull(&version, &project.config, &project.root)
        .with_context(|| format!("No readable snapshot for version {}", version))?;
    let report = meta.verify().await;

    for (name, state) in [("source", report.source), ("normalized", report.normalized)] {
        let status = match state {
            Some(true) => "ok",
            Some(false) => "MISMATCH",
            None => "not recorded",
        };
        println!("  {:<12} {}", name, status);
    }

    if !report.is_clean() {
        bail!("Snapshot {} does not match its recorded digests", version);
    }
    println!("Snapshot {} verified.", version);
    Ok(())
}

/// List stored snapshot versions.
pub fn run_list(project: &Project) -> Result<()> {
    let versions = list_versions(&project.root, &project.config)?;
    if versions.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }
    let pinned = project
        .manifest()
        .ok()
        .and_then(|m| m.specnova().ok())
        .and_then(|p| p.version);

    println!("{:<3}{:<16} {:<30} PATH", "", "VERSION", "TITLE");
    for meta in versions {
        let marker = if pinned.as_deref() == Some(meta.info.version.as_str()) {
            "*"
        } else {
            ""
        };
        println!(
            "{:<3}{:<16} {:<30} {}",
            marker, meta.info.version, meta.info.title, meta.path
        );
    }
    Ok(())
}

/// Append `name=value` to the file named by `$GITHUB_OUTPUT`, if set.
pub fn write_github_output(name: &str, value: &str) -> Result<()> {
    let Some(path) = std::env::var_os(GITHUB_OUTPUT_VAR) else {
        return Ok(());
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", PathBuf::from(&path).display()))?;
    writeln!(file, "{}={}", name, value)?;
    Ok(())
}
