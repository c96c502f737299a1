//! Environment inputs for config resolution.
//!
//! Two variables locate the config file:
//!
//! | Variable | Default | Constraint |
//! |----------|---------|------------|
//! | `SPECNOVA_CONFIG_PATH` | project root | relative directory inside the project root |
//! | `SPECNOVA_CONFIG_FILE` | `specnova.toml` | bare file name ending in `.toml` or `.json` |
//!
//! `.env` files in the project root are read first and never override
//! variables already set in the process environment. Among the files, the
//! more specific one wins: `.env.local` over `.env`, and so on down the list.

use std::path::{Component, Path, PathBuf};

use crate::config::is_safe_segment;
use crate::error::{Result, SpecnovaError};

pub const CONFIG_PATH_VAR: &str = "SPECNOVA_CONFIG_PATH";
pub const CONFIG_FILE_VAR: &str = "SPECNOVA_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "specnova.toml";

const DOTENV_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.dev",
    ".env.prod",
    ".env.development",
    ".env.production",
];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "json"];

/// Validated locations the resolver reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
    /// Project root; every other path must stay inside it.
    pub root: PathBuf,
    /// Directory holding the config file.
    pub config_dir: PathBuf,
    /// Bare config file name.
    pub config_file: String,
}

impl Env {
    /// Defaults for `root`, without consulting the environment.
    pub fn defaults(root: impl Into<PathBuf>) -> Self {
        let mut root: PathBuf = root.into();
        if root.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                root = cwd.join(root);
            }
        }
        let root = normalize_lexically(&root);
        Self {
            config_dir: root.clone(),
            root,
            config_file: DEFAULT_CONFIG_FILE.to_string(),
        }
    }

    /// Read `.env` files under `root`, then the process environment.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        load_dotenv_files(&root);
        Self::from_lookup(root, |key| std::env::var(key).ok())
    }

    /// Build from an explicit variable lookup (hermetic for tests).
    pub fn from_lookup<F>(root: impl Into<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Self::defaults(root);

        if let Some(dir) = lookup(CONFIG_PATH_VAR).filter(|v| !v.trim().is_empty()) {
            env.config_dir = resolve_within(&env.root, dir.trim())?;
        }

        if let Some(file) = lookup(CONFIG_FILE_VAR).filter(|v| !v.trim().is_empty()) {
            env.config_file = validate_config_file(file.trim())?;
        }

        Ok(env)
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(&self.config_file)
    }
}

/// dotenvy never overwrites a variable that is already set, so the files
/// are read from the most specific to `.env`.
fn load_dotenv_files(root: &Path) {
    for name in DOTENV_FILES.iter().rev() {
        let path = root.join(name);
        if path.is_file() {
            if let Err(e) = dotenvy::from_path(&path) {
                eprintln!("Warning: could not read {}: {}", path.display(), e);
            }
        }
    }
}

/// Resolve `path` against `root` lexically and reject anything that ends up
/// outside of it.
pub fn resolve_within(root: &Path, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved = normalize_lexically(&joined);
    let base = normalize_lexically(root);

    if !resolved.starts_with(&base) {
        return Err(SpecnovaError::InvalidPath {
            path: resolved,
            root: base,
        });
    }
    Ok(resolved)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn validate_config_file(file: &str) -> Result<String> {
    if !is_safe_segment(file) {
        return Err(SpecnovaError::ConfigInvalid(format!(
            "{} '{}' must be a bare file name",
            CONFIG_FILE_VAR, file
        )));
    }
    let accepted = Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CONFIG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !accepted {
        return Err(SpecnovaError::ConfigInvalid(format!(
            "{} '{}': extension not accepted (expected {})",
            CONFIG_FILE_VAR,
            file,
            CONFIG_EXTENSIONS.join(", ")
        )));
    }
    Ok(file.to_string())
}
