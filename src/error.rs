//! Error types for the snapshot engine.
//!
//! Library code returns [`SpecnovaError`]; the CLI wraps it in
//! `anyhow::Error` with additional context.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the snapshot engine can report.
#[derive(Debug, Error)]
pub enum SpecnovaError {
    /// Malformed configuration, or an unsafe file name in it.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A configured path resolves outside the project root.
    #[error("invalid path '{}': escapes project root {}", path.display(), root.display())]
    InvalidPath { path: PathBuf, root: PathBuf },

    /// An orchestrator operation ran before a source was loaded.
    #[error("no OpenAPI source loaded")]
    NoSourceLoaded,

    /// An orchestrator operation ran before a snapshot meta was loaded.
    #[error("no snapshot meta loaded")]
    NoMetaLoaded,

    /// Staging or committing while another commit is in flight.
    #[error("snapshot meta is locked by an in-flight commit")]
    AlreadyLocked,

    /// I/O failure during the temp-write or rename phase of a commit.
    #[error("commit failed at {}: {source}", path.display())]
    CommitWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source could not be parsed as an OpenAPI document.
    #[error("failed to parse '{source_name}': {reason}")]
    ParseFailed { source_name: String, reason: String },

    /// Source extension is not one of json, yaml, yml.
    #[error("invalid snapshot file extension '{0}' (expected json, yaml or yml)")]
    InvalidExtension(String),

    /// The adapter chain revisited an adapter or grew past its bound.
    #[error("config adapter chain does not terminate: {}", chain.join(" -> "))]
    AdapterCycle { chain: Vec<String> },

    /// A persisted meta document is malformed.
    #[error("invalid snapshot meta: {0}")]
    MetaInvalid(String),

    /// A loaded source does not belong to the same API as the held snapshot.
    #[error("'{found}' is not a snapshot of '{expected}'")]
    SpecMismatch { expected: String, found: String },

    /// Remote fetch failed.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpecnovaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn commit(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CommitWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn parse(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ParseFailed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpecnovaError>;
