//! Configuration types and config file parsing.
//!
//! [`SpecnovaConfig`] is the fully resolved tree: every field is populated,
//! either from the compiled-in defaults or from an override. Partial trees
//! (config files, host plugin settings) are read as [`serde_json::Value`]
//! and folded on top of the defaults by [`crate::merge`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{Result, SpecnovaError};

pub const SNAPSHOTS_DIR: &str = ".snapshots";
const SOURCE_FILENAME: &str = "source";
const NORMALIZED_FILENAME: &str = "normalized";
const META_FILENAME: &str = "meta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecnovaConfig {
    /// Copy the pinned spec version into the package's own `version`.
    pub sync_version: bool,
    pub merge_inputs: bool,
    /// Normalization settings; `false` or `null` disables normalization.
    #[serde(deserialize_with = "toggle")]
    pub normalized: Option<ParserConfig>,
    pub snapshot: SnapshotConfig,
}

impl Default for SpecnovaConfig {
    fn default() -> Self {
        Self {
            sync_version: false,
            merge_inputs: false,
            normalized: Some(ParserConfig::default()),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl SpecnovaConfig {
    /// Check invariants the type system does not carry: snapshot file names
    /// must be bare, safe file names.
    pub fn validate(&self) -> Result<()> {
        let names = &self.snapshot.names;
        for (slot, name) in [
            ("source", &names.source),
            ("normalized", &names.normalized),
            ("meta", &names.meta),
        ] {
            if !is_safe_segment(name) {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "snapshot.names.{} '{}' is not a safe file name",
                    slot, name
                )));
            }
        }
        if names.source == names.normalized
            || names.source == names.meta
            || names.normalized == names.meta
        {
            return Err(SpecnovaError::ConfigInvalid(
                "snapshot.names must be distinct".to_string(),
            ));
        }
        let folder = &self.snapshot.folder;
        if folder.root().trim().is_empty() {
            return Err(SpecnovaError::ConfigInvalid(
                "snapshot.folder must not be empty".to_string(),
            ));
        }
        if let SnapshotFolder::Nested { subfolder, .. } = folder {
            if !is_safe_segment(subfolder) {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "snapshot.folder.subfolder '{}' is not a safe directory name",
                    subfolder
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    #[serde(deserialize_with = "toggle")]
    pub operation_id: Option<OperationIdConfig>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            operation_id: Some(OperationIdConfig::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationIdConfig {
    /// Word used for the root path (`/` becomes `getRoot`).
    pub root_word: String,
    pub method_position: MethodPosition,
    pub case: CaseStyle,
    pub param: ParamStyle,
    pub ignore: Ignore,
}

impl Default for OperationIdConfig {
    fn default() -> Self {
        Self {
            root_word: "root".to_string(),
            method_position: MethodPosition::Prefix,
            case: CaseStyle::Camel,
            param: ParamStyle::By,
            ignore: Ignore::Flag(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodPosition {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStyle {
    Snake,
    Camel,
    Pascal,
    Kebab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamStyle {
    By,
    Inline,
}

/// Which operations keep their original id.
///
/// `true` skips every operation. A pattern list skips operations whose
/// path matches one of the globs; a pattern may be prefixed with an HTTP
/// method (`"DELETE /admin/**"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ignore {
    Flag(bool),
    Patterns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub folder: SnapshotFolder,
    pub names: FileNames,
    pub extensions: FileExtensions,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: SnapshotFolder::Path(SNAPSHOTS_DIR.to_string()),
            names: FileNames::default(),
            extensions: FileExtensions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotFolder {
    Path(String),
    Nested { root: String, subfolder: String },
}

impl SnapshotFolder {
    pub fn root(&self) -> &str {
        match self {
            SnapshotFolder::Path(root) => root,
            SnapshotFolder::Nested { root, .. } => root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub source: String,
    pub normalized: String,
    pub meta: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            source: SOURCE_FILENAME.to_string(),
            normalized: NORMALIZED_FILENAME.to_string(),
            meta: META_FILENAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileExtensions {
    pub source: SnapshotExtension,
    pub normalized: SnapshotExtension,
    pub meta: MetaFormat,
}

impl Default for FileExtensions {
    fn default() -> Self {
        Self {
            source: SnapshotExtension::Infer,
            normalized: SnapshotExtension::Json,
            meta: MetaFormat::Json,
        }
    }
}

/// Configured extension of a document slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotExtension {
    Json,
    Yaml,
    Yml,
    /// Use the format of the fetched source.
    Infer,
}

/// Concrete format of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Yaml,
    Yml,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(DocumentFormat::Json),
            "yaml" => Some(DocumentFormat::Yaml),
            "yml" => Some(DocumentFormat::Yml),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Yaml => "yaml",
            DocumentFormat::Yml => "yml",
        }
    }
}

/// The meta document is always JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaFormat {
    #[default]
    Json,
}

impl MetaFormat {
    pub fn as_str(&self) -> &'static str {
        "json"
    }
}

/// Read a partial config tree from a TOML or JSON file.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_partial(path: &Path) -> Result<Option<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SpecnovaError::io(path, e)),
    };

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let value: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| {
            SpecnovaError::ConfigInvalid(format!("{}: {}", path.display(), e))
        })?
    } else {
        toml::from_str(&content).map_err(|e| {
            SpecnovaError::ConfigInvalid(format!("{}: {}", path.display(), e))
        })?
    };

    if !value.is_object() {
        return Err(SpecnovaError::ConfigInvalid(format!(
            "{}: expected a table at the top level",
            path.display()
        )));
    }
    Ok(Some(value))
}

/// A bare file or directory name: no separators, no `.`/`..`.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '@'))
}

/// Accepts `false`/`null` as "off" and `true` as "on with defaults".
fn toggle<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Toggle<T> {
        Flag(bool),
        Value(T),
    }

    Ok(match Option::<Toggle<T>>::deserialize(deserializer)? {
        None | Some(Toggle::Flag(false)) => None,
        Some(Toggle::Flag(true)) => Some(T::default()),
        Some(Toggle::Value(value)) => Some(value),
    })
}
