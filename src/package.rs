//! The `specnova` block of `package.json`.
//!
//! ```json
//! {
//!   "name": "my-sdk",
//!   "version": "1.2.0",
//!   "specnova": {
//!     "source": "https://api.example.com/openapi.json",
//!     "version": "1.2.0",
//!     "branch": { "target": ".snapshots/1.2.0/normalized.json" }
//!   }
//! }
//! ```
//!
//! `source` is the origin to fetch from; `branch.target` is the pinned local
//! snapshot the SDK is generated from. Edits rewrite the file as pretty JSON
//! and leave every other key where it was.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Result, SpecnovaError};

pub const DEFAULT_PACKAGE_FILE: &str = "package.json";
const SPECNOVA_KEY: &str = "specnova";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecnovaPackage {
    /// Origin URL or local path of the spec.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
}

impl SpecnovaPackage {
    pub fn target(&self) -> Option<&str> {
        self.branch
            .as_ref()
            .map(|b| b.target.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub target: String,
}

/// Fields to update in the `specnova` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageEdit {
    pub version: Option<String>,
    pub target: Option<String>,
    /// Also copy `version` into the package's own top-level version.
    pub sync_version: bool,
}

#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    document: Map<String, Value>,
}

impl PackageManifest {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "{} not found",
                    path.display()
                )))
            }
            Err(e) => return Err(SpecnovaError::io(&path, e)),
        };
        let document = match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "{}: expected a JSON object",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The package's own `version`.
    pub fn version(&self) -> Option<&str> {
        self.document.get("version").and_then(Value::as_str)
    }

    pub fn specnova(&self) -> Result<SpecnovaPackage> {
        let block = self.document.get(SPECNOVA_KEY).ok_or_else(|| {
            SpecnovaError::ConfigInvalid(format!(
                "{}: missing '{}' block",
                self.path.display(),
                SPECNOVA_KEY
            ))
        })?;
        let package: SpecnovaPackage = serde_json::from_value(block.clone()).map_err(|e| {
            SpecnovaError::ConfigInvalid(format!("{}: {}: {}", self.path.display(), SPECNOVA_KEY, e))
        })?;
        if package.source.trim().is_empty() {
            return Err(SpecnovaError::ConfigInvalid(format!(
                "{}: '{}.source' must be a URL or local path",
                self.path.display(),
                SPECNOVA_KEY
            )));
        }
        Ok(package)
    }

    /// Apply `edit` and write the file back.
    pub fn edit(&mut self, edit: PackageEdit) -> Result<()> {
        self.specnova()?;
        let block = self
            .document
            .entry(SPECNOVA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(block) = block else {
            return Err(SpecnovaError::ConfigInvalid(format!(
                "'{}' must be an object",
                SPECNOVA_KEY
            )));
        };

        if let Some(version) = &edit.version {
            block.insert("version".to_string(), Value::String(version.clone()));
        }
        if let Some(target) = &edit.target {
            let branch = block
                .entry("branch")
                .or_insert_with(|| Value::Object(Map::new()));
            if !branch.is_object() {
                *branch = Value::Object(Map::new());
            }
            if let Value::Object(branch) = branch {
                branch.insert("target".to_string(), Value::String(target.clone()));
            }
        }
        if edit.sync_version {
            if let Some(version) = edit.version {
                self.document
                    .insert("version".to_string(), Value::String(version));
            }
        }

        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut text = serde_json::to_string_pretty(&self.document)
            .map_err(|e| SpecnovaError::ConfigInvalid(e.to_string()))?;
        text.push('\n');
        std::fs::write(&self.path, text).map_err(|e| SpecnovaError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PACKAGE: &str = r#"{
  "name": "my-sdk",
  "version": "0.1.0",
  "scripts": { "gen": "openapi-ts" },
  "specnova": {
    "source": "https://api.example.com/openapi.json",
    "version": "1.0.0"
  },
  "private": true
}
"#;

    fn write_package(tmp: &TempDir, text: &str) -> PathBuf {
        let path = tmp.path().join(DEFAULT_PACKAGE_FILE);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_read_specnova_block() {
        let tmp = TempDir::new().unwrap();
        let manifest = PackageManifest::open(write_package(&tmp, PACKAGE)).unwrap();
        let block = manifest.specnova().unwrap();
        assert_eq!(block.source, "https://api.example.com/openapi.json");
        assert_eq!(block.version.as_deref(), Some("1.0.0"));
        assert_eq!(block.target(), None);
        assert_eq!(manifest.version(), Some("0.1.0"));
    }

    #[test]
    fn test_edit_preserves_key_order() {
        let tmp = TempDir::new().unwrap();
        let path = write_package(&tmp, PACKAGE);
        let mut manifest = PackageManifest::open(&path).unwrap();
        manifest
            .edit(PackageEdit {
                version: Some("1.1.0".to_string()),
                target: Some(".snapshots/1.1.0/normalized.json".to_string()),
                sync_version: false,
            })
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        let keys: Vec<String> = serde_json::from_str::<Map<String, Value>>(&text)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, ["name", "version", "scripts", "specnova", "private"]);

        let reopened = PackageManifest::open(&path).unwrap();
        let block = reopened.specnova().unwrap();
        assert_eq!(block.version.as_deref(), Some("1.1.0"));
        assert_eq!(block.target(), Some(".snapshots/1.1.0/normalized.json"));
        assert_eq!(reopened.version(), Some("0.1.0"));
    }

    #[test]
    fn test_edit_syncs_package_version() {
        let tmp = TempDir::new().unwrap();
        let path = write_package(&tmp, PACKAGE);
        let mut manifest = PackageManifest::open(&path).unwrap();
        manifest
            .edit(PackageEdit {
                version: Some("2.0.0".to_string()),
                target: None,
                sync_version: true,
            })
            .unwrap();
        assert_eq!(PackageManifest::open(&path).unwrap().version(), Some("2.0.0"));
    }

    #[test]
    fn test_missing_file_or_block() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            PackageManifest::open(tmp.path().join("package.json")),
            Err(SpecnovaError::ConfigInvalid(_))
        ));

        let manifest =
            PackageManifest::open(write_package(&tmp, r#"{"name":"x"}"#)).unwrap();
        assert!(matches!(
            manifest.specnova(),
            Err(SpecnovaError::ConfigInvalid(_))
        ));

        let manifest =
            PackageManifest::open(write_package(&tmp, r#"{"specnova":{"source":""}}"#)).unwrap();
        assert!(manifest.specnova().is_err());
    }
}
