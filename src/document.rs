//! Loading and serializing OpenAPI documents.
//!
//! Documents are kept as plain [`serde_json::Value`] trees. Only the
//! `info` block is interpreted; references are left untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DocumentFormat;
use crate::error::{Result, SpecnovaError};

const FETCH_TIMEOUT_SECS: u64 = 5;
const MAX_REDIRECTS: usize = 5;

/// Identity of an API document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Value>,
}

/// A parsed document together with where it came from.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    pub source: String,
    pub info: Info,
    pub document: Value,
    pub format: DocumentFormat,
    /// Fetched over HTTP(S) rather than read from disk.
    pub is_external: bool,
}

/// Turns a source string (URL or path) into a [`ParsedSource`].
#[async_trait]
pub trait SpecLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<ParsedSource>;
}

/// Fetches `http(s)://` sources with reqwest and reads everything else
/// from disk relative to `root`.
pub struct DefaultLoader {
    root: PathBuf,
    client: reqwest::Client,
}

impl DefaultLoader {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("specnova/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpecnovaError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            root: root.into(),
            client,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_err = |reason: String| SpecnovaError::Fetch {
            url: url.to_string(),
            reason,
        };
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status)));
        }
        resp.text().await.map_err(|e| fetch_err(e.to_string()))
    }
}

#[async_trait]
impl SpecLoader for DefaultLoader {
    async fn load(&self, source: &str) -> Result<ParsedSource> {
        let is_external = is_remote(source);
        let format = source_format(source)?;

        let text = if is_external {
            self.fetch(source).await?
        } else {
            let path = self.root.join(source);
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SpecnovaError::io(path, e))?
        };

        let document = parse_text(source, &text, format)?;
        let info = extract_info_from_text(source, &text, format, &document)?;

        Ok(ParsedSource {
            source: source.to_string(),
            info,
            document,
            format,
            is_external,
        })
    }
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Format from the extension of a file path or of a URL's path component.
pub fn source_format(source: &str) -> Result<DocumentFormat> {
    let pathname = if is_remote(source) {
        let without_scheme = source.split_once("://").map(|(_, rest)| rest).unwrap_or(source);
        let without_query = without_scheme
            .split(['?', '#'])
            .next()
            .unwrap_or(without_scheme);
        without_query
            .split_once('/')
            .map(|(_, path)| path)
            .unwrap_or("")
    } else {
        source
    };
    let ext = Path::new(pathname)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    DocumentFormat::from_extension(ext).ok_or_else(|| SpecnovaError::InvalidExtension(ext.to_string()))
}

/// Parse document text. The root must be an object carrying an `openapi`
/// or `swagger` version field.
pub fn parse_text(source: &str, text: &str, format: DocumentFormat) -> Result<Value> {
    let document: Value = match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| SpecnovaError::parse(source, e))?
        }
        DocumentFormat::Yaml | DocumentFormat::Yml => {
            serde_yaml::from_str(text).map_err(|e| SpecnovaError::parse(source, e))?
        }
    };

    let Some(root) = document.as_object() else {
        return Err(SpecnovaError::parse(source, "document root is not an object"));
    };
    if !root.contains_key("openapi") && !root.contains_key("swagger") {
        return Err(SpecnovaError::parse(
            source,
            "missing 'openapi' or 'swagger' version field",
        ));
    }
    Ok(document)
}

pub fn extract_info(source: &str, document: &Value) -> Result<Info> {
    let info = document
        .get("info")
        .ok_or_else(|| SpecnovaError::parse(source, "missing 'info' block"))?;
    let field = |name: &str| -> Result<String> {
        match info.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(SpecnovaError::parse(
                source,
                format!("missing 'info.{}'", name),
            )),
        }
    };
    Ok(Info {
        title: field("title")?,
        version: field("version")?,
        license: info.get("license").cloned().filter(|l| !l.is_null()),
    })
}

#[derive(Deserialize)]
struct YamlHead {
    info: Option<YamlInfo>,
}

#[derive(Deserialize)]
struct YamlInfo {
    title: Option<String>,
    version: Option<String>,
}

/// Like [`extract_info`], but YAML `title` and `version` are taken as
/// written. An unquoted `version: 1.10` stays `"1.10"` instead of going
/// through a float.
pub fn extract_info_from_text(
    source: &str,
    text: &str,
    format: DocumentFormat,
    document: &Value,
) -> Result<Info> {
    let mut info = extract_info(source, document)?;
    if matches!(format, DocumentFormat::Yaml | DocumentFormat::Yml) {
        if let Ok(YamlHead { info: Some(raw) }) = serde_yaml::from_str::<YamlHead>(text) {
            if let Some(title) = raw.title.filter(|t| !t.is_empty()) {
                info.title = title;
            }
            if let Some(version) = raw.version.filter(|v| !v.is_empty()) {
                info.version = version;
            }
        }
    }
    Ok(info)
}

/// Serialize a document for a given slot format.
pub fn to_text(document: &Value, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Json => serde_json::to_string_pretty(document)
            .map_err(|e| SpecnovaError::parse("<document>", e)),
        DocumentFormat::Yaml | DocumentFormat::Yml => {
            serde_yaml::to_string(document).map_err(|e| SpecnovaError::parse("<document>", e))
        }
    }
}
