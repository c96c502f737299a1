//! Operation id normalization.
//!
//! Derives a deterministic operation id from an HTTP method and a path
//! template:
//!
//! | Method | Path | camel | snake |
//! |--------|------|-------|-------|
//! | `GET` | `/users/{id}` | `getUsersById` | `get_users_by_id` |
//! | `POST` | `/` | `postRoot` | `post_root` |
//! | `GET` | `/orgs/{org}/repos/{repo}` | `getOrgsReposByOrgAndRepo` | `get_orgs_repos_by_org_repo` |
//!
//! [`normalize_document`] applies the transform to every operation of a
//! parsed OpenAPI document.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CaseStyle, Ignore, MethodPosition, OperationIdConfig, ParamStyle};
use crate::error::{Result, SpecnovaError};

const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

type IgnorePredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Normalize a single operation id.
///
/// Pure and total: any `(path, method)` pair yields a string. Ignore
/// patterns that fail to compile are treated as not matching.
pub fn normalize(raw_id: &str, path: &str, method: &str, config: &OperationIdConfig) -> String {
    match OperationIdNormalizer::new(config) {
        Ok(normalizer) => normalizer.normalize(raw_id, path, method),
        Err(_) => {
            let mut fallback = config.clone();
            fallback.ignore = Ignore::Flag(false);
            OperationIdNormalizer::compiled(fallback, Vec::new()).normalize(raw_id, path, method)
        }
    }
}

/// A normalizer with its ignore rules compiled once.
#[derive(Clone)]
pub struct OperationIdNormalizer {
    config: OperationIdConfig,
    rules: Vec<IgnoreRule>,
    predicate: Option<IgnorePredicate>,
}

#[derive(Clone)]
struct IgnoreRule {
    method: Option<String>,
    paths: GlobSet,
}

impl OperationIdNormalizer {
    pub fn new(config: &OperationIdConfig) -> Result<Self> {
        let rules = match &config.ignore {
            Ignore::Flag(_) => Vec::new(),
            Ignore::Patterns(patterns) => patterns
                .iter()
                .map(|p| compile_rule(p))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self::compiled(config.clone(), rules))
    }

    fn compiled(config: OperationIdConfig, rules: Vec<IgnoreRule>) -> Self {
        Self {
            config,
            rules,
            predicate: None,
        }
    }

    /// Attach a `(path, method) -> skip` predicate, checked in addition to
    /// the configured ignore rules.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn config(&self) -> &OperationIdConfig {
        &self.config
    }

    fn is_ignored(&self, path: &str, method: &str) -> bool {
        if self.config.ignore == Ignore::Flag(true) {
            return true;
        }
        if let Some(predicate) = &self.predicate {
            if predicate(path, method) {
                return true;
            }
        }
        self.rules.iter().any(|rule| {
            let method_ok = rule
                .method
                .as_deref()
                .map(|m| m.eq_ignore_ascii_case(method))
                .unwrap_or(true);
            method_ok && rule.paths.is_match(path)
        })
    }

    pub fn normalize(&self, raw_id: &str, path: &str, method: &str) -> String {
        if self.is_ignored(path, method) {
            return raw_id.to_string();
        }

        let config = &self.config;
        let method = method.to_lowercase();

        if path.is_empty() || path == "/" {
            let mut tokens = vec![method, config.root_word.clone()];
            if config.method_position == MethodPosition::Suffix {
                tokens.reverse();
            }
            return to_case(config.case, &tokens);
        }

        let mut resource_tokens: Vec<String> = Vec::new();
        let mut param_tokens: Vec<String> = Vec::new();

        for segment in path.trim_matches('/').split('/') {
            if let Some(name) = path_param(segment) {
                match config.param {
                    ParamStyle::By => param_tokens.push(name),
                    ParamStyle::Inline => resource_tokens.push(name),
                }
            } else {
                resource_tokens.extend(to_tokens(segment));
            }
        }

        match config.method_position {
            MethodPosition::Prefix => resource_tokens.insert(0, method),
            MethodPosition::Suffix => resource_tokens.push(method),
        }

        let base = to_case(config.case, &resource_tokens);

        let suffix = if !param_tokens.is_empty() && config.param == ParamStyle::By {
            match config.case {
                CaseStyle::Snake | CaseStyle::Kebab => {
                    let sep = if config.case == CaseStyle::Snake { "_" } else { "-" };
                    format!("{sep}by{sep}{}", param_tokens.join(sep))
                }
                CaseStyle::Camel | CaseStyle::Pascal => {
                    let joined: Vec<String> =
                        param_tokens.iter().map(|p| capitalize_first(p)).collect();
                    format!("By{}", joined.join("And"))
                }
            }
        } else {
            String::new()
        };

        format!("{}{}", base, suffix)
    }
}

fn compile_rule(pattern: &str) -> Result<IgnoreRule> {
    let pattern = pattern.trim();
    let (method, glob) = match pattern.split_once(char::is_whitespace) {
        Some((method, glob)) if !method.starts_with('/') => {
            (Some(method.to_string()), glob.trim())
        }
        _ => (None, pattern),
    };
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new(glob).map_err(|e| {
        SpecnovaError::ConfigInvalid(format!("ignore pattern '{}': {}", pattern, e))
    })?);
    let paths = builder.build().map_err(|e| {
        SpecnovaError::ConfigInvalid(format!("ignore pattern '{}': {}", pattern, e))
    })?;
    Ok(IgnoreRule { method, paths })
}

/// `{name}` → `name`.
fn path_param(segment: &str) -> Option<String> {
    if segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}') {
        Some(segment.replace(['{', '}'], ""))
    } else {
        None
    }
}

/// Split a segment into alphanumeric words.
fn to_tokens(segment: &str) -> Vec<String> {
    segment
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn to_case(style: CaseStyle, tokens: &[String]) -> String {
    match style {
        CaseStyle::Snake => tokens.join("_").to_lowercase(),
        CaseStyle::Kebab => tokens.join("-").to_lowercase(),
        CaseStyle::Camel => tokens
            .iter()
            .enumerate()
            .map(|(i, tok)| {
                if i == 0 {
                    tok.to_lowercase()
                } else {
                    capitalize(tok)
                }
            })
            .collect(),
        CaseStyle::Pascal => tokens.iter().map(|tok| capitalize(tok)).collect(),
    }
}

/// Upper-case the first char and lower-case the rest.
fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => {
            let rest = chars.as_str().to_lowercase();
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    }
}

/// Upper-case the first char, leave the rest as is.
fn capitalize_first(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rewrite the `operationId` of every operation under `paths`.
///
/// Operations without an id are normalized from `""`. When several
/// operations end up with the same id, each of them gets a 1-based index
/// suffix in document order. Returns the number of operations visited.
pub fn normalize_document(document: &mut Value, normalizer: &OperationIdNormalizer) -> usize {
    let Some(paths) = document.get_mut("paths").and_then(Value::as_object_mut) else {
        return 0;
    };

    let mut assigned: Vec<(String, String, String)> = Vec::new();
    for (path, item) in paths.iter() {
        let Some(item) = item.as_object() else {
            continue;
        };
        for method in HTTP_METHODS {
            let Some(operation) = item.get(*method).and_then(Value::as_object) else {
                continue;
            };
            let raw = operation
                .get("operationId")
                .and_then(Value::as_str)
                .unwrap_or("");
            let id = normalizer.normalize(raw, path, method);
            assigned.push((path.clone(), method.to_string(), id));
        }
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, _, id) in &assigned {
        *counts.entry(id.as_str()).or_default() += 1;
    }
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut final_ids = Vec::with_capacity(assigned.len());
    for (path, method, id) in &assigned {
        let unique = if counts.get(id.as_str()).copied().unwrap_or(0) > 1 {
            let n = seen.entry(id.clone()).or_default();
            *n += 1;
            format!("{}{}", id, n)
        } else {
            id.clone()
        };
        final_ids.push((path.clone(), method.clone(), unique));
    }

    for (path, method, id) in &final_ids {
        if let Some(operation) = paths
            .get_mut(path)
            .and_then(|item| item.get_mut(method.as_str()))
            .and_then(Value::as_object_mut)
        {
            operation.insert("operationId".to_string(), Value::String(id.clone()));
        }
    }

    final_ids.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> OperationIdConfig {
        OperationIdConfig::default()
    }

    fn with_case(case: CaseStyle) -> OperationIdConfig {
        OperationIdConfig { case, ..cfg() }
    }

    #[test]
    fn test_default_camel() {
        assert_eq!(normalize("x", "/users/{id}", "GET", &cfg()), "getUsersById");
        assert_eq!(normalize("x", "/", "POST", &cfg()), "postRoot");
        assert_eq!(normalize("x", "", "delete", &cfg()), "deleteRoot");
    }

    #[test]
    fn test_case_styles() {
        assert_eq!(
            normalize("x", "/users/{id}", "GET", &with_case(CaseStyle::Snake)),
            "get_users_by_id"
        );
        assert_eq!(
            normalize("x", "/users/{id}", "GET", &with_case(CaseStyle::Kebab)),
            "get-users-by-id"
        );
        assert_eq!(
            normalize("x", "/users/{id}", "GET", &with_case(CaseStyle::Pascal)),
            "GetUsersById"
        );
    }

    #[test]
    fn test_multiple_params() {
        assert_eq!(
            normalize("x", "/orgs/{org}/repos/{repo}", "get", &cfg()),
            "getOrgsReposByOrgAndRepo"
        );
        assert_eq!(
            normalize(
                "x",
                "/orgs/{org}/repos/{repo}",
                "get",
                &with_case(CaseStyle::Snake)
            ),
            "get_orgs_repos_by_org_repo"
        );
    }

    #[test]
    fn test_inline_params_and_suffix() {
        let config = OperationIdConfig {
            param: ParamStyle::Inline,
            method_position: MethodPosition::Suffix,
            ..cfg()
        };
        assert_eq!(normalize("x", "/users/{id}", "GET", &config), "usersIdGet");
        assert_eq!(normalize("x", "/", "GET", &config), "rootGet");
    }

    #[test]
    fn test_sanitizes_segments() {
        assert_eq!(
            normalize("x", "/api/v1/user-profiles/", "PATCH", &cfg()),
            "patchApiV1UserProfiles"
        );
        assert_eq!(
            normalize("x", "/pets.json", "get", &with_case(CaseStyle::Snake)),
            "get_pets_json"
        );
    }

    #[test]
    fn test_degenerate_paths_do_not_panic() {
        assert_eq!(normalize("x", "//", "GET", &cfg()), "get");
        assert_eq!(normalize("x", "/{}", "GET", &cfg()), "getBy");
        let empty_root = OperationIdConfig {
            root_word: String::new(),
            ..cfg()
        };
        assert_eq!(normalize("x", "/", "GET", &empty_root), "get");
    }

    #[test]
    fn test_deterministic() {
        let a = normalize("id", "/users/{id}", "GET", &cfg());
        let b = normalize("id", "/users/{id}", "GET", &cfg());
        assert_eq!(a, b);
    }

    #[test]
    fn test_ignore_flag_short_circuits() {
        let config = OperationIdConfig {
            ignore: Ignore::Flag(true),
            ..cfg()
        };
        for (path, method) in [("/", "GET"), ("/users/{id}", "POST"), ("", "put")] {
            assert_eq!(normalize("keepMe", path, method, &config), "keepMe");
        }
    }

    #[test]
    fn test_ignore_patterns() {
        let config = OperationIdConfig {
            ignore: Ignore::Patterns(vec![
                "/internal/**".to_string(),
                "DELETE /users/*".to_string(),
            ]),
            ..cfg()
        };
        let normalizer = OperationIdNormalizer::new(&config).unwrap();
        assert_eq!(normalizer.normalize("raw", "/internal/health", "get"), "raw");
        assert_eq!(normalizer.normalize("raw", "/users/{id}", "delete"), "raw");
        assert_eq!(
            normalizer.normalize("raw", "/users/{id}", "get"),
            "getUsersById"
        );
    }

    #[test]
    fn test_ignore_predicate() {
        let normalizer = OperationIdNormalizer::new(&cfg())
            .unwrap()
            .with_predicate(|path, _| path.starts_with("/legacy"));
        assert_eq!(normalizer.normalize("old", "/legacy/thing", "get"), "old");
        assert_eq!(normalizer.normalize("old", "/thing", "get"), "getThing");
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let config = OperationIdConfig {
            ignore: Ignore::Patterns(vec!["/a/[".to_string()]),
            ..cfg()
        };
        assert!(OperationIdNormalizer::new(&config).is_err());
        assert_eq!(normalize("x", "/a/b", "get", &config), "getAB");
    }

    #[test]
    fn test_normalize_document() {
        let mut doc = json!({
            "openapi": "3.1.0",
            "paths": {
                "/users/{id}": {
                    "get": { "operationId": "fetchUser" },
                    "delete": {},
                    "parameters": []
                },
                "/": { "post": { "operationId": "create" } }
            }
        });
        let normalizer = OperationIdNormalizer::new(&cfg()).unwrap();
        let count = normalize_document(&mut doc, &normalizer);
        assert_eq!(count, 3);
        assert_eq!(doc["paths"]["/users/{id}"]["get"]["operationId"], "getUsersById");
        assert_eq!(
            doc["paths"]["/users/{id}"]["delete"]["operationId"],
            "deleteUsersById"
        );
        assert_eq!(doc["paths"]["/"]["post"]["operationId"], "postRoot");
        assert_eq!(doc["paths"]["/users/{id}"]["parameters"], json!([]));
    }

    #[test]
    fn test_normalize_document_makes_ids_unique() {
        let mut doc = json!({
            "paths": {
                "/users/{id}": { "get": {} },
                "/users/{uid}": { "get": {} },
                "/teams": { "get": {} }
            }
        });
        let config = OperationIdConfig {
            param: ParamStyle::Inline,
            ..cfg()
        };
        let normalizer = OperationIdNormalizer::new(&config).unwrap();
        normalize_document(&mut doc, &normalizer);
        assert_eq!(doc["paths"]["/users/{id}"]["get"]["operationId"], "getUsersId");
        assert_eq!(doc["paths"]["/users/{uid}"]["get"]["operationId"], "getUsersUid");

        let mut doc = json!({
            "paths": {
                "/a-b": { "get": {} },
                "/a_b": { "get": {} },
                "/teams": { "get": {} }
            }
        });
        let normalizer = OperationIdNormalizer::new(&cfg()).unwrap();
        normalize_document(&mut doc, &normalizer);
        assert_eq!(doc["paths"]["/a-b"]["get"]["operationId"], "getAB1");
        assert_eq!(doc["paths"]["/a_b"]["get"]["operationId"], "getAB2");
        assert_eq!(doc["paths"]["/teams"]["get"]["operationId"], "getTeams");
    }

    #[test]
    fn test_normalize_document_without_paths() {
        let mut doc = json!({ "openapi": "3.0.0" });
        let normalizer = OperationIdNormalizer::new(&cfg()).unwrap();
        assert_eq!(normalize_document(&mut doc, &normalizer), 0);
    }
}
