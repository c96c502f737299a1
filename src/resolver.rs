//! Config resolution through a chain of adapters.
//!
//! Resolution starts at the entry adapter (the config file by default). Each
//! adapter returns a partial override tree and may name the next adapter to
//! consult, which lets a project keep its settings inside another tool's
//! config (e.g. the `@hey-api/openapi-ts` plugin list).
//!
//! ```text
//! specnova.toml ──adapter="hey-api"──▶ openapi-ts.config.json
//!      │                                        │
//!      ▼                                        ▼
//!  overrides[0]                             overrides[1]
//!
//! defaults ◀── overrides[1] ◀── overrides[0]      (outer file wins)
//! ```
//!
//! The chain is bounded by [`MAX_ADAPTER_DEPTH`]; revisiting an adapter is
//! reported as [`SpecnovaError::AdapterCycle`].

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::{read_partial, SpecnovaConfig};
use crate::env::Env;
use crate::error::{Result, SpecnovaError};
use crate::merge::merge_with_defaults;
use crate::plugin::{PLUGIN_NAME, SCOPED_PLUGIN_NAME};

pub const MAX_ADAPTER_DEPTH: usize = 8;
pub const FILE_ADAPTER: &str = "default";
pub const HEY_API_ADAPTER: &str = "hey-api";
pub const HEY_API_CONFIG_FILE: &str = "openapi-ts.config.json";

/// Key in the config file naming the next adapter.
const ADAPTER_KEY: &str = "adapter";

/// What one adapter contributes to the resolved config.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    /// Partial config tree, snake_case keys.
    pub overrides: Value,
    /// Adapter to consult after this one.
    pub next: Option<String>,
}

impl AdapterOutput {
    pub fn empty() -> Self {
        Self {
            overrides: Value::Object(Map::new()),
            next: None,
        }
    }
}

/// A source of config overrides.
pub trait ConfigAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Produce overrides given the compiled-in defaults and environment.
    fn transform(&self, defaults: &SpecnovaConfig, env: &Env) -> Result<AdapterOutput>;
}

/// Reads `specnova.toml` (or the file named by `SPECNOVA_CONFIG_FILE`).
#[derive(Debug, Default)]
pub struct FileAdapter;

impl ConfigAdapter for FileAdapter {
    fn name(&self) -> &str {
        FILE_ADAPTER
    }

    fn transform(&self, _defaults: &SpecnovaConfig, env: &Env) -> Result<AdapterOutput> {
        let path = env.config_file_path();
        let Some(Value::Object(mut table)) = read_partial(&path)? else {
            return Ok(AdapterOutput::empty());
        };

        let next = match table.remove(ADAPTER_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(other) => {
                return Err(SpecnovaError::ConfigInvalid(format!(
                    "{}: '{}' must be a string, got {}",
                    path.display(),
                    ADAPTER_KEY,
                    other
                )))
            }
        };

        Ok(AdapterOutput {
            overrides: Value::Object(table),
            next,
        })
    }
}

/// Reads the `specnova` entry of the `plugins` list in
/// `openapi-ts.config.json`.
#[derive(Debug, Default)]
pub struct HeyApiAdapter;

impl ConfigAdapter for HeyApiAdapter {
    fn name(&self) -> &str {
        HEY_API_ADAPTER
    }

    fn transform(&self, _defaults: &SpecnovaConfig, env: &Env) -> Result<AdapterOutput> {
        let path = env.config_dir.join(HEY_API_CONFIG_FILE);
        let Some(config) = read_partial(&path)? else {
            return Ok(AdapterOutput::empty());
        };

        let plugin_config = config
            .get("plugins")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|plugin| {
                matches!(
                    plugin.get("name").and_then(Value::as_str),
                    Some(PLUGIN_NAME) | Some(SCOPED_PLUGIN_NAME)
                )
            })
            .filter_map(|plugin| plugin.get("config"))
            .last();

        Ok(AdapterOutput {
            overrides: plugin_config
                .map(snake_case_keys)
                .unwrap_or_else(|| Value::Object(Map::new())),
            next: None,
        })
    }
}

/// Walks the adapter chain once and caches the result.
pub struct ConfigResolver {
    env: Env,
    entry: String,
    adapters: HashMap<String, Box<dyn ConfigAdapter>>,
    resolved: OnceLock<SpecnovaConfig>,
}

impl ConfigResolver {
    /// Resolver with the built-in adapters, starting at the config file.
    pub fn new(env: Env) -> Self {
        Self {
            env,
            entry: FILE_ADAPTER.to_string(),
            adapters: HashMap::new(),
            resolved: OnceLock::new(),
        }
        .register(FileAdapter)
        .register(HeyApiAdapter)
    }

    pub fn with_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = name.into();
        self
    }

    /// Add an adapter, replacing any with the same name.
    pub fn register(mut self, adapter: impl ConfigAdapter + 'static) -> Self {
        self.adapters
            .insert(adapter.name().to_string(), Box::new(adapter));
        self
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// The resolved config, computed on first call.
    pub fn resolve(&self) -> Result<SpecnovaConfig> {
        if let Some(config) = self.resolved.get() {
            return Ok(config.clone());
        }
        let config = self.load()?;
        Ok(self.resolved.get_or_init(|| config).clone())
    }

    fn load(&self) -> Result<SpecnovaConfig> {
        let defaults = SpecnovaConfig::default();
        let mut chain: Vec<String> = Vec::new();
        let mut layers: Vec<Value> = Vec::new();
        let mut current = Some(self.entry.clone());

        while let Some(name) = current {
            if chain.contains(&name) || chain.len() >= MAX_ADAPTER_DEPTH {
                chain.push(name);
                return Err(SpecnovaError::AdapterCycle { chain });
            }
            let adapter = self.adapters.get(&name).ok_or_else(|| {
                SpecnovaError::ConfigInvalid(format!("unknown config adapter '{}'", name))
            })?;
            let output = adapter.transform(&defaults, &self.env)?;
            chain.push(name);
            layers.push(output.overrides);
            current = output.next;
        }

        let mut config = defaults;
        for layer in layers.iter().rev() {
            config = merge_with_defaults(&config, layer)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Convert every object key from camelCase to snake_case, recursively.
fn snake_case_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (to_snake_case(key), snake_case_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(snake_case_keys).collect()),
        other => other.clone(),
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
