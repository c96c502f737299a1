//! Deep merge of a fully populated default tree with a partial override.
//!
//! Trees are handled as [`serde_json::Value`]. A key missing from the
//! override keeps its default; two objects are merged key by key over the
//! default's keys only; anything else in the override replaces the default
//! outright (arrays, scalars, and `null` included).

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::SpecnovaConfig;
use crate::error::{Result, SpecnovaError};

/// Merge `overrides` on top of `defaults`, returning a new tree.
///
/// Keys present only in `overrides` are dropped: the result always has
/// exactly the shape of `defaults` wherever both sides are objects.
pub fn merge(defaults: &Value, overrides: Option<&Value>) -> Value {
    match (defaults, overrides) {
        (def, None) => def.clone(),
        (Value::Object(def), Some(Value::Object(over))) => {
            let merged: Map<String, Value> = def
                .iter()
                .map(|(key, dv)| (key.clone(), merge(dv, over.get(key))))
                .collect();
            Value::Object(merged)
        }
        (_, Some(over)) => over.clone(),
    }
}

/// Typed wrapper around [`merge`].
///
/// Fails with [`SpecnovaError::ConfigInvalid`] when the merged tree no longer
/// deserializes into `T` (an override of the wrong shape, an unknown enum
/// variant, ...).
pub fn merge_with_defaults<T>(defaults: &T, overrides: &Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let base = serde_json::to_value(defaults)
        .map_err(|e| SpecnovaError::ConfigInvalid(format!("unserializable defaults: {}", e)))?;
    let merged = merge(&base, Some(overrides));
    serde_json::from_value(merged).map_err(|e| SpecnovaError::ConfigInvalid(e.to_string()))
}

/// Whether any normalization work is configured.
///
/// True iff `normalized` is present and at least one of its immediate
/// settings is enabled.
pub fn has_normalize(config: &SpecnovaConfig) -> bool {
    let Some(parser) = &config.normalized else {
        return false;
    };
    match serde_json::to_value(parser) {
        Ok(Value::Object(map)) => map.values().any(is_truthy),
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Value {
        json!({
            "flag": false,
            "name": "root",
            "list": [1, 2],
            "nested": { "a": 1, "b": { "c": "x" } },
            "nullable": { "on": true }
        })
    }

    #[test]
    fn test_missing_override_keeps_defaults() {
        assert_eq!(merge(&defaults(), None), defaults());
        assert_eq!(merge(&defaults(), Some(&json!({}))), defaults());
    }

    #[test]
    fn test_nested_objects_merge_over_default_keys() {
        let over = json!({ "nested": { "b": { "c": "y" }, "extra": 5 }, "unknown": 1 });
        let merged = merge(&defaults(), Some(&over));
        assert_eq!(merged["nested"], json!({ "a": 1, "b": { "c": "y" } }));
        assert!(merged.get("unknown").is_none());
    }

    #[test]
    fn test_arrays_scalars_and_null_replace() {
        let over = json!({ "list": [9], "flag": true, "nullable": null, "name": { "odd": 1 } });
        let merged = merge(&defaults(), Some(&over));
        assert_eq!(merged["list"], json!([9]));
        assert_eq!(merged["flag"], json!(true));
        assert_eq!(merged["nullable"], Value::Null);
        assert_eq!(merged["name"], json!({ "odd": 1 }));
    }

    #[test]
    fn test_merge_idempotent() {
        let d = defaults();
        let overrides = [
            json!({}),
            json!({ "flag": true }),
            json!({ "nested": { "b": { "c": "z" } }, "list": [] }),
            json!({ "nullable": null, "extra": 1 }),
        ];
        for x in overrides {
            let once = merge(&d, Some(&x));
            let twice = merge(&d, Some(&once));
            assert_eq!(once, twice, "not idempotent for {}", x);
        }
    }

    #[test]
    fn test_merge_total_over_default_keys() {
        let d = defaults();
        let merged = merge(&d, Some(&json!({ "nested": { "a": 2 } })));
        for key in d.as_object().unwrap().keys() {
            assert!(merged.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(merged["nested"]["b"], json!({ "c": "x" }));
    }

    #[test]
    fn test_typed_merge() {
        let config = merge_with_defaults(
            &SpecnovaConfig::default(),
            &json!({ "sync_version": true, "snapshot": { "folder": "specs" } }),
        )
        .unwrap();
        assert!(config.sync_version);
        assert_eq!(config.snapshot.folder.root(), "specs");
        assert_eq!(config.snapshot.names.meta, "meta");
    }

    #[test]
    fn test_typed_merge_rejects_bad_shape() {
        let err = merge_with_defaults(
            &SpecnovaConfig::default(),
            &json!({ "snapshot": { "extensions": { "meta": "yaml" } } }),
        )
        .unwrap_err();
        assert!(matches!(err, SpecnovaError::ConfigInvalid(_)));
    }

    #[test]
    fn test_has_normalize() {
        let mut config = SpecnovaConfig::default();
        assert!(has_normalize(&config));

        config.normalized = None;
        assert!(!has_normalize(&config));

        let disabled = merge_with_defaults(
            &SpecnovaConfig::default(),
            &json!({ "normalized": { "operation_id": false } }),
        )
        .unwrap();
        assert!(disabled.normalized.is_some());
        assert!(!has_normalize(&disabled));
    }
}
