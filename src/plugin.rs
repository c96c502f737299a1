//! Registration entry for SDK generator hosts.
//!
//! `specnova config --json` prints a [`PluginRegistration`] that can be
//! pasted into the `plugins` list of `openapi-ts.config.json`; the
//! `hey-api` config adapter reads it back from there.

use serde::{Deserialize, Serialize};

use crate::config::SpecnovaConfig;

pub const PLUGIN_NAME: &str = "specnova";
/// Scoped package name, also accepted when reading a host config.
pub const SCOPED_PLUGIN_NAME: &str = "@specnova";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRegistration {
    pub name: String,
    pub config: SpecnovaConfig,
}

pub fn define_plugin(config: SpecnovaConfig) -> PluginRegistration {
    PluginRegistration {
        name: PLUGIN_NAME.to_string(),
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use crate::resolver::{ConfigResolver, HEY_API_ADAPTER, HEY_API_CONFIG_FILE};
    use tempfile::TempDir;

    #[test]
    fn test_registration_is_read_back_by_host_adapter() {
        let mut config = SpecnovaConfig::default();
        config.sync_version = true;
        let registration = define_plugin(config.clone());
        assert_eq!(registration.name, "specnova");

        let tmp = TempDir::new().unwrap();
        let host = serde_json::json!({ "plugins": [registration] });
        std::fs::write(tmp.path().join(HEY_API_CONFIG_FILE), host.to_string()).unwrap();

        let resolved = ConfigResolver::new(Env::defaults(tmp.path()))
            .with_entry(HEY_API_ADAPTER)
            .resolve()
            .unwrap();
        assert_eq!(resolved, config);
    }
}
