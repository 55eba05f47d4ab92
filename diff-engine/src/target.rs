//! Target context: the read-only bundle of live instance and desired-state
//! configuration the verifier consumes.

use crate::{
    connection::Connection,
    error::ConnectorResult,
    verifier::VerifierOptions,
    workspace::{self, TempSchemaWorkspace, Workspace},
};
use mysql_schema_describer::Flavor;
use std::{collections::BTreeMap, sync::Arc};

/// A string configuration view. The engine reads the keys `verify`,
/// `default-character-set`, `default-collation` and `temp-schema`; unknown
/// keys are carried but ignored.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Config {
        self.set(key, value);
        self
    }

    /// The value for `key`, or the empty string when unset.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    /// A boolean reading of the value for `key`. `None` when unset or not
    /// recognizably boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key).to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        }
    }
}

/// One live instance plus the configuration of the directory holding its
/// desired state.
pub struct Target {
    connection_url: String,
    flavor: Flavor,
    config: Config,
    workspace: Arc<dyn Workspace>,
}

impl Target {
    /// A target whose workspace runs on the instance itself.
    pub fn new(connection_url: impl Into<String>, flavor: Flavor, config: Config) -> ConnectorResult<Target> {
        let connection_url = connection_url.into();
        let connection = Connection::new(&connection_url)?;
        Ok(Target {
            connection_url,
            flavor,
            config,
            workspace: Arc::new(TempSchemaWorkspace::new(connection)),
        })
    }

    /// A target with a caller-provided workspace implementation.
    pub fn with_workspace(
        connection_url: impl Into<String>,
        flavor: Flavor,
        config: Config,
        workspace: Arc<dyn Workspace>,
    ) -> Target {
        Target {
            connection_url: connection_url.into(),
            flavor,
            config,
            workspace,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle suitable for opening a workspace.
    pub fn workspace_handle(&self) -> Arc<dyn Workspace> {
        self.workspace.clone()
    }
}

/// VerifierOptions based on the target's configuration. Verification covers
/// all alters unless the `verify` key turns it down to unsupported-only.
pub fn verifier_options_for_target(target: &Target) -> ConnectorResult<VerifierOptions> {
    Ok(VerifierOptions {
        all_alters: target.config.get_bool("verify").unwrap_or(true),
        flavor: target.flavor(),
        default_character_set: target.config.get("default-character-set").to_owned(),
        default_collation: target.config.get("default-collation").to_owned(),
        workspace: target.workspace_handle(),
        workspace_options: workspace::options_for(&target.config, &target.connection_url),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_schema_describer::flavor::MYSQL_80;

    #[test]
    fn config_bools_accept_the_usual_spellings() {
        let config = Config::new()
            .with("verify", "ON")
            .with("skip-verify", "0")
            .with("default-character-set", "utf8mb4");

        assert_eq!(config.get_bool("verify"), Some(true));
        assert_eq!(config.get_bool("skip-verify"), Some(false));
        assert_eq!(config.get_bool("default-character-set"), None);
        assert_eq!(config.get_bool("missing"), None);
        assert_eq!(config.get("missing"), "");
    }

    #[test]
    fn verifier_options_come_from_the_target_config() {
        let config = Config::new()
            .with("verify", "false")
            .with("default-character-set", "utf8mb4")
            .with("default-collation", "utf8mb4_unicode_ci");
        let target = Target::new("mysql://root@localhost:3306/app", MYSQL_80, config).unwrap();

        let opts = verifier_options_for_target(&target).unwrap();
        assert!(!opts.all_alters);
        assert_eq!(opts.flavor, MYSQL_80);
        assert_eq!(opts.default_character_set, "utf8mb4");
        assert_eq!(opts.default_collation, "utf8mb4_unicode_ci");
        assert_eq!(opts.workspace_options.url, "mysql://root@localhost:3306/app");
    }

    #[test]
    fn verify_defaults_to_all_alters() {
        let target = Target::new("mysql://root@localhost/app", MYSQL_80, Config::new()).unwrap();
        let opts = verifier_options_for_target(&target).unwrap();
        assert!(opts.all_alters);
    }
}
