//! Configuration for the keeper CLI

use keeper_engine::KeeperSettings;
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Keeper settings: owner, unit price, cooldown, run policy
    #[serde(default)]
    pub keeper: KeeperSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KeeperConfig {
    /// Load configuration: defaults, then the file if given, then
    /// `KEEPER_*` environment variables (`KEEPER_KEEPER__OWNER`,
    /// `KEEPER_LOGGING__LEVEL`, ...)
    ///
    /// `keeper.owner` has no default; loading fails unless a layer sets it.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&KeeperConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KEEPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !self.keeper.has_owner() {
            return Err(config::ConfigError::Message(
                "keeper.owner must be set (file or KEEPER_KEEPER__OWNER)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_engine::{RunPolicy, DEFAULT_COOLDOWN_SECS};
    use keeper_types::{ActorId, Amount};
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = KeeperConfig::default();
        assert!(!config.keeper.has_owner());
        assert_eq!(config.keeper.cooldown_secs, DEFAULT_COOLDOWN_SECS);
        assert_eq!(config.keeper.unit_price, Amount::new(1));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_requires_owner() {
        let err = KeeperConfig::load(None).unwrap_err();
        assert!(err.to_string().contains("keeper.owner must be set"));

        let file = config_file(
            r#"
[keeper]
owner = "  "
"#,
        );
        assert!(KeeperConfig::load(file.path().to_str()).is_err());
    }

    #[test]
    fn test_load_fills_defaults_around_owner() {
        let file = config_file(
            r#"
[keeper]
owner = "ops"
"#,
        );
        let config = KeeperConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.keeper.owner, ActorId::new("ops"));
        assert_eq!(config.keeper.cooldown_secs, DEFAULT_COOLDOWN_SECS);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let file = config_file(
            r#"
[keeper]
owner = "ops"
unit_price = 7
cooldown_secs = 3600

[logging]
level = "debug"
json = true
"#,
        );

        let config = KeeperConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.keeper.owner, ActorId::new("ops"));
        assert_eq!(config.keeper.unit_price, Amount::new(7));
        assert_eq!(config.keeper.cooldown_secs, 3600);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file_is_not_an_error_but_owner_still_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = KeeperConfig::load(path.to_str()).unwrap_err();
        assert!(matches!(err, config::ConfigError::Message(_)));
    }

    #[test]
    fn test_env_overrides_run_policy() {
        let file = config_file(
            r#"
[keeper]
owner = "ops"
"#,
        );
        std::env::set_var("KEEPER_KEEPER__RUN_POLICY", "owner_only");
        let config = KeeperConfig::load(file.path().to_str());
        std::env::remove_var("KEEPER_KEEPER__RUN_POLICY");

        assert_eq!(config.unwrap().keeper.run_policy, RunPolicy::OwnerOnly);
    }
}
