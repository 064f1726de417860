//! TOML configuration.
//!
//! A configuration file selects one plugin per role and supplies its
//! settings:
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [pipeline]
//! edge_capacity = 10
//!
//! [[inputs.kafka_consumer]]
//! brokers = ["localhost:9092"]
//! topics = ["metrics"]
//!
//! [[parsers.transparent]]
//!
//! [[outputs.openGemini]]
//! urls = ["http://localhost:8086"]
//! database = "telegraf"
//! ```
//!
//! Each role table maps a plugin name to an array holding exactly one
//! settings table. The settings are kept as raw TOML and decoded by the
//! plugin's own factory with [`parse_settings`].

use crate::element::Role;
use crate::error::{Error, Result};
use crate::link::DEFAULT_EDGE_CAPACITY;
use crate::memory::DEFAULT_MAX_IDLE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

/// Plugin name to settings tables, for one role.
pub type PluginTables = BTreeMap<String, Vec<toml::Table>>;

/// Complete forwarder configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Engine settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Source plugins.
    #[serde(default)]
    pub inputs: PluginTables,
    /// Transform plugins.
    #[serde(default)]
    pub parsers: PluginTables,
    /// Sink plugins.
    #[serde(default)]
    pub outputs: PluginTables,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive, e.g. `info` or `forwarder=debug`.
    pub level: String,
    /// Emit ANSI colors.
    pub ansi: bool,
    /// Include the event target in each line.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name used in log spans and metric labels.
    pub name: String,
    /// Slot count of both edges.
    pub edge_capacity: usize,
    /// Upper bound on idle wrappers kept by the record pool.
    pub pool_max_idle: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "forwarder".to_string(),
            edge_capacity: DEFAULT_EDGE_CAPACITY,
            pool_max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(Error::Configuration("logging.level is empty".into()));
        }
        if self.pipeline.edge_capacity == 0 {
            return Err(Error::Configuration(
                "pipeline.edge_capacity must be at least 1".into(),
            ));
        }
        for role in Role::ALL {
            for (name, tables) in self.tables(role) {
                if tables.len() != 1 {
                    return Err(Error::Configuration(format!(
                        "{}.{name}: expected exactly one settings table, found {}",
                        section(role),
                        tables.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Plugin tables configured for `role`.
    pub fn tables(&self, role: Role) -> &PluginTables {
        match role {
            Role::Source => &self.inputs,
            Role::Transform => &self.parsers,
            Role::Sink => &self.outputs,
        }
    }

    /// Every plugin configured for `role`, with its settings.
    pub fn plugins(&self, role: Role) -> impl Iterator<Item = (&str, &toml::Table)> {
        self.tables(role)
            .iter()
            .flat_map(|(name, tables)| tables.iter().map(move |t| (name.as_str(), t)))
    }
}

/// Section name of `role` in the configuration file.
pub fn section(role: Role) -> &'static str {
    match role {
        Role::Source => "inputs",
        Role::Transform => "parsers",
        Role::Sink => "outputs",
    }
}

/// Decode a plugin's raw settings table into its settings type.
///
/// Decoding errors are reported as configuration errors naming the plugin.
pub fn parse_settings<T: DeserializeOwned>(plugin: &str, settings: &toml::Table) -> Result<T> {
    toml::Value::Table(settings.clone())
        .try_into()
        .map_err(|e| Error::Configuration(format!("{plugin}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[logging]
level = "debug"

[pipeline]
edge_capacity = 4

[[inputs.kafka_consumer]]
brokers = ["localhost:9092"]
topics = ["metrics"]

[[parsers.transparent]]

[[outputs.openGemini]]
urls = ["http://localhost:8086"]
database = "telegraf"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.pipeline.edge_capacity, 4);
        assert_eq!(config.pipeline.name, "forwarder");

        let inputs: Vec<_> = config.plugins(Role::Source).collect();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].0, "kafka_consumer");
        assert!(inputs[0].1.contains_key("brokers"));

        let parsers: Vec<_> = config.plugins(Role::Transform).collect();
        assert_eq!(parsers, vec![("transparent", &toml::Table::new())]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pipeline.edge_capacity, DEFAULT_EDGE_CAPACITY);
        assert_eq!(config.pipeline.pool_max_idle, DEFAULT_MAX_IDLE);
        assert_eq!(config.plugins(Role::Sink).count(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Config::from_toml_str("[pipeline]\nedge_capacity = 0\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_plugin_tables_rejected() {
        let text = "[[outputs.openGemini]]\n[[outputs.openGemini]]\n";
        let err = Config::from_toml_str(text).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("outputs.openGemini")));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = Config::from_toml_str("[nonsense]\nkey = 1\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_parse_settings() {
        #[derive(Debug, Deserialize)]
        struct Settings {
            database: String,
        }

        let table: toml::Table = toml::from_str("database = \"db0\"").unwrap();
        let settings: Settings = parse_settings("openGemini", &table).unwrap();
        assert_eq!(settings.database, "db0");

        let err = parse_settings::<Settings>("openGemini", &toml::Table::new()).unwrap_err();
        assert!(err.to_string().contains("openGemini"));
    }
}
