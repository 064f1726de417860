//! Plugin registry mapping names to stage factories.

use crate::config::section;
use crate::element::{Node, Role, Sink, Source, StageContext, Transform};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for a source plugin.
pub type SourceFactory =
    Arc<dyn Fn(&toml::Table, &StageContext) -> Result<Box<dyn Source>> + Send + Sync>;

/// Constructor for a transform plugin.
pub type TransformFactory =
    Arc<dyn Fn(&toml::Table, &StageContext) -> Result<Box<dyn Transform>> + Send + Sync>;

/// Constructor for a sink plugin.
pub type SinkFactory =
    Arc<dyn Fn(&toml::Table, &StageContext) -> Result<Box<dyn Sink>> + Send + Sync>;

/// Name to factory maps, one per role.
///
/// The registry is filled once at startup, then shared read-only. A name
/// registered twice for the same role keeps the last factory. Factories
/// receive the plugin's raw settings table and the pipeline's
/// [`StageContext`]; they build the stage but do not initialize it.
///
/// # Example
///
/// ```rust,ignore
/// use forwarder::plugin::PluginRegistry;
/// use forwarder::elements::kafka::{KafkaSource, MemoryConsumerCreator};
///
/// let mut registry = PluginRegistry::with_builtins();
/// registry.register_source("kafka_consumer", KafkaSource::factory(creator));
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    sources: HashMap<String, SourceFactory>,
    transforms: HashMap<String, TransformFactory>,
    sinks: HashMap<String, SinkFactory>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in transforms and sinks.
    ///
    /// No built-in source is registered: the Kafka source needs a broker
    /// client, which the application supplies through
    /// [`KafkaSource::factory`](crate::elements::kafka::KafkaSource::factory).
    pub fn with_builtins() -> Self {
        use crate::elements::{LineProtocolParser, OpenGeminiSink, PassThrough, opengemini};

        let mut registry = Self::new();
        registry.register_transform(PassThrough::NAME, PassThrough::factory());
        registry.register_transform(LineProtocolParser::NAME, LineProtocolParser::factory());
        registry.register_sink(
            OpenGeminiSink::NAME,
            OpenGeminiSink::factory(Arc::new(opengemini::HttpClientCreator)),
        );
        registry
    }

    /// Register a source factory under `name`.
    pub fn register_source<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Table, &StageContext) -> Result<Box<dyn Source>> + Send + Sync + 'static,
    {
        tracing::debug!(plugin = name, role = "source", "registered plugin");
        self.sources.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a transform factory under `name`.
    pub fn register_transform<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Table, &StageContext) -> Result<Box<dyn Transform>> + Send + Sync + 'static,
    {
        tracing::debug!(plugin = name, role = "transform", "registered plugin");
        self.transforms.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a sink factory under `name`.
    pub fn register_sink<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Table, &StageContext) -> Result<Box<dyn Sink>> + Send + Sync + 'static,
    {
        tracing::debug!(plugin = name, role = "sink", "registered plugin");
        self.sinks.insert(name.to_string(), Arc::new(factory));
    }

    /// Whether a factory named `name` exists for `role`.
    pub fn contains(&self, role: Role, name: &str) -> bool {
        match role {
            Role::Source => self.sources.contains_key(name),
            Role::Transform => self.transforms.contains_key(name),
            Role::Sink => self.sinks.contains_key(name),
        }
    }

    /// Registered names for `role`, sorted.
    pub fn names(&self, role: Role) -> Vec<String> {
        let mut names: Vec<String> = match role {
            Role::Source => self.sources.keys().cloned().collect(),
            Role::Transform => self.transforms.keys().cloned().collect(),
            Role::Sink => self.sinks.keys().cloned().collect(),
        };
        names.sort();
        names
    }

    /// Build the stage registered as `name` for `role`.
    ///
    /// An unregistered name is a configuration error.
    pub fn create(
        &self,
        role: Role,
        name: &str,
        settings: &toml::Table,
        ctx: &StageContext,
    ) -> Result<Node> {
        let node = match role {
            Role::Source => self.sources.get(name).map(|f| f(settings, ctx).map(Node::Source)),
            Role::Transform => self
                .transforms
                .get(name)
                .map(|f| f(settings, ctx).map(Node::Transform)),
            Role::Sink => self.sinks.get(name).map(|f| f(settings, ctx).map(Node::Sink)),
        };

        node.unwrap_or_else(|| {
            Err(Error::Configuration(format!(
                "undefined {} plugin '{name}'",
                section(role)
            )))
        })
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("sources", &self.names(Role::Source))
            .field("transforms", &self.names(Role::Transform))
            .field("sinks", &self.names(Role::Sink))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::PassThrough;
    use crate::memory::RecordPool;

    fn ctx() -> StageContext {
        StageContext::new("test", Arc::new(RecordPool::new()))
    }

    #[test]
    fn test_builtins() {
        let registry = PluginRegistry::with_builtins();

        assert!(registry.contains(Role::Transform, "transparent"));
        assert!(registry.contains(Role::Transform, "line_protocol"));
        assert!(registry.contains(Role::Sink, "openGemini"));
        assert!(!registry.contains(Role::Source, "kafka_consumer"));
        assert_eq!(
            registry.names(Role::Transform),
            vec!["line_protocol".to_string(), "transparent".to_string()]
        );
    }

    #[test]
    fn test_create_registered() {
        let registry = PluginRegistry::with_builtins();
        let node = registry
            .create(Role::Transform, "transparent", &toml::Table::new(), &ctx())
            .unwrap();

        assert_eq!(node.role(), Role::Transform);
        assert_eq!(node.name(), "transparent");
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let registry = PluginRegistry::with_builtins();
        let err = registry
            .create(Role::Sink, "prometheus", &toml::Table::new(), &ctx())
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(ref m) if m.contains("prometheus")));
    }

    #[test]
    fn test_names_are_per_role() {
        let mut registry = PluginRegistry::new();
        registry.register_transform("copy", PassThrough::factory());

        assert!(registry.contains(Role::Transform, "copy"));
        assert!(!registry.contains(Role::Sink, "copy"));
        assert!(registry.create(Role::Sink, "copy", &toml::Table::new(), &ctx()).is_err());
    }
}
