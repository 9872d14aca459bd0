//! # Stubber Configuration
//!
//! [`DestinationConfig`] is the immutable description of what the stubber manages:
//! which queues, which handlers run on each, which handlers run everywhere and whether
//! undeclared queues are discovered from broker advisories.
//!
//! [`StubberSettings`] is the loadable form of the same thing. Handlers are named by
//! descriptor strings and resolved through a [`HandlerFactory`]. Settings are read from
//! an optional file (TOML, YAML or JSON by extension) overlaid with `STUBBER_*`
//! environment variables.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::broker::in_memory::InMemoryBroker;
use crate::constants::{DEFAULT_BROKER_NAME, STUBBER_CONSUMER_PRIORITY};
use crate::error::{Result, StubberError};
use crate::handler::MessageHandler;
use crate::lifecycle::Stubber;
use crate::registry::handler_factory::HandlerFactory;

fn handler_names(handlers: &[Arc<dyn MessageHandler>]) -> Vec<&str> {
    handlers.iter().map(|handler| handler.name()).collect()
}

/// One queue the stubber actively manages
#[derive(Clone)]
pub struct QueueConfig {
    name: String,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("name", &self.name)
            .field("handlers", &handler_names(&self.handlers))
            .finish()
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn MessageHandler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handlers(&self) -> &[Arc<dyn MessageHandler>] {
        &self.handlers
    }
}

/// Everything the stubber needs to know about the destinations it stubs
#[derive(Clone)]
pub struct DestinationConfig {
    queues: Vec<QueueConfig>,
    common_handlers: Vec<Arc<dyn MessageHandler>>,
    dynamic_attachment: bool,
    consumer_priority: u8,
}

impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("queues", &self.queues)
            .field("common_handlers", &handler_names(&self.common_handlers))
            .field("dynamic_attachment", &self.dynamic_attachment)
            .field("consumer_priority", &self.consumer_priority)
            .finish()
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            common_handlers: Vec::new(),
            dynamic_attachment: false,
            consumer_priority: STUBBER_CONSUMER_PRIORITY,
        }
    }
}

impl DestinationConfig {
    pub fn builder() -> DestinationConfigBuilder {
        DestinationConfigBuilder::default()
    }

    pub fn queues(&self) -> &[QueueConfig] {
        &self.queues
    }

    pub fn queue(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.iter().find(|queue| queue.name == name)
    }

    /// Queue-specific handlers, empty for queues without static configuration
    pub fn handlers_for(&self, name: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.queue(name)
            .map(|queue| queue.handlers.clone())
            .unwrap_or_default()
    }

    pub fn common_handlers(&self) -> &[Arc<dyn MessageHandler>] {
        &self.common_handlers
    }

    pub fn dynamic_attachment(&self) -> bool {
        self.dynamic_attachment
    }

    pub fn consumer_priority(&self) -> u8 {
        self.consumer_priority
    }
}

/// Builder for [`DestinationConfig`]
#[derive(Default)]
pub struct DestinationConfigBuilder {
    config: DestinationConfig,
}

impl DestinationConfigBuilder {
    #[must_use]
    pub fn add_queue(mut self, queue: QueueConfig) -> Self {
        self.config.queues.push(queue);
        self
    }

    #[must_use]
    pub fn add_common_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.config.common_handlers.push(handler);
        self
    }

    #[must_use]
    pub fn dynamic_attachment(mut self, enabled: bool) -> Self {
        self.config.dynamic_attachment = enabled;
        self
    }

    #[must_use]
    pub fn consumer_priority(mut self, priority: u8) -> Self {
        self.config.consumer_priority = priority;
        self
    }

    /// Validate queue names and build
    pub fn build(self) -> Result<DestinationConfig> {
        let mut seen = HashSet::new();
        for queue in &self.config.queues {
            if queue.name.trim().is_empty() {
                return Err(StubberError::configuration(
                    "destination_config",
                    "queue name must not be blank",
                ));
            }
            if !seen.insert(queue.name.as_str()) {
                return Err(StubberError::configuration(
                    "destination_config",
                    format!("queue {} is declared more than once", queue.name),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Handler descriptors for one declared queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub name: String,
    #[serde(default)]
    pub handlers: Vec<String>,
}

/// Loadable stubber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StubberSettings {
    /// Name of the embedded broker
    pub broker_name: String,
    pub dynamic_attachment: bool,
    pub consumer_priority: u8,
    /// Handler descriptors run on every queue, in order
    pub common_handlers: Vec<String>,
    pub queues: Vec<QueueSettings>,
}

impl Default for StubberSettings {
    fn default() -> Self {
        Self {
            broker_name: DEFAULT_BROKER_NAME.to_string(),
            dynamic_attachment: false,
            consumer_priority: STUBBER_CONSUMER_PRIORITY,
            common_handlers: Vec::new(),
            queues: Vec::new(),
        }
    }
}

impl StubberSettings {
    /// Load settings from an optional file, overridden by `STUBBER_*` variables.
    ///
    /// `STUBBER_COMMON_HANDLERS` holds `;`-separated descriptors.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("STUBBER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(";")
                .with_list_parse_key("common_handlers"),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| StubberError::configuration("settings", e.to_string()))
    }

    /// Settings from the environment alone
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Resolve every descriptor and build a validated [`DestinationConfig`]
    pub fn destination_config(&self, factory: &HandlerFactory) -> Result<DestinationConfig> {
        let mut builder = DestinationConfig::builder()
            .dynamic_attachment(self.dynamic_attachment)
            .consumer_priority(self.consumer_priority);

        for descriptor in &self.common_handlers {
            builder = builder.add_common_handler(factory.create(descriptor)?);
        }

        for queue in &self.queues {
            let handlers = queue
                .handlers
                .iter()
                .map(|descriptor| factory.create(descriptor))
                .collect::<Result<Vec<_>>>()?;
            builder = builder.add_queue(QueueConfig::new(&queue.name).with_handlers(handlers));
        }

        builder.build()
    }

    /// Stubber running on an embedded broker named after `broker_name`
    pub fn build_stubber(&self, factory: &HandlerFactory) -> Result<Stubber> {
        let config = self.destination_config(factory)?;
        Ok(Stubber::with_embedded_broker(
            InMemoryBroker::new(&self.broker_name),
            config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{LoggingHandler, MessageCollectingHandler};

    #[test]
    fn test_builder_validates_queue_names() {
        let result = DestinationConfig::builder()
            .add_queue(QueueConfig::new("in"))
            .add_queue(QueueConfig::new("in"))
            .build();
        assert!(matches!(result, Err(StubberError::Configuration { .. })));

        let result = DestinationConfig::builder()
            .add_queue(QueueConfig::new("  "))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_handlers_for_unknown_queue_is_empty() {
        let config = DestinationConfig::builder()
            .add_queue(QueueConfig::new("in").with_handler(Arc::new(LoggingHandler::new())))
            .add_common_handler(Arc::new(MessageCollectingHandler::new()))
            .build()
            .unwrap();

        assert_eq!(config.handlers_for("in").len(), 1);
        assert!(config.handlers_for("newQ").is_empty());
        assert_eq!(config.common_handlers().len(), 1);
        assert!(!config.dynamic_attachment());
        assert_eq!(config.consumer_priority(), STUBBER_CONSUMER_PRIORITY);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = StubberSettings::default();
        assert_eq!(settings.broker_name, DEFAULT_BROKER_NAME);
        assert_eq!(settings.consumer_priority, STUBBER_CONSUMER_PRIORITY);
        assert!(settings.queues.is_empty());
    }

    #[test]
    fn test_settings_to_destination_config() {
        let settings = StubberSettings {
            dynamic_attachment: true,
            common_handlers: vec!["log".to_string()],
            queues: vec![QueueSettings {
                name: "in".to_string(),
                handlers: vec!["forward_queue,out".to_string(), "collect".to_string()],
            }],
            ..StubberSettings::default()
        };

        let factory = HandlerFactory::new();
        let config = settings.destination_config(&factory).unwrap();
        assert!(config.dynamic_attachment());
        assert_eq!(config.common_handlers()[0].name(), "log");
        let names: Vec<&str> = config.queue("in").unwrap().handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec!["forward:out", "collect"]);
    }

    #[test]
    fn test_unknown_descriptor_fails() {
        let settings = StubberSettings {
            common_handlers: vec!["teleport".to_string()],
            ..StubberSettings::default()
        };
        assert!(matches!(
            settings.destination_config(&HandlerFactory::new()),
            Err(StubberError::Configuration { .. })
        ));
    }
}
