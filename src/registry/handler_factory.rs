//! # Handler Factory
//!
//! Turns handler descriptors from settings into handler instances.
//!
//! A descriptor is a comma separated list: the handler name followed by its arguments.
//!
//! | Descriptor | Handler |
//! |---|---|
//! | `log` | [`LoggingHandler`] |
//! | `collect` | the factory's shared [`MessageCollectingHandler`] |
//! | `forward,<name>` | [`ForwardingHandler`] resolving `<name>` queue first |
//! | `forward_queue,<queue>` | [`ForwardingHandler`] to a queue |
//! | `forward_topic,<topic>` | [`ForwardingHandler`] to a topic |
//! | `script,<path>` | [`ScriptHandler`], needs a script evaluator |
//!
//! ## Usage
//!
//! ```rust
//! use mq_stubber::registry::handler_factory::HandlerFactory;
//!
//! let factory = HandlerFactory::new();
//! let handler = factory.create("forward_queue,orders.out").unwrap();
//! assert_eq!(handler.name(), "forward:orders.out");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::constants::handler_names;
use crate::error::{Result, StubberError};
use crate::handler::{
    ForwardingHandler, LoggingHandler, MessageCollectingHandler, MessageHandler, ScriptEvaluator,
    ScriptHandler,
};

/// Builds a handler from descriptor arguments
pub type HandlerConstructor =
    Arc<dyn Fn(&[&str]) -> Result<Arc<dyn MessageHandler>> + Send + Sync>;

/// Resolves descriptors into handlers
#[derive(Clone, Default)]
pub struct HandlerFactory {
    collector: MessageCollectingHandler,
    script_evaluator: Option<Arc<dyn ScriptEvaluator>>,
    constructors: HashMap<String, HandlerConstructor>,
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field("custom", &self.constructors.keys().collect::<Vec<_>>())
            .field("script_evaluator", &self.script_evaluator.is_some())
            .finish()
    }
}

fn configuration_error(message: impl Into<String>) -> StubberError {
    StubberError::configuration("handler_factory", message)
}

fn single_argument<'a>(name: &str, args: &[&'a str]) -> Result<&'a str> {
    match args {
        [arg] if !arg.is_empty() => Ok(*arg),
        _ => Err(configuration_error(format!(
            "{name} takes exactly one argument, got {}",
            args.len()
        ))),
    }
}

fn no_arguments(name: &str, args: &[&str]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(configuration_error(format!("{name} takes no arguments")))
    }
}

impl HandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `script` descriptors
    #[must_use]
    pub fn with_script_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.script_evaluator = Some(evaluator);
        self
    }

    /// Collector handed out for every `collect` descriptor
    pub fn collector(&self) -> &MessageCollectingHandler {
        &self.collector
    }

    /// Add (or override) a named constructor
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&[&str]) -> Result<Arc<dyn MessageHandler>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(handler = %name, "Registered handler constructor");
        self.constructors.insert(name, Arc::new(constructor));
    }

    /// Build the handler a descriptor names
    pub fn create(&self, descriptor: &str) -> Result<Arc<dyn MessageHandler>> {
        let mut parts = descriptor.split(',').map(str::trim);
        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| configuration_error(format!("empty handler descriptor '{descriptor}'")))?;
        let args: Vec<&str> = parts.collect();

        if let Some(constructor) = self.constructors.get(name) {
            return constructor(&args);
        }

        let handler: Arc<dyn MessageHandler> = match name {
            handler_names::LOG => {
                no_arguments(name, &args)?;
                Arc::new(LoggingHandler::new())
            }
            handler_names::COLLECT => {
                no_arguments(name, &args)?;
                Arc::new(self.collector.clone())
            }
            handler_names::FORWARD => Arc::new(ForwardingHandler::new(single_argument(name, &args)?)),
            handler_names::FORWARD_QUEUE => {
                Arc::new(ForwardingHandler::to_queue(single_argument(name, &args)?))
            }
            handler_names::FORWARD_TOPIC => {
                Arc::new(ForwardingHandler::to_topic(single_argument(name, &args)?))
            }
            handler_names::SCRIPT => {
                let location = single_argument(name, &args)?;
                let evaluator = self.script_evaluator.clone().ok_or_else(|| {
                    configuration_error("script handlers need a script evaluator")
                })?;
                Arc::new(ScriptHandler::new(location, evaluator))
            }
            unknown => {
                return Err(configuration_error(format!("unknown handler '{unknown}'")));
            }
        };
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ScriptContext;
    use async_trait::async_trait;

    struct NullEvaluator;

    #[async_trait]
    impl ScriptEvaluator for NullEvaluator {
        fn extension(&self) -> &str {
            "js"
        }

        async fn evaluate(
            &self,
            _script: &str,
            _context: ScriptContext<'_>,
        ) -> anyhow::Result<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    #[test]
    fn test_builtin_descriptors() {
        let factory = HandlerFactory::new();
        assert_eq!(factory.create("log").unwrap().name(), "log");
        assert_eq!(factory.create("collect").unwrap().name(), "collect");
        assert_eq!(factory.create("forward, out").unwrap().name(), "forward:out");
        assert_eq!(
            factory.create("forward_topic,prices").unwrap().name(),
            "forward:prices"
        );
    }

    #[test]
    fn test_arity_and_unknown_names() {
        let factory = HandlerFactory::new();
        for descriptor in ["", "forward", "forward,", "log,extra", "forward,a,b", "teleport"] {
            assert!(
                matches!(
                    factory.create(descriptor),
                    Err(StubberError::Configuration { .. })
                ),
                "descriptor {descriptor:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_script_requires_evaluator() {
        assert!(HandlerFactory::new().create("script,/tmp/stubs").is_err());

        let factory = HandlerFactory::new().with_script_evaluator(Arc::new(NullEvaluator));
        assert_eq!(factory.create("script,/tmp/stubs").unwrap().name(), "script");
    }

    #[test]
    fn test_custom_constructor_overrides_builtin() {
        let mut factory = HandlerFactory::new();
        factory.register("log", |args: &[&str]| {
            Ok(Arc::new(ForwardingHandler::new(args.first().copied().unwrap_or("audit")))
                as Arc<dyn MessageHandler>)
        });
        assert_eq!(factory.create("log").unwrap().name(), "forward:audit");
    }

    #[test]
    fn test_collect_shares_one_collector() {
        let factory = HandlerFactory::new();
        factory.create("collect").unwrap();
        factory.create("collect").unwrap();
        factory.collector().clear();
        assert!(factory.collector().received_all().is_empty());
    }
}
