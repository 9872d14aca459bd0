//! # Script-Backed Handler
//!
//! Runs an external script for every message so stub behaviour can change while the
//! stubber is running. The script is looked up on each message:
//!
//! 1. the configured location, when it is a file
//! 2. `<location>/<destination name>.<ext>`
//! 3. `<location>/default.<ext>`
//!
//! The crate bundles no scripting language. Evaluation is delegated to a
//! [`ScriptEvaluator`] supplied by the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerSession, MessageHandler};
use crate::messaging::message::Message;

const DEFAULT_SCRIPT_STEM: &str = "default";

/// Bindings a script can see while it runs
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    pub session: &'a HandlerSession,
    pub message: &'a Message,
    pub script_path: &'a Path,
}

impl ScriptContext<'_> {
    /// Text body of the message, if it has one
    pub fn text(&self) -> Option<&str> {
        self.message.text_body()
    }

    /// Text body parsed as JSON
    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        let text = self
            .text()
            .with_context(|| format!("{} message has no text body", self.message.kind()))?;
        serde_json::from_str(text).context("message body is not valid JSON")
    }
}

/// Pluggable script runtime
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    /// File extension of scripts this evaluator understands, without the dot
    fn extension(&self) -> &str;

    /// Run `script` against one message. The returned value is logged.
    async fn evaluate(
        &self,
        script: &str,
        context: ScriptContext<'_>,
    ) -> anyhow::Result<Option<serde_json::Value>>;
}

/// Handler that evaluates a script file for each message
#[derive(Clone)]
pub struct ScriptHandler {
    location: PathBuf,
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl std::fmt::Debug for ScriptHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHandler")
            .field("location", &self.location)
            .field("extension", &self.evaluator.extension())
            .finish()
    }
}

impl ScriptHandler {
    pub fn new(location: impl Into<PathBuf>, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self {
            location: location.into(),
            evaluator,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// First existing script file for a destination
    pub async fn resolve_script(&self, destination: Option<&str>) -> Option<PathBuf> {
        let extension = self.evaluator.extension();
        let mut candidates = vec![self.location.clone()];
        if let Some(destination) = destination {
            candidates.push(self.location.join(format!("{destination}.{extension}")));
        }
        candidates.push(
            self.location
                .join(format!("{DEFAULT_SCRIPT_STEM}.{extension}")),
        );

        for candidate in candidates {
            if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                if metadata.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

#[async_trait]
impl MessageHandler for ScriptHandler {
    async fn handle(&self, session: &HandlerSession, message: &Message) -> HandlerResult {
        let destination = message.destination().map(|d| d.physical_name());

        let Some(script_path) = self.resolve_script(destination).await else {
            warn!(
                destination = ?destination,
                location = %self.location.display(),
                "No script found"
            );
            return Err(HandlerError::script_not_found(
                destination.unwrap_or("<none>"),
                self.location.display().to_string(),
            ));
        };

        let script_name = script_path.display().to_string();
        let script = tokio::fs::read_to_string(&script_path)
            .await
            .map_err(|e| HandlerError::script(&script_name, e.to_string()))?;

        let context = ScriptContext {
            session,
            message,
            script_path: &script_path,
        };
        let result = self
            .evaluator
            .evaluate(&script, context)
            .await
            .map_err(|e| HandlerError::script(&script_name, format!("{e:#}")))?;

        info!(
            destination = ?destination,
            script = %script_name,
            result = ?result,
            "Script evaluated"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "script"
    }
}
