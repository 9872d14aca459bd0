//! # Dispatch Engine
//!
//! Runs the handler chain for every message a stubbed queue receives.
//!
//! ## Chain
//!
//! `common handlers ++ queue handlers ++ terminal handler`, executed in that order on a
//! fresh [`HandlerSession`] per message. A handler that fails, by error or by panic, is
//! reported and the chain moves on to the next one. The session is closed once the
//! whole chain has run.
//!
//! Dispatches share no state beyond the statistics counters, so messages on the same
//! queue or on different queues can be dispatched concurrently.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::broker::{Connection, MessageListener};
use crate::error::HandlerError;
use crate::handler::{HandlerSession, MessageHandler, ResendToOriginHandler};
use crate::logging::{log_dispatch_operation, log_error};
use crate::messaging::errors::BrokerResult;
use crate::messaging::message::Message;

/// A handler that did not complete during a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    /// Position in the chain, common handlers first
    pub index: usize,
    pub handler: String,
    pub error: String,
}

/// Outcome of dispatching one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub queue_name: String,
    pub message_id: Option<String>,
    pub handlers_run: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Counters across every dispatch the engine has run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub messages_dispatched: u64,
    pub handler_failures: u64,
    /// Dispatches dropped because no session could be opened
    pub dispatches_abandoned: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    messages_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    dispatches_abandoned: AtomicU64,
}

/// Executes handler chains on behalf of every attached queue
pub struct DispatchEngine {
    connection: Arc<dyn Connection>,
    common_handlers: Vec<Arc<dyn MessageHandler>>,
    terminal: Arc<dyn MessageHandler>,
    counters: DispatchCounters,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("connection_id", &self.connection.connection_id())
            .field(
                "common_handlers",
                &self.common_handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("terminal", &self.terminal.name())
            .finish()
    }
}

impl DispatchEngine {
    /// Engine that ends every chain with [`ResendToOriginHandler`]
    pub fn new(
        connection: Arc<dyn Connection>,
        common_handlers: Vec<Arc<dyn MessageHandler>>,
    ) -> Self {
        Self {
            connection,
            common_handlers,
            terminal: Arc::new(ResendToOriginHandler::new()),
            counters: DispatchCounters::default(),
        }
    }

    /// Replace the terminal handler
    #[must_use]
    pub fn with_terminal(mut self, terminal: Arc<dyn MessageHandler>) -> Self {
        self.terminal = terminal;
        self
    }

    /// The effective chain for a queue
    pub fn build_chain(
        &self,
        queue_handlers: &[Arc<dyn MessageHandler>],
    ) -> Vec<Arc<dyn MessageHandler>> {
        self.common_handlers
            .iter()
            .chain(queue_handlers.iter())
            .chain(std::iter::once(&self.terminal))
            .cloned()
            .collect()
    }

    /// Run the chain for one message.
    ///
    /// Handler failures are collected in the report. Only a failure to open the
    /// per-dispatch session is returned as an error.
    pub async fn dispatch(
        &self,
        queue_name: &str,
        queue_handlers: &[Arc<dyn MessageHandler>],
        message: &Message,
    ) -> BrokerResult<DispatchReport> {
        let started = Instant::now();

        let session = match HandlerSession::open(Arc::clone(&self.connection)).await {
            Ok(session) => session,
            Err(e) => {
                self.counters
                    .dispatches_abandoned
                    .fetch_add(1, Ordering::Relaxed);
                log_error(
                    "dispatch",
                    "open_session",
                    &e.to_string(),
                    Some(queue_name),
                );
                return Err(e);
            }
        };

        let chain = self.build_chain(queue_handlers);
        let mut failures = Vec::new();

        for (index, handler) in chain.iter().enumerate() {
            debug!(
                queue_name = %queue_name,
                handler = %handler.name(),
                index = index,
                "Invoking handler"
            );

            let outcome = AssertUnwindSafe(handler.handle(&session, message))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(HandlerError::panicked(panic_message(panic.as_ref()))),
            };

            if let Some(e) = failure {
                error!(
                    queue_name = %queue_name,
                    message_id = ?message.message_id(),
                    handler = %handler.name(),
                    index = index,
                    error = %e,
                    "Handler failed"
                );
                failures.push(HandlerFailure {
                    index,
                    handler: handler.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        if let Err(e) = session.close().await {
            warn!(queue_name = %queue_name, error = %e, "Failed to close handler session");
        }

        self.counters
            .messages_dispatched
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .handler_failures
            .fetch_add(failures.len() as u64, Ordering::Relaxed);

        log_dispatch_operation(
            queue_name,
            message.message_id(),
            chain.len(),
            failures.len(),
            started.elapsed().as_millis() as u64,
        );

        Ok(DispatchReport {
            queue_name: queue_name.to_string(),
            message_id: message.message_id().map(str::to_string),
            handlers_run: chain.len(),
            failures,
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            messages_dispatched: self.counters.messages_dispatched.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            dispatches_abandoned: self.counters.dispatches_abandoned.load(Ordering::Relaxed),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Listener bound to one queue's stub consumer
pub struct QueueDispatchListener {
    queue_name: String,
    handlers: Vec<Arc<dyn MessageHandler>>,
    engine: Arc<DispatchEngine>,
}

impl QueueDispatchListener {
    pub fn new(
        queue_name: impl Into<String>,
        handlers: Vec<Arc<dyn MessageHandler>>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            handlers,
            engine,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl MessageListener for QueueDispatchListener {
    async fn on_message(&self, message: Message) {
        // session failures are already logged by the engine
        let _ = self
            .engine
            .dispatch(&self.queue_name, &self.handlers, &message)
            .await;
    }
}
