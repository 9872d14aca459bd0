//! # Queue Registry
//!
//! Tracks which queues have a stub consumer and creates that consumer exactly once per
//! queue, no matter how many startup or advisory triggers race for it.
//!
//! Each queue name maps to a shared `OnceCell`. The first caller to reach the cell runs
//! the attachment while every concurrent caller waits on the same cell. A failed
//! attachment leaves the cell empty, so a later trigger can retry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::broker::{ConsumerOptions, MessageConsumer, Session};
use crate::config::DestinationConfig;
use crate::dispatch::{DispatchEngine, QueueDispatchListener};
use crate::error::{Result, StubberError};
use crate::handler::MessageHandler;
use crate::logging::log_attachment_operation;
use crate::messaging::selector::Selector;

/// A queue with a bound stub consumer
pub struct AttachedQueue {
    name: String,
    consumer: Box<dyn MessageConsumer>,
    attached_at: DateTime<Utc>,
}

impl std::fmt::Debug for AttachedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedQueue")
            .field("name", &self.name)
            .field("destination", self.consumer.destination())
            .field("attached_at", &self.attached_at)
            .finish()
    }
}

impl AttachedQueue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }
}

/// Attachment counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentStats {
    pub attached: u64,
    pub failures: u64,
    /// Requests for a queue that was already attached
    pub duplicates: u64,
}

#[derive(Debug, Default)]
struct AttachmentCounters {
    attached: AtomicU64,
    failures: AtomicU64,
    duplicates: AtomicU64,
}

/// Registry of stubbed queues
pub struct QueueRegistry {
    config: Arc<DestinationConfig>,
    session: Arc<dyn Session>,
    engine: Arc<DispatchEngine>,
    attached: DashMap<String, Arc<OnceCell<AttachedQueue>>>,
    counters: AttachmentCounters,
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("attached", &self.attached_queues())
            .field("stats", &self.stats())
            .finish()
    }
}

impl QueueRegistry {
    pub fn new(
        config: Arc<DestinationConfig>,
        session: Arc<dyn Session>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            config,
            session,
            engine,
            attached: DashMap::new(),
            counters: AttachmentCounters::default(),
        }
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    /// Queue-specific handlers, empty for undeclared queues
    pub fn handlers_for(&self, queue_name: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.config.handlers_for(queue_name)
    }

    /// Attach a stub consumer to `queue_name` unless one is already attached.
    ///
    /// Returns `true` only for the call that performed the attachment.
    pub async fn ensure_attached(&self, queue_name: &str) -> Result<bool> {
        // clone the cell so no map guard is held across the await
        let cell = Arc::clone(
            self.attached
                .entry(queue_name.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let attached_here = AtomicBool::new(false);
        let result = cell
            .get_or_try_init(|| async {
                attached_here.store(true, Ordering::Release);
                self.attach(queue_name).await
            })
            .await;

        match result {
            Ok(_) if attached_here.load(Ordering::Acquire) => {
                self.counters.attached.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Ok(_) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(queue_name = %queue_name, "Queue already attached");
                Ok(false)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                log_attachment_operation(queue_name, "failed", Some(&e.to_string()));
                Err(e)
            }
        }
    }

    async fn attach(&self, queue_name: &str) -> Result<AttachedQueue> {
        let destination = self
            .session
            .create_queue(queue_name)
            .await
            .map_err(|e| StubberError::attachment(queue_name, e))?;

        let options = ConsumerOptions::new()
            .with_selector(Selector::not_processed())
            .with_priority(self.config.consumer_priority());
        let consumer = self
            .session
            .create_consumer(&destination, options)
            .await
            .map_err(|e| StubberError::attachment(queue_name, e))?;

        let listener = QueueDispatchListener::new(
            queue_name,
            self.handlers_for(queue_name),
            Arc::clone(&self.engine),
        );
        if let Err(e) = consumer.set_message_listener(Arc::new(listener)) {
            let _ = consumer.close().await;
            return Err(StubberError::attachment(queue_name, e));
        }

        log_attachment_operation(
            queue_name,
            "attached",
            self.config
                .queue(queue_name)
                .is_none()
                .then_some("no static configuration"),
        );

        Ok(AttachedQueue {
            name: queue_name.to_string(),
            consumer,
            attached_at: Utc::now(),
        })
    }

    pub fn is_attached(&self, queue_name: &str) -> bool {
        self.attached
            .get(queue_name)
            .is_some_and(|cell| cell.initialized())
    }

    /// Sorted names of every attached queue
    pub fn attached_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .attached
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> AttachmentStats {
        AttachmentStats {
            attached: self.counters.attached.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
        }
    }
}
