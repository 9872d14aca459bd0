//! # Registry Infrastructure
//!
//! - **QueueRegistry**: which queues are stubbed, with at-most-once attachment per queue
//! - **HandlerFactory**: resolves handler descriptors from settings into handlers
//!
//! ```text
//! Registry Infrastructure
//! ├── QueueRegistry    (queue name -> attached stub consumer)
//! └── HandlerFactory   (descriptor -> handler instance)
//! ```

pub mod attachment;
pub mod handler_factory;

pub use attachment::{AttachedQueue, AttachmentStats, QueueRegistry};
pub use handler_factory::{HandlerConstructor, HandlerFactory};
