//! # Lifecycle
//!
//! [`Stubber`] connects to the broker, attaches queues and tears everything down again;
//! [`StubberState`] tracks where it is in that cycle.

pub mod states;
pub mod stubber;

pub use states::StubberState;
pub use stubber::Stubber;
