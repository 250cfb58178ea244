//! # Herald Event
//!
//! Event intake and dispatch: envelope validation, the event handler
//! registry, type-specific handlers, and the consumer that reads the
//! ordered event log and drives delivery-record creation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod consumer;
pub mod dispatch;
pub mod envelope;
pub mod handler;
pub mod handlers;

pub use consumer::{
    DeadLetterEntry, DeadLetterLog, EventConsumer, EventSource, InMemoryEventSource,
    SourcedMessage, create_source,
};
pub use dispatch::EventDispatcher;
pub use envelope::validate_envelope;
pub use handler::{EventHandler, HandlerContent, HandlerRegistry};
