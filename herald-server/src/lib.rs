//! # Herald Server
//!
//! Wires the Herald subsystems together: configuration, logging, stores,
//! caches, channel senders, the delivery queue, the event consumer and the
//! WebSocket hub, behind one axum server with graceful shutdown.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod server;
pub mod shutdown;

pub use logging::init_logging;
pub use server::HeraldServer;
pub use shutdown::{ShutdownController, setup_signal_handlers};
