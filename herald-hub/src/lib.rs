//! # Herald Hub
//!
//! The real-time fan-out subsystem: authenticated per-tenant WebSocket
//! groups carrying notification and chat traffic.
//!
//! Connections are independent; writes to a single connection are
//! serialised through a bounded per-connection buffer, and a slow client
//! is force-closed with a back-pressure close code rather than stalling
//! the broadcast to others.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod broadcaster;
pub mod chat;
pub mod connection;
pub mod handler;
pub mod message;

pub use auth::{AccessClaims, HubAuth};
pub use broadcaster::HubBroadcaster;
pub use chat::ChatService;
pub use connection::{
    CLOSE_BACKPRESSURE, CLOSE_IDLE, CLOSE_TENANT_MISMATCH, CLOSE_UNAUTHORIZED, ConnectionId,
    ConnectionKind, ConnectionRegistry, ConnectionState,
};
pub use handler::{HubState, hub_router, spawn_idle_sweeper};
pub use message::{ChatClientFrame, NotificationClientFrame, ServerFrame};
