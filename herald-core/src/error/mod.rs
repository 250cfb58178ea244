//! Error types for the Herald notification service.
//!
//! The error system is organised hierarchically, one domain enum per
//! subsystem aggregated into [`HeraldError`]:
//!
//! - `StoreError` - persistence failures and invalid state transitions
//! - `CacheError` - credential/branding cache and encryption failures
//! - `ChannelError` - channel sender construction failures
//! - `QueueError` - delivery queue lifecycle errors
//! - `EventError` - envelope validation and consumer errors
//! - `ConfigError` - configuration loading errors

use thiserror::Error;

mod cache;
mod channel;
mod config;
mod event;
mod queue;
mod store;

pub use cache::CacheError;
pub use channel::ChannelError;
pub use config::ConfigError;
pub use event::EventError;
pub use queue::QueueError;
pub use store::StoreError;

/// Top-level error type for the Herald service.
#[derive(Error, Debug)]
pub enum HeraldError {
    /// Persistence error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Cache or encryption error.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// Channel sender error.
    #[error("{0}")]
    Channel(#[from] ChannelError),

    /// Delivery queue error.
    #[error("{0}")]
    Queue(#[from] QueueError),

    /// Event intake error.
    #[error("{0}")]
    Event(#[from] EventError),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl HeraldError {
    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Cache(e) => e.is_retriable(),
            Self::Event(e) => e.is_retriable(),
            Self::Channel(_) | Self::Config(_) => false,
            Self::Queue(e) => e.is_retriable(),
        }
    }
}
