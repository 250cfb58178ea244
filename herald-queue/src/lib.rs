//! # Herald Queue
//!
//! The durable delivery queue: a fixed worker pool claims due records from
//! the delivery store, invokes the channel sender under a per-channel
//! timeout, and drives the record state machine
//! `pending → retrying → success/failed` with exponential backoff and
//! lease-based reclaim of stale claims.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
mod queue;

pub use backoff::BackoffPolicy;
pub use queue::{DeliveryQueue, SenderRegistry};
