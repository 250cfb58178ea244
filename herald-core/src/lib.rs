//! # Herald Core
//!
//! Shared types, error hierarchy and configuration for the Herald
//! multi-tenant notification delivery service.
//!
//! This crate is the dependency root of the workspace: every other crate
//! builds on the identifiers, envelopes and delivery-record model defined
//! here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod types;

pub use config::HeraldConfig;
pub use error::HeraldError;
pub use types::{
    ChannelType, DeliveryRecord, DeliveryState, Event, FailureReason, PayloadMap, RecordId,
    RenderedContent, TenantBranding, TenantId,
};
