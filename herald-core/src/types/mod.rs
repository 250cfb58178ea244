//! Core domain types shared across the workspace.

mod branding;
mod channel;
mod event;
mod record;
mod tenant;

pub use branding::TenantBranding;
pub use channel::ChannelType;
pub use event::{Event, PayloadMap};
pub use record::{DeliveryRecord, DeliveryState, FailureReason, RecordId, RenderedContent};
pub use tenant::TenantId;
