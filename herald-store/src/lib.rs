//! # Herald Store
//!
//! Storage traits for the Herald notification service, with in-memory
//! backends used in tests and local runs.
//!
//! The traits are the seam to the external database; the database remains
//! the single source of truth for delivery state, and the claim operation
//! on [`DeliveryStore`] carries the at-most-one-in-flight guarantee.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod chat;
pub mod credential;
pub mod delivery;
pub mod device;

pub use audit::{AuditEntry, AuditStore, InMemoryAuditStore};
pub use chat::{
    ChatConversation, ChatMessage, ChatParticipant, ChatStore, ConversationId, ConversationType,
    InMemoryChatStore, MessageId, MessageReaction, MessageType, ParticipantRole, PresenceStatus,
    UserPresence,
};
pub use credential::{Credential, CredentialStore, InMemoryCredentialStore};
pub use delivery::{DeliveryStore, InMemoryDeliveryStore};
pub use device::{DeviceToken, DeviceTokenStore, InMemoryDeviceTokenStore};
