//! Chat entities and storage.
//!
//! Conversations, participants, messages and reactions are modelled as
//! tables navigated by query, not pointer graphs. Messages are soft-deleted
//! so reaction totals and reply pointers stay valid.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use herald_core::error::StoreError;
use herald_core::types::TenantId;

/// Unique conversation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Creates a conversation id from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique conversation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message id from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique message id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// One-to-one conversation.
    Direct,
    /// Private multi-user conversation.
    Group,
    /// Open channel.
    Channel,
}

/// Participant role within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Full control.
    Admin,
    /// Moderation rights.
    Moderator,
    /// Regular member.
    Member,
}

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text.
    Text,
    /// Single emoji.
    Emoji,
    /// File attachment.
    File,
    /// Image attachment.
    Image,
    /// Server-generated notice.
    System,
}

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Connected and active.
    Online,
    /// Connected but idle.
    Away,
    /// Do not disturb.
    Busy,
    /// Not connected.
    Offline,
}

/// A chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConversation {
    /// Unique id.
    pub id: ConversationId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Optional title.
    #[serde(default)]
    pub title: String,
    /// Conversation kind.
    pub conversation_type: ConversationType,
    /// Creator user id.
    pub created_by: String,
    /// Time of the latest message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A conversation membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParticipant {
    /// Conversation.
    pub conversation_id: ConversationId,
    /// Member user id.
    pub user_id: String,
    /// Role.
    pub role: ParticipantRole,
    /// Join time.
    pub joined_at: DateTime<Utc>,
    /// Read cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Inactive members may not send.
    pub active: bool,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique id.
    pub id: MessageId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Conversation.
    pub conversation_id: ConversationId,
    /// Sender user id.
    pub sender_id: String,
    /// Message kind.
    pub message_type: MessageType,
    /// Message text or attachment metadata.
    pub content: String,
    /// Threaded reply target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Last edit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// An emoji reaction, unique per `(message, user, emoji)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReaction {
    /// Reacted message.
    pub message_id: MessageId,
    /// Reacting user.
    pub user_id: String,
    /// Unicode emoji.
    pub emoji: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// User presence row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPresence {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// User id.
    pub user_id: String,
    /// Current status.
    pub status: PresenceStatus,
    /// Last status change.
    pub last_seen: DateTime<Utc>,
}

/// Storage seam for chat entities.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Creates a conversation; the creator joins as admin.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn create_conversation(
        &self,
        tenant_id: TenantId,
        conversation_type: ConversationType,
        title: &str,
        created_by: &str,
    ) -> Result<ChatConversation, StoreError>;

    /// Adds a participant to a conversation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown conversation and `Conflict` for a
    /// duplicate membership.
    async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
        role: ParticipantRole,
    ) -> Result<ChatParticipant, StoreError>;

    /// Returns true if the user is an active participant.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn is_active_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
    ) -> Result<bool, StoreError>;

    /// Lists participants of a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn participants(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatParticipant>, StoreError>;

    /// Persists a message sent by an active participant.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the sender is not an active participant.
    async fn create_message(&self, message: ChatMessage) -> Result<ChatMessage, StoreError>;

    /// Fetches a message by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    async fn get_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError>;

    /// Edits a message body; author-only.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the editor is not the author, `NotFound` for an
    /// unknown or deleted message.
    async fn edit_message(
        &self,
        id: &MessageId,
        editor: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// Soft-deletes a message; author-only.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the requester is not the author.
    async fn delete_message(&self, id: &MessageId, requester: &str) -> Result<(), StoreError>;

    /// Adds a reaction; unique per `(message, user, emoji)`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` on a duplicate reaction.
    async fn add_reaction(
        &self,
        message_id: &MessageId,
        user_id: &str,
        emoji: &str,
    ) -> Result<MessageReaction, StoreError>;

    /// Removes a reaction.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the reaction does not exist.
    async fn remove_reaction(
        &self,
        message_id: &MessageId,
        user_id: &str,
        emoji: &str,
    ) -> Result<(), StoreError>;

    /// Advances the participant read cursor.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown membership.
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
    ) -> Result<(), StoreError>;

    /// Upserts a user presence row.
    ///
    /// # Errors
    ///
    /// Returns an error only on backend failure.
    async fn set_presence(
        &self,
        tenant_id: TenantId,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<UserPresence, StoreError>;
}

#[derive(Default)]
struct ChatInner {
    conversations: HashMap<ConversationId, ChatConversation>,
    participants: HashMap<ConversationId, Vec<ChatParticipant>>,
    messages: HashMap<MessageId, ChatMessage>,
    reactions: Vec<MessageReaction>,
    presence: HashMap<(TenantId, String), UserPresence>,
}

/// In-memory chat store.
#[derive(Default)]
pub struct InMemoryChatStore {
    inner: Mutex<ChatInner>,
}

impl InMemoryChatStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists visible (non-deleted) messages of a conversation in order.
    #[must_use]
    pub fn visible_messages(&self, conversation_id: &ConversationId) -> Vec<ChatMessage> {
        let inner = self.inner.lock();
        let mut messages: Vec<_> = inner
            .messages
            .values()
            .filter(|m| m.conversation_id == *conversation_id && m.deleted_at.is_none())
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    /// Lists reactions on a message.
    #[must_use]
    pub fn reactions_for(&self, message_id: &MessageId) -> Vec<MessageReaction> {
        self.inner
            .lock()
            .reactions
            .iter()
            .filter(|r| r.message_id == *message_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_conversation(
        &self,
        tenant_id: TenantId,
        conversation_type: ConversationType,
        title: &str,
        created_by: &str,
    ) -> Result<ChatConversation, StoreError> {
        let created_by = created_by.to_string();
        let conversation = ChatConversation {
            id: ConversationId::generate(),
            tenant_id,
            title: title.to_string(),
            conversation_type,
            created_by: created_by.clone(),
            last_message_at: None,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.lock();
        inner.participants.insert(
            conversation.id.clone(),
            vec![ChatParticipant {
                conversation_id: conversation.id.clone(),
                user_id: created_by,
                role: ParticipantRole::Admin,
                joined_at: Utc::now(),
                last_seen_at: None,
                active: true,
            }],
        );
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn add_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
        role: ParticipantRole,
    ) -> Result<ChatParticipant, StoreError> {
        let user_id = user_id.to_string();
        let mut inner = self.inner.lock();
        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::NotFound {
                entity: "chat_conversation",
                id: conversation_id.to_string(),
            });
        }
        let members = inner.participants.entry(conversation_id.clone()).or_default();
        if members.iter().any(|p| p.user_id == user_id) {
            return Err(StoreError::Conflict {
                entity: "chat_participant",
                reason: format!("user {user_id} already in conversation"),
            });
        }
        let participant = ChatParticipant {
            conversation_id: conversation_id.clone(),
            user_id,
            role,
            joined_at: Utc::now(),
            last_seen_at: None,
            active: true,
        };
        members.push(participant.clone());
        Ok(participant)
    }

    async fn is_active_participant(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .participants
            .get(conversation_id)
            .is_some_and(|members| {
                members.iter().any(|p| p.user_id == user_id && p.active)
            }))
    }

    async fn participants(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatParticipant>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .participants
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_message(&self, message: ChatMessage) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.lock();
        let is_member = inner
            .participants
            .get(&message.conversation_id)
            .is_some_and(|members| {
                members
                    .iter()
                    .any(|p| p.user_id == message.sender_id && p.active)
            });
        if !is_member {
            return Err(StoreError::Conflict {
                entity: "chat_message",
                reason: format!(
                    "user {} is not an active participant of {}",
                    message.sender_id, message.conversation_id
                ),
            });
        }
        if let Some(conversation) = inner.conversations.get_mut(&message.conversation_id) {
            conversation.last_message_at = Some(message.created_at);
        }
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: &MessageId) -> Result<ChatMessage, StoreError> {
        self.inner
            .lock()
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "chat_message",
                id: id.to_string(),
            })
    }

    async fn edit_message(
        &self,
        id: &MessageId,
        editor: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .get_mut(id)
            .filter(|m| m.deleted_at.is_none())
            .ok_or_else(|| StoreError::NotFound {
                entity: "chat_message",
                id: id.to_string(),
            })?;
        if message.sender_id != editor {
            return Err(StoreError::Conflict {
                entity: "chat_message",
                reason: "only the author may edit a message".to_string(),
            });
        }
        message.content = content.to_string();
        message.edited_at = Some(Utc::now());
        Ok(message.clone())
    }

    async fn delete_message(&self, id: &MessageId, requester: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "chat_message",
                id: id.to_string(),
            })?;
        if message.sender_id != requester {
            return Err(StoreError::Conflict {
                entity: "chat_message",
                reason: "only the author may delete a message".to_string(),
            });
        }
        message.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn add_reaction(
        &self,
        message_id: &MessageId,
        user_id: &str,
        emoji: &str,
    ) -> Result<MessageReaction, StoreError> {
        let user_id = user_id.to_string();
        let emoji = emoji.to_string();
        let mut inner = self.inner.lock();
        if !inner.messages.contains_key(message_id) {
            return Err(StoreError::NotFound {
                entity: "chat_message",
                id: message_id.to_string(),
            });
        }
        let duplicate = inner.reactions.iter().any(|r| {
            r.message_id == *message_id && r.user_id == user_id && r.emoji == emoji
        });
        if duplicate {
            return Err(StoreError::Conflict {
                entity: "message_reaction",
                reason: format!("duplicate reaction {emoji} by {user_id}"),
            });
        }
        let reaction = MessageReaction {
            message_id: message_id.clone(),
            user_id,
            emoji,
            created_at: Utc::now(),
        };
        inner.reactions.push(reaction.clone());
        Ok(reaction)
    }

    async fn remove_reaction(
        &self,
        message_id: &MessageId,
        user_id: &str,
        emoji: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.reactions.len();
        inner.reactions.retain(|r| {
            !(r.message_id == *message_id && r.user_id == user_id && r.emoji == emoji)
        });
        if inner.reactions.len() == before {
            return Err(StoreError::NotFound {
                entity: "message_reaction",
                id: format!("{message_id}:{user_id}:{emoji}"),
            });
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let members = inner
            .participants
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "chat_conversation",
                id: conversation_id.to_string(),
            })?;
        let participant = members
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "chat_participant",
                id: user_id.to_string(),
            })?;
        participant.last_seen_at = Some(Utc::now());
        Ok(())
    }

    async fn set_presence(
        &self,
        tenant_id: TenantId,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<UserPresence, StoreError> {
        let user_id = user_id.to_string();
        let presence = UserPresence {
            tenant_id: tenant_id.clone(),
            user_id: user_id.clone(),
            status,
            last_seen: Utc::now(),
        };
        self.inner
            .lock()
            .presence
            .insert((tenant_id, user_id), presence.clone());
        Ok(presence)
    }
}
