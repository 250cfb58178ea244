//! WebSocket frame types.
//!
//! The notification socket and the chat socket speak different
//! client-to-server vocabularies; server-to-client frames share one enum.

use serde::{Deserialize, Serialize};

use herald_store::{ChatMessage, MessageReaction, PresenceStatus};

/// Client frames accepted on `/ws/notifications/{tenant}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationClientFrame {
    /// Client heartbeat.
    Ping {
        /// Optional timestamp echoed back for latency measurement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Marks a notification record read.
    MarkRead {
        /// Record id.
        notification_id: String,
    },
    /// Requests the unread in-app notification count.
    GetUnreadCount,
}

/// Client frames accepted on `/ws/chat/{tenant}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatClientFrame {
    /// Client heartbeat.
    Ping {
        /// Optional timestamp echoed back for latency measurement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Joins a conversation; required before receiving its messages.
    JoinConversation {
        /// Conversation to join.
        conversation_id: String,
    },
    /// Leaves the current conversation.
    LeaveConversation,
    /// Sends a message into the joined conversation.
    SendMessage {
        /// Message text.
        content: String,
        /// Message kind, defaults to text.
        #[serde(default)]
        message_type: Option<String>,
        /// Threaded reply target.
        #[serde(default)]
        reply_to: Option<String>,
    },
    /// Edits an own message.
    EditMessage {
        /// Message id.
        message_id: String,
        /// New text.
        content: String,
    },
    /// Soft-deletes an own message.
    DeleteMessage {
        /// Message id.
        message_id: String,
    },
    /// Adds an emoji reaction.
    AddReaction {
        /// Message id.
        message_id: String,
        /// Unicode emoji.
        emoji: String,
    },
    /// Removes an emoji reaction.
    RemoveReaction {
        /// Message id.
        message_id: String,
        /// Unicode emoji.
        emoji: String,
    },
    /// Starts a typing indicator in the joined conversation.
    StartTyping,
    /// Stops the typing indicator.
    StopTyping,
    /// Marks the joined conversation read.
    MarkRead,
    /// Updates the user's presence status.
    UpdatePresence {
        /// New status.
        status: PresenceStatus,
    },
}

/// Server-to-client frames for both sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Greeting sent after a successful connection.
    ConnectionEstablished {
        /// Authenticated user.
        user_id: String,
        /// Tenant group joined.
        tenant_id: String,
        /// Server time, RFC 3339.
        timestamp: String,
    },
    /// Heartbeat response.
    Pong {
        /// Echo of the client timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        /// Server time in epoch milliseconds.
        server_time: i64,
    },
    /// Unread in-app notification count.
    UnreadCount {
        /// Number of unread records.
        count: usize,
    },
    /// Confirmation that a notification was marked read.
    MarkedRead {
        /// Record id.
        notification_id: String,
    },
    /// Error reply.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Confirmation of a conversation join.
    ConversationJoined {
        /// Joined conversation.
        conversation_id: String,
    },
    /// Confirmation of a conversation leave.
    ConversationLeft,
    /// A new chat message in the joined conversation.
    NewMessage {
        /// The persisted message.
        message: ChatMessage,
    },
    /// Acknowledgement to the sender of a message.
    MessageSent {
        /// The persisted message id.
        message_id: String,
    },
    /// A message was edited.
    MessageUpdated {
        /// The updated message.
        message: ChatMessage,
    },
    /// A message was soft-deleted.
    MessageDeleted {
        /// Deleted message id.
        message_id: String,
    },
    /// A reaction was added.
    ReactionAdded {
        /// The reaction row.
        reaction: MessageReaction,
    },
    /// A reaction was removed.
    ReactionRemoved {
        /// Message id.
        message_id: String,
        /// Reacting user.
        user_id: String,
        /// Emoji removed.
        emoji: String,
    },
    /// A participant started or stopped typing.
    TypingIndicator {
        /// Conversation.
        conversation_id: String,
        /// Typing user.
        user_id: String,
        /// True while typing.
        typing: bool,
    },
    /// A participant's presence changed.
    PresenceUpdated {
        /// User whose presence changed.
        user_id: String,
        /// New status.
        status: PresenceStatus,
    },
    /// Confirmation that the conversation was marked read.
    MessagesMarkedRead {
        /// Conversation.
        conversation_id: String,
    },
}

impl ServerFrame {
    /// Serialises the frame to JSON text for the wire.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"frame serialization failed"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_tags() {
        let frame: ChatClientFrame =
            serde_json::from_str(r#"{"type":"join_conversation","conversation_id":"c1"}"#).unwrap();
        assert!(matches!(
            frame,
            ChatClientFrame::JoinConversation { ref conversation_id } if conversation_id == "c1"
        ));

        let frame: ChatClientFrame =
            serde_json::from_str(r#"{"type":"send_message","content":"hi"}"#).unwrap();
        assert!(matches!(frame, ChatClientFrame::SendMessage { .. }));

        let frame: NotificationClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(
            frame,
            NotificationClientFrame::Ping { timestamp: None }
        ));
    }

    #[test]
    fn test_server_frame_round_trip() {
        let frame = ServerFrame::UnreadCount { count: 4 };
        let text = frame.to_text();
        assert!(text.contains("unread_count"));
        let parsed: ServerFrame = serde_json::from_str(&text).unwrap();
        assert!(matches!(parsed, ServerFrame::UnreadCount { count: 4 }));
    }

    #[test]
    fn test_connection_established_shape() {
        let frame = ServerFrame::ConnectionEstablished {
            user_id: "u1".to_string(),
            tenant_id: "t1".to_string(),
            timestamp: "2024-03-01T10:00:00Z".to_string(),
        };
        let text = frame.to_text();
        assert!(text.contains("connection_established"));
        assert!(text.contains("u1"));
    }

    #[test]
    fn test_unknown_client_frame_rejected() {
        let result: Result<ChatClientFrame, _> =
            serde_json::from_str(r#"{"type":"fly_to_moon"}"#);
        assert!(result.is_err());
    }
}
