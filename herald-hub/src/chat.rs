//! Chat frame handling over the chat store and connection registry.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use herald_store::{
    ChatMessage, ChatStore, ConversationId, MessageId, MessageType, PresenceStatus,
};

use crate::connection::{ConnectionKind, ConnectionRegistry, ConnectionState};
use crate::message::{ChatClientFrame, ServerFrame};

/// Applies chat client frames: persists through the chat store and fans the
/// resulting server frames out to the affected conversation.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    registry: Arc<ConnectionRegistry>,
}

impl ChatService {
    /// Creates a chat service.
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Handles one client frame from a chat connection.
    pub async fn handle(&self, conn: &Arc<RwLock<ConnectionState>>, frame: ChatClientFrame) {
        match frame {
            ChatClientFrame::Ping { timestamp } => {
                self.reply(
                    conn,
                    &ServerFrame::Pong {
                        timestamp,
                        server_time: Utc::now().timestamp_millis(),
                    },
                )
                .await;
            }
            ChatClientFrame::JoinConversation { conversation_id } => {
                self.join(conn, conversation_id).await;
            }
            ChatClientFrame::LeaveConversation => {
                conn.write().conversation = None;
                self.reply(conn, &ServerFrame::ConversationLeft).await;
            }
            ChatClientFrame::SendMessage {
                content,
                message_type,
                reply_to,
            } => {
                self.send_message(conn, content, message_type, reply_to).await;
            }
            ChatClientFrame::EditMessage {
                message_id,
                content,
            } => {
                self.edit_message(conn, &message_id, &content).await;
            }
            ChatClientFrame::DeleteMessage { message_id } => {
                self.delete_message(conn, &message_id).await;
            }
            ChatClientFrame::AddReaction { message_id, emoji } => {
                self.add_reaction(conn, &message_id, &emoji).await;
            }
            ChatClientFrame::RemoveReaction { message_id, emoji } => {
                self.remove_reaction(conn, &message_id, &emoji).await;
            }
            ChatClientFrame::StartTyping => self.typing(conn, true).await,
            ChatClientFrame::StopTyping => self.typing(conn, false).await,
            ChatClientFrame::MarkRead => self.mark_read(conn).await,
            ChatClientFrame::UpdatePresence { status } => {
                self.update_presence(conn, status).await;
            }
        }
    }

    async fn join(&self, conn: &Arc<RwLock<ConnectionState>>, conversation_id: String) {
        let conversation_id = ConversationId::new(conversation_id);
        let user_id = conn.read().user_id.clone();

        match self
            .store
            .is_active_participant(&conversation_id, &user_id)
            .await
        {
            Ok(true) => {
                conn.write().conversation = Some(conversation_id.clone());
                debug!(%conversation_id, %user_id, "Conversation joined");
                self.reply(
                    conn,
                    &ServerFrame::ConversationJoined {
                        conversation_id: conversation_id.to_string(),
                    },
                )
                .await;
            }
            Ok(false) => {
                warn!(%conversation_id, %user_id, "Join rejected, not a participant");
                self.error(conn, "Not authorized for this conversation").await;
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn send_message(
        &self,
        conn: &Arc<RwLock<ConnectionState>>,
        content: String,
        message_type: Option<String>,
        reply_to: Option<String>,
    ) {
        let (tenant_id, user_id, conversation) = {
            let state = conn.read();
            (
                state.tenant_id.clone(),
                state.user_id.clone(),
                state.conversation.clone(),
            )
        };
        let Some(conversation_id) = conversation else {
            self.error(conn, "Not in a conversation").await;
            return;
        };
        if content.trim().is_empty() {
            self.error(conn, "Message content required").await;
            return;
        }
        let message_type = match message_type.as_deref() {
            None | Some("text") => MessageType::Text,
            Some("emoji") => MessageType::Emoji,
            Some("file") => MessageType::File,
            Some("image") => MessageType::Image,
            Some("system") => MessageType::System,
            Some(_) => {
                self.error(conn, "Invalid message type").await;
                return;
            }
        };

        let message = ChatMessage {
            id: MessageId::generate(),
            tenant_id,
            conversation_id: conversation_id.clone(),
            sender_id: user_id,
            message_type,
            content,
            reply_to: reply_to.map(MessageId::new),
            edited_at: None,
            deleted_at: None,
            created_at: Utc::now(),
        };

        match self.store.create_message(message).await {
            Ok(message) => {
                let message_id = message.id.to_string();
                self.registry.broadcast_conversation(
                    &conversation_id,
                    &ServerFrame::NewMessage { message }.to_text(),
                );
                self.reply(conn, &ServerFrame::MessageSent { message_id }).await;
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn edit_message(
        &self,
        conn: &Arc<RwLock<ConnectionState>>,
        message_id: &str,
        content: &str,
    ) {
        let user_id = conn.read().user_id.clone();
        match self
            .store
            .edit_message(&MessageId::new(message_id), &user_id, content)
            .await
        {
            Ok(message) => {
                self.registry.broadcast_conversation(
                    &message.conversation_id.clone(),
                    &ServerFrame::MessageUpdated { message }.to_text(),
                );
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn delete_message(&self, conn: &Arc<RwLock<ConnectionState>>, message_id: &str) {
        let user_id = conn.read().user_id.clone();
        let message_id = MessageId::new(message_id);
        match self.store.delete_message(&message_id, &user_id).await {
            Ok(()) => {
                if let Ok(message) = self.store.get_message(&message_id).await {
                    self.registry.broadcast_conversation(
                        &message.conversation_id,
                        &ServerFrame::MessageDeleted {
                            message_id: message_id.to_string(),
                        }
                        .to_text(),
                    );
                }
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn add_reaction(
        &self,
        conn: &Arc<RwLock<ConnectionState>>,
        message_id: &str,
        emoji: &str,
    ) {
        let user_id = conn.read().user_id.clone();
        let message_id = MessageId::new(message_id);
        match self.store.add_reaction(&message_id, &user_id, emoji).await {
            Ok(reaction) => {
                if let Ok(message) = self.store.get_message(&message_id).await {
                    self.registry.broadcast_conversation(
                        &message.conversation_id,
                        &ServerFrame::ReactionAdded { reaction }.to_text(),
                    );
                }
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn remove_reaction(
        &self,
        conn: &Arc<RwLock<ConnectionState>>,
        message_id: &str,
        emoji: &str,
    ) {
        let user_id = conn.read().user_id.clone();
        let message_id = MessageId::new(message_id);
        match self
            .store
            .remove_reaction(&message_id, &user_id, emoji)
            .await
        {
            Ok(()) => {
                if let Ok(message) = self.store.get_message(&message_id).await {
                    self.registry.broadcast_conversation(
                        &message.conversation_id,
                        &ServerFrame::ReactionRemoved {
                            message_id: message_id.to_string(),
                            user_id,
                            emoji: emoji.to_string(),
                        }
                        .to_text(),
                    );
                }
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn typing(&self, conn: &Arc<RwLock<ConnectionState>>, typing: bool) {
        let (user_id, conversation) = {
            let state = conn.read();
            (state.user_id.clone(), state.conversation.clone())
        };
        let Some(conversation_id) = conversation else {
            return;
        };
        self.registry.broadcast_conversation(
            &conversation_id,
            &ServerFrame::TypingIndicator {
                conversation_id: conversation_id.to_string(),
                user_id,
                typing,
            }
            .to_text(),
        );
    }

    async fn mark_read(&self, conn: &Arc<RwLock<ConnectionState>>) {
        let (user_id, conversation) = {
            let state = conn.read();
            (state.user_id.clone(), state.conversation.clone())
        };
        let Some(conversation_id) = conversation else {
            self.error(conn, "Not in a conversation").await;
            return;
        };
        match self.store.mark_read(&conversation_id, &user_id).await {
            Ok(()) => {
                self.reply(
                    conn,
                    &ServerFrame::MessagesMarkedRead {
                        conversation_id: conversation_id.to_string(),
                    },
                )
                .await;
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn update_presence(&self, conn: &Arc<RwLock<ConnectionState>>, status: PresenceStatus) {
        let (tenant_id, user_id) = {
            let state = conn.read();
            (state.tenant_id.clone(), state.user_id.clone())
        };
        match self.store.set_presence(tenant_id.clone(), &user_id, status).await {
            Ok(presence) => {
                self.registry.broadcast_tenant(
                    &tenant_id,
                    ConnectionKind::Chat,
                    &ServerFrame::PresenceUpdated {
                        user_id: presence.user_id,
                        status: presence.status,
                    }
                    .to_text(),
                );
            }
            Err(e) => self.error(conn, &e.to_string()).await,
        }
    }

    async fn reply(&self, conn: &Arc<RwLock<ConnectionState>>, frame: &ServerFrame) {
        let sender = conn.read().sender.clone();
        let _ = sender.send(frame.to_text()).await;
    }

    async fn error(&self, conn: &Arc<RwLock<ConnectionState>>, message: &str) {
        self.reply(
            conn,
            &ServerFrame::Error {
                message: message.to_string(),
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use herald_core::types::TenantId;
    use herald_store::{ConversationType, InMemoryChatStore, ParticipantRole};

    struct ChatFixture {
        service: ChatService,
        store: Arc<InMemoryChatStore>,
        registry: Arc<ConnectionRegistry>,
        tenant: TenantId,
        conversation: ConversationId,
    }

    async fn fixture() -> ChatFixture {
        let store = Arc::new(InMemoryChatStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let tenant = TenantId::generate();

        let conversation = store
            .create_conversation(tenant.clone(), ConversationType::Group, "general", "alice")
            .await
            .unwrap();
        store
            .add_participant(&conversation.id, "bob", ParticipantRole::Member)
            .await
            .unwrap();

        ChatFixture {
            service: ChatService::new(
                Arc::clone(&store) as Arc<dyn ChatStore>,
                Arc::clone(&registry),
            ),
            store,
            registry,
            tenant,
            conversation: conversation.id,
        }
    }

    fn connect(
        fixture: &ChatFixture,
        user: &str,
    ) -> (Arc<RwLock<ConnectionState>>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let state = fixture.registry.register(ConnectionState::new(
            fixture.tenant.clone(),
            user,
            ConnectionKind::Chat,
            tx,
        ));
        (state, rx)
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> ServerFrame {
        let text = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("frame within 200ms")
            .expect("channel open");
        serde_json::from_str(&text).expect("valid server frame")
    }

    #[tokio::test]
    async fn test_join_then_message_round_trip() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = connect(&fixture, "alice");
        let (bob, mut bob_rx) = connect(&fixture, "bob");

        let conversation_id = fixture.conversation.to_string();
        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::JoinConversation {
                    conversation_id: conversation_id.clone(),
                },
            )
            .await;
        fixture
            .service
            .handle(&bob, ChatClientFrame::JoinConversation { conversation_id })
            .await;
        assert!(matches!(
            recv_frame(&mut alice_rx).await,
            ServerFrame::ConversationJoined { .. }
        ));
        assert!(matches!(
            recv_frame(&mut bob_rx).await,
            ServerFrame::ConversationJoined { .. }
        ));

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::SendMessage {
                    content: "hi".to_string(),
                    message_type: None,
                    reply_to: None,
                },
            )
            .await;

        // Bob receives the broadcast within one hop.
        let frame = recv_frame(&mut bob_rx).await;
        let ServerFrame::NewMessage { message } = frame else {
            panic!("expected new_message, got {frame:?}");
        };
        assert_eq!(message.content, "hi");
        assert_eq!(message.sender_id, "alice");
    }

    #[tokio::test]
    async fn test_send_without_join_rejected() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = connect(&fixture, "alice");

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::SendMessage {
                    content: "hi".to_string(),
                    message_type: None,
                    reply_to: None,
                },
            )
            .await;

        assert!(matches!(
            recv_frame(&mut alice_rx).await,
            ServerFrame::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_non_participant_join_rejected() {
        let fixture = fixture().await;
        let (mallory, mut mallory_rx) = connect(&fixture, "mallory");

        fixture
            .service
            .handle(
                &mallory,
                ChatClientFrame::JoinConversation {
                    conversation_id: fixture.conversation.to_string(),
                },
            )
            .await;

        let ServerFrame::Error { message } = recv_frame(&mut mallory_rx).await else {
            panic!("expected error");
        };
        assert!(message.contains("Not authorized"));
        assert!(mallory.read().conversation.is_none());
    }

    #[tokio::test]
    async fn test_edit_broadcasts_update() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = connect(&fixture, "alice");
        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::JoinConversation {
                    conversation_id: fixture.conversation.to_string(),
                },
            )
            .await;
        recv_frame(&mut alice_rx).await; // joined

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::SendMessage {
                    content: "first".to_string(),
                    message_type: None,
                    reply_to: None,
                },
            )
            .await;
        let ServerFrame::NewMessage { message } = recv_frame(&mut alice_rx).await else {
            panic!("expected new_message");
        };
        recv_frame(&mut alice_rx).await; // message_sent ack

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::EditMessage {
                    message_id: message.id.to_string(),
                    content: "edited".to_string(),
                },
            )
            .await;

        let ServerFrame::MessageUpdated { message } = recv_frame(&mut alice_rx).await else {
            panic!("expected message_updated");
        };
        assert_eq!(message.content, "edited");
        assert!(message.edited_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_reaction_errors() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = connect(&fixture, "alice");
        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::JoinConversation {
                    conversation_id: fixture.conversation.to_string(),
                },
            )
            .await;
        recv_frame(&mut alice_rx).await;

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::SendMessage {
                    content: "react to me".to_string(),
                    message_type: None,
                    reply_to: None,
                },
            )
            .await;
        let ServerFrame::NewMessage { message } = recv_frame(&mut alice_rx).await else {
            panic!("expected new_message");
        };
        recv_frame(&mut alice_rx).await; // ack

        let add = ChatClientFrame::AddReaction {
            message_id: message.id.to_string(),
            emoji: "👍".to_string(),
        };
        fixture.service.handle(&alice, add.clone()).await;
        assert!(matches!(
            recv_frame(&mut alice_rx).await,
            ServerFrame::ReactionAdded { .. }
        ));

        fixture.service.handle(&alice, add).await;
        assert!(matches!(
            recv_frame(&mut alice_rx).await,
            ServerFrame::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_typing_indicator_needs_conversation() {
        let fixture = fixture().await;
        let (alice, mut alice_rx) = connect(&fixture, "alice");

        // Not joined: silently ignored.
        fixture.service.handle(&alice, ChatClientFrame::StartTyping).await;
        assert!(alice_rx.try_recv().is_err());

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::JoinConversation {
                    conversation_id: fixture.conversation.to_string(),
                },
            )
            .await;
        recv_frame(&mut alice_rx).await;

        fixture.service.handle(&alice, ChatClientFrame::StartTyping).await;
        let ServerFrame::TypingIndicator { typing, user_id, .. } =
            recv_frame(&mut alice_rx).await
        else {
            panic!("expected typing_indicator");
        };
        assert!(typing);
        assert_eq!(user_id, "alice");
    }

    #[tokio::test]
    async fn test_mark_read_updates_cursor() {
        let fixture = fixture().await;
        let (bob, mut bob_rx) = connect(&fixture, "bob");
        fixture
            .service
            .handle(
                &bob,
                ChatClientFrame::JoinConversation {
                    conversation_id: fixture.conversation.to_string(),
                },
            )
            .await;
        recv_frame(&mut bob_rx).await;

        fixture.service.handle(&bob, ChatClientFrame::MarkRead).await;
        assert!(matches!(
            recv_frame(&mut bob_rx).await,
            ServerFrame::MessagesMarkedRead { .. }
        ));

        let participants = fixture.store.participants(&fixture.conversation).await.unwrap();
        let bob_row = participants.iter().find(|p| p.user_id == "bob").unwrap();
        assert!(bob_row.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn test_presence_broadcast_to_tenant() {
        let fixture = fixture().await;
        let (alice, _alice_rx) = connect(&fixture, "alice");
        let (_bob, mut bob_rx) = connect(&fixture, "bob");

        fixture
            .service
            .handle(
                &alice,
                ChatClientFrame::UpdatePresence {
                    status: PresenceStatus::Busy,
                },
            )
            .await;

        let ServerFrame::PresenceUpdated { user_id, status } = recv_frame(&mut bob_rx).await
        else {
            panic!("expected presence_updated");
        };
        assert_eq!(user_id, "alice");
        assert_eq!(status, PresenceStatus::Busy);
    }
}
