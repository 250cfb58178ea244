//! Connection state and registry.
//!
//! Each connection owns a bounded outbound buffer. Broadcasts use
//! `try_send`: a full buffer means the client is too slow to keep up, and
//! the connection is force-closed with the back-pressure close code rather
//! than blocking delivery to the rest of the group.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use herald_core::types::TenantId;
use herald_store::ConversationId;

/// Close code: missing, malformed or rejected token.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Close code: token tenant claim does not match the path tenant.
pub const CLOSE_TENANT_MISMATCH: u16 = 4003;

/// Close code: connection idle past the heartbeat allowance.
pub const CLOSE_IDLE: u16 = 4004;

/// Close code: outbound buffer overflow (slow client).
pub const CLOSE_BACKPRESSURE: u16 = 4008;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection id.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner id value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which socket family a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// `/ws/notifications/{tenant}`
    Notifications,
    /// `/ws/chat/{tenant}`
    Chat,
}

/// State of one WebSocket connection.
#[derive(Debug)]
pub struct ConnectionState {
    /// Connection id.
    pub id: ConnectionId,
    /// Tenant group.
    pub tenant_id: TenantId,
    /// Authenticated user.
    pub user_id: String,
    /// Socket family.
    pub kind: ConnectionKind,
    /// Conversation joined via `join_conversation`, chat sockets only.
    pub conversation: Option<ConversationId>,
    /// Last inbound activity, advanced on every client frame.
    pub last_seen: Instant,
    /// Bounded outbound buffer of serialised frames.
    pub sender: mpsc::Sender<String>,
    /// Signalled to force-close the connection.
    pub close: Arc<Notify>,
    /// Close code to send when force-closing.
    pub close_code: Arc<AtomicU16>,
}

impl ConnectionState {
    /// Creates connection state around an outbound buffer.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        user_id: impl Into<String>,
        kind: ConnectionKind,
        sender: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            tenant_id,
            user_id: user_id.into(),
            kind,
            conversation: None,
            last_seen: Instant::now(),
            sender,
            close: Arc::new(Notify::new()),
            close_code: Arc::new(AtomicU16::new(0)),
        }
    }

    /// Advances the activity clock.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Time since the last client frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// Registry of live connections with per-tenant and per-conversation
/// broadcast.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<RwLock<ConnectionState>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    pub fn register(&self, state: ConnectionState) -> Arc<RwLock<ConnectionState>> {
        let id = state.id;
        let state = Arc::new(RwLock::new(state));
        self.connections.insert(id, Arc::clone(&state));
        debug!(%id, "Connection registered");
        state
    }

    /// Unregisters a connection.
    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            debug!(%id, "Connection unregistered");
        }
    }

    /// Number of live connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes a connection with the given close code.
    pub fn kill(&self, id: ConnectionId, code: u16) {
        if let Some((_, state)) = self.connections.remove(&id) {
            let guard = state.read();
            guard.close_code.store(code, Ordering::Relaxed);
            guard.close.notify_waiters();
            warn!(%id, code, "Connection force-closed");
        }
    }

    /// Delivers a frame to every connection of a tenant on one socket
    /// family. Returns the number of connections reached.
    pub fn broadcast_tenant(&self, tenant_id: &TenantId, kind: ConnectionKind, text: &str) -> usize {
        self.deliver(|state| state.tenant_id == *tenant_id && state.kind == kind, text)
    }

    /// Delivers a frame to one user's connections in a tenant.
    pub fn send_to_user(
        &self,
        tenant_id: &TenantId,
        kind: ConnectionKind,
        user_id: &str,
        text: &str,
    ) -> usize {
        self.deliver(
            |state| {
                state.tenant_id == *tenant_id && state.kind == kind && state.user_id == user_id
            },
            text,
        )
    }

    /// Delivers a frame to every chat connection joined to a conversation.
    pub fn broadcast_conversation(&self, conversation_id: &ConversationId, text: &str) -> usize {
        self.deliver(
            |state| state.conversation.as_ref() == Some(conversation_id),
            text,
        )
    }

    /// Connections idle past the timeout.
    #[must_use]
    pub fn timed_out(&self, idle_timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter_map(|entry| {
                let state = entry.value().read();
                (state.idle_for() > idle_timeout).then_some(state.id)
            })
            .collect()
    }

    /// Force-closes all connections, for shutdown. Returns how many were
    /// closed.
    pub fn close_all(&self, code: u16) -> usize {
        let ids: Vec<_> = self.connections.iter().map(|entry| *entry.key()).collect();
        let closed = ids.len();
        for id in ids {
            self.kill(id, code);
        }
        closed
    }

    fn deliver(&self, filter: impl Fn(&ConnectionState) -> bool, text: &str) -> usize {
        let mut overloaded = Vec::new();
        let mut delivered = 0;

        for entry in self.connections.iter() {
            let state = entry.value().read();
            if !filter(&state) {
                continue;
            }
            match state.sender.try_send(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    overloaded.push(state.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    overloaded.push(state.id);
                }
            }
        }

        // A full buffer means the client cannot keep up; close it rather
        // than block the group.
        for id in overloaded {
            self.kill(id, CLOSE_BACKPRESSURE);
        }

        delivered
    }
}
