use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use homestead_types::api::MessageResponse;
use homestead_types::events::GatewayEvent;

/// Default time after which an unrefreshed typing indicator is cleared.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies one WebSocket session. A user may hold several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<Uuid>,
}

/// Room registry and event fan-out for connected clients.
///
/// Holds no durable state: it can be dropped and rebuilt at any time, clients
/// rejoin and refetch over REST. Delivery is best-effort, events for a closed
/// connection are discarded.
///
/// Lock discipline: no map guard is held while another map is touched.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// conversation_id -> member connections
    rooms: DashMap<Uuid, HashSet<ConnectionId>>,

    connections: DashMap<ConnectionId, ConnectionEntry>,

    /// (conversation_id, user_id) -> generation of the latest `isTyping: true`
    typing: DashMap<(Uuid, Uuid), u64>,

    next_generation: AtomicU64,
    typing_timeout: Duration,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TIMEOUT)
    }
}

impl Hub {
    pub fn new(typing_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: DashMap::new(),
                connections: DashMap::new(),
                typing: DashMap::new(),
                next_generation: AtomicU64::new(0),
                typing_timeout,
            }),
        }
    }

    /// Register a connection. Returns its id and the receiver its events arrive on.
    pub fn register(&self, user_id: Uuid) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        debug!("Registered connection {} for user {}", conn_id, user_id);
        (conn_id, rx)
    }

    /// Drop a connection and every room membership it holds. Typing
    /// indicators left on by a user with no other connection in the room are
    /// cleared for the remaining members.
    pub fn unregister(&self, conn_id: ConnectionId) {
        let Some((_, entry)) = self.inner.connections.remove(&conn_id) else {
            return;
        };

        for conversation_id in &entry.rooms {
            self.remove_member(*conversation_id, conn_id);
            if !self.user_in_room(*conversation_id, entry.user_id) {
                self.clear_typing(*conversation_id, entry.user_id);
            }
        }
        debug!(
            "Unregistered connection {} (user {}, {} rooms)",
            conn_id,
            entry.user_id,
            entry.rooms.len()
        );
    }

    /// Send an event to one connection only.
    pub fn send_to(&self, conn_id: ConnectionId, event: GatewayEvent) -> bool {
        match self.inner.connections.get(&conn_id) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Add a connection to a conversation room. Callers authorize first.
    /// Returns false if the connection is not registered.
    pub fn join_conversation(&self, conn_id: ConnectionId, conversation_id: Uuid) -> bool {
        match self.inner.connections.get_mut(&conn_id) {
            Some(mut entry) => {
                entry.rooms.insert(conversation_id);
            }
            None => return false,
        }

        self.inner
            .rooms
            .entry(conversation_id)
            .or_default()
            .insert(conn_id);

        // Lost a race with unregister: undo so no stale member remains.
        if !self.inner.connections.contains_key(&conn_id) {
            self.remove_member(conversation_id, conn_id);
            return false;
        }

        trace!("Connection {} joined conversation {}", conn_id, conversation_id);
        true
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub fn leave_conversation(&self, conn_id: ConnectionId, conversation_id: Uuid) -> bool {
        let user_id = match self.inner.connections.get_mut(&conn_id) {
            Some(mut entry) => {
                if !entry.rooms.remove(&conversation_id) {
                    return false;
                }
                entry.user_id
            }
            None => return false,
        };

        self.remove_member(conversation_id, conn_id);
        if !self.user_in_room(conversation_id, user_id) {
            self.clear_typing(conversation_id, user_id);
        }
        trace!("Connection {} left conversation {}", conn_id, conversation_id);
        true
    }

    /// Deliver `newMessage` to every member of the message's room, the
    /// sender's own connections included. Returns the number of deliveries.
    pub fn broadcast_new_message(&self, message: MessageResponse) -> usize {
        let conversation_id = message.conversation_id;
        self.broadcast_to_room(conversation_id, GatewayEvent::NewMessage(message), None)
    }

    /// Tell the room that `user_id` has read the conversation.
    pub fn broadcast_read(&self, conversation_id: Uuid, user_id: Uuid) -> usize {
        self.broadcast_to_room(
            conversation_id,
            GatewayEvent::MessagesRead {
                conversation_id,
                user_id,
            },
            None,
        )
    }

    /// Relay a typing indicator to the other members of the room. Ignored
    /// unless the connection has joined the room. An `is_typing: true` that is
    /// not refreshed within the typing timeout is cleared by the hub.
    pub fn typing(&self, conn_id: ConnectionId, conversation_id: Uuid, is_typing: bool) -> bool {
        let user_id = match self.inner.connections.get(&conn_id) {
            Some(entry) if entry.rooms.contains(&conversation_id) => entry.user_id,
            _ => return false,
        };

        let key = (conversation_id, user_id);
        if is_typing {
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            self.inner.typing.insert(key, generation);
            self.schedule_typing_expiry(key, generation);
        } else {
            self.inner.typing.remove(&key);
        }

        self.broadcast_to_room(
            conversation_id,
            GatewayEvent::Typing {
                conversation_id,
                user_id,
                is_typing,
            },
            Some(user_id),
        );
        true
    }

    pub fn room_size(&self, conversation_id: Uuid) -> usize {
        self.inner
            .rooms
            .get(&conversation_id)
            .map_or(0, |members| members.len())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_typing(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.inner.typing.contains_key(&(conversation_id, user_id))
    }

    fn schedule_typing_expiry(&self, key: (Uuid, Uuid), generation: u64) {
        let hub = self.clone();
        let timeout = self.inner.typing_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = hub
                .inner
                .typing
                .remove_if(&key, |_, current| *current == generation)
                .is_some();
            if expired {
                let (conversation_id, user_id) = key;
                trace!("Typing indicator for {} in {} timed out", user_id, conversation_id);
                hub.broadcast_to_room(
                    conversation_id,
                    GatewayEvent::Typing {
                        conversation_id,
                        user_id,
                        is_typing: false,
                    },
                    Some(user_id),
                );
            }
        });
    }

    /// Clear an active typing indicator and announce it. No-op if none.
    fn clear_typing(&self, conversation_id: Uuid, user_id: Uuid) {
        if self
            .inner
            .typing
            .remove(&(conversation_id, user_id))
            .is_some()
        {
            self.broadcast_to_room(
                conversation_id,
                GatewayEvent::Typing {
                    conversation_id,
                    user_id,
                    is_typing: false,
                },
                Some(user_id),
            );
        }
    }

    fn remove_member(&self, conversation_id: Uuid, conn_id: ConnectionId) {
        if let Some(mut members) = self.inner.rooms.get_mut(&conversation_id) {
            members.remove(&conn_id);
        }
        self.inner
            .rooms
            .remove_if(&conversation_id, |_, members| members.is_empty());
    }

    fn user_in_room(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.members(conversation_id).into_iter().any(|id| {
            self.inner
                .connections
                .get(&id)
                .is_some_and(|entry| entry.user_id == user_id)
        })
    }

    fn members(&self, conversation_id: Uuid) -> Vec<ConnectionId> {
        self.inner
            .rooms
            .get(&conversation_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn broadcast_to_room(
        &self,
        conversation_id: Uuid,
        event: GatewayEvent,
        exclude_user: Option<Uuid>,
    ) -> usize {
        let mut delivered = 0;
        for conn_id in self.members(conversation_id) {
            let Some(entry) = self.inner.connections.get(&conn_id) else {
                continue;
            };
            if exclude_user == Some(entry.user_id) {
                continue;
            }
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}
