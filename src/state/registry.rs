//! In-process connection registry mapping identities to live sockets.
//!
//! Purely transient: rebuilt from `join` messages after a restart, torn down
//! socket by socket from the close handler. Nothing here is persisted.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::ws::{OutboundFrame, ServerEvent};

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    /// User owning the socket.
    pub user_id: Uuid,
    /// Session the socket is subscribed to.
    pub session_id: Uuid,
    /// Writer-task channel for the socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Maps `user id → socket` and `session id → subscribed user ids`.
///
/// Owned by [`AppState`](super::AppState); mutated only from socket event
/// handlers on the runtime's event loop.
#[derive(Default)]
pub struct ConnectionRegistry {
    users: DashMap<Uuid, ClientConnection>,
    sessions: DashMap<Uuid, Vec<Uuid>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection into both maps. A prior socket for the same user
    /// is silently replaced; a prior subscription to a different session is
    /// dropped so old broadcasts cannot follow the user over.
    pub fn register(&self, user_id: Uuid, session_id: Uuid, tx: mpsc::UnboundedSender<Message>) {
        let previous = self.users.insert(
            user_id,
            ClientConnection {
                user_id,
                session_id,
                tx,
            },
        );
        if let Some(previous) = previous
            && previous.session_id != session_id
        {
            self.drop_subscription(previous.session_id, user_id);
        }
        let mut subscribers = self.sessions.entry(session_id).or_default();
        if !subscribers.contains(&user_id) {
            subscribers.push(user_id);
        }
    }

    /// Remove a user's connection from both maps. Returns the session the
    /// user was subscribed to, if any.
    pub fn unregister(&self, user_id: Uuid) -> Option<Uuid> {
        let (_, connection) = self.users.remove(&user_id)?;
        let session_id = connection.session_id;
        self.drop_subscription(session_id, user_id);
        Some(session_id)
    }

    /// Remove a user from a session's subscriber list, dropping the entry
    /// once its list is empty.
    fn drop_subscription(&self, session_id: Uuid, user_id: Uuid) {
        if let Some(mut subscribers) = self.sessions.get_mut(&session_id) {
            subscribers.retain(|id| *id != user_id);
            let empty = subscribers.is_empty();
            drop(subscribers);
            if empty {
                self.sessions.remove(&session_id);
            }
        }
    }

    /// Serialize an event once and push it to every open socket subscribed to
    /// the session. Refused writes are swallowed so one dead socket cannot
    /// take the fan-out down for the others.
    pub fn broadcast(&self, session_id: Uuid, event: ServerEvent) {
        let Some(payload) = serialize_frame(&event) else {
            return;
        };

        let Some(subscribers) = self.sessions.get(&session_id) else {
            debug!(%session_id, "broadcast to session with no subscribers");
            return;
        };

        for user_id in subscribers.iter() {
            if let Some(connection) = self.users.get(user_id) {
                let _ = connection.tx.send(Message::Text(payload.clone().into()));
            }
        }
    }

    /// Like [`ConnectionRegistry::broadcast`], but skips one user's socket.
    pub fn broadcast_except(&self, session_id: Uuid, exclude: Uuid, event: ServerEvent) {
        let Some(payload) = serialize_frame(&event) else {
            return;
        };

        let Some(subscribers) = self.sessions.get(&session_id) else {
            return;
        };

        for user_id in subscribers.iter().filter(|id| **id != exclude) {
            if let Some(connection) = self.users.get(user_id) {
                let _ = connection.tx.send(Message::Text(payload.clone().into()));
            }
        }
    }

    /// Push an event to a single user's socket, if connected. Bots and
    /// disconnected users are silently skipped.
    pub fn send_to(&self, user_id: Uuid, event: ServerEvent) {
        let Some(payload) = serialize_frame(&event) else {
            return;
        };
        if let Some(connection) = self.users.get(&user_id) {
            let _ = connection.tx.send(Message::Text(payload.into()));
        }
    }

    /// Number of live sockets subscribed to a session.
    pub fn session_connection_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .get(&session_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of sessions with at least one live socket.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Serialize an outbound frame, stamping the timestamp.
///
/// A serialization failure is a bug in the event types, not a transport
/// problem; it is logged and the frame is dropped.
fn serialize_frame(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(&OutboundFrame::now(event.clone())) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound event `{event:?}`");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        registry: &ConnectionRegistry,
        session_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let user_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(user_id, session_id, tx);
        (user_id, rx)
    }

    fn text_of(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_every_session_subscriber() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (user_a, mut rx_a) = connect(&registry, session_id);
        let (_, mut rx_b) = connect(&registry, session_id);
        let (_, mut rx_other) = connect(&registry, Uuid::new_v4());

        registry.broadcast(session_id, ServerEvent::UserLeft { user_id: user_a });

        let frame = text_of(rx_a.try_recv().unwrap());
        assert_eq!(frame["type"], "user-left");
        assert!(frame["timestamp"].is_string());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn register_replaces_prior_socket_for_user() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        registry.register(user_id, session_id, old_tx);
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        registry.register(user_id, session_id, new_tx);

        registry.send_to(user_id, ServerEvent::UserLeft { user_id });
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
        assert_eq!(registry.session_connection_count(session_id), 1);
    }

    #[test]
    fn register_unsubscribes_from_the_previous_session() {
        let registry = ConnectionRegistry::new();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        registry.register(user_id, session_a, tx_a);
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(user_id, session_b, tx_b);

        // The old session forgets the user entirely.
        registry.broadcast(session_a, ServerEvent::UserLeft { user_id });
        assert!(rx_b.try_recv().is_err());
        assert_eq!(registry.session_connection_count(session_a), 0);
        assert_eq!(registry.session_connection_count(session_b), 1);
    }

    #[test]
    fn unregister_drops_empty_session_entry() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (user_a, _rx_a) = connect(&registry, session_id);
        let (user_b, _rx_b) = connect(&registry, session_id);

        assert_eq!(registry.unregister(user_a), Some(session_id));
        assert_eq!(registry.session_connection_count(session_id), 1);
        assert_eq!(registry.unregister(user_b), Some(session_id));
        assert_eq!(registry.session_connection_count(session_id), 0);
        assert_eq!(registry.unregister(user_b), None);
    }

    #[test]
    fn broadcast_except_skips_the_excluded_user() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (actor, mut rx_actor) = connect(&registry, session_id);
        let (_, mut rx_other) = connect(&registry, session_id);

        registry.broadcast_except(session_id, actor, ServerEvent::UserLeft { user_id: actor });

        assert!(rx_actor.try_recv().is_err());
        assert!(rx_other.try_recv().is_ok());
    }

    #[test]
    fn broadcast_survives_closed_receivers() {
        let registry = ConnectionRegistry::new();
        let session_id = Uuid::new_v4();
        let (_, rx_dead) = connect(&registry, session_id);
        drop(rx_dead);
        let (_, mut rx_live) = connect(&registry, session_id);

        registry.broadcast(
            session_id,
            ServerEvent::UserLeft {
                user_id: Uuid::new_v4(),
            },
        );
        assert!(rx_live.try_recv().is_ok());
    }
}
