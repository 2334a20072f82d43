// Connection manager: lifecycle, subscriptions, pending sends

mod queue;
mod registry;


pub use queue::{PendingQueue, PendingSend};
pub use registry::{MessageCallback, SubscriptionEntry, SubscriptionRegistry};

use crate::config::ClubwireConfig;
use crate::protocol::{self, SENT_AT_HEADER, USER_ID_HEADER};
use crate::transport::{
    ConnectHeaders, EventReceiver, Transport, TransportError, TransportEvent, TransportSession,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Lifecycle of the logical backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(TransportError),
    #[error("pending queue full ({limit} messages)")]
    QueueFull { limit: usize },
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Client-side connection manager for the club realtime backend.
///
/// Owns one logical connection, the registry of active topic subscriptions,
/// and a bounded queue of sends captured while offline. Cheap to clone;
/// clones share the same connection.
///
/// Invalid operations caused by connection state (subscribe while
/// disconnected, duplicate subscribe, unsubscribe of an unknown topic) are
/// logged no-ops. The one failure callers must react to is a rejected
/// `connect`.
#[derive(Clone)]
pub struct RealtimeClient {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    user_id: Arc<RwLock<Option<String>>>,
    registry: Arc<SubscriptionRegistry>,
    pending: Arc<PendingQueue>,
    session: Arc<RwLock<Option<Arc<dyn TransportSession>>>>,
    /// Serializes connect/disconnect so racing calls cannot create two sessions
    lifecycle: Arc<AsyncMutex<()>>,
}

impl RealtimeClient {
    pub fn new(config: &ClubwireConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            user_id: Arc::new(RwLock::new(None)),
            registry: Arc::new(SubscriptionRegistry::new()),
            pending: Arc::new(PendingQueue::new(config.queue.pending_limit)),
            session: Arc::new(RwLock::new(None)),
            lifecycle: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Store the identity attached to the connection handshake and to every
    /// send. Identity on an already-established connection is not updated;
    /// sends read the current value each time.
    pub fn set_user_id(&self, id: impl Into<String>) {
        *self.user_id.write().unwrap() = Some(id.into());
    }

    /// Establish the connection. No-op when already connected; exactly one
    /// transport session exists at a time. On success the pending queue is
    /// drained in FIFO order before this returns.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _guard = self.lifecycle.lock().await;

        if self.is_connected() {
            debug!("connect() while already connected is a no-op");
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);

        let mut headers = ConnectHeaders::new();
        if let Some(id) = self.user_id() {
            headers.insert(USER_ID_HEADER.to_string(), id);
        }

        match self.transport.connect(headers).await {
            Ok((session, events)) => {
                *self.session.write().unwrap() = Some(Arc::clone(&session));
                self.set_state(ConnectionState::Connected);
                info!("Realtime connection established");
                self.spawn_event_pump(events, session);
                self.drain_pending().await;
                Ok(())
            }
            Err(e) => {
                // a stale Connecting state would wedge every later connect()
                self.set_state(ConnectionState::Disconnected);
                warn!(error = %e, "Realtime connect failed");
                Err(ClientError::Connect(e))
            }
        }
    }

    /// Tear down the connection: unsubscribe everything, clear the
    /// registry, close the session. Idempotent.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;

        let session = self.session.write().unwrap().take();
        let Some(session) = session else {
            debug!("disconnect() while already disconnected is a no-op");
            return;
        };

        for (topic, entry) in self.registry.drain() {
            if let Err(e) = session.unsubscribe(&entry.id).await {
                debug!(topic = %topic, error = %e, "Unsubscribe during teardown failed");
            }
        }
        session.close().await;
        self.set_state(ConnectionState::Disconnected);
        info!("Realtime connection closed");
    }

    /// Register a callback for a topic. Requires an established connection:
    /// while disconnected this warns and registers nothing (it is not
    /// queued for later). A duplicate topic keeps the existing
    /// subscription and callback.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> Result<(), ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if !self.is_connected() {
            warn!(topic = %topic, "subscribe() while disconnected is a no-op");
            return Ok(());
        }
        if self.registry.contains(topic) {
            warn!(topic = %topic, "Already subscribed, keeping existing subscription");
            return Ok(());
        }

        let Some(session) = self.current_session() else {
            warn!(topic = %topic, "subscribe() without an active session is a no-op");
            return Ok(());
        };

        let id = session.subscribe(topic).await.map_err(ClientError::Transport)?;
        self.registry.insert(topic.to_string(), id, Arc::new(callback));
        info!(topic = %topic, "Subscribed");
        Ok(())
    }

    /// Subscribe to the connected user's private message queue
    pub async fn subscribe_to_user_queue<F>(&self, callback: F) -> Result<(), ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe(protocol::USER_QUEUE_TOPIC, callback).await
    }

    /// Subscribe to a room's topic
    pub async fn join_room<F>(&self, room_id: &str, callback: F) -> Result<(), ClientError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe(&protocol::room_topic(room_id), callback).await
    }

    /// Drop a room subscription. Unknown room is a silent no-op.
    pub async fn leave_room(&self, room_id: &str) {
        self.unsubscribe(&protocol::room_topic(room_id)).await;
    }

    /// Drop every room subscription, leaving other topics (e.g. the user
    /// queue) untouched.
    pub async fn leave_all_rooms(&self) {
        for topic in self.registry.topics() {
            if protocol::is_room_topic(&topic) {
                self.unsubscribe(&topic).await;
            }
        }
    }

    /// Remove one topic subscription. Unknown topic is a silent no-op.
    pub async fn unsubscribe(&self, topic: &str) {
        let Some(entry) = self.registry.remove(topic) else {
            debug!(topic = %topic, "unsubscribe() on unknown topic is a no-op");
            return;
        };

        if let Some(session) = self.current_session() {
            if let Err(e) = session.unsubscribe(&entry.id).await {
                warn!(topic = %topic, error = %e, "Transport unsubscribe failed");
            }
        }
        info!(topic = %topic, "Unsubscribed");
    }

    /// Publish a payload to a destination. While connected this goes out
    /// immediately with the identity header attached; while disconnected it
    /// is buffered FIFO until the next successful connect, up to the
    /// configured queue limit.
    pub async fn send<T: Serialize>(&self, destination: &str, payload: &T) -> Result<(), ClientError> {
        let body = serde_json::to_string(payload)?;

        if self.is_connected() {
            return self.publish(destination, body).await;
        }

        let entry = PendingSend {
            destination: destination.to_string(),
            body,
        };
        if !self.pending.push(entry) {
            warn!(destination = %destination, limit = self.pending.limit(), "Pending queue full, rejecting send");
            return Err(ClientError::QueueFull {
                limit: self.pending.limit(),
            });
        }
        debug!(destination = %destination, queued = self.pending.len(), "Connection down, send queued");
        Ok(())
    }

    /// Publish a message into a room
    pub async fn send_message_to_room<T: Serialize>(
        &self,
        room_id: &str,
        message: &T,
    ) -> Result<(), ClientError> {
        self.send(&protocol::room_destination(room_id), message).await
    }

    pub fn is_connected(&self) -> bool {
        *self.state.read().unwrap() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    /// Snapshot of the currently subscribed topic names
    pub fn active_subscriptions(&self) -> Vec<String> {
        self.registry.topics()
    }

    /// Number of sends buffered for the next successful connect
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap() = state;
    }

    fn current_session(&self) -> Option<Arc<dyn TransportSession>> {
        self.session.read().unwrap().clone()
    }

    /// True while the given session is the one this client owns. Pump tasks
    /// from a torn-down session use this to stop applying state changes.
    fn is_current(&self, session: &Arc<dyn TransportSession>) -> bool {
        match &*self.session.read().unwrap() {
            Some(current) => Arc::ptr_eq(current, session),
            None => false,
        }
    }

    /// The publish path shared by live sends and queue drains
    async fn publish(&self, destination: &str, body: String) -> Result<(), ClientError> {
        let Some(session) = self.current_session() else {
            return Err(ClientError::Transport(TransportError::Closed));
        };

        let mut headers = HashMap::new();
        headers.insert(
            USER_ID_HEADER.to_string(),
            self.user_id().unwrap_or_default(),
        );
        headers.insert(SENT_AT_HEADER.to_string(), Utc::now().to_rfc3339());

        session
            .publish(destination, headers, body)
            .await
            .map_err(ClientError::Transport)
    }

    /// Flush the pending queue in FIFO order. Entries are popped one at a
    /// time so the queue lock is never held across a publish.
    async fn drain_pending(&self) {
        let mut flushed = 0usize;
        while let Some(entry) = self.pending.pop() {
            if let Err(e) = self.publish(&entry.destination, entry.body).await {
                warn!(destination = %entry.destination, error = %e, "Failed to flush pending send");
            }
            flushed += 1;
        }
        if flushed > 0 {
            info!(count = flushed, "Flushed pending sends");
        }
    }

    fn spawn_event_pump(&self, mut events: EventReceiver, session: Arc<dyn TransportSession>) {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !client.is_current(&session) {
                    break;
                }
                match event {
                    TransportEvent::Message { topic, body } => client.dispatch(&topic, &body),
                    TransportEvent::Disconnected => {
                        warn!("Realtime connection lost, transport will retry");
                        client.set_state(ConnectionState::Disconnected);
                    }
                    TransportEvent::Reconnected => {
                        info!("Realtime connection restored");
                        client.set_state(ConnectionState::Connected);
                        client.replay_subscriptions(&session).await;
                        client.drain_pending().await;
                    }
                }
            }
            debug!("Event pump stopped");
        });
    }

    /// Route one inbound message to its topic callback. Malformed payloads
    /// are dropped with a warning; the callback never sees them.
    fn dispatch(&self, topic: &str, body: &str) {
        let Some(callback) = self.registry.callback(topic) else {
            debug!(topic = %topic, "Message on topic without subscription");
            return;
        };
        match serde_json::from_str::<Value>(body) {
            Ok(payload) => callback(payload),
            Err(e) => warn!(topic = %topic, error = %e, "Dropping malformed message payload"),
        }
    }

    /// Re-register every registry entry after a transport-level reconnect,
    /// refreshing the stored subscription handles.
    async fn replay_subscriptions(&self, session: &Arc<dyn TransportSession>) {
        for topic in self.registry.topics() {
            match session.subscribe(&topic).await {
                Ok(id) => {
                    self.registry.set_id(&topic, id);
                    debug!(topic = %topic, "Resubscribed");
                }
                Err(e) => warn!(topic = %topic, error = %e, "Resubscribe failed"),
            }
        }
        if !self.registry.is_empty() {
            info!(count = self.registry.len(), "Replayed subscriptions after reconnect");
        }
    }
}
