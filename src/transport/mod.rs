// Transport session abstraction and websocket adapter

mod ws;

pub use ws::WsTransport;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Headers attached to the connection handshake
pub type ConnectHeaders = HashMap<String, String>;

/// Receiver for session lifecycle events and inbound frames
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Opaque handle for an active topic subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Events surfaced by an active transport session
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound frame on a subscribed topic
    Message { topic: String, body: String },
    /// A previously established connection dropped
    Disconnected,
    /// The transport's automatic reconnect re-established the connection
    Reconnected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("session closed")]
    Closed,
}

/// Factory for transport sessions.
///
/// `connect` resolves once the backend acknowledges the connection. The
/// returned receiver carries inbound frames and lifecycle transitions for
/// the session's whole lifetime, including transparent reconnects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        headers: ConnectHeaders,
    ) -> Result<(Arc<dyn TransportSession>, EventReceiver), TransportError>;
}

/// One established connection to the backend.
///
/// All methods are non-blocking instructions: they hand the frame to the
/// session's io task and return without awaiting network acknowledgment.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn publish(
        &self,
        destination: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<SubscriptionId, TransportError>;

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError>;

    async fn close(&self);
}
