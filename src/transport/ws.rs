use crate::protocol::{ClientFrame, ServerFrame};
use crate::transport::{
    ConnectHeaders, EventReceiver, SubscriptionId, Transport, TransportError, TransportEvent,
    TransportSession,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket transport speaking the club backend's frame protocol.
///
/// Each session is owned by a single io task that multiplexes the outbound
/// command channel and the inbound stream. After an established connection
/// drops, the task retries on a fixed delay until the socket comes back,
/// emitting `Disconnected` and `Reconnected` so callers can track state.
pub struct WsTransport {
    url: String,
    reconnect_delay: Duration,
}

enum IoCommand {
    Frame(ClientFrame),
    Close,
}

enum PumpExit {
    /// Connection dropped; the io task should reconnect
    Dropped,
    /// Session closed by the caller or all handles gone
    Closed,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Build the handshake request with connection headers attached.
///
/// Header names and values come from application strings; anything that is
/// not header-safe is skipped with a warning rather than failing the
/// connect.
fn client_request(url: &str, headers: &ConnectHeaders) -> Result<Request, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                request.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Skipping non-header-safe connection header"),
        }
    }

    Ok(request)
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        headers: ConnectHeaders,
    ) -> Result<(Arc<dyn TransportSession>, EventReceiver), TransportError> {
        let request = client_request(&self.url, &headers)?;
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(url = %self.url, "Websocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_io(
            stream,
            self.url.clone(),
            headers,
            self.reconnect_delay,
            cmd_rx,
            event_tx,
        ));

        Ok((Arc::new(WsSession { cmd_tx }), event_rx))
    }
}

/// Io task: pump the live socket, reconnect on drops, exit on close.
async fn run_io(
    mut stream: WsStream,
    url: String,
    headers: ConnectHeaders,
    reconnect_delay: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<IoCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        match pump(&mut stream, &mut cmd_rx, &event_tx).await {
            PumpExit::Closed => break,
            PumpExit::Dropped => {
                if event_tx.send(TransportEvent::Disconnected).is_err() {
                    break;
                }
                match reconnect(&url, &headers, reconnect_delay, &mut cmd_rx).await {
                    Some(fresh) => {
                        stream = fresh;
                        if event_tx.send(TransportEvent::Reconnected).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    debug!(url = %url, "Websocket io task stopped");
}

/// Retry the handshake on a fixed delay until it succeeds or the session
/// is closed. Connection headers are the ones captured at connect time.
async fn reconnect(
    url: &str,
    headers: &ConnectHeaders,
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<IoCommand>,
) -> Option<WsStream> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let request = match client_request(url, headers) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "Reconnect request build failed");
                        continue;
                    }
                };
                match connect_async(request).await {
                    Ok((stream, _)) => {
                        info!(url = %url, "Websocket reconnected");
                        return Some(stream);
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Reconnect attempt failed, retrying");
                    }
                }
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(IoCommand::Frame(_)) => {
                    // callers queue at the manager level while disconnected
                    warn!("Dropping outbound frame issued during reconnect");
                }
                Some(IoCommand::Close) | None => return None,
            },
        }
    }
}

async fn pump(
    stream: &mut WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<IoCommand>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> PumpExit {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(IoCommand::Frame(frame)) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = stream.send(Message::Text(text)).await {
                        warn!(error = %e, "Websocket send failed");
                        return PumpExit::Dropped;
                    }
                }
                Some(IoCommand::Close) | None => {
                    let _ = stream.close(None).await;
                    return PumpExit::Closed;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(ServerFrame::Message { topic, body }) => {
                        if event_tx.send(TransportEvent::Message { topic, body }).is_err() {
                            return PumpExit::Closed;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Unrecognized frame from backend");
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    info!("Backend closed connection");
                    return PumpExit::Dropped;
                }
                Some(Ok(_)) => {
                    // binary, ping and pong frames; tungstenite answers pings itself
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Websocket error");
                    return PumpExit::Dropped;
                }
                None => return PumpExit::Dropped,
            },
        }
    }
}

/// Handle to a live websocket session; hands frames to the io task.
struct WsSession {
    cmd_tx: mpsc::UnboundedSender<IoCommand>,
}

#[async_trait]
impl TransportSession for WsSession {
    async fn publish(
        &self,
        destination: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<(), TransportError> {
        self.cmd_tx
            .send(IoCommand::Frame(ClientFrame::Send {
                destination: destination.to_string(),
                headers,
                body,
            }))
            .map_err(|_| TransportError::Closed)
    }

    async fn subscribe(&self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId::new();
        self.cmd_tx
            .send(IoCommand::Frame(ClientFrame::Subscribe {
                id: id.as_str().to_string(),
                topic: topic.to_string(),
            }))
            .map_err(|_| TransportError::Closed)?;
        Ok(id)
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.cmd_tx
            .send(IoCommand::Frame(ClientFrame::Unsubscribe {
                id: id.as_str().to_string(),
            }))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        let _ = self.cmd_tx.send(IoCommand::Close);
    }
}
