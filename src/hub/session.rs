//! WebSocket session with the hub.

use super::{auth, HUB_PORT};
use crate::error::AppError;
use crate::protocol::{DecodeError, HubCommand, HubMessage};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Inbound = Result<HubMessage, AppError>;

/// What a command handler needs from the hub.
///
/// There are no request IDs: handlers send a command and then recognize
/// its effect among the messages that follow.
#[async_trait]
pub trait HubSession: Send {
    /// Send a command without waiting for any answer.
    async fn send(&mut self, command: &HubCommand) -> Result<(), AppError>;

    /// Next inbound message, in arrival order.
    ///
    /// Fails with [`AppError::ConnectionLost`] once the connection is gone.
    async fn recv(&mut self) -> Result<HubMessage, AppError>;

    /// Whether the connection is still open.
    fn is_connected(&self) -> bool;
}

/// The one live connection to the hub.
pub struct DeviceSession {
    sink: SplitSink<WsStream, Message>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl DeviceSession {
    /// Authenticate, open the WebSocket and request the full state.
    pub async fn connect(
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let token = auth::request_access_token(host, username, password, timeout).await?;

        let mut url = Url::parse(&format!("ws://{}:{}/connection", host, HUB_PORT))
            .map_err(|e| AppError::Connection(format!("Invalid hub host {host:?}: {e}")))?;
        url.query_pairs_mut().append_pair("access_token", &token);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::Connection(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("v2"));

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        info!("WebSocket connected to {}:{}", host, HUB_PORT);

        let (sink, stream) = stream.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (tx, inbound) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(stream, tx, Arc::clone(&connected)));

        let mut session = Self {
            sink,
            inbound,
            connected,
            reader,
        };
        session.send(&HubCommand::GetAll).await?;
        Ok(session)
    }

    /// Say goodbye to the hub. Errors are irrelevant at this point.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("Closing WebSocket failed: {}", e);
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl HubSession for DeviceSession {
    async fn send(&mut self, command: &HubCommand) -> Result<(), AppError> {
        let frame = command.to_wire();
        debug!("Sending {}", frame);
        self.sink.send(Message::Text(frame)).await.map_err(|e| {
            warn!("Send failed: {}", e);
            AppError::ConnectionLost
        })
    }

    async fn recv(&mut self) -> Result<HubMessage, AppError> {
        self.inbound.recv().await.unwrap_or(Err(AppError::ConnectionLost))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Decode frames until the connection ends, then mark the session closed.
async fn read_frames(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<Inbound>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(close)) => {
                info!("Homee closed the connection: {:?}", close);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        debug!(len = text.len(), "Received frame");
        let inbound = match HubMessage::decode(&text) {
            Ok(message) => Ok(message),
            Err(e @ DecodeError::NotAnObject(_)) => {
                debug!("Skipping frame: {}", e);
                continue;
            }
            Err(e) => Err(AppError::Protocol(e.to_string())),
        };

        if tx.send(inbound).is_err() {
            break;
        }
    }

    connected.store(false, Ordering::SeqCst);
}
