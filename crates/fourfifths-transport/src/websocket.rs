//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Time a client gets to send its upgrade request after connecting.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// Browsers send an `Origin` header with the upgrade request. When the
/// allow-list is non-empty, upgrades from any other origin are refused with
/// `403 Forbidden`. Requests without an `Origin` header (native clients,
/// tests) are always accepted.
///
/// Every upgrade runs in its own task, bounded by the handshake timeout,
/// so a client that connects and then stays silent never holds up the
/// clients behind it.
pub struct WebSocketTransport {
    listener: TcpListener,
    allowed_origins: Arc<[String]>,
    handshake_timeout: Duration,
    /// Upgrades in flight. Dropping the transport aborts them.
    handshakes: JoinSet<Result<WebSocketConnection, TransportError>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            allowed_origins: Arc::from(Vec::new()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handshakes: JoinSet::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Restricts upgrades to the given origins. An empty list allows all.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins
            .into_iter()
            .map(|o| o.trim_end_matches('/').to_string())
            .collect();
        self
    }

    /// Sets how long a client may take to complete the upgrade.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    /// Returns the next connection whose upgrade has completed.
    ///
    /// Cancel safe: handshakes already started keep running and are
    /// returned by a later call.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Shutdown);
            }
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.map_err(TransportError::AcceptFailed)?;
                    self.handshakes.spawn(handshake(
                        stream,
                        addr,
                        Arc::clone(&self.allowed_origins),
                        self.handshake_timeout,
                    ));
                }
                Some(joined) = self.handshakes.join_next() => match joined {
                    Ok(result) => return result,
                    Err(e) => tracing::warn!(error = %e, "handshake task failed"),
                },
            }
        }
    }

    /// Stops accepting. Later calls to `accept` return
    /// [`TransportError::Shutdown`].
    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        tracing::debug!("WebSocket transport shut down");
        Ok(())
    }
}

fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(_) if allowed.is_empty() => true,
        Some(origin) => {
            let origin = origin.trim_end_matches('/');
            allowed.iter().any(|a| a == origin)
        }
    }
}

/// Upgrades one TCP stream, checking its `Origin` on the way.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    allowed_origins: Arc<[String]>,
    limit: Duration,
) -> Result<WebSocketConnection, TransportError> {
    let mut rejected: Option<String> = None;
    let check_origin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get("origin")
            .and_then(|value| value.to_str().ok());
        if origin_allowed(&allowed_origins, origin) {
            return Ok(resp);
        }
        rejected = origin.map(str::to_string);
        let mut refusal = ErrorResponse::new(Some("origin not allowed".to_string()));
        *refusal.status_mut() = StatusCode::FORBIDDEN;
        Err(refusal)
    };

    let upgrade =
        tokio::time::timeout(limit, tokio_tungstenite::accept_hdr_async(stream, check_origin))
            .await;
    let Ok(result) = upgrade else {
        tracing::debug!(%addr, "WebSocket upgrade timed out");
        return Err(TransportError::HandshakeTimeout(addr));
    };
    if let Some(origin) = rejected {
        tracing::debug!(%addr, %origin, "rejected WebSocket upgrade");
        return Err(TransportError::OriginRejected(origin));
    }
    let ws = result.map_err(|e| {
        TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;

    let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%id, %addr, "accepted WebSocket connection");

    let (sink, stream) = ws.split();
    Ok(WebSocketConnection {
        id,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
    })
}

/// A single WebSocket connection.
///
/// The socket is split so one task can wait in `recv` while another sends.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads (every JSON frame) go out as text frames so browser
    /// clients receive strings; anything else is sent as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            let msg = stream.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
