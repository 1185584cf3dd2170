//! `FourfifthsServer` builder and server loop.
//!
//! This is the entry point for running a fourfifths game server. It ties
//! together all the layers: transport → protocol → rooms, plus the task
//! that feeds room timers back into the registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fourfifths_protocol::{Codec, JsonCodec, RoomId};
use fourfifths_room::{RoomConfig, RoomRegistry};
use fourfifths_timer::TimerReceiver;
use fourfifths_transport::{
    Transport, TransportError, WebSocketTransport, DEFAULT_HANDSHAKE_TIMEOUT,
};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::FourfifthsError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Every room
/// operation takes the registry lock, so room state only ever changes one
/// event at a time.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) codec: C,
    /// Connections with no traffic in either direction for this long are
    /// dropped. `None` waits forever.
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a fourfifths server.
///
/// # Example
///
/// ```rust,ignore
/// let server = FourfifthsServer::builder()
///     .bind("0.0.0.0:5000")
///     .allowed_origins(["http://localhost:3000"])
///     .room_config(RoomConfig::default())
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct FourfifthsServerBuilder {
    bind_addr: String,
    allowed_origins: Vec<String>,
    room_config: RoomConfig,
    idle_timeout: Option<Duration>,
    handshake_timeout: Duration,
    seed: Option<u64>,
}

impl FourfifthsServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            allowed_origins: Vec::new(),
            room_config: RoomConfig::default(),
            idle_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            seed: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Browser origins allowed to open a socket. Empty (the default)
    /// allows any origin.
    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the rules every room is created with.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Drops connections that see no traffic for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Drops clients that connect but don't finish the WebSocket upgrade
    /// within `timeout`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Seeds the bots' guesses, for reproducible games.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<FourfifthsServer<JsonCodec>, FourfifthsError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_allowed_origins(self.allowed_origins)
            .with_handshake_timeout(self.handshake_timeout);

        let (registry, timers) = match self.seed {
            Some(seed) => RoomRegistry::with_seed(self.room_config, seed),
            None => RoomRegistry::new(self.room_config),
        };

        let state = Arc::new(ServerState {
            rooms: Mutex::new(registry),
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(FourfifthsServer {
            transport,
            state,
            timers,
        })
    }
}

impl Default for FourfifthsServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fourfifths game server, bound and ready.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct FourfifthsServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
    timers: TimerReceiver<RoomId>,
}

impl FourfifthsServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> FourfifthsServerBuilder {
        FourfifthsServerBuilder::new()
    }
}

impl<C: Codec> FourfifthsServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), FourfifthsError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Room timers are delivered to the registry by a separate task for
    /// as long as the server runs.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), FourfifthsError> {
        tracing::info!(addr = ?self.local_addr().ok(), "fourfifths server running");

        let timer_task = tokio::spawn(dispatch_timers(Arc::clone(&self.state), self.timers));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::OriginRejected(origin)) => {
                        tracing::warn!(%origin, "refused connection from foreign origin");
                    }
                    Err(TransportError::HandshakeTimeout(addr)) => {
                        tracing::debug!(%addr, "client never finished the upgrade");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => {
                    tracing::info!("shutting down");
                    break;
                }
            }
        }

        timer_task.abort();
        self.transport.shutdown().await?;
        Ok(())
    }
}

/// Feeds timer firings into the registry, one at a time under the lock.
async fn dispatch_timers<C: Codec>(state: Arc<ServerState<C>>, mut timers: TimerReceiver<RoomId>) {
    while let Some(fired) = timers.recv().await {
        state.rooms.lock().await.handle_timer(fired);
    }
}
