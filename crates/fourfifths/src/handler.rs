//! Per-connection handler: registration, event routing and delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbound channel under the connection's player id
//!   2. Loop: decode inbound frames → registry, drain outbound events → socket
//!   3. On exit, disconnect the player from every room it joined

use std::sync::Arc;

use fourfifths_protocol::{ClientEvent, Codec, PlayerId, ServerEvent};
use fourfifths_transport::{Connection, TransportError, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::FourfifthsError;

/// Drop guard that disconnects a player when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct ConnectionGuard<C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        let player_id = self.player_id.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.rooms.lock().await.disconnect(&player_id);
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), FourfifthsError> {
    let player_id = PlayerId::from(conn.id());
    tracing::info!(%player_id, "player connected");

    let (tx, mut outbound) = mpsc::unbounded_channel();
    state.rooms.lock().await.connect(player_id.clone(), tx);
    let _guard = ConnectionGuard {
        player_id: player_id.clone(),
        state: Arc::clone(&state),
    };

    loop {
        tokio::select! {
            frame = next_frame(&conn, &state) => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%player_id, "connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        break;
                    }
                };
                handle_frame(&state, &player_id, &data).await;
            }
            Some(event) = outbound.recv() => {
                send_event(&conn, &state.codec, &event).await?;
            }
        }
    }

    // _guard drops here → disconnect fires.
    Ok(())
}

/// Receives the next frame, giving up after the idle timeout if one is set.
async fn next_frame<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<Option<Vec<u8>>, TransportError> {
    match state.idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionClosed(format!(
                "idle for {}s",
                limit.as_secs_f64()
            ))),
        },
        None => conn.recv().await,
    }
}

/// Decodes one inbound frame and applies it to the registry.
///
/// Undecodable frames and rejected events are logged and dropped; the
/// connection stays open.
async fn handle_frame<C: Codec>(state: &ServerState<C>, player_id: &PlayerId, data: &[u8]) {
    let event: ClientEvent = match state.codec.decode(data) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(%player_id, error = %e, "ignoring undecodable frame");
            return;
        }
    };
    let room_id = event.room_id().clone();

    // The lock covers the whole event so its broadcasts stay in order.
    let result = state.rooms.lock().await.handle_event(player_id, event);
    if let Err(e) = result {
        tracing::debug!(%player_id, %room_id, error = %e, "event rejected");
    }
}

async fn send_event(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    event: &ServerEvent,
) -> Result<(), FourfifthsError> {
    let bytes = codec.encode(event)?;
    conn.send(&bytes).await?;
    tracing::trace!(event = event.name(), "event sent");
    Ok(())
}
