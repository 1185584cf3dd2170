//! Integration tests for the fourfifths server: real sockets, real timers.
//!
//! Room pacing is shortened through `RoomConfig` so whole games finish in
//! well under a second.

use std::time::Duration;

use fourfifths::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn fast_rules() -> RoomConfig {
    RoomConfig {
        countdown_tick: Duration::from_millis(20),
        round_pacing: Duration::from_millis(50),
        ..RoomConfig::default()
    }
}

fn humans_only(max_players: usize) -> RoomConfig {
    RoomConfig {
        max_players,
        bots_enabled: false,
        ..fast_rules()
    }
}

/// Starts a server on a random port and returns the address.
async fn start_server(builder: FourfifthsServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .seed(11)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, event: serde_json::Value) {
    ws.send(Message::text(event.to_string()))
        .await
        .expect("send should succeed");
}

async fn join(ws: &mut ClientWs, room: &str) {
    send(ws, json!({"event": "join_room", "data": room})).await;
}

async fn ready(ws: &mut ClientWs, room: &str) {
    send(ws, json!({"event": "player_ready", "data": {"roomId": room}})).await;
}

async fn submit(ws: &mut ClientWs, room: &str, number: i64) {
    send(
        ws,
        json!({"event": "submit_number", "data": {"roomId": room, "number": number}}),
    )
    .await;
}

/// Reads the next server event, skipping control frames.
async fn recv_event(ws: &mut ClientWs) -> ServerEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid server event");
        }
    }
}

/// Reads events until one named `name` arrives.
async fn recv_until(ws: &mut ClientWs, name: &str) -> ServerEvent {
    loop {
        let event = recv_event(ws).await;
        if event.name() == name {
            return event;
        }
    }
}

async fn roster(ws: &mut ClientWs) -> Vec<Player> {
    match recv_until(ws, "room_update").await {
        ServerEvent::RoomUpdate { players } => players,
        _ => unreachable!(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_solo_join_gets_bots() {
    let addr = start_server(FourfifthsServer::builder().room_config(fast_rules())).await;
    let mut ws = connect(&addr).await;

    join(&mut ws, "R1").await;
    let players = roster(&mut ws).await;

    assert_eq!(players.len(), 5);
    assert!(players[0].id.as_str().starts_with("conn-"));
    assert!(!players[0].is_bot);
    assert_eq!(players.iter().filter(|p| p.is_bot).count(), 4);
}

#[tokio::test]
async fn test_solo_game_runs_countdown_and_a_round() {
    let addr = start_server(FourfifthsServer::builder().room_config(fast_rules())).await;
    let mut ws = connect(&addr).await;
    join(&mut ws, "R1").await;
    let me = roster(&mut ws).await[0].id.clone();

    ready(&mut ws, "R1").await;
    let mut values = Vec::new();
    loop {
        match recv_event(&mut ws).await {
            ServerEvent::ReadyCountdown { value, stopped } => {
                assert_eq!(stopped, None);
                values.push(value);
            }
            ServerEvent::GameStart { current_round } => {
                assert_eq!(current_round, 1);
                break;
            }
            ServerEvent::RoomUpdate { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(values, vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(
        recv_event(&mut ws).await,
        ServerEvent::RoundStart { current_round: 1 }
    );

    submit(&mut ws, "R1", 42).await;
    let ServerEvent::RoundResults {
        submitted_numbers,
        current_round,
        winner_id,
        ..
    } = recv_until(&mut ws, "round_results").await
    else {
        unreachable!()
    };
    assert_eq!(current_round, 1);
    assert_eq!(submitted_numbers.len(), 5);
    assert_eq!(submitted_numbers[0].id, me);
    assert!(winner_id.is_some());

    assert_eq!(
        recv_until(&mut ws, "round_start").await,
        ServerEvent::RoundStart { current_round: 2 }
    );
}

#[tokio::test]
async fn test_two_humans_play_a_round() {
    let addr = start_server(FourfifthsServer::builder().room_config(humans_only(2))).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    join(&mut a, "duel").await;
    let a_id = roster(&mut a).await[0].id.clone();
    join(&mut b, "duel").await;
    let players = roster(&mut b).await;
    assert_eq!(players.len(), 2);
    let b_id = players[1].id.clone();

    ready(&mut a, "duel").await;
    ready(&mut b, "duel").await;
    recv_until(&mut a, "round_start").await;
    recv_until(&mut b, "round_start").await;

    // Average 20, target 16: 10 beats 30 whichever arrives first.
    submit(&mut a, "duel", 10).await;
    submit(&mut b, "duel", 30).await;

    let ServerEvent::RoundResults {
        winner_id,
        average,
        winning_number,
        updated_players,
        ..
    } = recv_until(&mut b, "round_results").await
    else {
        unreachable!()
    };
    assert_eq!(winner_id, Some(a_id.clone()));
    assert_eq!(average, Some(20.0));
    assert_eq!(winning_number, Some(10));
    let b_after = updated_players.iter().find(|p| p.id == b_id).unwrap();
    assert_eq!(b_after.score, -1);
    let a_after = updated_players.iter().find(|p| p.id == a_id).unwrap();
    assert_eq!(a_after.score, 0);
}

#[tokio::test]
async fn test_leaving_player_disappears_from_roster() {
    let addr = start_server(FourfifthsServer::builder().room_config(humans_only(5))).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    join(&mut a, "R1").await;
    roster(&mut a).await;
    join(&mut b, "R1").await;
    assert_eq!(roster(&mut a).await.len(), 2);

    b.close(None).await.unwrap();
    let players = roster(&mut a).await;
    assert_eq!(players.len(), 1);
}

#[tokio::test]
async fn test_join_into_full_room_gets_room_full() {
    let addr = start_server(FourfifthsServer::builder().room_config(fast_rules())).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    join(&mut a, "R1").await;
    roster(&mut a).await;
    join(&mut b, "R1").await;

    assert_eq!(
        recv_event(&mut b).await,
        ServerEvent::RoomFull("This room is full. Please try another room.".into())
    );
}

#[tokio::test]
async fn test_garbage_frames_are_ignored() {
    let addr = start_server(FourfifthsServer::builder().room_config(fast_rules())).await;
    let mut ws = connect(&addr).await;

    ws.send(Message::text("not json at all".to_string())).await.unwrap();
    send(&mut ws, json!({"event": "dance", "data": {}})).await;
    submit(&mut ws, "nowhere", 5).await;

    join(&mut ws, "R1").await;
    assert_eq!(roster(&mut ws).await.len(), 5);
}

#[tokio::test]
async fn test_foreign_origin_is_refused() {
    let addr = start_server(
        FourfifthsServer::builder()
            .room_config(fast_rules())
            .allowed_origins(["http://localhost:3000"]),
    )
    .await;

    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://evil.example"));
    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    let mut request = format!("ws://{addr}").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static("http://localhost:3000"));
    let (mut ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("allowed origin should connect");
    join(&mut ws, "R1").await;
    assert_eq!(roster(&mut ws).await.len(), 5);
}

#[tokio::test]
async fn test_silent_tcp_client_does_not_block_joins() {
    let addr = start_server(FourfifthsServer::builder().room_config(fast_rules())).await;

    let _silent = tokio::net::TcpStream::connect(&addr)
        .await
        .expect("tcp connect");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = timeout(Duration::from_secs(3), connect(&addr))
        .await
        .expect("a silent peer should not stall the accept loop");
    join(&mut ws, "R1").await;
    assert_eq!(roster(&mut ws).await.len(), 5);
}

#[tokio::test]
async fn test_idle_connection_is_dropped() {
    let addr = start_server(
        FourfifthsServer::builder()
            .room_config(fast_rules())
            .idle_timeout(Duration::from_millis(100)),
    )
    .await;
    let mut ws = connect(&addr).await;

    let next = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server should drop the idle connection");
    assert!(
        matches!(next, None | Some(Err(_)) | Some(Ok(Message::Close(_)))),
        "expected the stream to end, got {next:?}"
    );
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let server = FourfifthsServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    tx.send(()).unwrap();
    let result = timeout(Duration::from_secs(5), task)
        .await
        .expect("server should stop")
        .expect("task should not panic");
    assert!(result.is_ok());
}
