//! Integration tests: real WebSocket viewers against a running hub.

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use rot_core::store::{FileStore, load_map};
use rot_server::{hub, server};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(store: FileStore) -> SocketAddr {
    let (hub, _actor) = hub::spawn(store, "currentSettings");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, hub));
    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _response) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(ws: &mut WsStream, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn viewer_receives_snapshot_on_connect() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start(FileStore::new(dir.path())).await;

    let mut viewer = connect(addr).await;
    let first = next_event(&mut viewer).await;
    assert_eq!(first["event"], json!("currentMapData"));
    assert_eq!(first["data"]["map"], json!("White.png"));
}

#[tokio::test]
async fn mutation_fans_out_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let addr = start(store.clone()).await;

    let mut gm = connect(addr).await;
    let mut player = connect(addr).await;
    next_event(&mut gm).await;
    next_event(&mut player).await;

    send(
        &mut gm,
        json!({ "event": "addBlocker", "data": { "x": 10, "y": 10, "width": 4, "height": -6 } }),
    )
    .await;

    for viewer in [&mut gm, &mut player] {
        let update = next_event(viewer).await;
        assert_eq!(update["event"], json!("currentMapData"));
        let blocker = &update["data"]["blockers"][0];
        assert_eq!((&blocker["y"], &blocker["height"]), (&json!(4.0), &json!(6.0)));
    }

    let saved = load_map(&store, "currentSettings").unwrap();
    assert_eq!(saved.map.blockers.len(), 1);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start(FileStore::new(dir.path())).await;

    let mut viewer = connect(addr).await;
    next_event(&mut viewer).await;

    viewer.send(Message::text("not json")).await.unwrap();
    send(&mut viewer, json!({ "event": "createToken", "data": { "x": 1 } })).await;
    send(&mut viewer, json!({ "event": "invertBlockers" })).await;

    // Only the valid request produces a frame.
    let update = next_event(&mut viewer).await;
    assert_eq!(update["data"]["antiBlockerOn"], json!(true));
    assert_eq!(update["data"]["tokens"], json!([]));
}

#[tokio::test]
async fn pings_reach_other_viewers() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start(FileStore::new(dir.path())).await;

    let mut sender = connect(addr).await;
    let mut watcher = connect(addr).await;
    next_event(&mut sender).await;
    next_event(&mut watcher).await;

    send(
        &mut sender,
        json!({ "event": "requestPing", "data": { "pingX": 64, "pingY": 128 } }),
    )
    .await;
    let ping = next_event(&mut watcher).await;
    assert_eq!(ping["event"], json!("pingAt"));
    assert_eq!(ping["data"]["pingX"], json!(64.0));
    assert_eq!(ping["data"]["ttlMs"], json!(5000));
}
