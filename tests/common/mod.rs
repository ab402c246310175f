//! Mock speaker pair for driving a full session in tests.
//!
//! - `MockDevice` answers the bootstrap reads over WebSocket and records every
//!   frame it receives
//! - `probe_server` serves the HTTP liveness probe via wiremock

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dutchdutch_8c::{Session, SessionConfig};

pub const SERIAL: &str = "8c-0042";
pub const VERSION: &str = "2.4.1";
pub const ROOM: &str = "room-1";
pub const MASTER: &str = "dev-master";
pub const SLAVE: &str = "dev-slave";

/// Room payload as the speakers report it
pub fn room() -> Value {
    json!({
        "type": "room",
        "streaming": true,
        "inputModes": ["analogHighGain", "analogLowGain", "aes", "Spotify Connect", "Roon Ready", "AES Streamer"],
        "selectedInput": "Roon Ready",
        "selectedXLR": "aes",
        "preferences": { "gain": {
            "aes": { "external": false },
            "analogLowGain": { "external": false },
            "analogHighGain": { "external": true }
        }},
        "gain": { "global": -40.0 },
        "mute": { "global": false },
        "sleep": false,
        "presets": { "p1": { "name": "A" }, "p2": { "name": "B" } },
        "lastSelectedPreset": "p1",
        "streamingInfo": {
            "is_playing": true,
            "display": ["", "", "", "Song\nBand\nRecord"],
            "albumArt": { "url": "http://art/cover.jpg" }
        }
    })
}

struct DeviceSetup {
    port: u16,
    addresses: Vec<String>,
    room: Mutex<Value>,
    network_delay: Mutex<Duration>,
}

/// WebSocket side of a speaker pair; both units answer on the same port
pub struct MockDevice {
    pub port: u16,
    setup: Arc<DeviceSetup>,
    frames: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
    push_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
    freeze_tx: broadcast::Sender<()>,
}

impl MockDevice {
    /// Device reporting the loopback address for the master
    pub async fn start() -> Self {
        Self::with_addresses(&["127.0.0.1"]).await
    }

    pub async fn with_addresses(addresses: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let setup = Arc::new(DeviceSetup {
            port,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            room: Mutex::new(room()),
            network_delay: Mutex::new(Duration::ZERO),
        });
        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (push_tx, _) = broadcast::channel(16);
        let (kick_tx, _) = broadcast::channel(1);
        let (freeze_tx, _) = broadcast::channel(1);

        let device = Self {
            port,
            setup: setup.clone(),
            frames: frames.clone(),
            connections: connections.clone(),
            push_tx: push_tx.clone(),
            kick_tx: kick_tx.clone(),
            freeze_tx: freeze_tx.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    setup.clone(),
                    frames.clone(),
                    push_tx.subscribe(),
                    kick_tx.subscribe(),
                    freeze_tx.subscribe(),
                ));
            }
        });

        device
    }

    /// Replace the room reported by later reads
    pub fn set_room(&self, room: Value) {
        *self.setup.room.lock().unwrap() = room;
    }

    /// Push a network notification carrying `room` to every open connection
    pub fn notify(&self, room: Value) {
        let frame = json!({
            "meta": { "id": uuid::Uuid::new_v4().to_string(), "method": "notify", "type": "network" },
            "data": { "state": { ROOM: { "data": room } } }
        });
        self.push_raw(frame);
    }

    pub fn push_raw(&self, frame: Value) {
        let _ = self.push_tx.send(frame.to_string());
    }

    /// Hold back replies to network reads
    pub fn delay_network_reads(&self, delay: Duration) {
        *self.setup.network_delay.lock().unwrap() = delay;
    }

    /// Stop reading on every open connection, leaving pings unanswered
    pub fn freeze(&self) {
        let _ = self.freeze_tx.send(());
    }

    /// Drop every open connection without a closing handshake
    pub fn kick(&self) {
        let _ = self.kick_tx.send(());
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Frames received for an endpoint, in arrival order
    pub fn frames_for(&self, endpoint: &str) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|frame| frame["meta"]["endpoint"] == endpoint)
            .cloned()
            .collect()
    }
}

async fn serve(
    stream: TcpStream,
    setup: Arc<DeviceSetup>,
    frames: Arc<Mutex<Vec<Value>>>,
    mut push_rx: broadcast::Receiver<String>,
    mut kick_rx: broadcast::Receiver<()>,
    mut freeze_rx: broadcast::Receiver<()>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    loop {
        tokio::select! {
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let request: Value = serde_json::from_str(&text).unwrap();
                    frames.lock().unwrap().push(request.clone());
                    if request["meta"]["endpoint"] == "network" && request["meta"]["method"] == "read" {
                        let delay = *setup.network_delay.lock().unwrap();
                        tokio::time::sleep(delay).await;
                    }
                    for reply in respond(&request, &setup) {
                        if ws.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(_)) => {}
                _ => return,
            },
            Ok(text) = push_rx.recv() => {
                if ws.send(Message::Text(text)).await.is_err() {
                    return;
                }
            },
            Ok(()) = kick_rx.recv() => return,
            Ok(()) = freeze_rx.recv() => {
                // Keep the socket open but silent
                std::future::pending::<()>().await;
            },
        }
    }
}

fn respond(request: &Value, setup: &DeviceSetup) -> Vec<Value> {
    let meta = &request["meta"];
    let reply = |data: Value| {
        json!({
            "meta": {
                "id": meta["id"],
                "method": meta["method"],
                "endpoint": meta["endpoint"]
            },
            "data": data
        })
    };

    match (meta["endpoint"].as_str(), meta["method"].as_str()) {
        (Some("master"), Some("read")) => {
            // A stray reply for someone else arrives first
            let decoy = json!({
                "meta": { "id": uuid::Uuid::new_v4().to_string(), "method": "read", "endpoint": "master" },
                "data": { "name": "DECOY" }
            });
            let master = reply(json!({
                "name": SERIAL,
                "version": VERSION,
                "target": MASTER,
                "address": { "ipv4": setup.addresses, "port_ascend": setup.port }
            }));
            vec![decoy, master]
        }
        (Some("targets"), Some("read")) => vec![reply(json!([
            { "targetType": "device", "target": SLAVE },
            { "targetType": "room", "target": ROOM },
            { "targetType": "device", "target": MASTER }
        ]))],
        (Some("network"), Some("read")) => {
            let room = setup.room.lock().unwrap().clone();
            vec![reply(json!({ "state": { ROOM: { "data": room } } }))]
        }
        (Some("network"), Some("subscribe")) => vec![reply(json!({}))],
        _ => Vec::new(),
    }
}

/// HTTP server answering the liveness probe
pub async fn probe_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clerkip.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var clerkip = '127.0.0.1';"))
        .mount(&server)
        .await;
    server
}

pub fn config(http: &MockServer, device: &MockDevice) -> SessionConfig {
    SessionConfig::new("127.0.0.1")
        .with_http_port(http.address().port())
        .with_ws_port(device.port)
        .with_request_timeout(Duration::from_secs(5))
}

/// Session that has completed its first update against a fresh mock pair
pub async fn connected() -> (MockServer, MockDevice, Session) {
    let http = probe_server().await;
    let device = MockDevice::start().await;
    let session = Session::new(config(&http, &device)).unwrap();
    session.update().await;
    assert!(session.is_available(), "session did not bootstrap");
    (http, device, session)
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
