//! Minimal in-process Socket.IO server for exercising the connection
//! manager against real sockets.
//!
//! WebSocket sessions are always served. Long-polling sessions, and their
//! upgrade to a WebSocket, are opt-in through [`ServerBehavior`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequestParts, Query, Request, State, WebSocketUpgrade};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::options::TransportKind;
use crate::protocol::{EnginePacket, Handshake, SocketPacket, decode_payload, encode_payload};

pub(crate) const NAMESPACE: &str = "/ws";

#[derive(Debug, Clone)]
pub(crate) struct ServerBehavior {
    pub reject_token: Option<String>,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    /// Serve `transport=polling` requests; otherwise they get a 400.
    pub polling: bool,
    /// Advertise `websocket` in the polling handshake.
    pub offer_upgrade: bool,
    /// Answer the upgrade ping on a joining WebSocket.
    pub accept_upgrade: bool,
    /// Extra packets appended to the polling handshake response.
    pub open_extras: Vec<EnginePacket>,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            reject_token: None,
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            polling: false,
            offer_upgrade: false,
            accept_upgrade: true,
            open_extras: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServerEvent {
    Opened { transport: TransportKind },
    Upgraded,
    UpgradeRefused,
    Joined { token: String },
    Received(SocketPacket),
    Pong,
    ClientLeft,
    Closed,
}

#[derive(Debug, Clone)]
pub(crate) enum Control {
    Emit(SocketPacket),
    Ping,
    /// Namespace disconnect, then close.
    Kick,
    /// Close the session without any Socket.IO goodbye.
    Drop,
}

pub(crate) struct TestServer {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    control: broadcast::Sender<Control>,
    joins: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_behavior(ServerBehavior::default()).await
    }

    pub async fn with_behavior(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (control, _) = broadcast::channel(16);
        let joins = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));

        let shared = Arc::new(Shared {
            behavior,
            events: event_tx,
            control: control.clone(),
            joins: Arc::clone(&joins),
            live: Arc::clone(&live),
            next_sid: AtomicUsize::new(0),
            sessions: Mutex::new(HashMap::new()),
        });
        let app = Router::new().fallback(engine_request).with_state(shared);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            events,
            control,
            joins,
            live,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    /// Successful namespace joins so far.
    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    /// Namespace sessions currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn send(&self, control: Control) {
        let _ = self.control.send(control);
    }

    pub fn emit(&self, name: &str, args: Vec<Value>) {
        self.send(Control::Emit(SocketPacket::event(NAMESPACE, name, args)));
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server stopped")
    }

    /// Skip events until one matches.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&ServerEvent) -> bool) -> ServerEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    /// Events that arrive within `window`.
    pub async fn drain(&mut self, window: Duration) -> Vec<ServerEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }
}

struct Shared {
    behavior: ServerBehavior,
    events: mpsc::UnboundedSender<ServerEvent>,
    control: broadcast::Sender<Control>,
    joins: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    next_sid: AtomicUsize,
    sessions: Mutex<HashMap<String, Arc<EngineSession>>>,
}

/// Transport-independent half of one Engine.IO session.
///
/// Whichever transport is active drains `outbound`; a WebSocket that
/// completes the upgrade cancels `upgraded` so a parked poll lets go.
struct EngineSession {
    inbound: mpsc::UnboundedSender<EnginePacket>,
    outbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<EnginePacket>>,
    upgraded: CancellationToken,
}

impl Shared {
    fn handshake(&self, sid: &str) -> Handshake {
        let upgrades = if self.behavior.offer_upgrade {
            vec![TransportKind::WebSocket.as_str().to_string()]
        } else {
            Vec::new()
        };
        Handshake {
            sid: sid.to_string(),
            upgrades,
            ping_interval: self.behavior.ping_interval_ms,
            ping_timeout: self.behavior.ping_timeout_ms,
            max_payload: Some(1_000_000),
        }
    }

    fn session(&self, sid: &str) -> Option<Arc<EngineSession>> {
        self.sessions.lock().unwrap().get(sid).cloned()
    }

    fn open_session(self: &Arc<Self>, token: String, transport: TransportKind) -> (String, Arc<EngineSession>) {
        let sid = format!("engine-{}", self.next_sid.fetch_add(1, Ordering::SeqCst) + 1);
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let session = Arc::new(EngineSession {
            inbound,
            outbound: tokio::sync::Mutex::new(outbound),
            upgraded: CancellationToken::new(),
        });
        self.sessions.lock().unwrap().insert(sid.clone(), Arc::clone(&session));
        let _ = self.events.send(ServerEvent::Opened { transport });

        tokio::spawn(run_engine(
            Arc::clone(self),
            sid.clone(),
            token,
            inbound_rx,
            outbound_tx,
            self.control.subscribe(),
        ));
        (sid, session)
    }
}

async fn engine_request(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let transport = query.get("transport").cloned().unwrap_or_default();
    let method = request.method().clone();
    match (method, transport.as_str()) {
        (Method::GET, "websocket") => upgrade(shared, query, request).await,
        (_, "polling") if !shared.behavior.polling => {
            (StatusCode::BAD_REQUEST, "polling disabled").into_response()
        }
        (Method::GET, "polling") => poll(shared, query).await,
        (Method::POST, "polling") => {
            let body = match axum::body::to_bytes(request.into_body(), 1 << 20).await {
                Ok(body) => String::from_utf8_lossy(&body).into_owned(),
                Err(_) => return StatusCode::BAD_REQUEST.into_response(),
            };
            deliver(shared, query, &body)
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn upgrade(shared: Arc<Shared>, query: HashMap<String, String>, request: Request) -> Response {
    let (mut parts, _) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let token = query.get("token").cloned().unwrap_or_default();
    let sid = query.get("sid").cloned();
    ws.on_upgrade(move |socket| serve_websocket(socket, shared, token, sid))
}

/// Long-poll GET: the handshake without a sid, queued packets with one.
async fn poll(shared: Arc<Shared>, query: HashMap<String, String>) -> Response {
    let Some(sid) = query.get("sid") else {
        let token = query.get("token").cloned().unwrap_or_default();
        let (sid, _) = shared.open_session(token, TransportKind::Polling);
        let mut batch = vec![EnginePacket::Open(shared.handshake(&sid))];
        batch.extend(shared.behavior.open_extras.iter().cloned());
        return encode_payload(&batch).into_response();
    };
    let Some(session) = shared.session(sid) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let noop = || EnginePacket::Noop.encode().into_response();

    let mut outbound = tokio::select! {
        biased;
        _ = session.upgraded.cancelled() => return noop(),
        guard = session.outbound.lock() => guard,
    };
    let first = tokio::select! {
        biased;
        _ = session.upgraded.cancelled() => return noop(),
        packet = outbound.recv() => packet,
    };
    let Some(first) = first else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let mut batch = vec![first];
    while let Ok(packet) = outbound.try_recv() {
        batch.push(packet);
    }
    encode_payload(&batch).into_response()
}

/// Polling POST: feed each packet of the payload to the session.
fn deliver(shared: Arc<Shared>, query: HashMap<String, String>, body: &str) -> Response {
    let Some(session) = query.get("sid").and_then(|sid| shared.session(sid)) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match decode_payload(body) {
        Ok(packets) => {
            for packet in packets {
                let _ = session.inbound.send(packet);
            }
            "ok".into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn frame(packet: EnginePacket) -> Message {
    Message::Text(packet.encode().into())
}

async fn next_packet(stream: &mut SplitStream<WebSocket>) -> Option<EnginePacket> {
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => return EnginePacket::decode(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Ping/pong on the joining socket, then wait for the switch packet.
async fn join_existing(
    shared: &Shared,
    session: &EngineSession,
    sink: &mut SplitSink<WebSocket, Message>,
    stream: &mut SplitStream<WebSocket>,
) -> bool {
    let Some(EnginePacket::Ping(data)) = next_packet(stream).await else {
        return false;
    };
    if !shared.behavior.accept_upgrade {
        let _ = shared.events.send(ServerEvent::UpgradeRefused);
        let _ = sink.close().await;
        return false;
    }
    if sink.send(frame(EnginePacket::Pong(data))).await.is_err() {
        return false;
    }
    if next_packet(stream).await != Some(EnginePacket::Upgrade) {
        return false;
    }
    session.upgraded.cancel();
    let _ = shared.events.send(ServerEvent::Upgraded);
    true
}

async fn serve_websocket(socket: WebSocket, shared: Arc<Shared>, token: String, sid: Option<String>) {
    let (mut sink, mut stream) = socket.split();
    let session = match sid {
        None => {
            let (sid, session) = shared.open_session(token, TransportKind::WebSocket);
            if sink.send(frame(EnginePacket::Open(shared.handshake(&sid)))).await.is_err() {
                let _ = session.inbound.send(EnginePacket::Close);
                return;
            }
            session
        }
        Some(sid) => {
            let Some(session) = shared.session(&sid) else {
                return;
            };
            if !join_existing(&shared, &session, &mut sink, &mut stream).await {
                return;
            }
            session
        }
    };

    let writer_session = Arc::clone(&session);
    let writer = tokio::spawn(async move {
        let mut outbound = writer_session.outbound.lock().await;
        while let Some(packet) = outbound.recv().await {
            if sink.send(frame(packet)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Ok(packet) = EnginePacket::decode(text.as_str()) {
                    let _ = session.inbound.send(packet);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    let _ = session.inbound.send(EnginePacket::Close);
    let _ = writer.await;
}

/// Socket.IO side of a session; ends on engine close or a control command.
async fn run_engine(
    shared: Arc<Shared>,
    sid: String,
    token: String,
    mut inbound: mpsc::UnboundedReceiver<EnginePacket>,
    outbound: mpsc::UnboundedSender<EnginePacket>,
    mut control: broadcast::Receiver<Control>,
) {
    let mut joined = false;
    loop {
        tokio::select! {
            packet = inbound.recv() => match packet {
                Some(EnginePacket::Pong(_)) => {
                    let _ = shared.events.send(ServerEvent::Pong);
                }
                Some(EnginePacket::Message(body)) => match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Connect { namespace, .. }) => {
                        if shared.behavior.reject_token.as_deref() == Some(token.as_str()) {
                            let reply = SocketPacket::ConnectError {
                                namespace,
                                data: Some(json!({ "message": "unauthorized" })),
                            };
                            let _ = outbound.send(EnginePacket::Message(reply.encode()));
                        } else {
                            joined = true;
                            shared.joins.fetch_add(1, Ordering::SeqCst);
                            shared.live.fetch_add(1, Ordering::SeqCst);
                            let reply = SocketPacket::Connect {
                                namespace,
                                data: Some(json!({ "sid": format!("{sid}-ns") })),
                            };
                            let _ = outbound.send(EnginePacket::Message(reply.encode()));
                            let _ = shared.events.send(ServerEvent::Joined { token: token.clone() });
                        }
                    }
                    Ok(SocketPacket::Disconnect { .. }) => {
                        let _ = shared.events.send(ServerEvent::ClientLeft);
                    }
                    Ok(packet) => {
                        let _ = shared.events.send(ServerEvent::Received(packet));
                    }
                    Err(_) => {}
                },
                Some(EnginePacket::Close) | None => break,
                Some(_) => {}
            },
            command = control.recv() => match command {
                Ok(Control::Emit(packet)) => {
                    if joined {
                        let _ = outbound.send(EnginePacket::Message(packet.encode()));
                    }
                }
                Ok(Control::Ping) => {
                    let _ = outbound.send(EnginePacket::Ping(String::new()));
                }
                Ok(Control::Kick) => {
                    let goodbye = SocketPacket::Disconnect { namespace: NAMESPACE.into() };
                    let _ = outbound.send(EnginePacket::Message(goodbye.encode()));
                    break;
                }
                Ok(Control::Drop) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            }
        }
    }

    if joined {
        shared.live.fetch_sub(1, Ordering::SeqCst);
    }
    shared.sessions.lock().unwrap().remove(&sid);
    // Dropping the sender ends the active transport once it has flushed.
    drop(outbound);
    let _ = shared.events.send(ServerEvent::Closed);
}
