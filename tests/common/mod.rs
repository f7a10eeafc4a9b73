//! Shared harness: a scripted JSON-RPC client speaking NDJSON to a session,
//! either over an in-memory duplex pipe or a real TCP socket.
#![allow(dead_code)]

use async_trait::async_trait;
use mcp_session::network_adapter::{Listener, NdjsonAdapter, NetworkAdapter};
use mcp_session::server::{Registry, ServerOptions, Session};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

pub type PipeAdapter = NdjsonAdapter<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options suitable for tests: no keep-alive pings unless a test enables them.
pub fn quiet_options() -> ServerOptions {
    let mut options = ServerOptions::new("test-server", "0.0.1");
    options.ping_interval_ms = None;
    options
}

/// A connected client/server transport pair.
pub fn pipe() -> (TestClient<PipeAdapter>, PipeAdapter) {
    let (client_side, server_side) = duplex(64 * 1024);
    let (client_read, client_write) = split(client_side);
    let (server_read, server_write) = split(server_side);
    (
        TestClient::new(NdjsonAdapter::new(client_read, client_write)),
        NdjsonAdapter::new(server_read, server_write),
    )
}

/// How the client answers server-initiated `ping` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingReply {
    Ack,
    Fail,
}

pub struct TestClient<A: NetworkAdapter> {
    adapter: A,
    next_id: i64,
    /// Every frame received from the server, in arrival order.
    pub seen: Vec<Value>,
    /// Answer to `roots/list`.
    pub roots: Vec<Value>,
    pub ping_reply: PingReply,
}

impl<A: NetworkAdapter> TestClient<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            next_id: 1,
            seen: Vec::new(),
            roots: Vec::new(),
            ping_reply: PingReply::Ack,
        }
    }

    pub async fn send(&mut self, frame: Value) {
        self.adapter.send(&frame.to_string()).await.unwrap();
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.adapter.send(frame).await.unwrap();
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({ "jsonrpc": "2.0", "method": method, "params": params }))
            .await;
    }

    /// Next frame from the server. Server-initiated requests are answered
    /// automatically before being returned.
    pub async fn next_frame(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.adapter.recv())
            .await
            .expect("timed out waiting for the server")
            .unwrap()
            .expect("server closed the connection");
        let frame: Value = serde_json::from_str(&frame).unwrap();
        self.seen.push(frame.clone());

        if let (Some(id), Some(method)) = (frame.get("id"), frame["method"].as_str()) {
            let reply = match (method, self.ping_reply) {
                ("ping", PingReply::Ack) => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
                ("ping", PingReply::Fail) => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": { "code": -32603, "message": "client busy" }
                }),
                ("roots/list", _) => {
                    json!({ "jsonrpc": "2.0", "id": id, "result": { "roots": self.roots } })
                }
                _ => json!({
                    "jsonrpc": "2.0", "id": id,
                    "error": { "code": -32601, "message": "unsupported" }
                }),
            };
            self.send(reply).await;
        }
        frame
    }

    /// Sends a request without waiting; returns its id.
    pub async fn send_request(&mut self, method: &str, params: Value) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        id
    }

    /// Waits for the response to request `id`, reading (and recording)
    /// whatever arrives before it.
    pub async fn response_to(&mut self, id: i64) -> Value {
        let is_response =
            |frame: &Value| frame.get("method").is_none() && frame["id"] == json!(id);
        if let Some(frame) = self.seen.iter().find(|f| is_response(f)) {
            return frame.clone();
        }
        loop {
            let frame = self.next_frame().await;
            if is_response(&frame) {
                return frame;
            }
        }
    }

    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.send_request(method, params).await;
        self.response_to(id).await
    }

    /// Calls a method and returns its `result`, failing the test on an error reply.
    pub async fn call(&mut self, method: &str, params: Value) -> Value {
        let response = self.request(method, params).await;
        assert!(response.get("error").is_none(), "unexpected error: {}", response);
        response["result"].clone()
    }

    pub async fn initialize(&mut self, capabilities: Value) -> Value {
        self.call(
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": capabilities,
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        )
        .await
    }

    /// Notifications with `method` received so far.
    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.seen
            .iter()
            .filter(|f| f["method"] == method && f.get("id").is_none())
            .cloned()
            .collect()
    }

    pub async fn hang_up(mut self) {
        self.adapter.close().await.unwrap();
    }
}

/// Runs `connect` against the client's handshake and returns once the session is active.
pub async fn connect(
    session: &Session,
    client: &mut TestClient<PipeAdapter>,
    transport: PipeAdapter,
    capabilities: Value,
) {
    let wants_roots = capabilities.get("roots").is_some();
    let connecting = tokio::spawn({
        let session = session.clone();
        async move { session.connect(transport).await }
    });
    client.initialize(capabilities).await;
    if wants_roots {
        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "roots/list");
    }
    connecting.await.unwrap().unwrap();
}

/// A session over a pipe, already through the handshake.
pub async fn active_session(
    registry: Registry,
    options: ServerOptions,
) -> (Session, TestClient<PipeAdapter>) {
    init_tracing();
    let session = Session::new(Arc::new(registry), Arc::new(options));
    let (mut client, transport) = pipe();
    connect(&session, &mut client, transport, json!({})).await;
    (session, client)
}

/// A listener fed by the test with in-memory connections.
pub struct PipeListener {
    incoming: mpsc::UnboundedReceiver<PipeAdapter>,
}

impl PipeListener {
    pub fn new() -> (Self, mpsc::UnboundedSender<PipeAdapter>) {
        let (tx, incoming) = mpsc::unbounded_channel();
        (Self { incoming }, tx)
    }
}

#[async_trait]
impl Listener for PipeListener {
    type Adapter = PipeAdapter;

    async fn accept(&mut self) -> mcp_session::Result<Option<PipeAdapter>> {
        Ok(self.incoming.recv().await)
    }
}
