#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify_client::transport::{Channel, Handshake, Transport};
use notify_client::{
    AuthTokenProvider, ClientConfig, ConnectionManager, Error, NotificationContent,
    NotificationDispatcher, Result,
};
use notify_common::protocol::OP_INVOKE;
use notify_common::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

pub const HUB_URL: &str = "http://hub.test/notificationHub";

pub fn config() -> ClientConfig {
    ClientConfig::new(HUB_URL)
}

pub fn manager(
    transport: &MockTransport,
    auth: impl AuthTokenProvider,
    config: ClientConfig,
) -> (ConnectionManager, NotificationDispatcher) {
    let dispatcher = NotificationDispatcher::new();
    let manager = ConnectionManager::new(
        config,
        Arc::new(transport.clone()),
        Arc::new(auth),
        dispatcher.clone(),
    );
    (manager, dispatcher)
}

/// Poll `cond` in 10ms steps for up to two (virtual) seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ---------------------------------------------------------------------------
// Mock transport
// ---------------------------------------------------------------------------

/// What the next connect attempt does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    Reject(String),
}

#[derive(Default)]
struct MockState {
    /// Consumed front to back; `Accept` once empty.
    script: Mutex<VecDeque<Outcome>>,
    tokens: Mutex<Vec<Option<String>>>,
    servers: Mutex<Vec<ServerSide>>,
    gate: Mutex<Option<watch::Receiver<bool>>>,
    gate_tx: Mutex<Option<watch::Sender<bool>>>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    next_connection: AtomicU64,
}

/// Scripted in-memory transport. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.script.lock().extend(outcomes);
    }

    /// Hold every connect attempt until [`release`](Self::release).
    pub fn hold(&self) {
        let (tx, rx) = watch::channel(false);
        *self.state.gate.lock() = Some(rx);
        *self.state.gate_tx.lock() = Some(tx);
    }

    pub fn release(&self) {
        self.state.gate.lock().take();
        if let Some(tx) = self.state.gate_tx.lock().take() {
            let _ = tx.send(true);
        }
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Token presented on each attempt, in order.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.state.tokens.lock().clone()
    }

    /// Channels closed by the client.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Hub side of the most recently accepted connection.
    pub fn server(&self) -> ServerSide {
        self.state
            .servers
            .lock()
            .last()
            .cloned()
            .expect("no accepted connection")
    }

    pub fn accepted(&self) -> usize {
        self.state.servers.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str, token: Option<&str>) -> Result<Handshake> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.tokens.lock().push(token.map(String::from));

        let gate = self.state.gate.lock().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        let outcome = self
            .state
            .script
            .lock()
            .pop_front()
            .unwrap_or(Outcome::Accept);
        if let Outcome::Reject(reason) = outcome {
            return Err(Error::Handshake(reason));
        }

        let n = self.state.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let server = ServerSide {
            frames: tx.clone(),
            sent: Arc::new(Mutex::new(Vec::new())),
            reject_with: Arc::new(Mutex::new(None)),
            seq: Arc::new(AtomicU64::new(1)),
        };
        let channel = MockChannel {
            frames: rx,
            loopback: tx,
            sent: server.sent.clone(),
            reject_with: server.reject_with.clone(),
            closes: self.state.closes.clone(),
        };
        self.state.servers.lock().push(server);

        Ok(Handshake {
            channel: Box::new(channel),
            connection_id: format!("conn_{n}"),
            heartbeat_interval: Duration::from_secs(30),
        })
    }
}

enum Frame {
    Message(ServerMessage),
    Drop,
}

/// Test handle for the hub end of one connection.
#[derive(Clone)]
pub struct ServerSide {
    frames: mpsc::UnboundedSender<Frame>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    reject_with: Arc<Mutex<Option<String>>>,
    seq: Arc<AtomicU64>,
}

impl ServerSide {
    pub fn push(&self, message: ServerMessage) {
        let _ = self.frames.send(Frame::Message(message));
    }

    pub fn notify(&self, content: &NotificationContent) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.push(ServerMessage::notification(seq, content));
    }

    /// Simulate the connection dropping underneath the client.
    pub fn drop_connection(&self) {
        let _ = self.frames.send(Frame::Drop);
    }

    /// Complete subsequent invocations with this error.
    pub fn reject_invocations(&self, error: &str) {
        *self.reject_with.lock() = Some(error.to_string());
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().clone()
    }

    pub fn invocations(&self) -> Vec<ClientMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.op == OP_INVOKE)
            .collect()
    }
}

/// Completes every invocation in frame order, after anything already queued.
struct MockChannel {
    frames: mpsc::UnboundedReceiver<Frame>,
    loopback: mpsc::UnboundedSender<Frame>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    reject_with: Arc<Mutex<Option<String>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        if message.op == OP_INVOKE {
            if let Some(id) = message.id {
                let error = self.reject_with.lock().clone();
                let _ = self
                    .loopback
                    .send(Frame::Message(ServerMessage::completion(id, error)));
            }
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage>> {
        match self.frames.recv().await {
            Some(Frame::Message(message)) => Some(Ok(message)),
            Some(Frame::Drop) | None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
