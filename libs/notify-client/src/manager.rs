//! Connection lifecycle for the notification channel.
//!
//! A [`ConnectionManager`] owns at most one channel to the hub and drives it
//! through [`ConnectionState`]. Two distinct retry paths exist:
//!
//! - a failed **handshake** is retried once per
//!   [`ClientConfig::handshake_retry_delay`], by a timer the manager owns;
//! - a **mid-session drop** is resumed by the session task following
//!   [`ClientConfig::reconnect_policy`].
//!
//! Callers never see errors from [`start`](ConnectionManager::start) or
//! [`stop`](ConnectionManager::stop); they observe [`ConnectionStatus`].
//! Dropping the manager cancels every timer and task it owns.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use notify_common::protocol::{
    CompletionPayload, EventName, GroupPayload, Method, OP_COMPLETION, OP_DISPATCH,
    OP_HEARTBEAT_ACK, OP_RECONNECT,
};
use notify_common::{ClientMessage, NotificationContent, ServerMessage};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::auth::AuthTokenProvider;
use crate::config::ClientConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{Error, Result};
use crate::transport::{Channel, Handshake, Transport, WebSocketTransport};

/// How long `stop()` waits for the close handshake before abandoning the socket.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long an invocation waits for the hub's completion.
const INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Floor for the heartbeat period, whatever the hub announces.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
        };
        f.write_str(s)
    }
}

/// What a connection-status indicator renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Last handshake or transport error; cleared on a successful connect.
    pub error: Option<String>,
}

impl ConnectionStatus {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            error: None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{} / error: {}", self.state, error),
            None => write!(f, "{}", self.state),
        }
    }
}

// ── Session commands ────────────────────────────────────────────────────────

/// Commands from the public handle to the session task.
enum Command {
    Invoke {
        method: &'static str,
        args: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Why the frame pump returned.
enum SessionEnd {
    /// Explicit stop; acknowledge once the socket is closed.
    Closed(Option<oneshot::Sender<()>>),
    /// The channel went away underneath us.
    Dropped(String),
}

/// Handle to a running session task.
struct Link {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Control {
    /// Bumped by stop/drop; tasks carrying an older epoch are stale.
    epoch: u64,
    /// Pending (or running) handshake retry.
    retry: Option<JoinHandle<()>>,
    link: Option<Link>,
    connection_id: Option<String>,
    /// Groups joined on the current physical connection.
    groups: HashSet<String>,
}

struct Shared {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthTokenProvider>,
    dispatcher: NotificationDispatcher,
    status: watch::Sender<ConnectionStatus>,
    /// Every status write happens while this is held.
    control: Mutex<Control>,
}

/// Owns one notification channel and its reconnect state machine.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthTokenProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::disconnected());
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                auth,
                dispatcher,
                status,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// A manager using the WebSocket transport.
    pub fn websocket(
        config: ClientConfig,
        auth: Arc<dyn AuthTokenProvider>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self::new(config, Arc::new(WebSocketTransport), auth, dispatcher)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn connection_id(&self) -> Option<String> {
        self.shared.control.lock().connection_id.clone()
    }

    /// Groups joined on the current connection, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.shared.control.lock().groups.iter().cloned().collect();
        groups.sort();
        groups
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.shared.dispatcher
    }

    /// Connect if not already connecting or connected.
    ///
    /// Returns once the handshake has succeeded or failed. A pending
    /// handshake retry is cancelled in favour of this attempt.
    pub async fn start(&self) {
        let epoch = {
            let mut ctl = self.shared.control.lock();
            let current = self.shared.status.borrow().clone();
            if current.state != ConnectionState::Disconnected {
                tracing::debug!(state = %current.state, "start ignored, connection already active");
                return;
            }
            if let Some(retry) = ctl.retry.take() {
                retry.abort();
            }
            self.shared.set_status(ConnectionState::Connecting, current.error);
            ctl.epoch
        };

        self.shared.clone().attempt(epoch).await;
    }

    /// Disconnect and cancel every pending retry. Idempotent.
    pub async fn stop(&self) {
        let Some(link) = self.shared.teardown() else {
            return;
        };

        let (done_tx, done_rx) = oneshot::channel();
        if link.commands.send(Command::Close { done: done_tx }).is_ok()
            && time::timeout(CLOSE_TIMEOUT, done_rx).await.is_err()
        {
            tracing::warn!("notification channel did not close in time");
        }
        link.task.abort();
        tracing::info!("notification channel stopped");
    }

    /// Broadcast a notification through the hub.
    pub async fn send(&self, content: &NotificationContent) -> Result<()> {
        let args = serde_json::to_value(content)?;
        self.shared.invoke(Method::SEND_NOTIFICATION, args).await
    }

    /// Join a broadcast group on the current connection.
    ///
    /// Fails with [`Error::NotConnected`] unless connected. Membership is not
    /// carried over to a new connection after a reconnect.
    pub async fn join_group(&self, group: &str) -> Result<()> {
        let connection_id = self.connection_id();
        let args = serde_json::to_value(GroupPayload {
            group: group.to_string(),
        })?;
        self.shared.invoke(Method::JOIN_GROUP, args).await?;

        let mut ctl = self.shared.control.lock();
        if ctl.connection_id.is_some() && ctl.connection_id == connection_id {
            ctl.groups.insert(group.to_string());
        }
        Ok(())
    }

    /// Leave a broadcast group on the current connection.
    pub async fn leave_group(&self, group: &str) -> Result<()> {
        let args = serde_json::to_value(GroupPayload {
            group: group.to_string(),
        })?;
        self.shared.invoke(Method::LEAVE_GROUP, args).await?;
        self.shared.control.lock().groups.remove(group);
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.shared.teardown() {
            link.task.abort();
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url)
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Caller must hold `control`.
    fn set_status(&self, state: ConnectionState, error: Option<String>) {
        let previous = self.status.send_replace(ConnectionStatus { state, error });
        if previous.state != state {
            tracing::debug!(from = %previous.state, to = %state, "connection state changed");
        }
    }

    /// Invalidate all tasks, cancel the retry timer, and detach the link.
    fn teardown(&self) -> Option<Link> {
        let mut ctl = self.control.lock();
        ctl.epoch += 1;
        if let Some(retry) = ctl.retry.take() {
            retry.abort();
        }
        ctl.groups.clear();
        ctl.connection_id = None;
        if self.state() != ConnectionState::Disconnected {
            self.set_status(ConnectionState::Disconnected, None);
        }
        ctl.link.take()
    }

    async fn handshake(&self) -> Result<Handshake> {
        let url = self.config.ws_url()?;
        // Fresh on every attempt so refreshed credentials are picked up.
        let token = self.auth.access_token().await;
        if token.is_none() {
            tracing::debug!("connecting without an access token");
        }
        match time::timeout(
            self.config.handshake_timeout,
            self.transport.connect(&url, token.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Handshake("handshake timed out".to_string())),
        }
    }

    /// One handshake attempt on behalf of `start()` or the retry timer.
    fn attempt(self: Arc<Self>, epoch: u64) -> BoxFuture<'static, ()> {
        async move {
            let stale = match self.handshake().await {
                Ok(handshake) => self.clone().install(epoch, handshake),
                Err(err) => {
                    self.clone().handshake_failed(epoch, err);
                    None
                }
            };

            if let Some(mut channel) = stale {
                tracing::debug!("discarding channel from a cancelled attempt");
                let _ = channel.close().await;
            }
        }
        .boxed()
    }

    /// Adopt a fresh channel, or hand it back if the attempt went stale.
    fn install(self: Arc<Self>, epoch: u64, handshake: Handshake) -> Option<Box<dyn Channel>> {
        let mut ctl = self.control.lock();
        if ctl.epoch != epoch {
            return Some(handshake.channel);
        }

        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run_session(
            epoch,
            handshake.channel,
            handshake.heartbeat_interval,
            rx,
        ));

        ctl.retry = None;
        ctl.link = Some(Link { commands, task });
        ctl.groups.clear();
        ctl.connection_id = Some(handshake.connection_id.clone());
        self.set_status(ConnectionState::Connected, None);

        tracing::info!(connection_id = %handshake.connection_id, url = %self.config.url, "notification channel connected");
        None
    }

    fn handshake_failed(self: Arc<Self>, epoch: u64, err: Error) {
        let mut ctl = self.control.lock();
        if ctl.epoch != epoch {
            return;
        }

        let message = err.to_string();
        tracing::warn!(error = %message, url = %self.config.url, "notification handshake failed");
        self.set_status(ConnectionState::Disconnected, Some(message));

        if !self.config.automatic_reconnect {
            return;
        }

        let delay = self.config.handshake_retry_delay;
        tracing::debug!(delay_ms = delay.as_millis() as u64, "scheduling handshake retry");

        let shared = self.clone();
        ctl.retry = Some(tokio::spawn(async move {
            time::sleep(delay).await;

            let proceed = {
                let ctl = shared.control.lock();
                let current = shared.status.borrow().clone();
                if ctl.epoch != epoch || current.state != ConnectionState::Disconnected {
                    false
                } else {
                    shared.set_status(ConnectionState::Connecting, current.error);
                    true
                }
            };

            if proceed {
                shared.attempt(epoch).await;
            }
        }));
    }

    async fn invoke(&self, method: &'static str, args: Value) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        {
            let ctl = self.control.lock();
            if self.state() != ConnectionState::Connected {
                return Err(Error::NotConnected);
            }
            let link = ctl.link.as_ref().ok_or(Error::NotConnected)?;
            link.commands
                .send(Command::Invoke {
                    method,
                    args,
                    reply,
                })
                .map_err(|_| Error::NotConnected)?;
        }

        match time::timeout(INVOCATION_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => Err(Error::Transport(format!("{method} timed out"))),
        }
    }

    // ── Session task ────────────────────────────────────────────────────────

    /// Drives one logical session: pumps frames, and on an unexpected drop
    /// resumes per the reconnect policy until stopped or out of attempts.
    async fn run_session(
        self: Arc<Self>,
        epoch: u64,
        mut channel: Box<dyn Channel>,
        mut heartbeat_interval: Duration,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            let reason = match self.pump(channel.as_mut(), heartbeat_interval, &mut commands).await {
                SessionEnd::Closed(done) => {
                    if let Err(e) = channel.close().await {
                        tracing::debug!(error = %e, "error closing notification channel");
                    }
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                SessionEnd::Dropped(reason) => reason,
            };
            drop(channel);

            {
                let mut ctl = self.control.lock();
                if ctl.epoch != epoch {
                    return;
                }
                ctl.groups.clear();
                ctl.connection_id = None;
                if !self.config.automatic_reconnect {
                    tracing::warn!(reason = %reason, "notification channel closed");
                    ctl.link = None;
                    self.set_status(ConnectionState::Disconnected, Some(reason));
                    return;
                }
                tracing::warn!(reason = %reason, "notification channel dropped, reconnecting");
                self.set_status(ConnectionState::Reconnecting, Some(reason));
            }

            let Some(handshake) = self.resume(epoch, &mut commands).await else {
                return;
            };

            {
                let mut ctl = self.control.lock();
                if ctl.epoch != epoch {
                    return;
                }
                ctl.connection_id = Some(handshake.connection_id.clone());
                self.set_status(ConnectionState::Connected, None);
            }
            tracing::info!(connection_id = %handshake.connection_id, "notification channel reconnected");

            channel = handshake.channel;
            heartbeat_interval = handshake.heartbeat_interval;
        }
    }

    /// Backoff loop for a dropped session. `None` means give up.
    async fn resume(
        &self,
        epoch: u64,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Option<Handshake> {
        let mut attempt: u32 = 0;
        loop {
            let Some(delay) = self.config.reconnect_policy.delay_for(attempt) else {
                let mut ctl = self.control.lock();
                if ctl.epoch == epoch {
                    tracing::warn!(attempts = attempt, "notification reconnect attempts exhausted");
                    ctl.link = None;
                    let error = self.status.borrow().error.clone();
                    self.set_status(ConnectionState::Disconnected, error);
                }
                return None;
            };

            let outcome = tokio::select! {
                result = async {
                    time::sleep(delay).await;
                    self.handshake().await
                } => Some(result),
                _ = reject_until_closed(commands) => None,
            };

            match outcome? {
                Ok(handshake) => return Some(handshake),
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "notification reconnect attempt failed");
                    let ctl = self.control.lock();
                    if ctl.epoch != epoch {
                        return None;
                    }
                    self.set_status(ConnectionState::Reconnecting, Some(err.to_string()));
                }
            }
        }
    }

    /// Read frames and run commands until the channel ends or is closed.
    async fn pump(
        &self,
        channel: &mut dyn Channel,
        heartbeat_interval: Duration,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        let mut pending: HashMap<u64, oneshot::Sender<Result<()>>> = HashMap::new();
        let mut next_invocation: u64 = 1;
        let mut last_seq: u64 = 0;

        let period = heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let mut heartbeat = time::interval_at(time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                frame = channel.recv() => match frame {
                    Some(Ok(msg)) => {
                        if let Some(reason) = self.handle_frame(msg, &mut pending, &mut last_seq) {
                            break SessionEnd::Dropped(reason);
                        }
                    }
                    Some(Err(e)) => break SessionEnd::Dropped(e.to_string()),
                    None => break SessionEnd::Dropped("connection closed".to_string()),
                },

                cmd = commands.recv() => match cmd {
                    Some(Command::Invoke { method, args, reply }) => {
                        let id = next_invocation;
                        next_invocation += 1;
                        match channel.send(ClientMessage::invoke(id, method, args)).await {
                            Ok(()) => track_invocation(&mut pending, id, reply),
                            Err(e) => {
                                let _ = reply.send(Err(Error::ConnectionLost));
                                break SessionEnd::Dropped(e.to_string());
                            }
                        }
                    }
                    Some(Command::Close { done }) => break SessionEnd::Closed(Some(done)),
                    // The manager is gone.
                    None => break SessionEnd::Closed(None),
                },

                _ = heartbeat.tick() => {
                    if let Err(e) = channel.send(ClientMessage::heartbeat(last_seq)).await {
                        break SessionEnd::Dropped(e.to_string());
                    }
                }
            }
        };

        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(Error::ConnectionLost));
        }
        end
    }

    /// Handle one inbound frame. Returns a reason if the session must drop.
    fn handle_frame(
        &self,
        msg: ServerMessage,
        pending: &mut HashMap<u64, oneshot::Sender<Result<()>>>,
        last_seq: &mut u64,
    ) -> Option<String> {
        if let Some(seq) = msg.s {
            *last_seq = seq;
        }

        match msg.op {
            OP_DISPATCH => match msg.t.as_deref() {
                Some(EventName::RECEIVE_NOTIFICATION) => {
                    match serde_json::from_value::<NotificationContent>(msg.d) {
                        Ok(content) => {
                            self.dispatcher.dispatch(&content);
                        }
                        Err(e) => tracing::warn!(error = %e, "malformed notification payload"),
                    }
                }
                Some(other) => tracing::debug!(event = other, "ignoring dispatch"),
                None => tracing::debug!("dispatch without event name"),
            },
            OP_COMPLETION => match serde_json::from_value::<CompletionPayload>(msg.d) {
                Ok(completion) => {
                    if let Some(reply) = pending.remove(&completion.id) {
                        let result = match completion.error {
                            None => Ok(()),
                            Some(error) => Err(Error::Rejected(error)),
                        };
                        let _ = reply.send(result);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed completion"),
            },
            OP_HEARTBEAT_ACK => tracing::trace!("heartbeat acknowledged"),
            OP_RECONNECT => {
                let reason = msg
                    .d
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("hub requested reconnect")
                    .to_string();
                return Some(reason);
            }
            other => tracing::debug!(op = other, "ignoring unknown opcode"),
        }
        None
    }
}

/// Record an in-flight invocation, first dropping entries whose caller
/// already gave up (timed out or was cancelled).
fn track_invocation(
    pending: &mut HashMap<u64, oneshot::Sender<Result<()>>>,
    id: u64,
    reply: oneshot::Sender<Result<()>>,
) {
    pending.retain(|_, waiting| !waiting.is_closed());
    pending.insert(id, reply);
}

/// Fail invocations while no channel is open; resolves on Close.
async fn reject_until_closed(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Invoke { reply, .. } => {
                let _ = reply.send(Err(Error::NotConnected));
            }
            Command::Close { done } => {
                let _ = done.send(());
                return;
            }
        }
    }
}
