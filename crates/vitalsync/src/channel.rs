//! Transport channel.
//!
//! A transport channel owns one logical persistent WebSocket connection to
//! a named endpoint. It frames outbound commands as JSON text, parses
//! inbound text frames into envelopes for the channel's router, and keeps
//! the connection alive through exponential-backoff reconnection until a
//! retry ceiling is reached or the caller disconnects.
//!
//! Nothing here returns errors during streaming: connection loss becomes a
//! phase transition plus a connectivity callback, malformed inbound frames
//! are discarded, and sends outside the open phase are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::envelope::Envelope;
use crate::router::MessageRouter;

/// How long a handshake may stay in flight before the attempt is treated
/// as failed.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// No socket. Entered at construction.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Fully usable; the only phase that accepts sends.
    Open,
    /// Closed with a reconnect scheduled.
    ClosedRetrying,
    /// Closed for good; only a new `connect` call leaves this phase.
    ClosedTerminal,
}

impl ConnectionPhase {
    /// Whether the channel is usable for sends.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether no further automatic reconnects will happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedTerminal)
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::ClosedRetrying => write!(f, "closed (retrying)"),
            Self::ClosedTerminal => write!(f, "closed (terminal)"),
        }
    }
}

/// Reconnect schedule: exponential backoff with a cap and a hard attempt
/// ceiling.
///
/// The delay before the k-th retry is `min(base * 2^(k-1), cap)`. Once the
/// ceiling is reached no further retry is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
    ceiling: u32,
    attempt: u32,
}

impl ReconnectPolicy {
    /// Default delay before the first retry.
    pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
    /// Default backoff cap.
    pub const DEFAULT_CAP: Duration = Duration::from_secs(30);
    /// Default attempt ceiling.
    pub const DEFAULT_CEILING: u32 = 10;

    /// Create a policy with the given base delay, cap, and attempt ceiling.
    #[must_use]
    pub fn new(base: Duration, cap: Duration, ceiling: u32) -> Self {
        Self {
            base,
            cap,
            ceiling: ceiling.max(1),
            attempt: 0,
        }
    }

    /// The delay before the next retry, or `None` once the ceiling is
    /// reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.ceiling {
            return None;
        }
        self.attempt += 1;
        let exponent = self.attempt - 1;
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let millis = base_ms.saturating_mul(2_u64.saturating_pow(exponent.min(32)));
        Some(Duration::from_millis(millis).min(self.cap))
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Retries attempted since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP, Self::DEFAULT_CEILING)
    }
}

type ConnectivityCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ChannelShared {
    name: String,
    url: String,
    router: MessageRouter,
    phase: Mutex<ConnectionPhase>,
    connectivity: Mutex<Vec<ConnectivityCallback>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Incremented on every connect/disconnect; a driver whose epoch is
    /// stale must not write the phase anymore.
    epoch: AtomicU64,
}

impl ChannelShared {
    fn set_phase(&self, next: ConnectionPhase) {
        *lock(&self.phase) = next;
    }

    fn set_phase_if_current(&self, epoch: u64, next: ConnectionPhase) {
        let mut phase = lock(&self.phase);
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *phase = next;
        }
    }

    fn notify_connectivity(&self, connected: bool) {
        let callbacks: Vec<ConnectivityCallback> = lock(&self.connectivity).clone();
        for callback in callbacks {
            callback(connected);
        }
    }
}

struct DriverControl {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One independently connected logical stream.
///
/// Constructed idle; `connect` spawns the driver task and `disconnect`
/// terminates it, synchronously cancelling any scheduled retry.
pub struct TransportChannel {
    shared: Arc<ChannelShared>,
    policy: ReconnectPolicy,
    control: Mutex<Option<DriverControl>>,
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("name", &self.shared.name)
            .field("url", &self.shared.url)
            .field("phase", &self.phase())
            .finish()
    }
}

impl TransportChannel {
    /// Create an idle channel for the given endpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                name: name.into(),
                url: url.into(),
                router: MessageRouter::new(),
                phase: Mutex::new(ConnectionPhase::Idle),
                connectivity: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
            policy,
            control: Mutex::new(None),
        }
    }

    /// The channel's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The resolved endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        *lock(&self.shared.phase)
    }

    /// Whether the channel currently accepts sends.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase().is_open()
    }

    /// The dispatch table for this channel's inbound envelopes.
    #[must_use]
    pub fn router(&self) -> &MessageRouter {
        &self.shared.router
    }

    /// Register a handler for a type tag on this channel.
    pub fn subscribe(
        &self,
        kind: &str,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> crate::router::SubscriptionHandle {
        self.shared.router.subscribe(kind, handler)
    }

    /// Register a wildcard handler that sees every envelope on this
    /// channel.
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> crate::router::SubscriptionHandle {
        self.shared.router.subscribe_all(handler)
    }

    /// Register a connectivity callback.
    ///
    /// The callback fires with the boolean connected state on every
    /// transition into or out of the open phase. This is the only
    /// cross-cutting connectivity signal.
    pub fn on_connectivity(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        lock(&self.shared.connectivity).push(Arc::new(callback));
    }

    /// Start the connection driver.
    ///
    /// A no-op while a driver is already running; after a terminal close
    /// this starts over with a fresh attempt counter.
    pub fn connect(&self) {
        let mut control = lock(&self.control);
        if let Some(existing) = control.as_ref() {
            if !existing.task.is_finished() {
                debug!(channel = %self.shared.name, "connect ignored; driver already running");
                return;
            }
        }

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        let policy = self.policy.clone();
        let task = tokio::spawn(drive(shared, policy, shutdown_rx, epoch));
        *control = Some(DriverControl {
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Terminate the connection and stop all automatic reconnects.
    ///
    /// The phase flips to terminal before the driver observes the signal,
    /// so a retry timer racing this call cannot resurrect the connection.
    pub fn disconnect(&self) {
        let mut control = lock(&self.control);
        // Invalidate the running driver's phase writes, then flip to
        // terminal; a retry timer firing after this point cannot
        // resurrect the connection.
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.set_phase(ConnectionPhase::ClosedTerminal);
        if let Some(driver) = control.take() {
            let _ = driver.shutdown.send(true);
        }
    }

    /// Send an outbound command.
    ///
    /// Commands are arbitrary JSON; no envelope is imposed. Sends outside
    /// the open phase are silently dropped.
    pub fn send(&self, command: &serde_json::Value) {
        if !self.is_open() {
            debug!(channel = %self.shared.name, "send dropped; channel not open");
            return;
        }
        let sender = lock(&self.shared.outbound).clone();
        match sender {
            Some(tx) => {
                if tx.send(Message::Text(command.to_string())).is_err() {
                    debug!(channel = %self.shared.name, "send dropped; connection closing");
                }
            }
            None => {
                debug!(channel = %self.shared.name, "send dropped; channel not open");
            }
        }
    }
}

enum CloseReason {
    /// The caller asked for the connection to end.
    Requested,
    /// The socket closed or failed underneath us.
    Lost,
}

/// Resolve once the shutdown flag is raised (or the sender is gone).
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn drive(
    shared: Arc<ChannelShared>,
    mut policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
    epoch: u64,
) {
    loop {
        if *shutdown.borrow() {
            shared.set_phase_if_current(epoch, ConnectionPhase::ClosedTerminal);
            return;
        }

        shared.set_phase_if_current(epoch, ConnectionPhase::Connecting);
        debug!(channel = %shared.name, url = %shared.url, "connecting");

        let attempt = tokio::select! {
            result = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(shared.url.as_str())) => result,
            () = wait_for_shutdown(&mut shutdown) => {
                shared.set_phase_if_current(epoch, ConnectionPhase::ClosedTerminal);
                return;
            }
        };

        match attempt {
            Ok(Ok((socket, _response))) => {
                policy.reset();
                let reason = run_open(&shared, socket, &mut shutdown, epoch).await;

                lock(&shared.outbound).take();
                shared.notify_connectivity(false);

                match reason {
                    CloseReason::Requested => {
                        shared.set_phase_if_current(epoch, ConnectionPhase::ClosedTerminal);
                        info!(channel = %shared.name, "disconnected");
                        return;
                    }
                    CloseReason::Lost => {
                        warn!(channel = %shared.name, "connection lost");
                    }
                }
            }
            Ok(Err(error)) => {
                debug!(channel = %shared.name, %error, "connection attempt failed");
            }
            Err(_elapsed) => {
                debug!(channel = %shared.name, "handshake timed out");
            }
        }

        match policy.next_delay() {
            Some(delay) => {
                shared.set_phase_if_current(epoch, ConnectionPhase::ClosedRetrying);
                debug!(
                    channel = %shared.name,
                    attempt = policy.attempt(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconnect scheduled"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = wait_for_shutdown(&mut shutdown) => {
                        shared.set_phase_if_current(epoch, ConnectionPhase::ClosedTerminal);
                        return;
                    }
                }
            }
            None => {
                shared.set_phase_if_current(epoch, ConnectionPhase::ClosedTerminal);
                warn!(channel = %shared.name, "retry ceiling reached; giving up");
                return;
            }
        }
    }
}

async fn run_open(
    shared: &ChannelShared,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    shutdown: &mut watch::Receiver<bool>,
    epoch: u64,
) -> CloseReason {
    let (mut sink, mut stream) = socket.split();

    // The outbound sender must be in place before the open phase becomes
    // visible; a send racing the transition would otherwise be dropped
    // from an open channel.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    *lock(&shared.outbound) = Some(outbound_tx);
    shared.set_phase_if_current(epoch, ConnectionPhase::Open);
    info!(channel = %shared.name, "connected");
    shared.notify_connectivity(true);

    loop {
        tokio::select! {
            () = wait_for_shutdown(shutdown) => {
                let _ = sink.close().await;
                return CloseReason::Requested;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(error) = sink.send(message).await {
                            debug!(channel = %shared.name, %error, "outbound send failed");
                            return CloseReason::Lost;
                        }
                    }
                    None => return CloseReason::Lost,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        // A corrupt frame must never tear down the
                        // connection or reach a handler.
                        match Envelope::parse(&text) {
                            Some(envelope) => shared.router.dispatch(&envelope),
                            None => {
                                debug!(channel = %shared.name, "malformed frame discarded");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            return CloseReason::Lost;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseReason::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(channel = %shared.name, %error, "socket error");
                        return CloseReason::Lost;
                    }
                }
            }
        }
    }
}
