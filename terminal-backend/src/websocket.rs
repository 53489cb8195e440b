//! Live update channel for a single symbol
//!
//! [`LiveChannel`] owns at most one push connection at a time. Subscribing
//! again closes the previous connection (and waits for its task to finish)
//! before the new one is opened. Every connection runs in its own task and is
//! tagged with a generation number; once a channel is superseded its late
//! events are dropped and can no longer touch the published state.
//!
//! Two backend message contracts are supported through [`ChannelVariant`]:
//! - `Enveloped`: connects to `{ws_base}/ws/{symbol}` and delivers the `data`
//!   of messages shaped `{"success": true, "data": ...}`
//! - `Handshake`: connects to `{ws_base}/ws`, sends
//!   `{"action": "subscribe", "symbol": ...}` once connected and delivers
//!   every parsed message unchanged

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use terminal_core::{
    ChannelState, SubscribeMessage, Symbol, TerminalError, TerminalResult, UpdateEnvelope,
};

use crate::config::BackendConfig;

/// Default delay between reconnect attempts
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for a single backoff delay
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(3600);

/// How long to wait for a closing connection before aborting its task
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for the TCP and WebSocket handshake of one connection attempt
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Callback invoked with each delivered update
pub type UpdateCallback = Arc<dyn Fn(Value) + Send + Sync>;

// ============================================================================
// Message contracts
// ============================================================================

/// Which backend message contract the channel speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelVariant {
    /// Per-symbol endpoint, `{success, data}` envelope
    Enveloped,
    /// Shared endpoint, subscribe handshake, raw messages
    Handshake,
}

/// What to do with an inbound text message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Hand the payload to the update callback
    Deliver(Value),
    /// Valid JSON that is not an update
    Ignored,
    /// Not JSON at all
    Malformed(String),
}

impl ChannelVariant {
    /// Reconnect behaviour used unless configured otherwise
    pub fn default_policy(&self) -> ReconnectPolicy {
        match self {
            ChannelVariant::Enveloped => ReconnectPolicy::never(),
            ChannelVariant::Handshake => ReconnectPolicy::fixed(DEFAULT_RECONNECT_DELAY),
        }
    }

    /// Classify an inbound text message
    pub fn decode(&self, text: &str) -> MessageOutcome {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return MessageOutcome::Malformed(e.to_string()),
        };

        match self {
            ChannelVariant::Handshake => MessageOutcome::Deliver(value),
            ChannelVariant::Enveloped => serde_json::from_value::<UpdateEnvelope>(value)
                .ok()
                .and_then(UpdateEnvelope::into_payload)
                .map_or(MessageOutcome::Ignored, MessageOutcome::Deliver),
        }
    }
}

// ============================================================================
// Reconnect policy
// ============================================================================

/// When and how often a closed channel is reopened
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    /// Growth factor applied per attempt (1.0 keeps the delay fixed)
    pub backoff_multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Never reconnect
    pub fn never() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: Some(0),
            backoff_multiplier: 1.0,
        }
    }

    /// Same delay every time, unbounded attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay grows by `multiplier` after each failed attempt
    pub fn exponential(delay: Duration, multiplier: f64) -> Self {
        Self {
            delay,
            max_attempts: None,
            backoff_multiplier: multiplier,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether reconnect attempt number `attempt` (1-based) may be made
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay after `streak` consecutive failed connections (1-based)
    pub fn delay_for(&self, streak: u32) -> Duration {
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(streak.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.delay.as_secs_f64() * multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs)
            .map_or(MAX_RECONNECT_DELAY, |d| d.min(MAX_RECONNECT_DELAY))
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`LiveChannel`]
#[derive(Debug, Clone)]
pub struct LiveChannelConfig {
    pub ws_base_url: Url,
    pub variant: ChannelVariant,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
}

impl LiveChannelConfig {
    /// Channel settings for a backend, with the variant's default policy
    pub fn new(backend: &BackendConfig, variant: ChannelVariant) -> Self {
        Self {
            ws_base_url: backend.ws_base_url.clone(),
            variant,
            reconnect: variant.default_policy(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Push endpoint for a symbol
    pub fn endpoint(&self, symbol: &Symbol) -> TerminalResult<Url> {
        let mut url = self.ws_base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                TerminalError::channel(format!("Cannot build push URL from '{}'", self.ws_base_url))
            })?;
            segments.pop_if_empty().push("ws");
            if self.variant == ChannelVariant::Enveloped {
                segments.push(symbol.as_str());
            }
        }
        Ok(url)
    }
}

// ============================================================================
// Live channel
// ============================================================================

/// The current channel generation and whether its task is still running
#[derive(Debug, Default)]
struct Generation {
    id: u64,
    live: bool,
}

/// Generation bookkeeping shared between the owner and its connection tasks
#[derive(Clone)]
struct StateHandle {
    generation: u64,
    current: Arc<Mutex<Generation>>,
    tx: Arc<watch::Sender<ChannelState>>,
}

impl StateHandle {
    fn is_current(&self) -> bool {
        self.current.lock().id == self.generation
    }

    /// Publish a state change, unless this channel has been superseded
    fn set(&self, state: ChannelState) -> bool {
        let current = self.current.lock();
        if current.id != self.generation {
            return false;
        }
        self.tx.send_replace(state);
        true
    }

    /// Mark the subscription as ended by its own task and publish `Closed`
    fn finish(&self) -> bool {
        let mut current = self.current.lock();
        if current.id != self.generation {
            return false;
        }
        current.live = false;
        self.tx.send_replace(ChannelState::Closed);
        true
    }
}

struct ActiveChannel {
    symbol: Symbol,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner of the single live update connection
pub struct LiveChannel {
    config: LiveChannelConfig,
    active: AsyncMutex<Option<ActiveChannel>>,
    generation: Arc<Mutex<Generation>>,
    state_tx: Arc<watch::Sender<ChannelState>>,
}

impl LiveChannel {
    pub fn new(config: LiveChannelConfig) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Closed);
        Self {
            config,
            active: AsyncMutex::new(None),
            generation: Arc::new(Mutex::new(Generation::default())),
            state_tx: Arc::new(state_tx),
        }
    }

    /// Channel for the backend configured in the environment
    pub fn from_env(variant: ChannelVariant) -> TerminalResult<Self> {
        let backend = BackendConfig::from_env()?;
        Ok(Self::new(LiveChannelConfig::new(&backend, variant)))
    }

    pub fn config(&self) -> &LiveChannelConfig {
        &self.config
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn state_updates(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Symbol of the active subscription, if any
    ///
    /// A subscription whose channel gave up reconnecting is no longer active.
    pub async fn current_symbol(&self) -> Option<Symbol> {
        let active = self.active.lock().await;
        if !self.generation.lock().live {
            return None;
        }
        active.as_ref().map(|c| c.symbol.clone())
    }

    /// Open a channel for `symbol`, replacing any existing one.
    ///
    /// The previous connection is fully closed before the new one starts
    /// connecting, so no update from it can reach `on_update`.
    pub async fn subscribe<F>(&self, symbol: Symbol, on_update: F) -> TerminalResult<()>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let url = self.config.endpoint(&symbol)?;
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            info!(
                "[Live WS] Replacing subscription {} with {}",
                previous.symbol, symbol
            );
            self.close_channel(previous).await;
        }

        let state = {
            let mut current = self.generation.lock();
            current.id += 1;
            current.live = true;
            self.state_tx.send_replace(ChannelState::Connecting);
            StateHandle {
                generation: current.id,
                current: Arc::clone(&self.generation),
                tx: Arc::clone(&self.state_tx),
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = ChannelTask {
            url,
            symbol: symbol.clone(),
            variant: self.config.variant,
            policy: self.config.reconnect.clone(),
            connect_timeout: self.config.connect_timeout,
            on_update: Arc::new(on_update),
            state,
            shutdown: shutdown_rx,
        };

        info!(
            "[Live WS] Subscribing to {} ({:?})",
            symbol, self.config.variant
        );
        *active = Some(ActiveChannel {
            symbol,
            shutdown_tx,
            task: tokio::spawn(task.run()),
        });

        Ok(())
    }

    /// Close the active channel. Does nothing if already closed.
    pub async fn unsubscribe(&self) {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(channel) => self.close_channel(channel).await,
            None => debug!("[Live WS] Unsubscribe with no active channel"),
        }
    }

    async fn close_channel(&self, channel: ActiveChannel) {
        // Retire the generation first so nothing the old task does is observed
        {
            let mut current = self.generation.lock();
            current.id += 1;
            current.live = false;
            self.state_tx.send_replace(ChannelState::Closed);
        }

        let _ = channel.shutdown_tx.send(true);
        let mut task = channel.task;
        if timeout(self.config.close_timeout, &mut task).await.is_err() {
            warn!(
                "[Live WS] Channel for {} did not close within {:?}, aborting",
                channel.symbol, self.config.close_timeout
            );
            task.abort();
        }

        info!("[Live WS] Closed channel for {}", channel.symbol);
    }
}

impl std::fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveChannel")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Connection task
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Shutdown,
}

struct ChannelTask {
    url: Url,
    symbol: Symbol,
    variant: ChannelVariant,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    on_update: UpdateCallback,
    state: StateHandle,
    shutdown: watch::Receiver<bool>,
}

impl ChannelTask {
    /// Connect, read until closed, then reconnect while the policy allows.
    ///
    /// `attempt` counts every reconnect of this subscription and is what
    /// `max_attempts` bounds; `streak` counts failures since the last open
    /// connection and drives the backoff.
    async fn run(mut self) {
        let mut attempt = 0u32;
        let mut streak = 0u32;

        loop {
            if *self.shutdown.borrow() || !self.state.set(ChannelState::Connecting) {
                return;
            }
            info!("[Live WS] Connecting to {}", self.url);

            let connected = tokio::select! {
                result = timeout(self.connect_timeout, connect_async(self.url.as_str())) => result,
                _ = self.shutdown.changed() => return,
            };

            match connected {
                Ok(Ok((ws_stream, _))) => {
                    streak = 0;
                    if !self.state.set(ChannelState::Open) {
                        return;
                    }
                    info!("[Live WS] Connected for {}", self.symbol);

                    if self.session(ws_stream).await == SessionEnd::Shutdown {
                        return;
                    }
                    info!("[Live WS] Disconnected from {}", self.symbol);
                }
                Ok(Err(e)) => {
                    error!("[Live WS] Connection to {} failed: {}", self.url, e);
                }
                Err(_) => {
                    error!(
                        "[Live WS] Connection to {} timed out after {:?}",
                        self.url, self.connect_timeout
                    );
                }
            }

            attempt = attempt.saturating_add(1);
            streak = streak.saturating_add(1);
            if !self.policy.allows(attempt) {
                debug!("[Live WS] Not reconnecting {} (attempt {})", self.symbol, attempt);
                self.state.finish();
                return;
            }

            if !self.state.set(ChannelState::Closed) {
                return;
            }
            let delay = self.policy.delay_for(streak);

            if !self.state.set(ChannelState::Reconnecting) {
                return;
            }
            info!(
                "[Live WS] Reconnecting {} in {:?} (attempt {})",
                self.symbol, delay, attempt
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => return,
            }
        }
    }

    async fn session(&mut self, ws_stream: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws_stream.split();

        if self.variant == ChannelVariant::Handshake {
            let handshake = SubscribeMessage::new(self.symbol.clone());
            match serde_json::to_string(&handshake) {
                Ok(json) => {
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        warn!("[Live WS] Failed to send subscribe message: {}", e);
                        return SessionEnd::Disconnected;
                    }
                }
                Err(e) => error!("[Live WS] Failed to encode subscribe message: {}", e),
            }
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("[Live WS] Failed to send pong: {}", e);
                                return SessionEnd::Disconnected;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("[Live WS] Connection closed by server");
                            return SessionEnd::Disconnected;
                        }
                        Some(Err(e)) => {
                            error!("[Live WS] Error: {}", e);
                            return SessionEnd::Disconnected;
                        }
                        None => {
                            info!("[Live WS] Stream ended");
                            return SessionEnd::Disconnected;
                        }
                        _ => {}
                    }
                }

                _ = self.shutdown.changed() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("[Live WS] Close frame not sent: {}", e);
                    }
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    fn handle_message(&self, text: &str) {
        if !self.state.is_current() {
            debug!("[Live WS] Dropping message from superseded channel {}", self.symbol);
            return;
        }

        match self.variant.decode(text) {
            MessageOutcome::Deliver(payload) => (self.on_update)(payload),
            MessageOutcome::Ignored => debug!("[Live WS] Ignoring message: {}", text),
            MessageOutcome::Malformed(e) => {
                warn!("[Live WS] Dropping malformed message: {} (error: {})", text, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn symbol(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn test_enveloped_decoding() {
        let variant = ChannelVariant::Enveloped;
        assert_eq!(
            variant.decode(r#"{"success": true, "data": {"close": 101.2}}"#),
            MessageOutcome::Deliver(json!({"close": 101.2}))
        );
        assert_eq!(variant.decode(r#"{"success": false, "data": {}}"#), MessageOutcome::Ignored);
        assert_eq!(variant.decode(r#"{"type": "heartbeat"}"#), MessageOutcome::Ignored);
        assert_eq!(variant.decode("[1, 2, 3]"), MessageOutcome::Ignored);
        assert!(matches!(variant.decode("not json"), MessageOutcome::Malformed(_)));
    }

    #[test]
    fn test_handshake_decoding_delivers_raw() {
        let variant = ChannelVariant::Handshake;
        assert_eq!(
            variant.decode(r#"{"symbol": "AAPL", "price": 190}"#),
            MessageOutcome::Deliver(json!({"symbol": "AAPL", "price": 190}))
        );
        assert!(matches!(variant.decode("{oops"), MessageOutcome::Malformed(_)));
    }

    #[test]
    fn test_fixed_policy_is_unbounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(1));
        assert!(policy.allows(u32::MAX));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1_000), Duration::from_secs(5));
    }

    #[test]
    fn test_never_policy() {
        assert!(!ReconnectPolicy::never().allows(1));
    }

    #[test]
    fn test_bounded_exponential_policy() {
        let policy = ReconnectPolicy::exponential(Duration::from_millis(100), 2.0).with_max_attempts(3);
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = ReconnectPolicy::exponential(Duration::from_secs(1), 10.0);
        assert_eq!(policy.delay_for(50), MAX_RECONNECT_DELAY);

        let broken = ReconnectPolicy::exponential(Duration::from_secs(1), f64::NAN);
        assert_eq!(broken.delay_for(3), Duration::from_secs(1));
    }

    #[test]
    fn test_variant_default_policies() {
        assert_eq!(ChannelVariant::Enveloped.default_policy(), ReconnectPolicy::never());
        assert_eq!(
            ChannelVariant::Handshake.default_policy(),
            ReconnectPolicy::fixed(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_endpoints_share_one_base() {
        let backend = BackendConfig::default();

        let enveloped = LiveChannelConfig::new(&backend, ChannelVariant::Enveloped);
        assert_eq!(
            enveloped.endpoint(&symbol("AAPL")).unwrap().as_str(),
            "ws://127.0.0.1:8000/ws/AAPL"
        );

        let handshake = LiveChannelConfig::new(&backend, ChannelVariant::Handshake);
        assert_eq!(
            handshake.endpoint(&symbol("AAPL")).unwrap().as_str(),
            "ws://127.0.0.1:8000/ws"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = BackendConfig::new("https://example.com", "wss://example.com/live/").unwrap();
        let config = LiveChannelConfig::new(&backend, ChannelVariant::Enveloped);
        assert_eq!(
            config.endpoint(&symbol("BRK.B")).unwrap().as_str(),
            "wss://example.com/live/ws/BRK.B"
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_when_closed_is_noop() {
        let channel = LiveChannel::new(LiveChannelConfig::new(
            &BackendConfig::default(),
            ChannelVariant::Enveloped,
        ));
        channel.unsubscribe().await;
        channel.unsubscribe().await;
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.current_symbol().await.is_none());
    }

    #[test]
    fn test_superseded_state_handle_is_ignored() {
        let (tx, _) = watch::channel(ChannelState::Closed);
        let tx = Arc::new(tx);
        let current = Arc::new(Mutex::new(Generation { id: 2, live: true }));
        let stale = StateHandle {
            generation: 1,
            current: Arc::clone(&current),
            tx: Arc::clone(&tx),
        };
        let live = StateHandle {
            generation: 2,
            current,
            tx: Arc::clone(&tx),
        };

        assert!(!stale.set(ChannelState::Open));
        assert_eq!(*tx.borrow(), ChannelState::Closed);
        assert!(live.set(ChannelState::Connecting));
        assert_eq!(*tx.borrow(), ChannelState::Connecting);
    }

    #[test]
    fn test_finish_only_retires_current_generation() {
        let (tx, _) = watch::channel(ChannelState::Open);
        let tx = Arc::new(tx);
        let current = Arc::new(Mutex::new(Generation { id: 3, live: true }));
        let stale = StateHandle {
            generation: 2,
            current: Arc::clone(&current),
            tx: Arc::clone(&tx),
        };

        assert!(!stale.finish());
        assert!(current.lock().live);
        assert_eq!(*tx.borrow(), ChannelState::Open);

        let live = StateHandle {
            generation: 3,
            current: Arc::clone(&current),
            tx: Arc::clone(&tx),
        };
        assert!(live.finish());
        assert!(!current.lock().live);
        assert_eq!(*tx.borrow(), ChannelState::Closed);
    }
}
