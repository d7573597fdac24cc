//! Live track feed
//!
//! [`LiveStreamClient`] keeps one push connection to
//! `<ws>/api/tracks/stream` open and inserts every pushed track into the
//! shared [`TrackStore`], unless a search is active.
//!
//! ```text
//!                 connect()            handshake ok
//!  Disconnected ─────────────► Connecting ─────────────► Open
//!       ▲                          │ error                │ set_channel / disconnect
//!       │◄─────────────────────────┘                      ▼
//!       │◄──────────────── closed by peer ─────────── Closing
//! ```
//!
//! While `Open`, a heartbeat task sends `{"heartbeat":""}` at a fixed
//! interval. When the connection ends and auto-reconnect was requested, a
//! single reconnect attempt is scheduled after a fixed delay. Both timers
//! are owned handles, aborted whenever the connection leaves `Open`.

use crate::error::{Error, Result};
use crate::models::TrackBroadcast;
use crate::store::TrackStore;
use crate::transport::{endpoint, DuplexSocket, SocketConnector, SocketEvent, WebSocketConnector};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(50);

/// Default pause before reconnecting
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

const HEARTBEAT_MESSAGE: &str = r#"{"heartbeat":""}"#;
const REQUEST_CURRENT_MESSAGE: &str = r#"{"request":"current"}"#;

/// Push connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

enum Outgoing {
    Text(String),
    Close,
}

struct Shared {
    state: ConnectionState,
    underground: bool,
    auto_reconnect: bool,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    /// Bumped on every connection attempt, so late callbacks of an older
    /// connection are ignored
    generation: u64,
}

impl Shared {
    fn cancel_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }

    /// Ask the connection task to close an open connection
    fn close_active(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        if let Some(outgoing) = &self.outgoing {
            let _ = outgoing.send(Outgoing::Close);
        }
        self.state = ConnectionState::Closing;
        tracing::debug!("Live stream closing");
    }
}

struct Inner {
    stream_base: Option<String>,
    send_initial: bool,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    connector: Arc<dyn SocketConnector>,
    store: Arc<TrackStore>,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream_url(&self, base: &str, underground: bool) -> Result<Url> {
        let mut url = endpoint(base, "/api/tracks/stream")?;
        url.query_pairs_mut()
            .append_pair("underground", &underground.to_string())
            .append_pair("sendInitial", &self.send_initial.to_string());
        Ok(url)
    }

    fn send_if_open(&self, text: &str) -> bool {
        let shared = self.lock();
        if shared.state != ConnectionState::Open {
            return false;
        }
        match &shared.outgoing {
            Some(outgoing) => outgoing.send(Outgoing::Text(text.to_string())).is_ok(),
            None => false,
        }
    }

    fn handle_message(&self, text: &str) {
        if self.store.is_searching() {
            tracing::debug!("Search active, dropping pushed track");
            return;
        }

        match TrackBroadcast::from_message(text) {
            Ok(broadcast) => {
                tracing::debug!(
                    id = broadcast.track.id,
                    requested = broadcast.requested,
                    "Track pushed"
                );
                self.store.insert_from_stream(broadcast.track);
            }
            Err(e) => tracing::warn!(error = %e, "Could not decode pushed track"),
        }
    }
}

/// Client for the live track push channel
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct LiveStreamClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LiveStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStreamClient")
            .field("stream_base", &self.inner.stream_base)
            .field("state", &self.state())
            .field("underground", &self.underground())
            .finish()
    }
}

impl LiveStreamClient {
    pub fn builder() -> StreamBuilder {
        StreamBuilder::default()
    }

    /// Shared track list fed by this client
    pub fn store(&self) -> &Arc<TrackStore> {
        &self.inner.store
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Channel currently selected
    pub fn underground(&self) -> bool {
        self.inner.lock().underground
    }

    /// Open the push connection
    ///
    /// Returns `Ok(false)` without doing anything when no stream URL is
    /// configured or a connection already exists, and `Ok(true)` once the
    /// connection is open. With `auto_reconnect`, a closed connection is
    /// reopened after the reconnect delay.
    pub async fn connect(&self, auto_reconnect: bool) -> Result<bool> {
        connect(self.inner.clone(), Some(auto_reconnect)).await
    }

    /// Switch between the FM and underground channels
    ///
    /// Returns `false` if `underground` is already selected. Otherwise the
    /// open connection is closed, and reopened on the new channel when
    /// auto-reconnect is enabled.
    pub fn set_channel(&self, underground: bool) -> bool {
        let mut shared = self.inner.lock();
        if shared.underground == underground {
            return false;
        }

        tracing::info!(underground, "Switching live stream channel");
        shared.underground = underground;
        shared.cancel_heartbeat();
        shared.close_active();
        true
    }

    /// Ask the server for the track currently playing
    ///
    /// Returns whether the request was sent; the answer arrives as a regular
    /// pushed track.
    pub fn request_current_track(&self) -> bool {
        let sent = self.inner.send_if_open(REQUEST_CURRENT_MESSAGE);
        tracing::debug!(sent, "Current track requested");
        sent
    }

    /// Close the connection for good
    ///
    /// Disables auto-reconnect and cancels both timers.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        shared.auto_reconnect = false;
        shared.cancel_heartbeat();
        shared.cancel_reconnect();
        match shared.state {
            ConnectionState::Open => shared.close_active(),
            // the pending handshake is dropped once it completes
            ConnectionState::Connecting => shared.state = ConnectionState::Closing,
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }
}

fn connect_boxed(
    inner: Arc<Inner>,
    auto_reconnect: Option<bool>,
) -> Pin<Box<dyn Future<Output = Result<bool>> + Send>> {
    Box::pin(connect(inner, auto_reconnect))
}

/// `auto_reconnect: None` is a scheduled reconnect: it keeps the current
/// flag and gives up if it was cleared in the meantime.
async fn connect(inner: Arc<Inner>, auto_reconnect: Option<bool>) -> Result<bool> {
    let Some(base) = inner.stream_base.as_deref() else {
        tracing::debug!("No stream URL configured, live stream disabled");
        return Ok(false);
    };

    let (url, underground, generation) = {
        let mut shared = inner.lock();
        if shared.state != ConnectionState::Disconnected {
            tracing::debug!(state = ?shared.state, "Live stream already connecting or connected");
            return Ok(false);
        }
        let auto_reconnect = match auto_reconnect {
            Some(auto_reconnect) => auto_reconnect,
            None if shared.auto_reconnect => true,
            None => return Ok(false),
        };
        let url = inner.stream_url(base, shared.underground)?;
        shared.state = ConnectionState::Connecting;
        shared.auto_reconnect = auto_reconnect;
        shared.generation += 1;
        shared.cancel_reconnect();
        (url, shared.underground, shared.generation)
    };

    tracing::debug!(url = %url, auto_reconnect, "Connecting to live stream");
    match inner.connector.open(&url).await {
        Ok(socket) => Ok(on_open(&inner, socket, underground, generation)),
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Live stream connection failed");
            on_closed(&inner, generation);
            Err(e)
        }
    }
}

fn on_open(
    inner: &Arc<Inner>,
    socket: Box<dyn DuplexSocket>,
    underground: bool,
    generation: u64,
) -> bool {
    let mut shared = inner.lock();
    if shared.generation != generation || shared.state != ConnectionState::Connecting {
        if shared.generation == generation {
            shared.state = ConnectionState::Disconnected;
        }
        drop(shared);
        tracing::debug!("Connection no longer wanted, closing it");
        tokio::spawn(async move {
            let mut socket = socket;
            let _ = socket.close().await;
        });
        return false;
    }

    let (outgoing, commands) = mpsc::unbounded_channel();
    shared.outgoing = Some(outgoing);
    shared.state = ConnectionState::Open;
    shared.cancel_heartbeat();
    shared.heartbeat = Some(spawn_heartbeat(inner));
    tokio::spawn(run_connection(inner.clone(), socket, commands, generation));
    tracing::info!(underground, "Live stream connected");

    if shared.underground != underground {
        // channel switched during the handshake
        shared.cancel_heartbeat();
        shared.close_active();
    }
    true
}

fn on_closed(inner: &Arc<Inner>, generation: u64) {
    let mut shared = inner.lock();
    if shared.generation != generation {
        return;
    }

    shared.cancel_heartbeat();
    shared.outgoing = None;
    shared.state = ConnectionState::Disconnected;

    if shared.auto_reconnect {
        schedule_reconnect(inner, &mut shared);
    }
}

fn schedule_reconnect(inner: &Arc<Inner>, shared: &mut Shared) {
    shared.cancel_reconnect();

    let delay = inner.reconnect_delay;
    let inner = inner.clone();
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Scheduling live stream reconnect");

    shared.reconnect = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        // release our own slot without aborting ourselves
        inner.lock().reconnect.take();

        if let Err(e) = connect_boxed(inner, None).await {
            tracing::warn!(error = %e, "Live stream reconnect failed");
        }
    }));
}

fn spawn_heartbeat(inner: &Arc<Inner>) -> JoinHandle<()> {
    let inner = inner.clone();
    let period = inner.heartbeat_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if inner.send_if_open(HEARTBEAT_MESSAGE) {
                tracing::trace!("Heartbeat sent");
            }
        }
    })
}

async fn run_connection(
    inner: Arc<Inner>,
    mut socket: Box<dyn DuplexSocket>,
    mut commands: mpsc::UnboundedReceiver<Outgoing>,
    generation: u64,
) {
    loop {
        tokio::select! {
            event = socket.next_event() => match event {
                Ok(SocketEvent::Message(text)) => inner.handle_message(&text),
                Ok(SocketEvent::Closed) => {
                    tracing::info!("Live stream closed by server");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Live stream transport error");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = socket.send_text(text).await {
                        tracing::error!(error = %e, "Failed to send on live stream");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    if let Err(e) = socket.close().await {
                        tracing::debug!(error = %e, "Error while closing live stream");
                    }
                    tracing::info!("Live stream closed");
                    break;
                }
            },
        }
    }

    on_closed(&inner, generation);
}

/// Builder for [`LiveStreamClient`]
pub struct StreamBuilder {
    stream_url: Option<String>,
    underground: bool,
    send_initial: bool,
    heartbeat_interval: Duration,
    reconnect_delay: Duration,
    connector: Option<Arc<dyn SocketConnector>>,
    store: Option<Arc<TrackStore>>,
}

impl Default for StreamBuilder {
    fn default() -> Self {
        Self {
            stream_url: None,
            underground: false,
            send_initial: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connector: None,
            store: None,
        }
    }
}

impl StreamBuilder {
    /// Base URL of the push server (`ws://` or `wss://`), without path
    ///
    /// Without one, [`LiveStreamClient::connect`] never connects.
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    /// Initial channel
    pub fn underground(mut self, underground: bool) -> Self {
        self.underground = underground;
        self
    }

    /// Ask the server to push the current track right after connecting
    pub fn send_initial(mut self, send_initial: bool) -> Self {
        self.send_initial = send_initial;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Use another transport than tokio-tungstenite
    pub fn connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share an existing store, e.g. with a [`TrackClient`](crate::TrackClient)
    pub fn store(mut self, store: Arc<TrackStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<LiveStreamClient> {
        let stream_base = self.stream_url.filter(|url| !url.trim().is_empty());
        if let Some(base) = &stream_base {
            endpoint(base, "/api/tracks/stream")?;
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::other("heartbeat interval must not be zero"));
        }

        Ok(LiveStreamClient {
            inner: Arc::new(Inner {
                stream_base,
                send_initial: self.send_initial,
                heartbeat_interval: self.heartbeat_interval,
                reconnect_delay: self.reconnect_delay,
                connector: self
                    .connector
                    .unwrap_or_else(|| Arc::new(WebSocketConnector)),
                store: self.store.unwrap_or_else(TrackStore::shared),
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    underground: self.underground,
                    auto_reconnect: false,
                    outgoing: None,
                    heartbeat: None,
                    reconnect: None,
                    generation: 0,
                }),
            }),
        })
    }
}
