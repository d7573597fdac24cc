//! Listing and live feed wired to one track list
//!
//! [`TrackSession`] builds a [`TrackClient`] and a [`LiveStreamClient`] that
//! share a single [`TrackStore`], so pages, local edits and pushed tracks
//! all land in the same newest-first list.
//!
//! # Example
//!
//! ```no_run
//! use tracksync::{SyncSettings, TrackSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SyncSettings {
//!         stream_url: Some("ws://localhost:8080".into()),
//!         ..SyncSettings::default()
//!     };
//!     let mut session = TrackSession::new(settings)?;
//!     session.store().subscribe(|tracks| println!("{} tracks", tracks.len()));
//!
//!     session.start().await?;
//!     Ok(())
//! }
//! ```

use crate::client::{ClientBuilder, TrackClient, DEFAULT_BASE_URL, DEFAULT_LIST_COUNT};
use crate::error::Result;
use crate::store::TrackStore;
use crate::stream::{
    LiveStreamClient, StreamBuilder, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_DELAY,
};
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for both clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub server_url: String,
    /// `None` disables the live stream
    pub stream_url: Option<String>,
    pub underground: bool,
    pub list_count: u32,
    pub send_initial: bool,
    pub auto_reconnect: bool,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_BASE_URL.to_string(),
            stream_url: None,
            underground: false,
            list_count: DEFAULT_LIST_COUNT,
            send_initial: true,
            auto_reconnect: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl SyncSettings {
    /// Builder for a [`TrackClient`] using these settings
    pub fn client_builder(&self) -> ClientBuilder {
        TrackClient::builder()
            .base_url(self.server_url.clone())
            .underground(self.underground)
            .list_count(self.list_count)
    }

    /// Builder for a [`LiveStreamClient`] using these settings
    pub fn stream_builder(&self) -> StreamBuilder {
        let builder = LiveStreamClient::builder()
            .underground(self.underground)
            .send_initial(self.send_initial)
            .heartbeat_interval(self.heartbeat_interval)
            .reconnect_delay(self.reconnect_delay);
        match &self.stream_url {
            Some(url) => builder.stream_url(url.clone()),
            None => builder,
        }
    }
}

/// A [`TrackClient`] and a [`LiveStreamClient`] sharing one [`TrackStore`]
#[derive(Debug)]
pub struct TrackSession {
    settings: SyncSettings,
    client: TrackClient,
    stream: LiveStreamClient,
}

impl TrackSession {
    pub fn new(settings: SyncSettings) -> Result<Self> {
        let store = TrackStore::shared();
        let client = settings.client_builder().store(store.clone()).build()?;
        let stream = settings.stream_builder().store(store).build()?;
        Ok(Self {
            settings,
            client,
            stream,
        })
    }

    /// Build a session from the `station` section of the configuration
    #[cfg(feature = "trackconfig")]
    pub fn from_config(config: &trackconfig::Config) -> Result<Self> {
        Self::new(SyncSettings::from_config(config)?)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<TrackStore> {
        self.client.store()
    }

    pub fn client(&self) -> &TrackClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut TrackClient {
        &mut self.client
    }

    pub fn stream(&self) -> &LiveStreamClient {
        &self.stream
    }

    pub fn underground(&self) -> bool {
        self.settings.underground
    }

    /// Load the first page, then open the live stream
    ///
    /// Returns whether the live stream was opened.
    pub async fn start(&mut self) -> Result<bool> {
        self.client.refresh().await?;
        self.stream.connect(self.settings.auto_reconnect).await
    }

    /// Move both the listing and the live stream to another channel
    ///
    /// The list is reloaded from the first page of the new channel. Returns
    /// `Ok(false)` if `underground` is already selected.
    pub async fn set_channel(&mut self, underground: bool) -> Result<bool> {
        if self.settings.underground == underground {
            return Ok(false);
        }

        self.settings.underground = underground;
        self.client = self
            .settings
            .client_builder()
            .store(self.stream.store().clone())
            .build()?;
        self.stream.set_channel(underground);
        self.client.refresh().await?;
        Ok(true)
    }

    /// Close the live stream without reconnecting
    pub fn shutdown(&self) {
        self.stream.disconnect();
    }
}
