//! Track list synchronization for station logger servers
//!
//! This crate keeps a local, newest-first list of played tracks in sync
//! with a station logger server. The list is fed from two sides:
//!
//! - **HTTP listing**: cursor-paginated pages, filtered searches, and
//!   add/update/delete requests ([`TrackClient`])
//! - **Live feed**: a WebSocket push channel announcing every newly played
//!   track ([`LiveStreamClient`]), with heartbeat, automatic reconnect and
//!   channel switching
//!
//! Both write through a shared [`TrackStore`], which keeps ids unique and
//! ignores pushed tracks while a search is displayed.
//!
//! # Example
//!
//! ```no_run
//! use tracksync::{LiveStreamClient, TrackClient, TrackStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = TrackStore::shared();
//!     store.subscribe(|tracks| {
//!         if let Some(head) = tracks.first() {
//!             println!("Latest: {} - {}", head.artist, head.title);
//!         }
//!     });
//!
//!     let mut client = TrackClient::builder()
//!         .base_url("http://localhost:8080")
//!         .store(store.clone())
//!         .build()?;
//!     client.load_more().await?;
//!
//!     let stream = LiveStreamClient::builder()
//!         .stream_url("ws://localhost:8080")
//!         .store(store)
//!         .build()?;
//!     stream.connect(true).await?;
//!     stream.request_current_track();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Configuration Extension
//!
//! With the default `trackconfig` feature, [`TrackSyncConfigExt`] reads the
//! station settings from `trackconfig::Config` and
//! [`TrackSession::from_config`] wires both clients from them.

pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod stream;
pub mod transport;

#[cfg(feature = "trackconfig")]
pub mod config_ext;

// Re-exports
pub use client::{ClientBuilder, LocalChange, SearchQuery, TrackClient};
pub use error::{Error, Result};
pub use models::{
    NewTrack, PageLinks, StreamingLink, StreamingService, Track, TrackBroadcast, TrackEdit,
    TrackKind, TrackPage, EVENT_GROUP,
};
pub use session::{SyncSettings, TrackSession};
pub use store::{TrackStore, TracksObserver};
pub use stream::{ConnectionState, LiveStreamClient, StreamBuilder};
pub use transport::{
    is_server_error, DuplexSocket, SocketConnector, SocketEvent, WebSocketConnector,
};

#[cfg(feature = "trackconfig")]
pub use config_ext::TrackSyncConfigExt;
