//! HTTP client for the station logger API
//!
//! [`TrackClient`] walks the cursor-paginated track listing, runs filtered
//! searches and submits add/update/delete requests. Every accepted change is
//! reflected in the shared [`TrackStore`]; a rejected request leaves it as
//! it was.
//!
//! # Example
//!
//! ```no_run
//! use tracksync::{SearchQuery, TrackClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = TrackClient::builder()
//!         .base_url("http://localhost:8080")
//!         .list_count(50)
//!         .build()?;
//!
//!     client.load_more().await?;
//!     client.load_more().await?;
//!     println!("{} tracks loaded", client.store().len());
//!
//!     client.search(&SearchQuery::new().artist("Stereolab")).await?;
//!     Ok(())
//! }
//! ```

use crate::error::Result;
use crate::models::{NewTrack, Track, TrackEdit, TrackPage, EVENT_GROUP};
use crate::store::TrackStore;
use crate::transport::{endpoint, require_ok};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default station server URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default number of tracks per page
pub const DEFAULT_LIST_COUNT: u32 = 25;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("tracksync/", env!("CARGO_PKG_VERSION"));

/// Effect of an accepted mutation on the local list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    /// The local record was updated or removed
    Applied,
    /// The server accepted the change but no local record had that id
    NotPresent,
}

/// Filters for [`TrackClient::search`]
///
/// Empty strings count as absent. The date range is only applied when both
/// bounds are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Inclusive range of play times
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    fn artist_filter(&self) -> Option<&str> {
        self.artist.as_deref().filter(|s| !s.is_empty())
    }

    fn title_filter(&self) -> Option<&str> {
        self.title.as_deref().filter(|s| !s.is_empty())
    }

    fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.start.zip(self.end)
    }

    /// Whether any filter would be sent
    pub fn is_filtered(&self) -> bool {
        self.artist_filter().is_some()
            || self.title_filter().is_some()
            || self.date_range().is_some()
    }
}

#[derive(Serialize)]
struct AddBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artist: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    time: i64,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    id: i64,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    artist: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    time: i64,
}

/// Station logger HTTP client
///
/// Listing calls take `&mut self` since they move the page cursor; the
/// mutation calls only touch the shared store and take `&self`.
#[derive(Debug)]
pub struct TrackClient {
    client: Client,
    base_url: String,
    underground: bool,
    list_count: u32,
    timeout: Option<Duration>,
    store: Arc<TrackStore>,
    first_page: Url,
    /// `None` once the server stops returning a next page
    cursor: Option<Url>,
    /// The next page starts a fresh listing and replaces the list
    fresh: bool,
}

impl TrackClient {
    /// Create a client with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn underground(&self) -> bool {
        self.underground
    }

    pub fn list_count(&self) -> u32 {
        self.list_count
    }

    /// Shared track list fed by this client
    pub fn store(&self) -> &Arc<TrackStore> {
        &self.store
    }

    /// Next page to be fetched by [`load_more`](Self::load_more)
    pub fn cursor(&self) -> Option<&Url> {
        self.cursor.as_ref()
    }

    /// URL of the first, unfiltered page
    pub fn first_page_url(&self) -> &Url {
        &self.first_page
    }

    fn send(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        let mut url = endpoint(&self.base_url, path)?;
        url.query_pairs_mut()
            .append_pair("underground", &self.underground.to_string());
        Ok(url)
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Point the cursor back at the first page
    ///
    /// The next [`load_more`](Self::load_more) then replaces the list with
    /// the first page instead of appending to it, and ends any search.
    pub fn reset(&mut self) {
        self.cursor = Some(self.first_page.clone());
        self.fresh = true;
    }

    /// Fetch the page at the cursor and append it to the list
    ///
    /// Returns the number of tracks received. Once the listing is exhausted
    /// this returns `Ok(0)` without a request.
    pub async fn load_more(&mut self) -> Result<usize> {
        let Some(url) = self.cursor.clone() else {
            tracing::debug!("No further pages to load");
            return Ok(0);
        };
        let replace = self.fresh;
        if replace && url == self.first_page {
            // back on the unfiltered listing
            self.store.set_searching(false);
        }
        self.load_page(url, replace).await
    }

    /// Reload the first unfiltered page, replacing the list
    pub async fn refresh(&mut self) -> Result<usize> {
        self.store.set_searching(false);
        self.reset();
        let url = self.first_page.clone();
        self.load_page(url, true).await
    }

    /// Run a filtered listing, replacing the list
    ///
    /// While any filter is active the store is flagged as searching, so
    /// pushed tracks are ignored. An unfiltered query is a
    /// [`refresh`](Self::refresh).
    pub async fn search(&mut self, query: &SearchQuery) -> Result<usize> {
        if !query.is_filtered() {
            return self.refresh().await;
        }

        let mut url = list_url(&self.base_url, self.list_count, self.underground)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(artist) = query.artist_filter() {
                pairs.append_pair("artist", artist);
            }
            if let Some(title) = query.title_filter() {
                pairs.append_pair("song", title);
            }
            if let Some((start, end)) = query.date_range() {
                pairs.append_pair("start", &start.timestamp_millis().to_string());
                pairs.append_pair("end", &end.timestamp_millis().to_string());
            }
        }

        // set before the request so racing pushes are already dropped
        self.store.set_searching(true);
        self.load_page(url, true).await
    }

    async fn load_page(&mut self, url: Url, replace: bool) -> Result<usize> {
        tracing::debug!(url = %url, replace, "Fetching track page");

        let response = self.send(self.client.get(url.clone())).send().await?;
        let page: TrackPage = require_ok(response, "tracks/list").await?.json().await?;

        let next = match page.links.next.as_deref() {
            Some(next) => Some(url.join(next)?),
            None => None,
        };

        let count = page.tracks.len();
        self.cursor = next;
        self.fresh = false;
        if replace {
            self.store.replace_all(page.tracks);
        } else {
            self.store.append_page(page.tracks);
        }

        tracing::debug!(count, next = ?self.cursor.as_ref().map(Url::as_str), "Track page applied");
        Ok(count)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Submit a new record and put the created track at the head of the list
    pub async fn add(&self, new_track: NewTrack) -> Result<Track> {
        let body = if new_track.is_event {
            AddBody {
                title: Some(""),
                artist: new_track.artist.as_deref(),
                group: Some(EVENT_GROUP),
                time: new_track.played_at.timestamp_millis(),
            }
        } else {
            AddBody {
                title: new_track.title.as_deref(),
                artist: new_track.artist.as_deref(),
                group: new_track.group.as_deref(),
                time: new_track.played_at.timestamp_millis(),
            }
        };

        let url = self.api_url("/api/tracks/add")?;
        tracing::debug!(url = %url, event = new_track.is_event, "Adding track");

        let response = self.send(self.client.post(url).json(&body)).send().await?;
        let track: Track = require_ok(response, "tracks/add").await?.json().await?;

        tracing::info!(id = track.id, artist = %track.artist, title = %track.title, "Track added");
        self.store.insert_at_head(track.clone());
        Ok(track)
    }

    /// Edit an existing record
    ///
    /// Artist and group are never sent for events, and the local copy of an
    /// event keeps them.
    pub async fn update(&self, id: i64, edit: TrackEdit) -> Result<LocalChange> {
        let is_event = self
            .store
            .get(id)
            .map(|track| track.is_event())
            .unwrap_or(edit.group == EVENT_GROUP);

        let body = UpdateBody {
            id,
            title: &edit.title,
            artist: (!is_event).then_some(edit.artist.as_str()),
            group: (!is_event).then_some(edit.group.as_str()),
            time: edit.played_at.timestamp_millis(),
        };

        let url = self.api_url("/api/tracks/update")?;
        tracing::debug!(url = %url, id, event = is_event, "Updating track");

        let response = self.send(self.client.patch(url).json(&body)).send().await?;
        require_ok(response, "tracks/update").await?;

        if self.store.apply_edit(id, &edit) {
            Ok(LocalChange::Applied)
        } else {
            tracing::warn!(id, "Updated track is not in the local list");
            Ok(LocalChange::NotPresent)
        }
    }

    /// Delete a record by id
    pub async fn delete(&self, track: &Track) -> Result<LocalChange> {
        let mut url = endpoint(&self.base_url, "/api/tracks/delete")?;
        url.query_pairs_mut()
            .append_pair("id", &track.id.to_string())
            .append_pair("underground", &self.underground.to_string());
        tracing::debug!(url = %url, id = track.id, "Deleting track");

        let response = self.send(self.client.delete(url)).send().await?;
        require_ok(response, "tracks/delete").await?;

        if self.store.remove(track.id) {
            Ok(LocalChange::Applied)
        } else {
            tracing::warn!(id = track.id, "Deleted track is not in the local list");
            Ok(LocalChange::NotPresent)
        }
    }

    /// List the known track groups
    ///
    /// A non-200 answer yields an empty list.
    pub async fn groups(&self) -> Result<Vec<String>> {
        let url = self.api_url("/api/groups/list")?;
        tracing::debug!(url = %url, "Fetching groups");

        let response = self.send(self.client.get(url)).send().await?;
        if response.status() != StatusCode::OK {
            tracing::warn!(status = response.status().as_u16(), "Groups listing rejected");
            return Ok(Vec::new());
        }
        Ok(response.json().await?)
    }
}

fn list_url(base_url: &str, list_count: u32, underground: bool) -> Result<Url> {
    let mut url = endpoint(base_url, "/api/tracks/list")?;
    url.query_pairs_mut()
        .append_pair("count", &list_count.to_string())
        .append_pair("underground", &underground.to_string());
    Ok(url)
}

/// Builder for [`TrackClient`]
pub struct ClientBuilder {
    client: Option<Client>,
    base_url: String,
    underground: bool,
    list_count: u32,
    timeout: Option<Duration>,
    user_agent: String,
    store: Option<Arc<TrackStore>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            underground: false,
            list_count: DEFAULT_LIST_COUNT,
            timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            store: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Target the underground channel instead of FM
    pub fn underground(mut self, underground: bool) -> Self {
        self.underground = underground;
        self
    }

    /// Number of tracks requested per page
    pub fn list_count(mut self, count: u32) -> Self {
        self.list_count = count;
        self
    }

    /// Per-request timeout (none by default)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Share an existing store, e.g. with a [`LiveStreamClient`](crate::LiveStreamClient)
    pub fn store(mut self, store: Arc<TrackStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<TrackClient> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder().user_agent(&self.user_agent).build()?,
        };

        let first_page = list_url(&self.base_url, self.list_count, self.underground)?;

        Ok(TrackClient {
            client,
            base_url: self.base_url,
            underground: self.underground,
            list_count: self.list_count,
            timeout: self.timeout,
            store: self.store.unwrap_or_else(TrackStore::shared),
            cursor: Some(first_page.clone()),
            first_page,
            fresh: true,
        })
    }
}
