//! Data models for the station logger API
//!
//! Every [`Track`] held by the engine comes from one of these decoders:
//! a listing page element, the response to an add, or a push-channel
//! message. Decoding is lenient on purpose: unknown `type` and `service`
//! names fall back to [`TrackKind::Track`] and [`StreamingService::Spotify`].

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Group name reserved for event-kind records
pub const EVENT_GROUP: &str = "Event";

/// Deserialize `null` as the type's default value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize an ISO-8601 string (with or without offset) or epoch milliseconds
fn deserialize_played_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrMillis {
        String(String),
        Millis(i64),
    }

    match StringOrMillis::deserialize(deserializer)? {
        StringOrMillis::String(s) => parse_timestamp(&s)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s}"))),
        StringOrMillis::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
    }
}

fn serialize_played_at<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Parse a server timestamp; offset-less values are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Track
// ============================================================================

/// Kind of a logged record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// A played song
    #[default]
    Track,
    /// An event; `artist` holds the description and `title` is empty
    Event,
}

impl TrackKind {
    /// Wire name (`"track"` / `"event"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Track => "track",
            TrackKind::Event => "event",
        }
    }

    /// Resolve a wire name; anything unknown is a plain track
    pub fn from_name(name: &str) -> Self {
        match name {
            "event" => TrackKind::Event,
            "track" => TrackKind::Track,
            other => {
                tracing::debug!(kind = other, "Unknown track type, defaulting to track");
                TrackKind::Track
            }
        }
    }
}

impl Serialize for TrackKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TrackKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(Self::from_name).unwrap_or_default())
    }
}

/// Streaming services a track may be linked to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StreamingService {
    #[default]
    Spotify,
}

impl StreamingService {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamingService::Spotify => "spotify",
        }
    }

    /// Resolve a service name; anything unknown maps to Spotify
    pub fn from_name(name: &str) -> Self {
        if name != "spotify" {
            tracing::debug!(service = name, "Unknown streaming service, defaulting to spotify");
        }
        StreamingService::Spotify
    }
}

impl Serialize for StreamingService {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StreamingService {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(Self::from_name).unwrap_or_default())
    }
}

/// Per-service data found for a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingLink {
    /// Link to play the track on the service
    #[serde(rename = "link", default)]
    pub url: Option<String>,
    /// Low resolution album art, suitable for icons only
    #[serde(rename = "artwork", default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub service: StreamingService,
}

/// A played song or an event, as logged by the station server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Server-assigned identifier, unique and stable
    pub id: i64,
    /// Artist name, or the description for events
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist: String,
    /// Title, empty for events
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(
        rename = "time",
        deserialize_with = "deserialize_played_at",
        serialize_with = "serialize_played_at"
    )]
    pub played_at: DateTime<Utc>,
    /// Channel/playlist bucket; [`EVENT_GROUP`] marks an event
    #[serde(default, deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(rename = "type", default)]
    pub kind: TrackKind,
    /// Services the track was found on; absent services are simply missing
    #[serde(rename = "streaming", default, deserialize_with = "null_as_default")]
    pub streaming_links: Vec<StreamingLink>,
}

impl Track {
    /// Decode a single track from server JSON
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether this record is an event (checked by its group)
    pub fn is_event(&self) -> bool {
        self.group == EVENT_GROUP
    }

    /// First album art found among the streaming links
    pub fn album_art(&self) -> Option<&str> {
        self.streaming_links
            .iter()
            .find_map(|link| link.artwork_url.as_deref())
    }
}

/// A track pushed by the server on the live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackBroadcast {
    pub track: Track,
    /// `true` when sent in reply to a current-track request, `false` for a
    /// regular now-playing broadcast
    #[serde(default)]
    pub requested: bool,
}

impl TrackBroadcast {
    /// Decode a push-channel message
    ///
    /// The server sends either a bare track or a `{ track, requested }`
    /// envelope; both are accepted.
    pub fn from_message(text: &str) -> crate::Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Payload {
            Envelope(TrackBroadcast),
            Bare(Track),
        }

        Ok(match serde_json::from_str::<Payload>(text)? {
            Payload::Envelope(broadcast) => broadcast,
            Payload::Bare(track) => TrackBroadcast {
                track,
                requested: false,
            },
        })
    }
}

// ============================================================================
// Listing pages
// ============================================================================

/// One page of the cursor-paginated listing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracks: Vec<Track>,
    #[serde(rename = "_links", default)]
    pub links: PageLinks,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PageLinks {
    /// Absolute URL of the next (older) page
    #[serde(default)]
    pub next: Option<String>,
}

// ============================================================================
// Mutations
// ============================================================================

/// A record to submit with `TrackClient::add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub group: Option<String>,
    pub played_at: DateTime<Utc>,
    pub is_event: bool,
}

impl NewTrack {
    /// A played song
    pub fn song(
        title: impl Into<String>,
        artist: impl Into<String>,
        group: impl Into<String>,
        played_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            artist: Some(artist.into()),
            group: Some(group.into()),
            played_at,
            is_event: false,
        }
    }

    /// An event; the description is carried in the artist field
    pub fn event(description: impl Into<String>, played_at: DateTime<Utc>) -> Self {
        Self {
            title: None,
            artist: Some(description.into()),
            group: None,
            played_at,
            is_event: true,
        }
    }
}

/// New values for an existing record, see `TrackClient::update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEdit {
    pub title: String,
    pub artist: String,
    pub group: String,
    pub played_at: DateTime<Utc>,
}
