//! Station settings stored in trackconfig
//!
//! The [`TrackSyncConfigExt`] trait adds typed accessors for the `station`
//! section of `trackconfig::Config`:
//!
//! ```yaml
//! station:
//!   server_url: http://localhost:8080
//!   stream_url: ws://localhost:8080   # empty disables the live stream
//!   underground: false
//!   list_count: 25
//!   stream:
//!     send_initial: true
//!     auto_reconnect: true
//!     heartbeat_secs: 50
//!     reconnect_delay_secs: 3
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trackconfig::get_config;
//! use tracksync::{SyncSettings, TrackSyncConfigExt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! config.set_station_underground(true)?;
//!
//! let settings = SyncSettings::from_config(&config)?;
//! let client = settings.client_builder().build()?;
//! # Ok(())
//! # }
//! ```

use crate::client::{DEFAULT_BASE_URL, DEFAULT_LIST_COUNT};
use crate::session::SyncSettings;
use crate::stream::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RECONNECT_DELAY};
use anyhow::Result;
use serde_yaml::Value;
use std::time::Duration;
use trackconfig::Config;

const SERVER_URL: &[&str] = &["station", "server_url"];
const STREAM_URL: &[&str] = &["station", "stream_url"];
const UNDERGROUND: &[&str] = &["station", "underground"];
const LIST_COUNT: &[&str] = &["station", "list_count"];
const SEND_INITIAL: &[&str] = &["station", "stream", "send_initial"];
const AUTO_RECONNECT: &[&str] = &["station", "stream", "auto_reconnect"];
const HEARTBEAT_SECS: &[&str] = &["station", "stream", "heartbeat_secs"];
const RECONNECT_DELAY_SECS: &[&str] = &["station", "stream", "reconnect_delay_secs"];

/// Extension trait for the station settings in `trackconfig::Config`
///
/// Missing or malformed values read as their defaults.
pub trait TrackSyncConfigExt {
    /// Base URL of the HTTP API
    fn get_station_server_url(&self) -> Result<String>;
    fn set_station_server_url(&self, url: &str) -> Result<()>;

    /// Base URL of the push channel, `None` when empty
    fn get_station_stream_url(&self) -> Result<Option<String>>;
    fn set_station_stream_url(&self, url: &str) -> Result<()>;

    fn get_station_underground(&self) -> Result<bool>;
    fn set_station_underground(&self, underground: bool) -> Result<()>;

    /// Page size for listings
    fn get_station_list_count(&self) -> Result<u32>;
    fn set_station_list_count(&self, count: u32) -> Result<()>;

    fn get_stream_send_initial(&self) -> Result<bool>;
    fn set_stream_send_initial(&self, send_initial: bool) -> Result<()>;

    fn get_stream_auto_reconnect(&self) -> Result<bool>;
    fn set_stream_auto_reconnect(&self, auto_reconnect: bool) -> Result<()>;

    fn get_stream_heartbeat_interval(&self) -> Result<Duration>;
    fn set_stream_heartbeat_interval(&self, interval: Duration) -> Result<()>;

    fn get_stream_reconnect_delay(&self) -> Result<Duration>;
    fn set_stream_reconnect_delay(&self, delay: Duration) -> Result<()>;
}

fn get_bool(config: &Config, path: &[&str], default: bool) -> bool {
    match config.get_value(path) {
        Ok(Value::Bool(b)) => b,
        Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

impl TrackSyncConfigExt for Config {
    fn get_station_server_url(&self) -> Result<String> {
        Ok(self.get_string_or(SERVER_URL, DEFAULT_BASE_URL))
    }

    fn set_station_server_url(&self, url: &str) -> Result<()> {
        self.set_value(SERVER_URL, Value::String(url.to_string()))
    }

    fn get_station_stream_url(&self) -> Result<Option<String>> {
        let url = self.get_string_or(STREAM_URL, "");
        Ok(Some(url).filter(|u| !u.trim().is_empty()))
    }

    fn set_station_stream_url(&self, url: &str) -> Result<()> {
        self.set_value(STREAM_URL, Value::String(url.to_string()))
    }

    fn get_station_underground(&self) -> Result<bool> {
        Ok(get_bool(self, UNDERGROUND, false))
    }

    fn set_station_underground(&self, underground: bool) -> Result<()> {
        self.set_value(UNDERGROUND, Value::Bool(underground))
    }

    fn get_station_list_count(&self) -> Result<u32> {
        let count = self.get_u64_or(LIST_COUNT, DEFAULT_LIST_COUNT as u64);
        Ok(u32::try_from(count)
            .ok()
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_LIST_COUNT))
    }

    fn set_station_list_count(&self, count: u32) -> Result<()> {
        self.set_u64(LIST_COUNT, count as u64)
    }

    fn get_stream_send_initial(&self) -> Result<bool> {
        Ok(get_bool(self, SEND_INITIAL, true))
    }

    fn set_stream_send_initial(&self, send_initial: bool) -> Result<()> {
        self.set_value(SEND_INITIAL, Value::Bool(send_initial))
    }

    fn get_stream_auto_reconnect(&self) -> Result<bool> {
        Ok(get_bool(self, AUTO_RECONNECT, true))
    }

    fn set_stream_auto_reconnect(&self, auto_reconnect: bool) -> Result<()> {
        self.set_value(AUTO_RECONNECT, Value::Bool(auto_reconnect))
    }

    fn get_stream_heartbeat_interval(&self) -> Result<Duration> {
        let secs = self.get_u64_or(HEARTBEAT_SECS, DEFAULT_HEARTBEAT_INTERVAL.as_secs());
        if secs == 0 {
            return Ok(DEFAULT_HEARTBEAT_INTERVAL);
        }
        Ok(Duration::from_secs(secs))
    }

    fn set_stream_heartbeat_interval(&self, interval: Duration) -> Result<()> {
        self.set_u64(HEARTBEAT_SECS, interval.as_secs())
    }

    fn get_stream_reconnect_delay(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_u64_or(
            RECONNECT_DELAY_SECS,
            DEFAULT_RECONNECT_DELAY.as_secs(),
        )))
    }

    fn set_stream_reconnect_delay(&self, delay: Duration) -> Result<()> {
        self.set_u64(RECONNECT_DELAY_SECS, delay.as_secs())
    }
}

impl SyncSettings {
    /// Read the `station` section
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            server_url: config.get_station_server_url()?,
            stream_url: config.get_station_stream_url()?,
            underground: config.get_station_underground()?,
            list_count: config.get_station_list_count()?,
            send_initial: config.get_stream_send_initial()?,
            auto_reconnect: config.get_stream_auto_reconnect()?,
            heartbeat_interval: config.get_stream_heartbeat_interval()?,
            reconnect_delay: config.get_stream_reconnect_delay()?,
        })
    }
}
