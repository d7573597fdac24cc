//! Shared track collection
//!
//! [`TrackStore`] owns the newest-first list of tracks that both the
//! [`TrackClient`](crate::TrackClient) and the
//! [`LiveStreamClient`](crate::LiveStreamClient) feed. It is the only place
//! the list is mutated, and it keeps track ids unique.
//!
//! Observers registered with [`TrackStore::subscribe`] receive a snapshot of
//! the list after every mutation. They are called outside of the internal
//! lock, so an observer may read the store again.

use crate::models::{Track, TrackEdit};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Callback invoked with the new contents of the list
pub type TracksObserver = Arc<dyn Fn(&[Track]) + Send + Sync>;

/// Canonical newest-first track list with id deduplication
#[derive(Default)]
pub struct TrackStore {
    tracks: RwLock<Vec<Track>>,
    searching: AtomicBool,
    observers: RwLock<Vec<TracksObserver>>,
}

impl std::fmt::Debug for TrackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackStore")
            .field("len", &self.len())
            .field("searching", &self.is_searching())
            .finish()
    }
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already wrapped for sharing between clients
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Track>> {
        self.tracks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Track>> {
        self.tracks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback notified after every change
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&[Track]) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    fn notify(&self, snapshot: Vec<Track>) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(&snapshot);
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Prepend a track pushed by the live stream
    ///
    /// Nothing happens while a search is active or when a track with the
    /// same id is already present. Returns whether the track was inserted.
    pub fn insert_from_stream(&self, track: Track) -> bool {
        if self.is_searching() {
            tracing::debug!(id = track.id, "Search active, ignoring pushed track");
            return false;
        }
        self.insert_at_head(track)
    }

    /// Prepend a track unless its id is already present
    ///
    /// Used for records created by this client, which may race with the
    /// push channel echoing the same record.
    pub fn insert_at_head(&self, track: Track) -> bool {
        let snapshot = {
            let mut tracks = self.write();
            if tracks.iter().any(|t| t.id == track.id) {
                tracing::debug!(id = track.id, "Duplicate track, not inserted");
                return false;
            }
            tracks.insert(0, track);
            tracks.clone()
        };
        self.notify(snapshot);
        true
    }

    /// Discard the list and replace it
    pub fn replace_all(&self, tracks: Vec<Track>) {
        let snapshot = {
            let mut current = self.write();
            *current = tracks;
            current.clone()
        };
        self.notify(snapshot);
    }

    /// Append an older page at the tail, keeping page order
    pub fn append_page(&self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        let snapshot = {
            let mut current = self.write();
            current.extend(tracks);
            current.clone()
        };
        self.notify(snapshot);
    }

    /// Apply an accepted edit to the record with `id`
    ///
    /// Events keep their artist and group. Returns `false` when no such
    /// record is held locally.
    pub fn apply_edit(&self, id: i64, edit: &TrackEdit) -> bool {
        let snapshot = {
            let mut tracks = self.write();
            let Some(track) = tracks.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            track.title = edit.title.clone();
            track.played_at = edit.played_at;
            if !track.is_event() {
                track.artist = edit.artist.clone();
                track.group = edit.group.clone();
            }
            tracks.clone()
        };
        self.notify(snapshot);
        true
    }

    /// Remove the record with `id`, returning whether one was removed
    pub fn remove(&self, id: i64) -> bool {
        let snapshot = {
            let mut tracks = self.write();
            let before = tracks.len();
            tracks.retain(|t| t.id != id);
            if tracks.len() == before {
                return false;
            }
            tracks.clone()
        };
        self.notify(snapshot);
        true
    }

    // ========================================================================
    // Searching flag
    // ========================================================================

    pub fn set_searching(&self, searching: bool) {
        let previous = self.searching.swap(searching, Ordering::SeqCst);
        if previous != searching {
            tracing::debug!(searching, "Searching flag changed");
        }
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Copy of the current list, newest first
    pub fn snapshot(&self) -> Vec<Track> {
        self.read().clone()
    }

    pub fn get(&self, id: i64) -> Option<Track> {
        self.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.read().iter().any(|t| t.id == id)
    }

    /// Most recent track
    pub fn head(&self) -> Option<Track> {
        self.read().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
