//! Session registry: the only state shared across concurrent requests.
//!
//! # Responsibilities
//! - Map session id → live channel
//! - Guarantee a single channel per id under concurrent creation
//! - Hand out snapshots for drain and reaping
//!
//! # Design Decisions
//! - DashMap shards give per-entry locking; no global lock across a request
//! - Creation runs inside the shard's entry lock, and channel construction is
//!   synchronous, so the lock is never held across an await
//! - Once sealed (drain started) no new sessions are admitted
//! - A session with an open push stream is never idle

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;
use crate::session::SessionId;
use crate::transport::{Channel, TransportError};

#[derive(Debug)]
struct Activity {
    /// Milliseconds since the registry epoch.
    last_active_ms: AtomicU64,
    open_streams: AtomicUsize,
}

impl Activity {
    fn touch(&self, now_ms: u64) {
        self.last_active_ms.fetch_max(now_ms, Ordering::Relaxed);
    }
}

/// One registered session.
pub struct SessionEntry {
    id: SessionId,
    channel: Arc<dyn Channel>,
    created_at: SystemTime,
    activity: Arc<Activity>,
}

impl SessionEntry {
    fn new(id: SessionId, channel: Arc<dyn Channel>, now_ms: u64) -> Self {
        Self {
            id,
            channel,
            created_at: SystemTime::now(),
            activity: Arc::new(Activity {
                last_active_ms: AtomicU64::new(now_ms),
                open_streams: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Number of push streams currently open on this session.
    pub fn open_streams(&self) -> usize {
        self.activity.open_streams.load(Ordering::SeqCst)
    }

    fn touch(&self, now_ms: u64) {
        self.activity.touch(now_ms);
    }

    fn is_idle(&self, now_ms: u64, max_idle: Duration) -> bool {
        if self.open_streams() > 0 {
            return false;
        }
        let last = self.activity.last_active_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last)) >= max_idle
    }
}

/// Keeps a session busy while a push stream is open on it.
///
/// Dropping the lease counts as activity, so the idle clock restarts when
/// the stream ends.
#[derive(Debug)]
pub struct StreamLease {
    activity: Arc<Activity>,
    epoch: Instant,
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.activity.open_streams.fetch_sub(1, Ordering::SeqCst);
        self.activity.touch(self.epoch.elapsed().as_millis() as u64);
    }
}

fn same_channel(a: &Arc<dyn Channel>, b: &Arc<dyn Channel>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("closed", &self.channel.is_closed())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Drain has started.
    #[error("registry is sealed; server is shutting down")]
    Sealed,

    #[error("failed to open channel: {0}")]
    Open(#[from] TransportError),
}

/// Concurrency-safe map from session id to live channel.
///
/// Owned by the server instance and shared through `Arc`.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    sealed: AtomicBool,
    epoch: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            sealed: AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Return the live channel for `id`, constructing it with `open` if none exists.
    ///
    /// `open` runs at most once per id across all concurrent callers; losers of
    /// the race get the winner's channel and `false`. It runs under the shard
    /// lock and must not call back into the registry.
    pub fn get_or_create<F>(
        &self,
        id: &SessionId,
        open: F,
    ) -> Result<(Arc<dyn Channel>, bool), RegistryError>
    where
        F: FnOnce(&SessionId) -> Result<Arc<dyn Channel>, TransportError>,
    {
        let now = self.now_ms();
        let outcome = match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut slot) if slot.get().channel.is_closed() => {
                // Closed out of band; the id is free again.
                if self.is_sealed() {
                    slot.remove();
                    Err(RegistryError::Sealed)
                } else {
                    let channel = open(id)?;
                    slot.insert(SessionEntry::new(id.clone(), Arc::clone(&channel), now));
                    Ok((channel, true))
                }
            }
            Entry::Occupied(slot) => {
                let entry = slot.get();
                entry.touch(now);
                Ok((Arc::clone(&entry.channel), false))
            }
            Entry::Vacant(slot) => {
                if self.is_sealed() {
                    Err(RegistryError::Sealed)
                } else {
                    let channel = open(id)?;
                    slot.insert(SessionEntry::new(id.clone(), Arc::clone(&channel), now));
                    Ok((channel, true))
                }
            }
        };

        if let Ok((_, true)) = &outcome {
            tracing::info!(session = %id, "Session created");
            metrics::record_session_created();
        }
        self.publish_size();
        outcome
    }

    /// Look up a live channel. Closed channels are evicted, never returned.
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn Channel>> {
        {
            let entry = self.sessions.get(id)?;
            if !entry.channel.is_closed() {
                entry.touch(self.now_ms());
                return Some(Arc::clone(&entry.channel));
            }
        }
        if self.sessions.remove_if(id, |_, e| e.channel.is_closed()).is_some() {
            self.publish_size();
        }
        None
    }

    /// Remove `id`. Removing an unknown id is not an error.
    pub fn remove(&self, id: &SessionId) -> bool {
        self.take(id).is_some()
    }

    /// Remove `id` and hand the entry to the caller, who becomes responsible for closing it.
    pub fn take(&self, id: &SessionId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(id).map(|(_, entry)| entry);
        if entry.is_some() {
            self.publish_size();
        }
        entry
    }

    /// Remove `id` only if it still holds `channel`.
    ///
    /// A caller that only knows the channel it created uses this so it never
    /// takes out a session someone else re-created under the same id.
    pub fn take_if_same(&self, id: &SessionId, channel: &Arc<dyn Channel>) -> Option<SessionEntry> {
        let entry = self
            .sessions
            .remove_if(id, |_, e| same_channel(&e.channel, channel))
            .map(|(_, entry)| entry);
        if entry.is_some() {
            self.publish_size();
        }
        entry
    }

    /// Remove `id` only if it has been idle for at least `max_idle` and has
    /// no open push stream.
    pub fn take_if_idle(&self, id: &SessionId, max_idle: Duration) -> Option<SessionEntry> {
        let now = self.now_ms();
        let entry = self
            .sessions
            .remove_if(id, |_, e| e.is_idle(now, max_idle))
            .map(|(_, entry)| entry);
        if entry.is_some() {
            self.publish_size();
        }
        entry
    }

    /// Look up a live channel for a push stream and mark the session busy
    /// until the returned lease is dropped.
    pub fn lease_stream(&self, id: &SessionId) -> Option<(Arc<dyn Channel>, StreamLease)> {
        let entry = self.sessions.get(id)?;
        if entry.channel.is_closed() {
            return None;
        }
        entry.activity.open_streams.fetch_add(1, Ordering::SeqCst);
        entry.touch(self.now_ms());
        let lease = StreamLease {
            activity: Arc::clone(&entry.activity),
            epoch: self.epoch,
        };
        Some((Arc::clone(&entry.channel), lease))
    }

    /// Ids of sessions idle for at least `max_idle` with no open push stream.
    pub fn idle_sessions(&self, max_idle: Duration) -> Vec<SessionId> {
        let now = self.now_ms();
        self.sessions
            .iter()
            .filter(|e| e.is_idle(now, max_idle))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Point-in-time copy of every registered session.
    pub fn snapshot(&self) -> Vec<(SessionId, Arc<dyn Channel>)> {
        self.sessions
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.channel)))
            .collect()
    }

    /// Visit every session in a snapshot. The visitor may remove entries.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&SessionId, &Arc<dyn Channel>),
    {
        for (id, channel) in self.snapshot() {
            visit(&id, &channel);
        }
    }

    /// Remove every entry, returning them so the caller can close any still open.
    pub fn clear(&self) -> Vec<SessionEntry> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let removed = ids
            .iter()
            .filter_map(|id| self.sessions.remove(id).map(|(_, entry)| entry))
            .collect();
        self.publish_size();
        removed
    }

    /// Refuse all further creations.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn publish_size(&self) {
        metrics::record_active_sessions(self.sessions.len());
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
