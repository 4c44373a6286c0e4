use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::model::{Track, TrackId, TrackSummary};

pub const DEFAULT_IDLE_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Seconds a track may go unused before a sweep evicts it. Zero disables
    /// idle eviction.
    pub idle_ttl_secs: u64,
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        Self {
            idle_ttl_secs: DEFAULT_IDLE_TTL_SECS,
        }
    }
}

impl RegistryPolicy {
    #[must_use]
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }
}

#[derive(Debug)]
struct Entry {
    track: Arc<Track>,
    last_access: Mutex<Instant>,
}

#[derive(Debug, Default)]
pub struct TrackRegistry {
    policy: RegistryPolicy,
    tracks: RwLock<HashMap<TrackId, Entry>>,
}

impl TrackRegistry {
    #[must_use]
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            tracks: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Stores `track`, assigning a fresh id if its id is already taken.
    #[instrument(skip(self, track), fields(track_id = %track.id, label = %track.source_label))]
    pub fn insert(&self, track: Track) -> Arc<Track> {
        let mut tracks = self.tracks.write();
        Self::insert_locked(&mut tracks, track)
    }

    #[instrument(skip(self, batch), fields(count = batch.len()))]
    pub fn insert_all(&self, batch: Vec<Track>) -> Vec<Arc<Track>> {
        let mut tracks = self.tracks.write();
        batch
            .into_iter()
            .map(|track| Self::insert_locked(&mut tracks, track))
            .collect()
    }

    fn insert_locked(tracks: &mut HashMap<TrackId, Entry>, mut track: Track) -> Arc<Track> {
        while tracks.contains_key(&track.id) {
            debug!(track_id = %track.id, "track id collision, regenerating");
            track.id = TrackId::generate();
        }

        let track = Arc::new(track);
        tracks.insert(
            track.id.clone(),
            Entry {
                track: Arc::clone(&track),
                last_access: Mutex::new(Instant::now()),
            },
        );
        info!(track_id = %track.id, frames = track.pcm.frames(), "track registered");
        track
    }

    #[must_use]
    pub fn get(&self, id: &TrackId) -> Option<Arc<Track>> {
        let tracks = self.tracks.read();
        let entry = tracks.get(id)?;
        *entry.last_access.lock() = Instant::now();
        Some(Arc::clone(&entry.track))
    }

    #[must_use]
    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.read().contains_key(id)
    }

    #[instrument(skip(self), fields(track_id = %id))]
    pub fn remove(&self, id: &TrackId) -> Option<Arc<Track>> {
        let removed = self.tracks.write().remove(id).map(|entry| entry.track);
        if removed.is_some() {
            info!("track removed");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<TrackSummary> {
        let tracks = self.tracks.read();
        let mut stored: Vec<&Arc<Track>> = tracks.values().map(|entry| &entry.track).collect();
        stored.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        stored.into_iter().map(|track| track.summary()).collect()
    }

    #[instrument(skip(self, now))]
    pub fn sweep_expired(&self, now: Instant) -> Vec<TrackId> {
        let Some(ttl) = self.policy.idle_ttl() else {
            return Vec::new();
        };

        let mut tracks = self.tracks.write();
        let expired: Vec<TrackId> = tracks
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(*entry.last_access.lock()) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            tracks.remove(id);
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = tracks.len(), "idle tracks evicted");
        }
        expired
    }

    pub fn sweep_expired_now(&self) -> Vec<TrackId> {
        self.sweep_expired(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pcm, TrackOrigin};

    fn track(label: &str) -> Track {
        Track::new(
            label,
            TrackOrigin::Upload {
                filename: format!("{label}.wav"),
            },
            Pcm::silent(8_000, 1, 8_000),
        )
    }

    #[test]
    fn removal_does_not_invalidate_held_reference() {
        let registry = TrackRegistry::default();
        let stored = registry.insert(track("held"));
        let id = stored.id.clone();

        let reader = registry.get(&id).expect("track should be present");
        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert_eq!(reader.pcm.frames(), 8_000);
    }

    #[test]
    fn colliding_ids_are_regenerated() {
        let registry = TrackRegistry::default();
        let first = registry.insert(track("a"));
        let mut second = track("b");
        second.id = first.id.clone();

        let stored = registry.insert(second);
        assert_ne!(stored.id, first.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn sweep_evicts_only_idle_tracks() {
        let registry = TrackRegistry::new(RegistryPolicy { idle_ttl_secs: 60 });
        let stale = registry.insert(track("stale"));
        let fresh = registry.insert(track("fresh"));

        let later = Instant::now() + Duration::from_secs(61);
        let evicted = registry.sweep_expired(later);
        assert_eq!(evicted.len(), 2);
        assert!(registry.is_empty());

        let kept = registry.insert(track("kept"));
        let evicted = registry.sweep_expired_now();
        assert!(evicted.is_empty());
        assert!(registry.contains(&kept.id));
        assert!(!registry.contains(&stale.id));
        assert!(!registry.contains(&fresh.id));
    }

    #[test]
    fn zero_ttl_disables_idle_eviction() {
        let registry = TrackRegistry::new(RegistryPolicy { idle_ttl_secs: 0 });
        registry.insert(track("forever"));
        let evicted = registry.sweep_expired(Instant::now() + Duration::from_secs(1_000_000));
        assert!(evicted.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn batch_insert_registers_everything() {
        let registry = TrackRegistry::default();
        let stored = registry.insert_all(vec![track("one"), track("two")]);
        assert_eq!(stored.len(), 2);
        assert_eq!(registry.summaries().len(), 2);
    }
}
