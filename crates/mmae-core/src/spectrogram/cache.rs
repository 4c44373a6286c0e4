use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{RenderError, RenderedSpectrogram, SpectrogramConfig, render};
use crate::{
    model::{Track, TrackId},
    registry::TrackRegistry,
};

/// Bounded memo of rendered images keyed by track and render settings.
/// Entries are evicted oldest-first once `capacity` is reached.
#[derive(Debug)]
pub struct SpectrogramCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, (TrackId, Arc<RenderedSpectrogram>)>,
    order: VecDeque<String>,
}

impl SpectrogramCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A render that finishes after its track left `registry` is returned
    /// but not cached, so a concurrent `purge_track` is never undone.
    pub fn get_or_render(
        &self,
        track: &Track,
        config: &SpectrogramConfig,
        registry: &TrackRegistry,
    ) -> Result<Arc<RenderedSpectrogram>, RenderError> {
        config.validate()?;
        let key = cache_key(&track.id, config)?;

        if let Some((_, rendered)) = self.state.lock().entries.get(&key) {
            debug!(track_id = %track.id, "spectrogram cache hit");
            return Ok(Arc::clone(rendered));
        }

        let rendered = Arc::new(render(&track.pcm, config)?);
        if self.capacity == 0 {
            return Ok(rendered);
        }

        let mut state = self.state.lock();
        if !registry.contains(&track.id) {
            debug!(track_id = %track.id, "track removed during render; not caching");
            return Ok(rendered);
        }
        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.capacity {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
            }
            state.order.push_back(key.clone());
            state
                .entries
                .insert(key, (track.id.clone(), Arc::clone(&rendered)));
        }
        Ok(rendered)
    }

    pub fn purge_track(&self, id: &TrackId) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, (owner, _)| owner != id);
        let CacheState { entries, order } = &mut *state;
        order.retain(|key| entries.contains_key(key));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(id: &TrackId, config: &SpectrogramConfig) -> Result<String, RenderError> {
    let settings = serde_json::to_vec(config)
        .map_err(|error| RenderError::InvalidConfig(error.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(&settings);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Pcm, TrackOrigin},
        registry::RegistryPolicy,
    };

    fn track(label: &str) -> Track {
        Track::new(
            label,
            TrackOrigin::Upload {
                filename: format!("{label}.wav"),
            },
            Pcm::silent(8_000, 1, 8_000),
        )
    }

    fn registered(registry: &TrackRegistry, label: &str) -> Arc<Track> {
        registry.insert(track(label))
    }

    fn small_config() -> SpectrogramConfig {
        SpectrogramConfig {
            window_size: 256,
            hop_size: 128,
            max_width: 32,
            max_height: 16,
            ..SpectrogramConfig::default()
        }
    }

    #[test]
    fn repeated_render_is_served_from_cache() {
        let registry = TrackRegistry::new(RegistryPolicy::default());
        let cache = SpectrogramCache::new(4);
        let track = registered(&registry, "a");
        let first = cache
            .get_or_render(&track, &small_config(), &registry)
            .expect("render");
        let second = cache
            .get_or_render(&track, &small_config(), &registry)
            .expect("render");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest_and_purge_drops_track_entries() {
        let registry = TrackRegistry::new(RegistryPolicy::default());
        let cache = SpectrogramCache::new(2);
        let a = registered(&registry, "a");
        let b = registered(&registry, "b");
        let wide = small_config().with_output_size(Some(8), None);
        cache.get_or_render(&a, &small_config(), &registry).expect("render");
        cache.get_or_render(&a, &wide, &registry).expect("render");
        cache.get_or_render(&b, &small_config(), &registry).expect("render");
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.purge_track(&a.id), 1);
        assert_eq!(cache.purge_track(&b.id), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn render_finishing_after_removal_is_not_cached() {
        let registry = TrackRegistry::new(RegistryPolicy::default());
        let cache = SpectrogramCache::new(4);
        let track = registered(&registry, "gone");

        // Removal and purge land while the render holds its own Arc.
        registry.remove(&track.id);
        cache.purge_track(&track.id);

        let rendered = cache
            .get_or_render(&track, &small_config(), &registry)
            .expect("render");
        assert!(rendered.png.starts_with(b"\x89PNG"));
        assert!(cache.is_empty());
    }
}
