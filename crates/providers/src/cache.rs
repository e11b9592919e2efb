//! Response cache
//!
//! LRU memoization of synthesized audio keyed by normalized text plus the
//! voice parameters it was synthesized under. A hit returns the exact bytes
//! of the original synthesis; keys embed the voice tag so parameter changes
//! never serve stale audio.
//!
//! Recency is tracked with a lazy queue: every touch appends a stamped key
//! and eviction pops entries whose stamp is no longer current. Lookup and
//! store stay amortized O(1); both operate under one lock, so a get/put for
//! a single key is atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use echoai_core::VoiceConfig;

/// Normalize text for exact-match caching: trim and collapse internal
/// whitespace. No fuzzy matching.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Entry {
    value: Arc<Vec<u8>>,
    stamp: u64,
}

struct Inner {
    map: HashMap<String, Entry>,
    /// (key, stamp) pairs; stale pairs are skipped during eviction
    queue: VecDeque<(String, u64)>,
    clock: u64,
}

/// Shared LRU cache for synthesized audio.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                queue: VecDeque::new(),
                clock: 0,
            }),
            capacity,
        }
    }

    /// Cache key for a synthesis request.
    pub fn key(text: &str, voice: &VoiceConfig) -> String {
        format!("{}|{}", voice.cache_tag(), normalize_text(text))
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let stamp = inner.clock;
        match inner.map.get_mut(key) {
            Some(entry) => {
                entry.stamp = stamp;
                let value = Arc::clone(&entry.value);
                inner.queue.push_back((key.to_string(), stamp));
                compact(inner, self.capacity);
                metrics::counter!("echoai_cache_hits_total").increment(1);
                Some(value)
            }
            None => {
                metrics::counter!("echoai_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Insert or refresh an entry, evicting least-recently-used entries
    /// when over capacity. Returns the stored value so callers can stream
    /// the same allocation they cached.
    pub fn put(&self, key: impl Into<String>, value: Vec<u8>) -> Arc<Vec<u8>> {
        let key = key.into();
        let value = Arc::new(value);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.clock += 1;
        let stamp = inner.clock;
        inner.queue.push_back((key.clone(), stamp));
        inner.map.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                stamp,
            },
        );

        while inner.map.len() > self.capacity {
            let Some((candidate, candidate_stamp)) = inner.queue.pop_front() else {
                break;
            };
            let current = inner.map.get(&candidate).map(|e| e.stamp);
            if current == Some(candidate_stamp) {
                inner.map.remove(&candidate);
                metrics::counter!("echoai_cache_evictions_total").increment(1);
            }
        }
        compact(inner, self.capacity);
        value
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop stale recency pairs once the queue outgrows the map. Keeps the
/// queue bounded under hit-heavy workloads, where `get` appends pairs that
/// `put`'s eviction loop would otherwise never drain.
fn compact(inner: &mut Inner, capacity: usize) {
    if inner.queue.len() <= capacity.saturating_mul(2) {
        return;
    }
    let Inner { map, queue, .. } = inner;
    queue.retain(|(key, stamp)| map.get(key).map(|e| e.stamp) == Some(*stamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_exact_match_only() {
        assert_eq!(normalize_text("  hello   there \n"), "hello there");
        assert_ne!(normalize_text("Hello there"), normalize_text("hello there"));
    }

    #[test]
    fn hit_returns_identical_bytes() {
        let cache = ResponseCache::new(4);
        let voice = VoiceConfig::new("aria");
        let key = ResponseCache::key("hello   there", &voice);
        cache.put(key.clone(), vec![1, 2, 3]);

        let hit = cache.get(&key).unwrap();
        assert_eq!(*hit, vec![1, 2, 3]);

        // Same normalized text, same voice: same key
        assert_eq!(key, ResponseCache::key(" hello there ", &voice));
    }

    #[test]
    fn voice_change_misses() {
        let cache = ResponseCache::new(4);
        let aria = VoiceConfig::new("aria");
        let nova = VoiceConfig::new("nova");
        cache.put(ResponseCache::key("hi", &aria), vec![7]);

        assert!(cache.get(&ResponseCache::key("hi", &nova)).is_none());
    }

    #[test]
    fn lru_eviction_drops_coldest() {
        let cache = ResponseCache::new(2);
        cache.put("a", vec![1]);
        cache.put("b", vec![2]);

        // Touch "a" so "b" becomes least recently used
        assert!(cache.get("a").is_some());
        cache.put("c", vec![3]);

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn hit_heavy_workload_keeps_recency_queue_bounded() {
        let cache = ResponseCache::new(4);
        for i in 0..4u8 {
            cache.put(format!("k{i}"), vec![i]);
        }

        for _ in 0..1_000 {
            assert!(cache.get("k0").is_some());
        }

        // Compaction keeps the queue within twice the capacity
        assert!(cache.inner.lock().queue.len() <= 8);
        assert_eq!(cache.len(), 4);
        assert!(cache.get("k3").is_some());
    }

    #[test]
    fn refresh_does_not_double_count() {
        let cache = ResponseCache::new(2);
        cache.put("a", vec![1]);
        cache.put("a", vec![1, 1]);
        cache.put("b", vec![2]);

        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get("a").unwrap(), vec![1, 1]);
    }
}
