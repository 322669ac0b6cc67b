use std::time::Instant;

use dashmap::DashMap;

/// Bounds how many session agent instances are kept warm at once
/// before the least-recently-used one is evicted.
const DEFAULT_CAPACITY: usize = 256;

struct Entry<T> {
    instance: T,
    model_id: String,
    last_used: Instant,
}

/// Caches one live agent-runtime handle per session so a new turn
/// doesn't have to re-establish conversation state on every message.
/// Evicted on a model change, on an explicit corrupted-history signal
/// from the adapter, and by plain least-recently-used pressure once
/// `capacity` is exceeded.
pub struct AgentInstanceCache<T> {
    entries: DashMap<String, Entry<T>>,
    capacity: usize,
}

impl<T: Clone> Default for AgentInstanceCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T: Clone> AgentInstanceCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    /// Returns the cached instance for `session_id` if one exists and
    /// was created for the same `model_id`. A model change evicts the
    /// stale instance and returns `None` so the caller builds a fresh one.
    pub fn get(&self, session_id: &str, model_id: &str) -> Option<T> {
        let stale = match self.entries.get(session_id) {
            Some(entry) if entry.model_id == model_id => false,
            Some(_) => true,
            None => return None,
        };
        if stale {
            self.entries.remove(session_id);
            return None;
        }
        let mut entry = self.entries.get_mut(session_id)?;
        entry.last_used = Instant::now();
        Some(entry.instance.clone())
    }

    pub fn insert(&self, session_id: &str, model_id: &str, instance: T) {
        self.entries.insert(
            session_id.to_string(),
            Entry {
                instance,
                model_id: model_id.to_string(),
                last_used: Instant::now(),
            },
        );
        self.enforce_capacity();
    }

    /// Drops the cached instance for a session. Used when the adapter
    /// reports corrupted conversation history so the next turn starts clean.
    pub fn evict(&self, session_id: &str) {
        self.entries.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enforce_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.last_used)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_for_unknown_session() {
        let cache: AgentInstanceCache<u32> = AgentInstanceCache::new(8);
        assert!(cache.get("s1", "model-a").is_none());
    }

    #[test]
    fn round_trips_matching_model() {
        let cache = AgentInstanceCache::new(8);
        cache.insert("s1", "model-a", 42u32);
        assert_eq!(cache.get("s1", "model-a"), Some(42));
    }

    #[test]
    fn model_change_evicts() {
        let cache = AgentInstanceCache::new(8);
        cache.insert("s1", "model-a", 42u32);
        assert_eq!(cache.get("s1", "model-b"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn explicit_evict_removes_entry() {
        let cache = AgentInstanceCache::new(8);
        cache.insert("s1", "model-a", 42u32);
        cache.evict("s1");
        assert!(cache.get("s1", "model-a").is_none());
    }

    #[test]
    fn lru_pressure_drops_oldest() {
        let cache = AgentInstanceCache::new(2);
        cache.insert("s1", "model-a", 1u32);
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.insert("s2", "model-a", 2u32);
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.insert("s3", "model-a", 3u32);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("s1", "model-a").is_none());
        assert!(cache.get("s3", "model-a").is_some());
    }
}
