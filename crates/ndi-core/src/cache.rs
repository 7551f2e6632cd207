//! Bounded in-memory cache with priority-aware eviction.
//!
//! Entries are keyed by `(key, kind)`. Each entry records the byte size its
//! payload reports, a caller-chosen priority, and a logical insertion
//! timestamp. When an insertion would exceed the memory budget the cache
//! evicts entries whose priority is less than or equal to the incoming
//! priority, in the order given by the [`ReplacementPolicy`]. If that cannot
//! free enough space the insertion fails and nothing changes.
//!
//! The cache is not synchronized; wrap it in a mutex to share it.

use std::any::Any;
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::error::CoreError;

/// Default budget: 10 GB.
pub const DEFAULT_MAX_MEMORY: u64 = 10_000_000_000;

/// A value that can live in the cache.
pub trait CachePayload: Any {
    /// Bytes charged against the cache budget.
    fn size_bytes(&self) -> u64;

    /// Releases external resources (open files, handles). Called exactly
    /// once when the entry leaves the cache.
    fn release(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

impl CachePayload for Vec<u8> {
    fn size_bytes(&self) -> u64 {
        self.len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CachePayload for String {
    fn size_bytes(&self) -> u64 {
        self.len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CachePayload for Document {
    fn size_bytes(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Eviction order when the budget is exceeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// Lowest priority first, then oldest.
    #[default]
    Fifo,
    /// Lowest priority first, then newest.
    Lifo,
    /// Never evict; an overflowing insertion fails.
    Error,
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplacementPolicy::Fifo => "fifo",
            ReplacementPolicy::Lifo => "lifo",
            ReplacementPolicy::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for ReplacementPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(ReplacementPolicy::Fifo),
            "lifo" => Ok(ReplacementPolicy::Lifo),
            "error" => Ok(ReplacementPolicy::Error),
            other => Err(CoreError::invalid(format!(
                "unknown replacement policy '{}' (expected fifo, lifo or error)",
                other
            ))),
        }
    }
}

/// Cache construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_memory")]
    pub max_memory: u64,
    #[serde(default)]
    pub policy: ReplacementPolicy,
}

fn default_max_memory() -> u64 {
    DEFAULT_MAX_MEMORY
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_memory: DEFAULT_MAX_MEMORY,
            policy: ReplacementPolicy::Fifo,
        }
    }
}

/// A resident cache entry.
pub struct CacheEntry {
    key: String,
    kind: String,
    payload: Box<dyn CachePayload>,
    priority: i64,
    timestamp: u64,
    size_bytes: u64,
}

impl CacheEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Logical insertion order; larger is newer.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// The payload, if it has type `T`.
    pub fn payload<T: CachePayload>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }

    fn matches(&self, key: &str, kind: &str) -> bool {
        self.key == key && self.kind == kind
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("timestamp", &self.timestamp)
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// Memory-bounded cache.
#[derive(Debug)]
pub struct Cache {
    max_memory: u64,
    policy: ReplacementPolicy,
    entries: Vec<CacheEntry>,
    bytes: u64,
    clock: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Cache::from_config(&CacheConfig::default())
    }
}

impl Cache {
    pub fn new(max_memory: u64, policy: ReplacementPolicy) -> Self {
        Cache {
            max_memory,
            policy,
            entries: Vec::new(),
            bytes: 0,
            clock: 0,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Cache::new(config.max_memory, config.policy)
    }

    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ReplacementPolicy) {
        self.policy = policy;
    }

    /// Resident bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `payload` under `(key, kind)`, replacing any existing entry
    /// with the same key and kind.
    ///
    /// Fails with `CapacityExceeded`, leaving the cache untouched, when the
    /// payload is larger than the whole budget or when enough space cannot be
    /// freed without evicting a higher-priority entry.
    pub fn add<P: CachePayload>(
        &mut self,
        key: &str,
        kind: &str,
        payload: P,
        priority: i64,
    ) -> Result<(), CoreError> {
        let size = payload.size_bytes();
        if size > self.max_memory {
            return Err(CoreError::CapacityExceeded {
                requested: size,
                available: self.max_memory,
                reason: "item is larger than the cache".to_string(),
            });
        }

        let replaced = self.position(key, kind);
        let replaced_bytes = replaced.map_or(0, |i| self.entries[i].size_bytes);
        let resident = self.bytes - replaced_bytes;
        let available = self.max_memory - resident;

        let mut evict: Vec<usize> = Vec::new();
        if size > available {
            let needed = size - available;
            if self.policy == ReplacementPolicy::Error {
                return Err(CoreError::CapacityExceeded {
                    requested: size,
                    available,
                    reason: "replacement policy is 'error'".to_string(),
                });
            }
            evict = self.eviction_candidates(replaced, priority, needed).ok_or_else(|| {
                CoreError::CapacityExceeded {
                    requested: size,
                    available,
                    reason: "remaining entries have higher priority".to_string(),
                }
            })?;
        }

        if let Some(index) = replaced {
            evict.push(index);
        }
        // Remove from the back so earlier indexes stay valid.
        evict.sort_unstable_by(|a, b| b.cmp(a));
        for index in evict {
            let entry = self.entries.remove(index);
            debug!(key = %entry.key, kind = %entry.kind, bytes = entry.size_bytes, "cache eviction");
            self.release(entry);
        }

        self.clock += 1;
        self.entries.push(CacheEntry {
            key: key.to_string(),
            kind: kind.to_string(),
            payload: Box::new(payload),
            priority,
            timestamp: self.clock,
            size_bytes: size,
        });
        self.bytes += size;
        Ok(())
    }

    /// Indexes of the entries to evict to free `needed` bytes, or `None` if
    /// the evictable entries do not hold enough.
    fn eviction_candidates(&self, skip: Option<usize>, priority: i64, needed: u64) -> Option<Vec<usize>> {
        let mut candidates: Vec<usize> = (0..self.entries.len())
            .filter(|i| Some(*i) != skip && self.entries[*i].priority <= priority)
            .collect();
        match self.policy {
            ReplacementPolicy::Lifo => candidates.sort_by_key(|i| {
                let e = &self.entries[*i];
                (e.priority, Reverse(e.timestamp))
            }),
            _ => candidates.sort_by_key(|i| {
                let e = &self.entries[*i];
                (e.priority, e.timestamp)
            }),
        }

        let mut freed = 0u64;
        let mut chosen = Vec::new();
        for index in candidates {
            if freed >= needed {
                break;
            }
            freed += self.entries[index].size_bytes;
            chosen.push(index);
        }
        (freed >= needed).then_some(chosen)
    }

    fn position(&self, key: &str, kind: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(key, kind))
    }

    fn release(&mut self, mut entry: CacheEntry) {
        self.bytes -= entry.size_bytes;
        entry.payload.release();
    }

    /// The entry for `(key, kind)`, if resident.
    pub fn lookup(&self, key: &str, kind: &str) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.matches(key, kind))
    }

    /// Removes and releases the entry for `(key, kind)`. Returns whether an
    /// entry was present.
    pub fn remove(&mut self, key: &str, kind: &str) -> bool {
        match self.position(key, kind) {
            Some(index) => {
                let entry = self.entries.remove(index);
                self.release(entry);
                true
            }
            None => false,
        }
    }

    /// Removes and releases every entry.
    pub fn clear(&mut self) {
        for entry in std::mem::take(&mut self.entries) {
            self.release(entry);
        }
    }

    /// Resident entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Blob {
        size: u64,
        released: Rc<Cell<usize>>,
    }

    impl CachePayload for Blob {
        fn size_bytes(&self) -> u64 {
            self.size
        }

        fn release(&mut self) {
            self.released.set(self.released.get() + 1);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn blob(size: u64, counter: &Rc<Cell<usize>>) -> Blob {
        Blob {
            size,
            released: Rc::clone(counter),
        }
    }

    fn keys(cache: &Cache) -> Vec<&str> {
        cache.entries().map(|e| e.key()).collect()
    }

    #[test]
    fn add_and_lookup() {
        let mut cache = Cache::new(100, ReplacementPolicy::Fifo);
        cache.add("a", "bytes", vec![0u8; 10], 0).unwrap();
        let entry = cache.lookup("a", "bytes").unwrap();
        assert_eq!(entry.size_bytes(), 10);
        assert_eq!(entry.payload::<Vec<u8>>().map(|v| v.len()), Some(10));
        assert!(entry.payload::<String>().is_none());
        assert!(cache.lookup("a", "other").is_none());
        assert_eq!(cache.bytes(), 10);
    }

    #[test]
    fn fifo_evicts_oldest_lowest_priority() {
        let mut cache = Cache::new(30, ReplacementPolicy::Fifo);
        cache.add("a", "t", vec![0u8; 10], 0).unwrap();
        cache.add("b", "t", vec![0u8; 10], 0).unwrap();
        cache.add("c", "t", vec![0u8; 10], 0).unwrap();
        cache.add("d", "t", vec![0u8; 10], 0).unwrap();
        assert_eq!(keys(&cache), vec!["b", "c", "d"]);
        assert_eq!(cache.bytes(), 30);
    }

    #[test]
    fn lifo_evicts_newest_lowest_priority() {
        let mut cache = Cache::new(30, ReplacementPolicy::Lifo);
        cache.add("a", "t", vec![0u8; 10], 0).unwrap();
        cache.add("b", "t", vec![0u8; 10], 0).unwrap();
        cache.add("c", "t", vec![0u8; 10], 0).unwrap();
        cache.add("d", "t", vec![0u8; 10], 0).unwrap();
        assert_eq!(keys(&cache), vec!["a", "b", "d"]);
    }

    #[test]
    fn lower_priority_goes_first() {
        let mut cache = Cache::new(30, ReplacementPolicy::Fifo);
        cache.add("keep", "t", vec![0u8; 10], 5).unwrap();
        cache.add("low", "t", vec![0u8; 10], 1).unwrap();
        cache.add("mid", "t", vec![0u8; 10], 3).unwrap();
        cache.add("new", "t", vec![0u8; 10], 5).unwrap();
        assert_eq!(keys(&cache), vec!["keep", "mid", "new"]);
    }

    #[test]
    fn higher_priority_entries_are_never_evicted() {
        let mut cache = Cache::new(20, ReplacementPolicy::Fifo);
        cache.add("high", "t", vec![0u8; 15], 10).unwrap();
        let err = cache.add("low", "t", vec![0u8; 10], 1).unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { .. }));
        assert_eq!(keys(&cache), vec!["high"]);
        assert_eq!(cache.bytes(), 15);
    }

    #[test]
    fn error_policy_rejects_overflow() {
        let mut cache = Cache::new(20, ReplacementPolicy::Error);
        cache.add("a", "t", vec![0u8; 15], 0).unwrap();
        assert!(cache.add("b", "t", vec![0u8; 10], 100).is_err());
        assert_eq!(keys(&cache), vec!["a"]);
        cache.add("c", "t", vec![0u8; 5], 0).unwrap();
        assert_eq!(cache.bytes(), 20);
    }

    #[test]
    fn oversized_item_fails_immediately() {
        let mut cache = Cache::new(10, ReplacementPolicy::Fifo);
        cache.add("a", "t", vec![0u8; 5], 0).unwrap();
        assert!(cache.add("big", "t", vec![0u8; 11], 100).is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn readd_replaces_and_releases_once() {
        let released = Rc::new(Cell::new(0));
        let mut cache = Cache::new(100, ReplacementPolicy::Fifo);
        cache.add("a", "t", blob(40, &released), 0).unwrap();
        cache.add("a", "t", blob(80, &released), 0).unwrap();
        assert_eq!(released.get(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes(), 80);
    }

    #[test]
    fn failed_replacement_keeps_old_payload() {
        let released = Rc::new(Cell::new(0));
        let mut cache = Cache::new(100, ReplacementPolicy::Fifo);
        cache.add("pinned", "t", blob(50, &released), 9).unwrap();
        cache.add("a", "t", blob(40, &released), 0).unwrap();
        assert!(cache.add("a", "t", blob(60, &released), 0).is_err());
        assert_eq!(released.get(), 0);
        assert_eq!(cache.lookup("a", "t").map(|e| e.size_bytes()), Some(40));
    }

    #[test]
    fn remove_releases_payload() {
        let released = Rc::new(Cell::new(0));
        let mut cache = Cache::new(100, ReplacementPolicy::Fifo);
        cache.add("a", "t", blob(10, &released), 0).unwrap();
        assert!(cache.remove("a", "t"));
        assert!(!cache.remove("a", "t"));
        assert_eq!(released.get(), 1);
        assert_eq!(cache.bytes(), 0);
    }

    #[test]
    fn drop_releases_everything() {
        let released = Rc::new(Cell::new(0));
        {
            let mut cache = Cache::new(100, ReplacementPolicy::Fifo);
            cache.add("a", "t", blob(10, &released), 0).unwrap();
            cache.add("b", "t", blob(10, &released), 0).unwrap();
        }
        assert_eq!(released.get(), 2);
    }

    #[test]
    fn eviction_releases_payload() {
        let released = Rc::new(Cell::new(0));
        let mut cache = Cache::new(10, ReplacementPolicy::Fifo);
        cache.add("a", "t", blob(10, &released), 0).unwrap();
        cache.add("b", "t", blob(10, &released), 0).unwrap();
        assert_eq!(released.get(), 1);
        assert_eq!(keys(&cache), vec!["b"]);
    }

    #[test]
    fn documents_are_cacheable() {
        let doc = Document::new("base");
        let id = doc.id().to_string();
        let mut cache = Cache::default();
        cache.add(&id, "document", doc.clone(), 0).unwrap();
        assert_eq!(cache.lookup(&id, "document").and_then(|e| e.payload::<Document>()), Some(&doc));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("FIFO".parse::<ReplacementPolicy>().unwrap(), ReplacementPolicy::Fifo);
        assert_eq!("lifo".parse::<ReplacementPolicy>().unwrap(), ReplacementPolicy::Lifo);
        assert_eq!(ReplacementPolicy::Error.to_string(), "error");
        assert!("random".parse::<ReplacementPolicy>().is_err());
        let config: CacheConfig = serde_json::from_str(r#"{"policy": "lifo"}"#).unwrap();
        assert_eq!(config.max_memory, DEFAULT_MAX_MEMORY);
        assert_eq!(config.policy, ReplacementPolicy::Lifo);
    }
}
