use crate::clock::{deadline, Clock};
use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lowercase, trim, and collapse internal whitespace runs to a single space.
pub fn normalize(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `mode:normalized-message`
pub fn cache_key(message: &str, mode: &str) -> String {
    format!("{}:{}", mode, normalize(message))
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hits: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Snapshot for operational visibility.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub total_hits: u64,
    /// Age of the oldest live entry in milliseconds, 0 when empty.
    pub oldest_entry_age_ms: i64,
    pub default_ttl_secs: u64,
}

/// Generated replies keyed by interaction mode and normalized message text.
///
/// Bounded by `max_size`; when full, the entry with the oldest
/// `last_accessed` is evicted before inserting.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether replies to `message` belong in the cache at all.
    pub fn should_cache(&self, message: &str) -> bool {
        let trimmed = message.trim();
        if trimmed.chars().count() < self.config.min_length {
            return false;
        }

        let lowered = trimmed.to_lowercase();
        !self
            .config
            .greetings
            .iter()
            .any(|g| lowered.starts_with(g.to_lowercase().as_str()))
    }

    pub fn get(&self, message: &str, mode: &str) -> Option<String> {
        let key = cache_key(message, mode);
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(&key) {
            None => return None,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(&key);
            return None;
        }

        let entry = entries.get_mut(&key)?;
        entry.hits += 1;
        entry.last_accessed = now;
        log::debug!("cache hit for {:?} (hits: {})", preview(&key), entry.hits);
        Some(entry.response.clone())
    }

    pub fn set(&self, message: &str, response: &str, mode: &str) {
        self.set_with_ttl(message, response, mode, self.config.ttl());
    }

    pub fn set_with_ttl(&self, message: &str, response: &str, mode: &str, ttl: Duration) {
        let key = cache_key(message, mode);
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        if entries.len() >= self.config.max_size && !entries.contains_key(&key) {
            Self::evict_lru(&mut entries);
        }

        entries.insert(
            key,
            CacheEntry {
                response: response.to_string(),
                created_at: now,
                expires_at: deadline(now, ttl),
                last_accessed: now,
                hits: 0,
            },
        );
        log::debug!("cache stored (size: {})", entries.len());
    }

    /// Drop the single least-recently-accessed entry. O(size).
    fn evict_lru(entries: &mut HashMap<String, CacheEntry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone());

        if let Some(key) = victim {
            entries.remove(&key);
            log::debug!("cache evicted least recently used entry");
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            log::info!("cache cleanup: removed {} expired entries", removed);
        }
        removed
    }

    /// Remove everything. Returns how many entries were dropped.
    pub fn flush(&self) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        entries.clear();
        log::info!("cache flushed ({} entries)", n);
        n
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.lock();

        let total_hits = entries.values().map(|e| e.hits).sum();
        let oldest_entry_age_ms = entries
            .values()
            .map(|e| e.created_at)
            .min()
            .map(|oldest| (now - oldest).num_milliseconds())
            .unwrap_or(0);

        CacheStats {
            size: entries.len(),
            max_size: self.config.max_size,
            total_hits,
            oldest_entry_age_ms,
            default_ttl_secs: self.config.ttl_secs,
        }
    }
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    const QUESTION: &str = "Объясни разницу между списком и словарём";

    fn cache_with(config: CacheConfig) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (ResponseCache::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello \t  World\n"), "hello world");
        assert_eq!(cache_key("A  b", "tutor"), "tutor:a b");
    }

    #[test]
    fn test_should_cache_rules() {
        let (cache, _) = cache_with(CacheConfig::default());
        assert!(!cache.should_cache("коротко"));
        assert!(!cache.should_cache("   короткий      "));
        assert!(!cache.should_cache("Привет, объясни мне рекурсию пожалуйста"));
        assert!(!cache.should_cache("Hello there, how do decorators work?"));
        assert!(cache.should_cache(QUESTION));
    }

    #[test]
    fn test_set_then_get_with_different_spelling() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.set(QUESTION, "ответ", "tutor");

        assert_eq!(
            cache.get("  объясни   РАЗНИЦУ между списком и словарём ", "tutor"),
            Some("ответ".to_string())
        );
    }

    #[test]
    fn test_modes_partition_namespace() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.set(QUESTION, "tutor answer", "tutor");
        assert_eq!(cache.get(QUESTION, "debug"), None);
        assert_eq!(cache.get(QUESTION, "tutor"), Some("tutor answer".into()));
    }

    #[test]
    fn test_ttl_expiry_removes_on_lookup() {
        let (cache, clock) = cache_with(CacheConfig::default());
        cache.set_with_ttl(QUESTION, "ответ", "tutor", Duration::from_secs(60));

        clock.advance(Duration::from_secs(60));
        assert!(cache.get(QUESTION, "tutor").is_some(), "still live at exactly ttl");

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(QUESTION, "tutor").is_none());
        assert_eq!(cache.len(), 0, "expired entry deleted on lookup");
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_with(CacheConfig::default());
        cache.set_with_ttl("первый длинный вопрос про циклы", "a", "tutor", Duration::from_secs(10));
        cache.set_with_ttl("второй длинный вопрос про списки", "b", "tutor", Duration::from_secs(100));

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("второй длинный вопрос про списки", "tutor").is_some());
    }

    #[test]
    fn test_bounded_size_evicts_least_recently_accessed() {
        let (cache, clock) = cache_with(CacheConfig::default().with_max_size(3));

        for i in 0..3 {
            cache.set(&format!("вопрос номер {} про циклы", i), "x", "tutor");
            clock.advance(Duration::from_secs(1));
        }

        // Touch the oldest insert so entry 1 becomes least recently accessed.
        assert!(cache.get("вопрос номер 0 про циклы", "tutor").is_some());
        clock.advance(Duration::from_secs(1));

        cache.set("вопрос номер 3 про циклы", "x", "tutor");

        assert_eq!(cache.len(), 3);
        assert!(cache.get("вопрос номер 1 про циклы", "tutor").is_none());
        assert!(cache.get("вопрос номер 0 про циклы", "tutor").is_some());
        assert!(cache.get("вопрос номер 2 про циклы", "tutor").is_some());
        assert!(cache.get("вопрос номер 3 про циклы", "tutor").is_some());
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, clock) = cache_with(CacheConfig::default().with_max_size(2));
        cache.set("первый длинный вопрос про циклы", "a", "tutor");
        clock.advance(Duration::from_secs(1));
        cache.set("второй длинный вопрос про списки", "b", "tutor");
        clock.advance(Duration::from_secs(1));

        cache.set("первый длинный вопрос про циклы", "a2", "tutor");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("второй длинный вопрос про списки", "tutor"), Some("b".into()));
    }

    #[test]
    fn test_stats_and_flush() {
        let (cache, clock) = cache_with(CacheConfig::default());
        cache.set(QUESTION, "ответ", "tutor");
        clock.advance(Duration::from_secs(2));
        cache.get(QUESTION, "tutor");
        cache.get(QUESTION, "tutor");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_hits, 2);
        assert_eq!(stats.oldest_entry_age_ms, 2000);
        assert_eq!(stats.default_ttl_secs, 1800);

        assert_eq!(cache.flush(), 1);
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_normalization_equivalence(
            words in prop::collection::vec("[a-zA-Zа-яА-Я]{1,8}", 3..8),
            pad in "[ \t]{1,3}",
        ) {
            let (cache, _) = cache_with(CacheConfig::default().with_min_length(0));
            let stored = words.join(" ");
            let queried = format!("{pad}{}{pad}", words.join(&pad).to_uppercase());

            cache.set(&stored, "reply", "tutor");
            prop_assert_eq!(cache.get(&queried, "tutor"), Some("reply".to_string()));
        }
    }
}
