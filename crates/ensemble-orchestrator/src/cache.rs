use crate::config::{CacheConfig, TemplateConfig};
use crate::quality::QualityScore;
use crate::similarity::{jaccard_sets, keywords, normalize, token_set};
use chrono::{DateTime, Utc};
use ensemble_core::{AgentId, CollaborationMode, EnsembleError, EnsembleResult, TaskCategory};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

/// Recurring request shapes recognised out of the box.
const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    (
        "explain",
        r"^(?:explain|describe|define|what is|what are|tell me about)\s+(?:the\s+|a\s+|an\s+)?(.+)$",
    ),
    ("how_to", r"^how (?:do|can|should|would) (?:i|we|you|one)\s+(.+)$"),
    (
        "comparison",
        r"^(?:compare|what is the difference between|difference between)\s+(.+?)\s+(?:and|vs|versus|with)\s+(.+)$",
    ),
    (
        "troubleshooting",
        r"^(?:fix|troubleshoot|debug|resolve|diagnose)\s+(?:the\s+|a\s+|an\s+|my\s+)?(.+)$",
    ),
];

/// SHA-256 hex digest identifying an exact request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of normalized prompt, normalized context, top category and mode.
    pub fn compute(
        prompt: &str,
        context: Option<&str>,
        category: TaskCategory,
        mode: CollaborationMode,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize(prompt).as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize(context.unwrap_or_default()).as_bytes());
        hasher.update([0u8]);
        hasher.update(category.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(mode.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which lookup strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    NearDuplicate,
    Pattern,
}

/// The answer payload kept for a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub text: String,
    pub contributing_agents: Vec<AgentId>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub answer: CachedAnswer,
    pub quality: QualityScore,
    /// Strategy of the most recent hit, if any.
    pub strategy: Option<MatchStrategy>,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
}

/// Counters exposed through the orchestrator snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub exact_hits: u64,
    pub near_duplicate_hits: u64,
    pub pattern_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub rejected_low_quality: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.near_duplicate_hits + self.pattern_hits
    }
}

/// Everything a lookup or store needs to know about one request.
#[derive(Debug, Clone)]
pub struct CacheQuery {
    pub fingerprint: Fingerprint,
    tokens: HashSet<String>,
    scope: String,
    intent: Option<String>,
}

impl CacheQuery {
    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }
}

struct Template {
    name: String,
    regex: Regex,
}

struct Slot {
    entry: CacheEntry,
    tokens: HashSet<String>,
    scope: String,
    intent: Option<String>,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<Fingerprint, Slot>,
    /// Most recently stored last.
    recent: VecDeque<Fingerprint>,
    intents: HashMap<String, Fingerprint>,
    clock: u64,
    stats: CacheStats,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<Slot> {
        let slot = self.slots.remove(fingerprint)?;
        self.recent.retain(|f| f != fingerprint);
        if let Some(intent) = &slot.intent {
            if self.intents.get(intent) == Some(fingerprint) {
                self.intents.remove(intent);
            }
        }
        Some(slot)
    }

    fn live(&mut self, fingerprint: &Fingerprint, now: Instant) -> bool {
        match self.slots.get(fingerprint) {
            Some(slot) if slot.expires_at > now => true,
            Some(_) => {
                self.remove(fingerprint);
                self.stats.expirations += 1;
                false
            }
            None => false,
        }
    }

    fn hit(&mut self, fingerprint: &Fingerprint, strategy: MatchStrategy) -> Option<CacheEntry> {
        let now = self.tick();
        let slot = self.slots.get_mut(fingerprint)?;
        slot.last_used = now;
        slot.entry.hit_count += 1;
        slot.entry.strategy = Some(strategy);
        let entry = slot.entry.clone();
        match strategy {
            MatchStrategy::Exact => self.stats.exact_hits += 1,
            MatchStrategy::NearDuplicate => self.stats.near_duplicate_hits += 1,
            MatchStrategy::Pattern => self.stats.pattern_hits += 1,
        }
        Some(entry)
    }
}

/// Response cache with exact, near-duplicate and template lookup.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    templates: Vec<Template>,
    ttl: Duration,
    capacity: usize,
    near_duplicate_threshold: f64,
    recent_window: usize,
    min_quality: f64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> EnsembleResult<Self> {
        let templates: Vec<TemplateConfig> = if config.templates.is_empty() {
            DEFAULT_TEMPLATES
                .iter()
                .map(|(name, pattern)| TemplateConfig {
                    name: name.to_string(),
                    pattern: pattern.to_string(),
                })
                .collect()
        } else {
            config.templates.clone()
        };
        let templates = templates
            .into_iter()
            .map(|t| {
                Regex::new(&t.pattern)
                    .map(|regex| Template {
                        name: t.name.clone(),
                        regex,
                    })
                    .map_err(|e| EnsembleError::Config(format!("Invalid template '{}': {e}", t.name)))
            })
            .collect::<EnsembleResult<Vec<_>>>()?;

        Ok(Self {
            inner: Mutex::new(Inner::default()),
            templates,
            ttl: config.ttl(),
            capacity: config.capacity.max(1),
            near_duplicate_threshold: config.near_duplicate_threshold,
            recent_window: config.recent_window,
            min_quality: config.min_quality,
        })
    }

    /// Override the entry lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Build the lookup key for a request.
    pub fn query(
        &self,
        prompt: &str,
        context: Option<&str>,
        category: TaskCategory,
        mode: CollaborationMode,
    ) -> CacheQuery {
        let normalized = normalize(prompt);
        let scope = format!("{}|{}", normalize(context.unwrap_or_default()), mode.as_str());
        let intent = self.intent_of(&normalized).map(|i| format!("{i}|{scope}"));
        CacheQuery {
            fingerprint: Fingerprint::compute(prompt, context, category, mode),
            tokens: token_set(&normalized),
            scope,
            intent,
        }
    }

    /// Canonical intent key for a normalized prompt, if a template matches.
    fn intent_of(&self, normalized: &str) -> Option<String> {
        self.templates.iter().find_map(|t| {
            let caps = t.regex.captures(normalized)?;
            let mut parts: Vec<String> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| {
                    let mut kws = keywords(m.as_str());
                    kws.sort();
                    kws.join(" ")
                })
                .filter(|p| !p.is_empty())
                .collect();
            if parts.is_empty() {
                return None;
            }
            parts.sort();
            Some(format!("{}:{}", t.name, parts.join("+")))
        })
    }

    /// Exact fingerprint lookup only.
    pub fn lookup_exact(&self, query: &CacheQuery) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if inner.live(&query.fingerprint, now) {
            return inner.hit(&query.fingerprint, MatchStrategy::Exact);
        }
        None
    }

    /// Try exact, then near-duplicate, then pattern matching. First hit wins.
    pub fn lookup(&self, query: &CacheQuery) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if inner.live(&query.fingerprint, now) {
            return inner.hit(&query.fingerprint, MatchStrategy::Exact);
        }

        let window: Vec<Fingerprint> = inner
            .recent
            .iter()
            .rev()
            .take(self.recent_window)
            .cloned()
            .collect();
        let mut best: Option<(f64, Fingerprint)> = None;
        for fingerprint in window {
            if !inner.live(&fingerprint, now) {
                continue;
            }
            let Some(slot) = inner.slots.get(&fingerprint) else {
                continue;
            };
            if slot.scope != query.scope {
                continue;
            }
            let similarity = jaccard_sets(&slot.tokens, &query.tokens);
            if similarity >= self.near_duplicate_threshold
                && best.as_ref().map_or(true, |(s, _)| similarity > *s)
            {
                best = Some((similarity, fingerprint));
            }
        }
        if let Some((similarity, fingerprint)) = best {
            debug!(similarity, "Near-duplicate cache hit");
            return inner.hit(&fingerprint, MatchStrategy::NearDuplicate);
        }

        if let Some(intent) = &query.intent {
            if let Some(fingerprint) = inner.intents.get(intent).cloned() {
                if inner.live(&fingerprint, now) {
                    debug!(intent = %intent, "Pattern cache hit");
                    return inner.hit(&fingerprint, MatchStrategy::Pattern);
                }
            }
        }

        inner.stats.misses += 1;
        None
    }

    /// Store a fresh answer. Returns `None` when its quality is below the threshold.
    pub fn store(
        &self,
        query: &CacheQuery,
        answer: CachedAnswer,
        quality: QualityScore,
    ) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        if quality.composite < self.min_quality || answer.text.trim().is_empty() {
            inner.stats.rejected_low_quality += 1;
            debug!(
                fingerprint = %query.fingerprint,
                quality = quality.composite,
                "Answer below quality threshold; not cached"
            );
            return None;
        }

        let now = Instant::now();
        inner.remove(&query.fingerprint);

        let expired: Vec<Fingerprint> = inner
            .slots
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(f, _)| f.clone())
            .collect();
        for fingerprint in expired {
            inner.remove(&fingerprint);
            inner.stats.expirations += 1;
        }
        while inner.slots.len() >= self.capacity {
            let lru = inner
                .slots
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(f, _)| f.clone());
            match lru {
                Some(fingerprint) => {
                    inner.remove(&fingerprint);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }

        let entry = CacheEntry {
            fingerprint: query.fingerprint.clone(),
            answer,
            quality,
            strategy: None,
            created_at: Utc::now(),
            hit_count: 0,
        };
        let last_used = inner.tick();
        inner.slots.insert(
            query.fingerprint.clone(),
            Slot {
                entry: entry.clone(),
                tokens: query.tokens.clone(),
                scope: query.scope.clone(),
                intent: query.intent.clone(),
                expires_at: now + self.ttl,
                last_used,
            },
        );
        inner.recent.push_back(query.fingerprint.clone());
        while inner.recent.len() > self.recent_window.max(1) {
            inner.recent.pop_front();
        }
        if let Some(intent) = &query.intent {
            inner
                .intents
                .insert(intent.clone(), query.fingerprint.clone());
        }
        inner.stats.stores += 1;
        Some(entry)
    }

    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().remove(fingerprint).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.recent.clear();
        inner.intents.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.slots.len(),
            ..inner.stats.clone()
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig::default()).unwrap()
    }

    fn good() -> QualityScore {
        QualityScore {
            relevance: 1.0,
            completeness: 1.0,
            consistency: 1.0,
            composite: 1.0,
        }
    }

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer {
            text: text.to_string(),
            contributing_agents: vec!["a".into()],
            confidence: 0.9,
        }
    }

    fn q(cache: &ResponseCache, prompt: &str) -> CacheQuery {
        cache.query(prompt, None, TaskCategory::Design, CollaborationMode::None)
    }

    #[test]
    fn test_fingerprint_normalizes_text() {
        let a = Fingerprint::compute("Explain  Caching!", None, TaskCategory::Design, CollaborationMode::None);
        let b = Fingerprint::compute("explain caching", Some(""), TaskCategory::Design, CollaborationMode::None);
        let c = Fingerprint::compute("explain caching", None, TaskCategory::Design, CollaborationMode::Parallel);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_exact_hit_counts() {
        let cache = cache();
        let query = q(&cache, "Explain caching strategy");
        assert!(cache.lookup(&query).is_none());
        cache.store(&query, answer("Caching keeps data close."), good()).unwrap();

        let hit = cache.lookup(&q(&cache, "explain caching strategy?")).unwrap();
        assert_eq!(hit.strategy, Some(MatchStrategy::Exact));
        assert_eq!(hit.hit_count, 1);
        let stats = cache.stats();
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_near_duplicate_hit() {
        let cache = cache();
        let stored = q(&cache, "rotate the api keys for the billing service every ninety days now");
        cache.store(&stored, answer("Use a scheduled rotation job."), good()).unwrap();

        let hit = cache
            .lookup(&q(&cache, "rotate the api keys for the billing service every ninety days"))
            .unwrap();
        assert_eq!(hit.strategy, Some(MatchStrategy::NearDuplicate));

        let other_ctx = cache.query(
            "rotate the api keys for the billing service every ninety days",
            Some("different tenant"),
            TaskCategory::Design,
            CollaborationMode::None,
        );
        assert!(cache.lookup(&other_ctx).is_none());
    }

    #[test]
    fn test_pattern_hit_on_paraphrase() {
        let cache = cache();
        let stored = q(&cache, "Explain caching strategy");
        assert_eq!(stored.intent(), Some("explain:caching strategy||none"));
        cache.store(&stored, answer("Caching keeps data close."), good()).unwrap();

        let hit = cache.lookup(&q(&cache, "Describe the caching strategy")).unwrap();
        assert_eq!(hit.strategy, Some(MatchStrategy::Pattern));
        assert_eq!(cache.stats().pattern_hits, 1);
    }

    #[test]
    fn test_comparison_template_is_order_insensitive() {
        let cache = cache();
        let a = q(&cache, "Compare redis and memcached");
        let b = q(&cache, "compare memcached vs redis");
        assert!(a.intent().is_some());
        assert_eq!(a.intent(), b.intent());
    }

    #[test]
    fn test_low_quality_not_cached() {
        let cache = cache();
        let query = q(&cache, "Explain caching strategy");
        let poor = QualityScore {
            composite: 0.1,
            ..QualityScore::default()
        };
        assert!(cache.store(&query, answer("meh"), poor).is_none());
        assert!(cache.lookup(&query).is_none());
        assert_eq!(cache.stats().rejected_low_quality, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = cache().with_ttl(Duration::ZERO);
        let query = q(&cache, "Explain caching strategy");
        cache.store(&query, answer("x."), good()).unwrap();
        assert!(cache.lookup(&query).is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResponseCache::new(&CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        })
        .unwrap();
        let first = q(&cache, "alpha bravo charlie");
        let second = q(&cache, "delta echo foxtrot");
        let third = q(&cache, "golf hotel india");
        cache.store(&first, answer("1."), good());
        cache.store(&second, answer("2."), good());
        // touch first so second becomes least recently used
        assert!(cache.lookup_exact(&first).is_some());
        cache.store(&third, answer("3."), good());

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup_exact(&first).is_some());
        assert!(cache.lookup_exact(&second).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = cache();
        let query = q(&cache, "Explain caching strategy");
        cache.store(&query, answer("x."), good());
        assert!(cache.invalidate(&query.fingerprint));
        assert!(!cache.invalidate(&query.fingerprint));
        cache.store(&query, answer("x."), good());
        cache.clear();
        assert!(cache.is_empty());
    }
}
