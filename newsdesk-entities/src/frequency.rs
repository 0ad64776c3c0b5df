//! Historical mention frequencies.
//!
//! Buckets committed raw mentions into day, ISO-week, or month periods per
//! `"text:TYPE"` key. Results are cached per query on the aggregator instance
//! in a bounded LRU and stay valid until [`HistoricalAggregator::clear_cache`]
//! is called, the entry is evicted, or a configured TTL passes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use lru::LruCache;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use newsdesk_common::{BucketGranularity, Config, TimeUnit};

use crate::error::{Error, Result};
use crate::store::MentionStore;
use crate::types::{entity_key, EntityType};

// ============================================================================
// Buckets
// ============================================================================

/// Period key for a timestamp: `YYYY-MM-DD`, `YYYY-Www`, or `YYYY-MM`.
pub fn bucket_key(at: &DateTime<Utc>, granularity: BucketGranularity) -> String {
    date_bucket_key(at.date_naive(), granularity)
}

fn date_bucket_key(date: NaiveDate, granularity: BucketGranularity) -> String {
    match granularity {
        BucketGranularity::Day => date.format("%Y-%m-%d").to_string(),
        BucketGranularity::Week => {
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        BucketGranularity::Month => date.format("%Y-%m").to_string(),
    }
}

/// Every bucket key touched by `[start, end]`, in order.
pub fn bucket_keys_between(
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
    granularity: BucketGranularity,
) -> Vec<String> {
    let mut keys = Vec::new();
    let mut seen = BTreeSet::new();
    let last = end.date_naive();
    let mut day = start.date_naive();
    while day <= last {
        let key = date_bucket_key(day, granularity);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    keys
}

// ============================================================================
// Frequency Tables
// ============================================================================

/// Mention counts for one entity key across periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicFrequency {
    /// Mention text
    pub topic: String,
    pub entity_type: EntityType,
    /// Period key to mention count
    pub periods: BTreeMap<String, u64>,
    pub total_mentions: u64,
}

impl TopicFrequency {
    pub fn key(&self) -> String {
        entity_key(&self.topic, &self.entity_type)
    }

    /// Counts for `bucket_keys`, zero where the entity had no mentions.
    pub fn series(&self, bucket_keys: &[String]) -> Vec<f64> {
        bucket_keys
            .iter()
            .map(|k| self.periods.get(k).copied().unwrap_or(0) as f64)
            .collect()
    }
}

/// Frequency table for one query window, ordered by total mentions.
#[derive(Debug, Clone, Serialize)]
pub struct FrequencyTable {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: BucketGranularity,
    entries: Vec<TopicFrequency>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: BucketGranularity,
        mut entries: Vec<TopicFrequency>,
        top_n: usize,
    ) -> Self {
        entries.sort_by(|a, b| {
            b.total_mentions
                .cmp(&a.total_mentions)
                .then_with(|| a.key().cmp(&b.key()))
        });
        entries.truncate(top_n);
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key(), i))
            .collect();
        Self {
            start,
            end,
            granularity,
            entries,
            index,
        }
    }

    /// Look up an entity by its `"text:TYPE"` key.
    pub fn get(&self, key: &str) -> Option<&TopicFrequency> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// Entries, highest total first.
    pub fn iter(&self) -> impl Iterator<Item = &TopicFrequency> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Cache key for a frequency query. Entity types are order-independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrequencyQuery {
    pub entity_types: Vec<EntityType>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub top_n: usize,
}

impl FrequencyQuery {
    pub fn new(
        entity_types: &[EntityType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        top_n: usize,
    ) -> Self {
        let mut entity_types = entity_types.to_vec();
        entity_types.sort();
        entity_types.dedup();
        Self {
            entity_types,
            start,
            end,
            top_n,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    table: Arc<FrequencyTable>,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Tables kept by [`FrequencyCache::new`].
pub const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

/// Process-local frequency cache, least recently used first out.
#[derive(Debug)]
pub struct FrequencyCache {
    entries: Mutex<LruCache<FrequencyQuery, CacheEntry>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for FrequencyCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl FrequencyCache {
    /// Entries never expire.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::default().ttl(ttl)
    }

    /// Set the entry lifetime.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn get(&self, query: &FrequencyQuery) -> Option<Arc<FrequencyTable>> {
        let found = self.entries.lock().ok().and_then(|mut cache| {
            let cached = cache
                .get(query)
                .map(|entry| (entry.is_expired(), Arc::clone(&entry.table)));
            match cached {
                Some((true, _)) => {
                    cache.pop(query);
                    None
                }
                Some((false, table)) => Some(table),
                None => None,
            }
        });

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, query: FrequencyQuery, table: Arc<FrequencyTable>) {
        // An expiry past the representable range means the entry never expires
        let entry = CacheEntry {
            table,
            expires_at: self.ttl.and_then(|ttl| Utc::now().checked_add_signed(ttl)),
        };
        if let Ok(mut cache) = self.entries.lock() {
            if self.ttl.is_some() {
                remove_expired(&mut cache);
            }
            cache.put(query, entry);
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        self.entries
            .lock()
            .map(|mut cache| remove_expired(&mut cache))
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (total_entries, expired_entries, capacity) = self
            .entries
            .lock()
            .map(|c| {
                let expired = c.iter().filter(|(_, e)| e.is_expired()).count();
                (c.len(), expired, c.cap().get())
            })
            .unwrap_or((0, 0, 0));

        CacheStats {
            total_entries,
            expired_entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn remove_expired(cache: &mut LruCache<FrequencyQuery, CacheEntry>) -> usize {
    let expired: Vec<FrequencyQuery> = cache
        .iter()
        .filter(|(_, entry)| entry.is_expired())
        .map(|(query, _)| query.clone())
        .collect();
    for query in &expired {
        cache.pop(query);
    }
    expired.len()
}

// ============================================================================
// Aggregator
// ============================================================================

/// `(start, end)` covering `periods` units and ending at `now`.
///
/// Fails with [`Error::InvalidArgument`] when the start would fall outside
/// the representable date range.
pub fn date_range(
    unit: TimeUnit,
    periods: u32,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = unit
        .days_per_period()
        .checked_mul(i64::from(periods))
        .and_then(Duration::try_days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("{periods} {unit} periods before {now} is out of range"))
        })?;
    Ok((start, now))
}

/// Like [`date_range`], ending now, with the unit given by name.
pub fn calculate_date_range(unit: &str, periods: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let unit = TimeUnit::parse(unit).ok_or_else(|| Error::UnsupportedTimeUnit(unit.to_string()))?;
    date_range(unit, periods, Utc::now())
}

/// Builds frequency tables from the mention store.
pub struct HistoricalAggregator {
    store: Arc<dyn MentionStore>,
    granularity: BucketGranularity,
    top_n: usize,
    cache: FrequencyCache,
}

impl HistoricalAggregator {
    pub fn new(store: Arc<dyn MentionStore>, granularity: BucketGranularity) -> Self {
        Self {
            store,
            granularity,
            top_n: 100,
            cache: FrequencyCache::new(),
        }
    }

    /// Granularity, table size, cache capacity and TTL from config.
    pub fn from_config(store: Arc<dyn MentionStore>, config: &Config) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache.max_entries).unwrap_or(DEFAULT_CACHE_CAPACITY);
        let mut cache = FrequencyCache::with_capacity(capacity);
        if let Some(secs) = config.cache.ttl_secs {
            match i64::try_from(secs).ok().and_then(Duration::try_seconds) {
                Some(ttl) => cache = cache.ttl(ttl),
                None => warn!(ttl_secs = secs, "Cache TTL out of range, entries will not expire"),
            }
        }
        Self {
            store,
            granularity: config.trends.time_bucket_granularity,
            top_n: config.trends.top_n,
            cache,
        }
    }

    pub fn with_cache(mut self, cache: FrequencyCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn store(&self) -> &Arc<dyn MentionStore> {
        &self.store
    }

    pub fn granularity(&self) -> BucketGranularity {
        self.granularity
    }

    pub fn cache(&self) -> &FrequencyCache {
        &self.cache
    }

    /// Drop every cached table.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Cleared frequency cache");
    }

    /// Mention frequencies for `start <= mentioned_at <= end`.
    ///
    /// Repeated identical queries return the same cached table until the
    /// cache is cleared. Store errors are returned as-is and never cached.
    pub async fn get_entity_frequencies(
        &self,
        entity_types: &[EntityType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        top_n: usize,
    ) -> Result<Arc<FrequencyTable>> {
        let query = FrequencyQuery::new(entity_types, start, end, top_n);
        if let Some(table) = self.cache.get(&query) {
            return Ok(table);
        }

        let mentions = self
            .store
            .query_mentions_by_type_and_date(&query.entity_types, start, end)
            .await?;

        let mut by_key: HashMap<String, TopicFrequency> = HashMap::new();
        for mention in &mentions {
            let entry = by_key
                .entry(mention.entity_key())
                .or_insert_with(|| TopicFrequency {
                    topic: mention.text.clone(),
                    entity_type: mention.entity_type.clone(),
                    periods: BTreeMap::new(),
                    total_mentions: 0,
                });
            *entry
                .periods
                .entry(bucket_key(&mention.mentioned_at, self.granularity))
                .or_insert(0) += 1;
            entry.total_mentions += 1;
        }

        let table = Arc::new(FrequencyTable::new(
            start,
            end,
            self.granularity,
            by_key.into_values().collect(),
            top_n,
        ));
        debug!(
            mentions = mentions.len(),
            entities = table.len(),
            %start,
            %end,
            "Computed entity frequencies"
        );

        self.cache.insert(query, Arc::clone(&table));
        Ok(table)
    }

    /// Current and baseline tables ending now.
    ///
    /// The current window spans `current_periods` units. The baseline window
    /// ends just before it and is `baseline_periods` times as long. The
    /// baseline table is not truncated so every current entity can be found
    /// in it.
    pub async fn get_baseline_frequencies(
        &self,
        entity_types: &[EntityType],
        unit: TimeUnit,
        current_periods: u32,
        baseline_periods: u32,
    ) -> Result<(Arc<FrequencyTable>, Arc<FrequencyTable>)> {
        let (current_start, current_end) = date_range(unit, current_periods, Utc::now())?;
        let (baseline_start, baseline_end) =
            baseline_window(current_start, current_end, baseline_periods)?;

        let current = self
            .get_entity_frequencies(entity_types, current_start, current_end, self.top_n)
            .await?;
        let baseline = self
            .get_entity_frequencies(entity_types, baseline_start, baseline_end, usize::MAX)
            .await?;
        Ok((current, baseline))
    }
}

/// Window immediately preceding `[current_start, current_end]`.
///
/// Ends one microsecond (the storage resolution) before the current window.
pub fn baseline_window(
    current_start: DateTime<Utc>,
    current_end: DateTime<Utc>,
    baseline_periods: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let out_of_range = || {
        Error::InvalidArgument(format!(
            "{baseline_periods} baseline periods before {current_start} is out of range"
        ))
    };
    let span = current_end - current_start;
    let start = i32::try_from(baseline_periods)
        .ok()
        .and_then(|periods| span.checked_mul(periods))
        .and_then(|baseline| current_start.checked_sub_signed(baseline))
        .ok_or_else(out_of_range)?;
    let end = current_start
        .checked_sub_signed(Duration::microseconds(1))
        .ok_or_else(out_of_range)?;
    Ok((start, end))
}
