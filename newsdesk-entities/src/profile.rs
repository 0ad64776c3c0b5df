//! Rolling per-entity profiles.
//!
//! A profile aggregates every mention attributed to one canonical entity. The
//! aggregate lives in [`ProfileMetadata`], a structured value that is validated
//! whenever it crosses the storage boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::{Error, Result};

/// Latest and running-mean sentiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentHistory {
    pub latest: f64,
    pub average: f64,
}

/// Latest framing label plus the full sequence, one entry per mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingHistory {
    pub latest: String,
    pub history: Vec<String>,
}

/// One mention's contribution to a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileObservation {
    pub context_text: String,
    pub sentiment: f64,
    pub framing: String,
    pub observed_at: DateTime<Utc>,
}

/// Aggregated mention statistics for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub mention_count: u64,
    /// Most recent context sentences, oldest first
    pub context_samples: VecDeque<String>,
    /// Mentions per calendar day (UTC)
    pub temporal_histogram: BTreeMap<NaiveDate, u64>,
    pub sentiment_history: SentimentHistory,
    pub framing_history: FramingHistory,
}

impl ProfileMetadata {
    /// Seed metadata from the first mention of an entity.
    pub fn first(obs: &ProfileObservation) -> Self {
        let mut temporal_histogram = BTreeMap::new();
        temporal_histogram.insert(obs.observed_at.date_naive(), 1);

        let mut context_samples = VecDeque::new();
        if !obs.context_text.is_empty() {
            context_samples.push_back(obs.context_text.clone());
        }

        Self {
            mention_count: 1,
            context_samples,
            temporal_histogram,
            sentiment_history: SentimentHistory {
                latest: obs.sentiment,
                average: obs.sentiment,
            },
            framing_history: FramingHistory {
                latest: obs.framing.clone(),
                history: vec![obs.framing.clone()],
            },
        }
    }

    /// Fold one more mention into the aggregate.
    ///
    /// `max_samples` bounds `context_samples`; the oldest samples are dropped.
    pub fn record(&mut self, obs: &ProfileObservation, max_samples: usize) {
        self.mention_count += 1;

        if !obs.context_text.is_empty() {
            self.context_samples.push_back(obs.context_text.clone());
        }
        while self.context_samples.len() > max_samples.max(1) {
            self.context_samples.pop_front();
        }

        *self
            .temporal_histogram
            .entry(obs.observed_at.date_naive())
            .or_insert(0) += 1;

        let n = self.mention_count as f64;
        let prev = self.sentiment_history.average;
        self.sentiment_history.average = (prev * (n - 1.0) + obs.sentiment) / n;
        self.sentiment_history.latest = obs.sentiment;

        self.framing_history.history.push(obs.framing.clone());
        self.framing_history.latest = obs.framing.clone();
    }

    /// Check internal consistency of metadata read back from storage.
    pub fn validate(&self) -> Result<()> {
        if self.mention_count == 0 {
            return Err(Error::CorruptProfile("mention_count is zero".into()));
        }

        let histogram_total: u64 = self.temporal_histogram.values().sum();
        if histogram_total != self.mention_count {
            return Err(Error::CorruptProfile(format!(
                "temporal histogram totals {histogram_total}, expected {}",
                self.mention_count
            )));
        }

        if self.framing_history.history.len() as u64 != self.mention_count {
            return Err(Error::CorruptProfile(format!(
                "framing history has {} entries, expected {}",
                self.framing_history.history.len(),
                self.mention_count
            )));
        }

        if !self.sentiment_history.latest.is_finite()
            || !self.sentiment_history.average.is_finite()
        {
            return Err(Error::CorruptProfile("non-finite sentiment".into()));
        }

        Ok(())
    }
}

/// Rolling profile for one canonical entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub canonical_entity_id: String,
    /// One-line summary, regenerated on every upsert
    pub content: String,
    #[serde(flatten)]
    pub metadata: ProfileMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityProfile {
    /// Create the profile for an entity's first mention.
    pub fn first(canonical_entity_id: &str, entity_name: &str, obs: &ProfileObservation) -> Self {
        let now = Utc::now();
        let metadata = ProfileMetadata::first(obs);
        Self {
            canonical_entity_id: canonical_entity_id.to_string(),
            content: summarize(entity_name, &metadata),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a subsequent mention.
    pub fn record(&mut self, entity_name: &str, obs: &ProfileObservation, max_samples: usize) {
        self.metadata.record(obs, max_samples);
        self.content = summarize(entity_name, &self.metadata);
        self.updated_at = Utc::now();
    }

    pub fn mention_count(&self) -> u64 {
        self.metadata.mention_count
    }
}

fn summarize(entity_name: &str, metadata: &ProfileMetadata) -> String {
    let days = metadata.temporal_histogram.len();
    format!(
        "{entity_name}: {} mention{} over {days} day{}, average sentiment {:.2}, latest framing {}",
        metadata.mention_count,
        if metadata.mention_count == 1 { "" } else { "s" },
        if days == 1 { "" } else { "s" },
        metadata.sentiment_history.average,
        metadata.framing_history.latest,
    )
}
