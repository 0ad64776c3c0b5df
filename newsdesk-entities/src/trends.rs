//! Trend detection over historical mention frequencies.
//!
//! The current window is compared against a baseline scaled to the same
//! length. An entity with no baseline mentions is novel; one whose current
//! count is significantly above its expected count is spiking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use newsdesk_common::TrendConfig;

use crate::error::Result;
use crate::frequency::{bucket_keys_between, HistoricalAggregator, TopicFrequency};
use crate::store::DocumentStore;
use crate::types::{EntityType, StoredMention};

const MAX_EVIDENCE_DOCUMENTS: usize = 3;
const MAX_RELATED_ENTITIES: usize = 5;
/// Documents scanned for co-mentions, busiest first.
const MAX_CO_MENTION_DOCUMENTS: usize = 50;

/// z-score assigned to entities with no baseline.
const NOVEL_Z_SCORE: f64 = 2.0;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendType {
    NovelEntity,
    FrequencySpike,
}

impl std::fmt::Display for TrendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NovelEntity => write!(f, "NOVEL_ENTITY"),
            Self::FrequencySpike => write!(f, "FREQUENCY_SPIKE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendStatus {
    Potential,
    Confirmed,
}

/// Shape of a frequency series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrequencyPattern {
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub is_spiky: bool,
    pub is_consistent: bool,
}

/// Entity co-mentioned in the trending entity's documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub co_occurrences: u64,
}

/// Document supporting a trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDocument {
    pub document_id: String,
    pub title: String,
    pub url: String,
    pub mention_count: u64,
}

/// One detected trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub trend_type: TrendType,
    pub name: String,
    pub entity_type: EntityType,
    pub description: String,
    /// Standard normal CDF of the z-score
    pub confidence_score: f64,
    pub z_score: f64,
    pub current_mentions: u64,
    /// Baseline mentions scaled to one current window
    pub baseline_mentions: f64,
    pub pattern: FrequencyPattern,
    status: TrendStatus,
    /// First mention inside the current window
    pub start_date: DateTime<Utc>,
    pub related_entities: Vec<RelatedEntity>,
    pub evidence_documents: Vec<EvidenceDocument>,
}

impl TrendResult {
    /// Status assigned at detection time.
    pub fn status(&self) -> TrendStatus {
        self.status
    }
}

/// Standard normal CDF.
fn normal_cdf(z: f64) -> f64 {
    Normal::new(0.0, 1.0).map(|n| n.cdf(z)).unwrap_or(0.5)
}

// ============================================================================
// Detector
// ============================================================================

pub struct TrendDetector {
    aggregator: Arc<HistoricalAggregator>,
    documents: Arc<dyn DocumentStore>,
    config: TrendConfig,
}

impl TrendDetector {
    pub fn new(
        aggregator: Arc<HistoricalAggregator>,
        documents: Arc<dyn DocumentStore>,
        config: TrendConfig,
    ) -> Self {
        Self {
            aggregator,
            documents,
            config,
        }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// z-score of `current` against an expected `baseline` count, and whether
    /// it clears the significance threshold.
    ///
    /// Any appearance against a zero baseline is significant. Variance is
    /// taken as `max(baseline, 1)`.
    pub fn calculate_statistical_significance(&self, current: f64, baseline: f64) -> (f64, bool) {
        if baseline == 0.0 && current > 0.0 {
            return (NOVEL_Z_SCORE, true);
        }

        let variance = baseline.max(1.0);
        let z = (current - baseline) / variance.sqrt();
        if !z.is_finite() {
            return (0.0, false);
        }
        (z, z > self.config.significance_z)
    }

    /// Population mean, standard deviation and coefficient of variation.
    pub fn analyze_frequency_patterns(&self, series: &[f64]) -> FrequencyPattern {
        if series.is_empty() {
            return FrequencyPattern::default();
        }

        let mean = series.iter().mean();
        let std_dev = series.iter().population_std_dev();
        let coefficient_of_variation = if mean == 0.0 { 0.0 } else { std_dev / mean };

        FrequencyPattern {
            mean,
            std_dev,
            coefficient_of_variation,
            is_spiky: coefficient_of_variation > self.config.spiky_cov_threshold,
            is_consistent: coefficient_of_variation < self.config.consistent_cov_threshold,
        }
    }

    /// Detect with the configured minimum mention count.
    pub async fn detect(&self, entity_types: &[EntityType]) -> Result<Vec<TrendResult>> {
        self.detect_entity_trends(entity_types, self.config.min_mentions_for_trend)
            .await
    }

    /// Novel entities and frequency spikes in the current window, ranked by
    /// confidence.
    pub async fn detect_entity_trends(
        &self,
        entity_types: &[EntityType],
        min_mentions: u64,
    ) -> Result<Vec<TrendResult>> {
        let baseline_periods = self.config.baseline_periods.max(1);
        let (current, baseline) = self
            .aggregator
            .get_baseline_frequencies(
                entity_types,
                self.config.unit,
                self.config.current_periods,
                baseline_periods,
            )
            .await?;

        let buckets = bucket_keys_between(&current.start, &current.end, current.granularity);

        let mut candidates: Vec<(&TopicFrequency, TrendType, f64, f64)> = Vec::new();
        for topic in current.iter() {
            if topic.total_mentions < min_mentions {
                continue;
            }

            let baseline_total = baseline
                .get(&topic.key())
                .map_or(0, |t| t.total_mentions);
            let expected = baseline_total as f64 / f64::from(baseline_periods);
            let observed = topic.total_mentions as f64;
            let (z_score, significant) =
                self.calculate_statistical_significance(observed, expected);

            let trend_type = if baseline_total == 0 {
                TrendType::NovelEntity
            } else if significant && observed > expected {
                TrendType::FrequencySpike
            } else {
                debug!(entity = %topic.key(), z_score, "Not trending");
                continue;
            };
            candidates.push((topic, trend_type, z_score, expected));
        }

        if candidates.is_empty() {
            info!(entities = current.len(), "No trends detected");
            return Ok(Vec::new());
        }

        let window_mentions = self
            .aggregator
            .store()
            .query_mentions_by_type_and_date(entity_types, current.start, current.end)
            .await?;
        let mut by_entity: HashMap<String, Vec<&StoredMention>> = HashMap::new();
        for mention in &window_mentions {
            by_entity.entry(mention.entity_key()).or_default().push(mention);
        }

        let mut results = Vec::with_capacity(candidates.len());
        for (topic, trend_type, z_score, expected) in candidates {
            let key = topic.key();
            let mentions = by_entity.get(&key).map(Vec::as_slice).unwrap_or_default();

            let doc_counts = count_documents(mentions);
            let evidence_documents = self.evidence_documents(&doc_counts).await?;
            let related_entities = self
                .related_entities(&key, &doc_counts, (current.start, current.end))
                .await?;

            let confidence_score = normal_cdf(z_score);
            let status = if confidence_score >= self.config.confirmed_confidence {
                TrendStatus::Confirmed
            } else {
                TrendStatus::Potential
            };

            let description = match trend_type {
                TrendType::NovelEntity => format!(
                    "{} ({}) appeared {} times with no baseline mentions",
                    topic.topic, topic.entity_type, topic.total_mentions
                ),
                TrendType::FrequencySpike => format!(
                    "{} ({}) mentioned {} times against {:.1} expected (z = {:.2})",
                    topic.topic, topic.entity_type, topic.total_mentions, expected, z_score
                ),
            };

            results.push(TrendResult {
                trend_type,
                name: topic.topic.clone(),
                entity_type: topic.entity_type.clone(),
                description,
                confidence_score,
                z_score,
                current_mentions: topic.total_mentions,
                baseline_mentions: expected,
                pattern: self.analyze_frequency_patterns(&topic.series(&buckets)),
                status,
                start_date: mentions
                    .iter()
                    .map(|m| m.mentioned_at)
                    .min()
                    .unwrap_or(current.start),
                related_entities,
                evidence_documents,
            });
        }

        results.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.current_mentions.cmp(&a.current_mentions))
                .then_with(|| a.name.cmp(&b.name))
        });

        info!(
            trends = results.len(),
            confirmed = results
                .iter()
                .filter(|r| r.status == TrendStatus::Confirmed)
                .count(),
            "Detected entity trends"
        );
        Ok(results)
    }

    async fn evidence_documents(
        &self,
        doc_counts: &[(String, u64)],
    ) -> Result<Vec<EvidenceDocument>> {
        let mut evidence = Vec::new();
        for (document_id, mention_count) in doc_counts.iter().take(MAX_EVIDENCE_DOCUMENTS) {
            let (title, url) = match self.documents.get_document(document_id).await? {
                Some(doc) => (doc.title, doc.url),
                None => (document_id.clone(), String::new()),
            };
            evidence.push(EvidenceDocument {
                document_id: document_id.clone(),
                title,
                url,
                mention_count: *mention_count,
            });
        }
        Ok(evidence)
    }

    /// Other entities mentioned in the same documents within `window`.
    async fn related_entities(
        &self,
        key: &str,
        doc_counts: &[(String, u64)],
        (start, end): (DateTime<Utc>, DateTime<Utc>),
    ) -> Result<Vec<RelatedEntity>> {
        let document_ids: Vec<String> = doc_counts
            .iter()
            .take(MAX_CO_MENTION_DOCUMENTS)
            .map(|(id, _)| id.clone())
            .collect();
        let co_mentions = self
            .aggregator
            .store()
            .query_mentions_for_documents(&document_ids)
            .await?;

        let mut counts: BTreeMap<(String, EntityType), u64> = BTreeMap::new();
        let in_window = co_mentions
            .iter()
            .filter(|m| m.mentioned_at >= start && m.mentioned_at <= end);
        for mention in in_window.filter(|m| m.entity_key() != key) {
            *counts
                .entry((mention.text.clone(), mention.entity_type.clone()))
                .or_insert(0) += 1;
        }

        let mut related: Vec<RelatedEntity> = counts
            .into_iter()
            .map(|((name, entity_type), co_occurrences)| RelatedEntity {
                name,
                entity_type,
                co_occurrences,
            })
            .collect();
        // Stable sort keeps the (name, type) order among equal counts
        related.sort_by(|a, b| b.co_occurrences.cmp(&a.co_occurrences));
        related.truncate(MAX_RELATED_ENTITIES);
        Ok(related)
    }
}

/// Mentions per document, most first, ties by document id.
fn count_documents(mentions: &[&StoredMention]) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for mention in mentions {
        *counts.entry(mention.document_id.as_str()).or_insert(0) += 1;
    }
    let mut counts: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(id, n)| (id.to_string(), n))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
