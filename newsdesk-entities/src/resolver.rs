//! Entity resolution: map a raw mention to a canonical identity.
//!
//! Resolution is a pure computation over a caller-owned candidate pool.
//! Policy, first match wins:
//!
//! 1. Case-insensitive exact match of the mention text
//! 2. Exact match of the normalized mention text
//! 3. Best fuzzy match above the similarity threshold (earliest candidate wins ties)
//! 4. Otherwise mint a new identity named by the normalized text
//!
//! Only candidates of the mention's entity type are considered.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::similarity::similarity;
use crate::types::{CanonicalEntity, EntityType};

/// Default similarity threshold for fuzzy matches.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// A known identity the resolver may match against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Canonical entity id, when the identity has been persisted
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub entity_type: EntityType,
}

impl Candidate {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: None,
            name: name.into(),
            entity_type,
        }
    }
}

impl From<&CanonicalEntity> for Candidate {
    fn from(entity: &CanonicalEntity) -> Self {
        Self {
            id: Some(entity.id.clone()),
            name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
        }
    }
}

/// How a resolution was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactText,
    ExactNormalized,
    Fuzzy,
    New,
}

/// Outcome of resolving one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Canonical name
    pub name: String,
    pub entity_type: EntityType,
    pub is_new: bool,
    pub confidence: f64,
    pub original_text: String,
    pub match_kind: MatchKind,
    /// Id of the matched candidate, if it had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    /// Position of the matched candidate in the pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_index: Option<usize>,
}

impl Resolution {
    fn matched(
        candidate: &Candidate,
        index: usize,
        text: &str,
        confidence: f64,
        match_kind: MatchKind,
    ) -> Self {
        Self {
            name: candidate.name.clone(),
            entity_type: candidate.entity_type.clone(),
            is_new: false,
            confidence,
            original_text: text.to_string(),
            match_kind,
            canonical_id: candidate.id.clone(),
            pool_index: Some(index),
        }
    }
}

/// Resolves mentions against a candidate pool.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    threshold: f64,
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl EntityResolver {
    /// Create a resolver with the given fuzzy-match threshold (exclusive).
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Create from resolution config.
    pub fn from_config(config: &newsdesk_common::ResolutionConfig) -> Self {
        Self::new(config.similarity_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve one mention against a pool snapshot.
    ///
    /// Returns `InvalidMention` for empty text or a missing type.
    pub fn resolve(
        &self,
        mention_text: &str,
        mention_type: &EntityType,
        pool: &[Candidate],
    ) -> Result<Resolution> {
        let text = mention_text.trim();
        if text.is_empty() {
            return Err(Error::InvalidMention("mention text is empty".into()));
        }
        if mention_type.is_missing() {
            return Err(Error::InvalidMention(format!(
                "mention '{text}' has no entity type"
            )));
        }

        let same_type = || {
            pool.iter()
                .enumerate()
                .filter(move |(_, c)| &c.entity_type == mention_type)
        };

        let lowered = text.to_lowercase();
        if let Some((i, c)) = same_type().find(|(_, c)| c.name.to_lowercase() == lowered) {
            debug!(mention = %text, canonical = %c.name, "Resolved by exact text");
            return Ok(Resolution::matched(c, i, text, 1.0, MatchKind::ExactText));
        }

        let normalized = normalize(text);
        if let Some((i, c)) = same_type().find(|(_, c)| c.name == normalized) {
            debug!(mention = %text, canonical = %c.name, "Resolved by normalized text");
            return Ok(Resolution::matched(
                c,
                i,
                text,
                1.0,
                MatchKind::ExactNormalized,
            ));
        }

        let mut best: Option<(usize, &Candidate, f64)> = None;
        for (i, c) in same_type() {
            let score = similarity(&normalized, &c.name);
            // Strictly greater keeps the earliest candidate on ties.
            if best.map_or(true, |(_, _, s)| score > s) {
                best = Some((i, c, score));
            }
        }

        if let Some((i, c, score)) = best {
            if score > self.threshold {
                debug!(
                    mention = %text,
                    canonical = %c.name,
                    score,
                    "Resolved by similarity"
                );
                return Ok(Resolution::matched(c, i, text, score, MatchKind::Fuzzy));
            }
        }

        debug!(mention = %text, name = %normalized, "Minting new identity");
        Ok(Resolution {
            name: normalized,
            entity_type: mention_type.clone(),
            is_new: true,
            confidence: 1.0,
            original_text: text.to_string(),
            match_kind: MatchKind::New,
            canonical_id: None,
            pool_index: None,
        })
    }

    /// Resolve mentions in order, appending minted identities to `pool`.
    ///
    /// Repeat mentions within the batch resolve to the same identity. Invalid
    /// mentions yield an error entry and leave the pool untouched.
    pub fn resolve_batch<'a, I>(
        &self,
        mentions: I,
        pool: &mut Vec<Candidate>,
    ) -> Vec<Result<Resolution>>
    where
        I: IntoIterator<Item = (&'a str, &'a EntityType)>,
    {
        mentions
            .into_iter()
            .map(|(text, entity_type)| -> Result<Resolution> {
                let mut resolution = self.resolve(text, entity_type, pool)?;
                if resolution.is_new {
                    pool.push(Candidate::new(
                        resolution.name.clone(),
                        resolution.entity_type.clone(),
                    ));
                    resolution.pool_index = Some(pool.len() - 1);
                }
                Ok(resolution)
            })
            .collect()
    }
}
