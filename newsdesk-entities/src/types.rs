//! Core data types: mentions, canonical entities, contexts, and documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named-entity label.
///
/// The extractor's label set is open; unknown labels are carried verbatim
/// (upper-cased) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EntityType {
    Person,
    Organization,
    /// Geo-political entity (countries, cities, states)
    Gpe,
    Location,
    /// Nationalities, religious or political groups
    Norp,
    Event,
    Product,
    WorkOfArt,
    Other(String),
}

impl EntityType {
    /// Canonical label as stored and keyed ("PERSON", "ORG", ...).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORG",
            Self::Gpe => "GPE",
            Self::Location => "LOC",
            Self::Norp => "NORP",
            Self::Event => "EVENT",
            Self::Product => "PRODUCT",
            Self::WorkOfArt => "WORK_OF_ART",
            Self::Other(label) => label,
        }
    }

    /// True when the extractor supplied no label.
    pub fn is_missing(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" | "ORGANISATION" => Self::Organization,
            "GPE" => Self::Gpe,
            "LOC" | "LOCATION" => Self::Location,
            "NORP" => Self::Norp,
            "EVENT" => Self::Event,
            "PRODUCT" => Self::Product,
            "WORK_OF_ART" => Self::WorkOfArt,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.as_str().to_string()
    }
}

/// One entity occurrence as produced by the external extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMention {
    /// Surface text of the mention
    pub text: String,
    pub entity_type: EntityType,
    /// Sentence the mention was found in
    #[serde(default)]
    pub sentence_context: String,
    pub document_id: String,
    /// Extractor confidence (0.0-1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl RawMention {
    pub fn new(
        text: impl Into<String>,
        entity_type: EntityType,
        sentence_context: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            entity_type,
            sentence_context: sentence_context.into(),
            document_id: document_id.into(),
            confidence: default_confidence(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A raw mention after it has been committed to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMention {
    /// Raw entity id referenced by mention contexts
    pub id: i64,
    pub text: String,
    pub entity_type: EntityType,
    pub document_id: String,
    pub sentence_context: String,
    pub confidence: f64,
    /// Publication time of the document, or ingestion time when unknown
    pub mentioned_at: DateTime<Utc>,
}

impl StoredMention {
    /// Frequency-table key: `"text:TYPE"`.
    pub fn entity_key(&self) -> String {
        entity_key(&self.text, &self.entity_type)
    }
}

/// Build the `"text:TYPE"` key used by frequency tables.
pub fn entity_key(text: &str, entity_type: &EntityType) -> String {
    format!("{}:{}", text, entity_type)
}

/// Stable identity for a real-world person, organization, or place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Signals derived from the sentence around a mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSignals {
    /// Sentiment in [-1.0, 1.0]
    pub sentiment: f64,
    /// Framing label (e.g., "neutral", "conflict", "economic")
    pub framing: String,
}

impl Default for ContextSignals {
    fn default() -> Self {
        Self {
            sentiment: 0.0,
            framing: "neutral".to_string(),
        }
    }
}

/// Input for appending a mention context.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMentionContext {
    pub canonical_entity_id: Option<String>,
    pub raw_entity_id: i64,
    pub document_id: String,
    pub context_text: String,
    pub sentiment_score: f64,
    pub context_type: String,
}

/// Local sentence and derived signals around one resolved mention.
///
/// Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionContext {
    pub id: i64,
    pub canonical_entity_id: Option<String>,
    pub raw_entity_id: i64,
    pub document_id: String,
    pub context_text: String,
    pub sentiment_score: f64,
    pub context_type: String,
    pub created_at: DateTime<Utc>,
}

/// Source article, used for evidence linking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            published_at: None,
        }
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}
