//! Newsdesk Entities - cross-document entity resolution and trend detection.
//!
//! This crate provides:
//! - Name normalization and similarity for person and organization names
//! - An entity resolver mapping raw mentions to canonical identities
//! - Rolling per-entity profiles (mentions, sentiment, framing, daily histogram)
//! - A per-document ingestion pipeline
//! - Historical frequency tables with an instance-owned cache
//! - Novel-entity and frequency-spike detection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use newsdesk_common::Config;
//! use newsdesk_entities::{EntityPipeline, HistoricalAggregator, SqliteStore, TrendDetector};
//!
//! let config = Config::load_and_validate()?;
//! let store = Arc::new(SqliteStore::from_config(&config.storage)?);
//! let pipeline = EntityPipeline::new(store.clone(), store.clone(), &config);
//! pipeline.ingest_document(&document, &mentions).await?;
//!
//! let aggregator = Arc::new(HistoricalAggregator::from_config(store.clone(), &config));
//! let detector = TrendDetector::new(aggregator, store, config.trends.clone());
//! let trends = detector.detect(&[]).await?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod frequency;
pub mod normalize;
pub mod pipeline;
pub mod profile;
pub mod recorder;
pub mod resolver;
pub mod similarity;
pub mod store;
pub mod trends;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use frequency::{
    calculate_date_range, CacheStats, FrequencyCache, FrequencyTable, HistoricalAggregator,
    TopicFrequency,
};
pub use normalize::normalize;
pub use pipeline::{ContextScorer, EntityPipeline, IngestReport, NeutralScorer};
pub use profile::{EntityProfile, ProfileMetadata};
pub use recorder::{ProfileRecorder, RecordedMention, ResolvedIdentity};
pub use resolver::{Candidate, EntityResolver, MatchKind, Resolution};
pub use similarity::similarity;
pub use store::{DocumentStore, MentionStore, SqliteStore, StoreStats};
pub use trends::{
    EvidenceDocument, FrequencyPattern, RelatedEntity, TrendDetector, TrendResult, TrendStatus,
    TrendType,
};
pub use types::{
    CanonicalEntity, ContextSignals, Document, EntityType, MentionContext, RawMention,
    StoredMention,
};
