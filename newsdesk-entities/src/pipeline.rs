//! Per-document ingestion: resolve each mention, then record it.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use newsdesk_common::logging::generate_trace_id;
use newsdesk_common::Config;

use crate::error::Result;
use crate::recorder::{ProfileRecorder, ResolvedIdentity};
use crate::resolver::{Candidate, EntityResolver};
use crate::store::{DocumentStore, MentionStore};
use crate::types::{ContextSignals, Document, EntityType, RawMention};

/// Scores the sentence around a mention.
pub trait ContextScorer: Send + Sync {
    fn score(&self, context_text: &str, entity_name: &str) -> ContextSignals;
}

/// Scores everything as neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralScorer;

impl ContextScorer for NeutralScorer {
    fn score(&self, _context_text: &str, _entity_name: &str) -> ContextSignals {
        ContextSignals::default()
    }
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    /// Mentions resolved and recorded
    pub resolved: usize,
    /// Canonical entities created while ingesting
    pub created: usize,
    /// Mentions dropped as invalid or low-confidence
    pub skipped: usize,
}

/// Resolves and records the mentions of one document at a time.
pub struct EntityPipeline {
    resolver: EntityResolver,
    recorder: ProfileRecorder,
    mentions: Arc<dyn MentionStore>,
    documents: Arc<dyn DocumentStore>,
    scorer: Arc<dyn ContextScorer>,
    min_extractor_confidence: f64,
}

impl EntityPipeline {
    pub fn new(
        mentions: Arc<dyn MentionStore>,
        documents: Arc<dyn DocumentStore>,
        config: &Config,
    ) -> Self {
        Self {
            resolver: EntityResolver::from_config(&config.resolution),
            recorder: ProfileRecorder::from_config(Arc::clone(&mentions), &config.profiles),
            mentions,
            documents,
            scorer: Arc::new(NeutralScorer),
            min_extractor_confidence: config.resolution.min_extractor_confidence,
        }
    }

    /// Replace the context scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn ContextScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Ingest one document and its extracted mentions.
    ///
    /// Mentions are resolved in order against a pool that grows as new
    /// identities are created, so repeats within the document converge.
    /// Invalid mentions are skipped; storage errors abort the document.
    pub async fn ingest_document(
        &self,
        document: &Document,
        mentions: &[RawMention],
    ) -> Result<IngestReport> {
        let span = info_span!(
            "ingest_document",
            trace_id = %generate_trace_id(),
            document_id = %document.id
        );
        self.ingest(document, mentions).instrument(span).await
    }

    async fn ingest(&self, document: &Document, mentions: &[RawMention]) -> Result<IngestReport> {
        self.documents.upsert_document(document).await?;

        let entity_types: Vec<EntityType> = mentions
            .iter()
            .filter(|m| !m.entity_type.is_missing())
            .map(|m| m.entity_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut pool: Vec<Candidate> = if entity_types.is_empty() {
            Vec::new()
        } else {
            self.mentions
                .list_canonicals(&entity_types)
                .await?
                .iter()
                .map(Candidate::from)
                .collect()
        };

        let mentioned_at = document.published_at.unwrap_or_else(Utc::now);
        let mut report = IngestReport {
            document_id: document.id.clone(),
            ..Default::default()
        };

        for mention in mentions {
            if mention.confidence < self.min_extractor_confidence {
                debug!(
                    mention = %mention.text,
                    confidence = mention.confidence,
                    "Skipping low-confidence mention"
                );
                report.skipped += 1;
                continue;
            }

            let resolved = self
                .resolver
                .resolve(&mention.text, &mention.entity_type, &pool);
            let resolution = match resolved {
                Ok(resolution) => resolution,
                Err(e) if e.is_invalid_mention() => {
                    warn!(error = %e, "Skipping mention");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (canonical_id, canonical_name) = match &resolution.canonical_id {
                Some(id) => (id.clone(), resolution.name.clone()),
                None => {
                    let (entity, created) = self
                        .mentions
                        .create_canonical(&resolution.name, &resolution.entity_type, mentioned_at)
                        .await?;
                    if created {
                        report.created += 1;
                    }
                    match resolution.pool_index {
                        Some(i) => pool[i].id = Some(entity.id.clone()),
                        None => pool.push(Candidate::from(&entity)),
                    }
                    (entity.id, entity.name)
                }
            };

            let signals = self.scorer.score(&mention.sentence_context, &canonical_name);
            self.recorder
                .record(
                    ResolvedIdentity {
                        id: &canonical_id,
                        name: &canonical_name,
                    },
                    mention,
                    &signals,
                    mentioned_at,
                )
                .await?;
            report.resolved += 1;
        }

        info!(
            resolved = report.resolved,
            created = report.created,
            skipped = report.skipped,
            "Ingested document"
        );
        Ok(report)
    }
}
