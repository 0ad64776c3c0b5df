//! Persist resolved mentions and keep entity profiles current.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::profile::ProfileObservation;
use crate::store::MentionStore;
use crate::types::{ContextSignals, RawMention};

pub use crate::store::RecordedMention;

/// Default cap on retained context sentences per profile.
pub const DEFAULT_MAX_CONTEXT_SAMPLES: usize = 50;

/// The canonical identity a mention was resolved to.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedIdentity<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Writes raw mentions, mention contexts, and profile updates.
pub struct ProfileRecorder {
    store: Arc<dyn MentionStore>,
    max_context_samples: usize,
}

impl ProfileRecorder {
    pub fn new(store: Arc<dyn MentionStore>) -> Self {
        Self {
            store,
            max_context_samples: DEFAULT_MAX_CONTEXT_SAMPLES,
        }
    }

    pub fn from_config(
        store: Arc<dyn MentionStore>,
        config: &newsdesk_common::ProfileConfig,
    ) -> Self {
        Self::new(store).with_max_context_samples(config.max_context_samples)
    }

    pub fn with_max_context_samples(mut self, max: usize) -> Self {
        self.max_context_samples = max.max(1);
        self
    }

    /// Record one resolved mention.
    ///
    /// Raw mention, mention context, `last_seen` and profile are written in
    /// one store transaction; on error none of them is kept.
    pub async fn record(
        &self,
        identity: ResolvedIdentity<'_>,
        mention: &RawMention,
        signals: &ContextSignals,
        mentioned_at: DateTime<Utc>,
    ) -> Result<RecordedMention> {
        let observation = ProfileObservation {
            context_text: mention.sentence_context.clone(),
            sentiment: signals.sentiment,
            framing: signals.framing.clone(),
            observed_at: mentioned_at,
        };
        let recorded = self
            .store
            .record_mention(
                identity.id,
                identity.name,
                mention,
                &observation,
                self.max_context_samples,
            )
            .await?;

        debug!(
            canonical_entity_id = identity.id,
            raw_entity_id = recorded.mention.id,
            mention_count = recorded.profile.mention_count(),
            "Recorded mention"
        );
        Ok(recorded)
    }
}
