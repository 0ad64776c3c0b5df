//! Storage collaborators for mentions, identities, profiles, and documents.
//!
//! The core only talks to storage through these traits; [`SqliteStore`] is
//! the bundled implementation.

mod sqlite;

pub use sqlite::{SqliteStore, StoreStats};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::profile::{EntityProfile, ProfileObservation};
use crate::types::{
    CanonicalEntity, Document, EntityType, MentionContext, NewMentionContext, RawMention,
    StoredMention,
};

/// Everything written for one resolved mention.
#[derive(Debug, Clone)]
pub struct RecordedMention {
    pub mention: StoredMention,
    pub context: MentionContext,
    pub profile: EntityProfile,
}

/// Persistence for canonical entities, raw mentions, contexts, and profiles.
///
/// Every method is atomic on its own. An empty `entity_types` slice means
/// "all types".
#[async_trait]
pub trait MentionStore: Send + Sync {
    /// Backend name (e.g., "sqlite")
    fn name(&self) -> &str;

    /// Look up an identity by exact canonical name and type.
    async fn get_canonical_by_name(
        &self,
        name: &str,
        entity_type: &EntityType,
    ) -> Result<Option<CanonicalEntity>>;

    /// All identities of the given types, in creation order.
    async fn list_canonicals(&self, entity_types: &[EntityType]) -> Result<Vec<CanonicalEntity>>;

    /// Get-or-create an identity.
    ///
    /// Returns the entity and whether this call created it.
    async fn create_canonical(
        &self,
        name: &str,
        entity_type: &EntityType,
        seen_at: DateTime<Utc>,
    ) -> Result<(CanonicalEntity, bool)>;

    /// Advance `last_seen`. Never moves it backwards.
    async fn touch_canonical(&self, id: &str, seen_at: DateTime<Utc>) -> Result<()>;

    async fn append_raw_mention(
        &self,
        mention: &RawMention,
        mentioned_at: DateTime<Utc>,
    ) -> Result<StoredMention>;

    async fn append_mention_context(&self, context: &NewMentionContext) -> Result<MentionContext>;

    /// Read-modify-write of one entity's profile, serialized per store.
    async fn upsert_profile(
        &self,
        canonical_entity_id: &str,
        entity_name: &str,
        observation: &ProfileObservation,
        max_context_samples: usize,
    ) -> Result<EntityProfile>;

    /// Write one resolved mention as a single transaction: raw mention,
    /// mention context, `last_seen`, then profile.
    ///
    /// On any failure nothing is committed, so the profile's mention count
    /// always equals the number of stored contexts for the entity.
    async fn record_mention(
        &self,
        canonical_entity_id: &str,
        entity_name: &str,
        mention: &RawMention,
        observation: &ProfileObservation,
        max_context_samples: usize,
    ) -> Result<RecordedMention>;

    /// Fetch a profile. Fails with `CorruptProfile` if the stored metadata
    /// does not validate.
    async fn get_profile(&self, canonical_entity_id: &str) -> Result<Option<EntityProfile>>;

    async fn count_mention_contexts(&self, canonical_entity_id: &str) -> Result<u64>;

    /// Raw mentions with `start <= mentioned_at <= end`, oldest first.
    async fn query_mentions_by_type_and_date(
        &self,
        entity_types: &[EntityType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredMention>>;

    /// All raw mentions found in the given documents.
    async fn query_mentions_for_documents(
        &self,
        document_ids: &[String],
    ) -> Result<Vec<StoredMention>>;
}

/// Persistence for source documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document by id.
    async fn upsert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
}
