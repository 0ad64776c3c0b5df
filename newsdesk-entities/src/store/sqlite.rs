//! SQLite-backed mention and document store.
//!
//! One connection behind an async mutex, WAL journal. Profile upserts and
//! whole mention records run in IMMEDIATE transactions so concurrent updates
//! to one entity are applied one after another.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{DocumentStore, MentionStore, RecordedMention};
use crate::error::{Error, Result};
use crate::profile::{EntityProfile, ProfileMetadata, ProfileObservation};
use crate::types::{
    CanonicalEntity, Document, EntityType, MentionContext, NewMentionContext, RawMention,
    StoredMention,
};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Source documents
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    published_at TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- One row per real-world identity
CREATE TABLE IF NOT EXISTS canonical_entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    description TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    UNIQUE(name, entity_type)
);

CREATE INDEX IF NOT EXISTS idx_canonical_entities_type
ON canonical_entities(entity_type);

-- Extractor output, one row per occurrence
CREATE TABLE IF NOT EXISTS raw_mentions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    document_id TEXT NOT NULL,
    sentence_context TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 1.0,
    mentioned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_mentions_type_date
ON raw_mentions(entity_type, mentioned_at);

CREATE INDEX IF NOT EXISTS idx_raw_mentions_document
ON raw_mentions(document_id);

-- Append-only resolved occurrences
CREATE TABLE IF NOT EXISTS mention_contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_entity_id TEXT,
    raw_entity_id INTEGER NOT NULL,
    document_id TEXT NOT NULL,
    context_text TEXT NOT NULL,
    sentiment_score REAL NOT NULL DEFAULT 0.0,
    context_type TEXT NOT NULL DEFAULT 'neutral',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mention_contexts_entity
ON mention_contexts(canonical_entity_id);

-- Rolling profile per identity
CREATE TABLE IF NOT EXISTS entity_profiles (
    canonical_entity_id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const CANONICAL_COLUMNS: &str =
    "id, name, entity_type, description, metadata, first_seen, last_seen";

const MENTION_COLUMNS: &str =
    "id, text, entity_type, document_id, sentence_context, confidence, mentioned_at";

// ============================================================================
// Row Mapping
// ============================================================================

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn to_sql_ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_canonical(row: &rusqlite::Row) -> rusqlite::Result<CanonicalEntity> {
    let metadata: String = row.get(4)?;
    Ok(CanonicalEntity {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: EntityType::from(row.get::<_, String>(2)?),
        description: row.get(3)?,
        metadata: serde_json::from_str(&metadata).map_err(|e| conversion_error(4, e))?,
        first_seen: parse_ts(5, &row.get::<_, String>(5)?)?,
        last_seen: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

fn row_to_mention(row: &rusqlite::Row) -> rusqlite::Result<StoredMention> {
    Ok(StoredMention {
        id: row.get(0)?,
        text: row.get(1)?,
        entity_type: EntityType::from(row.get::<_, String>(2)?),
        document_id: row.get(3)?,
        sentence_context: row.get(4)?,
        confidence: row.get(5)?,
        mentioned_at: parse_ts(6, &row.get::<_, String>(6)?)?,
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let published_at: Option<String> = row.get(3)?;
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        published_at: published_at.map(|raw| parse_ts(3, &raw)).transpose()?,
    })
}

/// Profile columns as stored, before validation.
struct ProfileRow {
    content: String,
    metadata: String,
    created_at: String,
    updated_at: String,
}

fn row_to_profile_row(row: &rusqlite::Row) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        content: row.get(0)?,
        metadata: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Decode and validate a stored profile.
fn decode_profile(canonical_entity_id: &str, row: ProfileRow) -> Result<EntityProfile> {
    let corrupt = |what: String| Error::CorruptProfile(format!("{canonical_entity_id}: {what}"));

    let metadata: ProfileMetadata =
        serde_json::from_str(&row.metadata).map_err(|e| corrupt(e.to_string()))?;
    metadata.validate()?;

    let parse = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad timestamp '{raw}': {e}")))
    };

    Ok(EntityProfile {
        canonical_entity_id: canonical_entity_id.to_string(),
        content: row.content,
        metadata,
        created_at: parse(&row.created_at)?,
        updated_at: parse(&row.updated_at)?,
    })
}

/// `column IN (?, ?, ...)` for a type list; an empty list matches everything.
fn type_filter(column: &str, entity_types: &[EntityType]) -> (String, Vec<String>) {
    if entity_types.is_empty() {
        return ("1 = 1".to_string(), Vec::new());
    }
    let placeholders = vec!["?"; entity_types.len()].join(", ");
    let values = entity_types
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    (format!("{column} IN ({placeholders})"), values)
}

/// Bound parameters per `IN (...)` statement, under SQLite's default limit.
const DOCUMENT_ID_CHUNK: usize = 500;

// ============================================================================
// Statements
// ============================================================================

fn insert_raw_mention(
    conn: &Connection,
    mention: &RawMention,
    mentioned_at: DateTime<Utc>,
) -> rusqlite::Result<StoredMention> {
    conn.execute(
        "INSERT INTO raw_mentions
         (text, entity_type, document_id, sentence_context, confidence, mentioned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            mention.text,
            mention.entity_type.as_str(),
            mention.document_id,
            mention.sentence_context,
            mention.confidence,
            to_sql_ts(&mentioned_at),
        ],
    )?;

    Ok(StoredMention {
        id: conn.last_insert_rowid(),
        text: mention.text.clone(),
        entity_type: mention.entity_type.clone(),
        document_id: mention.document_id.clone(),
        sentence_context: mention.sentence_context.clone(),
        confidence: mention.confidence,
        mentioned_at,
    })
}

fn insert_mention_context(
    conn: &Connection,
    context: &NewMentionContext,
) -> rusqlite::Result<MentionContext> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO mention_contexts
         (canonical_entity_id, raw_entity_id, document_id, context_text,
          sentiment_score, context_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            context.canonical_entity_id,
            context.raw_entity_id,
            context.document_id,
            context.context_text,
            context.sentiment_score,
            context.context_type,
            to_sql_ts(&created_at),
        ],
    )?;

    Ok(MentionContext {
        id: conn.last_insert_rowid(),
        canonical_entity_id: context.canonical_entity_id.clone(),
        raw_entity_id: context.raw_entity_id,
        document_id: context.document_id.clone(),
        context_text: context.context_text.clone(),
        sentiment_score: context.sentiment_score,
        context_type: context.context_type.clone(),
        created_at,
    })
}

fn advance_last_seen(conn: &Connection, id: &str, seen_at: DateTime<Utc>) -> Result<()> {
    let updated = conn.execute(
        "UPDATE canonical_entities SET last_seen = MAX(last_seen, ?2) WHERE id = ?1",
        params![id, to_sql_ts(&seen_at)],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("canonical entity {id}")));
    }
    Ok(())
}

/// Read-modify-write of one profile. Callers hold an IMMEDIATE transaction.
fn write_profile(
    conn: &Connection,
    canonical_entity_id: &str,
    entity_name: &str,
    observation: &ProfileObservation,
    max_context_samples: usize,
) -> Result<EntityProfile> {
    let existing = conn
        .query_row(
            "SELECT content, metadata, created_at, updated_at
             FROM entity_profiles WHERE canonical_entity_id = ?1",
            params![canonical_entity_id],
            row_to_profile_row,
        )
        .optional()?;

    let profile = match existing {
        Some(row) => {
            let mut profile = decode_profile(canonical_entity_id, row)?;
            profile.record(entity_name, observation, max_context_samples);
            profile
        }
        None => EntityProfile::first(canonical_entity_id, entity_name, observation),
    };

    conn.execute(
        "INSERT INTO entity_profiles
         (canonical_entity_id, content, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(canonical_entity_id) DO UPDATE SET
            content = excluded.content,
            metadata = excluded.metadata,
            updated_at = excluded.updated_at",
        params![
            canonical_entity_id,
            profile.content,
            serde_json::to_string(&profile.metadata)?,
            to_sql_ts(&profile.created_at),
            to_sql_ts(&profile.updated_at),
        ],
    )?;
    Ok(profile)
}

// ============================================================================
// Store
// ============================================================================

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub canonical_entities: u64,
    pub raw_mentions: u64,
    pub mention_contexts: u64,
    pub profiles: u64,
}

/// SQLite implementation of [`MentionStore`] and [`DocumentStore`].
#[derive(Clone)]
pub struct SqliteStore {
    /// rusqlite::Connection is Send but not Sync, so it sits behind a Mutex
    db: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open entity database {}", path.display()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, None)
    }

    /// Open the database named by `storage.db_path`.
    pub fn from_config(config: &newsdesk_common::StorageConfig) -> anyhow::Result<Self> {
        Self::open(config.resolved_db_path())
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        info!(
            db_path = %db_path.as_deref().map_or(":memory:".into(), |p| p.display().to_string()),
            "Initialized entity store"
        );

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Database file, or `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.lock().await;
        let count = |table: &str| -> rusqlite::Result<u64> {
            db.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n.max(0) as u64)
        };

        Ok(StoreStats {
            documents: count("documents")?,
            canonical_entities: count("canonical_entities")?,
            raw_mentions: count("raw_mentions")?,
            mention_contexts: count("mention_contexts")?,
            profiles: count("entity_profiles")?,
        })
    }
}

#[async_trait]
impl MentionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_canonical_by_name(
        &self,
        name: &str,
        entity_type: &EntityType,
    ) -> Result<Option<CanonicalEntity>> {
        let db = self.db.lock().await;
        let entity = db
            .query_row(
                &format!(
                    "SELECT {CANONICAL_COLUMNS} FROM canonical_entities
                     WHERE name = ?1 AND entity_type = ?2"
                ),
                params![name, entity_type.as_str()],
                row_to_canonical,
            )
            .optional()?;
        Ok(entity)
    }

    async fn list_canonicals(&self, entity_types: &[EntityType]) -> Result<Vec<CanonicalEntity>> {
        let (filter, values) = type_filter("entity_type", entity_types);
        let sql = format!(
            "SELECT {CANONICAL_COLUMNS} FROM canonical_entities WHERE {filter} ORDER BY rowid"
        );

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let entities = stmt
            .query_map(params_from_iter(values.iter()), row_to_canonical)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    async fn create_canonical(
        &self,
        name: &str,
        entity_type: &EntityType,
        seen_at: DateTime<Utc>,
    ) -> Result<(CanonicalEntity, bool)> {
        let db = self.db.lock().await;
        let seen = to_sql_ts(&seen_at);
        let inserted = db.execute(
            "INSERT OR IGNORE INTO canonical_entities
             (id, name, entity_type, metadata, first_seen, last_seen)
             VALUES (?1, ?2, ?3, '{}', ?4, ?4)",
            params![uuid::Uuid::new_v4().to_string(), name, entity_type.as_str(), seen],
        )?;

        let entity = db.query_row(
            &format!(
                "SELECT {CANONICAL_COLUMNS} FROM canonical_entities
                 WHERE name = ?1 AND entity_type = ?2"
            ),
            params![name, entity_type.as_str()],
            row_to_canonical,
        )?;

        let created = inserted == 1;
        if created {
            info!(
                id = %entity.id,
                name = %entity.name,
                entity_type = %entity.entity_type,
                "Created canonical entity"
            );
        }
        Ok((entity, created))
    }

    async fn touch_canonical(&self, id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        advance_last_seen(&db, id, seen_at)
    }

    async fn append_raw_mention(
        &self,
        mention: &RawMention,
        mentioned_at: DateTime<Utc>,
    ) -> Result<StoredMention> {
        let db = self.db.lock().await;
        Ok(insert_raw_mention(&db, mention, mentioned_at)?)
    }

    async fn append_mention_context(&self, context: &NewMentionContext) -> Result<MentionContext> {
        let db = self.db.lock().await;
        Ok(insert_mention_context(&db, context)?)
    }

    async fn upsert_profile(
        &self,
        canonical_entity_id: &str,
        entity_name: &str,
        observation: &ProfileObservation,
        max_context_samples: usize,
    ) -> Result<EntityProfile> {
        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let profile = write_profile(
            &tx,
            canonical_entity_id,
            entity_name,
            observation,
            max_context_samples,
        )?;
        tx.commit()?;

        debug!(
            canonical_entity_id,
            mention_count = profile.mention_count(),
            "Upserted entity profile"
        );
        Ok(profile)
    }

    async fn record_mention(
        &self,
        canonical_entity_id: &str,
        entity_name: &str,
        mention: &RawMention,
        observation: &ProfileObservation,
        max_context_samples: usize,
    ) -> Result<RecordedMention> {
        let mut db = self.db.lock().await;
        // Dropping the transaction on an early return rolls every step back
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = insert_raw_mention(&tx, mention, observation.observed_at)?;
        let context = insert_mention_context(
            &tx,
            &NewMentionContext {
                canonical_entity_id: Some(canonical_entity_id.to_string()),
                raw_entity_id: stored.id,
                document_id: mention.document_id.clone(),
                context_text: mention.sentence_context.clone(),
                sentiment_score: observation.sentiment,
                context_type: observation.framing.clone(),
            },
        )?;
        advance_last_seen(&tx, canonical_entity_id, observation.observed_at)?;
        let profile = write_profile(
            &tx,
            canonical_entity_id,
            entity_name,
            observation,
            max_context_samples,
        )?;
        tx.commit()?;

        Ok(RecordedMention {
            mention: stored,
            context,
            profile,
        })
    }

    async fn get_profile(&self, canonical_entity_id: &str) -> Result<Option<EntityProfile>> {
        let row = {
            let db = self.db.lock().await;
            db.query_row(
                "SELECT content, metadata, created_at, updated_at
                 FROM entity_profiles WHERE canonical_entity_id = ?1",
                params![canonical_entity_id],
                row_to_profile_row,
            )
            .optional()?
        };

        row.map(|row| decode_profile(canonical_entity_id, row))
            .transpose()
    }

    async fn count_mention_contexts(&self, canonical_entity_id: &str) -> Result<u64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM mention_contexts WHERE canonical_entity_id = ?1",
            params![canonical_entity_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    async fn query_mentions_by_type_and_date(
        &self,
        entity_types: &[EntityType],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredMention>> {
        let (filter, mut values) = type_filter("entity_type", entity_types);
        values.push(to_sql_ts(&start));
        values.push(to_sql_ts(&end));
        let sql = format!(
            "SELECT {MENTION_COLUMNS} FROM raw_mentions
             WHERE {filter} AND mentioned_at >= ? AND mentioned_at <= ?
             ORDER BY mentioned_at, id"
        );

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let mentions = stmt
            .query_map(params_from_iter(values.iter()), row_to_mention)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(mentions)
    }

    async fn query_mentions_for_documents(
        &self,
        document_ids: &[String],
    ) -> Result<Vec<StoredMention>> {
        let db = self.db.lock().await;
        let mut mentions = Vec::new();
        for chunk in document_ids.chunks(DOCUMENT_ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {MENTION_COLUMNS} FROM raw_mentions
                 WHERE document_id IN ({placeholders})"
            );
            let mut stmt = db.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), row_to_mention)?;
            for row in rows {
                mentions.push(row?);
            }
        }
        // Duplicate ids across chunks would repeat rows
        mentions.sort_by_key(|m| m.id);
        mentions.dedup_by_key(|m| m.id);
        Ok(mentions)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert_document(&self, document: &Document) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO documents (id, title, url, published_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                published_at = excluded.published_at",
            params![
                document.id,
                document.title,
                document.url,
                document.published_at.as_ref().map(to_sql_ts),
            ],
        )?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let db = self.db.lock().await;
        let document = db
            .query_row(
                "SELECT id, title, url, published_at FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path().join("entities.db")).unwrap();
        (tmp, store)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn observation(sentiment: f64) -> ProfileObservation {
        ProfileObservation {
            context_text: "The senator spoke.".into(),
            sentiment,
            framing: "neutral".into(),
            observed_at: at(1, 9),
        }
    }

    #[tokio::test]
    async fn open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dir").join("entities.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.db_path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn create_canonical_is_get_or_create() {
        let (_tmp, store) = setup();

        let (first, created) = store
            .create_canonical("Joe Biden", &EntityType::Person, at(1, 9))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(first.first_seen, at(1, 9));

        let (again, created) = store
            .create_canonical("Joe Biden", &EntityType::Person, at(2, 9))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (other, created) = store
            .create_canonical("Joe Biden", &EntityType::Organization, at(2, 9))
            .await
            .unwrap();
        assert!(created);
        assert_ne!(other.id, first.id);

        let found = store
            .get_canonical_by_name("Joe Biden", &EntityType::Person)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, first);
    }

    #[tokio::test]
    async fn touch_never_regresses_last_seen() {
        let (_tmp, store) = setup();
        let (entity, _) = store
            .create_canonical("Acme", &EntityType::Organization, at(5, 0))
            .await
            .unwrap();

        store.touch_canonical(&entity.id, at(7, 0)).await.unwrap();
        store.touch_canonical(&entity.id, at(6, 0)).await.unwrap();

        let entity = store
            .get_canonical_by_name("Acme", &EntityType::Organization)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.last_seen, at(7, 0));
        assert_eq!(entity.first_seen, at(5, 0));

        let err = store.touch_canonical("missing", at(8, 0)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_canonicals_filters_and_keeps_creation_order() {
        let (_tmp, store) = setup();
        for (name, entity_type) in [
            ("Zeta Corp", EntityType::Organization),
            ("Alice Smith", EntityType::Person),
            ("Acme", EntityType::Organization),
        ] {
            store.create_canonical(name, &entity_type, at(1, 0)).await.unwrap();
        }

        let orgs = store
            .list_canonicals(&[EntityType::Organization])
            .await
            .unwrap();
        let names: Vec<&str> = orgs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta Corp", "Acme"]);

        let all = store.list_canonicals(&[]).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn date_range_is_inclusive() {
        let (_tmp, store) = setup();
        for day in 1..=5 {
            let mention =
                RawMention::new("Mayor Johnson", EntityType::Person, "", format!("doc-{day}"));
            store.append_raw_mention(&mention, at(day, 0)).await.unwrap();
        }
        let org = RawMention::new("Acme", EntityType::Organization, "", "doc-1");
        store.append_raw_mention(&org, at(2, 0)).await.unwrap();

        let mentions = store
            .query_mentions_by_type_and_date(&[EntityType::Person], at(2, 0), at(4, 0))
            .await
            .unwrap();
        let docs: Vec<&str> = mentions.iter().map(|m| m.document_id.as_str()).collect();
        assert_eq!(docs, vec!["doc-2", "doc-3", "doc-4"]);

        let by_doc = store
            .query_mentions_for_documents(&["doc-1".to_string()])
            .await
            .unwrap();
        assert_eq!(by_doc.len(), 2);
        assert!(store.query_mentions_for_documents(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_profile_aggregates() {
        let (_tmp, store) = setup();

        let first = store
            .upsert_profile("e1", "Jane Doe", &observation(0.4), 50)
            .await
            .unwrap();
        assert_eq!(first.mention_count(), 1);

        let second = store
            .upsert_profile("e1", "Jane Doe", &observation(0.6), 50)
            .await
            .unwrap();
        assert_eq!(second.mention_count(), 2);
        assert!((second.metadata.sentiment_history.average - 0.5).abs() < 1e-12);
        assert_eq!(to_sql_ts(&second.created_at), to_sql_ts(&first.created_at));

        let stored = store.get_profile("e1").await.unwrap().unwrap();
        assert_eq!(stored.metadata, second.metadata);
        assert!(store.get_profile("e2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_profile_is_rejected_on_read() {
        let (_tmp, store) = setup();
        store
            .upsert_profile("e1", "Jane Doe", &observation(0.1), 50)
            .await
            .unwrap();

        {
            let db = store.db.lock().await;
            db.execute(
                "UPDATE entity_profiles SET metadata = '{\"mention_count\": 3}' \
                 WHERE canonical_entity_id = 'e1'",
                [],
            )
            .unwrap();
        }

        let err = store.get_profile("e1").await.unwrap_err();
        assert!(matches!(err, Error::CorruptProfile(_)));

        let err = store
            .upsert_profile("e1", "Jane Doe", &observation(0.1), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptProfile(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_step_upserts_lose_nothing() {
        let (_tmp, store) = setup();
        let store = Arc::new(store);
        let (entity, _) = store
            .create_canonical("Jane Doe", &EntityType::Person, at(1, 0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..25 {
            let store = Arc::clone(&store);
            let id = entity.id.clone();
            handles.push(tokio::spawn(async move {
                let mention =
                    RawMention::new("Jane Doe", EntityType::Person, "ctx", format!("doc-{i}"));
                let stored = store.append_raw_mention(&mention, at(1, 0)).await.unwrap();
                store
                    .append_mention_context(&NewMentionContext {
                        canonical_entity_id: Some(id.clone()),
                        raw_entity_id: stored.id,
                        document_id: stored.document_id.clone(),
                        context_text: "ctx".into(),
                        sentiment_score: 0.0,
                        context_type: "neutral".into(),
                    })
                    .await
                    .unwrap();
                store
                    .upsert_profile(&id, "Jane Doe", &observation(0.0), 50)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let profile = store.get_profile(&entity.id).await.unwrap().unwrap();
        let contexts = store.count_mention_contexts(&entity.id).await.unwrap();
        assert_eq!(profile.mention_count(), 25);
        assert_eq!(contexts, 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_keep_counts_aligned() {
        let (_tmp, store) = setup();
        let store = Arc::new(store);
        let (entity, _) = store
            .create_canonical("Jane Doe", &EntityType::Person, at(1, 0))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..25 {
            let store = Arc::clone(&store);
            let id = entity.id.clone();
            handles.push(tokio::spawn(async move {
                let mention =
                    RawMention::new("Jane Doe", EntityType::Person, "ctx", format!("doc-{i}"));
                store
                    .record_mention(&id, "Jane Doe", &mention, &observation(0.0), 50)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let profile = store.get_profile(&entity.id).await.unwrap().unwrap();
        assert_eq!(profile.mention_count(), 25);
        assert_eq!(store.count_mention_contexts(&entity.id).await.unwrap(), 25);
        assert_eq!(store.stats().await.unwrap().raw_mentions, 25);
    }

    #[tokio::test]
    async fn record_mention_writes_every_row() {
        let (_tmp, store) = setup();
        let (entity, _) = store
            .create_canonical("Jane Doe", &EntityType::Person, at(1, 0))
            .await
            .unwrap();
        let mention = RawMention::new("Jane Doe", EntityType::Person, "Jane Doe spoke.", "doc-1");

        let recorded = store
            .record_mention(&entity.id, "Jane Doe", &mention, &observation(0.4), 50)
            .await
            .unwrap();

        assert_eq!(recorded.mention.mentioned_at, at(1, 9));
        assert_eq!(recorded.context.raw_entity_id, recorded.mention.id);
        assert_eq!(recorded.context.canonical_entity_id.as_deref(), Some(entity.id.as_str()));
        assert_eq!(recorded.profile.mention_count(), 1);
        let touched = store
            .get_canonical_by_name("Jane Doe", &EntityType::Person)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touched.last_seen, at(1, 9));
    }

    #[tokio::test]
    async fn failed_record_rolls_back_every_row() {
        let (_tmp, store) = setup();
        let (entity, _) = store
            .create_canonical("Jane Doe", &EntityType::Person, at(1, 0))
            .await
            .unwrap();
        let mention = RawMention::new("Jane Doe", EntityType::Person, "ctx", "doc-1");
        store
            .record_mention(&entity.id, "Jane Doe", &mention, &observation(0.1), 50)
            .await
            .unwrap();

        {
            let db = store.db.lock().await;
            db.execute(
                "UPDATE entity_profiles SET metadata = 'not json' WHERE canonical_entity_id = ?1",
                params![entity.id],
            )
            .unwrap();
        }

        let err = store
            .record_mention(&entity.id, "Jane Doe", &mention, &observation(0.1), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CorruptProfile(_)));

        assert_eq!(store.count_mention_contexts(&entity.id).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().raw_mentions, 1);
    }

    #[tokio::test]
    async fn record_for_unknown_entity_writes_nothing() {
        let (_tmp, store) = setup();
        let mention = RawMention::new("Ghost", EntityType::Person, "ctx", "doc-1");

        let err = store
            .record_mention("missing", "Ghost", &mention, &observation(0.0), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.count_mention_contexts("missing").await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn document_query_spans_many_ids() {
        let (_tmp, store) = setup();
        for doc in ["doc-3", "doc-1100"] {
            let mention = RawMention::new("Acme", EntityType::Organization, "ctx", doc);
            store.append_raw_mention(&mention, at(1, 0)).await.unwrap();
        }

        let mut ids: Vec<String> = (0..1200).map(|i| format!("doc-{i}")).collect();
        ids.push("doc-3".into());
        let mentions = store.query_mentions_for_documents(&ids).await.unwrap();

        let docs: Vec<&str> = mentions.iter().map(|m| m.document_id.as_str()).collect();
        assert_eq!(docs, vec!["doc-3", "doc-1100"]);
    }

    #[tokio::test]
    async fn documents_round_trip() {
        let (_tmp, store) = setup();
        let published = at(3, 8) + Duration::milliseconds(250);
        let doc =
            Document::new("doc-1", "Budget vote", "https://example.com/a").published_at(published);
        store.upsert_document(&doc).await.unwrap();

        let updated = Document {
            title: "Budget vote passes".into(),
            ..doc.clone()
        };
        store.upsert_document(&updated).await.unwrap();

        let fetched = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(fetched, updated);
        assert!(store.get_document("doc-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_count_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());

        store
            .create_canonical("Acme", &EntityType::Organization, at(1, 0))
            .await
            .unwrap();
        store
            .upsert_document(&Document::new("d", "t", "u"))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.canonical_entities, 1);
        assert_eq!(stats.documents, 1);
        assert!(store.db_path().is_none());
    }
}
