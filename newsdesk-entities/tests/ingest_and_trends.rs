//! End-to-end tests: documents in, profiles and trends out.
//!
//! Every test runs against a SQLite file in a temporary directory.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use newsdesk_common::{BucketGranularity, Config};
use newsdesk_entities::{
    Document, EntityPipeline, EntityType, HistoricalAggregator, MentionStore, RawMention,
    SqliteStore, TrendDetector, TrendStatus, TrendType,
};

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    _tmp: TempDir,
    store: Arc<SqliteStore>,
    pipeline: EntityPipeline,
    config: Config,
}

impl Harness {
    fn new(config: Config) -> Self {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(tmp.path().join("newsdesk.db")).unwrap());
        let pipeline = EntityPipeline::new(store.clone(), store.clone(), &config);
        Self {
            _tmp: tmp,
            store,
            pipeline,
            config,
        }
    }

    fn aggregator(&self) -> Arc<HistoricalAggregator> {
        Arc::new(HistoricalAggregator::from_config(self.store.clone(), &self.config))
    }

    fn detector(&self) -> TrendDetector {
        TrendDetector::new(self.aggregator(), self.store.clone(), self.config.trends.clone())
    }

    async fn ingest(
        &self,
        doc_id: &str,
        published_at: DateTime<Utc>,
        mentions: &[(&str, EntityType)],
    ) {
        let document = Document::new(
            doc_id,
            format!("Story {doc_id}"),
            format!("https://news.example/{doc_id}"),
        )
        .published_at(published_at);
        let mentions: Vec<RawMention> = mentions
            .iter()
            .map(|(text, entity_type)| {
                let sentence = format!("{text} was in the news.");
                RawMention::new(*text, entity_type.clone(), sentence, doc_id)
            })
            .collect();
        self.pipeline.ingest_document(&document, &mentions).await.unwrap();
    }
}

fn march(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
}

/// Current time truncated to whole seconds.
fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn daily_mentions_are_bucketed_per_day() {
    let h = Harness::new(Config::default());
    for day in 1..=5 {
        h.ingest(&format!("d{day}"), march(day), &[("Mayor Johnson", EntityType::Person)])
            .await;
    }

    let table = h
        .aggregator()
        .get_entity_frequencies(&[EntityType::Person], march(1), march(5), 10)
        .await
        .unwrap();
    let johnson = table.get("Mayor Johnson:PERSON").unwrap();
    assert_eq!(johnson.total_mentions, 5);
    assert_eq!(johnson.periods.len(), 5);
    assert_eq!(johnson.periods.get("2026-03-03"), Some(&1));

    let entity = h
        .store
        .get_canonical_by_name("Mayor Johnson", &EntityType::Person)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.first_seen, march(1));
    assert_eq!(entity.last_seen, march(5));

    let profile = h.store.get_profile(&entity.id).await.unwrap().unwrap();
    assert_eq!(profile.mention_count(), 5);
    assert_eq!(profile.metadata.temporal_histogram.len(), 5);
    assert_eq!(h.store.count_mention_contexts(&entity.id).await.unwrap(), 5);
}

#[tokio::test]
async fn weekly_buckets_group_days() {
    let mut config = Config::default();
    config.trends.time_bucket_granularity = BucketGranularity::Week;
    let h = Harness::new(config);
    for day in 2..=15 {
        h.ingest(&format!("d{day}"), march(day), &[("Acme", EntityType::Organization)])
            .await;
    }

    let table = h
        .aggregator()
        .get_entity_frequencies(&[EntityType::Organization], march(2), march(15), 10)
        .await
        .unwrap();
    let acme = table.get("Acme:ORG").unwrap();
    assert_eq!(acme.total_mentions, 14);
    // March 2-8 and 9-15, 2026 are ISO weeks 10 and 11
    assert_eq!(acme.periods.get("2026-W10"), Some(&7));
    assert_eq!(acme.periods.get("2026-W11"), Some(&7));
}

#[tokio::test]
async fn low_threshold_merges_title_variants() {
    let mut config = Config::default();
    config.apply_overrides(|key| {
        (key == "NEWSDESK_SIMILARITY_THRESHOLD").then(|| "0.5".to_string())
    });
    let h = Harness::new(config);

    h.ingest(
        "d1",
        march(1),
        &[
            ("Joe Biden", EntityType::Person),
            ("President Biden", EntityType::Person),
            ("Joe Biden", EntityType::Person),
        ],
    )
    .await;

    let people = h.store.list_canonicals(&[EntityType::Person]).await.unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].name, "Joe Biden");
}

#[tokio::test]
async fn identities_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("newsdesk.db");
    let config = Config::default();

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let pipeline = EntityPipeline::new(store.clone(), store, &config);
        let doc = Document::new("d1", "t", "u").published_at(march(1));
        let mention = RawMention::new("Acme Corp", EntityType::Organization, "", "d1");
        pipeline.ingest_document(&doc, &[mention]).await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let pipeline = EntityPipeline::new(store.clone(), store.clone(), &config);
    let doc = Document::new("d2", "t", "u").published_at(march(2));
    let mention = RawMention::new("ACME CORP", EntityType::Organization, "", "d2");
    let report = pipeline.ingest_document(&doc, &[mention]).await.unwrap();
    assert_eq!(report.created, 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.canonical_entities, 1);
    assert_eq!(stats.raw_mentions, 2);
    assert_eq!(stats.profiles, 1);
}

#[tokio::test]
async fn trends_from_ingested_documents() {
    let h = Harness::new(Config::default());
    let now = now();

    // Baseline: Senator Lee once a week for four weeks
    for week in 2..=5 {
        let at = now - Duration::days(7 * week) + Duration::hours(12);
        h.ingest(&format!("old{week}"), at, &[("Senator Lee", EntityType::Person)])
            .await;
    }

    // Current week: Senator Lee in eight stories, alongside a new company and
    // a crowd of one-off names
    let bystanders = ["Ann Fox", "Ben Gray", "Cal Hunt", "Dee Ives", "Eve Judd", "Fay Kerr"];
    for i in 0..8 {
        let mut mentions = vec![
            ("Senator Lee", EntityType::Person),
            ("Quanta Labs", EntityType::Organization),
        ];
        if i < bystanders.len() {
            mentions.push((bystanders[i], EntityType::Person));
        }
        if i == 0 {
            mentions.push(("Ann Fox", EntityType::Person));
        }
        h.ingest(&format!("new{i}"), now - Duration::hours(2 + i as i64), &mentions)
            .await;
    }

    let trends = h.detector().detect(&[]).await.unwrap();
    let names: Vec<&str> = trends.iter().map(|t| t.name.as_str()).collect();
    // Ann Fox is new too, but two mentions are below the default minimum of three
    assert_eq!(names, vec!["Senator Lee", "Quanta Labs"]);

    let lee = &trends[0];
    assert_eq!(lee.trend_type, TrendType::FrequencySpike);
    assert_eq!(lee.current_mentions, 8);
    assert_eq!(lee.status(), TrendStatus::Confirmed);
    assert_eq!(lee.evidence_documents.len(), 3);
    assert!(lee.evidence_documents[0].url.starts_with("https://news.example/"));

    let related: Vec<(&str, u64)> = lee
        .related_entities
        .iter()
        .map(|r| (r.name.as_str(), r.co_occurrences))
        .collect();
    assert_eq!(
        related,
        vec![
            ("Quanta Labs", 8),
            ("Ann Fox", 2),
            ("Ben Gray", 1),
            ("Cal Hunt", 1),
            ("Dee Ives", 1),
        ]
    );

    let quanta = &trends[1];
    assert_eq!(quanta.trend_type, TrendType::NovelEntity);
    assert_eq!(quanta.status(), TrendStatus::Potential);
    assert_eq!(quanta.current_mentions, 8);
}
