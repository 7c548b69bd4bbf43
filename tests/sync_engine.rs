//! Integration tests for the reconciliation engine.
//!
//! These tests drive the real engine against in-memory implementations of
//! the `ResourceStore` and `SearchIndex` traits, proving the convergence,
//! idempotence, orphan-removal, and partial-failure properties end-to-end
//! without a live Postgres or Meilisearch.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use resource_search::config::{IndexSettingsConfig, SyncConfig};
use resource_search::index::{IndexSettings, SearchIndex, SearchOutcome, SearchRequest};
use resource_search::models::{
    project_document, FacetValues, IndexedDocument, RatingPatch, RatingRow, Resource,
};
use resource_search::scheduler::Scheduler;
use resource_search::store::ResourceStore;
use resource_search::sync::{SyncEngine, SyncOutcome};

// ─── Test Store ─────────────────────────────────────────────────────

/// In-memory resource store seeded with fixed rows.
struct InMemoryStore {
    resources: Mutex<Vec<Resource>>,
}

impl InMemoryStore {
    fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources: Mutex::new(resources),
        }
    }

    fn set_rating(&self, id: i64, rating: f64) {
        let mut rows = self.resources.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.average_rating = rating;
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn fetch_all_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.resources.lock().unwrap().clone())
    }

    async fn fetch_ratings(&self) -> Result<Vec<RatingRow>> {
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .map(|r| RatingRow {
                id: r.id,
                average_rating: r.average_rating,
            })
            .collect())
    }

    async fn distinct_facets(&self) -> Result<FacetValues> {
        Ok(FacetValues::default())
    }
}

// ─── Test Index ─────────────────────────────────────────────────────

#[derive(Default)]
struct IndexState {
    /// BTreeMap so `list_document_ids` truncation is deterministic.
    documents: BTreeMap<String, IndexedDocument>,
    /// Operation log: "upsert", "delete", "configure", "recreate".
    operations: Vec<String>,
    fail_delete: bool,
    fail_upsert: bool,
}

/// In-memory search index with immediate writes, an operation log, and
/// switchable failure injection.
struct InMemoryIndex {
    state: Mutex<IndexState>,
    /// When set, `upsert_documents` signals `entered` and then waits for
    /// `release`, letting a test observe an in-flight pass.
    upsert_gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl InMemoryIndex {
    fn new() -> Self {
        Self {
            state: Mutex::new(IndexState::default()),
            upsert_gate: None,
        }
    }

    fn with_documents(docs: Vec<IndexedDocument>) -> Self {
        let index = Self::new();
        {
            let mut state = index.state.lock().unwrap();
            for doc in docs {
                state.documents.insert(doc.id.clone(), doc);
            }
        }
        index
    }

    fn ids(&self) -> HashSet<String> {
        self.state
            .lock()
            .unwrap()
            .documents
            .keys()
            .cloned()
            .collect()
    }

    fn document(&self, id: &str) -> Option<IndexedDocument> {
        self.state.lock().unwrap().documents.get(id).cloned()
    }

    fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    fn set_fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }

    fn set_fail_upsert(&self, fail: bool) {
        self.state.lock().unwrap().fail_upsert = fail;
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn list_document_ids(&self, max_count: usize) -> Result<HashSet<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .keys()
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn upsert_documents(&self, documents: &[IndexedDocument]) -> Result<()> {
        if let Some((entered, release)) = &self.upsert_gate {
            entered.notify_one();
            release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_upsert {
            bail!("index rejected upsert batch");
        }
        state.operations.push("upsert".to_string());
        for doc in documents {
            state.documents.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            bail!("index rejected delete batch");
        }
        state.operations.push("delete".to_string());
        for id in ids {
            state.documents.remove(id);
        }
        Ok(())
    }

    async fn update_documents_partial(&self, patches: &[RatingPatch]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.operations.push("partial".to_string());
        for patch in patches {
            // Unknown ids are a local no-op per the engine's contract
            if let Some(doc) = state.documents.get_mut(&patch.id) {
                doc.average_rating = patch.average_rating;
            }
        }
        Ok(())
    }

    async fn configure_schema(&self, _settings: &IndexSettings) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .operations
            .push("configure".to_string());
        Ok(())
    }

    async fn recreate_index(&self, _primary_key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.operations.push("recreate".to_string());
        state.documents.clear();
        Ok(())
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchOutcome> {
        Ok(SearchOutcome::default())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn resource(id: i64, subject: &str, rating: f64) -> Resource {
    Resource {
        id,
        resource_id: format!("ext-{}", id),
        r#type: "Paper".to_string(),
        title: format!("Resource {}", id),
        level: "GCSE".to_string(),
        subject: subject.to_string(),
        exam_board: "AQA".to_string(),
        link: format!("https://example.com/{}", id),
        author: "author".to_string(),
        average_rating: rating,
        description: Some("a description".to_string()),
    }
}

fn engine_with(
    store: Arc<InMemoryStore>,
    index: Arc<InMemoryIndex>,
    list_page_size: usize,
) -> SyncEngine {
    let sync_config = SyncConfig {
        list_page_size,
        ..Default::default()
    };
    SyncEngine::new(
        store,
        index,
        IndexSettings::for_resources(IndexSettingsConfig::default()),
        &sync_config,
    )
}

fn completed(outcome: SyncOutcome) -> resource_search::sync::SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped => panic!("expected a completed pass, got Skipped"),
    }
}

// ─── FullSync properties ────────────────────────────────────────────

#[tokio::test]
async fn full_sync_converges_index_to_store_ids() {
    let store = Arc::new(InMemoryStore::new(vec![
        resource(1, "Math", 4.0),
        resource(2, "Physics", 3.0),
    ]));
    // Prior index state disjoint from the store
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(9, "Stale", 1.0),
    )]));
    let engine = engine_with(store, index.clone(), 10_000);

    let report = completed(engine.full_sync().await.unwrap());

    assert_eq!(report.upserted, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(
        index.ids(),
        HashSet::from(["1".to_string(), "2".to_string()])
    );
}

#[tokio::test]
async fn full_sync_orphan_removal() {
    // Index holds {2,3,4}, store holds {1,2,3}: afterwards the index is
    // exactly {1,2,3} — 4 deleted, 1 created, 2 and 3 refreshed.
    let store = Arc::new(InMemoryStore::new(vec![
        resource(1, "Math", 4.0),
        resource(2, "Physics", 3.0),
        resource(3, "Biology", 2.0),
    ]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![
        project_document(&resource(2, "OldPhysics", 1.0)),
        project_document(&resource(3, "OldBiology", 1.0)),
        project_document(&resource(4, "Gone", 1.0)),
    ]));
    let engine = engine_with(store, index.clone(), 10_000);

    engine.full_sync().await.unwrap();

    assert_eq!(
        index.ids(),
        HashSet::from(["1".to_string(), "2".to_string(), "3".to_string()])
    );
    // Refreshed documents carry the authoritative field values
    assert_eq!(index.document("2").unwrap().subject, "Physics");
    assert_eq!(index.document("3").unwrap().subject, "Biology");
}

#[tokio::test]
async fn full_sync_is_idempotent() {
    let store = Arc::new(InMemoryStore::new(vec![
        resource(1, "Math", 4.0),
        resource(2, "Physics", 3.0),
    ]));
    let index = Arc::new(InMemoryIndex::new());
    let engine = engine_with(store, index.clone(), 10_000);

    let first = completed(engine.full_sync().await.unwrap());
    let after_first: Vec<_> = ["1", "2"]
        .iter()
        .map(|id| index.document(id).unwrap())
        .collect();

    let second = completed(engine.full_sync().await.unwrap());
    let after_second: Vec<_> = ["1", "2"]
        .iter()
        .map(|id| index.document(id).unwrap())
        .collect();

    // Same upsert volume both passes, field-for-field identical content
    assert_eq!(first, second);
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn full_sync_upserts_before_deleting() {
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(9, "Stale", 1.0),
    )]));
    let engine = engine_with(store, index.clone(), 10_000);

    engine.full_sync().await.unwrap();

    assert_eq!(index.operations(), vec!["upsert", "delete"]);
}

#[tokio::test]
async fn full_sync_delete_failure_keeps_upserted_documents() {
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(9, "Orphan", 1.0),
    )]));
    index.set_fail_delete(true);
    let engine = engine_with(store, index.clone(), 10_000);

    let err = engine.full_sync().await.unwrap_err();
    assert!(err.to_string().contains("orphan delete"));

    // No rollback: the upserted document stays, the orphan stays too
    assert_eq!(
        index.ids(),
        HashSet::from(["1".to_string(), "9".to_string()])
    );
}

#[tokio::test]
async fn full_sync_upsert_failure_aborts_before_delete() {
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(9, "Orphan", 1.0),
    )]));
    index.set_fail_upsert(true);
    let engine = engine_with(store, index.clone(), 10_000);

    let err = engine.full_sync().await.unwrap_err();
    assert!(err.to_string().contains("upsert"));

    // The orphan survives: delete never ran
    assert_eq!(index.ids(), HashSet::from(["9".to_string()]));
    assert!(index.operations().is_empty());
}

#[tokio::test]
async fn full_sync_orphans_beyond_listing_cap_are_missed() {
    // Cap of 2: only the first two ids (BTreeMap order) are visible to
    // orphan detection. Stated precondition of the convergence property.
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![
        project_document(&resource(5, "A", 1.0)),
        project_document(&resource(6, "B", 1.0)),
        project_document(&resource(7, "C", 1.0)),
    ]));
    let engine = engine_with(store, index.clone(), 2);

    engine.full_sync().await.unwrap();

    // "5" and "6" were listed and deleted; "7" escaped the cap
    assert_eq!(
        index.ids(),
        HashSet::from(["1".to_string(), "7".to_string()])
    );
}

// ─── RatingsSync properties ─────────────────────────────────────────

#[tokio::test]
async fn ratings_sync_updates_only_the_rating() {
    let store = Arc::new(InMemoryStore::new(vec![
        resource(1, "Math", 4.0),
        resource(2, "Physics", 3.0),
    ]));
    let index = Arc::new(InMemoryIndex::new());
    let engine = engine_with(store.clone(), index.clone(), 10_000);

    engine.full_sync().await.unwrap();
    let before_1 = index.document("1").unwrap();
    let before_2 = index.document("2").unwrap();

    store.set_rating(1, 4.8);
    completed(engine.ratings_sync().await.unwrap());

    let after_1 = index.document("1").unwrap();
    let after_2 = index.document("2").unwrap();

    assert_eq!(after_1.average_rating, 4.8);
    // Every other field of every document is unchanged
    assert_eq!(
        IndexedDocument {
            average_rating: before_1.average_rating,
            ..after_1
        },
        before_1
    );
    assert_eq!(after_2, before_2);
    assert_eq!(index.ids().len(), 2);
}

#[tokio::test]
async fn ratings_sync_never_adds_documents() {
    // Store has a row the index has never seen; the patch is a no-op for it
    let store = Arc::new(InMemoryStore::new(vec![
        resource(1, "Math", 4.0),
        resource(2, "Physics", 3.0),
    ]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(1, "Math", 4.0),
    )]));
    let engine = engine_with(store, index.clone(), 10_000);

    engine.ratings_sync().await.unwrap();

    assert_eq!(index.ids(), HashSet::from(["1".to_string()]));
}

// ─── Concurrency & reset ────────────────────────────────────────────

#[tokio::test]
async fn full_sync_in_flight_trigger_is_skipped() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let mut index = InMemoryIndex::new();
    index.upsert_gate = Some((entered.clone(), release.clone()));
    let index = Arc::new(index);
    let engine = Arc::new(engine_with(store, index.clone(), 10_000));

    let background = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.full_sync().await })
    };

    // Wait until the first pass is inside the index write
    entered.notified().await;

    // A second trigger while the first is in flight skips, does not queue
    let outcome = engine.full_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped);

    release.notify_one();
    let first = background.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));

    // The guard clears once the pass finishes: a fresh trigger proceeds
    let rerun = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.full_sync().await })
    };
    entered.notified().await;
    release.notify_one();
    assert!(matches!(
        rerun.await.unwrap().unwrap(),
        SyncOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn reset_during_inflight_full_sync_still_repopulates() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let mut index = InMemoryIndex::with_documents(vec![project_document(&resource(
        9, "Stale", 1.0,
    ))]);
    index.upsert_gate = Some((entered.clone(), release.clone()));
    let index = Arc::new(index);
    let engine = Arc::new(engine_with(store, index.clone(), 10_000));

    // A scheduled pass is mid-flight, blocked inside its index write
    let background = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.full_sync().await })
    };
    entered.notified().await;

    // Reset fired while that pass holds the in-flight flag. The
    // drop/recreate must still be followed by a repopulating pass — a
    // skip here would leave the fresh index empty until the next cycle.
    let reset = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reset_index().await })
    };
    entered.notified().await;

    release.notify_one();
    release.notify_one();

    let reset_outcome = reset.await.unwrap().unwrap();
    assert!(matches!(reset_outcome, SyncOutcome::Completed(_)));
    assert!(matches!(
        background.await.unwrap().unwrap(),
        SyncOutcome::Completed(_)
    ));

    // The recreated index holds the store's documents, not an empty set
    assert_eq!(index.ids(), HashSet::from(["1".to_string()]));
}

#[tokio::test]
async fn ratings_sync_does_not_block_full_sync() {
    // The two operations guard independently
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::new());
    let engine = engine_with(store, index.clone(), 10_000);

    let full = engine.full_sync().await.unwrap();
    let ratings = engine.ratings_sync().await.unwrap();

    assert!(matches!(full, SyncOutcome::Completed(_)));
    assert!(matches!(ratings, SyncOutcome::Completed(_)));
}

#[tokio::test]
async fn scheduler_run_once_drives_both_operations() {
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::new());
    let engine = Arc::new(engine_with(store, index.clone(), 10_000));

    let scheduler = Scheduler::new(engine, &SyncConfig::default());
    let (full, ratings) = scheduler.run_once().await;
    full.unwrap();
    ratings.unwrap();

    assert_eq!(index.operations(), vec!["upsert", "delete", "partial"]);
    assert_eq!(index.ids(), HashSet::from(["1".to_string()]));
}

#[tokio::test]
async fn reset_index_recreates_configures_and_repopulates() {
    let store = Arc::new(InMemoryStore::new(vec![resource(1, "Math", 4.0)]));
    let index = Arc::new(InMemoryIndex::with_documents(vec![project_document(
        &resource(9, "Stale", 1.0),
    )]));
    let engine = engine_with(store, index.clone(), 10_000);

    let outcome = engine.reset_index().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));

    // Drop, schema, then repopulating full sync
    assert_eq!(
        index.operations(),
        vec!["recreate", "configure", "upsert", "delete"]
    );
    assert_eq!(index.ids(), HashSet::from(["1".to_string()]));
}
