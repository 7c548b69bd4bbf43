//! Reconciliation engine.
//!
//! Keeps the search index convergent with the relational store. Two
//! operations: [`SyncEngine::full_sync`] re-derives every document and
//! removes orphans; [`SyncEngine::ratings_sync`] refreshes only the
//! `averageRating` field. Both read from the store, write to the index,
//! and never mutate store rows.
//!
//! There is no transaction and no rollback: a pass that fails midway leaves
//! the index in a mixture of pre- and post-sync state, and the next
//! successful full pass restores convergence. The recurring schedule is the
//! de facto retry mechanism.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;
use crate::index::{IndexSettings, SearchIndex};
use crate::models::{project_document, RatingPatch};
use crate::store::ResourceStore;

/// Primary key field of the indexed document schema.
pub const PRIMARY_KEY: &str = "id";

/// Result of a triggered run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The pass ran to completion.
    Completed(SyncReport),
    /// A run of the same operation was already in flight; nothing was done.
    Skipped,
}

/// Counts from a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub deleted: usize,
}

/// The reconciliation engine. Holds the two adapter handles plus one
/// in-flight flag per operation, so a trigger that races an executing run
/// of the same operation skips instead of interleaving. FullSync and
/// RatingsSync guard independently and may still overlap each other; both
/// are idempotent, so the overlap affects only transient visibility.
pub struct SyncEngine {
    store: Arc<dyn ResourceStore>,
    index: Arc<dyn SearchIndex>,
    settings: IndexSettings,
    list_page_size: usize,
    full_sync_running: AtomicBool,
    ratings_sync_running: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        index: Arc<dyn SearchIndex>,
        settings: IndexSettings,
        sync_config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            index,
            settings,
            list_page_size: sync_config.list_page_size,
            full_sync_running: AtomicBool::new(false),
            ratings_sync_running: AtomicBool::new(false),
        }
    }

    /// Full convergence pass.
    ///
    /// Reads the complete resource set, projects every row into a document
    /// (no diffing — every record is re-sent every pass, so the index ends
    /// up with the authoritative field values even if something wrote stale
    /// documents directly), upserts them all, then deletes any index id
    /// with no matching resource. Upsert runs before delete so a live id is
    /// never transiently missing during the pass.
    ///
    /// Orphan detection sees at most `list_page_size` index ids; documents
    /// beyond the cap are missed until the index shrinks.
    pub async fn full_sync(&self) -> Result<SyncOutcome> {
        let _guard = match InFlightGuard::acquire(&self.full_sync_running) {
            Some(guard) => guard,
            None => {
                info!("full sync already running, skipping");
                return Ok(SyncOutcome::Skipped);
            }
        };

        let report = self.full_sync_inner().await?;
        Ok(SyncOutcome::Completed(report))
    }

    /// The convergence pass itself, with no in-flight guard. Called by
    /// [`full_sync`](Self::full_sync) under the guard, and by
    /// [`reset_index`](Self::reset_index) directly: a freshly recreated
    /// index must be repopulated even while a concurrent pass is running,
    /// or it stays empty until the next scheduled cycle.
    async fn full_sync_inner(&self) -> Result<SyncReport> {
        info!("starting full sync");

        let resources = self.store.fetch_all_resources().await?;
        let index_ids = self
            .index
            .list_document_ids(self.list_page_size)
            .await
            .context("Full sync aborted while listing index documents")?;

        let documents: Vec<_> = resources.iter().map(project_document).collect();

        let ids_to_delete: Vec<String> = {
            let store_ids: std::collections::HashSet<&str> =
                documents.iter().map(|d| d.id.as_str()).collect();
            index_ids
                .into_iter()
                .filter(|id| !store_ids.contains(id.as_str()))
                .collect()
        };

        self.index
            .upsert_documents(&documents)
            .await
            .context("Full sync aborted during upsert")?;

        self.index
            .delete_documents(&ids_to_delete)
            .await
            .context("Full sync aborted during orphan delete")?;

        let report = SyncReport {
            upserted: documents.len(),
            deleted: ids_to_delete.len(),
        };
        info!(
            upserted = report.upserted,
            deleted = report.deleted,
            "full sync completed"
        );

        Ok(report)
    }

    /// Incremental rating refresh.
    ///
    /// Reads `(id, rating)` pairs and issues one partial-update batch.
    /// Never adds or deletes documents and never touches any field other
    /// than the rating. Assumes at least one full sync has run; a patch for
    /// a not-yet-indexed id is absorbed by the next full pass.
    pub async fn ratings_sync(&self) -> Result<SyncOutcome> {
        let _guard = match InFlightGuard::acquire(&self.ratings_sync_running) {
            Some(guard) => guard,
            None => {
                info!("ratings sync already running, skipping");
                return Ok(SyncOutcome::Skipped);
            }
        };

        info!("starting ratings sync");

        let ratings = self.store.fetch_ratings().await?;
        let patches: Vec<RatingPatch> = ratings.iter().map(RatingPatch::from).collect();

        self.index
            .update_documents_partial(&patches)
            .await
            .context("Ratings sync aborted during partial update")?;

        let report = SyncReport {
            upserted: patches.len(),
            deleted: 0,
        };
        info!(updated = report.upserted, "ratings sync completed");

        Ok(SyncOutcome::Completed(report))
    }

    /// Applies the index schema. Idempotent; run at startup and as the
    /// second step of [`reset_index`](Self::reset_index).
    pub async fn configure_index(&self) -> Result<()> {
        self.index.configure_schema(&self.settings).await
    }

    /// Schema-migration escape hatch: drop the remote index, recreate it
    /// with the document id as primary key, reapply the schema, repopulate
    /// with a full sync. Never scheduled — manual trigger only.
    ///
    /// The repopulating pass bypasses the in-flight guard: once the index
    /// has been dropped, skipping would leave it empty until the next
    /// scheduled cycle.
    pub async fn reset_index(&self) -> Result<SyncOutcome> {
        info!("resetting search index");

        self.index
            .recreate_index(PRIMARY_KEY)
            .await
            .context("Index reset failed during recreate")?;

        self.configure_index()
            .await
            .context("Index reset failed while reapplying schema")?;

        let report = self.full_sync_inner().await?;
        Ok(SyncOutcome::Completed(report))
    }
}

/// Clears the flag when the run finishes, error paths included.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
