//! Search index adapter.
//!
//! Capability surface over the remote search index: enumerate document ids,
//! upsert, delete, partial-update, configure the index schema, and recreate
//! the index from scratch. The sync engine and HTTP surface depend on the
//! [`SearchIndex`] trait; [`MeiliIndex`] is the production implementation
//! speaking Meilisearch's REST API over one shared `reqwest::Client`.
//!
//! Remote errors propagate unchanged — no adapter-level retry. Document
//! writes are accepted by Meilisearch as asynchronous tasks; this adapter
//! checks the HTTP status and does not poll task completion.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::config::{Config, IndexSettingsConfig};
use crate::models::{IndexedDocument, RatingPatch};

/// Schema applied to the remote index: which fields are searchable,
/// filterable, and sortable, plus the leniency knobs from config.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub searchable: Vec<String>,
    pub filterable: Vec<String>,
    pub sortable: Vec<String>,
    pub leniency: IndexSettingsConfig,
}

impl IndexSettings {
    /// The canonical schema for resource documents.
    pub fn for_resources(leniency: IndexSettingsConfig) -> Self {
        Self {
            searchable: vec![
                "title".into(),
                "description".into(),
                "subject".into(),
                "examBoard".into(),
                "level".into(),
                "type".into(),
            ],
            filterable: vec![
                "subject".into(),
                "examBoard".into(),
                "level".into(),
                "type".into(),
                "author".into(),
                "tags".into(),
                "averageRating".into(),
            ],
            sortable: vec!["averageRating".into(), "title".into()],
            leniency,
        }
    }
}

/// A read search request, already translated from HTTP query parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Index-native filter expression, e.g. `tags = "Math" AND subject = "Physics"`.
    pub filter: Option<String>,
    /// `field:asc` or `field:desc`.
    pub sort: Option<String>,
    pub limit: i64,
    pub offset: i64,
    /// When false the query is matched exactly (typo tolerance bypassed).
    pub fuzzy: bool,
}

/// Hits and timing as reported by the index.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<Value>,
    pub total_hits: i64,
    pub processing_time_ms: i64,
}

/// Capability surface over the remote search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Enumerates up to `max_count` document ids currently in the index.
    ///
    /// If the index holds more documents than the cap, the excess is
    /// silently missed — orphan detection beyond the cap is a documented
    /// limitation, not corrected at this layer.
    async fn list_document_ids(&self, max_count: usize) -> Result<HashSet<String>>;

    /// Adds or fully replaces documents, keyed by `id`.
    async fn upsert_documents(&self, documents: &[IndexedDocument]) -> Result<()>;

    /// Removes documents by id. Unknown ids are ignored by the index.
    async fn delete_documents(&self, ids: &[String]) -> Result<()>;

    /// Applies rating-only patches, leaving every other field untouched.
    async fn update_documents_partial(&self, patches: &[RatingPatch]) -> Result<()>;

    /// Applies the index schema. Idempotent; called at startup and after
    /// [`recreate_index`](SearchIndex::recreate_index).
    async fn configure_schema(&self, settings: &IndexSettings) -> Result<()>;

    /// Deletes the index if present ("does not exist" counts as success)
    /// and creates it anew with the given primary key field.
    async fn recreate_index(&self, primary_key: &str) -> Result<()>;

    /// Runs a read query. Ranking internals are the index's business.
    async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome>;
}

/// Meilisearch-backed index over a shared HTTP client.
pub struct MeiliIndex {
    client: Client,
    host: String,
    api_key: String,
    index_name: String,
    list_page_size: usize,
}

#[derive(Deserialize)]
struct DocumentIdRow {
    id: String,
}

#[derive(Deserialize)]
struct DocumentPage {
    results: Vec<DocumentIdRow>,
}

#[derive(Deserialize)]
struct MeiliSearchResponse {
    #[serde(default)]
    hits: Vec<Value>,
    #[serde(default, rename = "estimatedTotalHits")]
    estimated_total_hits: i64,
    #[serde(default, rename = "processingTimeMs")]
    processing_time_ms: i64,
}

impl MeiliIndex {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            host: config.index.host.trim_end_matches('/').to_string(),
            api_key: config.index.api_key.clone(),
            index_name: config.index.name.clone(),
            list_page_size: config.sync.list_page_size,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    /// Sends a request and turns non-2xx statuses into an error carrying
    /// the response body, which is where Meilisearch puts its error code.
    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .with_context(|| format!("Search index unreachable during {}", action))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search index rejected {} ({}): {}", action, status, body);
        }

        Ok(response)
    }
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    async fn list_document_ids(&self, max_count: usize) -> Result<HashSet<String>> {
        let url = self.url(&format!("/indexes/{}/documents", self.index_name));
        let builder = self
            .client
            .get(&url)
            .query(&[("limit", max_count.to_string()), ("fields", "id".to_string())]);

        let response = self.send(builder, "document listing").await?;
        let page: DocumentPage = response
            .json()
            .await
            .context("Failed to decode document listing")?;

        Ok(page.results.into_iter().map(|row| row.id).collect())
    }

    async fn upsert_documents(&self, documents: &[IndexedDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!("/indexes/{}/documents", self.index_name));
        self.send(self.client.post(&url).json(documents), "document upsert")
            .await?;
        Ok(())
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!(
            "/indexes/{}/documents/delete-batch",
            self.index_name
        ));
        self.send(self.client.post(&url).json(ids), "document delete")
            .await?;
        Ok(())
    }

    async fn update_documents_partial(&self, patches: &[RatingPatch]) -> Result<()> {
        if patches.is_empty() {
            return Ok(());
        }

        // PUT merges into existing documents, but for an id the index has
        // never seen it creates a bare {id, averageRating} document. The
        // contract wants a local no-op for unknown ids, so patch only ids
        // the index already holds. The listing cap applies here as it does
        // to orphan detection.
        let known = self.list_document_ids(self.list_page_size).await?;
        let known_patches = retain_known(patches, &known);
        if known_patches.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!("/indexes/{}/documents", self.index_name));
        self.send(self.client.put(&url).json(&known_patches), "rating update")
            .await?;
        Ok(())
    }

    async fn configure_schema(&self, settings: &IndexSettings) -> Result<()> {
        let url = self.url(&format!("/indexes/{}/settings", self.index_name));
        let body = json!({
            "searchableAttributes": settings.searchable,
            "filterableAttributes": settings.filterable,
            "sortableAttributes": settings.sortable,
            "synonyms": settings.leniency.synonyms,
            "typoTolerance": {
                "minWordSizeForTypos": {
                    "oneTypo": settings.leniency.min_word_size_one_typo,
                    "twoTypos": settings.leniency.min_word_size_two_typos,
                }
            }
        });

        self.send(self.client.patch(&url).json(&body), "schema configuration")
            .await?;
        Ok(())
    }

    async fn recreate_index(&self, primary_key: &str) -> Result<()> {
        // Delete first, tolerating "index does not exist"
        let delete_url = self.url(&format!("/indexes/{}", self.index_name));
        let response = self
            .authed(self.client.delete(&delete_url))
            .send()
            .await
            .context("Search index unreachable during index delete")?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search index rejected index delete ({}): {}", status, body);
        }

        let create_url = self.url("/indexes");
        let body = json!({ "uid": self.index_name, "primaryKey": primary_key });
        self.send(self.client.post(&create_url).json(&body), "index create")
            .await?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let body = search_body(request);
        let url = self.url(&format!("/indexes/{}/search", self.index_name));
        let response = self.send(self.client.post(&url).json(&body), "search").await?;
        let decoded: MeiliSearchResponse = response
            .json()
            .await
            .context("Failed to decode search response")?;

        Ok(SearchOutcome {
            hits: decoded.hits,
            total_hits: decoded.estimated_total_hits,
            processing_time_ms: decoded.processing_time_ms,
        })
    }
}

/// Builds the Meilisearch search payload. The fuzzy flag toggles the
/// matching strategy: `all` requires every query term (fuzzy matching per
/// term still applies), `last` relaxes to prefix matching on the last term.
fn search_body(request: &SearchRequest) -> Value {
    let mut body = json!({
        "q": request.query,
        "limit": request.limit,
        "offset": request.offset,
        "matchingStrategy": if request.fuzzy { "all" } else { "last" },
    });

    if let Some(filter) = &request.filter {
        body["filter"] = json!(filter);
    }
    if let Some(sort) = &request.sort {
        body["sort"] = json!([sort]);
    }

    body
}

/// Keeps only the patches whose id the index currently holds.
fn retain_known<'a>(
    patches: &'a [RatingPatch],
    known: &HashSet<String>,
) -> Vec<&'a RatingPatch> {
    patches.iter().filter(|p| known.contains(&p.id)).collect()
}
