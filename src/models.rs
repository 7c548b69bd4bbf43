//! Core data models used throughout Resource Search.
//!
//! These types represent the catalog rows held in Postgres, the documents
//! mirrored into the search index, and the request/response shapes that flow
//! through the HTTP surface.

use serde::{Deserialize, Serialize};

/// Authoritative catalog record, as stored in the `resource` table.
///
/// Rows are created by an external bulk-import process and never mutated by
/// the sync engine, which has read-only access.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Resource {
    pub id: i64,
    /// External identifier from the upstream catalog; may be empty.
    pub resource_id: String,
    #[sqlx(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub level: String,
    pub subject: String,
    pub exam_board: String,
    pub link: String,
    pub author: String,
    pub average_rating: f64,
    pub description: Option<String>,
}

/// Search-engine-facing mirror of a [`Resource`], including derived tags.
///
/// Documents have no identity of their own: they are created, refreshed, and
/// deleted exclusively by the sync engine, keyed by the resource id rendered
/// as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub id: String,
    pub resource_id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub level: String,
    pub subject: String,
    pub exam_board: String,
    pub link: String,
    pub author: String,
    pub average_rating: f64,
    pub description: String,
    pub tags: Vec<String>,
}

/// One `(id, rating)` pair read for an incremental rating refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RatingRow {
    pub id: i64,
    pub average_rating: f64,
}

/// Partial-update payload for RatingsSync: only the identifier and the
/// rating field, so every other document field is left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingPatch {
    pub id: String,
    pub average_rating: f64,
}

impl From<&RatingRow> for RatingPatch {
    fn from(row: &RatingRow) -> Self {
        Self {
            id: row.id.to_string(),
            average_rating: row.average_rating,
        }
    }
}

/// Distinct facet values for building UI filter controls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValues {
    pub subjects: Vec<String>,
    pub exam_boards: Vec<String>,
    pub levels: Vec<String>,
    pub types: Vec<String>,
}

/// Projects a resource into the document shape mirrored in the index.
///
/// The `tags` list is the only derived field: the non-empty values among
/// subject, level, exam board, and type, in that order. It is a pure
/// function of those four source fields; no other derivation path exists.
pub fn project_document(resource: &Resource) -> IndexedDocument {
    let tags = [
        &resource.subject,
        &resource.level,
        &resource.exam_board,
        &resource.r#type,
    ]
    .into_iter()
    .filter(|v| !v.is_empty())
    .cloned()
    .collect();

    IndexedDocument {
        id: resource.id.to_string(),
        resource_id: resource.resource_id.clone(),
        r#type: resource.r#type.clone(),
        title: resource.title.clone(),
        level: resource.level.clone(),
        subject: resource.subject.clone(),
        exam_board: resource.exam_board.clone(),
        link: resource.link.clone(),
        author: resource.author.clone(),
        average_rating: resource.average_rating,
        description: resource.description.clone().unwrap_or_default(),
        tags,
    }
}
