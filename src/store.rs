//! Relational store adapter.
//!
//! Read-only query access to the `resource` table. The sync engine and HTTP
//! surface depend on the [`ResourceStore`] trait rather than sqlx directly,
//! so tests can run against an in-memory implementation.
//!
//! No retry lives here: connectivity and query errors propagate unchanged to
//! the caller, which for scheduled syncs means "log and wait for the next
//! cycle".

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{FacetValues, RatingRow, Resource};

/// Read-only access to the authoritative resource catalog.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Returns every resource row. No pagination: real deployments are
    /// bounded by store capacity, not by this adapter.
    async fn fetch_all_resources(&self) -> Result<Vec<Resource>>;

    /// Returns `(id, average_rating)` for every resource.
    async fn fetch_ratings(&self) -> Result<Vec<RatingRow>>;

    /// Returns the distinct facet values used to build UI filters.
    async fn distinct_facets(&self) -> Result<FacetValues>;
}

/// Postgres-backed store over a shared connection pool.
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn fetch_all_resources(&self) -> Result<Vec<Resource>> {
        let resources = sqlx::query_as::<_, Resource>(
            r#"
            SELECT id, resource_id, type, title, level, subject, exam_board,
                   link, author, average_rating, description
            FROM resource
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch resources from Postgres")?;

        Ok(resources)
    }

    async fn fetch_ratings(&self) -> Result<Vec<RatingRow>> {
        let ratings =
            sqlx::query_as::<_, RatingRow>("SELECT id, average_rating FROM resource")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch ratings from Postgres")?;

        Ok(ratings)
    }

    async fn distinct_facets(&self) -> Result<FacetValues> {
        let subjects = distinct_column(&self.pool, "subject").await?;
        let exam_boards = distinct_column(&self.pool, "exam_board").await?;
        let levels = distinct_column(&self.pool, "level").await?;
        let types = distinct_column(&self.pool, "type").await?;

        Ok(FacetValues {
            subjects,
            exam_boards,
            levels,
            types,
        })
    }
}

async fn distinct_column(pool: &PgPool, column: &str) -> Result<Vec<String>> {
    // `column` is one of four hardcoded identifiers, never user input
    let sql = format!(
        r#"SELECT DISTINCT "{col}" FROM resource WHERE "{col}" <> '' ORDER BY "{col}""#,
        col = column
    );

    let values: Vec<String> = sqlx::query_scalar(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to fetch distinct {} values", column))?;

    Ok(values)
}
