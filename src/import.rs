//! Bulk sample-data import.
//!
//! Loads a JSON export of the upstream catalog into the `resource` table.
//! The import runs in a single transaction and is skipped entirely when the
//! table already holds rows, so it can sit in a provisioning script without
//! clobbering live data.

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::PgPool;
use std::path::Path;

/// One record in the upstream JSON export. Field names follow the export's
/// human-readable headers.
#[derive(Debug, Deserialize)]
pub struct ImportRecord {
    #[serde(rename = "Resource ID")]
    pub resource_id: serde_json::Value,
    #[serde(rename = "Resource Type")]
    pub r#type: String,
    #[serde(rename = "Resource Title")]
    pub title: String,
    #[serde(rename = "Study Level")]
    pub level: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Exam Board")]
    pub exam_board: String,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Resource Author")]
    pub author: String,
    #[serde(rename = "Average Rating", default)]
    pub average_rating: f64,
    #[serde(rename = "Resource Description", default)]
    pub description: Option<String>,
}

/// Imports resources from a JSON file, skipping when the table is
/// non-empty. Returns the number of rows inserted.
pub async fn run_import(pool: &PgPool, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;

    let records: Vec<ImportRecord> =
        serde_json::from_str(&content).context("Failed to parse import file as a JSON array")?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resource")
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        println!(
            "Database already contains {} resources, skipping import",
            existing
        );
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    for record in &records {
        // The export is inconsistent about whether ids are numbers or strings
        let resource_id = match &record.resource_id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO resource (
                resource_id, type, title, level, subject, exam_board,
                link, author, average_rating, description
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&resource_id)
        .bind(&record.r#type)
        .bind(&record.title)
        .bind(&record.level)
        .bind(&record.subject)
        .bind(&record.exam_board)
        .bind(&record.link)
        .bind(&record.author)
        .bind(record.average_rating)
        .bind(&record.description)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert resource '{}'", record.title))?;
    }

    tx.commit().await?;

    Ok(records.len())
}
