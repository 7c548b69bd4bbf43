use anyhow::Result;
use sqlx::PgPool;

/// Creates the `resource` table and its secondary index. Idempotent —
/// running it repeatedly is safe. Rows are populated by the bulk import,
/// never by the sync engine.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource (
            id BIGSERIAL PRIMARY KEY,
            resource_id TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            level TEXT NOT NULL,
            subject TEXT NOT NULL,
            exam_board TEXT NOT NULL,
            link TEXT NOT NULL,
            author TEXT NOT NULL,
            average_rating DOUBLE PRECISION NOT NULL DEFAULT 0,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_resource_resource_id ON resource(resource_id)")
        .execute(pool)
        .await?;

    Ok(())
}
