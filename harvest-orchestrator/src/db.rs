use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create schedules table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedules (
            id UUID PRIMARY KEY,
            source VARCHAR(255) NOT NULL,
            sku VARCHAR(255) NOT NULL,
            name VARCHAR(255) NOT NULL,
            cron_expression TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            next_execution TIMESTAMPTZ,
            last_executed TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create sitemaps table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sitemaps (
            id UUID PRIMARY KEY,
            schedule_id UUID NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            regex_filter TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Executions outlive their schedule for audit, so no foreign key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id UUID PRIMARY KEY,
            schedule_id UUID NOT NULL,
            status VARCHAR(50) NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ,
            seeded_count BIGINT,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create entities table, keyed by natural key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            entity_type VARCHAR(20) NOT NULL,
            slug VARCHAR(255) NOT NULL,
            data JSONB NOT NULL,
            content_hash VARCHAR(64) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (entity_type, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_schedules_due ON schedules(is_active, next_execution)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sitemaps_schedule_id ON sitemaps(schedule_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_schedule_id ON executions(schedule_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
