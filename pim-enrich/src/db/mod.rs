//! Database access for pim-enrich
//!
//! SQLite persistence for products, attribute definitions and service
//! settings. Entity modules expose free functions over a `SqlitePool`.

pub mod attributes;
pub mod products;
pub mod settings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize pim-enrich tables
///
/// Creates products, attributes and settings tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            brand TEXT,
            barcode TEXT,
            images TEXT NOT NULL DEFAULT '[]',
            price REAL,
            category TEXT,
            status TEXT,
            attributes TEXT NOT NULL DEFAULT '{}',
            import_batch TEXT,
            enrichment_status TEXT NOT NULL DEFAULT 'pending',
            last_enriched TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_enrichment_status \
         ON products(enrichment_status)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attributes (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            attr_type TEXT NOT NULL,
            options TEXT NOT NULL DEFAULT '[]',
            unit TEXT,
            required INTEGER NOT NULL DEFAULT 0,
            enrichment_enabled INTEGER NOT NULL DEFAULT 1,
            enrichment_priority INTEGER NOT NULL DEFAULT 5,
            enrichment_prompt TEXT,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, products, attributes)");

    Ok(())
}
