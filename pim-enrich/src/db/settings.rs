//! Service settings persistence
//!
//! Key/value settings table backing tier 1 (authoritative) of configuration
//! resolution.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";
pub const REFERENCE_LOOKUP_URL: &str = "reference_lookup_url";

/// Read a setting, None when absent
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get("value")))
}

/// Write a setting (upsert)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_anthropic_api_key(pool: &SqlitePool) -> Result<Option<String>> {
    get_setting(pool, ANTHROPIC_API_KEY).await
}

pub async fn set_anthropic_api_key(pool: &SqlitePool, key: &str) -> Result<()> {
    set_setting(pool, ANTHROPIC_API_KEY, key).await
}

pub async fn get_reference_lookup_url(pool: &SqlitePool) -> Result<Option<String>> {
    get_setting(pool, REFERENCE_LOOKUP_URL).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();

        assert!(get_anthropic_api_key(&pool).await.unwrap().is_none());

        set_anthropic_api_key(&pool, "sk-first").await.unwrap();
        set_anthropic_api_key(&pool, "sk-second").await.unwrap();

        assert_eq!(
            get_anthropic_api_key(&pool).await.unwrap().as_deref(),
            Some("sk-second")
        );
    }
}
