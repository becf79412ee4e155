//! Attribute definition store
//!
//! Definitions are validated at creation time. Deleting a definition or
//! renaming its key cascades into every product's attribute map in the same
//! transaction, so products never reference a key without a definition.

use crate::models::{AttributeDefinition, EnrichmentSettings};
use anyhow::{anyhow, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

fn attribute_from_row(row: &SqliteRow) -> Result<AttributeDefinition> {
    let type_str: String = row.get("attr_type");
    let options_json: String = row.get("options");
    let enabled: i64 = row.get("enrichment_enabled");
    let priority: i64 = row.get("enrichment_priority");
    let required: i64 = row.get("required");

    Ok(AttributeDefinition {
        key: row.get("key"),
        name: row.get("name"),
        description: row.get("description"),
        attr_type: type_str.parse()?,
        options: serde_json::from_str(&options_json)?,
        unit: row.get("unit"),
        required: required != 0,
        enrichment: EnrichmentSettings {
            enabled: enabled != 0,
            priority: priority.clamp(0, 10) as u8,
            prompt: row.get("enrichment_prompt"),
        },
    })
}

const ATTRIBUTE_COLUMNS: &str = "key, name, description, attr_type, options, unit, required, \
                                 enrichment_enabled, enrichment_priority, enrichment_prompt";

/// Save attribute definition (upsert). New definitions get the next
/// insertion position; upserts keep their original position.
pub async fn save_attribute(pool: &SqlitePool, definition: &AttributeDefinition) -> Result<()> {
    definition.validate().map_err(|e| anyhow!(e))?;

    sqlx::query(
        r#"
        INSERT INTO attributes (
            key, name, description, attr_type, options, unit, required,
            enrichment_enabled, enrichment_priority, enrichment_prompt,
            position, created_at, updated_at
        ) VALUES (
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(position) + 1, 0) FROM attributes),
            CURRENT_TIMESTAMP, CURRENT_TIMESTAMP
        )
        ON CONFLICT(key) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            attr_type = excluded.attr_type,
            options = excluded.options,
            unit = excluded.unit,
            required = excluded.required,
            enrichment_enabled = excluded.enrichment_enabled,
            enrichment_priority = excluded.enrichment_priority,
            enrichment_prompt = excluded.enrichment_prompt,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&definition.key)
    .bind(&definition.name)
    .bind(&definition.description)
    .bind(definition.attr_type.as_str())
    .bind(serde_json::to_string(&definition.options)?)
    .bind(&definition.unit)
    .bind(definition.required as i64)
    .bind(definition.enrichment.enabled as i64)
    .bind(definition.enrichment.priority as i64)
    .bind(&definition.enrichment.prompt)
    .execute(pool)
    .await?;

    Ok(())
}

/// All definitions in insertion order
pub async fn find_all(pool: &SqlitePool) -> Result<Vec<AttributeDefinition>> {
    let sql = format!(
        "SELECT {} FROM attributes ORDER BY position ASC",
        ATTRIBUTE_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(attribute_from_row).collect()
}

/// Enrichment-enabled definitions, priority descending, insertion-order ties
pub async fn find_enrichable(pool: &SqlitePool) -> Result<Vec<AttributeDefinition>> {
    let sql = format!(
        "SELECT {} FROM attributes WHERE enrichment_enabled = 1 \
         ORDER BY enrichment_priority DESC, position ASC",
        ATTRIBUTE_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(attribute_from_row).collect()
}

/// Definitions for a set of keys (insertion order, missing keys absent)
pub async fn find_by_keys(pool: &SqlitePool, keys: &[String]) -> Result<Vec<AttributeDefinition>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; keys.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM attributes WHERE key IN ({}) ORDER BY position ASC",
        ATTRIBUTE_COLUMNS, placeholders
    );

    let mut query = sqlx::query(&sql);
    for key in keys {
        query = query.bind(key);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(attribute_from_row).collect()
}

/// Delete a definition and cascade the key removal to every product
///
/// Returns the number of products migrated.
pub async fn delete_attribute(pool: &SqlitePool, key: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM attributes WHERE key = ?")
        .bind(key)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(anyhow!("Attribute definition not found: {}", key));
    }

    let migrated = crate::db::products::drop_attribute_key_tx(&mut tx, key).await?;
    tx.commit().await?;

    tracing::info!(key = %key, migrated, "Attribute definition deleted, key dropped from products");
    Ok(migrated)
}

/// Rename a definition's key and cascade the move to every product
///
/// Returns the number of products migrated.
pub async fn rename_attribute(pool: &SqlitePool, old_key: &str, new_key: &str) -> Result<u64> {
    if new_key.trim().is_empty() || new_key != new_key.to_lowercase() {
        return Err(anyhow!("New attribute key must be non-empty lowercase: {}", new_key));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE attributes SET key = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?",
    )
    .bind(new_key)
    .bind(old_key)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(anyhow!("Attribute definition not found: {}", old_key));
    }

    let migrated =
        crate::db::products::rename_attribute_key_tx(&mut tx, old_key, new_key).await?;
    tx.commit().await?;

    tracing::info!(
        old_key = %old_key,
        new_key = %new_key,
        migrated,
        "Attribute key renamed, products migrated"
    );
    Ok(migrated)
}
