//! Product store
//!
//! Persistence contract consumed by the enrichment core: `find_by_ids`,
//! `bulk_set_status`, `save_product`, status queries, and the cascade
//! migrations that keep every product's attribute map consistent when an
//! attribute definition is deleted or its key is renamed.

use crate::models::{AttributeValue, EnrichmentStatus, Product};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-status product counts for the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Lightweight status row (id, status, last_enriched)
#[derive(Debug, Clone, Serialize)]
pub struct ProductStatusRow {
    pub product_id: Uuid,
    pub enrichment_status: EnrichmentStatus,
    pub last_enriched: Option<DateTime<Utc>>,
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let guid: String = row.get("guid");
    let images_json: String = row.get("images");
    let attributes_json: String = row.get("attributes");
    let status_str: String = row.get("enrichment_status");
    let last_enriched: Option<String> = row.get("last_enriched");

    let attributes: BTreeMap<String, AttributeValue> = serde_json::from_str(&attributes_json)?;

    Ok(Product {
        id: Uuid::parse_str(&guid)?,
        name: row.get("name"),
        brand: row.get("brand"),
        barcode: row.get("barcode"),
        images: serde_json::from_str(&images_json)?,
        price: row.get("price"),
        category: row.get("category"),
        status: row.get("status"),
        attributes,
        import_batch: row.get("import_batch"),
        enrichment_status: status_str.parse()?,
        last_enriched: last_enriched
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
    })
}

const PRODUCT_COLUMNS: &str = "guid, name, brand, barcode, images, price, category, status, \
                               attributes, import_batch, enrichment_status, last_enriched";

/// Save product to database (upsert of core fields + attribute map + status)
pub async fn save_product(pool: &SqlitePool, product: &Product) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO products (
            guid, name, brand, barcode, images, price, category, status,
            attributes, import_batch, enrichment_status, last_enriched,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(guid) DO UPDATE SET
            name = excluded.name,
            brand = excluded.brand,
            barcode = excluded.barcode,
            images = excluded.images,
            price = excluded.price,
            category = excluded.category,
            status = excluded.status,
            attributes = excluded.attributes,
            import_batch = excluded.import_batch,
            enrichment_status = excluded.enrichment_status,
            last_enriched = excluded.last_enriched,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(product.id.to_string())
    .bind(&product.name)
    .bind(&product.brand)
    .bind(&product.barcode)
    .bind(serde_json::to_string(&product.images)?)
    .bind(product.price)
    .bind(&product.category)
    .bind(&product.status)
    .bind(serde_json::to_string(&product.attributes)?)
    .bind(&product.import_batch)
    .bind(product.enrichment_status.as_str())
    .bind(product.last_enriched.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load products by id; missing ids are silently absent from the result
pub async fn find_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Product>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM products WHERE guid IN ({})",
        PRODUCT_COLUMNS, placeholders
    );

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(product_from_row).collect()
}

/// Load a single product by id
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE guid = ?", PRODUCT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(product_from_row).transpose()
}

/// Bulk status update for an enrichment run
///
/// Must be durably persisted before any per-product write of the same run
/// is issued; a failure here aborts the run.
pub async fn bulk_set_status(
    pool: &SqlitePool,
    ids: &[Uuid],
    status: EnrichmentStatus,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "UPDATE products SET enrichment_status = ?, last_enriched = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE guid IN ({})",
        placeholders
    );

    let mut query = sqlx::query(&sql).bind(status.as_str()).bind(timestamp.to_rfc3339());
    for id in ids {
        query = query.bind(id.to_string());
    }
    query.execute(pool).await?;

    Ok(())
}

/// Update status fields of one product
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: EnrichmentStatus,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE products SET enrichment_status = ?, last_enriched = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(status.as_str())
    .bind(timestamp.to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Status rows for the status endpoint, optionally scoped to a set of ids
pub async fn status_overview(
    pool: &SqlitePool,
    scope: Option<&[Uuid]>,
) -> Result<Vec<ProductStatusRow>> {
    let rows = match scope {
        Some(ids) if ids.is_empty() => return Ok(Vec::new()),
        Some(ids) => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT guid, enrichment_status, last_enriched FROM products \
                 WHERE guid IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(id.to_string());
            }
            query.fetch_all(pool).await?
        }
        None => {
            sqlx::query("SELECT guid, enrichment_status, last_enriched FROM products")
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            let status: String = row.get("enrichment_status");
            let last_enriched: Option<String> = row.get("last_enriched");
            Ok(ProductStatusRow {
                product_id: Uuid::parse_str(&guid)?,
                enrichment_status: status.parse()?,
                last_enriched: last_enriched
                    .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                    .transpose()?,
            })
        })
        .collect()
}

/// Per-status counts, optionally scoped to a set of ids
pub async fn status_counts(pool: &SqlitePool, scope: Option<&[Uuid]>) -> Result<StatusSummary> {
    let mut summary = StatusSummary::default();
    for row in status_overview(pool, scope).await? {
        match row.enrichment_status {
            EnrichmentStatus::Pending => summary.pending += 1,
            EnrichmentStatus::InProgress => summary.in_progress += 1,
            EnrichmentStatus::Completed => summary.completed += 1,
            EnrichmentStatus::Failed => summary.failed += 1,
        }
    }
    Ok(summary)
}

/// Reset failed products back to pending, returning the number reset
///
/// Scoped to the given ids, or all failed products when scope is None.
pub async fn reset_failed(pool: &SqlitePool, scope: Option<&[Uuid]>) -> Result<u64> {
    let result = match scope {
        Some(ids) if ids.is_empty() => return Ok(0),
        Some(ids) => {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "UPDATE products SET enrichment_status = 'pending', \
                 updated_at = CURRENT_TIMESTAMP \
                 WHERE enrichment_status = 'failed' AND guid IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(id.to_string());
            }
            query.execute(pool).await?
        }
        None => {
            sqlx::query(
                "UPDATE products SET enrichment_status = 'pending', \
                 updated_at = CURRENT_TIMESTAMP WHERE enrichment_status = 'failed'",
            )
            .execute(pool)
            .await?
        }
    };

    Ok(result.rows_affected())
}

/// Drop an attribute key from every product holding it (within a transaction)
///
/// Returns the number of migrated products.
pub(crate) async fn drop_attribute_key_tx(conn: &mut SqliteConnection, key: &str) -> Result<u64> {
    migrate_attribute_maps(conn, key, None).await
}

/// Move an attribute key to a new name in every product holding it,
/// preserving the value (within a transaction)
pub(crate) async fn rename_attribute_key_tx(
    conn: &mut SqliteConnection,
    old_key: &str,
    new_key: &str,
) -> Result<u64> {
    migrate_attribute_maps(conn, old_key, Some(new_key)).await
}

/// Drop an attribute key from every product's attribute map
pub async fn drop_attribute_key(pool: &SqlitePool, key: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let migrated = drop_attribute_key_tx(&mut tx, key).await?;
    tx.commit().await?;
    Ok(migrated)
}

/// Rename an attribute key in every product's attribute map
pub async fn rename_attribute_key(pool: &SqlitePool, old_key: &str, new_key: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let migrated = rename_attribute_key_tx(&mut tx, old_key, new_key).await?;
    tx.commit().await?;
    Ok(migrated)
}

/// Shared cascade walk: rewrite the attribute map of every product that
/// holds `key`, either dropping the entry or moving it to `rename_to`.
///
/// The LIKE filter is a coarse prefilter; the JSON parse below decides
/// precisely.
async fn migrate_attribute_maps(
    conn: &mut SqliteConnection,
    key: &str,
    rename_to: Option<&str>,
) -> Result<u64> {
    let pattern = format!("%\"{}\"%", key);
    let rows = sqlx::query("SELECT guid, attributes FROM products WHERE attributes LIKE ?")
        .bind(&pattern)
        .fetch_all(&mut *conn)
        .await?;

    let mut migrated = 0u64;
    for row in rows {
        let guid: String = row.get("guid");
        let attributes_json: String = row.get("attributes");
        let mut attributes: BTreeMap<String, AttributeValue> =
            serde_json::from_str(&attributes_json)?;

        let Some(value) = attributes.remove(key) else {
            continue; // LIKE false positive
        };
        if let Some(new_key) = rename_to {
            attributes.insert(new_key.to_string(), value);
        }

        sqlx::query(
            "UPDATE products SET attributes = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
        )
        .bind(serde_json::to_string(&attributes)?)
        .bind(&guid)
        .execute(&mut *conn)
        .await?;

        migrated += 1;
    }

    Ok(migrated)
}
