//! Enrichment orchestrator
//!
//! Drives one enrichment run over a set of product ids: bulk status
//! stamping, prompt → gateway → coercion per product, merge and persist,
//! with per-product failure isolation. One product's failure never aborts
//! or corrupts its siblings; the result list is always 1:1 with the input
//! ids.

use crate::db;
use crate::models::{AttributeDefinition, EnrichmentStatus, Product};
use crate::services::coercion::{coerce, CoercedValue};
use crate::services::gateway::{select_tier, FallbackQuery, ProviderGateway, RawResponseMap};
use crate::services::prompt::{build_request, UNKNOWN_SENTINEL};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Sub-batch size for bulk runs (bounds parallel backend calls)
const SUB_BATCH_SIZE: usize = 10;

/// Pacing delay between sub-batches, to respect external rate limits
const SUB_BATCH_PACING: Duration = Duration::from_secs(1);

/// Errors that propagate to the caller of an enrichment run
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Malformed or empty input; surfaced immediately, no side effects
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Store failure before per-product processing started
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result for one product of a run
#[derive(Debug, Clone, Serialize)]
pub struct ProductOutcome {
    pub product_id: Uuid,
    pub status: EnrichmentStatus,
    /// Number of attribute values merged (completed outcomes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enriched_fields: Option<usize>,
    /// Error message (failed outcomes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProductOutcome {
    fn completed(product_id: Uuid, enriched_fields: usize) -> Self {
        Self {
            product_id,
            status: EnrichmentStatus::Completed,
            enriched_fields: Some(enriched_fields),
            error: None,
        }
    }

    fn failed(product_id: Uuid, error: String) -> Self {
        Self {
            product_id,
            status: EnrichmentStatus::Failed,
            enriched_fields: None,
            error: Some(error),
        }
    }
}

/// Orchestrates enrichment runs against the product store and the gateway
pub struct EnrichmentOrchestrator {
    db: SqlitePool,
    gateway: Arc<ProviderGateway>,
    sub_batch_size: usize,
    pacing: Duration,
}

impl EnrichmentOrchestrator {
    pub fn new(db: SqlitePool, gateway: Arc<ProviderGateway>) -> Self {
        Self {
            db,
            gateway,
            sub_batch_size: SUB_BATCH_SIZE,
            pacing: SUB_BATCH_PACING,
        }
    }

    /// Override sub-batch pacing (used by tests)
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run enrichment over a set of product ids
    ///
    /// Returns one outcome per input id, in input order.
    pub async fn enrich(&self, product_ids: &[Uuid]) -> Result<Vec<ProductOutcome>, EnrichmentError> {
        if product_ids.is_empty() {
            return Err(EnrichmentError::InvalidRequest(
                "No product IDs provided".to_string(),
            ));
        }

        // Bulk in_progress stamp must be durable before any per-product
        // write; without a known starting state the run cannot proceed.
        let started_at = Utc::now();
        db::products::bulk_set_status(&self.db, product_ids, EnrichmentStatus::InProgress, started_at)
            .await
            .map_err(|e| EnrichmentError::Persistence(e.to_string()))?;

        let attributes = db::attributes::find_enrichable(&self.db)
            .await
            .map_err(|e| EnrichmentError::Persistence(e.to_string()))?;

        let products = db::products::find_by_ids(&self.db, product_ids)
            .await
            .map_err(|e| EnrichmentError::Persistence(e.to_string()))?;
        let mut by_id: HashMap<Uuid, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();

        tracing::info!(
            products = product_ids.len(),
            attributes = attributes.len(),
            "Starting enrichment run"
        );

        let bulk_mode = product_ids.len() > self.sub_batch_size;
        let mut outcomes = Vec::with_capacity(product_ids.len());
        let chunks: Vec<&[Uuid]> = product_ids.chunks(self.sub_batch_size).collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let batch = join_all(
                chunk
                    .iter()
                    .map(|id| self.enrich_one(*id, by_id.remove(id), &attributes)),
            )
            .await;
            outcomes.extend(batch);

            // Throttle between sub-batches to avoid provider rate limits
            if bulk_mode && index + 1 < chunk_count {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let failed = outcomes
            .iter()
            .filter(|o| o.status == EnrichmentStatus::Failed)
            .count();
        tracing::info!(
            products = outcomes.len(),
            failed,
            "Enrichment run finished"
        );

        Ok(outcomes)
    }

    /// Enrich a single product; never escapes an error
    async fn enrich_one(
        &self,
        product_id: Uuid,
        product: Option<Product>,
        attributes: &[AttributeDefinition],
    ) -> ProductOutcome {
        let Some(mut product) = product else {
            tracing::warn!(product_id = %product_id, "Product not found, marking failed");
            self.persist_failure(product_id).await;
            return ProductOutcome::failed(product_id, "Product not found".to_string());
        };

        match self.enrich_product(&mut product, attributes).await {
            Ok(enriched_fields) => {
                tracing::info!(
                    product_id = %product_id,
                    enriched_fields,
                    "Product enrichment completed"
                );
                ProductOutcome::completed(product_id, enriched_fields)
            }
            Err(e) => {
                tracing::error!(product_id = %product_id, error = %e, "Product enrichment failed");
                self.persist_failure(product_id).await;
                ProductOutcome::failed(product_id, e.to_string())
            }
        }
    }

    /// The per-product pipeline: prompt → gateway → coerce → merge → save
    async fn enrich_product(
        &self,
        product: &mut Product,
        attributes: &[AttributeDefinition],
    ) -> anyhow::Result<usize> {
        let prompt = build_request(product, attributes);
        let tier = select_tier(product, attributes);
        let query = FallbackQuery::for_product(product);

        let response = self.gateway.execute(&query, tier, &prompt).await?;

        let staged = stage_values(&response.values, attributes);
        let enriched_fields = staged.len();

        // Merge only the keys the response addressed; existing entries the
        // model did not mention stay untouched.
        for (key, value, unit) in staged {
            product.set_attribute(key, value, unit);
        }

        product.enrichment_status = EnrichmentStatus::Completed;
        product.last_enriched = Some(Utc::now());
        db::products::save_product(&self.db, product).await?;

        Ok(enriched_fields)
    }

    /// Best-effort failed-status write; a failure here is logged, not raised
    async fn persist_failure(&self, product_id: Uuid) {
        if let Err(e) =
            db::products::set_status(&self.db, product_id, EnrichmentStatus::Failed, Utc::now())
                .await
        {
            tracing::error!(
                product_id = %product_id,
                error = %e,
                "Failed to persist failed enrichment status"
            );
        }
    }
}

/// Map a raw response onto the attribute definitions, returning the
/// entries to merge
///
/// Null, empty and `"unknown"` values are skipped. A coercion failure
/// degrades to identity pass-through with a warning; it never fails the
/// product.
fn stage_values(
    values: &RawResponseMap,
    attributes: &[AttributeDefinition],
) -> Vec<(String, Value, Option<String>)> {
    let mut staged = Vec::new();

    for attr in attributes {
        let Some(raw) = values.get(&attr.key) else {
            continue;
        };

        if should_skip(raw) {
            continue;
        }

        let (value, unit) = match coerce(raw, attr.attr_type, &attr.options) {
            Ok(coerced) => coerced.into_parts(),
            Err(failure) => {
                tracing::warn!(
                    key = %attr.key,
                    error = %failure,
                    "Coercion failed, keeping raw value"
                );
                (raw.clone(), None)
            }
        };

        // Multi-select responses where every token was dropped carry no
        // information; treat like a skipped field.
        if matches!(&value, Value::Array(items) if items.is_empty()) {
            continue;
        }

        staged.push((attr.key.clone(), value, unit));
    }

    staged
}

/// Null, empty and sentinel values indicate the model had nothing to say
fn should_skip(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.is_empty() || trimmed == UNKNOWN_SENTINEL
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeType;
    use serde_json::json;

    fn definition(key: &str, attr_type: AttributeType) -> AttributeDefinition {
        AttributeDefinition::new(key, key.to_uppercase(), attr_type)
    }

    fn response(pairs: &[(&str, Value)]) -> RawResponseMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn stage_skips_null_empty_and_unknown() {
        let attrs = vec![
            definition("a", AttributeType::ShortText),
            definition("b", AttributeType::ShortText),
            definition("c", AttributeType::ShortText),
            definition("d", AttributeType::ShortText),
        ];
        let values = response(&[
            ("a", Value::Null),
            ("b", json!("  ")),
            ("c", json!("unknown")),
            ("d", json!("kept")),
        ]);

        let staged = stage_values(&values, &attrs);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].0, "d");
        assert_eq!(staged[0].1, json!("kept"));
    }

    #[test]
    fn stage_ignores_keys_without_definitions() {
        let attrs = vec![definition("known", AttributeType::ShortText)];
        let values = response(&[("known", json!("v")), ("mystery", json!("x"))]);

        let staged = stage_values(&values, &attrs);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].0, "known");
    }

    #[test]
    fn stage_passes_raw_value_through_on_coercion_failure() {
        let attrs = vec![definition("count", AttributeType::Number)];
        let values = response(&[("count", json!("many"))]);

        let staged = stage_values(&values, &attrs);
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].1, json!("many"));
    }

    #[test]
    fn stage_carries_measure_units() {
        let attrs = vec![definition("weight", AttributeType::Measure)];
        let values = response(&[("weight", json!("2.5 kg"))]);

        let staged = stage_values(&values, &attrs);
        assert_eq!(staged[0].1, json!(2.5));
        assert_eq!(staged[0].2.as_deref(), Some("kg"));
    }

    #[test]
    fn stage_drops_fully_unmatched_multi_select() {
        let mut attr = definition("tags", AttributeType::MultiSelect);
        attr.options = vec!["A".to_string(), "B".to_string()];
        let values = response(&[("tags", json!("x, y"))]);

        let staged = stage_values(&values, &[attr]);
        assert!(staged.is_empty());
    }
}
