//! Integration tests for the enrichment workflow
//!
//! Exercises the orchestrator and scheduler against an in-memory database
//! with deterministic chat backends.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use pim_enrich::models::{AttributeDefinition, AttributeType, EnrichmentStatus, Product};
use pim_enrich::services::{
    BatchScheduler, ChatBackend, EnrichmentOrchestrator, GatewayPolicy, PromptRequest,
    ProviderError, ProviderGateway, RawResponseMap, ReferenceLookup,
};

/// Marker in a product name that makes the test backends fail for it
const POISON: &str = "POISON";

/// Backend that answers with a fixed attribute object, but fails any
/// request whose prompt mentions the poison marker
struct NameKeyedBackend;

#[async_trait]
impl ChatBackend for NameKeyedBackend {
    fn id(&self) -> &str {
        "test/name-keyed"
    }

    async fn complete(&self, prompt: &PromptRequest) -> Result<String, ProviderError> {
        if prompt.system.contains(POISON) {
            return Err(ProviderError::Api(500, "backend unavailable".to_string()));
        }
        Ok(r#"{"color": "red", "weight": "2.5 kg", "material": "Cotton"}"#.to_string())
    }
}

/// Backend that always fails
struct DownBackend;

#[async_trait]
impl ChatBackend for DownBackend {
    fn id(&self) -> &str {
        "test/down"
    }

    async fn complete(&self, _prompt: &PromptRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Network("connection refused".to_string()))
    }
}

struct EmptyFallback;

#[async_trait]
impl ReferenceLookup for EmptyFallback {
    async fn lookup(&self, _barcode: Option<&str>, _name: &str) -> RawResponseMap {
        RawResponseMap::new()
    }
}

struct FixedFallback(RawResponseMap);

#[async_trait]
impl ReferenceLookup for FixedFallback {
    async fn lookup(&self, _barcode: Option<&str>, _name: &str) -> RawResponseMap {
        self.0.clone()
    }
}

fn fast_policy() -> GatewayPolicy {
    GatewayPolicy {
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(5),
    }
}

async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    pim_enrich::db::init_tables(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Seed the attribute definitions the test backends answer for
async fn seed_attributes(pool: &sqlx::SqlitePool) {
    let mut color = AttributeDefinition::new("color", "Color", AttributeType::SingleSelect);
    color.options = vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()];

    let mut weight = AttributeDefinition::new("weight", "Weight", AttributeType::Measure);
    weight.unit = Some("kg".to_string());

    let material = AttributeDefinition::new("material", "Material", AttributeType::ShortText);

    for def in [&color, &weight, &material] {
        pim_enrich::db::attributes::save_attribute(pool, def)
            .await
            .expect("Failed to save attribute");
    }
}

async fn seed_products(pool: &sqlx::SqlitePool, names: &[&str]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for name in names {
        let product = Product::new(*name);
        pim_enrich::db::products::save_product(pool, &product)
            .await
            .expect("Failed to save product");
        ids.push(product.id);
    }
    ids
}

fn orchestrator(
    pool: &sqlx::SqlitePool,
    fallback: Arc<dyn ReferenceLookup>,
) -> Arc<EnrichmentOrchestrator> {
    let gateway = Arc::new(
        ProviderGateway::new(
            Arc::new(NameKeyedBackend),
            Arc::new(NameKeyedBackend),
            fallback,
        )
        .with_policy(fast_policy()),
    );
    Arc::new(
        EnrichmentOrchestrator::new(pool.clone(), gateway)
            .with_pacing(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn one_failing_product_does_not_abort_the_batch() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;

    let ids = seed_products(
        &pool,
        &[
            "Shirt A", "Shirt B", "Shirt C", POISON, "Shirt D", "Shirt E", "Shirt F",
        ],
    )
    .await;

    let outcomes = orchestrator(&pool, Arc::new(EmptyFallback))
        .enrich(&ids)
        .await
        .expect("Batch run should not error");

    assert_eq!(outcomes.len(), 7);
    let completed = outcomes
        .iter()
        .filter(|o| o.status == EnrichmentStatus::Completed)
        .count();
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| o.status == EnrichmentStatus::Failed)
        .collect();
    assert_eq!(completed, 6);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].product_id, ids[3]);
    assert!(failed[0].error.is_some());

    // Failed status is persisted for the poison product only
    let poisoned = pim_enrich::db::products::find_by_id(&pool, ids[3])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(poisoned.enrichment_status, EnrichmentStatus::Failed);
    assert!(poisoned.attributes.is_empty());

    let healthy = pim_enrich::db::products::find_by_id(&pool, ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(healthy.enrichment_status, EnrichmentStatus::Completed);
    assert!(healthy.last_enriched.is_some());
}

#[tokio::test]
async fn enriched_values_are_coerced_before_persisting() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    let ids = seed_products(&pool, &["Cotton Shirt"]).await;

    orchestrator(&pool, Arc::new(EmptyFallback))
        .enrich(&ids)
        .await
        .unwrap();

    let product = pim_enrich::db::products::find_by_id(&pool, ids[0])
        .await
        .unwrap()
        .unwrap();

    // "red" matched to the canonical option
    assert_eq!(product.attributes["color"].value, json!("Red"));
    // "2.5 kg" split into numeric value + unit
    assert_eq!(product.attributes["weight"].value, json!(2.5));
    assert_eq!(product.attributes["weight"].unit.as_deref(), Some("kg"));
    assert_eq!(product.attributes["material"].value, json!("Cotton"));
}

#[tokio::test]
async fn re_enrichment_preserves_attributes_the_model_did_not_mention() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;

    let mut product = Product::new("Linen Shirt");
    product.set_attribute("origin".to_string(), json!("Portugal"), None);
    pim_enrich::db::products::save_product(&pool, &product)
        .await
        .unwrap();

    orchestrator(&pool, Arc::new(EmptyFallback))
        .enrich(&[product.id])
        .await
        .unwrap();

    let stored = pim_enrich::db::products::find_by_id(&pool, product.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.attributes["origin"].value, json!("Portugal"));
    assert_eq!(stored.attributes["color"].value, json!("Red"));
}

#[tokio::test]
async fn reference_data_fills_in_when_all_backends_are_down() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    let ids = seed_products(&pool, &["Mystery Widget"]).await;

    let mut values = RawResponseMap::new();
    values.insert("material".to_string(), json!("Steel"));

    let gateway = Arc::new(
        ProviderGateway::new(
            Arc::new(DownBackend),
            Arc::new(DownBackend),
            Arc::new(FixedFallback(values)),
        )
        .with_policy(fast_policy()),
    );
    let orchestrator = EnrichmentOrchestrator::new(pool.clone(), gateway)
        .with_pacing(Duration::from_millis(1));

    let outcomes = orchestrator.enrich(&ids).await.unwrap();
    assert_eq!(outcomes[0].status, EnrichmentStatus::Completed);

    let product = pim_enrich::db::products::find_by_id(&pool, ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.attributes["material"].value, json!("Steel"));
    assert!(!product.attributes.contains_key("color"));
}

#[tokio::test]
async fn unknown_product_id_yields_a_failed_outcome() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    let ids = seed_products(&pool, &["Real Product"]).await;

    let ghost = Uuid::new_v4();
    let request = vec![ids[0], ghost];

    let outcomes = orchestrator(&pool, Arc::new(EmptyFallback))
        .enrich(&request)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, EnrichmentStatus::Completed);
    assert_eq!(outcomes[1].status, EnrichmentStatus::Failed);
    assert_eq!(outcomes[1].product_id, ghost);
}

#[tokio::test]
async fn retry_resets_only_failed_products() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    let ids = seed_products(&pool, &["Good Shirt", POISON]).await;

    orchestrator(&pool, Arc::new(EmptyFallback))
        .enrich(&ids)
        .await
        .unwrap();

    let reset = pim_enrich::db::products::reset_failed(&pool, None)
        .await
        .unwrap();
    assert_eq!(reset, 1);

    let summary = pim_enrich::db::products::status_counts(&pool, None)
        .await
        .unwrap();
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn scheduler_processes_first_slice_inline_and_defers_the_rest() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    let ids = seed_products(
        &pool,
        &["P1", "P2", "P3", "P4", "P5", "P6", "P7", "P8"],
    )
    .await;

    let scheduler = BatchScheduler::new(orchestrator(&pool, Arc::new(EmptyFallback)));
    let dispatch = scheduler.dispatch(ids.clone()).await.unwrap();

    assert_eq!(dispatch.processed.len(), 5);
    assert_eq!(dispatch.queued, 3);
    assert!(dispatch
        .processed
        .iter()
        .all(|o| o.status == EnrichmentStatus::Completed));

    // The deferred slice finishes in the background
    let mut summary = pim_enrich::db::products::status_counts(&pool, Some(&ids))
        .await
        .unwrap();
    for _ in 0..200 {
        if summary.completed == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        summary = pim_enrich::db::products::status_counts(&pool, Some(&ids))
            .await
            .unwrap();
    }
    assert_eq!(summary.completed, 8);
    assert_eq!(summary.in_progress, 0);
}

#[tokio::test]
async fn empty_request_is_rejected_without_side_effects() {
    let pool = test_pool().await;
    seed_attributes(&pool).await;
    seed_products(&pool, &["Untouched"]).await;

    let result = orchestrator(&pool, Arc::new(EmptyFallback)).enrich(&[]).await;
    assert!(result.is_err());

    let summary = pim_enrich::db::products::status_counts(&pool, None)
        .await
        .unwrap();
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.in_progress, 0);
}
