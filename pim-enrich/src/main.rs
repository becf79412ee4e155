//! pim-enrich - Product Attribute Enrichment Service
//!
//! Enriches catalog products with attribute values sourced from AI chat
//! backends, with a reference-data fallback when no backend answers.
//! Integrates with the PIM backend via HTTP REST.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pim_enrich::services::{
    AnthropicBackend, BatchScheduler, EnrichmentOrchestrator, ProviderGateway, ReferenceDataClient,
};
use pim_enrich::AppState;

/// Claude model for the advanced tier (complex products, high priority)
const ADVANCED_MODEL: &str = "claude-3-opus-20240229";

/// Claude model for the standard tier
const STANDARD_MODEL: &str = "claude-3-haiku-20240307";

const LISTEN_ADDR: &str = "127.0.0.1:5711";

/// Environment variable for the database path
const DB_PATH_ENV: &str = "PIM_ENRICH_DB_PATH";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = pim_common::config::default_config_path("pim-enrich");
    let toml_config = pim_common::config::load_toml_config(&config_path)?;

    let level: Level = toml_config
        .logging
        .level
        .parse()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting pim-enrich (Product Attribute Enrichment) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let cli_db_path = std::env::args().nth(1);
    let db_path = pim_common::config::resolve_database_path(
        cli_db_path.as_deref(),
        DB_PATH_ENV,
        &toml_config,
    );
    info!("Database: {}", db_path.display());

    let db_pool = pim_enrich::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Secrets resolve Database -> ENV -> TOML
    let api_key =
        pim_enrich::config::resolve_anthropic_api_key(&db_pool, &toml_config, &config_path)
            .await?;
    if api_key.is_none() {
        warn!("Running without AI backends; enrichment uses reference data only");
    }

    let reference_url =
        pim_enrich::config::resolve_reference_lookup_url(&db_pool, &toml_config).await?;
    info!("Reference lookup: {}", reference_url);

    let advanced = AnthropicBackend::new(api_key.clone(), ADVANCED_MODEL)
        .map_err(|e| anyhow::anyhow!("Failed to build advanced backend: {}", e))?;
    let standard = AnthropicBackend::new(api_key, STANDARD_MODEL)
        .map_err(|e| anyhow::anyhow!("Failed to build standard backend: {}", e))?;
    let reference = ReferenceDataClient::new(reference_url)?;

    let gateway = Arc::new(ProviderGateway::new(
        Arc::new(advanced),
        Arc::new(standard),
        Arc::new(reference),
    ));

    let orchestrator = Arc::new(EnrichmentOrchestrator::new(db_pool.clone(), gateway));
    let scheduler = Arc::new(BatchScheduler::new(orchestrator));

    let state = AppState::new(db_pool, scheduler);
    let app = pim_enrich::build_router(state);

    let listener = tokio::net::TcpListener::bind(LISTEN_ADDR).await?;
    info!("Listening on http://{}", LISTEN_ADDR);
    info!("Health check: http://{}/health", LISTEN_ADDR);

    axum::serve(listener, app).await?;

    Ok(())
}
