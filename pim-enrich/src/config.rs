//! Configuration resolution for pim-enrich
//!
//! Secrets resolve through three tiers with Database → ENV → TOML
//! priority; the database is authoritative so keys entered at runtime
//! survive restarts without touching the environment.

use pim_common::config::TomlConfig;
use pim_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable for the Anthropic API key
pub const ANTHROPIC_KEY_ENV: &str = "PIM_ANTHROPIC_API_KEY";

/// Environment variable for the reference lookup base URL
pub const REFERENCE_URL_ENV: &str = "PIM_REFERENCE_LOOKUP_URL";

/// Default reference catalog (Open Food Facts compatible API)
pub const DEFAULT_REFERENCE_URL: &str = "https://world.openfoodfacts.org";

/// Resolve the Anthropic API key from 3-tier configuration
///
/// Priority: Database → ENV → TOML. A key found in a lower tier is
/// migrated into the database so it survives restarts. Returns None when
/// no tier has a valid key; the service still runs, degraded to the
/// reference data fallback.
pub async fn resolve_anthropic_api_key(
    db: &SqlitePool,
    toml_config: &TomlConfig,
    toml_path: &Path,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_anthropic_api_key(db)
        .await
        .map_err(|e| Error::Config(e.to_string()))?;
    let env_key = std::env::var(ANTHROPIC_KEY_ENV).ok();
    let toml_key = toml_config.anthropic_api_key.clone();

    let mut sources = Vec::new();
    if db_key.as_deref().is_some_and(is_valid_key) {
        sources.push("database");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("environment");
    }
    if toml_key.as_deref().is_some_and(is_valid_key) {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "Anthropic API key found in multiple sources: {}. Using database (highest priority).",
            sources.join(", ")
        );
    }

    for (key, source) in [
        (db_key, "database"),
        (env_key, "environment"),
        (toml_key, "TOML config"),
    ] {
        if let Some(key) = key {
            if is_valid_key(&key) {
                info!("Anthropic API key loaded from {}", source);
                if source != "database" {
                    migrate_key_to_database(key.clone(), source, db, toml_path).await?;
                }
                return Ok(Some(key));
            }
        }
    }

    warn!(
        "Anthropic API key not configured; AI enrichment disabled. Configure via:\n\
         1. Database settings table ({})\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: ~/.config/pim/pim-enrich.toml (anthropic_api_key = \"your-key\")",
        crate::db::settings::ANTHROPIC_API_KEY,
        ANTHROPIC_KEY_ENV,
    );
    Ok(None)
}

/// Resolve the reference lookup base URL (Database → ENV → TOML → default)
pub async fn resolve_reference_lookup_url(
    db: &SqlitePool,
    toml_config: &TomlConfig,
) -> Result<String> {
    if let Some(url) = crate::db::settings::get_reference_lookup_url(db)
        .await
        .map_err(|e| Error::Config(e.to_string()))?
    {
        if is_valid_key(&url) {
            return Ok(url);
        }
    }

    if let Ok(url) = std::env::var(REFERENCE_URL_ENV) {
        if is_valid_key(&url) {
            return Ok(url);
        }
    }

    if let Some(url) = &toml_config.reference_lookup_url {
        if is_valid_key(url) {
            return Ok(url.clone());
        }
    }

    Ok(DEFAULT_REFERENCE_URL.to_string())
}

/// Validate a configuration value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Sync settings from the database to the TOML file (best-effort backup)
pub async fn sync_settings_to_toml(
    settings: HashMap<String, String>,
    toml_path: &Path,
) -> Result<()> {
    let mut config = pim_common::config::load_toml_config(toml_path)?;

    if let Some(key) = settings.get(crate::db::settings::ANTHROPIC_API_KEY) {
        config.anthropic_api_key = Some(key.clone());
    }
    if let Some(url) = settings.get(crate::db::settings::REFERENCE_LOOKUP_URL) {
        config.reference_lookup_url = Some(url.clone());
    }

    match pim_common::config::write_toml_config(&config, toml_path) {
        Ok(()) => {
            info!("Settings synced to TOML: {}", toml_path.display());
            Ok(())
        }
        Err(e) => {
            warn!("TOML write failed (database write succeeded): {}", e);
            Ok(()) // Graceful degradation
        }
    }
}

/// Migrate a key discovered in ENV/TOML into the database tier
pub async fn migrate_key_to_database(
    key: String,
    source: &str,
    db: &SqlitePool,
    toml_path: &Path,
) -> Result<()> {
    crate::db::settings::set_anthropic_api_key(db, &key)
        .await
        .map_err(|e| Error::Config(e.to_string()))?;

    // Keep a TOML backup when the source was the (volatile) environment
    if source == "environment" {
        let mut settings = HashMap::new();
        settings.insert(crate::db::settings::ANTHROPIC_API_KEY.to_string(), key);
        sync_settings_to_toml(settings, toml_path).await?;
    }

    info!("Anthropic API key migrated from {} to database", source);
    Ok(())
}
