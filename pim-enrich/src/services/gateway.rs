//! AI provider gateway
//!
//! Executes a built prompt against interchangeable chat backends with
//! retry, backend failover and a non-AI fallback data source. Nothing
//! escapes this module unhandled except the one documented case: every
//! attempt failed *and* the fallback produced nothing, which the caller
//! absorbs into a per-product failure.
//!
//! Per enrichment call: `ATTEMPT(n) → SUCCESS | ATTEMPT(n+1) [n < max] →
//! FALLBACK → DONE`. Each retry flips the active backend, turning a plain
//! retry into a failover strategy.

use crate::models::{AttributeDefinition, Product};
use crate::services::prompt::PromptRequest;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw key → value mapping parsed from a backend response
pub type RawResponseMap = Map<String, Value>;

/// Product name length beyond which the advanced backend is preferred
const COMPLEX_NAME_THRESHOLD: usize = 100;

/// Priority above which an attribute demands the advanced backend
const HIGH_PRIORITY_THRESHOLD: u8 = 7;

/// Gateway errors
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Unparseable response: {0}")]
    Parse(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

/// Backend capability tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTier {
    /// Higher-capability backend for ambiguous or high-priority requests
    Advanced,
    /// Default backend
    Standard,
}

impl BackendTier {
    /// The alternate tier, used on failover
    pub fn flipped(self) -> Self {
        match self {
            BackendTier::Advanced => BackendTier::Standard,
            BackendTier::Standard => BackendTier::Advanced,
        }
    }
}

/// Pick the initial backend tier for one product
///
/// Advanced when any selected attribute has priority above 7, or the
/// product name is long enough to suggest an ambiguous listing.
pub fn select_tier(product: &Product, attributes: &[AttributeDefinition]) -> BackendTier {
    let high_priority = attributes
        .iter()
        .any(|attr| attr.enrichment.priority > HIGH_PRIORITY_THRESHOLD);

    if high_priority || product.name.chars().count() > COMPLEX_NAME_THRESHOLD {
        BackendTier::Advanced
    } else {
        BackendTier::Standard
    }
}

/// Failover schedule: which tier handles which attempt, and how long to
/// wait before it
///
/// Explicit so the policy is testable independent of any live backend.
#[derive(Debug, Clone, Copy)]
pub struct FailoverSchedule {
    initial: BackendTier,
    backoff_base: Duration,
}

impl FailoverSchedule {
    pub fn new(initial: BackendTier, backoff_base: Duration) -> Self {
        Self {
            initial,
            backoff_base,
        }
    }

    /// Tier for a zero-based attempt number; flips on every retry
    pub fn tier_for(&self, attempt: u32) -> BackendTier {
        if attempt % 2 == 0 {
            self.initial
        } else {
            self.initial.flipped()
        }
    }

    /// Exponential backoff before the given retry (attempt >= 1)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

/// A chat-completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend identifier for logging (e.g. "anthropic/claude-3-opus")
    fn id(&self) -> &str;

    /// Execute the prompt, returning the raw response text
    async fn complete(&self, prompt: &PromptRequest) -> Result<String, ProviderError>;
}

/// Non-AI reference data source used when all backends fail
///
/// Keyed by barcode first, then by name. Never fails: any miss or error
/// degrades to an empty mapping.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn lookup(&self, barcode: Option<&str>, name: &str) -> RawResponseMap;
}

/// Where a gateway response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Backend(BackendTier),
    Fallback,
}

/// Parsed result of one enrichment call
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub values: RawResponseMap,
    pub source: ResponseSource,
    /// Number of backend attempts made (0 when unconfigured)
    pub attempts: u32,
}

/// Retry/timeout policy
#[derive(Debug, Clone, Copy)]
pub struct GatewayPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Bound on each individual backend attempt
    pub attempt_timeout: Duration,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

/// Product identity handed to the fallback source
#[derive(Debug, Clone)]
pub struct FallbackQuery {
    pub barcode: Option<String>,
    pub name: String,
}

impl FallbackQuery {
    pub fn for_product(product: &Product) -> Self {
        Self {
            barcode: product.barcode.clone(),
            name: product.name.clone(),
        }
    }
}

/// Gateway over two chat backends plus a reference-data fallback
pub struct ProviderGateway {
    advanced: Arc<dyn ChatBackend>,
    standard: Arc<dyn ChatBackend>,
    fallback: Arc<dyn ReferenceLookup>,
    policy: GatewayPolicy,
}

impl ProviderGateway {
    pub fn new(
        advanced: Arc<dyn ChatBackend>,
        standard: Arc<dyn ChatBackend>,
        fallback: Arc<dyn ReferenceLookup>,
    ) -> Self {
        Self {
            advanced,
            standard,
            fallback,
            policy: GatewayPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: GatewayPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn backend(&self, tier: BackendTier) -> &Arc<dyn ChatBackend> {
        match tier {
            BackendTier::Advanced => &self.advanced,
            BackendTier::Standard => &self.standard,
        }
    }

    /// Execute one enrichment call
    ///
    /// Returns `Err` only when all attempts failed and the fallback came
    /// back empty; a non-empty fallback result is a success with
    /// `ResponseSource::Fallback`. An unconfigured backend is not retried.
    pub async fn execute(
        &self,
        query: &FallbackQuery,
        initial_tier: BackendTier,
        prompt: &PromptRequest,
    ) -> Result<GatewayResponse, ProviderError> {
        let schedule = FailoverSchedule::new(initial_tier, self.policy.backoff_base);
        let mut last_error = ProviderError::NotConfigured("no attempt made".to_string());
        let mut attempts = 0;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                tokio::time::sleep(schedule.backoff_delay(attempt)).await;
            }

            let tier = schedule.tier_for(attempt);
            let backend = self.backend(tier);
            attempts += 1;

            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, backend.complete(prompt)).await;

            match outcome {
                Ok(Ok(text)) => match parse_response(&text) {
                    Ok(values) => {
                        tracing::debug!(
                            backend = backend.id(),
                            attempt,
                            fields = values.len(),
                            "Backend responded"
                        );
                        return Ok(GatewayResponse {
                            values,
                            source: ResponseSource::Backend(tier),
                            attempts,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            backend = backend.id(),
                            attempt,
                            error = %e,
                            "Backend response unparseable"
                        );
                        last_error = e;
                    }
                },
                Ok(Err(e)) => {
                    tracing::warn!(backend = backend.id(), attempt, error = %e, "Backend attempt failed");
                    // A missing key cannot recover on retry; skip the
                    // backoff schedule and go straight to the fallback.
                    let unconfigured = matches!(e, ProviderError::NotConfigured(_));
                    last_error = e;
                    if unconfigured {
                        break;
                    }
                }
                Err(_) => {
                    tracing::warn!(backend = backend.id(), attempt, "Backend attempt timed out");
                    last_error = ProviderError::Timeout;
                }
            }
        }

        tracing::warn!(
            name = %query.name,
            error = %last_error,
            "All backend attempts failed, trying reference data fallback"
        );

        let values = self
            .fallback
            .lookup(query.barcode.as_deref(), &query.name)
            .await;

        if values.is_empty() {
            Err(last_error)
        } else {
            Ok(GatewayResponse {
                values,
                source: ResponseSource::Fallback,
                attempts,
            })
        }
    }
}

/// Parse a backend response into a JSON object
///
/// Backends sometimes wrap the object in prose or code fences; extract the
/// first well-formed `{...}` substring before giving up.
pub fn parse_response(text: &str) -> Result<RawResponseMap, ProviderError> {
    let trimmed = text.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(map);
    }

    if let Some(candidate) = extract_json_object(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
            return Ok(map);
        }
    }

    Err(ProviderError::Parse(format!(
        "no JSON object in response ({} bytes)",
        text.len()
    )))
}

/// Extract the first balanced `{...}` substring, respecting string
/// literals and escapes
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
