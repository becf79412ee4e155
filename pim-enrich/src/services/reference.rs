//! Non-AI reference data fallback
//!
//! Looks a product up in an external catalog, by barcode first and by name
//! second, and maps the hit onto a raw attribute map the coercion engine
//! can consume. Every failure path degrades to an empty mapping; this
//! source exists so a total AI outage still yields something rather than
//! an error.

use crate::services::gateway::{RawResponseMap, ReferenceLookup};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "pim-enrich/0.1.0";
const HTTP_TIMEOUT_SECS: u64 = 15;

/// Reference catalog client (Open Food Facts compatible API shape)
pub struct ReferenceDataClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ReferenceDataClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_object(&self, request: reqwest::RequestBuilder) -> Option<Value> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "Reference lookup request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(url = %response.url(), status = %response.status(), "Reference lookup miss");
            return None;
        }

        response.json::<Value>().await.ok()
    }

    /// Flatten a catalog product document into a raw attribute map
    ///
    /// Only scalar string/number fields are carried over; the coercion
    /// engine handles the rest exactly as it would an AI response.
    fn flatten(document: &Value) -> RawResponseMap {
        let mut map = RawResponseMap::new();
        let Some(object) = document.get("product").and_then(|p| p.as_object()) else {
            return map;
        };

        for (key, value) in object {
            match value {
                Value::String(s) if !s.trim().is_empty() => {
                    map.insert(key.clone(), value.clone());
                }
                Value::Number(_) => {
                    map.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }

        map
    }
}

#[async_trait]
impl ReferenceLookup for ReferenceDataClient {
    async fn lookup(&self, barcode: Option<&str>, name: &str) -> RawResponseMap {
        // Barcode lookup first
        if let Some(barcode) = barcode {
            let request = self
                .http_client
                .get(format!("{}/api/v2/product/{}.json", self.base_url, barcode));
            if let Some(document) = self.fetch_object(request).await {
                let map = Self::flatten(&document);
                if !map.is_empty() {
                    tracing::info!(barcode = %barcode, fields = map.len(), "Reference data hit by barcode");
                    return map;
                }
            }
        }

        // Name search second
        let request = self
            .http_client
            .get(format!("{}/cgi/search.pl", self.base_url))
            .query(&[("search_terms", name), ("json", "1"), ("page_size", "1")]);
        if let Some(document) = self.fetch_object(request).await {
            if let Some(first) = document
                .get("products")
                .and_then(|p| p.as_array())
                .and_then(|a| a.first())
            {
                let wrapped = serde_json::json!({ "product": first });
                let map = Self::flatten(&wrapped);
                if !map.is_empty() {
                    tracing::info!(name = %name, fields = map.len(), "Reference data hit by name");
                    return map;
                }
            }
        }

        tracing::debug!(name = %name, "Reference data total miss");
        RawResponseMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_keeps_scalars_only() {
        let document = json!({
            "product": {
                "brand": "Acme",
                "weight": 250,
                "empty": "  ",
                "nested": { "skip": true },
                "list": ["skip"]
            }
        });

        let map = ReferenceDataClient::flatten(&document);
        assert_eq!(map.len(), 2);
        assert_eq!(map["brand"], json!("Acme"));
        assert_eq!(map["weight"], json!(250));
    }

    #[test]
    fn flatten_of_miss_is_empty() {
        assert!(ReferenceDataClient::flatten(&json!({"status": 0})).is_empty());
    }

    #[tokio::test]
    async fn unreachable_catalog_degrades_to_empty() {
        // Port 9 (discard) refuses connections; lookup must not error
        let client = ReferenceDataClient::new("http://127.0.0.1:9").unwrap();
        let map = client.lookup(Some("0123456789012"), "Widget").await;
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn name_with_reserved_chars_is_still_a_valid_request() {
        // Spaces and '#' in the search term must not break URL construction
        let client = ReferenceDataClient::new("http://127.0.0.1:9").unwrap();
        let map = client.lookup(None, "Acme Anvil #3 & Co").await;
        assert!(map.is_empty());
    }
}
