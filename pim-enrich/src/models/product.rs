//! Product records with an open attribute map
//!
//! Core fields are fixed; `attributes` is a dynamic mapping from attribute
//! key to a tagged value, validated against the current attribute
//! definitions at write time rather than by static typing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Enrichment lifecycle state of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Never enriched (initial state)
    Pending,
    /// An enrichment run has started for this product
    InProgress,
    /// The pipeline executed without throwing (possibly with zero fields)
    Completed,
    /// The pipeline failed for this product
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::InProgress => "in_progress",
            EnrichmentStatus::Completed => "completed",
            EnrichmentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentStatus {
    type Err = pim_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrichmentStatus::Pending),
            "in_progress" => Ok(EnrichmentStatus::InProgress),
            "completed" => Ok(EnrichmentStatus::Completed),
            "failed" => Ok(EnrichmentStatus::Failed),
            other => Err(pim_common::Error::InvalidInput(format!(
                "Unknown enrichment status: {}",
                other
            ))),
        }
    }
}

/// One entry of the dynamic attribute map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    /// Coerced value (string, number, or array of strings)
    pub value: Value,
    /// Unit symbol, set for measure attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl AttributeValue {
    pub fn with_unit(value: Value, unit: Option<String>) -> Self {
        Self { value, unit }
    }
}

/// Product record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub status: Option<String>,
    /// Dynamic attributes keyed by `AttributeDefinition.key` (ordered)
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Import batch identifier, set by the import boundary
    pub import_batch: Option<String>,
    pub enrichment_status: EnrichmentStatus,
    /// Timestamp of the last transition into in_progress or a terminal state
    pub last_enriched: Option<DateTime<Utc>>,
}

impl Product {
    /// Create a new product in the `pending` state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            brand: None,
            barcode: None,
            images: Vec::new(),
            price: None,
            category: None,
            status: None,
            attributes: BTreeMap::new(),
            import_batch: None,
            enrichment_status: EnrichmentStatus::Pending,
            last_enriched: None,
        }
    }

    /// Get an attribute value formatted for display ("10.5 USD" for measures)
    pub fn attribute_display(&self, key: &str) -> Option<String> {
        let attr = self.attributes.get(key)?;
        let value = match &attr.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match &attr.unit {
            Some(unit) => Some(format!("{} {}", value, unit)),
            None => Some(value),
        }
    }

    /// Set one attribute entry, replacing any existing value for that key
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value, unit: Option<String>) {
        self.attributes
            .insert(key.into(), AttributeValue::with_unit(value, unit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_product_starts_pending() {
        let product = Product::new("Widget");
        assert_eq!(product.enrichment_status, EnrichmentStatus::Pending);
        assert!(product.last_enriched.is_none());
        assert!(product.attributes.is_empty());
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            EnrichmentStatus::Pending,
            EnrichmentStatus::InProgress,
            EnrichmentStatus::Completed,
            EnrichmentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<EnrichmentStatus>().unwrap(), status);
        }
        assert!("done".parse::<EnrichmentStatus>().is_err());
    }

    #[test]
    fn attribute_display_includes_unit() {
        let mut product = Product::new("Widget");
        product.set_attribute("weight", json!(2.5), Some("kg".to_string()));
        product.set_attribute("color", json!("Red"), None);

        assert_eq!(product.attribute_display("weight").as_deref(), Some("2.5 kg"));
        assert_eq!(product.attribute_display("color").as_deref(), Some("Red"));
        assert_eq!(product.attribute_display("missing"), None);
    }

    #[test]
    fn attribute_map_serializes_with_optional_unit() {
        let mut product = Product::new("Widget");
        product.set_attribute("color", json!("Red"), None);

        let serialized = serde_json::to_value(&product.attributes).unwrap();
        assert_eq!(serialized["color"]["value"], json!("Red"));
        // unit omitted when None
        assert!(serialized["color"].get("unit").is_none());
    }
}
