//! Dynamic attribute schema
//!
//! `AttributeType` is the single source of truth for what each declared type
//! means: the shape of a valid value, whether `options` constrain it and
//! whether a `unit` is relevant. Unknown type strings are rejected when a
//! definition is created, never during enrichment.

use pim_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a dynamic product attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Short free text (single line)
    ShortText,
    /// Long free text
    LongText,
    /// Rich text (markup allowed)
    RichText,
    /// Floating point number
    Number,
    /// One value out of `options`
    SingleSelect,
    /// Subset of `options`
    MultiSelect,
    /// Numeric value with a unit symbol (e.g. "10.5 USD")
    Measure,
}

/// Shape of a valid value for an attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Scalar string
    Text,
    /// Floating point number
    Number,
    /// Array of strings
    StringList,
    /// `{value: number, unit: string}`
    NumberWithUnit,
}

impl AttributeType {
    /// All known types, in declaration order
    pub const ALL: [AttributeType; 7] = [
        AttributeType::ShortText,
        AttributeType::LongText,
        AttributeType::RichText,
        AttributeType::Number,
        AttributeType::SingleSelect,
        AttributeType::MultiSelect,
        AttributeType::Measure,
    ];

    /// Stable string form (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::ShortText => "short_text",
            AttributeType::LongText => "long_text",
            AttributeType::RichText => "rich_text",
            AttributeType::Number => "number",
            AttributeType::SingleSelect => "single_select",
            AttributeType::MultiSelect => "multi_select",
            AttributeType::Measure => "measure",
        }
    }

    /// Shape of a conforming value
    pub fn value_shape(&self) -> ValueShape {
        match self {
            AttributeType::ShortText | AttributeType::LongText | AttributeType::RichText => {
                ValueShape::Text
            }
            AttributeType::Number => ValueShape::Number,
            AttributeType::SingleSelect => ValueShape::Text,
            AttributeType::MultiSelect => ValueShape::StringList,
            AttributeType::Measure => ValueShape::NumberWithUnit,
        }
    }

    /// Whether `options` constrain values of this type
    pub fn uses_options(&self) -> bool {
        matches!(self, AttributeType::SingleSelect | AttributeType::MultiSelect)
    }

    /// Whether a `unit` is relevant for this type
    pub fn uses_unit(&self) -> bool {
        matches!(self, AttributeType::Measure)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttributeType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown attribute type: {}", s)))
    }
}

/// AI enrichment settings for one attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Whether this attribute participates in AI enrichment
    pub enabled: bool,
    /// Priority 0-10; higher priority attributes are requested first
    pub priority: u8,
    /// Custom instruction text; a default is generated when absent
    pub prompt: Option<String>,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 5,
            prompt: None,
        }
    }
}

/// Definition of one dynamic product attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Unique, lowercase, stable identifier
    pub key: String,
    /// Display label
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Declared type, drives coercion and validation
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Allowed values for select types (ordered)
    #[serde(default)]
    pub options: Vec<String>,
    /// Default unit symbol for measure type
    pub unit: Option<String>,
    /// Whether every product must carry this key
    #[serde(default)]
    pub required: bool,
    /// AI enrichment settings
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

impl AttributeDefinition {
    pub fn new(key: impl Into<String>, name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: None,
            attr_type,
            options: Vec::new(),
            unit: None,
            required: false,
            enrichment: EnrichmentSettings::default(),
        }
    }

    /// Validate invariants that must hold before a definition is persisted
    ///
    /// Surfaced at definition-creation time so enrichment never sees a
    /// malformed definition.
    pub fn validate(&self) -> Result<(), Error> {
        if self.key.trim().is_empty() {
            return Err(Error::InvalidInput("Attribute key must not be empty".to_string()));
        }
        if self.key != self.key.to_lowercase() {
            return Err(Error::InvalidInput(format!(
                "Attribute key must be lowercase: {}",
                self.key
            )));
        }
        if self.key.contains(char::is_whitespace) {
            return Err(Error::InvalidInput(format!(
                "Attribute key must not contain whitespace: {}",
                self.key
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Attribute name must not be empty".to_string()));
        }
        if self.attr_type.uses_options() && self.options.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Attribute '{}' of type {} requires a non-empty options list",
                self.key, self.attr_type
            )));
        }
        if self.enrichment.priority > 10 {
            return Err(Error::InvalidInput(format!(
                "Enrichment priority must be 0-10, got {}",
                self.enrichment.priority
            )));
        }
        Ok(())
    }
}
