//! Prompt construction for AI enrichment
//!
//! Pure functions with no I/O: a product plus a set of attribute
//! definitions becomes a system/user prompt pair. The caller passes
//! attributes in the order they should be requested (priority descending).

use crate::models::{AttributeDefinition, AttributeType, Product};

/// Sentinel the model returns when it cannot determine a value
pub const UNKNOWN_SENTINEL: &str = "unknown";

/// Structured request for a chat backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Product context and response format rules
    pub system: String,
    /// Per-attribute instructions
    pub user: String,
}

/// Build the enrichment request for one product
///
/// Output contract requested from the model: a flat JSON object keyed by
/// attribute key, values as plain strings (comma-separated for
/// multi-select), with `"unknown"` permitted for undeterminable values.
pub fn build_request(product: &Product, attributes: &[AttributeDefinition]) -> PromptRequest {
    let system = format!(
        "You are an AI assistant specialized in product information enrichment.\n\
         Your task is to analyze this product and provide accurate information for the requested attributes.\n\
         Do not make up information if you're uncertain. Use \"{}\" in such cases.\n\
         \n\
         The product information is as follows:\n\
         - Name: {}\n\
         - Brand: {}\n\
         - Barcode/UPC: {}\n\
         - Images: {}\n\
         \n\
         For each attribute, provide ONLY the value requested without additional explanation or formatting.\n\
         For measure type attributes, include both the value and unit (e.g., \"10.5 USD\").\n\
         For multiple select attributes, provide values separated by commas.\n",
        UNKNOWN_SENTINEL,
        product.name,
        product.brand.as_deref().unwrap_or("Unknown"),
        product.barcode.as_deref().unwrap_or("Unknown"),
        if product.images.is_empty() {
            "Not available"
        } else {
            "Available (referenced, not analyzed)"
        },
    );

    let mut user = String::from("Please provide the following information about this product:\n\n");

    for attr in attributes {
        let instructions = attr
            .enrichment
            .prompt
            .clone()
            .unwrap_or_else(|| format!("Provide the {} of this product.", attr.name));

        user.push_str(&format!("{} ({}): {}\n", attr.name, attr.attr_type, instructions));

        if attr.attr_type.uses_options() && !attr.options.is_empty() {
            user.push_str(&format!("Options: {}\n", attr.options.join(", ")));
        }

        if attr.attr_type.uses_unit() {
            if let Some(unit) = &attr.unit {
                user.push_str(&format!("Unit: {}\n", unit));
            }
        }

        user.push('\n');
    }

    user.push_str(
        "Format your response as a JSON object with attribute keys and values. \
         Example: { \"attribute1\": \"value1\", \"attribute2\": \"value2\" }",
    );

    PromptRequest { system, user }
}
