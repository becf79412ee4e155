//! Data models for pim-enrich (Product Enrichment microservice)

pub mod attribute;
pub mod product;

pub use attribute::{AttributeDefinition, AttributeType, EnrichmentSettings, ValueShape};
pub use product::{AttributeValue, EnrichmentStatus, Product};
