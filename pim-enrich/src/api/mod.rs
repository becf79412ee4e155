//! HTTP API for pim-enrich

pub mod enrichment;
pub mod health;

pub use enrichment::enrichment_routes;
pub use health::health_routes;
