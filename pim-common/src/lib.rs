//! Shared types for the PIM microservices
//!
//! Currently hosts the common error type and TOML configuration handling
//! used by pim-enrich.

pub mod config;
pub mod error;

pub use error::{Error, Result};
