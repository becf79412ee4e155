//! Service modules for the enrichment pipeline

pub mod anthropic;
pub mod coercion;
pub mod gateway;
pub mod orchestrator;
pub mod prompt;
pub mod reference;
pub mod scheduler;

pub use anthropic::AnthropicBackend;
pub use coercion::{coerce, CoercedValue, CoercionFailure};
pub use gateway::{
    select_tier, BackendTier, ChatBackend, FailoverSchedule, GatewayPolicy, GatewayResponse,
    ProviderError, ProviderGateway, RawResponseMap, ReferenceLookup, ResponseSource,
};
pub use orchestrator::{EnrichmentError, EnrichmentOrchestrator, ProductOutcome};
pub use prompt::{build_request, PromptRequest, UNKNOWN_SENTINEL};
pub use reference::ReferenceDataClient;
pub use scheduler::{BatchScheduler, EnrichmentDispatch, SYNC_SLICE_SIZE};
