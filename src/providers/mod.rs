mod anthropic_types;
pub mod catalog;
pub mod client;
pub mod decoder;
mod gemini_types;
pub mod http_client;
pub mod images;
mod openai_types;
pub mod request;
mod responses_types;
pub mod scrub;
pub mod sse;

pub use catalog::{
    AuthStyle, ProviderConfig, ProviderKind, ResolvedProvider, WireFormat, provider_spec,
    provider_table, resolve_provider,
};
pub use client::{CompletionClient, HttpCompletionClient};
pub use decoder::DeltaStream;
pub use request::{GenerationParams, PreparedRequest, RequestBuilder};
pub use scrub::{sanitize_api_error, scrub_secret_patterns};
