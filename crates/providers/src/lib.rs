//! Model adapters for wayfarer.
//!
//! Every adapter implements [`LlmProvider`] and translates its wire format
//! into provider-agnostic [`StreamEvent`](wf_domain::stream::StreamEvent)s,
//! keying tool-call fragments by call id.

pub mod openai_compat;
pub mod registry;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatProvider;
pub use registry::ProviderRegistry;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
pub use util::resolve_api_key;
