//! LLM provider adapters.
//!
//! The executor resolves a model configuration from the registry into one
//! of four concrete adapters — OpenAI, Ollama, Google Gemini, Anthropic —
//! behind the [`LlmProvider`] trait. Credentials and defaults are read
//! from the configuration's schema slots
//! (`credentials/parameters → properties.<key>.default`).

mod anthropic;
mod google;
mod openai_compat;
mod schema;
mod sse;
mod traits;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use schema::{build_provider, schema_default, Provider};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
