//! Remote inference API client.
//!
//! [`OpenRouterClient`] implements [`prism_core::generation::ImageGenerationApi`]
//! against an OpenRouter-compatible HTTP API. The [`response`] module turns raw
//! response bodies into the typed results the rest of the workspace uses.

pub mod openrouter_client;
pub mod response;

pub use openrouter_client::OpenRouterClient;
