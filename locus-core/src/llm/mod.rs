pub mod providers;

use std::sync::Once;

use serde::{Deserialize, Serialize};

/// Token usage from an LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Common interface for text-generation providers.
///
/// Calls are single-turn: no conversation state is kept between them.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Call the LLM with a prompt and return response + token usage.
    async fn call(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> crate::error::Result<(String, TokenUsage)>;
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Shared HTTP client builder for providers and scorers.
///
/// reqwest is built without a default rustls crypto provider, so the
/// aws-lc-rs provider is installed process-wide on first use.
pub(crate) fn http_client() -> reqwest::Client {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
    reqwest::Client::new()
}
