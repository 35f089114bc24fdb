// Text-generation providers: Ollama, Anthropic, OpenAI, and custom HTTP endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LlmError, LocusError};

use super::{LlmProvider, TokenUsage, http_client};

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn user(prompt: &str) -> Vec<Self> {
        vec![Self {
            role: "user".to_string(),
            content: prompt.to_string(),
        }]
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> crate::error::Result<T> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LocusError::Llm(LlmError::ApiError { status, body: text }));
    }
    resp.json()
        .await
        .map_err(|e| LocusError::Llm(LlmError::Parse(e.to_string())))
}

// ── Ollama Provider ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(model: String) -> Self {
        Self {
            client: http_client(),
            model,
            base_url: "http://localhost:11434".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/api/chat", self.base_url);

        let body = OllamaRequest {
            model: self.model.clone(),
            messages: ChatMessage::user(prompt),
            stream: false,
            options: OllamaOptions { temperature },
        };

        debug!(model = %self.model, "Calling Ollama API");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LocusError::Llm(LlmError::Network(e.to_string())))?;

        let result: OllamaResponse = read_json(resp).await?;

        Ok((
            result.message.content,
            TokenUsage {
                input_tokens: result.prompt_eval_count,
                output_tokens: result.eval_count,
            },
        ))
    }
}

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature,
            messages: ChatMessage::user(prompt),
        };

        debug!(model = %self.model, "Calling Anthropic API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LocusError::Llm(LlmError::Network(e.to_string())))?;

        let result: AnthropicResponse = read_json(resp).await?;

        let text = result
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();

        Ok((
            text,
            TokenUsage {
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
            },
        ))
    }
}

// ── OpenAI Provider ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> crate::error::Result<(String, TokenUsage)> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature,
            messages: ChatMessage::user(prompt),
        };

        debug!(model = %self.model, "Calling OpenAI API");

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json");
        // Local OpenAI-compatible servers usually run without a key.
        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| LocusError::Llm(LlmError::Network(e.to_string())))?;

        let result: OpenAiResponse = read_json(resp).await?;

        let text = result
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = result.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok((text, usage))
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create a text-generation provider from configuration.
pub fn create_provider(
    provider: &str,
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    match provider {
        "ollama" => {
            let mut p = OllamaProvider::new(model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Box::new(p))
        }
        "anthropic" => {
            if api_key.is_empty() {
                return Err(LocusError::Llm(LlmError::Config(
                    "anthropic provider requires an API key (set llm.api_key_env)".into(),
                )));
            }
            let mut p = AnthropicProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Box::new(p))
        }
        "openai" | "custom" => {
            let mut p = OpenAiProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Box::new(p))
        }
        other => Err(LocusError::Llm(LlmError::Config(format!(
            "Unknown provider: {other}. Use: ollama, anthropic, openai, custom"
        )))),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_factory() {
        let p = create_provider("ollama", "llama3.2:1b", "", None).unwrap();
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.model_id(), "llama3.2:1b");

        let p = create_provider("anthropic", "test-model", "key", None).unwrap();
        assert_eq!(p.name(), "anthropic");

        let p = create_provider("openai", "gpt-4o", "key", None).unwrap();
        assert_eq!(p.name(), "openai");

        let p = create_provider(
            "custom",
            "local-model",
            "",
            Some("http://localhost:8080"),
        );
        assert!(p.is_ok());

        let p = create_provider("invalid", "model", "key", None);
        assert!(p.is_err());
    }

    #[test]
    fn anthropic_requires_key() {
        let err = create_provider("anthropic", "m", "", None).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn ollama_response_parses_without_counts() {
        let parsed: OllamaResponse =
            serde_json::from_str(r#"{"message":{"role":"assistant","content":"hi"}}"#).unwrap();
        assert_eq!(parsed.message.content, "hi");
        assert_eq!(parsed.eval_count, 0);
    }

    #[test]
    fn openai_response_tolerates_null_content() {
        let parsed: OpenAiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }
}
