use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schema::SchemaDescription;

/// Which scoring backend ranks intent labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringKind {
    /// Hosted zero-shot classification endpoint.
    #[default]
    ZeroShot,
    /// Ask the generation backend to pick a label.
    Llm,
}

/// Top-level Locus configuration, matching `locus.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocusConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub intents: IntentsSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub schema: SchemaDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// `ollama`, `openai`, `anthropic`, or `custom` (OpenAI-compatible).
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub temperature: f64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2:1b".to_string(),
            base_url: None,
            api_key_env: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSection {
    pub backend: ScoringKind,
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            backend: ScoringKind::ZeroShot,
            model: "facebook/bart-large-mnli".to_string(),
            base_url: "https://api-inference.huggingface.co".to_string(),
            api_key_env: Some("HF_TOKEN".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentsSection {
    pub chat_label: String,
    pub record_label: String,
}

impl Default for IntentsSection {
    fn default() -> Self {
        Self {
            chat_label: "General chat".to_string(),
            record_label: "Asking question about outlet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("subway_store.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Deadline for each classification / generation call.
    pub backend_timeout_secs: u64,
    /// Deadline for each store query.
    pub store_timeout_secs: u64,
    /// Extra synthesis attempts after an empty or failed one (0 or 1).
    pub synthesis_retries: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            backend_timeout_secs: 60,
            store_timeout_secs: 10,
            synthesis_retries: 0,
        }
    }
}

impl PipelineSection {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl LocusConfig {
    /// Parse and validate a config file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::NotFound(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Like [`LocusConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(text: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        let chat = self.intents.chat_label.trim();
        let record = self.intents.record_label.trim();
        if chat.is_empty() || record.is_empty() {
            return Err(ConfigError::Invalid("intent labels must not be empty".into()).into());
        }
        if chat.eq_ignore_ascii_case(record) {
            return Err(ConfigError::Invalid("intent labels must differ".into()).into());
        }
        if self.pipeline.backend_timeout_secs == 0 || self.pipeline.store_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".into()).into());
        }
        if self.pipeline.synthesis_retries > 1 {
            return Err(
                ConfigError::Invalid("synthesis_retries must be 0 or 1".into()).into(),
            );
        }
        if self.schema.entity.trim().is_empty() || self.schema.fields.is_empty() {
            return Err(ConfigError::Invalid("schema needs an entity and fields".into()).into());
        }
        Ok(())
    }
}

/// Read an API key from the named environment variable.
///
/// `None` for the variable name means the backend needs no key.
pub fn resolve_api_key(var: Option<&str>) -> crate::error::Result<String> {
    match var {
        None => Ok(String::new()),
        Some(name) => std::env::var(name).map_err(|_| {
            ConfigError::Invalid(format!("environment variable {name} is not set")).into()
        }),
    }
}
