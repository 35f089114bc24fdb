// Scoring backends: hosted zero-shot classification and LLM label picking.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LocusError, ScoringError};
use crate::llm::{LlmProvider, http_client};

use super::{LabelScore, ScoringBackend};

// ── Zero-shot HTTP scorer ───────────────────────────────────────────

/// Zero-shot classification over HTTP, in the Hugging Face inference shape:
/// `POST {base}/models/{model}` with `{"inputs", "parameters": {"candidate_labels"}}`.
#[derive(Debug)]
pub struct ZeroShotScorer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ZeroShotScorer {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: http_client(),
            api_key,
            model,
            base_url,
        }
    }
}

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    Parallel { labels: Vec<String>, scores: Vec<f64> },
    Pairs(Vec<LabelScore>),
}

impl ZeroShotResponse {
    fn into_scores(self) -> Result<Vec<LabelScore>, ScoringError> {
        match self {
            Self::Parallel { labels, scores } => {
                if labels.len() != scores.len() {
                    return Err(ScoringError::Parse(format!(
                        "{} labels but {} scores",
                        labels.len(),
                        scores.len()
                    )));
                }
                Ok(labels
                    .into_iter()
                    .zip(scores)
                    .map(|(label, score)| LabelScore { label, score })
                    .collect())
            }
            Self::Pairs(pairs) => Ok(pairs),
        }
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl ScoringBackend for ZeroShotScorer {
    fn name(&self) -> &str {
        "zero-shot"
    }

    async fn score(&self, text: &str, labels: &[String]) -> crate::error::Result<Vec<LabelScore>> {
        let url = format!("{}/models/{}", self.base_url.trim_end_matches('/'), self.model);
        let body = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParameters {
                candidate_labels: labels,
            },
        };

        debug!(model = %self.model, "Calling zero-shot classification API");

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| LocusError::Scoring(ScoringError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LocusError::Scoring(ScoringError::ApiError { status, body }));
        }

        let parsed: ZeroShotResponse = resp
            .json()
            .await
            .map_err(|e| LocusError::Scoring(ScoringError::Parse(e.to_string())))?;
        Ok(parsed.into_scores()?)
    }
}

// ── LLM label picker ────────────────────────────────────────────────

/// Asks a text-generation provider to name the best label.
///
/// The chosen label scores 1.0 and every other candidate 0.0, so a
/// deterministic provider yields a deterministic classification.
#[derive(Debug)]
pub struct LlmScorer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmScorer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

fn build_label_prompt(text: &str, labels: &[String]) -> String {
    let options = labels
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {l}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Classify the user's message into exactly one of these categories:\n\
         {options}\n\n\
         Message: {text}\n\n\
         Answer with the category text only."
    )
}

/// Find which label the reply names: exact match, then a bare option
/// number, then the earliest label mentioned anywhere in the reply.
fn pick_label(reply: &str, labels: &[String]) -> Option<usize> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
        .trim();
    let lower = cleaned.to_lowercase();

    if let Some(i) = labels.iter().position(|l| l.to_lowercase() == lower) {
        return Some(i);
    }
    if let Ok(n) = cleaned.parse::<usize>() {
        if (1..=labels.len()).contains(&n) {
            return Some(n - 1);
        }
    }
    labels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| lower.find(&l.to_lowercase()).map(|at| (at, i)))
        .min()
        .map(|(_, i)| i)
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl ScoringBackend for LlmScorer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn score(&self, text: &str, labels: &[String]) -> crate::error::Result<Vec<LabelScore>> {
        let prompt = build_label_prompt(text, labels);
        let (reply, usage) = self.provider.call(&prompt, 0.0).await?;
        debug!(
            provider = self.provider.name(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Label picker replied"
        );
        let chosen = pick_label(&reply, labels).ok_or_else(|| {
            LocusError::Scoring(ScoringError::Parse(format!(
                "reply names no candidate label: {reply:?}"
            )))
        })?;
        Ok(labels
            .iter()
            .enumerate()
            .map(|(i, label)| LabelScore {
                label: label.clone(),
                score: if i == chosen { 1.0 } else { 0.0 },
            })
            .collect())
    }
}
