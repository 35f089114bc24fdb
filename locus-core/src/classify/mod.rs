//! Intent classification.
//!
//! A [`ScoringBackend`] ranks candidate labels for a question; the
//! [`IntentClassifier`] picks the winner and maps it onto an [`Intent`].

pub mod scorers;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::IntentsSection;
use crate::error::PipelineError;

/// How a question should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ConversationalChat,
    RecordQuestion,
}

/// Confidence assigned to one candidate label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Ranks candidate labels for a piece of text.
#[async_trait::async_trait]
pub trait ScoringBackend: Send + Sync + std::fmt::Debug {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Score every candidate label. Order of the result is not significant.
    async fn score(&self, text: &str, labels: &[String]) -> crate::error::Result<Vec<LabelScore>>;
}

/// The fixed, ordered label set and the intent each label stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentLabels {
    labels: Vec<String>,
    intents: Vec<Intent>,
}

impl IntentLabels {
    pub fn new(chat_label: &str, record_label: &str) -> Self {
        Self {
            labels: vec![chat_label.to_string(), record_label.to_string()],
            intents: vec![Intent::ConversationalChat, Intent::RecordQuestion],
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn intent_for(&self, label: &str) -> Option<Intent> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.intents[i])
    }
}

impl From<&IntentsSection> for IntentLabels {
    fn from(section: &IntentsSection) -> Self {
        Self::new(&section.chat_label, &section.record_label)
    }
}

impl Default for IntentLabels {
    fn default() -> Self {
        Self::from(&IntentsSection::default())
    }
}

/// Pick the highest-scoring label among `labels`.
///
/// Ties go to the label that appears first in `labels`. Scores for labels
/// outside the candidate set are ignored. Returns `None` when no candidate
/// received a score.
pub fn best_label<'a>(labels: &'a [String], scores: &[LabelScore]) -> Option<&'a str> {
    let mut best: Option<(&'a str, f64)> = None;
    for label in labels {
        let Some(score) = scores
            .iter()
            .filter(|s| &s.label == label && !s.score.is_nan())
            .map(|s| s.score)
            .reduce(f64::max)
        else {
            continue;
        };
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((label.as_str(), score)),
        }
    }
    best.map(|(label, _)| label)
}

/// Stateless classifier over a scoring backend and a fixed label set.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    backend: Arc<dyn ScoringBackend>,
    labels: Arc<IntentLabels>,
}

impl IntentClassifier {
    pub fn new(backend: Arc<dyn ScoringBackend>, labels: Arc<IntentLabels>) -> Self {
        Self { backend, labels }
    }

    pub fn labels(&self) -> &IntentLabels {
        &self.labels
    }

    /// Return the best-matching label from `labels` for `question`.
    pub async fn classify(
        &self,
        question: &str,
        labels: &[String],
    ) -> Result<String, PipelineError> {
        if labels.len() < 2 {
            return Err(PipelineError::ClassificationUnavailable(
                "at least two candidate labels are required".into(),
            ));
        }
        let scores = self
            .backend
            .score(question, labels)
            .await
            .map_err(|e| PipelineError::ClassificationUnavailable(e.to_string()))?;
        debug!(backend = self.backend.name(), ?scores, "Scored intent labels");
        best_label(labels, &scores)
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::ClassificationUnavailable(
                    "scoring backend returned no candidate label".into(),
                )
            })
    }

    /// Classify against the configured label set and map to an [`Intent`].
    pub async fn intent(&self, question: &str) -> Result<Intent, PipelineError> {
        let label = self.classify(question, self.labels.labels()).await?;
        self.labels.intent_for(&label).ok_or_else(|| {
            PipelineError::ClassificationUnavailable(format!("label {label:?} has no intent"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LocusError, ScoringError};

    fn scores(pairs: &[(&str, f64)]) -> Vec<LabelScore> {
        pairs
            .iter()
            .map(|(l, s)| LabelScore {
                label: (*l).to_string(),
                score: *s,
            })
            .collect()
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn highest_score_wins() {
        let l = labels(&["chat", "record"]);
        assert_eq!(
            best_label(&l, &scores(&[("record", 0.9), ("chat", 0.1)])),
            Some("record")
        );
    }

    #[test]
    fn tie_goes_to_first_label() {
        let l = labels(&["chat", "record"]);
        assert_eq!(
            best_label(&l, &scores(&[("record", 0.5), ("chat", 0.5)])),
            Some("chat")
        );
        let l = labels(&["record", "chat"]);
        assert_eq!(
            best_label(&l, &scores(&[("chat", 0.5), ("record", 0.5)])),
            Some("record")
        );
    }

    #[test]
    fn unknown_labels_and_nan_are_ignored() {
        let l = labels(&["chat", "record"]);
        assert_eq!(
            best_label(
                &l,
                &scores(&[("weather", 0.99), ("chat", f64::NAN), ("record", 0.2)])
            ),
            Some("record")
        );
        assert_eq!(best_label(&l, &scores(&[("weather", 1.0)])), None);
    }

    #[derive(Debug)]
    struct Fixed(Vec<LabelScore>);

    #[async_trait::async_trait]
    #[allow(clippy::unnecessary_literal_bound)]
    impl ScoringBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(&self, _: &str, _: &[String]) -> crate::error::Result<Vec<LabelScore>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug)]
    struct Down;

    #[async_trait::async_trait]
    #[allow(clippy::unnecessary_literal_bound)]
    impl ScoringBackend for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn score(&self, _: &str, _: &[String]) -> crate::error::Result<Vec<LabelScore>> {
            Err(LocusError::Scoring(ScoringError::Network("refused".into())))
        }
    }

    #[tokio::test]
    async fn maps_label_to_intent() {
        let labels = IntentLabels::default();
        let backend = Fixed(scores(&[
            ("General chat", 0.2),
            ("Asking question about outlet", 0.8),
        ]));
        let classifier = IntentClassifier::new(Arc::new(backend), Arc::new(labels));
        assert_eq!(
            classifier.intent("Where is Subway Bangsar?").await.unwrap(),
            Intent::RecordQuestion
        );
    }

    #[tokio::test]
    async fn backend_failure_is_classification_unavailable() {
        let classifier = IntentClassifier::new(Arc::new(Down), Arc::new(IntentLabels::default()));
        let err = classifier.intent("hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::ClassificationUnavailable(_)));
    }

    #[tokio::test]
    async fn classification_is_deterministic() {
        let backend = Fixed(scores(&[
            ("General chat", 0.5),
            ("Asking question about outlet", 0.5),
        ]));
        let classifier =
            IntentClassifier::new(Arc::new(backend), Arc::new(IntentLabels::default()));
        let first = classifier.intent("hi").await.unwrap();
        for _ in 0..10 {
            assert_eq!(classifier.intent("hi").await.unwrap(), first);
        }
        assert_eq!(first, Intent::ConversationalChat);
    }
}
