// Pipeline orchestrator: classify, then converse or synthesize and execute,
// then shape. Every failure ends the run in `Failed` with a user-visible
// answer; `handle` itself never errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::classify::scorers::{LlmScorer, ZeroShotScorer};
use crate::classify::{Intent, IntentClassifier, IntentLabels, ScoringBackend};
use crate::config::{LocusConfig, ScoringKind, resolve_api_key};
use crate::error::PipelineError;
use crate::execute::QueryExecutor;
use crate::llm::LlmProvider;
use crate::llm::providers::create_provider;
use crate::shape::{Answer, RawResult, Response, Stage, failure, shape};
use crate::store::RecordStore;
use crate::synthesize::QuerySynthesizer;

/// Per-run limits shared by every question.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Deadline for each classification, synthesis, or reply call.
    pub backend_timeout: Duration,
    /// Extra synthesis attempts after a `SynthesisFailed`; at most 1.
    pub synthesis_retries: u32,
    /// Sampling temperature for conversational replies.
    pub temperature: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(60),
            synthesis_retries: 0,
            temperature: 0.0,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn with_synthesis_retries(mut self, retries: u32) -> Self {
        self.synthesis_retries = retries.min(1);
        self
    }

    #[must_use]
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }
}

/// Stage log for one run.
struct Run {
    stages: Vec<Stage>,
    intent: Option<Intent>,
}

impl Run {
    fn start() -> Self {
        Self {
            stages: vec![Stage::Received],
            intent: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(?stage, "Pipeline transition");
        self.stages.push(stage);
    }

    fn finish(mut self, question: &str, answer: Answer) -> Response {
        self.enter(Stage::Done);
        Response {
            question: question.to_string(),
            intent: self.intent,
            answer,
            stages: self.stages,
        }
    }

    fn fail(mut self, question: &str, err: &PipelineError) -> Response {
        warn!(kind = err.kind(), error = %err, "Question handling failed");
        self.enter(Stage::Failed);
        Response {
            question: question.to_string(),
            intent: self.intent,
            answer: failure(err),
            stages: self.stages,
        }
    }
}

/// Routes each question to a conversational reply or a record lookup.
///
/// Holds only immutable parts, so one instance serves concurrent runs.
#[derive(Debug)]
pub struct Pipeline {
    classifier: IntentClassifier,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    generator: Arc<dyn LlmProvider>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        classifier: IntentClassifier,
        synthesizer: QuerySynthesizer,
        executor: QueryExecutor,
        generator: Arc<dyn LlmProvider>,
        settings: PipelineSettings,
    ) -> Self {
        let settings = PipelineSettings {
            synthesis_retries: settings.synthesis_retries.min(1),
            ..settings
        };
        Self {
            classifier,
            synthesizer,
            executor,
            generator,
            settings,
        }
    }

    /// Wire providers, scorer, and executor from configuration.
    pub fn from_config(
        config: &LocusConfig,
        store: Arc<dyn RecordStore>,
    ) -> crate::error::Result<Self> {
        config.validate()?;

        let llm_key = resolve_api_key(config.llm.api_key_env.as_deref())?;
        let generator: Arc<dyn LlmProvider> = Arc::from(create_provider(
            &config.llm.provider,
            &config.llm.model,
            &llm_key,
            config.llm.base_url.as_deref(),
        )?);

        let scorer: Arc<dyn ScoringBackend> = match config.scoring.backend {
            ScoringKind::ZeroShot => {
                let key = resolve_api_key(config.scoring.api_key_env.as_deref())?;
                Arc::new(ZeroShotScorer::new(
                    key,
                    config.scoring.model.clone(),
                    config.scoring.base_url.clone(),
                ))
            }
            ScoringKind::Llm => Arc::new(LlmScorer::new(Arc::clone(&generator))),
        };

        info!(
            provider = generator.name(),
            model = generator.model_id(),
            scorer = scorer.name(),
            "Pipeline configured"
        );

        let classifier =
            IntentClassifier::new(scorer, Arc::new(IntentLabels::from(&config.intents)));
        let synthesizer = QuerySynthesizer::new(
            Arc::clone(&generator),
            Arc::new(config.schema.clone()),
            config.llm.temperature,
        );
        let executor = QueryExecutor::new(store, config.pipeline.store_timeout());
        let settings = PipelineSettings {
            backend_timeout: config.pipeline.backend_timeout(),
            synthesis_retries: config.pipeline.synthesis_retries,
            temperature: config.llm.temperature,
        };

        Ok(Self::new(
            classifier,
            synthesizer,
            executor,
            generator,
            settings,
        ))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.executor.store()
    }

    /// Answer one question. Never fails; failures become `Answer::Failure`.
    #[instrument(skip_all, fields(question_len = question.len()))]
    pub async fn handle(&self, question: &str) -> Response {
        let mut run = Run::start();

        if question.trim().is_empty() {
            return run.fail(question, &PipelineError::EmptyQuestion);
        }

        run.enter(Stage::Classifying);
        let intent = match self
            .bounded("intent classification", self.classifier.intent(question))
            .await
        {
            Ok(intent) => intent,
            Err(e) => return run.fail(question, &e),
        };
        run.intent = Some(intent);

        let raw = match intent {
            Intent::ConversationalChat => {
                run.enter(Stage::ConversingPath);
                self.converse(question).await
            }
            Intent::RecordQuestion => {
                run.enter(Stage::QueryingPath);
                self.look_up(question).await
            }
        };

        match raw {
            Ok(raw) => {
                run.enter(Stage::Shaping);
                let answer = shape(intent, raw);
                info!(?intent, "Question answered");
                run.finish(question, answer)
            }
            Err(e) => run.fail(question, &e),
        }
    }

    async fn converse(&self, question: &str) -> Result<RawResult, PipelineError> {
        let call = async {
            let (reply, usage) = self
                .generator
                .call(question, self.settings.temperature)
                .await
                .map_err(|e| PipelineError::ConversationFailed(e.to_string()))?;
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Conversational reply received"
            );
            Ok::<_, PipelineError>(RawResult::Reply(reply))
        };
        self.bounded("conversational reply", call).await
    }

    async fn look_up(&self, question: &str) -> Result<RawResult, PipelineError> {
        let query = self.synthesize_with_retry(question).await?;
        let rows = self.executor.execute(&query).await?;
        debug!(rows = rows.len(), "Record lookup finished");
        Ok(RawResult::Rows(rows))
    }

    async fn synthesize_with_retry(&self, question: &str) -> Result<String, PipelineError> {
        let mut retries_left = self.settings.synthesis_retries;
        loop {
            match self
                .bounded("query synthesis", self.synthesizer.synthesize(question))
                .await
            {
                Err(PipelineError::SynthesisFailed(reason)) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(%reason, "Synthesis failed, retrying once");
                }
                other => return other,
            }
        }
    }

    async fn bounded<T>(
        &self,
        stage: &str,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(self.settings.backend_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::BackendTimeout {
                    stage: stage.to_string(),
                })
            })
    }
}
