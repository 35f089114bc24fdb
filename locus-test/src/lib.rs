// Stub backends and store fixtures for Locus integration tests.
//
// The stubs are deterministic and cheap to clone; clones share their call
// logs so a test can hand one copy to the pipeline and inspect another.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use locus_core::classify::{IntentClassifier, IntentLabels, LabelScore, ScoringBackend};
use locus_core::error::{LlmError, ScoringError};
use locus_core::execute::QueryExecutor;
use locus_core::llm::{LlmProvider, TokenUsage};
use locus_core::pipeline::{Pipeline, PipelineSettings};
use locus_core::schema::SchemaDescription;
use locus_core::store::sqlite::{SqliteRecordStore, create_database, import_outlets};
use locus_core::store::{Outlet, RecordStore, Row};
use locus_core::synthesize::QuerySynthesizer;

/// Marker that only query-synthesis prompts contain.
const SYNTHESIS_MARKER: &str = "Table name:";

// ── Generation stub ─────────────────────────────────────────────────

type Reply = Result<String, String>;

/// Scripted text-generation backend.
///
/// Synthesis prompts get the queued SQL replies in order, then the
/// fallback; every other prompt gets the chat reply.
#[derive(Debug, Clone)]
pub struct StubGenerator {
    chat_reply: Reply,
    sql_queue: Arc<Mutex<VecDeque<Reply>>>,
    sql_fallback: Reply,
    delay: Option<Duration>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl StubGenerator {
    /// Chat prompts get `reply`; synthesis fails.
    pub fn replying(reply: &str) -> Self {
        Self {
            chat_reply: Ok(reply.to_string()),
            sql_queue: Arc::default(),
            sql_fallback: Err("no query scripted".to_string()),
            delay: None,
            prompts: Arc::default(),
        }
    }

    /// Synthesis prompts always get `sql`.
    pub fn writing_sql(sql: &str) -> Self {
        Self {
            sql_fallback: Ok(sql.to_string()),
            ..Self::replying("Hello!")
        }
    }

    /// Every call fails with a network error.
    pub fn failing() -> Self {
        Self {
            chat_reply: Err("connection refused".to_string()),
            ..Self::replying("")
        }
    }

    /// Queue one synthesis reply ahead of the fallback.
    #[must_use]
    pub fn then_sql(self, reply: &str) -> Self {
        self.sql_queue
            .lock()
            .unwrap()
            .push_back(Ok(reply.to_string()));
        self
    }

    /// Sleep before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Calls that carried a query-synthesis prompt.
    pub fn synthesis_calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(SYNTHESIS_MARKER))
            .count()
    }
}

#[async_trait::async_trait]
impl LlmProvider for StubGenerator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model_id(&self) -> &'static str {
        "stub-model"
    }

    async fn call(
        &self,
        prompt: &str,
        _temperature: f64,
    ) -> locus_core::error::Result<(String, TokenUsage)> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = if prompt.contains(SYNTHESIS_MARKER) {
            let queued = self.sql_queue.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| self.sql_fallback.clone())
        } else {
            self.chat_reply.clone()
        };

        match reply {
            Ok(text) => Ok((text, TokenUsage::default())),
            Err(msg) => Err(LlmError::Network(msg).into()),
        }
    }
}

// ── Scoring stub ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ScorerMode {
    /// Always favor the label at this index.
    Fixed(usize),
    /// Favor the second (record) label when any keyword appears.
    Keywords(Vec<&'static str>),
    /// Score every label the same.
    Tied,
    /// Fail every call.
    Down,
}

/// Deterministic scoring backend over an ordered `[chat, record]` label set.
#[derive(Debug, Clone)]
pub struct StubScorer {
    mode: ScorerMode,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StubScorer {
    fn with_mode(mode: ScorerMode) -> Self {
        Self {
            mode,
            delay: None,
            calls: Arc::default(),
        }
    }

    pub fn always_chat() -> Self {
        Self::with_mode(ScorerMode::Fixed(0))
    }

    pub fn always_record() -> Self {
        Self::with_mode(ScorerMode::Fixed(1))
    }

    /// Record label for questions naming an outlet or asking for an address,
    /// opening times, or a deletion. Anything else scores as chat.
    pub fn keyword_routed() -> Self {
        Self::with_mode(ScorerMode::Keywords(vec![
            "outlet", "address", "open", "subway", "delete",
        ]))
    }

    pub fn tied() -> Self {
        Self::with_mode(ScorerMode::Tied)
    }

    pub fn down() -> Self {
        Self::with_mode(ScorerMode::Down)
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ScoringBackend for StubScorer {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn score(
        &self,
        text: &str,
        labels: &[String],
    ) -> locus_core::error::Result<Vec<LabelScore>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let winner = match &self.mode {
            ScorerMode::Down => {
                return Err(ScoringError::Network("scoring endpoint unreachable".into()).into());
            }
            ScorerMode::Tied => None,
            ScorerMode::Fixed(i) => Some(*i),
            ScorerMode::Keywords(words) => {
                let lower = text.to_lowercase();
                Some(usize::from(words.iter().any(|w| lower.contains(w))))
            }
        };

        Ok(labels
            .iter()
            .enumerate()
            .map(|(i, label)| LabelScore {
                label: label.clone(),
                score: match winner {
                    None => 0.5,
                    Some(w) if w == i => 0.9,
                    Some(_) => 0.1,
                },
            })
            .collect())
    }
}

// ── Store fixture ───────────────────────────────────────────────────

/// A `RecordStore` that counts the queries it forwards.
#[derive(Debug)]
pub struct CountingStore {
    inner: SqliteRecordStore,
    queries: AtomicUsize,
}

#[async_trait::async_trait]
impl RecordStore for CountingStore {
    async fn query(&self, sql: &str) -> locus_core::error::Result<Vec<Row>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql).await
    }

    async fn list_outlets(&self) -> locus_core::error::Result<Vec<Outlet>> {
        self.inner.list_outlets().await
    }
}

/// A temporary on-disk outlet database.
#[derive(Debug)]
pub struct FixtureStore {
    pub dir: tempfile::TempDir,
    path: PathBuf,
    store: Arc<CountingStore>,
    outlets: Vec<Outlet>,
}

impl FixtureStore {
    /// A database seeded with [`sample_outlets`].
    pub fn new() -> Self {
        Self::with_outlets(sample_outlets())
    }

    pub fn with_outlets(outlets: Vec<Outlet>) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = dir.path().join("subway_store.db");
        create_database(&path).expect("create database");
        import_outlets(&path, &outlets).expect("seed outlets");
        let inner = SqliteRecordStore::open(&path).expect("open store");
        Self {
            dir,
            path,
            store: Arc::new(CountingStore {
                inner,
                queries: AtomicUsize::new(0),
            }),
            outlets,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store) as Arc<dyn RecordStore>
    }

    /// The records the database was seeded with, in insertion order.
    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    /// Queries that reached the store.
    pub fn queries(&self) -> usize {
        self.store.queries.load(Ordering::SeqCst)
    }

    /// Connections currently open against the database.
    pub fn open_handles(&self) -> usize {
        self.store.inner.open_handles()
    }
}

impl Default for FixtureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn outlet(name: &str, address: &str, hours: &str, lat: f64, lng: f64) -> Outlet {
    Outlet {
        outlet_name: name.to_string(),
        address: address.to_string(),
        opening_hours: hours.to_string(),
        waze_link: Some(format!("https://waze.com/ul?ll={lat},{lng}")),
        gmaps_link: Some(format!("https://maps.google.com/?q={lat},{lng}")),
        latitude: Some(lat),
        longitude: Some(lng),
    }
}

/// Five Kuala Lumpur outlets; three close after 9 PM.
pub fn sample_outlets() -> Vec<Outlet> {
    vec![
        outlet(
            "Subway Bangsar",
            "12, Jalan Telawi 2, Bangsar Baru, 59100 Kuala Lumpur",
            "Monday - Sunday, 8:00 AM - 10:00 PM",
            3.1322,
            101.6710,
        ),
        outlet(
            "Outlet X",
            "No. 5, Jalan Telawi 3, Bangsar Baru, 59100 Kuala Lumpur",
            "Monday - Sunday, 8:00 AM - 9:00 PM",
            3.1318,
            101.6705,
        ),
        outlet(
            "Subway KLCC",
            "Lot C-12, Suria KLCC, Jalan Ampang, 50088 Kuala Lumpur",
            "Monday - Sunday, 10:00 AM - 10:00 PM",
            3.1579,
            101.7123,
        ),
        outlet(
            "Subway Mid Valley",
            "LG-074, Mid Valley Megamall, Lingkaran Syed Putra, 59200 Kuala Lumpur",
            "Monday - Sunday, 10:00 AM - 11:00 PM",
            3.1176,
            101.6773,
        ),
        outlet(
            "Subway Menara UOA Bangsar",
            "Jalan Bangsar Utama 1, Unit 1-2-G, Menara UOA Bangsar, 59000 Kuala Lumpur",
            "Monday - Friday, 8:00 AM - 8:00 PM",
            3.1286,
            101.6790,
        ),
    ]
}

// ── Pipeline assembly ───────────────────────────────────────────────

/// Timeouts short enough for tests that expect them to fire.
pub fn test_settings() -> PipelineSettings {
    PipelineSettings::default().with_backend_timeout(Duration::from_secs(5))
}

pub fn pipeline_with(
    scorer: StubScorer,
    generator: StubGenerator,
    store: Arc<dyn RecordStore>,
) -> Pipeline {
    pipeline_with_settings(scorer, generator, store, test_settings())
}

pub fn pipeline_with_settings(
    scorer: StubScorer,
    generator: StubGenerator,
    store: Arc<dyn RecordStore>,
    settings: PipelineSettings,
) -> Pipeline {
    let generator: Arc<dyn LlmProvider> = Arc::new(generator);
    let classifier = IntentClassifier::new(Arc::new(scorer), Arc::new(IntentLabels::default()));
    let synthesizer = QuerySynthesizer::new(
        Arc::clone(&generator),
        Arc::new(SchemaDescription::outlets()),
        0.0,
    );
    let executor = QueryExecutor::new(store, Duration::from_secs(5));
    Pipeline::new(classifier, synthesizer, executor, generator, settings)
}
