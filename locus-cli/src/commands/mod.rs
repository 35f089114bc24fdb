pub mod ask;
pub mod import;
pub mod init;
pub mod outlets;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use locus_core::config::LocusConfig;
use locus_core::pipeline::Pipeline;
use locus_core::store::RecordStore;
use locus_core::store::sqlite::SqliteRecordStore;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask one question and print the answer
    Ask(ask::AskArgs),
    /// List every outlet in the store
    Outlets(outlets::OutletsArgs),
    /// Load outlets from a JSON file into the store
    Import(import::ImportArgs),
    /// Write a default config file
    Init(init::InitArgs),
    /// Start the HTTP chat server
    Serve(serve::ServeArgs),
}

pub async fn run(cmd: Command, config_path: &Path) -> anyhow::Result<()> {
    match cmd {
        Command::Ask(args) => ask::run(args, config_path).await,
        Command::Outlets(args) => outlets::run(args, config_path).await,
        Command::Import(args) => import::run(args, config_path),
        Command::Init(args) => init::run(&args, config_path),
        Command::Serve(args) => serve::run(args, config_path).await,
    }
}

pub(crate) fn load_config(path: &Path) -> anyhow::Result<LocusConfig> {
    LocusConfig::load_or_default(path)
        .with_context(|| format!("Cannot load config: {}", path.display()))
}

/// Database path: the `--db` override if given, else the configured one.
pub(crate) fn resolve_db_path(config: &LocusConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| config.store.path.clone())
}

pub(crate) fn open_store(path: &Path) -> anyhow::Result<Arc<dyn RecordStore>> {
    let store = SqliteRecordStore::open(path)
        .with_context(|| format!("Cannot open store: {}", path.display()))?;
    Ok(Arc::new(store))
}

pub(crate) fn build_pipeline(
    config: &LocusConfig,
    store: Arc<dyn RecordStore>,
) -> anyhow::Result<Pipeline> {
    Pipeline::from_config(config, store).context("Cannot wire question pipeline")
}
