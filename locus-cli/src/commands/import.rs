use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use locus_core::store::sqlite::{import_outlets, parse_outlets_json};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file with outlets: an array, or {"data": [...]}
    pub file: PathBuf,

    /// Database path (overrides [store].path); created if missing
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub fn run(args: ImportArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let db_path = super::resolve_db_path(&config, args.db);

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Cannot read import file: {}", args.file.display()))?;
    let outlets = parse_outlets_json(&text)
        .with_context(|| format!("Invalid outlet JSON in {}", args.file.display()))?;

    let count = import_outlets(&db_path, &outlets)
        .with_context(|| format!("Cannot write database: {}", db_path.display()))?;

    println!("Imported {count} outlets into {}", db_path.display());
    Ok(())
}
