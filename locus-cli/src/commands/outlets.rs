use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

#[derive(Args, Debug)]
pub struct OutletsArgs {
    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Database path (overrides [store].path)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: OutletsArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let db_path = super::resolve_db_path(&config, args.db);
    let store = super::open_store(&db_path)?;

    let outlets = store
        .list_outlets()
        .await
        .context("Failed to read outlets from database")?;

    match args.format.as_str() {
        "json" => {
            let body = serde_json::json!({ "data": outlets });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        "text" => {
            if outlets.is_empty() {
                println!("No outlets in {}", db_path.display());
                return Ok(());
            }
            for outlet in &outlets {
                println!("{}", outlet.outlet_name);
                println!("  {}", outlet.address);
                println!("  {}", outlet.opening_hours);
            }
            println!();
            println!("{} outlets", outlets.len());
        }
        other => anyhow::bail!("Unknown format: {other}. Supported: text, json"),
    }
    Ok(())
}
