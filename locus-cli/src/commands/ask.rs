use std::path::{Path, PathBuf};

use clap::Args;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question, e.g. "What is the address of Subway Bangsar?"
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,

    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Database path (overrides [store].path)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

pub async fn run(args: AskArgs, config_path: &Path) -> anyhow::Result<()> {
    if !matches!(args.format.as_str(), "text" | "json") {
        anyhow::bail!("Unknown format: {}. Supported: text, json", args.format);
    }

    let config = super::load_config(config_path)?;
    let db_path = super::resolve_db_path(&config, args.db);
    let store = super::open_store(&db_path)?;
    let pipeline = super::build_pipeline(&config, store)?;

    let question = args.question.join(" ");
    let response = pipeline.handle(&question).await;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", response.answer.to_text());
    }
    Ok(())
}
