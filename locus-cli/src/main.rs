use std::path::PathBuf;

use clap::Parser;
use locus_core::error::LocusError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "locus",
    version,
    about = "Ask natural-language questions about Subway outlets"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Path to the config file (missing file means defaults)
    #[arg(long, global = true, env = "LOCUS_CONFIG", default_value = "locus.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0  success
///   1  general/unknown error
///   2  configuration error
///   4  database error
///   6  LLM or scoring backend error
///   9  HTTP server error
///
/// A core error anywhere in the chain decides the code by its variant.
/// Message text is only consulted for errors raised in this binary.
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core) = err.chain().find_map(|e| e.downcast_ref::<LocusError>()) {
        return match core {
            LocusError::Config(_) => 2,
            LocusError::Store(_) => 4,
            LocusError::Llm(_) | LocusError::Scoring(_) => 6,
            LocusError::Pipeline(_) => 1,
        };
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") || lower.contains("environment variable") {
        2 // config error
    } else if lower.contains("database")
        || lower.contains("sqlite")
        || lower.contains("cannot open store")
    {
        4 // database error
    } else if lower.contains("llm") || lower.contains("scoring") || lower.contains("provider") {
        6 // backend error
    } else if lower.contains("server") || lower.contains("bind") {
        9 // server error
    } else {
        1 // general error
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, &cli.config)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Context;
    use locus_core::error::{ConfigError, LlmError, StoreError};

    fn wrapped(err: LocusError, context: &'static str) -> anyhow::Error {
        Err::<(), _>(err).context(context).unwrap_err()
    }

    #[test]
    fn exit_code_config() {
        let err = wrapped(
            ConfigError::Parse("expected `]` at line 1: [llm".into()).into(),
            "Cannot load config: locus.toml",
        );
        assert_eq!(classify_exit_code(&err), 2);
        let err = wrapped(
            ConfigError::Invalid("environment variable HF_TOKEN is not set".into()).into(),
            "Cannot wire question pipeline",
        );
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_database() {
        let err = wrapped(
            StoreError::NotFound("x.db".into()).into(),
            "Cannot open store: x.db",
        );
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_backend_even_when_message_mentions_configuration() {
        let err = wrapped(
            LlmError::Config("Unknown provider: bogus".into()).into(),
            "Cannot wire question pipeline",
        );
        assert!(format!("{err:#}").contains("Configuration error"));
        assert_eq!(classify_exit_code(&err), 6);
    }

    #[test]
    fn exit_code_from_message_without_core_error() {
        let err = anyhow::anyhow!("Cannot load config: locus.toml: bad toml");
        assert_eq!(classify_exit_code(&err), 2);
        let err = anyhow::anyhow!("Cannot bind 127.0.0.1:8000: address in use");
        assert_eq!(classify_exit_code(&err), 9);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
