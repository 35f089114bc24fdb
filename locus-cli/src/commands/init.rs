use std::path::Path;

use anyhow::Context;
use clap::Args;

use locus_core::config::LocusConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &InitArgs, config_path: &Path) -> anyhow::Result<()> {
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists. Pass --force to overwrite it.",
            config_path.display()
        );
    }

    let text = LocusConfig::default()
        .to_toml()
        .context("Cannot serialize default config")?;
    std::fs::write(config_path, text)
        .with_context(|| format!("Cannot write config: {}", config_path.display()))?;

    println!("Wrote default config to {}", config_path.display());
    Ok(())
}
