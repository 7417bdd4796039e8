//! `flowershow check`: verify the configuration and remote access.

use anyhow::{Context, Result};
use clap::Args;

use flowershow_core::BackendConfig;

use super::{load_config, runtime, store_publisher, vault_root};

#[derive(Args, Debug)]
pub struct CheckArgs {}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        config.validate().context("invalid configuration")?;
        let target = match &config.backend {
            BackendConfig::Github { api_url } => {
                format!("{}/{} on {api_url}", config.owner, config.repo)
            }
            BackendConfig::ObjectStore { url } => url.clone(),
        };
        let branch = config.branch.clone();

        let vault = vault_root(None)?;
        let publisher = store_publisher(config, &vault)?;
        let entries = runtime()?
            .block_on(publisher.check_connection())
            .with_context(|| format!("cannot reach {target}"))?;
        println!("✓ Connected to {target}");
        println!("  '{branch}' holds {entries} file(s)");
        Ok(())
    }
}
