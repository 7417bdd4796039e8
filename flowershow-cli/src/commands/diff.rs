//! `flowershow diff <path>`: unified diff of the published copy against the vault.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{load_config, runtime, store_publisher, vault_root};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Vault-relative path to diff.
    pub path: String,

    /// Vault directory; defaults to the working directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let vault = vault_root(self.vault.as_deref())?;
        let publisher = store_publisher(config, &vault)?;
        let diff = runtime()?
            .block_on(publisher.diff_file(&self.path))
            .with_context(|| format!("diff failed for '{}'", self.path))?;

        let Some(diff) = diff else {
            println!("No differences for '{}'.", self.path);
            return Ok(());
        };
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
