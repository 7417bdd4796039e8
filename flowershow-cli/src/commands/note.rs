//! `flowershow publish-note <path>` and `flowershow unpublish <path>`
//!
//! Single-file operations straight on the base branch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flowershow_sync::{EmbedOutcome, SkipReason};

use super::publish::print_outcome;
use super::{load_config, runtime, store_publisher, vault_root};

#[derive(Args, Debug)]
pub struct PublishNoteArgs {
    /// Vault-relative path of the note.
    pub path: String,

    /// Vault directory; defaults to the working directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,
}

impl PublishNoteArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let vault = vault_root(self.vault.as_deref())?;
        let branch = config.branch.clone();
        let publisher = store_publisher(config, &vault)?;
        let report = runtime()?
            .block_on(publisher.publish_path(&self.path))
            .with_context(|| format!("failed to publish '{}'", self.path))?;

        println!("✓ Published to '{branch}'");
        print_outcome(&report.note);
        for asset in &report.assets {
            print_outcome(asset);
        }
        for outcome in &report.embeds.outcomes {
            if let EmbedOutcome::Skipped { link, reason } = outcome {
                let why = match reason {
                    SkipReason::External => "external",
                    SkipReason::Unresolved => "not in vault",
                    SkipReason::Duplicate => continue,
                };
                println!("  ?  {} ({why})", link.target);
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UnpublishArgs {
    /// Remote path to delete.
    pub path: String,

    /// Vault directory; defaults to the working directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,
}

impl UnpublishArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let vault = vault_root(self.vault.as_deref())?;
        let publisher = store_publisher(config, &vault)?;
        let outcome = runtime()?
            .block_on(publisher.unpublish_one(&self.path))
            .with_context(|| format!("failed to unpublish '{}'", self.path))?;
        print_outcome(&outcome);
        Ok(())
    }
}
