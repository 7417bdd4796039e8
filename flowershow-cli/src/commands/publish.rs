//! `flowershow publish`: publish every new, changed and deleted file.
//!
//! Repository backends go through a working branch and a pull request. The
//! object store has neither and is written directly.
//!
//! When a batch stops part way its checkpoint is saved to
//! `~/.flowershow/checkpoint.json`; `--resume` continues it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use flowershow_core::{config as core_config, BackendConfig, Batch, MergeOutcome, PublishConfig};
use flowershow_sync::{
    BatchCheckpoint, FsVault, GithubRepository, PublishError, Publisher, WriteOutcome,
};

use super::{home_dir, load_config, runtime, store_publisher, vault_root, ConsoleProgress};

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Vault directory; defaults to the working directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,

    /// Working branch name; a numeric suffix is added if it is taken.
    #[arg(long)]
    pub branch: Option<String>,

    /// Skip deleting remote files that are gone from the vault.
    #[arg(long)]
    pub keep_deleted: bool,

    /// Continue the last batch that stopped part way.
    #[arg(long, conflicts_with = "branch")]
    pub resume: bool,

    /// Show what would be published without touching the remote.
    #[arg(long)]
    pub dry_run: bool,
}

impl PublishArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let vault = vault_root(self.vault.as_deref())?;
        let rt = runtime()?;

        let status = {
            let publisher = store_publisher(config.clone(), &vault)?;
            rt.block_on(publisher.get_publish_status())
                .context("failed to compute publish status")?
        };
        let mut batch = status.to_batch();
        if self.keep_deleted {
            batch.files_to_delete.clear();
        }
        if let Some(hint) = self.branch.clone() {
            batch = batch.with_branch_hint(hint);
        }

        if batch.is_empty() {
            println!("✓ Nothing to publish; '{}' is up to date", config.branch);
            return Ok(());
        }
        if status.remote_truncated && !self.keep_deleted {
            println!(
                "{} remote listing truncated; no deletions will be made",
                "!".yellow().bold()
            );
        }
        if self.dry_run {
            print_plan(&batch);
            return Ok(());
        }

        if let BackendConfig::Github { .. } = config.backend {
            let home = home_dir()?;
            return rt.block_on(self.publish_batch(config, &vault, &batch, &home));
        }

        if self.resume {
            bail!("--resume only applies to repository backends");
        }
        let publisher = store_publisher(config, &vault)?;
        let report = rt
            .block_on(publisher.publish_direct(&batch, &ConsoleProgress))
            .context("direct publish failed")?;
        println!("✓ {} commit(s)", report.committed());
        Ok(())
    }

    async fn publish_batch(
        &self,
        config: PublishConfig,
        vault: &Path,
        batch: &Batch,
        home: &Path,
    ) -> Result<()> {
        let repo = Arc::new(GithubRepository::new(&config)?);
        let publisher = Publisher::new(config, repo, Arc::new(FsVault::new(vault)))?;

        let outcome = if self.resume {
            let checkpoint = load_checkpoint(home)?;
            println!(
                "Resuming on '{}' after {} operation(s)",
                checkpoint.branch,
                checkpoint.completed()
            );
            publisher
                .resume_batch(batch, checkpoint, &ConsoleProgress)
                .await
        } else {
            publisher.publish_batch(batch, &ConsoleProgress).await
        };

        let result = match outcome {
            Ok(result) => {
                clear_checkpoint(home)?;
                result
            }
            Err(PublishError::PartialBatchFailure {
                checkpoint,
                failed_path,
                source,
            }) => {
                save_checkpoint(home, &checkpoint)?;
                bail!(
                    "stopped at '{failed_path}' on branch '{}': {source}\n\
                     Fix the problem and run 'flowershow publish --resume'.",
                    checkpoint.branch
                );
            }
            Err(err @ PublishError::StaleCheckpoint { .. }) => {
                bail!(
                    "{err}\n\
                     Run 'flowershow publish' without --resume to start a new batch."
                );
            }
            Err(err) => return Err(err.into()),
        };

        println!("  {}", result.pr_url);
        match result.merge {
            MergeOutcome::NotRequested => println!("  auto-merge is off; review and merge it yourself"),
            MergeOutcome::Merged => println!("  {} merged", "✓".green().bold()),
            MergeOutcome::Pending => println!("  ~  will merge once checks pass"),
            MergeOutcome::Failed { reason } => {
                println!("  {} not merged: {reason}", "!".yellow().bold())
            }
        }
        Ok(())
    }
}

fn print_plan(batch: &Batch) {
    println!(
        "[dry-run] {} push(es), {} delete(s)",
        batch.files_to_publish.len(),
        batch.files_to_delete.len()
    );
    for file in &batch.files_to_publish {
        println!("  ~  {}", file.path);
    }
    for path in &batch.files_to_delete {
        println!("  ✗  {path}");
    }
}

/// Print one outcome the way `publish-note` and `unpublish` report it.
pub fn print_outcome(outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Created { path } => println!("  +  {path}"),
        WriteOutcome::Updated { path } => println!("  ✎  {path}"),
        WriteOutcome::Deleted { path } => println!("  ✗  {path}"),
        WriteOutcome::Unchanged { path } => println!("  ·  {path}"),
        WriteOutcome::Absent { path } => println!("  ·  {path} (not published)"),
    }
}

pub fn checkpoint_path_at(home: &Path) -> PathBuf {
    core_config::config_dir_at(home).join("checkpoint.json")
}

/// Save atomically next to the config: write `checkpoint.json.tmp`, then
/// rename.
fn save_checkpoint(home: &Path, checkpoint: &BatchCheckpoint) -> Result<()> {
    let dir = core_config::config_dir_at(home);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = checkpoint_path_at(home);
    let tmp_path = path.with_file_name("checkpoint.json.tmp");
    let json = serde_json::to_string_pretty(checkpoint).context("failed to serialize checkpoint")?;
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to move checkpoint into {}", path.display()))
}

fn load_checkpoint(home: &Path) -> Result<BatchCheckpoint> {
    let path = checkpoint_path_at(home);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("no saved batch at {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

fn clear_checkpoint(home: &Path) -> Result<()> {
    let path = checkpoint_path_at(home);
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}
