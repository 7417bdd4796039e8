//! Subcommands and the plumbing they share: configuration loading, vault
//! location, backend construction and the async runtime.

pub mod check;
pub mod config;
pub mod diff;
pub mod note;
pub mod publish;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use flowershow_core::{config as core_config, BackendConfig, PublishConfig, PublishResult};
use flowershow_sync::{
    ContentStore, FsVault, GithubRepository, ObjectStore, ProgressSink, PublishError, Publisher,
};

/// Environment variable that overrides the stored access token.
pub const TOKEN_ENV: &str = "FLOWERSHOW_TOKEN";

/// Load `~/.flowershow/config.yaml` and apply the token override.
pub fn load_config() -> Result<PublishConfig> {
    let home = home_dir()?;
    let mut config = core_config::load_at(&home)
        .context("failed to load config; run `flowershow config init` first")?;
    apply_token_env(&mut config, std::env::var(TOKEN_ENV).ok());
    Ok(config)
}

fn apply_token_env(config: &mut PublishConfig, token: Option<String>) {
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        tracing::debug!("using access token from {TOKEN_ENV}");
        config.token = token;
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// The vault root: `--vault` if given, else the working directory.
pub fn vault_root(vault: Option<&Path>) -> Result<PathBuf> {
    let root = match vault {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("cannot read the working directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("cannot resolve vault path '{}'", root.display()))
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// A content store for whichever backend the config names.
pub fn content_store(config: &PublishConfig) -> Result<Arc<dyn ContentStore>> {
    let store: Arc<dyn ContentStore> = match config.backend {
        BackendConfig::Github { .. } => Arc::new(GithubRepository::new(config)?),
        BackendConfig::ObjectStore { .. } => Arc::new(ObjectStore::new(config)?),
    };
    Ok(store)
}

/// A publisher over any content store; enough for everything but batch publish.
pub fn store_publisher(config: PublishConfig, vault: &Path) -> Result<Publisher<dyn ContentStore>> {
    let store = content_store(&config)?;
    Ok(Publisher::new(config, store, Arc::new(FsVault::new(vault)))?)
}

/// Prints one line per finished file operation.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_start(&self, publishes: usize, deletes: usize) {
        println!("Publishing {publishes} file(s), deleting {deletes}");
    }

    fn on_publish(&self, done: usize, total: usize, path: &str) {
        println!("  ✎  [{done}/{total}] {path}");
    }

    fn on_delete(&self, done: usize, total: usize, path: &str) {
        println!("  ✗  [{done}/{total}] {path}");
    }

    fn on_complete(&self, result: &PublishResult) {
        println!(
            "{} pull request #{} from '{}'",
            "✓".green().bold(),
            result.pr_number,
            result.branch
        );
    }

    fn on_error(&self, error: &PublishError) {
        eprintln!("{} {error}", "✗".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_env_overrides_stored_token() {
        let mut config = PublishConfig {
            token: "stored".to_string(),
            ..Default::default()
        };
        apply_token_env(&mut config, Some("from-env".to_string()));
        assert_eq!(config.token, "from-env");
    }

    #[test]
    fn blank_token_env_is_ignored() {
        let mut config = PublishConfig {
            token: "stored".to_string(),
            ..Default::default()
        };
        apply_token_env(&mut config, Some("  ".to_string()));
        apply_token_env(&mut config, None);
        assert_eq!(config.token, "stored");
    }
}
