//! `flowershow config init|show`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use flowershow_core::{config as core_config, BackendConfig, PublishConfig};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write ~/.flowershow/config.yaml.
    Init(InitArgs),

    /// Print the current configuration with the token masked.
    Show,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Repository owner (user or organisation).
    #[arg(long)]
    pub owner: Option<String>,

    /// Repository name.
    #[arg(long)]
    pub repo: Option<String>,

    /// Access token. Can be left out and supplied via FLOWERSHOW_TOKEN.
    #[arg(long)]
    pub token: Option<String>,

    /// Base branch pull requests target.
    #[arg(long, default_value = core_config::DEFAULT_BRANCH)]
    pub branch: String,

    /// Merge each pull request right after opening it.
    #[arg(long)]
    pub auto_merge: bool,

    /// Publish to an object store at this URL instead of a repository.
    #[arg(long, value_name = "URL", conflicts_with_all = ["owner", "repo"])]
    pub object_store: Option<String>,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Init(args) => init(args),
        ConfigCommand::Show => show(),
    }
}

fn init(args: InitArgs) -> Result<()> {
    let home = home_dir()?;
    let path = core_config::config_path_at(&home);
    if path.exists() && !args.force {
        bail!(
            "config already exists at {}; pass --force to overwrite",
            path.display()
        );
    }

    let backend = match args.object_store {
        Some(url) => BackendConfig::ObjectStore { url },
        None => BackendConfig::default(),
    };
    let config = PublishConfig {
        owner: args.owner.unwrap_or_default(),
        repo: args.repo.unwrap_or_default(),
        token: args.token.unwrap_or_default(),
        branch: args.branch,
        auto_merge: args.auto_merge,
        backend,
        ..Default::default()
    };

    core_config::save_at(&home, &config)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Wrote {}", path.display());

    let mut check = config.clone();
    if check.token.is_empty() {
        check.token = std::env::var(super::TOKEN_ENV).unwrap_or_default();
    }
    if let Err(err) = check.validate() {
        println!("  ! {err}");
    }
    Ok(())
}

fn show() -> Result<()> {
    let mut config = super::load_config()?;
    config.token = config.masked_token();
    let yaml = serde_yaml::to_string(&config).context("failed to serialize config")?;
    print!("{yaml}");
    Ok(())
}
