//! Publish configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.flowershow/
//!   config.yaml   (mode 0600: holds the access token)
//!   templates/    (optional .tera overrides for commit/PR messages)
//! ```
//!
//! # API pattern
//!
//! Same as the rest of the workspace: every function touching disk has an
//! `_at(home: &Path, …)` form used by tests, plus a no-arg wrapper that
//! derives `home` from `dirs::home_dir()`.
//!
//! The publish core never mutates a [`PublishConfig`]; callers hand it a
//! validated snapshot at construction time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::Committer;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_MERGE_MESSAGE: &str = "Merge content updates";
pub const DEFAULT_EXCLUDE: &str = r"\.excalidraw(\.(md|excalidraw))?$";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which remote the vault is published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Git-hosting REST + GraphQL API.
    Github {
        #[serde(default = "default_api_url")]
        api_url: String,
    },
    /// Object storage worker reachable over plain HTTP.
    ObjectStore { url: String },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Github {
            api_url: default_api_url(),
        }
    }
}

/// Retry policy knobs for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts for a retryable call (1 = no retry).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

/// Read-only configuration snapshot consumed by the publish core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Repository owner (user or organisation).
    #[serde(default)]
    pub owner: String,
    /// Repository name.
    #[serde(default)]
    pub repo: String,
    /// Access token. Empty means "take it from the environment".
    #[serde(default)]
    pub token: String,
    /// Base branch that pull requests target.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Merge pull requests right after opening them.
    #[serde(default)]
    pub auto_merge: bool,
    /// Tera template for the merge commit title.
    #[serde(default = "default_merge_message")]
    pub merge_commit_message: String,
    /// Regexes; matching paths never enter the diff.
    #[serde(default = "default_excludes")]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Commit author display name; defaults to `owner`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_name: Option<String>,
    /// Directory of `.tera` overrides for commit and pull request messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            token: String::new(),
            branch: default_branch(),
            auto_merge: false,
            merge_commit_message: default_merge_message(),
            exclude_patterns: default_excludes(),
            backend: BackendConfig::default(),
            request_timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
            committer_name: None,
            template_dir: None,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}
fn default_merge_message() -> String {
    DEFAULT_MERGE_MESSAGE.to_string()
}
fn default_excludes() -> Vec<String> {
    vec![DEFAULT_EXCLUDE.to_string()]
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_attempts() -> u32 {
    2
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_backoff() -> f64 {
    1.0
}

impl PublishConfig {
    /// Check every field the core needs before any remote call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.backend {
            BackendConfig::Github { api_url } => {
                require("owner", &self.owner)?;
                require("repo", &self.repo)?;
                require("token", &self.token)?;
                require("branch", &self.branch)?;
                require_url("backend.api_url", api_url)?;
            }
            BackendConfig::ObjectStore { url } => {
                require_url("backend.url", url)?;
            }
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        let backoff = self.retry.backoff;
        if !backoff.is_finite() || backoff < 1.0 {
            return Err(ConfigError::Invalid {
                field: "retry.backoff",
                reason: format!("must be a finite number >= 1.0, got {backoff}"),
            });
        }
        self.exclude_regexes()?;
        Ok(())
    }

    /// Compile `exclude_patterns`.
    pub fn exclude_regexes(&self) -> Result<Vec<Regex>, ConfigError> {
        self.exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::Invalid {
                    field: "exclude_patterns",
                    reason: format!("`{p}`: {e}"),
                })
            })
            .collect()
    }

    /// Commit identity: configured display name (or owner) + no-reply email.
    pub fn committer(&self) -> Committer {
        let name = self
            .committer_name
            .clone()
            .unwrap_or_else(|| self.owner.clone());
        Committer::for_account(name, &self.owner)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{tail}", "*".repeat(chars.len() - 4))
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn require_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    require(field, value)?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("expected an http(s) URL, got `{value}`"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `<home>/.flowershow/`
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".flowershow")
}

/// `<home>/.flowershow/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

/// `<home>/.flowershow/templates/`
pub fn template_dir_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("templates")
}

/// Load the config from `<home>/.flowershow/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
/// path + line context) if malformed. Does not validate.
pub fn load_at(home: &Path) -> Result<PublishConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<PublishConfig, ConfigError> {
    load_at(&home()?)
}

/// Save atomically: write `config.yaml.tmp` (mode 0600), then rename.
pub fn save_at(home: &Path, config: &PublishConfig) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &PublishConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
