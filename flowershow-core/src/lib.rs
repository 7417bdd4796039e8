//! Flowershow core library: domain types, publish configuration, errors.
//!
//! Public API surface:
//! - [`types`]: file records, remote state, publish status and batch types
//! - [`error`]: [`ConfigError`]
//! - [`config`]: [`PublishConfig`] load / save / validate

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendConfig, PublishConfig, RetryConfig};
pub use error::ConfigError;
pub use types::{
    normalize_path, Batch, Committer, FileKind, FileRecord, HashAlgo, MergeOutcome, PathHash,
    PublishResult, PublishStatus, RemoteState,
};
