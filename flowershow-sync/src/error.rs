//! Error types for flowershow-sync.

use std::path::PathBuf;

use thiserror::Error;

use flowershow_core::ConfigError;
use flowershow_renderer::RenderError;

use crate::orchestrator::BatchCheckpoint;

/// All errors that can arise from diffing and publishing.
///
/// Remote variants carry the operation that failed and its target (a path,
/// branch or pull request) so callers can render an actionable message.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing owner/repo/token/branch or a malformed field; raised before any
    /// remote call.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// Transport failure or timeout.
    #[error("{operation} `{target}`: remote unavailable: {reason}")]
    RemoteUnavailable {
        operation: &'static str,
        target: String,
        reason: String,
    },

    /// Repository, branch or path absent where it must exist (404).
    #[error("{operation} `{target}`: not found (404)")]
    RemoteNotFound {
        operation: &'static str,
        target: String,
    },

    /// The token was rejected (401).
    #[error("{operation} `{target}`: authentication failed (401); check the access token")]
    RemoteAuthFailed {
        operation: &'static str,
        target: String,
    },

    /// Connected, but the token lacks permission (403).
    #[error("{operation} `{target}`: access denied (403); the token lacks permission")]
    RemoteAccessDenied {
        operation: &'static str,
        target: String,
    },

    /// Any other non-success response.
    #[error("{operation} `{target}`: rejected with status {status}: {message}")]
    RemoteRejected {
        operation: &'static str,
        target: String,
        status: u16,
        message: String,
    },

    /// The remote answered with a payload we could not interpret.
    #[error("{operation} `{target}`: unexpected response: {reason}")]
    Decode {
        operation: &'static str,
        target: String,
        reason: String,
    },

    /// Base branch missing or the working branch ref was refused. Nothing
    /// was committed.
    #[error("could not create branch `{branch}`: {reason}")]
    BranchCreationFailed {
        branch: String,
        reason: String,
        #[source]
        source: Option<Box<PublishError>>,
    },

    /// Every file was committed but the pull request was refused.
    #[error("could not open pull request from `{branch}`: {source}")]
    PullRequestCreationFailed {
        branch: String,
        #[source]
        source: Box<PublishError>,
    },

    /// Some files were committed to the working branch, then one failed.
    /// The branch is left in place; `checkpoint` lets the caller resume.
    #[error(
        "batch stopped at `{failed_path}` on branch `{}` after {} committed operation(s): {source}",
        checkpoint.branch,
        checkpoint.completed()
    )]
    PartialBatchFailure {
        checkpoint: BatchCheckpoint,
        failed_path: String,
        #[source]
        source: Box<PublishError>,
    },

    /// Files a stopped batch already committed have changed in the vault;
    /// resuming would leave the old content on the branch.
    #[error(
        "cannot resume on branch `{branch}`: committed file(s) changed since: {}",
        paths.join(", ")
    )]
    StaleCheckpoint { branch: String, paths: Vec<String> },

    /// A batch with nothing to publish or delete.
    #[error("batch is empty: nothing to publish or delete")]
    EmptyBatch,

    /// Reading a file from the local vault failed.
    #[error("vault I/O error at {path}: {source}")]
    Vault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path was requested that the vault does not contain.
    #[error("`{path}` is not in the vault")]
    NotInVault { path: String },

    /// Commit or pull request text could not be rendered.
    #[error("message rendering failed: {0}")]
    Render(#[from] RenderError),
}

impl PublishError {
    /// `true` for failures worth retrying: transport errors, rate limiting
    /// and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            PublishError::RemoteUnavailable { .. } => true,
            PublishError::RemoteRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// HTTP status behind a remote failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PublishError::RemoteNotFound { .. } => Some(404),
            PublishError::RemoteAuthFailed { .. } => Some(401),
            PublishError::RemoteAccessDenied { .. } => Some(403),
            PublishError::RemoteRejected { status, .. } => Some(*status),
            PublishError::BranchCreationFailed {
                source: Some(source),
                ..
            } => source.status_code(),
            PublishError::PullRequestCreationFailed { source, .. }
            | PublishError::PartialBatchFailure { source, .. } => source.status_code(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PublishError::RemoteNotFound { .. })
    }
}

/// Convenience constructor for [`PublishError::Vault`].
pub(crate) fn vault_err(path: impl Into<PathBuf>, source: std::io::Error) -> PublishError {
    PublishError::Vault {
        path: path.into(),
        source,
    }
}

/// Map an HTTP failure status onto the error taxonomy.
pub(crate) fn classify_status(
    operation: &'static str,
    target: impl Into<String>,
    status: u16,
    message: impl Into<String>,
) -> PublishError {
    let target = target.into();
    match status {
        401 => PublishError::RemoteAuthFailed { operation, target },
        403 => PublishError::RemoteAccessDenied { operation, target },
        404 => PublishError::RemoteNotFound { operation, target },
        _ => PublishError::RemoteRejected {
            operation,
            target,
            status,
            message: message.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status("get branch", "main", 401, ""),
            PublishError::RemoteAuthFailed { .. }
        ));
        assert!(matches!(
            classify_status("get branch", "main", 403, ""),
            PublishError::RemoteAccessDenied { .. }
        ));
        assert!(matches!(
            classify_status("get branch", "main", 404, ""),
            PublishError::RemoteNotFound { .. }
        ));
        let other = classify_status("create ref", "b", 422, "Reference already exists");
        assert_eq!(other.status_code(), Some(422));
        assert!(other.to_string().contains("Reference already exists"));
    }

    #[test]
    fn transient_errors() {
        let unavailable = PublishError::RemoteUnavailable {
            operation: "read tree",
            target: "main".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(unavailable.is_transient());
        assert!(classify_status("x", "y", 502, "").is_transient());
        assert!(classify_status("x", "y", 429, "").is_transient());
        assert!(!classify_status("x", "y", 404, "").is_transient());
        assert!(!classify_status("x", "y", 422, "").is_transient());
    }

    #[test]
    fn messages_name_operation_and_target() {
        let err = classify_status("put file", "notes/a.md", 403, "");
        let msg = err.to_string();
        assert!(msg.contains("put file"));
        assert!(msg.contains("notes/a.md"));
        assert!(msg.contains("403"));
    }

    #[test]
    fn wrapped_errors_expose_inner_status() {
        let err = PublishError::PullRequestCreationFailed {
            branch: "b".to_string(),
            source: Box::new(classify_status("open pull request", "b", 422, "no commits")),
        };
        assert_eq!(err.status_code(), Some(422));
    }
}
