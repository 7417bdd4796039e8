//! Serializable rendering payloads.

use std::fmt;

use serde::Serialize;
use tera::Context;

use crate::error::RenderError;

/// What a single-file commit does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitAction {
    Add,
    Update,
    Delete,
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitAction::Add => write!(f, "add"),
            CommitAction::Update => write!(f, "update"),
            CommitAction::Delete => write!(f, "delete"),
        }
    }
}

/// Payload for `commit.tera`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitContext {
    pub action: CommitAction,
    pub path: String,
}

/// Payload for `pr_title.tera` and `pr_body.tera`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchContext {
    pub branch: String,
    pub base: String,
    pub pushes: usize,
    pub deletes: usize,
    pub pushed: Vec<String>,
    pub deleted: Vec<String>,
}

impl BatchContext {
    pub fn new<P: AsRef<str>, D: AsRef<str>>(
        branch: &str,
        base: &str,
        pushed: &[P],
        deleted: &[D],
    ) -> Self {
        Self {
            branch: branch.to_string(),
            base: base.to_string(),
            pushes: pushed.len(),
            deletes: deleted.len(),
            pushed: pushed.iter().map(|p| p.as_ref().to_string()).collect(),
            deleted: deleted.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }
}

/// Payload for the user-configured merge commit title.
#[derive(Debug, Clone, Serialize)]
pub struct MergeContext {
    pub branch: String,
    pub pr_number: u64,
    pub pushes: usize,
    pub deletes: usize,
}

pub(crate) fn to_tera<T: Serialize>(value: &T) -> Result<Context, RenderError> {
    Context::from_value(serde_json::to_value(value)?).map_err(RenderError::template("context"))
}
