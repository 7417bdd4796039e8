//! Error types for flowershow-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// Failures loading or rendering commit and pull request messages.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A message template failed to parse or render.
    #[error("message template `{template}` failed: {source}")]
    Template {
        template: String,
        #[source]
        source: tera::Error,
    },

    /// The message context could not be turned into template variables.
    #[error("message context serialization error: {0}")]
    Context(#[from] serde_json::Error),

    /// An override in the user template directory could not be read.
    #[error("cannot read message template at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn template(name: impl Into<String>) -> impl FnOnce(tera::Error) -> RenderError {
        let template = name.into();
        move |source| RenderError::Template { template, source }
    }
}
