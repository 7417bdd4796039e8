//! # flowershow-renderer
//!
//! Tera-based rendering of the human-readable text attached to a publish:
//! per-file commit messages, the batch pull request title and body, and the
//! merge commit title.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flowershow_renderer::{BatchContext, CommitAction, MessageRenderer};
//!
//! fn describe() {
//!     if let Ok(renderer) = MessageRenderer::new(None) {
//!         let msg = renderer.commit_message(CommitAction::Add, "notes/a.md");
//!         let ctx = BatchContext::new("flowershow/publish-1", "main", &["notes/a.md"], &[] as &[&str]);
//!         if let (Ok(msg), Ok(pr)) = (msg, renderer.pull_request(&ctx)) {
//!             println!("{msg}\n{}\n{}", pr.title, pr.body);
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{BatchContext, CommitAction, CommitContext, MergeContext};
pub use engine::{MessageRenderer, PullRequestText};
pub use error::RenderError;
