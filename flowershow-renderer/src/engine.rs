//! Tera rendering engine: [`MessageRenderer`].
//!
//! # Templates
//!
//! | Name             | Used for                              |
//! |------------------|---------------------------------------|
//! | `commit.tera`    | one commit per published/deleted file |
//! | `pr_title.tera`  | batch pull request title              |
//! | `pr_body.tera`   | batch pull request body               |
//!
//! Any `.tera` file with the same name in the user template directory
//! replaces the embedded default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::context::{to_tera, BatchContext, CommitAction, CommitContext, MergeContext};
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const COMMIT: &str = "commit.tera";
const PR_TITLE: &str = "pr_title.tera";
const PR_BODY: &str = "pr_body.tera";

const TPLS: &[(&str, &str)] = &[
    (COMMIT, include_str!("templates/commit.tera")),
    (PR_TITLE, include_str!("templates/pr_title.tera")),
    (PR_BODY, include_str!("templates/pr_body.tera")),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    let mut templates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("tera") || !path.is_file() {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((normalize_template_name(rel), contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())
        .map_err(RenderError::template("templates"))?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// MessageRenderer
// ---------------------------------------------------------------------------

/// Rendered pull request text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestText {
    pub title: String,
    pub body: String,
}

/// Renders every message the publish pipeline sends to the remote.
///
/// Create once per configuration snapshot and reuse.
pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    /// Load embedded templates plus any overrides in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(MessageRenderer {
            tera: build_tera(user_template_dir)?,
        })
    }

    /// Single-line commit message for one file operation.
    pub fn commit_message(&self, action: CommitAction, path: &str) -> Result<String, RenderError> {
        let ctx = to_tera(&CommitContext {
            action,
            path: path.to_string(),
        })?;
        Ok(self.render(COMMIT, &ctx)?.trim().to_string())
    }

    /// Title and body for a batch pull request.
    pub fn pull_request(&self, batch: &BatchContext) -> Result<PullRequestText, RenderError> {
        let ctx = to_tera(batch)?;
        Ok(PullRequestText {
            title: self.render(PR_TITLE, &ctx)?.trim().to_string(),
            body: self.render(PR_BODY, &ctx)?,
        })
    }

    /// Render the configured merge commit title (itself a Tera template).
    pub fn merge_commit_title(
        &self,
        template: &str,
        merge: &MergeContext,
    ) -> Result<String, RenderError> {
        let ctx = to_tera(merge)?;
        let title = Tera::one_off(template, &ctx, false)
            .map_err(RenderError::template("merge_commit_message"))?;
        Ok(title.trim().to_string())
    }

    fn render(&self, name: &str, ctx: &tera::Context) -> Result<String, RenderError> {
        self.tera.render(name, ctx).map_err(RenderError::template(name))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_messages_name_action_and_path() {
        let r = MessageRenderer::new(None).unwrap();
        assert_eq!(r.commit_message(CommitAction::Add, "a.md").unwrap(), "Add a.md");
        assert_eq!(
            r.commit_message(CommitAction::Update, "dir/b.md").unwrap(),
            "Update dir/b.md"
        );
        assert_eq!(
            r.commit_message(CommitAction::Delete, "c.md").unwrap(),
            "Delete c.md"
        );
    }

    #[test]
    fn merge_title_is_a_template() {
        let r = MessageRenderer::new(None).unwrap();
        let merge = MergeContext {
            branch: "flowershow/publish-1".to_string(),
            pr_number: 7,
            pushes: 2,
            deletes: 1,
        };
        assert_eq!(
            r.merge_commit_title("Merge content updates", &merge).unwrap(),
            "Merge content updates"
        );
        assert_eq!(
            r.merge_commit_title("Merge #{{ pr_number }} ({{ pushes }}+{{ deletes }})", &merge)
                .unwrap(),
            "Merge #7 (2+1)"
        );
    }

    #[test]
    fn broken_merge_template_is_an_error() {
        let r = MessageRenderer::new(None).unwrap();
        let merge = MergeContext {
            branch: "b".to_string(),
            pr_number: 1,
            pushes: 0,
            deletes: 0,
        };
        let err = r.merge_commit_title("{{ unclosed", &merge).unwrap_err();
        assert!(err.to_string().contains("merge_commit_message"), "got: {err}");
    }
}
