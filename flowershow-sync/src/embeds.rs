//! Embedded image extraction from markdown notes.
//!
//! Two syntaxes are recognised:
//!
//! ```text
//! ![[img/cat.png]]        ![[img/cat.png|alt text]]     wiki embed
//! ![alt](img/cat%20a.png)                               markdown image
//! ```
//!
//! Every embed yields an [`EmbedOutcome`]; nothing is dropped silently.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::vault::Vault;

const IMAGE_EXTENSIONS: &str = "png|webp|jpg|jpeg|gif|bmp|svg";

fn wiki_embed() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"!\[\[(.*?\.(?:{IMAGE_EXTENSIONS}))(?:\|(?:.*?))?\]\]"
        ))
        .ok()
    })
    .as_ref()
}

fn markdown_image() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"!\[.*?\]\((.*?\.(?:{IMAGE_EXTENSIONS}))\)")).ok())
        .as_ref()
}

/// Which syntax an embed was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedSyntax {
    Wiki,
    Markdown,
}

/// One embed as written in the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedLink {
    pub syntax: EmbedSyntax,
    /// Link target after percent-decoding (markdown) or as written (wiki).
    pub target: String,
}

/// Why an embed was not turned into an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Points at an external URL.
    External,
    /// No vault file matches the link.
    Unresolved,
    /// Another embed in the same note already resolved to this path.
    Duplicate,
}

/// Result for one embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedOutcome {
    Resolved { link: EmbedLink, path: String },
    Skipped { link: EmbedLink, reason: SkipReason },
}

/// Every embed of one note, in document order (wiki embeds first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    pub outcomes: Vec<EmbedOutcome>,
}

impl EmbedReport {
    /// Distinct vault paths to upload, in first-seen order.
    pub fn resolved_paths(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                EmbedOutcome::Resolved { path, .. } => Some(path.as_str()),
                EmbedOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&EmbedLink, &SkipReason)> {
        self.outcomes.iter().filter_map(|o| match o {
            EmbedOutcome::Skipped { link, reason } => Some((link, reason)),
            EmbedOutcome::Resolved { .. } => None,
        })
    }
}

/// All image embeds in `markdown`, wiki embeds first.
pub fn extract_embeds(markdown: &str) -> Vec<EmbedLink> {
    let mut links = Vec::new();
    if let Some(re) = wiki_embed() {
        links.extend(re.captures_iter(markdown).filter_map(|c| {
            Some(EmbedLink {
                syntax: EmbedSyntax::Wiki,
                target: c.get(1)?.as_str().trim().to_string(),
            })
        }));
    }
    if let Some(re) = markdown_image() {
        links.extend(re.captures_iter(markdown).filter_map(|c| {
            let raw = c.get(1)?.as_str().trim();
            let target = urlencoding::decode(raw)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            Some(EmbedLink {
                syntax: EmbedSyntax::Markdown,
                target,
            })
        }));
    }
    links
}

/// Resolve every embed of the note at `from` against `vault`.
pub fn resolve_embeds<V: Vault + ?Sized>(vault: &V, markdown: &str, from: &str) -> EmbedReport {
    let mut seen = HashSet::new();
    let outcomes = extract_embeds(markdown)
        .into_iter()
        .map(|link| {
            let lower = link.target.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                return EmbedOutcome::Skipped {
                    link,
                    reason: SkipReason::External,
                };
            }
            match vault.resolve_link(&link.target, from) {
                Some(path) if seen.insert(path.clone()) => EmbedOutcome::Resolved { link, path },
                Some(_) => EmbedOutcome::Skipped {
                    link,
                    reason: SkipReason::Duplicate,
                },
                None => {
                    tracing::warn!("{from}: embedded `{}` not found in vault", link.target);
                    EmbedOutcome::Skipped {
                        link,
                        reason: SkipReason::Unresolved,
                    }
                }
            }
        })
        .collect();
    EmbedReport { outcomes }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::vault::FsVault;

    #[test]
    fn patterns_compile() {
        assert!(wiki_embed().is_some());
        assert!(markdown_image().is_some());
    }

    #[test]
    fn extracts_both_syntaxes() {
        let md = "Intro ![[cat.png|a cat]] and ![[dog.jpeg]]\n![logo](assets/my%20logo.svg) ![[notes.md]]";
        let links = extract_embeds(md);
        let targets: Vec<_> = links.iter().map(|l| (l.syntax, l.target.as_str())).collect();
        assert_eq!(
            targets,
            vec![
                (EmbedSyntax::Wiki, "cat.png"),
                (EmbedSyntax::Wiki, "dog.jpeg"),
                (EmbedSyntax::Markdown, "assets/my logo.svg"),
            ]
        );
    }

    #[test]
    fn non_image_links_are_ignored() {
        assert!(extract_embeds("[[page]] ![[doc.pdf]] [x](y.png)").is_empty());
    }

    #[test]
    fn resolution_reports_every_embed() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("img")).expect("mkdir");
        fs::write(dir.path().join("img/cat.png"), b"png").expect("write");
        let vault = FsVault::new(dir.path());

        let md = "![[cat.png]] ![](img/cat.png) ![](https://example.com/x.png) ![[ghost.gif]]";
        let report = resolve_embeds(&vault, md, "note.md");
        assert_eq!(report.resolved_paths(), vec!["img/cat.png"]);
        let reasons: Vec<_> = report.skipped().map(|(_, r)| r.clone()).collect();
        assert_eq!(
            reasons,
            vec![SkipReason::Unresolved, SkipReason::Duplicate, SkipReason::External]
        );
    }
}
