//! Direct single-note publish and unpublish on the base branch.
//!
//! No working branch, no pull request. A published note takes its embedded
//! images along: every resolved embed is uploaded in the same call, once per
//! distinct path, and skipped when the remote already holds identical bytes.

use flowershow_core::FileRecord;

use crate::embeds::{resolve_embeds, EmbedReport};
use crate::error::PublishError;
use crate::exclude::ExcludeFilter;
use crate::remote::ContentStore;
use crate::vault::Vault;
use crate::writer::{FileWriter, WriteOutcome};

/// Outcome of [`publish_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteReport {
    pub note: WriteOutcome,
    /// One outcome per distinct uploaded asset, in first-seen order.
    pub assets: Vec<WriteOutcome>,
    /// Every embed found in the note, including skipped ones.
    pub embeds: EmbedReport,
}

/// Commit `file` to `branch`, then its embedded assets.
pub async fn publish_one<S, V>(
    writer: &FileWriter<'_, S>,
    vault: &V,
    exclude: &ExcludeFilter,
    file: &FileRecord,
    branch: &str,
) -> Result<NoteReport, PublishError>
where
    S: ContentStore + ?Sized,
    V: Vault + ?Sized,
{
    let note = writer.put(file, branch).await?;

    let embeds = match file.as_text() {
        Some(markdown) if file.path.ends_with(".md") || file.path.ends_with(".mdx") => {
            resolve_embeds(vault, markdown, &file.path)
        }
        _ => EmbedReport::default(),
    };

    let mut assets = Vec::new();
    for path in embeds.resolved_paths() {
        if path == file.path || exclude.is_excluded(path) {
            tracing::debug!("skip asset {path}");
            continue;
        }
        let asset = vault.read(path)?;
        assets.push(writer.put_if_changed(&asset, branch).await?);
    }

    tracing::info!(
        "published {} with {} asset(s) ({} embed(s) skipped)",
        file.path,
        assets.len(),
        embeds.skipped().count()
    );
    Ok(NoteReport {
        note,
        assets,
        embeds,
    })
}

/// Delete `path` from `branch`. Absent paths are not an error.
pub async fn unpublish_one<S>(
    writer: &FileWriter<'_, S>,
    path: &str,
    branch: &str,
) -> Result<WriteOutcome, PublishError>
where
    S: ContentStore + ?Sized,
{
    writer.delete(path, branch).await
}
