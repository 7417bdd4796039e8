//! Caller-facing entry point.
//!
//! A [`Publisher`] is built once from a validated configuration snapshot, a
//! remote and a vault. Nothing it holds changes afterwards; reconfiguring
//! means building a new one.
//!
//! | Operation              | Needs              |
//! |------------------------|--------------------|
//! | `get_publish_status`   | [`ContentStore`]   |
//! | `publish_one`          | [`ContentStore`]   |
//! | `unpublish_one`        | [`ContentStore`]   |
//! | `publish_direct`       | [`ContentStore`]   |
//! | `diff_file`            | [`ContentStore`]   |
//! | `check_connection`     | [`ContentStore`]   |
//! | `publish_batch`        | [`ReviewRepository`] |
//! | `resume_batch`         | [`ReviewRepository`] |

use std::sync::Arc;

use flowershow_core::{normalize_path, Batch, Committer, FileRecord, PublishConfig, PublishResult, PublishStatus};
use flowershow_renderer::MessageRenderer;

use crate::diff::diff;
use crate::error::PublishError;
use crate::exclude::ExcludeFilter;
use crate::orchestrator::{BatchCheckpoint, PublishOrchestrator};
use crate::progress::ProgressSink;
use crate::reader::RemoteStateReader;
use crate::remote::{ContentStore, ReviewRepository};
use crate::retry::{CallClass, RetryPolicy};
use crate::single::{self, NoteReport};
use crate::text_diff::{diff_contents, FileDiff};
use crate::vault::Vault;
use crate::writer::{FileWriter, WriteOutcome};

/// Outcome of [`Publisher::publish_direct`], in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectReport {
    pub outcomes: Vec<WriteOutcome>,
}

impl DirectReport {
    /// Operations that changed the remote.
    pub fn committed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, WriteOutcome::Absent { .. } | WriteOutcome::Unchanged { .. }))
            .count()
    }
}

/// Publish operations over one remote and one vault.
pub struct Publisher<R: ?Sized> {
    config: PublishConfig,
    repo: Arc<R>,
    vault: Arc<dyn Vault>,
    renderer: MessageRenderer,
    retry: RetryPolicy,
    exclude: ExcludeFilter,
    committer: Committer,
}

impl<R: ContentStore + ?Sized> Publisher<R> {
    /// Validate `config` and load message templates. No remote call is made.
    pub fn new(
        config: PublishConfig,
        repo: Arc<R>,
        vault: Arc<dyn Vault>,
    ) -> Result<Self, PublishError> {
        config.validate()?;
        let renderer = MessageRenderer::new(config.template_dir.as_deref())?;
        let exclude = ExcludeFilter::from_config(&config)?;
        Ok(Self {
            retry: RetryPolicy::from_config(&config.retry),
            committer: config.committer(),
            config,
            repo,
            vault,
            renderer,
            exclude,
        })
    }

    /// Replace the retry policy built from the configuration.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    fn writer(&self) -> FileWriter<'_, R> {
        FileWriter::new(&*self.repo, &self.renderer, &self.committer, &self.retry)
    }

    /// Every non-excluded vault file, read in full.
    pub fn local_files(&self) -> Result<Vec<FileRecord>, PublishError> {
        self.vault
            .list_paths()?
            .into_iter()
            .filter(|path| !self.exclude.is_excluded(path))
            .map(|path| self.vault.read(&path))
            .collect()
    }

    /// Diff the vault against a fresh listing of the base branch.
    ///
    /// Fails as a whole if the listing or any local read fails; no file is
    /// guessed into a category.
    pub async fn get_publish_status(&self) -> Result<PublishStatus, PublishError> {
        let local = self.local_files()?;
        let remote = RemoteStateReader::new(&*self.repo, &self.config.branch, &self.retry)
            .with_exclude(&self.exclude)
            .read_tree()
            .await?;
        Ok(diff(local, &remote))
    }

    /// Commit one note and its embedded images straight to the base branch.
    pub async fn publish_one(&self, file: &FileRecord) -> Result<NoteReport, PublishError> {
        single::publish_one(
            &self.writer(),
            &*self.vault,
            &self.exclude,
            file,
            &self.config.branch,
        )
        .await
    }

    /// Read `path` from the vault and publish it with [`publish_one`](Self::publish_one).
    pub async fn publish_path(&self, path: &str) -> Result<NoteReport, PublishError> {
        let file = self.vault.read(path)?;
        self.publish_one(&file).await
    }

    /// Delete one path straight from the base branch.
    pub async fn unpublish_one(&self, path: &str) -> Result<WriteOutcome, PublishError> {
        single::unpublish_one(&self.writer(), &normalize_path(path), &self.config.branch).await
    }

    /// Apply a batch straight to the base branch, one commit per file.
    ///
    /// For stores without branches or pull requests. Stops at the first
    /// failure; earlier commits stay.
    pub async fn publish_direct(
        &self,
        batch: &Batch,
        progress: &dyn ProgressSink,
    ) -> Result<DirectReport, PublishError> {
        if batch.is_empty() {
            return Err(PublishError::EmptyBatch);
        }
        let result = self.publish_direct_inner(batch, progress).await;
        if let Err(err) = &result {
            progress.on_error(err);
        }
        result
    }

    async fn publish_direct_inner(
        &self,
        batch: &Batch,
        progress: &dyn ProgressSink,
    ) -> Result<DirectReport, PublishError> {
        let writer = self.writer();
        let branch = self.config.branch.as_str();
        let mut report = DirectReport::default();
        progress.on_start(batch.files_to_publish.len(), batch.files_to_delete.len());

        let total = batch.files_to_publish.len();
        for (i, file) in batch.files_to_publish.iter().enumerate() {
            report.outcomes.push(writer.put(file, branch).await?);
            progress.on_publish(i + 1, total, &file.path);
        }
        let total = batch.files_to_delete.len();
        for (i, path) in batch.files_to_delete.iter().enumerate() {
            report.outcomes.push(writer.delete(path, branch).await?);
            progress.on_delete(i + 1, total, path);
        }
        tracing::info!(
            "direct publish to {}: {} commit(s)",
            self.repo.backend(),
            report.committed()
        );
        Ok(report)
    }

    /// Unified diff of the published copy of `path` against the vault copy.
    ///
    /// `None` if they are identical.
    pub async fn diff_file(&self, path: &str) -> Result<Option<FileDiff>, PublishError> {
        let path = normalize_path(path);
        let local = self.vault.read(&path)?;
        let remote = self
            .retry
            .run(CallClass::Read, "get file", || {
                self.repo.read_file(&path, &self.config.branch)
            })
            .await?;
        Ok(diff_contents(&path, remote.as_deref(), &local.content))
    }

    /// Read the base branch once; returns how many entries it holds.
    ///
    /// Surfaces authentication, permission and missing-repository problems
    /// before anything is published.
    pub async fn check_connection(&self) -> Result<usize, PublishError> {
        let state = RemoteStateReader::new(&*self.repo, &self.config.branch, &self.retry)
            .read_tree()
            .await?;
        tracing::info!(
            "connected to {} `{}`: {} entries",
            self.repo.backend(),
            self.config.branch,
            state.len()
        );
        Ok(state.len())
    }
}

impl<R: ReviewRepository + ?Sized> Publisher<R> {
    /// Publish `batch` through a working branch and a pull request.
    pub async fn publish_batch(
        &self,
        batch: &Batch,
        progress: &dyn ProgressSink,
    ) -> Result<PublishResult, PublishError> {
        PublishOrchestrator::new(&*self.repo, &self.config, &self.renderer, &self.retry, progress)
            .run(batch)
            .await
    }

    /// Continue `batch` from the checkpoint of a failed [`publish_batch`](Self::publish_batch).
    pub async fn resume_batch(
        &self,
        batch: &Batch,
        checkpoint: BatchCheckpoint,
        progress: &dyn ProgressSink,
    ) -> Result<PublishResult, PublishError> {
        PublishOrchestrator::new(&*self.repo, &self.config, &self.renderer, &self.retry, progress)
            .resume(batch, checkpoint)
            .await
    }
}
