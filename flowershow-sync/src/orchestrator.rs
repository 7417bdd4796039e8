//! Batch publish on an isolated working branch.
//!
//! ## States
//!
//! ```text
//! Idle ─▶ BranchCreated ─▶ FilesCommitted ─▶ PullRequestOpened ─┬▶ Merged
//!                                                               ├▶ MergePending
//!                                                               └▶ MergeFailed
//! ```
//!
//! `PullRequestOpened` is terminal when auto-merge is disabled. The three
//! merge states are all reportable outcomes, not errors.
//!
//! Files are committed strictly one at a time, in input order: each commit
//! reads the blob id left by the previous one. A failure mid-batch leaves
//! the branch in place and returns a [`BatchCheckpoint`] that
//! [`PublishOrchestrator::resume`] accepts.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use flowershow_core::{Batch, Committer, HashAlgo, MergeOutcome, PublishConfig, PublishResult};
use flowershow_renderer::{BatchContext, MergeContext, MessageRenderer};

use crate::branch::{candidate, default_branch_name, sanitize_branch_name, MAX_SUFFIX};
use crate::error::PublishError;
use crate::hasher::blob_hash;
use crate::progress::ProgressSink;
use crate::remote::{PullRequestDraft, PullRequestRef, ReviewRepository};
use crate::retry::{CallClass, RetryPolicy};
use crate::writer::{FileWriter, WriteOutcome};

/// Where a batch run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    BranchCreated,
    FilesCommitted,
    PullRequestOpened,
    Merged,
    MergePending,
    MergeFailed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Idle => "idle",
            BatchState::BranchCreated => "branch-created",
            BatchState::FilesCommitted => "files-committed",
            BatchState::PullRequestOpened => "pull-request-opened",
            BatchState::Merged => "merged",
            BatchState::MergePending => "merge-pending",
            BatchState::MergeFailed => "merge-failed",
        };
        f.write_str(s)
    }
}

/// Progress of a batch on its working branch.
///
/// Serializable so a caller can persist it between a failed run and
/// [`PublishOrchestrator::resume`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub branch: String,
    /// Paths committed as create/update, in commit order.
    pub published: Vec<String>,
    /// Paths deleted, in commit order.
    pub deleted: Vec<String>,
    /// Delete requests for paths the branch did not contain.
    #[serde(default)]
    pub skipped: Vec<String>,
    /// Blob id of each published path's content, under the store's
    /// algorithm.
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl BatchCheckpoint {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    /// Operations finished so far, skipped deletes included.
    pub fn completed(&self) -> usize {
        self.published.len() + self.deleted.len() + self.skipped.len()
    }

    fn has_published(&self, path: &str) -> bool {
        self.published.iter().any(|p| p == path)
    }

    fn has_removed(&self, path: &str) -> bool {
        self.deleted.iter().chain(self.skipped.iter()).any(|p| p == path)
    }

    /// Published paths whose content in `batch` no longer matches what was
    /// committed, or that `batch` no longer contains. Sorted.
    pub fn stale_paths(&self, batch: &Batch, algo: HashAlgo) -> Vec<String> {
        let mut stale: Vec<String> = self
            .published
            .iter()
            .filter(|path| {
                let current = batch
                    .files_to_publish
                    .iter()
                    .find(|f| f.path == **path)
                    .map(|f| blob_hash(&f.content, algo));
                current.is_none() || current.as_ref() != self.hashes.get(*path)
            })
            .cloned()
            .collect();
        stale.sort();
        stale
    }
}

/// Runs one batch against a [`ReviewRepository`].
pub struct PublishOrchestrator<'a, R: ReviewRepository + ?Sized> {
    repo: &'a R,
    config: &'a PublishConfig,
    renderer: &'a MessageRenderer,
    retry: &'a RetryPolicy,
    progress: &'a dyn ProgressSink,
    committer: Committer,
    state: BatchState,
}

impl<'a, R: ReviewRepository + ?Sized> PublishOrchestrator<'a, R> {
    pub fn new(
        repo: &'a R,
        config: &'a PublishConfig,
        renderer: &'a MessageRenderer,
        retry: &'a RetryPolicy,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            repo,
            config,
            renderer,
            retry,
            progress,
            committer: config.committer(),
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    fn transition(&mut self, to: BatchState) {
        tracing::debug!("batch state {} -> {to}", self.state);
        self.state = to;
    }

    /// Publish `batch` on a fresh working branch.
    pub async fn run(&mut self, batch: &Batch) -> Result<PublishResult, PublishError> {
        let outcome = self.run_inner(batch).await;
        self.report(outcome)
    }

    /// Continue a batch that stopped part way, on its existing branch.
    ///
    /// Operations recorded in `checkpoint` are not repeated.
    pub async fn resume(
        &mut self,
        batch: &Batch,
        checkpoint: BatchCheckpoint,
    ) -> Result<PublishResult, PublishError> {
        let outcome = self.resume_inner(batch, checkpoint).await;
        self.report(outcome)
    }

    fn report(
        &self,
        outcome: Result<PublishResult, PublishError>,
    ) -> Result<PublishResult, PublishError> {
        match &outcome {
            Ok(result) => self.progress.on_complete(result),
            Err(err) => {
                tracing::error!("batch failed in state {}: {err}", self.state);
                self.progress.on_error(err);
            }
        }
        outcome
    }

    async fn run_inner(&mut self, batch: &Batch) -> Result<PublishResult, PublishError> {
        if batch.is_empty() {
            return Err(PublishError::EmptyBatch);
        }
        self.progress
            .on_start(batch.files_to_publish.len(), batch.files_to_delete.len());
        let branch = self
            .create_working_branch(batch.branch_name_hint.as_deref())
            .await?;
        self.transition(BatchState::BranchCreated);
        self.finish(batch, BatchCheckpoint::new(branch)).await
    }

    async fn resume_inner(
        &mut self,
        batch: &Batch,
        checkpoint: BatchCheckpoint,
    ) -> Result<PublishResult, PublishError> {
        if batch.is_empty() {
            return Err(PublishError::EmptyBatch);
        }
        let stale = checkpoint.stale_paths(batch, self.repo.hash_algo());
        if !stale.is_empty() {
            return Err(PublishError::StaleCheckpoint {
                branch: checkpoint.branch,
                paths: stale,
            });
        }
        let head = self
            .retry
            .run(CallClass::Read, "get branch", || {
                self.repo.branch_head(&checkpoint.branch)
            })
            .await?;
        if head.is_none() {
            return Err(PublishError::RemoteNotFound {
                operation: "resume batch",
                target: checkpoint.branch,
            });
        }
        tracing::info!(
            "resuming batch on `{}` after {} operation(s)",
            checkpoint.branch,
            checkpoint.completed()
        );
        self.progress
            .on_start(batch.files_to_publish.len(), batch.files_to_delete.len());
        self.transition(BatchState::BranchCreated);
        self.finish(batch, checkpoint).await
    }

    async fn finish(
        &mut self,
        batch: &Batch,
        mut checkpoint: BatchCheckpoint,
    ) -> Result<PublishResult, PublishError> {
        self.commit_files(batch, &mut checkpoint).await?;
        self.transition(BatchState::FilesCommitted);

        let pr = self.open_pull_request(batch, &checkpoint).await?;
        self.transition(BatchState::PullRequestOpened);
        tracing::info!("opened pull request #{} ({})", pr.number, pr.url);

        let merge = self.merge(&pr, &checkpoint).await;
        Ok(PublishResult {
            branch: checkpoint.branch,
            pr_number: pr.number,
            pr_url: pr.url,
            merged: merge == MergeOutcome::Merged,
            merge,
        })
    }

    // -- Idle → BranchCreated ------------------------------------------------

    async fn create_working_branch(&self, hint: Option<&str>) -> Result<String, PublishError> {
        let base = self.config.branch.as_str();
        let base_head = self
            .retry
            .run(CallClass::Read, "get branch", || self.repo.branch_head(base))
            .await
            .map_err(|e| PublishError::BranchCreationFailed {
                branch: base.to_string(),
                reason: "could not read the base branch".to_string(),
                source: Some(Box::new(e)),
            })?
            .ok_or_else(|| PublishError::BranchCreationFailed {
                branch: base.to_string(),
                reason: format!("base branch `{base}` does not exist"),
                source: None,
            })?;

        let stem = hint
            .and_then(sanitize_branch_name)
            .unwrap_or_else(|| default_branch_name(Utc::now()));

        for attempt in 1..=MAX_SUFFIX {
            let name = candidate(&stem, attempt);
            let taken = self
                .retry
                .run(CallClass::Read, "get branch", || self.repo.branch_head(&name))
                .await
                .map_err(|e| PublishError::BranchCreationFailed {
                    branch: name.clone(),
                    reason: "could not probe the branch name".to_string(),
                    source: Some(Box::new(e)),
                })?
                .is_some();
            if taken {
                tracing::debug!("branch `{name}` exists, trying next suffix");
                continue;
            }

            match self.create_ref(&name, &base_head).await {
                Ok(true) => {
                    tracing::info!("created branch `{name}` from `{base}`");
                    return Ok(name);
                }
                Ok(false) => {
                    tracing::warn!("branch `{name}` appeared concurrently, trying next suffix");
                }
                Err(err) => {
                    let reason = if err.is_transient() {
                        format!("the remote could not be reached ({err})")
                    } else {
                        "the remote refused the new ref".to_string()
                    };
                    return Err(PublishError::BranchCreationFailed {
                        branch: name,
                        reason,
                        source: Some(Box::new(err)),
                    });
                }
            }
        }
        Err(PublishError::BranchCreationFailed {
            branch: stem,
            reason: format!("no free branch name after {MAX_SUFFIX} attempts"),
            source: None,
        })
    }

    /// Create `name` at `base_head`, retrying a transient failure once.
    ///
    /// `Ok(false)` when someone else created the name between the existence check and
    /// the create (422).
    async fn create_ref(&self, name: &str, base_head: &str) -> Result<bool, PublishError> {
        let err = match self.repo.create_branch(name, base_head).await {
            Ok(()) => return Ok(true),
            Err(err) if err.status_code() == Some(422) => return Ok(false),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        // The ref may exist even though the reply was lost.
        if self.branch_points_at(name, base_head).await {
            tracing::info!("branch `{name}` confirmed after: {err}");
            return Ok(true);
        }
        if self.retry.attempts() < 2 {
            return Err(err);
        }
        tracing::warn!("create branch `{name}` failed, retrying once: {err}");
        self.retry.pause(self.retry.delay()).await;
        match self.repo.create_branch(name, base_head).await {
            Ok(()) => Ok(true),
            Err(err) if err.status_code() == Some(422) => {
                Ok(self.branch_points_at(name, base_head).await)
            }
            Err(err) => Err(err),
        }
    }

    async fn branch_points_at(&self, name: &str, sha: &str) -> bool {
        matches!(
            self.retry
                .run(CallClass::Read, "get branch", || self.repo.branch_head(name))
                .await,
            Ok(Some(head)) if head == sha
        )
    }

    // -- BranchCreated → FilesCommitted --------------------------------------

    async fn commit_files(
        &self,
        batch: &Batch,
        checkpoint: &mut BatchCheckpoint,
    ) -> Result<(), PublishError> {
        let writer = FileWriter::new(self.repo, self.renderer, &self.committer, self.retry);
        let branch = checkpoint.branch.clone();

        let total = batch.files_to_publish.len();
        for (i, file) in batch.files_to_publish.iter().enumerate() {
            if checkpoint.has_published(&file.path) {
                continue;
            }
            writer
                .put(file, &branch)
                .await
                .map_err(|e| partial(checkpoint, &file.path, e))?;
            checkpoint.published.push(file.path.clone());
            checkpoint.hashes.insert(
                file.path.clone(),
                blob_hash(&file.content, self.repo.hash_algo()),
            );
            self.progress.on_publish(i + 1, total, &file.path);
        }

        let total = batch.files_to_delete.len();
        for (i, path) in batch.files_to_delete.iter().enumerate() {
            if checkpoint.has_removed(path) {
                continue;
            }
            match writer
                .delete(path, &branch)
                .await
                .map_err(|e| partial(checkpoint, path, e))?
            {
                WriteOutcome::Absent { path } => checkpoint.skipped.push(path),
                other => checkpoint.deleted.push(other.path().to_string()),
            }
            self.progress.on_delete(i + 1, total, path);
        }
        Ok(())
    }

    // -- FilesCommitted → PullRequestOpened ----------------------------------

    async fn open_pull_request(
        &self,
        batch: &Batch,
        checkpoint: &BatchCheckpoint,
    ) -> Result<PullRequestRef, PublishError> {
        let pushed: Vec<&str> = batch
            .files_to_publish
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        let context = BatchContext::new(
            &checkpoint.branch,
            &self.config.branch,
            &pushed,
            &checkpoint.deleted,
        );
        let text = self.renderer.pull_request(&context)?;
        let draft = PullRequestDraft {
            title: text.title,
            body: text.body,
            head: checkpoint.branch.clone(),
            base: self.config.branch.clone(),
        };
        let failed = |source: PublishError| PublishError::PullRequestCreationFailed {
            branch: checkpoint.branch.clone(),
            source: Box::new(source),
        };
        let err = match self.repo.open_pull_request(&draft).await {
            Ok(pr) => return Ok(pr),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(failed(err)),
        };

        // A lost reply may hide a pull request that was opened.
        let existing = self
            .retry
            .run(CallClass::Read, "find pull request", || {
                self.repo.find_open_pull_request(&draft.head, &draft.base)
            })
            .await;
        if let Ok(Some(pr)) = existing {
            tracing::info!("pull request #{} confirmed after: {err}", pr.number);
            return Ok(pr);
        }
        if self.retry.attempts() < 2 {
            return Err(failed(err));
        }
        tracing::warn!("open pull request failed, retrying once: {err}");
        self.retry.pause(self.retry.delay()).await;
        self.repo.open_pull_request(&draft).await.map_err(failed)
    }

    // -- PullRequestOpened → Merged | MergePending | MergeFailed -------------

    async fn merge(&mut self, pr: &PullRequestRef, checkpoint: &BatchCheckpoint) -> MergeOutcome {
        if !self.config.auto_merge {
            return MergeOutcome::NotRequested;
        }
        let context = MergeContext {
            branch: checkpoint.branch.clone(),
            pr_number: pr.number,
            pushes: checkpoint.published.len(),
            deletes: checkpoint.deleted.len(),
        };
        let title = self
            .renderer
            .merge_commit_title(&self.config.merge_commit_message, &context)
            .unwrap_or_else(|err| {
                tracing::warn!("merge message template failed, using it verbatim: {err}");
                self.config.merge_commit_message.clone()
            });

        let immediate = match self.merge_now(pr, &title).await {
            Ok(()) => {
                tracing::info!("merged pull request #{}", pr.number);
                self.transition(BatchState::Merged);
                return MergeOutcome::Merged;
            }
            Err(err) => err,
        };
        tracing::info!(
            "immediate merge of #{} refused ({immediate}); enabling auto-merge",
            pr.number
        );
        match self.schedule_merge(pr, &title).await {
            Ok(()) => {
                self.transition(BatchState::MergePending);
                MergeOutcome::Pending
            }
            Err(err) => {
                tracing::warn!("auto-merge of #{} unavailable: {err}", pr.number);
                self.transition(BatchState::MergeFailed);
                MergeOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn merge_now(&self, pr: &PullRequestRef, title: &str) -> Result<(), PublishError> {
        let err = match self.repo.merge_pull_request(pr, title).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };
        let merged = self
            .retry
            .run(CallClass::Read, "get merge state", || self.repo.is_merged(pr))
            .await;
        if matches!(merged, Ok(true)) {
            tracing::info!("merge of #{} confirmed after: {err}", pr.number);
            return Ok(());
        }
        if self.retry.attempts() < 2 {
            return Err(err);
        }
        tracing::warn!("merge of #{} failed, retrying once: {err}", pr.number);
        self.retry.pause(self.retry.delay()).await;
        self.repo.merge_pull_request(pr, title).await
    }

    /// Enable auto-merge; a transient failure is repeated once.
    async fn schedule_merge(&self, pr: &PullRequestRef, title: &str) -> Result<(), PublishError> {
        match self.repo.enable_auto_merge(pr, title).await {
            Err(err) if err.is_transient() && self.retry.attempts() >= 2 => {
                tracing::warn!("enable auto-merge of #{} failed, retrying once: {err}", pr.number);
                self.retry.pause(self.retry.delay()).await;
                self.repo.enable_auto_merge(pr, title).await
            }
            other => other,
        }
    }
}

fn partial(checkpoint: &BatchCheckpoint, path: &str, source: PublishError) -> PublishError {
    PublishError::PartialBatchFailure {
        checkpoint: checkpoint.clone(),
        failed_path: path.to_string(),
        source: Box::new(source),
    }
}
