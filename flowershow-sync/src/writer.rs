//! Single-file remote writes.
//!
//! ## `put` protocol
//!
//! 1. Read the path's current blob id on the target branch (retried read).
//! 2. Hash the content under the store's algorithm.
//! 3. Create (no id) or update (with id) in one commit.
//! 4. On a transient failure, re-read the blob id:
//!    - equal to the content hash → the write landed, report success;
//!    - otherwise, if the policy allows more than one attempt, repeat the
//!      write once with the refreshed id.
//!
//! `delete` follows the same shape; an absent path is skipped, not an error.

use flowershow_core::{Committer, FileRecord};
use flowershow_renderer::{CommitAction, MessageRenderer};

use crate::error::PublishError;
use crate::hasher::blob_hash;
use crate::remote::{ContentStore, DeleteFile, PutFile};
use crate::retry::{CallClass, RetryPolicy};

/// Outcome of one file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created { path: String },
    Updated { path: String },
    Deleted { path: String },
    /// Remote already holds identical content; nothing was committed.
    Unchanged { path: String },
    /// Delete requested for a path the branch does not contain.
    Absent { path: String },
}

impl WriteOutcome {
    pub fn path(&self) -> &str {
        match self {
            WriteOutcome::Created { path }
            | WriteOutcome::Updated { path }
            | WriteOutcome::Deleted { path }
            | WriteOutcome::Unchanged { path }
            | WriteOutcome::Absent { path } => path,
        }
    }
}

/// Commits single files to one store with one identity.
pub struct FileWriter<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    renderer: &'a MessageRenderer,
    committer: &'a Committer,
    retry: &'a RetryPolicy,
}

impl<'a, S: ContentStore + ?Sized> FileWriter<'a, S> {
    pub fn new(
        store: &'a S,
        renderer: &'a MessageRenderer,
        committer: &'a Committer,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            store,
            renderer,
            committer,
            retry,
        }
    }

    async fn current_sha(&self, path: &str, branch: &str) -> Result<Option<String>, PublishError> {
        self.retry
            .run(CallClass::Read, "get file", || self.store.file_sha(path, branch))
            .await
    }

    /// Create or update `file` on `branch`, always committing.
    pub async fn put(&self, file: &FileRecord, branch: &str) -> Result<WriteOutcome, PublishError> {
        self.write(file, branch, false).await
    }

    /// Like [`put`](Self::put), but skip the commit when the remote blob
    /// already matches the content hash.
    pub async fn put_if_changed(
        &self,
        file: &FileRecord,
        branch: &str,
    ) -> Result<WriteOutcome, PublishError> {
        self.write(file, branch, true).await
    }

    async fn write(
        &self,
        file: &FileRecord,
        branch: &str,
        skip_unchanged: bool,
    ) -> Result<WriteOutcome, PublishError> {
        let path = file.path.as_str();
        let existing = self.current_sha(path, branch).await?;
        let content_hash = blob_hash(&file.content, self.store.hash_algo());
        if skip_unchanged
            && existing
                .as_deref()
                .is_some_and(|sha| sha.eq_ignore_ascii_case(&content_hash))
        {
            tracing::debug!("unchanged: {path}");
            return Ok(WriteOutcome::Unchanged {
                path: path.to_string(),
            });
        }
        let (action, outcome) = match existing {
            Some(_) => (
                CommitAction::Update,
                WriteOutcome::Updated {
                    path: path.to_string(),
                },
            ),
            None => (
                CommitAction::Add,
                WriteOutcome::Created {
                    path: path.to_string(),
                },
            ),
        };
        let message = self.renderer.commit_message(action, path)?;

        let mut request = PutFile {
            path,
            content: &file.content,
            content_hash: &content_hash,
            message: &message,
            branch,
            sha: existing.as_deref(),
            committer: self.committer,
        };
        let err = match self
            .retry
            .run(CallClass::Write, "put file", || self.store.put_file(&request))
            .await
        {
            Ok(()) => {
                tracing::info!("{} {path} on `{branch}`", action);
                return Ok(outcome);
            }
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        // The write may have landed before the connection dropped.
        let refreshed = self.current_sha(path, branch).await?;
        if refreshed
            .as_deref()
            .is_some_and(|sha| sha.eq_ignore_ascii_case(&content_hash))
        {
            tracing::info!("{action} {path} on `{branch}` (confirmed after: {err})");
            return Ok(outcome);
        }
        if self.retry.attempts() < 2 {
            return Err(err);
        }
        tracing::warn!("put {path} failed, retrying once: {err}");
        self.retry.pause(self.retry.delay()).await;
        request.sha = refreshed.as_deref();
        self.store.put_file(&request).await?;
        tracing::info!("{action} {path} on `{branch}`");
        Ok(outcome)
    }

    /// Delete `path` from `branch`; `Absent` if it is not there.
    pub async fn delete(&self, path: &str, branch: &str) -> Result<WriteOutcome, PublishError> {
        let Some(sha) = self.current_sha(path, branch).await? else {
            tracing::debug!("skip delete of absent {path} on `{branch}`");
            return Ok(WriteOutcome::Absent {
                path: path.to_string(),
            });
        };
        let message = self.renderer.commit_message(CommitAction::Delete, path)?;
        let deleted = WriteOutcome::Deleted {
            path: path.to_string(),
        };

        let request = DeleteFile {
            path,
            sha: &sha,
            message: &message,
            branch,
            committer: self.committer,
        };
        let err = match self
            .retry
            .run(CallClass::Write, "delete file", || self.store.delete_file(&request))
            .await
        {
            Ok(()) => {
                tracing::info!("Delete {path} on `{branch}`");
                return Ok(deleted);
            }
            Err(err) if err.is_transient() => err,
            Err(err) => return Err(err),
        };

        let Some(refreshed) = self.current_sha(path, branch).await? else {
            tracing::info!("Delete {path} on `{branch}` (confirmed after: {err})");
            return Ok(deleted);
        };
        if self.retry.attempts() < 2 {
            return Err(err);
        }
        tracing::warn!("delete {path} failed, retrying once: {err}");
        self.retry.pause(self.retry.delay()).await;
        self.store
            .delete_file(&DeleteFile {
                sha: &refreshed,
                ..request
            })
            .await?;
        tracing::info!("Delete {path} on `{branch}`");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::{MemoryRepository, RemoteCall};

    struct Fixture {
        repo: MemoryRepository,
        renderer: MessageRenderer,
        committer: Committer,
        retry: RetryPolicy,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                repo: MemoryRepository::new("main"),
                renderer: MessageRenderer::new(None).expect("renderer"),
                committer: Committer::for_account("ada", "ada"),
                retry: RetryPolicy::new(2, Duration::ZERO, 1.0),
            }
        }

        fn writer(&self) -> FileWriter<'_, MemoryRepository> {
            FileWriter::new(&self.repo, &self.renderer, &self.committer, &self.retry)
        }

        fn puts(&self) -> usize {
            self.repo
                .calls()
                .iter()
                .filter(|c| matches!(c, RemoteCall::PutFile { .. }))
                .count()
        }
    }

    #[tokio::test]
    async fn create_then_update() {
        let fx = Fixture::new();
        let w = fx.writer();
        let out = w.put(&FileRecord::text("a.md", "one"), "main").await.expect("create");
        assert!(matches!(out, WriteOutcome::Created { .. }));
        let out = w.put(&FileRecord::text("a.md", "two"), "main").await.expect("update");
        assert!(matches!(out, WriteOutcome::Updated { .. }));
        assert_eq!(fx.repo.file("main", "a.md").as_deref(), Some(b"two".as_slice()));

        let messages: Vec<_> = fx
            .repo
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::PutFile { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(messages, vec!["Add a.md", "Update a.md"]);
    }

    #[tokio::test]
    async fn landed_write_is_not_repeated() {
        let fx = Fixture::new();
        fx.repo.lose_put_reply("a.md");
        let out = fx
            .writer()
            .put(&FileRecord::text("a.md", "x"), "main")
            .await
            .expect("confirmed");
        assert!(matches!(out, WriteOutcome::Created { .. }));
        assert_eq!(fx.puts(), 1);
    }

    #[tokio::test]
    async fn failed_write_is_retried_once() {
        let fx = Fixture::new();
        fx.repo.fail_next("put_file", 1);
        fx.writer()
            .put(&FileRecord::text("a.md", "x"), "main")
            .await
            .expect("second attempt");
        assert_eq!(fx.puts(), 2);
    }

    #[tokio::test]
    async fn repeated_write_failure_propagates() {
        let fx = Fixture::new();
        fx.repo.fail_next("put_file", 2);
        let err = fx
            .writer()
            .put(&FileRecord::text("a.md", "x"), "main")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(fx.puts(), 2);
    }

    #[tokio::test]
    async fn permanent_write_failure_is_not_retried() {
        let fx = Fixture::new();
        fx.repo.reject_put("a.md");
        let err = fx
            .writer()
            .put(&FileRecord::text("a.md", "x"), "main")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(409));
        assert_eq!(fx.puts(), 1);
    }

    #[tokio::test]
    async fn identical_content_is_skipped_only_when_asked() {
        let fx = Fixture::new();
        fx.repo.seed_file("main", "img.png", b"png".to_vec());
        let file = FileRecord::binary("img.png", b"png".to_vec());
        let out = fx.writer().put_if_changed(&file, "main").await.expect("put");
        assert!(matches!(out, WriteOutcome::Unchanged { .. }));
        assert_eq!(fx.puts(), 0);
        let out = fx.writer().put(&file, "main").await.expect("put");
        assert!(matches!(out, WriteOutcome::Updated { .. }));
        assert_eq!(fx.puts(), 1);
    }

    #[tokio::test]
    async fn delete_absent_is_skipped() {
        let fx = Fixture::new();
        let out = fx.writer().delete("ghost.md", "main").await.expect("delete");
        assert_eq!(
            out,
            WriteOutcome::Absent {
                path: "ghost.md".to_string()
            }
        );
        assert!(fx.repo.writes().is_empty());
    }

    #[tokio::test]
    async fn delete_existing() {
        let fx = Fixture::new();
        fx.repo.seed_file("main", "old.md", "x");
        let out = fx.writer().delete("old.md", "main").await.expect("delete");
        assert!(matches!(out, WriteOutcome::Deleted { .. }));
        assert!(fx.repo.file("main", "old.md").is_none());
    }
}
