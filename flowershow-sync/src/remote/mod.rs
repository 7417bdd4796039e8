//! Remote content repository capabilities.
//!
//! Two layers:
//! - [`ContentStore`]: path-addressed reads and single-file writes. Every
//!   backend implements it.
//! - [`ReviewRepository`]: branches, pull requests and merging, needed by
//!   the batch orchestrator. Only version-controlled backends implement it.
//!
//! Every method is one remote round trip and a suspension point; none of them
//! retries internally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flowershow_core::{Committer, HashAlgo, RemoteState};

use crate::error::PublishError;

pub mod github;
pub(crate) mod http;
pub mod memory;
pub mod object_store;

pub use github::GithubRepository;
pub use memory::{MemoryRepository, MergeMode, RemoteCall};
pub use object_store::ObjectStore;

/// A single-file create or update.
#[derive(Debug, Clone)]
pub struct PutFile<'a> {
    pub path: &'a str,
    pub content: &'a [u8],
    /// Blob identifier of `content` under the store's algorithm.
    pub content_hash: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    /// Current identifier when updating; `None` creates the file.
    pub sha: Option<&'a str>,
    pub committer: &'a Committer,
}

/// A single-file delete.
#[derive(Debug, Clone)]
pub struct DeleteFile<'a> {
    pub path: &'a str,
    pub sha: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    pub committer: &'a Committer,
}

/// A pull request about to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// An opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
    /// Opaque global id some APIs need for follow-up mutations.
    pub node_id: String,
}

/// Path-addressed storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Algorithm behind the identifiers this store reports.
    fn hash_algo(&self) -> HashAlgo;

    /// Full recursive listing at `branch`, bypassing any cache.
    async fn read_tree(&self, branch: &str) -> Result<RemoteState, PublishError>;

    /// Current blob identifier of `path` at `branch`; `None` if absent.
    async fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>, PublishError>;

    /// Raw content of `path` at `branch`; `None` if absent.
    async fn read_file(&self, path: &str, branch: &str) -> Result<Option<Vec<u8>>, PublishError>;

    /// Create or update one file in its own commit.
    async fn put_file(&self, request: &PutFile<'_>) -> Result<(), PublishError>;

    /// Delete one file in its own commit.
    async fn delete_file(&self, request: &DeleteFile<'_>) -> Result<(), PublishError>;
}

/// Branch + pull request workflow on top of [`ContentStore`].
#[async_trait]
pub trait ReviewRepository: ContentStore {
    /// Tip commit of `branch`; `None` if the branch does not exist.
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, PublishError>;

    /// Create `name` pointing at commit `from_sha`.
    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), PublishError>;

    async fn open_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> Result<PullRequestRef, PublishError>;

    /// The open pull request from `head` into `base`, if there is one.
    async fn find_open_pull_request(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>, PublishError>;

    async fn is_merged(&self, pr: &PullRequestRef) -> Result<bool, PublishError>;

    /// Merge now; fails if merge preconditions are not met yet.
    async fn merge_pull_request(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError>;

    /// Ask the remote to merge once its preconditions are satisfied.
    async fn enable_auto_merge(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError>;
}
