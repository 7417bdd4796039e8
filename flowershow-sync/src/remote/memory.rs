//! In-memory repository for tests and dry runs.
//!
//! [`MemoryRepository`] keeps branches, files and pull requests behind one
//! `Mutex` and implements both [`ContentStore`] and [`ReviewRepository`]. It
//! answers with the same status codes a Git-hosting API would (404 for a
//! missing branch, 409 for a stale blob id, 422 for an existing ref or an
//! empty pull request), records every call in order, and can be told to
//! fail specific calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use flowershow_core::{HashAlgo, RemoteState};

use crate::error::{classify_status, PublishError};
use crate::hasher::blob_hash;
use crate::remote::{
    ContentStore, DeleteFile, PullRequestDraft, PullRequestRef, PutFile, ReviewRepository,
};

/// How [`MemoryRepository`] answers merge requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Merge immediately.
    #[default]
    Immediate,
    /// Refuse the immediate merge (checks pending) but accept auto-merge.
    AwaitChecks,
    /// Refuse both the immediate merge and auto-merge.
    AutoMergeUnavailable,
}

/// One recorded call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ReadTree { branch: String },
    FileSha { path: String, branch: String },
    ReadFile { path: String, branch: String },
    PutFile { path: String, branch: String, message: String, sha: Option<String> },
    DeleteFile { path: String, branch: String, message: String },
    BranchHead { branch: String },
    CreateBranch { name: String, from: String },
    OpenPullRequest { head: String, base: String, title: String },
    FindPullRequest { head: String, base: String },
    IsMerged { number: u64 },
    MergePullRequest { number: u64, title: String },
    EnableAutoMerge { number: u64, title: String },
}

impl RemoteCall {
    /// Short operation name, as used by [`MemoryRepository::fail_next`].
    pub fn operation(&self) -> &'static str {
        match self {
            RemoteCall::ReadTree { .. } => "read_tree",
            RemoteCall::FileSha { .. } => "file_sha",
            RemoteCall::ReadFile { .. } => "read_file",
            RemoteCall::PutFile { .. } => "put_file",
            RemoteCall::DeleteFile { .. } => "delete_file",
            RemoteCall::BranchHead { .. } => "branch_head",
            RemoteCall::CreateBranch { .. } => "create_branch",
            RemoteCall::OpenPullRequest { .. } => "open_pull_request",
            RemoteCall::FindPullRequest { .. } => "find_pull_request",
            RemoteCall::IsMerged { .. } => "is_merged",
            RemoteCall::MergePullRequest { .. } => "merge_pull_request",
            RemoteCall::EnableAutoMerge { .. } => "enable_auto_merge",
        }
    }

    /// `true` for calls that change remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteCall::PutFile { .. }
                | RemoteCall::DeleteFile { .. }
                | RemoteCall::CreateBranch { .. }
                | RemoteCall::OpenPullRequest { .. }
                | RemoteCall::MergePullRequest { .. }
                | RemoteCall::EnableAutoMerge { .. }
        )
    }
}

/// A pull request as the memory repository sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub merged: bool,
    pub auto_merge: bool,
    /// Title of the merge commit, once merged or scheduled.
    pub merge_title: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Branch {
    head: String,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct Inner {
    algo: HashAlgo,
    branches: BTreeMap<String, Branch>,
    pulls: Vec<PullRequestRecord>,
    calls: Vec<RemoteCall>,
    commits: u64,
    merge_mode: MergeMode,
    truncated: bool,
    deny_branch_creation: bool,
    /// Names `branch_head` reports as free but `create_branch` refuses (422).
    racing_branches: HashSet<String>,
    /// Paths whose put is refused permanently (409).
    rejected_puts: HashSet<String>,
    /// Paths whose next put is applied and then reported as a transport error.
    lost_put_replies: HashSet<String>,
    /// Remaining transient failures per operation name.
    transient: HashMap<&'static str, u32>,
    /// Operations whose next call is applied and then reported as a
    /// transport error.
    lost_replies: HashSet<&'static str>,
}

impl Inner {
    fn next_commit(&mut self) -> String {
        self.commits += 1;
        format!("{:040x}", self.commits)
    }

    fn take_transient(&mut self, operation: &'static str, target: &str) -> Result<(), PublishError> {
        if let Some(left) = self.transient.get_mut(operation) {
            if *left > 0 {
                *left -= 1;
                return Err(PublishError::RemoteUnavailable {
                    operation,
                    target: target.to_string(),
                    reason: "injected transient failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn lose_reply(&mut self, operation: &'static str, target: &str) -> Result<(), PublishError> {
        if self.lost_replies.remove(operation) {
            return Err(PublishError::RemoteUnavailable {
                operation,
                target: target.to_string(),
                reason: "connection reset after write".to_string(),
            });
        }
        Ok(())
    }

    fn branch(&self, operation: &'static str, name: &str) -> Result<&Branch, PublishError> {
        self.branches.get(name).ok_or_else(|| PublishError::RemoteNotFound {
            operation,
            target: name.to_string(),
        })
    }

    fn branch_mut(&mut self, operation: &'static str, name: &str) -> Result<&mut Branch, PublishError> {
        self.branches
            .get_mut(name)
            .ok_or_else(|| PublishError::RemoteNotFound {
                operation,
                target: name.to_string(),
            })
    }
}

/// Thread-safe in-memory [`ReviewRepository`].
#[derive(Debug)]
pub struct MemoryRepository {
    base: String,
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    /// A repository with one empty branch, `base`.
    pub fn new(base: &str) -> Self {
        let repo = Self::without_branches(base);
        {
            let mut inner = repo.lock();
            let head = inner.next_commit();
            inner.branches.insert(
                base.to_string(),
                Branch {
                    head,
                    files: BTreeMap::new(),
                },
            );
        }
        repo
    }

    /// A repository where not even `base` exists yet.
    pub fn without_branches(base: &str) -> Self {
        Self {
            base: base.to_string(),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_hash_algo(self, algo: HashAlgo) -> Self {
        self.lock().algo = algo;
        self
    }

    pub fn with_merge_mode(self, mode: MergeMode) -> Self {
        self.lock().merge_mode = mode;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -- seeding -------------------------------------------------------------

    /// Write `content` at `path` on `branch` without recording a call.
    /// Creates the branch if needed.
    pub fn seed_file(&self, branch: &str, path: &str, content: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        let head = inner.next_commit();
        let entry = inner.branches.entry(branch.to_string()).or_default();
        entry.head = head;
        entry.files.insert(path.to_string(), content.into());
    }

    /// Create `name` as a copy of `from` without recording a call.
    pub fn seed_branch(&self, name: &str, from: &str) {
        let mut inner = self.lock();
        let copy = inner.branches.get(from).cloned().unwrap_or_default();
        inner.branches.insert(name.to_string(), copy);
    }

    // -- failure injection ---------------------------------------------------

    /// Fail the next `times` calls of `operation` (see [`RemoteCall::operation`])
    /// with a transient transport error.
    pub fn fail_next(&self, operation: &'static str, times: u32) {
        self.lock().transient.insert(operation, times);
    }

    /// Refuse every put of `path` with 409.
    pub fn reject_put(&self, path: &str) {
        self.lock().rejected_puts.insert(path.to_string());
    }

    /// Undo [`reject_put`](Self::reject_put).
    pub fn allow_put(&self, path: &str) {
        self.lock().rejected_puts.remove(path);
    }

    /// Apply the next put of `path`, then report a transport error.
    pub fn lose_put_reply(&self, path: &str) {
        self.lock().lost_put_replies.insert(path.to_string());
    }

    /// Apply the next `create_branch`, `open_pull_request` or
    /// `merge_pull_request`, then report a transport error.
    pub fn lose_next_reply(&self, operation: &'static str) {
        self.lock().lost_replies.insert(operation);
    }

    /// Refuse branch creation with 403.
    pub fn deny_branch_creation(&self) {
        self.lock().deny_branch_creation = true;
    }

    /// Report `name` as free, then refuse to create it with 422.
    pub fn race_branch(&self, name: &str) {
        self.lock().racing_branches.insert(name.to_string());
    }

    /// Mark every tree listing as truncated.
    pub fn set_truncated(&self, truncated: bool) {
        self.lock().truncated = truncated;
    }

    pub fn set_merge_mode(&self, mode: MergeMode) {
        self.lock().merge_mode = mode;
    }

    // -- inspection ----------------------------------------------------------

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls that change remote state.
    pub fn writes(&self) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Snapshot of every file on `branch`; empty if the branch is absent.
    pub fn files(&self, branch: &str) -> BTreeMap<String, Vec<u8>> {
        self.lock()
            .branches
            .get(branch)
            .map(|b| b.files.clone())
            .unwrap_or_default()
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .branches
            .get(branch)
            .and_then(|b| b.files.get(path).cloned())
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.lock().branches.keys().cloned().collect()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestRecord> {
        self.lock().pulls.clone()
    }

    fn pull_request_ref(&self, number: u64) -> PullRequestRef {
        PullRequestRef {
            number,
            url: format!("memory://{}/pull/{number}", self.base),
            node_id: format!("PR_{number}"),
        }
    }

    fn record(&self, call: RemoteCall) -> MutexGuard<'_, Inner> {
        let mut inner = self.lock();
        inner.calls.push(call);
        inner
    }
}

#[async_trait]
impl ContentStore for MemoryRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn hash_algo(&self) -> HashAlgo {
        self.lock().algo
    }

    async fn read_tree(&self, branch: &str) -> Result<RemoteState, PublishError> {
        let mut inner = self.record(RemoteCall::ReadTree {
            branch: branch.to_string(),
        });
        inner.take_transient("read_tree", branch)?;
        let algo = inner.algo;
        let truncated = inner.truncated;
        let files = &inner.branch("read tree", branch)?.files;
        let mut state = RemoteState::new(algo);
        for (path, content) in files {
            state.insert(path, blob_hash(content, algo));
        }
        state.truncated = truncated;
        Ok(state)
    }

    async fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>, PublishError> {
        let mut inner = self.record(RemoteCall::FileSha {
            path: path.to_string(),
            branch: branch.to_string(),
        });
        inner.take_transient("file_sha", path)?;
        let algo = inner.algo;
        let files = &inner.branch("get file", branch)?.files;
        Ok(files.get(path).map(|content| blob_hash(content, algo)))
    }

    async fn read_file(&self, path: &str, branch: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let mut inner = self.record(RemoteCall::ReadFile {
            path: path.to_string(),
            branch: branch.to_string(),
        });
        inner.take_transient("read_file", path)?;
        Ok(inner.branch("get file", branch)?.files.get(path).cloned())
    }

    async fn put_file(&self, request: &PutFile<'_>) -> Result<(), PublishError> {
        let mut inner = self.record(RemoteCall::PutFile {
            path: request.path.to_string(),
            branch: request.branch.to_string(),
            message: request.message.to_string(),
            sha: request.sha.map(str::to_string),
        });
        inner.take_transient("put_file", request.path)?;
        if inner.rejected_puts.contains(request.path) {
            return Err(classify_status("put file", request.path, 409, "injected conflict"));
        }
        let algo = inner.algo;
        let current = inner
            .branch("put file", request.branch)?
            .files
            .get(request.path)
            .map(|content| blob_hash(content, algo));
        match (current.as_deref(), request.sha) {
            (Some(_), None) => {
                return Err(classify_status(
                    "put file",
                    request.path,
                    422,
                    "\"sha\" wasn't supplied",
                ))
            }
            (Some(current), Some(given)) if !current.eq_ignore_ascii_case(given) => {
                return Err(classify_status(
                    "put file",
                    request.path,
                    409,
                    format!("{} does not match {given}", request.path),
                ))
            }
            _ => {}
        }
        let head = inner.next_commit();
        let branch = inner.branch_mut("put file", request.branch)?;
        branch.head = head;
        branch
            .files
            .insert(request.path.to_string(), request.content.to_vec());
        if inner.lost_put_replies.remove(request.path) {
            return Err(PublishError::RemoteUnavailable {
                operation: "put file",
                target: request.path.to_string(),
                reason: "connection reset after write".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_file(&self, request: &DeleteFile<'_>) -> Result<(), PublishError> {
        let mut inner = self.record(RemoteCall::DeleteFile {
            path: request.path.to_string(),
            branch: request.branch.to_string(),
            message: request.message.to_string(),
        });
        inner.take_transient("delete_file", request.path)?;
        let algo = inner.algo;
        let current = inner
            .branch("delete file", request.branch)?
            .files
            .get(request.path)
            .map(|content| blob_hash(content, algo))
            .ok_or_else(|| PublishError::RemoteNotFound {
                operation: "delete file",
                target: request.path.to_string(),
            })?;
        if !current.eq_ignore_ascii_case(request.sha) {
            return Err(classify_status(
                "delete file",
                request.path,
                409,
                format!("{} does not match {}", request.path, request.sha),
            ));
        }
        let head = inner.next_commit();
        let branch = inner.branch_mut("delete file", request.branch)?;
        branch.head = head;
        branch.files.remove(request.path);
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for MemoryRepository {
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, PublishError> {
        let mut inner = self.record(RemoteCall::BranchHead {
            branch: branch.to_string(),
        });
        inner.take_transient("branch_head", branch)?;
        if inner.racing_branches.contains(branch) {
            return Ok(None);
        }
        Ok(inner.branches.get(branch).map(|b| b.head.clone()))
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), PublishError> {
        let mut inner = self.record(RemoteCall::CreateBranch {
            name: name.to_string(),
            from: from_sha.to_string(),
        });
        inner.take_transient("create_branch", name)?;
        if inner.deny_branch_creation {
            return Err(classify_status("create branch", name, 403, "denied"));
        }
        if inner.racing_branches.contains(name) || inner.branches.contains_key(name) {
            return Err(classify_status(
                "create branch",
                name,
                422,
                "Reference already exists",
            ));
        }
        let source = inner
            .branches
            .values()
            .find(|b| b.head == from_sha)
            .cloned()
            .ok_or_else(|| classify_status("create branch", name, 422, "Object does not exist"))?;
        inner.branches.insert(name.to_string(), source);
        inner.lose_reply("create_branch", name)
    }

    async fn open_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> Result<PullRequestRef, PublishError> {
        let mut inner = self.record(RemoteCall::OpenPullRequest {
            head: draft.head.clone(),
            base: draft.base.clone(),
            title: draft.title.clone(),
        });
        inner.take_transient("open_pull_request", &draft.head)?;
        let head_files = &inner.branch("open pull request", &draft.head)?.files;
        let base_files = &inner.branch("open pull request", &draft.base)?.files;
        if head_files == base_files {
            return Err(classify_status(
                "open pull request",
                draft.head.as_str(),
                422,
                format!("No commits between {} and {}", draft.base, draft.head),
            ));
        }
        let number = inner.pulls.len() as u64 + 1;
        inner.pulls.push(PullRequestRecord {
            number,
            title: draft.title.clone(),
            body: draft.body.clone(),
            head: draft.head.clone(),
            base: draft.base.clone(),
            merged: false,
            auto_merge: false,
            merge_title: None,
        });
        inner.lose_reply("open_pull_request", &draft.head)?;
        Ok(self.pull_request_ref(number))
    }

    async fn find_open_pull_request(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>, PublishError> {
        let mut inner = self.record(RemoteCall::FindPullRequest {
            head: head.to_string(),
            base: base.to_string(),
        });
        inner.take_transient("find_pull_request", head)?;
        Ok(inner
            .pulls
            .iter()
            .find(|p| p.head == head && p.base == base && !p.merged)
            .map(|p| self.pull_request_ref(p.number)))
    }

    async fn is_merged(&self, pr: &PullRequestRef) -> Result<bool, PublishError> {
        let mut inner = self.record(RemoteCall::IsMerged { number: pr.number });
        let target = format!("#{}", pr.number);
        inner.take_transient("is_merged", &target)?;
        inner
            .pulls
            .iter()
            .find(|p| p.number == pr.number)
            .map(|p| p.merged)
            .ok_or(PublishError::RemoteNotFound {
                operation: "get merge state",
                target,
            })
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError> {
        let mut inner = self.record(RemoteCall::MergePullRequest {
            number: pr.number,
            title: commit_title.to_string(),
        });
        let target = format!("#{}", pr.number);
        inner.take_transient("merge_pull_request", &target)?;
        if inner.merge_mode != MergeMode::Immediate {
            return Err(classify_status(
                "merge pull request",
                target,
                405,
                "Required status check is expected",
            ));
        }
        let index = (pr.number as usize)
            .checked_sub(1)
            .filter(|i| *i < inner.pulls.len())
            .ok_or_else(|| PublishError::RemoteNotFound {
                operation: "merge pull request",
                target: target.clone(),
            })?;
        let (head, base) = (inner.pulls[index].head.clone(), inner.pulls[index].base.clone());
        let files = inner.branch("merge pull request", &head)?.files.clone();
        let commit = inner.next_commit();
        let base_branch = inner.branch_mut("merge pull request", &base)?;
        base_branch.files = files;
        base_branch.head = commit;
        let record = &mut inner.pulls[index];
        record.merged = true;
        record.merge_title = Some(commit_title.to_string());
        inner.lose_reply("merge_pull_request", &target)
    }

    async fn enable_auto_merge(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError> {
        let mut inner = self.record(RemoteCall::EnableAutoMerge {
            number: pr.number,
            title: commit_title.to_string(),
        });
        let target = format!("#{}", pr.number);
        inner.take_transient("enable_auto_merge", &target)?;
        if inner.merge_mode == MergeMode::AutoMergeUnavailable {
            return Err(classify_status(
                "enable auto-merge",
                target,
                422,
                "Auto-merge is not allowed for this repository",
            ));
        }
        let record = inner
            .pulls
            .iter_mut()
            .find(|p| p.number == pr.number)
            .ok_or_else(|| PublishError::RemoteNotFound {
                operation: "enable auto-merge",
                target,
            })?;
        record.auto_merge = true;
        record.merge_title = Some(commit_title.to_string());
        Ok(())
    }
}
