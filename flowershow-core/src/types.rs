//! Domain types for the publish pipeline.
//!
//! Paths are vault-relative strings with forward-slash separators and no
//! leading slash; use [`normalize_path`] on anything coming from outside.
//! File content is always raw bytes: text is encoded as UTF-8 before it is
//! stored in a [`FileRecord`], so hashing is reproducible across platforms.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Normalise a path to the remote's form: forward slashes, no leading slash.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// How a file's content was read from the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Binary,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Text => write!(f, "text"),
            FileKind::Binary => write!(f, "binary"),
        }
    }
}

/// A read-only view of one vault file for the duration of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub kind: FileKind,
    pub content: Vec<u8>,
}

impl FileRecord {
    /// A text file; `content` is stored as its UTF-8 encoding.
    pub fn text(path: impl AsRef<str>, content: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            kind: FileKind::Text,
            content: content.into().into_bytes(),
        }
    }

    /// A binary file, stored byte-for-byte.
    pub fn binary(path: impl AsRef<str>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            kind: FileKind::Binary,
            content: content.into(),
        }
    }

    /// Content as UTF-8 text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Digest function behind a content identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    /// Legacy 160-bit identifiers (40 hex chars).
    #[default]
    Sha1,
    /// Current 256-bit identifiers (64 hex chars).
    Sha256,
}

impl HashAlgo {
    /// Length of the lowercase hex encoding of a digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgo::Sha1 => 40,
            HashAlgo::Sha256 => 64,
        }
    }

    /// Guess the algorithm from a hex identifier's length.
    ///
    /// Only a compatibility fallback for identifiers that arrive without an
    /// algorithm attached; returns `None` for any other length.
    pub fn detect(hash: &str) -> Option<HashAlgo> {
        match hash.len() {
            40 => Some(HashAlgo::Sha1),
            64 => Some(HashAlgo::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgo::Sha1 => write!(f, "sha1"),
            HashAlgo::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A path and the blob identifier of its exact byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathHash {
    pub path: String,
    pub hash: String,
}

/// Authoritative path → hash mapping read from the remote.
///
/// Built fresh on every read and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteState {
    /// Algorithm the remote uses for its identifiers.
    pub algo: HashAlgo,
    /// Entries keyed by normalised path.
    pub entries: BTreeMap<String, PathHash>,
    /// The backend stopped listing before the end of the tree.
    pub truncated: bool,
}

impl RemoteState {
    pub fn new(algo: HashAlgo) -> Self {
        Self {
            algo,
            entries: BTreeMap::new(),
            truncated: false,
        }
    }

    /// Insert an entry; the path is normalised first.
    pub fn insert(&mut self, path: &str, hash: impl Into<String>) {
        let path = normalize_path(path);
        self.entries.insert(
            path.clone(),
            PathHash {
                path,
                hash: hash.into(),
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<&PathHash> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries whose path satisfies `keep`.
    pub fn retain_paths(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }
}

// ---------------------------------------------------------------------------
// Status, batch, result
// ---------------------------------------------------------------------------

/// Partition of local and remote paths produced by the diff engine.
///
/// Every list is sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishStatus {
    pub unchanged_files: Vec<FileRecord>,
    pub changed_files: Vec<FileRecord>,
    pub new_files: Vec<FileRecord>,
    pub deleted_paths: Vec<String>,
    /// The remote listing was truncated; `deleted_paths` is left empty.
    pub remote_truncated: bool,
}

impl PublishStatus {
    /// `true` when nothing needs publishing or deleting.
    pub fn is_up_to_date(&self) -> bool {
        self.changed_files.is_empty() && self.new_files.is_empty() && self.deleted_paths.is_empty()
    }

    /// Batch covering every new, changed and deleted path (new files first).
    pub fn to_batch(&self) -> Batch {
        let files = self
            .new_files
            .iter()
            .chain(self.changed_files.iter())
            .cloned()
            .collect();
        Batch::new(files, self.deleted_paths.clone())
    }
}

/// One caller-submitted publish request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub files_to_publish: Vec<FileRecord>,
    pub files_to_delete: Vec<String>,
    pub branch_name_hint: Option<String>,
}

impl Batch {
    pub fn new(files_to_publish: Vec<FileRecord>, files_to_delete: Vec<String>) -> Self {
        Self {
            files_to_publish,
            files_to_delete: files_to_delete
                .iter()
                .map(|p| normalize_path(p))
                .collect(),
            branch_name_hint: None,
        }
    }

    pub fn with_branch_hint(mut self, hint: impl Into<String>) -> Self {
        self.branch_name_hint = Some(hint.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files_to_publish.is_empty() && self.files_to_delete.is_empty()
    }

    /// Total number of file operations (publishes + deletes).
    pub fn len(&self) -> usize {
        self.files_to_publish.len() + self.files_to_delete.len()
    }
}

/// How the pull request's merge step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Auto-merge disabled in configuration; the pull request is left open.
    NotRequested,
    /// Merged immediately.
    Merged,
    /// The remote will merge once its preconditions are satisfied.
    Pending,
    /// Neither immediate nor deferred merge was accepted; the pull request stays open.
    Failed { reason: String },
}

/// Outcome of one batch publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub branch: String,
    pub pr_number: u64,
    pub pr_url: String,
    pub merged: bool,
    pub merge: MergeOutcome,
}

/// Identity recorded on every commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    /// Display name plus the synthetic no-reply address for `account`.
    pub fn for_account(name: impl Into<String>, account: &str) -> Self {
        Self {
            name: name.into(),
            email: format!("{account}@users.noreply.github.com"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_leading_slashes_and_backslashes() {
        assert_eq!(normalize_path("/notes/a.md"), "notes/a.md");
        assert_eq!(normalize_path("//a.md"), "a.md");
        assert_eq!(normalize_path("notes\\sub\\b.md"), "notes/sub/b.md");
        assert_eq!(normalize_path("plain.md"), "plain.md");
    }

    #[test]
    fn detect_algo_by_hex_length() {
        assert_eq!(HashAlgo::detect(&"a".repeat(40)), Some(HashAlgo::Sha1));
        assert_eq!(HashAlgo::detect(&"a".repeat(64)), Some(HashAlgo::Sha256));
        assert_eq!(HashAlgo::detect("abc123"), None);
    }

    #[test]
    fn remote_state_insert_normalises_path() {
        let mut state = RemoteState::new(HashAlgo::Sha1);
        state.insert("/x.md", "abc");
        assert_eq!(state.get("x.md").map(|e| e.hash.as_str()), Some("abc"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn to_batch_lists_new_before_changed() {
        let status = PublishStatus {
            new_files: vec![FileRecord::text("b.md", "b")],
            changed_files: vec![FileRecord::text("a.md", "a")],
            deleted_paths: vec!["old.md".to_string()],
            ..Default::default()
        };
        let batch = status.to_batch();
        let paths: Vec<_> = batch.files_to_publish.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["b.md", "a.md"]);
        assert_eq!(batch.files_to_delete, vec!["old.md"]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn committer_uses_noreply_address() {
        let c = Committer::for_account("Ada", "ada");
        assert_eq!(c.email, "ada@users.noreply.github.com");
        assert_eq!(c.name, "Ada");
    }
}
