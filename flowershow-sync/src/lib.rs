//! # flowershow-sync
//!
//! Content-addressed diffing and batch publishing of a vault to a remote
//! content repository.
//!
//! - [`hasher`] computes git-framed blob ids so local files compare against
//!   remote ids without uploading anything.
//! - [`reader`] lists the remote tree fresh on every call.
//! - [`diff`] partitions local files into new / changed / unchanged and
//!   remote-only paths into deleted.
//! - [`orchestrator`] turns a [`Batch`](flowershow_core::Batch) into a
//!   working branch, one commit per file, a pull request and a merge attempt.
//! - [`Publisher`] ties these to a configuration snapshot, a remote and a
//!   vault.

pub mod branch;
pub mod diff;
pub mod embeds;
pub mod error;
pub mod exclude;
pub mod hasher;
pub mod orchestrator;
pub mod progress;
pub mod publisher;
pub mod reader;
pub mod remote;
pub mod retry;
pub mod single;
pub mod text_diff;
pub mod vault;
pub mod writer;

pub use diff::diff;
pub use embeds::{EmbedOutcome, EmbedReport, SkipReason};
pub use error::PublishError;
pub use exclude::ExcludeFilter;
pub use hasher::blob_hash;
pub use orchestrator::{BatchCheckpoint, BatchState, PublishOrchestrator};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, RecordingProgress};
pub use publisher::{DirectReport, Publisher};
pub use reader::RemoteStateReader;
pub use remote::{
    ContentStore, GithubRepository, MemoryRepository, MergeMode, ObjectStore, RemoteCall,
    ReviewRepository,
};
pub use retry::{CallClass, RetryPolicy};
pub use single::NoteReport;
pub use text_diff::FileDiff;
pub use vault::{FsVault, Vault};
pub use writer::{FileWriter, WriteOutcome};
