//! Fresh remote tree listings.

use flowershow_core::RemoteState;

use crate::error::PublishError;
use crate::exclude::ExcludeFilter;
use crate::remote::ContentStore;
use crate::retry::{CallClass, RetryPolicy};

/// Reads the authoritative path → hash mapping of one branch.
///
/// Every call goes to the remote; nothing is cached between reads.
pub struct RemoteStateReader<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    branch: &'a str,
    retry: &'a RetryPolicy,
    exclude: Option<&'a ExcludeFilter>,
}

impl<'a, S: ContentStore + ?Sized> RemoteStateReader<'a, S> {
    pub fn new(store: &'a S, branch: &'a str, retry: &'a RetryPolicy) -> Self {
        Self {
            store,
            branch,
            retry,
            exclude: None,
        }
    }

    /// Drop remote paths matching `filter` from every listing.
    pub fn with_exclude(mut self, filter: &'a ExcludeFilter) -> Self {
        self.exclude = Some(filter);
        self
    }

    /// Full listing, retried per policy on transient failures.
    ///
    /// Fails with `RemoteNotFound` if the branch or repository is missing.
    pub async fn read_tree(&self) -> Result<RemoteState, PublishError> {
        let mut state = self
            .retry
            .run(CallClass::Read, "read tree", || self.store.read_tree(self.branch))
            .await?;
        if state.truncated {
            tracing::warn!(
                "{} listing of `{}` was truncated at {} entries; deletions will not be detected",
                self.store.backend(),
                self.branch,
                state.len()
            );
        }
        if let Some(filter) = self.exclude {
            let before = state.len();
            state.retain_paths(|path| !filter.is_excluded(path));
            let dropped = before - state.len();
            if dropped > 0 {
                tracing::debug!("excluded {dropped} remote path(s)");
            }
        }
        tracing::debug!(
            "read {} remote entries from `{}` ({})",
            state.len(),
            self.branch,
            state.algo
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::remote::MemoryRepository;

    #[tokio::test]
    async fn transient_read_failure_is_retried() {
        let repo = MemoryRepository::new("main");
        repo.seed_file("main", "a.md", "a");
        repo.fail_next("read_tree", 1);
        let retry = RetryPolicy::new(2, Duration::ZERO, 1.0);
        let state = RemoteStateReader::new(&repo, "main", &retry)
            .read_tree()
            .await
            .expect("tree");
        assert_eq!(state.len(), 1);
        assert_eq!(repo.calls().len(), 2);
    }

    #[tokio::test]
    async fn excluded_paths_are_dropped() {
        let repo = MemoryRepository::new("main");
        repo.seed_file("main", "a.md", "a");
        repo.seed_file("main", "drawing.excalidraw.md", "x");
        let retry = RetryPolicy::none();
        let filter = ExcludeFilter::default_patterns();
        let state = RemoteStateReader::new(&repo, "main", &retry)
            .with_exclude(&filter)
            .read_tree()
            .await
            .expect("tree");
        assert_eq!(state.paths().collect::<Vec<_>>(), vec!["a.md"]);
    }

    #[tokio::test]
    async fn truncation_flag_survives() {
        let repo = MemoryRepository::new("main");
        repo.set_truncated(true);
        let retry = RetryPolicy::none();
        let state = RemoteStateReader::new(&repo, "main", &retry)
            .read_tree()
            .await
            .expect("tree");
        assert!(state.truncated);
    }
}
