//! Content-addressed diff between the local vault and the remote tree.
//!
//! ## Classification
//!
//! | local | remote       | hashes   | result      |
//! |-------|--------------|----------|-------------|
//! | yes   | no           | –        | new         |
//! | yes   | yes          | equal    | unchanged   |
//! | yes   | yes          | differ   | changed     |
//! | no    | yes          | –        | deleted     |
//!
//! Local hashes are computed with the algorithm carried by the
//! [`RemoteState`], so both sides always use the same identifier scheme.

use std::collections::BTreeMap;

use flowershow_core::{normalize_path, FileRecord, PublishStatus, RemoteState};

use crate::hasher::same_content;

/// Partition `local` against `remote`.
///
/// Every output list is sorted by path. Duplicate local paths (after
/// normalisation) keep the last record. When the remote listing is
/// truncated, remote-only paths cannot be trusted to be complete, so
/// `deleted_paths` stays empty and `remote_truncated` is set.
pub fn diff(local: Vec<FileRecord>, remote: &RemoteState) -> PublishStatus {
    let mut by_path: BTreeMap<String, FileRecord> = BTreeMap::new();
    for mut file in local {
        file.path = normalize_path(&file.path);
        if let Some(previous) = by_path.insert(file.path.clone(), file) {
            tracing::warn!("duplicate local path `{}`; keeping the last copy", previous.path);
        }
    }

    let mut status = PublishStatus {
        remote_truncated: remote.truncated,
        ..Default::default()
    };

    // BTreeMap iteration keeps every list in path order.
    for (path, file) in by_path.iter() {
        match remote.get(path) {
            None => status.new_files.push(file.clone()),
            Some(entry) if same_content(file, &entry.hash, remote.algo) => {
                status.unchanged_files.push(file.clone())
            }
            Some(_) => status.changed_files.push(file.clone()),
        }
    }

    if !remote.truncated {
        status.deleted_paths = remote
            .paths()
            .filter(|path| !by_path.contains_key(*path))
            .map(str::to_string)
            .collect();
    }

    tracing::debug!(
        "diff: {} new, {} changed, {} unchanged, {} deleted",
        status.new_files.len(),
        status.changed_files.len(),
        status.unchanged_files.len(),
        status.deleted_paths.len()
    );
    status
}

#[cfg(test)]
mod tests {
    use flowershow_core::HashAlgo;

    use super::*;
    use crate::hasher::blob_hash;

    fn paths(files: &[FileRecord]) -> Vec<&str> {
        files.iter().map(|f| f.path.as_str()).collect()
    }

    fn remote(entries: &[(&str, &str)], algo: HashAlgo) -> RemoteState {
        let mut state = RemoteState::new(algo);
        for (path, content) in entries {
            state.insert(path, blob_hash(content.as_bytes(), algo));
        }
        state
    }

    #[test]
    fn empty_remote_makes_everything_new() {
        let local = vec![FileRecord::text("b.md", "b"), FileRecord::text("a.md", "a")];
        let status = diff(local, &RemoteState::new(HashAlgo::Sha1));
        assert_eq!(paths(&status.new_files), vec!["a.md", "b.md"]);
        assert!(status.changed_files.is_empty());
        assert!(status.unchanged_files.is_empty());
        assert!(status.deleted_paths.is_empty());
    }

    #[test]
    fn empty_local_deletes_everything_remote() {
        let mut state = RemoteState::new(HashAlgo::Sha1);
        state.insert("x.md", "abc123");
        let status = diff(Vec::new(), &state);
        assert_eq!(status.deleted_paths, vec!["x.md"]);
        assert!(status.new_files.is_empty());
        assert!(status.changed_files.is_empty());
        assert!(status.unchanged_files.is_empty());
    }

    #[test]
    fn classifies_all_four_ways() {
        let state = remote(
            &[("same.md", "same"), ("edit.md", "old"), ("gone.md", "x")],
            HashAlgo::Sha1,
        );
        let local = vec![
            FileRecord::text("edit.md", "new"),
            FileRecord::text("same.md", "same"),
            FileRecord::text("fresh.md", "fresh"),
        ];
        let status = diff(local, &state);
        assert_eq!(paths(&status.unchanged_files), vec!["same.md"]);
        assert_eq!(paths(&status.changed_files), vec!["edit.md"]);
        assert_eq!(paths(&status.new_files), vec!["fresh.md"]);
        assert_eq!(status.deleted_paths, vec!["gone.md"]);
    }

    #[test]
    fn sha256_remote_uses_sha256_locally() {
        let state = remote(&[("a.md", "same")], HashAlgo::Sha256);
        let status = diff(vec![FileRecord::text("a.md", "same")], &state);
        assert_eq!(paths(&status.unchanged_files), vec!["a.md"]);
    }

    #[test]
    fn binary_and_text_share_the_hashing_contract() {
        let png: [u8; 4] = [0x89, 0x50, 0x4e, 0x47];
        let mut state = RemoteState::new(HashAlgo::Sha1);
        state.insert("img.png", blob_hash(&png, HashAlgo::Sha1));
        let status = diff(
            vec![FileRecord::binary("img.png", png.to_vec())],
            &state,
        );
        assert_eq!(paths(&status.unchanged_files), vec!["img.png"]);
    }

    #[test]
    fn leading_slashes_are_normalised_before_lookup() {
        let state = remote(&[("notes/a.md", "a")], HashAlgo::Sha1);
        let mut file = FileRecord::text("notes/a.md", "a");
        file.path = "/notes/a.md".to_string();
        let status = diff(vec![file], &state);
        assert_eq!(paths(&status.unchanged_files), vec!["notes/a.md"]);
        assert!(status.deleted_paths.is_empty());
    }

    #[test]
    fn truncated_remote_suppresses_deletions() {
        let mut state = remote(&[("gone.md", "x")], HashAlgo::Sha1);
        state.truncated = true;
        let status = diff(Vec::new(), &state);
        assert!(status.deleted_paths.is_empty());
        assert!(status.remote_truncated);
    }

    #[test]
    fn uppercase_remote_hash_still_matches() {
        let mut state = RemoteState::new(HashAlgo::Sha1);
        state.insert("a.md", blob_hash(b"a", HashAlgo::Sha1).to_uppercase());
        let status = diff(vec![FileRecord::text("a.md", "a")], &state);
        assert_eq!(paths(&status.unchanged_files), vec!["a.md"]);
    }

    #[test]
    fn diff_is_deterministic() {
        let state = remote(&[("b.md", "b"), ("z.md", "z")], HashAlgo::Sha1);
        let local = || {
            vec![
                FileRecord::text("c.md", "c"),
                FileRecord::text("b.md", "changed"),
                FileRecord::text("a.md", "a"),
            ]
        };
        assert_eq!(diff(local(), &state), diff(local(), &state));
    }
}
