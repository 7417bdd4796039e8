use std::fs;
use std::path::Path;
use std::sync::Arc;

use flowershow_core::{Batch, FileRecord, HashAlgo, PublishConfig};
use flowershow_sync::{
    FsVault, MemoryRepository, NoProgress, ProgressEvent, PublishError, Publisher,
    RecordingProgress, RemoteCall, RetryPolicy, SkipReason, WriteOutcome,
};
use tempfile::TempDir;

fn publisher(repo: &Arc<MemoryRepository>, vault: &Path) -> Publisher<MemoryRepository> {
    let config = PublishConfig {
        owner: "ada".to_string(),
        repo: "garden".to_string(),
        token: "t".to_string(),
        ..Default::default()
    };
    Publisher::new(config, Arc::clone(repo), Arc::new(FsVault::new(vault)))
        .expect("publisher")
        .with_retry(RetryPolicy::none())
}

fn write(root: &Path, path: &str, content: impl AsRef<[u8]>) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(full, content).expect("write");
}

#[tokio::test]
async fn status_partitions_vault_against_base_branch() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "same.md", "same");
    write(vault.path(), "edited.md", "new text");
    write(vault.path(), "fresh.md", "fresh");
    write(vault.path(), "img/cat.png", [0x89u8, 0x50, 0x4e, 0x47]);
    write(vault.path(), ".obsidian/app.json", "{}");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "same.md", "same");
    repo.seed_file("main", "edited.md", "old text");
    repo.seed_file("main", "img/cat.png", vec![0x89u8, 0x50, 0x4e, 0x47]);
    repo.seed_file("main", "gone.md", "bye");

    let status = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .expect("status");
    let paths = |files: &[FileRecord]| files.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&status.unchanged_files), vec!["img/cat.png", "same.md"]);
    assert_eq!(paths(&status.changed_files), vec!["edited.md"]);
    assert_eq!(paths(&status.new_files), vec!["fresh.md"]);
    assert_eq!(status.deleted_paths, vec!["gone.md"]);
    assert!(!status.remote_truncated);
    assert!(repo.writes().is_empty());
}

#[tokio::test]
async fn status_compares_sha256_identifiers() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "a.md", "a");
    let repo = Arc::new(MemoryRepository::new("main").with_hash_algo(HashAlgo::Sha256));
    repo.seed_file("main", "a.md", "a");

    let status = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .expect("status");
    assert_eq!(status.unchanged_files.len(), 1);
    assert!(status.is_up_to_date());
}

#[tokio::test]
async fn excluded_paths_never_enter_the_status() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "drawing.excalidraw.md", "local");
    write(vault.path(), "note.md", "n");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "old.excalidraw", "remote");

    let status = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .expect("status");
    let new: Vec<_> = status.new_files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(new, vec!["note.md"]);
    assert!(status.deleted_paths.is_empty());
}

#[tokio::test]
async fn truncated_listing_suppresses_deletions() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "maybe.md", "x");
    repo.set_truncated(true);

    let status = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .expect("status");
    assert!(status.remote_truncated);
    assert!(status.deleted_paths.is_empty());
}

#[tokio::test]
async fn status_fails_as_a_whole_when_the_listing_fails() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "a.md", "a");
    let repo = Arc::new(MemoryRepository::without_branches("main"));

    let err = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn publish_one_uploads_note_and_changed_embeds() {
    let vault = TempDir::new().expect("vault");
    write(
        vault.path(),
        "notes/trip.md",
        "![[cat.png]]\n![map](../maps/route.svg)\n![[cat.png|again]]\n![](https://example.com/x.png)\n![[ghost.gif]]",
    );
    write(vault.path(), "notes/cat.png", [1u8, 2, 3]);
    write(vault.path(), "maps/route.svg", "<svg/>");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "maps/route.svg", "<svg/>");
    let publisher = publisher(&repo, vault.path());

    let report = publisher.publish_path("notes/trip.md").await.expect("publish");
    assert_eq!(
        report.note,
        WriteOutcome::Created {
            path: "notes/trip.md".to_string()
        }
    );
    assert_eq!(
        report.assets,
        vec![
            WriteOutcome::Created {
                path: "notes/cat.png".to_string()
            },
            WriteOutcome::Unchanged {
                path: "maps/route.svg".to_string()
            },
        ]
    );
    let reasons: Vec<_> = report.embeds.skipped().map(|(_, r)| r.clone()).collect();
    assert_eq!(
        reasons,
        vec![SkipReason::Duplicate, SkipReason::Unresolved, SkipReason::External]
    );

    let puts: Vec<_> = repo
        .writes()
        .into_iter()
        .filter_map(|c| match c {
            RemoteCall::PutFile { path, branch, .. } => Some((path, branch)),
            _ => None,
        })
        .collect();
    assert_eq!(
        puts,
        vec![
            ("notes/trip.md".to_string(), "main".to_string()),
            ("notes/cat.png".to_string(), "main".to_string()),
        ]
    );
    assert!(repo.pull_requests().is_empty());
}

#[tokio::test]
async fn publish_one_always_commits_the_note() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "a.md", "same");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "a.md", "same");

    let report = publisher(&repo, vault.path())
        .publish_path("a.md")
        .await
        .expect("publish");
    assert_eq!(
        report.note,
        WriteOutcome::Updated {
            path: "a.md".to_string()
        }
    );
    assert!(report.assets.is_empty());
}

#[tokio::test]
async fn publish_path_outside_vault_is_rejected() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    let err = publisher(&repo, vault.path())
        .publish_path("missing.md")
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::NotInVault { ref path } if path == "missing.md"));
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn unpublish_removes_and_tolerates_absent_paths() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "old.md", "x");
    let publisher = publisher(&repo, vault.path());

    let removed = publisher.unpublish_one("/old.md").await.expect("unpublish");
    assert_eq!(
        removed,
        WriteOutcome::Deleted {
            path: "old.md".to_string()
        }
    );
    assert!(repo.file("main", "old.md").is_none());

    let again = publisher.unpublish_one("old.md").await.expect("unpublish");
    assert_eq!(
        again,
        WriteOutcome::Absent {
            path: "old.md".to_string()
        }
    );
}

#[tokio::test]
async fn publish_direct_commits_to_base_branch() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "old.md", "x");
    let publisher = publisher(&repo, vault.path());
    let progress = RecordingProgress::new();

    let batch = Batch::new(
        vec![FileRecord::text("b.md", "b"), FileRecord::text("a.md", "a")],
        vec!["old.md".to_string(), "never.md".to_string()],
    );
    let report = publisher.publish_direct(&batch, &progress).await.expect("direct");
    assert_eq!(report.committed(), 3);
    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(repo.file("main", "b.md").as_deref(), Some(b"b".as_slice()));
    assert!(repo.file("main", "old.md").is_none());
    assert!(!repo
        .writes()
        .iter()
        .any(|c| matches!(c, RemoteCall::CreateBranch { .. } | RemoteCall::OpenPullRequest { .. })));
    assert_eq!(
        progress.events().first(),
        Some(&ProgressEvent::Start {
            publishes: 2,
            deletes: 2
        })
    );
}

#[tokio::test]
async fn publish_direct_rejects_empty_batch() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    let err = publisher(&repo, vault.path())
        .publish_direct(&Batch::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::EmptyBatch));
}

#[tokio::test]
async fn diff_file_shows_vault_changes() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "a.md", "one\ntwo\n");
    write(vault.path(), "b.md", "same\n");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "a.md", "one\nthree\n");
    repo.seed_file("main", "b.md", "same\n");
    let publisher = publisher(&repo, vault.path());

    let diff = publisher.diff_file("a.md").await.expect("diff").expect("changed");
    assert!(diff.unified_diff.contains("-three"));
    assert!(diff.unified_diff.contains("+two"));
    assert!(publisher.diff_file("b.md").await.expect("diff").is_none());
}

#[tokio::test]
async fn check_connection_counts_entries() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "a.md", "a");
    repo.seed_file("main", "b.md", "b");
    assert_eq!(
        publisher(&repo, vault.path())
            .check_connection()
            .await
            .expect("check"),
        2
    );

    let missing = Arc::new(MemoryRepository::without_branches("main"));
    assert!(publisher(&missing, vault.path())
        .check_connection()
        .await
        .is_err());
}

#[tokio::test]
async fn invalid_configuration_is_rejected_up_front() {
    let vault = TempDir::new().expect("vault");
    let repo = Arc::new(MemoryRepository::new("main"));
    let config = PublishConfig {
        owner: "ada".to_string(),
        ..Default::default()
    };
    let err = Publisher::new(config, Arc::clone(&repo), Arc::new(FsVault::new(vault.path())))
        .err()
        .expect("missing repo and token");
    assert!(matches!(err, PublishError::ConfigInvalid(_)));
    assert!(repo.calls().is_empty());
}

#[tokio::test]
async fn non_utf8_note_does_not_abort_status() {
    let vault = TempDir::new().expect("vault");
    write(vault.path(), "ok.md", "fine");
    write(vault.path(), "legacy.md", [b'c', b'a', b'f', 0xE9]);
    let repo = Arc::new(MemoryRepository::new("main"));
    repo.seed_file("main", "legacy.md", vec![b'c', b'a', b'f', 0xE9]);

    let status = publisher(&repo, vault.path())
        .get_publish_status()
        .await
        .expect("status");
    let paths = |files: &[FileRecord]| files.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&status.new_files), vec!["ok.md"]);
    assert_eq!(paths(&status.unchanged_files), vec!["legacy.md"]);
}
