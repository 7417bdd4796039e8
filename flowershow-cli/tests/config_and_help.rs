use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn flowershow_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flowershow"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("FLOWERSHOW_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_every_command() {
    let home = TempDir::new().expect("home");
    flowershow_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("status"))
        .stdout(contains("publish-note"))
        .stdout(contains("unpublish"))
        .stdout(contains("check"));
}

#[test]
fn config_init_then_show_masks_token() {
    let home = TempDir::new().expect("home");
    flowershow_cmd(home.path())
        .args([
            "config",
            "init",
            "--owner",
            "ada",
            "--repo",
            "garden",
            "--token",
            "ghp_secret1234",
            "--auto-merge",
        ])
        .assert()
        .success()
        .stdout(contains("config.yaml"));

    let saved = fs::read_to_string(home.path().join(".flowershow/config.yaml")).expect("config");
    assert!(saved.contains("owner: ada"));
    assert!(saved.contains("auto_merge: true"));

    flowershow_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("repo: garden"))
        .stdout(contains("1234"))
        .stdout(contains("ghp_secret").not());
}

#[test]
fn config_init_refuses_to_overwrite() {
    let home = TempDir::new().expect("home");
    let init = |extra: &[&str]| {
        let mut cmd = flowershow_cmd(home.path());
        cmd.args(["config", "init", "--owner", "ada", "--repo", "garden"])
            .args(extra);
        cmd
    };
    init(&[]).assert().success();
    init(&[]).assert().failure().stderr(contains("--force"));
    init(&["--force"]).assert().success();
}

#[test]
fn commands_need_a_config() {
    let home = TempDir::new().expect("home");
    flowershow_cmd(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("flowershow config init"));
}

#[test]
fn check_rejects_incomplete_config_without_network() {
    let home = TempDir::new().expect("home");
    flowershow_cmd(home.path())
        .args(["config", "init", "--owner", "ada", "--repo", "garden"])
        .assert()
        .success()
        .stdout(contains("token"));

    flowershow_cmd(home.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("invalid configuration"));
}

#[test]
fn token_can_come_from_the_environment() {
    let home = TempDir::new().expect("home");
    flowershow_cmd(home.path())
        .args(["config", "init", "--owner", "ada", "--repo", "garden"])
        .assert()
        .success();

    flowershow_cmd(home.path())
        .env("FLOWERSHOW_TOKEN", "env_token_9876")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("9876"))
        .stdout(contains("env_token").not());
}
