//! `flowershow status`: what a publish would change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flowershow_core::PublishStatus;

use super::{load_config, runtime, store_publisher, vault_root};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Vault directory; defaults to the working directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,

    /// Also list unchanged files.
    #[arg(long)]
    pub all: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let vault = vault_root(self.vault.as_deref())?;
        let branch = config.branch.clone();
        let publisher = store_publisher(config, &vault)?;
        let status = runtime()?
            .block_on(publisher.get_publish_status())
            .context("failed to compute publish status")?;

        if self.json {
            let payload = StatusJson::from(&status);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&status, &branch, self.all);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson {
    new: Vec<String>,
    changed: Vec<String>,
    unchanged: Vec<String>,
    deleted: Vec<String>,
    remote_truncated: bool,
}

impl From<&PublishStatus> for StatusJson {
    fn from(status: &PublishStatus) -> Self {
        let paths = |files: &[flowershow_core::FileRecord]| {
            files.iter().map(|f| f.path.clone()).collect::<Vec<_>>()
        };
        Self {
            new: paths(&status.new_files),
            changed: paths(&status.changed_files),
            unchanged: paths(&status.unchanged_files),
            deleted: status.deleted_paths.clone(),
            remote_truncated: status.remote_truncated,
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "state")]
    state: String,
}

fn rows(status: &PublishStatus, all: bool) -> Vec<StatusRow> {
    let mut rows = Vec::new();
    let mut push = |path: &str, state: String| {
        rows.push(StatusRow {
            path: path.to_string(),
            state,
        })
    };
    for f in &status.new_files {
        push(&f.path, "NEW".green().bold().to_string());
    }
    for f in &status.changed_files {
        push(&f.path, "CHANGED".yellow().bold().to_string());
    }
    for p in &status.deleted_paths {
        push(p, "DELETED".red().bold().to_string());
    }
    if all {
        for f in &status.unchanged_files {
            push(&f.path, "UNCHANGED".bright_black().to_string());
        }
    }
    rows
}

fn print_table(status: &PublishStatus, branch: &str, all: bool) {
    println!(
        "Flowershow v{} | {} new | {} changed | {} deleted | {} unchanged",
        env!("CARGO_PKG_VERSION"),
        status.new_files.len(),
        status.changed_files.len(),
        status.deleted_paths.len(),
        status.unchanged_files.len(),
    );
    if status.remote_truncated {
        println!(
            "{} the remote listing of '{branch}' was truncated; deletions are not shown",
            "!".yellow().bold()
        );
    }

    let rows = rows(status, all);
    if rows.is_empty() {
        println!("Everything is published.");
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if !status.is_up_to_date() {
        println!("Run 'flowershow publish' to publish these changes to '{branch}'.");
    }
}

#[cfg(test)]
mod tests {
    use flowershow_core::FileRecord;

    use super::*;

    fn status() -> PublishStatus {
        PublishStatus {
            new_files: vec![FileRecord::text("n.md", "n")],
            changed_files: vec![FileRecord::text("c.md", "c")],
            unchanged_files: vec![FileRecord::text("u.md", "u")],
            deleted_paths: vec!["d.md".to_string()],
            remote_truncated: false,
        }
    }

    #[test]
    fn unchanged_rows_only_with_all() {
        let paths = |rows: Vec<StatusRow>| rows.into_iter().map(|r| r.path).collect::<Vec<_>>();
        assert_eq!(paths(rows(&status(), false)), vec!["n.md", "c.md", "d.md"]);
        assert_eq!(
            paths(rows(&status(), true)),
            vec!["n.md", "c.md", "d.md", "u.md"]
        );
    }

    #[test]
    fn json_lists_every_category() {
        let json = serde_json::to_value(StatusJson::from(&status())).expect("json");
        assert_eq!(json["new"][0], "n.md");
        assert_eq!(json["deleted"][0], "d.md");
        assert_eq!(json["remote_truncated"], false);
    }
}
