//! Local vault access.
//!
//! The publish core only sees vault-relative, forward-slash paths. A
//! [`Vault`] lists them, reads them into [`FileRecord`]s and resolves
//! note-relative links to vault paths.

use std::path::{Path, PathBuf};

use flowershow_core::{normalize_path, FileRecord};

use crate::error::{vault_err, PublishError};

/// Extensions read as UTF-8 text; everything else is read as bytes.
pub const TEXT_EXTENSIONS: &[&str] = &["md", "mdx", "json", "yaml", "yml", "css"];

/// Read-only view of a document tree.
pub trait Vault: Send + Sync {
    /// Every publishable path, sorted.
    fn list_paths(&self) -> Result<Vec<String>, PublishError>;

    /// Read one file; fails with `NotInVault` if it does not exist.
    fn read(&self, path: &str) -> Result<FileRecord, PublishError>;

    /// Resolve a link found in `from` to an existing vault path.
    fn resolve_link(&self, link: &str, from: &str) -> Option<String>;
}

/// `true` if `path` is read as text.
pub fn is_text_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// A vault rooted at a directory on disk.
///
/// Dot-directories and dot-files (`.obsidian`, `.git`, `.trash`) are skipped.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> Result<(), PublishError> {
        let entries = std::fs::read_dir(dir).map_err(|e| vault_err(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| vault_err(dir, e))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| vault_err(&path, e))?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    out.push(normalize_path(&relative.to_string_lossy()));
                }
            }
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        !path.is_empty()
            && !path.split('/').any(|s| s == "..")
            && self.root.join(path).is_file()
    }
}

impl Vault for FsVault {
    fn list_paths(&self) -> Result<Vec<String>, PublishError> {
        let mut out = Vec::new();
        self.walk(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn read(&self, path: &str) -> Result<FileRecord, PublishError> {
        let path = normalize_path(path);
        let full = self.root.join(&path);
        if !full.is_file() {
            return Err(PublishError::NotInVault { path });
        }
        let bytes = std::fs::read(&full).map_err(|e| vault_err(&full, e))?;
        if !is_text_path(&path) {
            return Ok(FileRecord::binary(path, bytes));
        }
        match String::from_utf8(bytes) {
            Ok(text) => Ok(FileRecord::text(path, text)),
            Err(err) => {
                tracing::warn!("{path} is not valid UTF-8, publishing it as binary");
                Ok(FileRecord::binary(path, err.into_bytes()))
            }
        }
    }

    fn resolve_link(&self, link: &str, from: &str) -> Option<String> {
        let link = normalize_path(link.split('#').next().unwrap_or(link).trim());
        if link.is_empty() {
            return None;
        }

        // 1. relative to the linking note
        let from_dir = Path::new(from).parent().unwrap_or(Path::new(""));
        let relative = join_normalized(from_dir, &link);
        if let Some(relative) = relative.filter(|p| self.exists(p)) {
            return Some(relative);
        }

        // 2. from the vault root
        if self.exists(&link) {
            return Some(link);
        }

        // 3. shortest vault path with the same file name
        let file_name = link.rsplit('/').next()?;
        let mut candidates: Vec<String> = self
            .list_paths()
            .ok()?
            .into_iter()
            .filter(|p| p.rsplit('/').next() == Some(file_name))
            .collect();
        candidates.sort_by_key(|p| (p.matches('/').count(), p.clone()));
        candidates.into_iter().next()
    }
}

/// `base/link` with `.` and `..` folded; `None` if it escapes the root.
fn join_normalized(base: &Path, link: &str) -> Option<String> {
    let mut parts: Vec<String> = base
        .to_string_lossy()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    for segment in link.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other.to_string()),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use flowershow_core::FileKind;

    fn vault() -> (TempDir, FsVault) {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("notes/img")).expect("mkdir");
        fs::create_dir_all(root.join(".obsidian")).expect("mkdir");
        fs::create_dir_all(root.join("assets")).expect("mkdir");
        fs::write(root.join("index.md"), "# Home").expect("write");
        fs::write(root.join("notes/a.md"), "a").expect("write");
        fs::write(root.join("notes/img/cat.png"), [0x89u8, 0x50]).expect("write");
        fs::write(root.join("assets/logo.svg"), "<svg/>").expect("write");
        fs::write(root.join(".obsidian/app.json"), "{}").expect("write");
        let vault = FsVault::new(root);
        (dir, vault)
    }

    #[test]
    fn list_skips_dot_dirs_and_sorts() {
        let (_dir, vault) = vault();
        assert_eq!(
            vault.list_paths().expect("list"),
            vec!["assets/logo.svg", "index.md", "notes/a.md", "notes/img/cat.png"]
        );
    }

    #[test]
    fn non_utf8_markdown_is_read_as_binary() {
        let (dir, vault) = vault();
        let latin1 = [b'c', b'a', b'f', 0xE9];
        fs::write(dir.path().join("notes/legacy.md"), latin1).expect("write");

        let file = vault.read("notes/legacy.md").expect("read");
        assert_eq!(file.kind, FileKind::Binary);
        assert_eq!(file.content, latin1);
    }

    #[test]
    fn read_classifies_by_extension() {
        let (_dir, vault) = vault();
        assert_eq!(vault.read("notes/a.md").expect("read").kind, FileKind::Text);
        assert_eq!(vault.read("/notes/img/cat.png").expect("read").kind, FileKind::Binary);
        assert!(matches!(
            vault.read("missing.md"),
            Err(PublishError::NotInVault { .. })
        ));
    }

    #[test]
    fn resolve_relative_then_root_then_basename() {
        let (_dir, vault) = vault();
        assert_eq!(
            vault.resolve_link("img/cat.png", "notes/a.md").as_deref(),
            Some("notes/img/cat.png")
        );
        assert_eq!(
            vault.resolve_link("assets/logo.svg", "notes/a.md").as_deref(),
            Some("assets/logo.svg")
        );
        assert_eq!(
            vault.resolve_link("cat.png", "index.md").as_deref(),
            Some("notes/img/cat.png")
        );
        assert_eq!(
            vault.resolve_link("../assets/logo.svg", "notes/a.md").as_deref(),
            Some("assets/logo.svg")
        );
        assert_eq!(vault.resolve_link("nope.png", "index.md"), None);
    }

    #[test]
    fn join_refuses_to_escape_root() {
        assert_eq!(join_normalized(Path::new(""), "../x.png"), None);
        assert_eq!(
            join_normalized(Path::new("a/b"), "./../c.png").as_deref(),
            Some("a/c.png")
        );
    }

    #[test]
    fn text_extensions() {
        assert!(is_text_path("a.MD"));
        assert!(is_text_path("styles/custom.css"));
        assert!(!is_text_path("img.png"));
        assert!(!is_text_path("README"));
    }
}
