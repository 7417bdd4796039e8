//! Unified diff between a vault file and its published copy.

use similar::TextDiff;

/// A rendered diff for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
}

/// Unified diff of `remote` → `local` for `path`, or `None` if identical.
///
/// A missing remote copy diffs against the empty string. Content that is
/// not UTF-8 on either side yields a one-line binary notice.
pub fn diff_contents(path: &str, remote: Option<&[u8]>, local: &[u8]) -> Option<FileDiff> {
    let remote = remote.unwrap_or_default();
    if remote == local {
        return None;
    }
    let (Ok(old), Ok(new)) = (std::str::from_utf8(remote), std::str::from_utf8(local)) else {
        return Some(FileDiff {
            path: path.to_string(),
            unified_diff: format!("Binary files a/{path} and b/{path} differ\n"),
        });
    };
    let old = normalize_line_endings(old);
    let new = normalize_line_endings(new);
    if old == new {
        return None;
    }
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    let unified = TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();
    Some(FileDiff {
        path: path.to_string(),
        unified_diff: unified,
    })
}

fn normalize_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n")
}
