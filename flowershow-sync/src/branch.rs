//! Working branch naming.

use chrono::{DateTime, Utc};

/// Prefix of every generated working branch.
pub const BRANCH_PREFIX: &str = "flowershow/publish-";

/// Highest numeric suffix probed before giving up on a name.
pub const MAX_SUFFIX: u32 = 20;

/// `flowershow/publish-<YYYYMMDDHHMMSS>` for `now`.
pub fn default_branch_name(now: DateTime<Utc>) -> String {
    format!("{BRANCH_PREFIX}{}", now.format("%Y%m%d%H%M%S"))
}

/// Turn a caller hint into a valid ref name, or `None` if nothing usable
/// remains.
///
/// Characters git refuses in ref names become `-`; runs of `/` and `.`
/// are collapsed and stripped from both ends.
pub fn sanitize_branch_name(hint: &str) -> Option<String> {
    let mut out = String::with_capacity(hint.len());
    for c in hint.trim().chars() {
        let c = match c {
            c if c.is_control() || c.is_whitespace() => '-',
            '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '@' | '{' | '}' => '-',
            c => c,
        };
        let last = out.chars().last();
        if (c == '/' || c == '.') && last == Some(c) {
            continue;
        }
        out.push(c);
    }
    let out = out
        .trim_matches(|c| c == '/' || c == '.' || c == '-')
        .trim_end_matches(".lock")
        .to_string();
    (!out.is_empty()).then_some(out)
}

/// `base` for the first attempt, `base-N` after that.
pub fn candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).single().expect("time");
        assert_eq!(default_branch_name(now), "flowershow/publish-20240309070501");
    }

    #[rstest]
    #[case("my notes", Some("my-notes"))]
    #[case("/feature//x/", Some("feature/x"))]
    #[case("a..b", Some("a.b"))]
    #[case("weird~^:name", Some("weird---name"))]
    #[case("release.lock", Some("release"))]
    #[case("  ", None)]
    #[case("///", None)]
    fn sanitize(#[case] hint: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_branch_name(hint).as_deref(), expected);
    }

    #[test]
    fn candidates_add_numeric_suffix() {
        assert_eq!(candidate("b", 1), "b");
        assert_eq!(candidate("b", 2), "b-2");
        assert_eq!(candidate("b", 3), "b-3");
    }
}
