//! Path exclusion by regex.

use regex::Regex;

use flowershow_core::config::DEFAULT_EXCLUDE;
use flowershow_core::{ConfigError, PublishConfig};

/// Compiled exclusion patterns. A path matching any of them never enters
/// the diff, on either side.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    patterns: Vec<Regex>,
}

impl ExcludeFilter {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    pub fn from_config(config: &PublishConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.exclude_regexes()?))
    }

    /// Only the built-in drawing-file pattern.
    pub fn default_patterns() -> Self {
        Self::from_config(&PublishConfig::default()).unwrap_or_else(|_| {
            tracing::warn!("built-in exclude pattern `{DEFAULT_EXCLUDE}` failed to compile");
            Self::default()
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("drawing.excalidraw", true)]
    #[case("notes/drawing.excalidraw.md", true)]
    #[case("notes/a.excalidraw.excalidraw", true)]
    #[case("notes/excalidraw-tips.md", false)]
    #[case("notes/a.md", false)]
    fn default_pattern(#[case] path: &str, #[case] excluded: bool) {
        assert_eq!(ExcludeFilter::default_patterns().is_excluded(path), excluded);
    }

    #[test]
    fn empty_filter_excludes_nothing() {
        let filter = ExcludeFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.is_excluded("anything.excalidraw"));
    }

    #[test]
    fn custom_patterns_from_config() {
        let config = PublishConfig {
            exclude_patterns: vec!["^private/".to_string(), r"\.tmp$".to_string()],
            ..Default::default()
        };
        let filter = ExcludeFilter::from_config(&config).expect("compile");
        assert!(filter.is_excluded("private/diary.md"));
        assert!(filter.is_excluded("x.tmp"));
        assert!(!filter.is_excluded("public/private.md"));
    }
}
