//! Include/exclude patterns for watched documents
//!
//! Patterns use gitignore glob syntax (`*.md`, `**/drafts/*.txt`, `notes.*.md`).
//! A pattern without a slash matches a name at any depth. A path is excluded
//! when it or any of its parent directories matches an exclude pattern.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Decides which paths under the root count as documents
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Gitignore,
    exclude: Gitignore,
}

impl PathFilter {
    /// Build a filter from root-relative patterns.
    ///
    /// An empty include list admits every file name. Invalid patterns are
    /// logged and skipped.
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: build_matcher(include),
            exclude: build_matcher(exclude),
        }
    }

    /// True if the root-relative path or one of its parents is excluded
    pub fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        self.exclude
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }

    /// True if the root-relative file path matches an include pattern
    pub fn is_included(&self, relative: &Path) -> bool {
        if self.include.is_empty() {
            return true;
        }
        if relative.file_name().is_none() {
            return false;
        }

        self.include
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }

    /// True if the root-relative file path is a watched document
    pub fn matches(&self, relative: &Path) -> bool {
        !self.is_excluded(relative, false) && self.is_included(relative)
    }
}

fn build_matcher(patterns: &[String]) -> Gitignore {
    // Root "." keeps relative paths as given
    let mut builder = GitignoreBuilder::new(".");
    for pattern in patterns {
        if let Err(e) = builder.add_line(None, pattern) {
            tracing::warn!("Ignoring invalid watch pattern '{}': {}", pattern, e);
        }
    }

    builder.build().unwrap_or_else(|e| {
        tracing::warn!("Failed to build watch patterns: {}", e);
        Gitignore::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::config::WatchConfig;

    fn default_filter() -> PathFilter {
        let config = WatchConfig::default();
        PathFilter::new(&config.include, &config.exclude)
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_default_includes_documents() {
        let filter = default_filter();

        assert!(filter.matches(Path::new("notes.md")));
        assert!(filter.matches(Path::new("book/chapter-1.markdown")));
        assert!(filter.matches(Path::new("todo.txt")));
        assert!(filter.matches(Path::new("essay.folio")));
        assert!(!filter.matches(Path::new("image.png")));
        assert!(!filter.matches(Path::new("md")));
    }

    #[test]
    fn test_default_excludes_hidden_and_metadata() {
        let filter = default_filter();

        assert!(!filter.matches(Path::new(".hidden.md")));
        assert!(!filter.matches(Path::new(".obsidian/workspace.md")));
        assert!(!filter.matches(Path::new(".folio/recovery/abc.txt")));
        assert!(!filter.matches(Path::new("notes/.trash/old.md")));
    }

    #[test]
    fn test_prefix_and_exact_patterns() {
        let filter = PathFilter::new(&patterns(&["*"]), &patterns(&["node_modules", "tmp*"]));

        assert!(filter.matches(Path::new("src/readme")));
        assert!(!filter.matches(Path::new("node_modules/pkg/readme.md")));
        assert!(!filter.matches(Path::new("tmp-output/a.md")));
        assert!(filter.matches(Path::new("not_tmp/a.md")));
    }

    #[test]
    fn test_empty_include_admits_everything() {
        let filter = PathFilter::new(&[], &patterns(&[".*"]));

        assert!(filter.matches(Path::new("anything.bin")));
        assert!(!filter.matches(Path::new(".git/config")));
    }

    #[test]
    fn test_multiple_wildcards_in_one_pattern() {
        let filter = PathFilter::new(&patterns(&["*.draft.*"]), &[]);

        assert!(filter.is_included(Path::new("notes.draft.md")));
        assert!(filter.is_included(Path::new("book/ch1.draft.txt")));
        assert!(!filter.is_included(Path::new("notes.md")));
    }

    #[test]
    fn test_double_star_patterns() {
        let filter = PathFilter::new(&patterns(&["**/*.md"]), &patterns(&["archive/**"]));

        assert!(filter.matches(Path::new("book/ch1.md")));
        assert!(filter.matches(Path::new("a/b/c/deep.md")));
        assert!(filter.matches(Path::new("top.md")));
        assert!(!filter.matches(Path::new("archive/old.md")));
        assert!(!filter.matches(Path::new("book/ch1.txt")));
    }

    #[test]
    fn test_directory_only_exclude() {
        let filter = PathFilter::new(&[], &patterns(&["build/"]));

        assert!(filter.is_excluded(Path::new("build"), true));
        assert!(!filter.is_excluded(Path::new("build"), false));
        assert!(filter.is_excluded(Path::new("build/out.md"), false));
    }
}
