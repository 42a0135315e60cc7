//! Ignore pattern matching for sync operations.
//!
//! Combines constructor-supplied base patterns with a workspace-local
//! `.syncignore` file, using gitignore semantics: later rules win, `!`
//! re-includes paths excluded by earlier ones.

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the workspace-local pattern file, re-read after each pull.
pub const WORKSPACE_IGNORE_FILE: &str = ".syncignore";

/// Gitignore-style filter shared by remote listing, local cleanup, and
/// push-side scanning, so all three sides exclude the same paths.
#[derive(Debug)]
pub struct IgnoreFilter {
    root: PathBuf,
    base_patterns: Vec<String>,
    matcher: Gitignore,
}

impl IgnoreFilter {
    /// Build a filter rooted at `root` from the given base patterns.
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self> {
        let matcher = build_matcher(root, patterns, None)?;
        Ok(Self {
            root: root.to_path_buf(),
            base_patterns: patterns.to_vec(),
            matcher,
        })
    }

    /// Check whether a workspace-relative path should be excluded from sync.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(relative_path, is_dir)
            .is_ignore()
    }

    /// Re-read the workspace pattern file and layer its rules on top of the
    /// base patterns. A missing file leaves only the base patterns active;
    /// the re-read is idempotent.
    pub fn load_workspace(&mut self) -> Result<()> {
        let path = self.root.join(WORKSPACE_IGNORE_FILE);
        let workspace_file = path.is_file().then_some(path);
        self.matcher = build_matcher(&self.root, &self.base_patterns, workspace_file.as_deref())?;
        Ok(())
    }

    /// Base patterns supplied at construction.
    pub fn base_patterns(&self) -> &[String] {
        &self.base_patterns
    }
}

fn build_matcher(
    root: &Path,
    patterns: &[String],
    workspace_file: Option<&Path>,
) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);

    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
    }

    // Workspace rules come after the base patterns so they take precedence.
    if let Some(file) = workspace_file {
        if let Some(err) = builder.add(file) {
            warn!(
                file = %file.display(),
                error = %err,
                "Skipping unparseable workspace ignore rules"
            );
        }
    }

    builder.build().context("Failed to build ignore matcher")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter(patterns: &[&str]) -> IgnoreFilter {
        let dir = TempDir::new().unwrap();
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        IgnoreFilter::new(dir.path(), &patterns).unwrap()
    }

    #[test]
    fn test_base_patterns() {
        let filter = filter(&["*.log", "node_modules/"]);

        assert_eq!(filter.base_patterns().len(), 2);
        assert!(filter.is_ignored("debug.log", false));
        assert!(filter.is_ignored("sub/dir/trace.log", false));
        assert!(filter.is_ignored("node_modules", true));
        assert!(filter.is_ignored("node_modules/pkg/index.js", false));

        assert!(!filter.is_ignored("src/main.rs", false));
        assert!(!filter.is_ignored("README.md", false));
    }

    #[test]
    fn test_negation_reincludes() {
        let filter = filter(&["*.log", "!keep.log"]);

        assert!(filter.is_ignored("debug.log", false));
        assert!(!filter.is_ignored("keep.log", false));
    }

    #[test]
    fn test_workspace_rules_layer_on_top() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(WORKSPACE_IGNORE_FILE), "*.tmp\n!pin.tmp\n").unwrap();

        let base = vec!["*.log".to_string()];
        let mut filter = IgnoreFilter::new(dir.path(), &base).unwrap();

        // Workspace file not loaded yet
        assert!(!filter.is_ignored("scratch.tmp", false));

        filter.load_workspace().unwrap();

        assert!(filter.is_ignored("debug.log", false));
        assert!(filter.is_ignored("scratch.tmp", false));
        assert!(!filter.is_ignored("pin.tmp", false));
    }

    #[test]
    fn test_load_workspace_without_file_keeps_base() {
        let dir = TempDir::new().unwrap();
        let base = vec!["*.log".to_string()];
        let mut filter = IgnoreFilter::new(dir.path(), &base).unwrap();

        filter.load_workspace().unwrap();

        assert!(filter.is_ignored("debug.log", false));
        assert!(!filter.is_ignored("notes.txt", false));
    }
}
