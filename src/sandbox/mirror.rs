//! Symlink mirroring of the source tree into the sandbox.
//!
//! The sandbox reproduces the source layout without copying content:
//! directories are created for real, files become symlinks whose targets
//! are absolute paths into the source root. Mirroring is idempotent
//! (first writer wins) and fails fast on any filesystem error, so the
//! caller can treat sandbox construction as atomic.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Selects which files of the source tree are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelector {
    /// Every regular file with a recognized source extension (`.go`).
    GoSources,
    /// Test-only artifacts: `*_test.go` files and anything under a
    /// `testdata` directory. These are not shipped but must be present
    /// for the test run.
    TestArtifacts,
}

impl FileSelector {
    /// Returns true when `relative` (a file path below the source root)
    /// is selected.
    pub fn matches(self, relative: &Path) -> bool {
        match self {
            Self::GoSources => relative.extension().is_some_and(|ext| ext == "go"),
            Self::TestArtifacts => {
                let is_test_file = relative
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with("_test.go"));
                let in_testdata = relative
                    .components()
                    .any(|c| c.as_os_str() == "testdata");
                is_test_file || in_testdata
            }
        }
    }
}

/// Mirrors all files selected by `selectors` from `source_root` into
/// `dest_root`, in selector order.
///
/// Hidden entries (dot-prefixed components) are never traversed. Entries
/// already present in the destination are skipped, so repeated mirroring
/// of an overlapping selector set is a no-op.
pub fn mirror_tree(source_root: &Path, dest_root: &Path, selectors: &[FileSelector]) -> Result<()> {
    let source_root = source_root
        .canonicalize()
        .map_err(|e| Error::Construction(format!("bad source root: {}", e)))?;

    for &selector in selectors {
        let mut linked = 0usize;
        for entry in WalkDir::new(&source_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        {
            let entry = entry.map_err(|e| Error::Construction(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&source_root)
                .map_err(|e| Error::Construction(e.to_string()))?;
            if !selector.matches(relative) {
                continue;
            }

            if link_entry(entry.path(), &dest_root.join(relative))? {
                linked += 1;
            }
        }
        tracing::debug!(?selector, linked, "mirrored selector pass");
    }

    Ok(())
}

/// Creates one symlink at `dest` pointing to the absolute `source`,
/// creating intermediate directories as needed. Returns false when an
/// entry already exists at `dest`.
fn link_entry(source: &Path, dest: &Path) -> Result<bool> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // symlink_metadata: a pre-existing link must count as present even if
    // its target is gone.
    if dest.symlink_metadata().is_ok() {
        return Ok(false);
    }
    std::os::unix::fs::symlink(source, dest)?;
    Ok(true)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, format!("// {}\n", relative)).expect("write");
    }

    #[test]
    fn go_selector_matches_sources_only() {
        assert!(FileSelector::GoSources.matches(Path::new("pkg/a.go")));
        assert!(FileSelector::GoSources.matches(Path::new("pkg/a_test.go")));
        assert!(!FileSelector::GoSources.matches(Path::new("go.mod")));
        assert!(!FileSelector::GoSources.matches(Path::new("README.md")));
    }

    #[test]
    fn test_selector_matches_tests_and_fixtures() {
        assert!(FileSelector::TestArtifacts.matches(Path::new("pkg/a_test.go")));
        assert!(FileSelector::TestArtifacts.matches(Path::new("pkg/testdata/fixture.json")));
        assert!(!FileSelector::TestArtifacts.matches(Path::new("pkg/a.go")));
    }

    #[test]
    fn mirror_links_every_selected_file_at_same_relative_path() {
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        touch(source.path(), "pkg/a.go");
        touch(source.path(), "pkg/sub/b.go");
        touch(source.path(), "pkg/a_test.go");
        touch(source.path(), "README.md");

        mirror_tree(
            source.path(),
            dest.path(),
            &[FileSelector::TestArtifacts, FileSelector::GoSources],
        )
        .expect("mirror");

        for relative in ["pkg/a.go", "pkg/sub/b.go", "pkg/a_test.go"] {
            let link = dest.path().join(relative);
            let meta = link.symlink_metadata().expect("entry exists");
            assert!(meta.file_type().is_symlink(), "{} is a symlink", relative);

            let target = std::fs::read_link(&link).expect("read link");
            assert!(target.is_absolute());
            assert_eq!(
                target,
                source.path().canonicalize().expect("canon").join(relative)
            );
        }

        // Unselected files do not appear.
        assert!(!dest.path().join("README.md").exists());
        // Directories are real directories, not links.
        assert!(!dest
            .path()
            .join("pkg")
            .symlink_metadata()
            .expect("pkg")
            .file_type()
            .is_symlink());
    }

    #[test]
    fn mirror_is_idempotent() {
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        touch(source.path(), "pkg/a.go");
        touch(source.path(), "pkg/a_test.go");

        let selectors = [FileSelector::TestArtifacts, FileSelector::GoSources];
        mirror_tree(source.path(), dest.path(), &selectors).expect("first mirror");
        mirror_tree(source.path(), dest.path(), &selectors).expect("second mirror");

        assert!(dest.path().join("pkg/a.go").symlink_metadata().is_ok());
    }

    #[test]
    fn mirror_skips_preexisting_entries() {
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        touch(source.path(), "pkg/a.go");

        // A materialized file occupies the slot before mirroring runs.
        touch(dest.path(), "pkg/a.go");

        mirror_tree(source.path(), dest.path(), &[FileSelector::GoSources]).expect("mirror");

        let meta = dest.path().join("pkg/a.go").symlink_metadata().expect("meta");
        assert!(!meta.file_type().is_symlink(), "first writer wins");
    }

    #[test]
    fn mirror_ignores_hidden_directories() {
        let source = TempDir::new().expect("source");
        let dest = TempDir::new().expect("dest");
        touch(source.path(), ".git/objects/pack.go");
        touch(source.path(), "pkg/a.go");

        mirror_tree(source.path(), dest.path(), &[FileSelector::GoSources]).expect("mirror");

        assert!(!dest.path().join(".git").exists());
        assert!(dest.path().join("pkg/a.go").symlink_metadata().is_ok());
    }

    #[test]
    fn mirror_fails_on_missing_source_root() {
        let dest = TempDir::new().expect("dest");
        let err = mirror_tree(
            Path::new("/nonexistent/gauntlet/source"),
            dest.path(),
            &[FileSelector::GoSources],
        )
        .unwrap_err();

        assert!(matches!(err, Error::Construction(_)));
    }
}
