//! Coverage profile filtering.
//!
//! Go coverage profiles attribute counts to files by module path. Some of
//! the tree (test scaffolding, debug helpers) is deliberately excluded
//! from coverage accounting: this module drops profile lines whose
//! subject file matches a configured ignore glob, leaving the rest of the
//! profile byte-for-byte intact and in order.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Computes the concrete set of files (relative to `module_root`)
/// matching any of the ignore globs.
pub fn resolve_ignores(module_root: &Path, globs: &[String]) -> Result<HashSet<PathBuf>> {
    let mut ignored = HashSet::new();
    for pattern in globs {
        let absolute = module_root.join(pattern);
        let pattern = absolute
            .to_str()
            .ok_or_else(|| Error::Config(format!("non-UTF-8 ignore pattern: {:?}", absolute)))?;
        let paths = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("bad ignore glob {:?}: {}", pattern, e)))?;
        for path in paths {
            let path = path.map_err(|e| Error::Io(e.into_error()))?;
            if path.is_file() {
                if let Ok(relative) = path.strip_prefix(module_root) {
                    ignored.insert(relative.to_path_buf());
                }
            }
        }
    }
    Ok(ignored)
}

/// Rewrites the profile at `profile_path` in place, dropping lines whose
/// subject path (stripped of the `module` prefix) is in the ignore set.
///
/// The first line is the mode header and always kept. Output is written
/// to a temporary file in the profile's directory and atomically renamed
/// over the original, so a failure mid-write leaves the profile intact.
/// A body line without a `:` delimiter is an upstream format violation
/// and fails fatally before anything is replaced.
pub fn filter_profile(
    profile_path: &Path,
    module: &str,
    module_root: &Path,
    globs: &[String],
) -> Result<()> {
    let ignored = resolve_ignores(module_root, globs)?;
    let module_prefix = format!("{}/", module);

    let reader = BufReader::new(std::fs::File::open(profile_path)?);
    let dir = profile_path
        .parent()
        .ok_or_else(|| Error::Config(format!("profile has no parent: {:?}", profile_path)))?;
    let mut output = tempfile::NamedTempFile::new_in(dir)?;

    let mut kept = 0usize;
    let mut dropped = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if index == 0 {
            // Mode header passes through untouched.
            writeln!(output, "{}", line)?;
            continue;
        }
        let subject = line
            .split_once(':')
            .map(|(subject, _)| subject)
            .ok_or_else(|| Error::ProfileParse {
                line: index + 1,
                content: line.clone(),
            })?;

        let relative = subject.strip_prefix(&module_prefix).unwrap_or(subject);
        if ignored.contains(Path::new(relative)) {
            dropped += 1;
            continue;
        }
        writeln!(output, "{}", line)?;
        kept += 1;
    }

    output.flush()?;
    output
        .persist(profile_path)
        .map_err(|e| Error::Io(e.error))?;

    tracing::info!(kept, dropped, profile = ?profile_path, "filtered coverage profile");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODULE: &str = "example.com/project";

    fn module_fixture() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        for relative in [
            "pkg/a.go",
            "pkg/b.go",
            "internal/testing/require/call.go",
            "libs/debug/stack.go",
        ] {
            let path = dir.path().join(relative);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, "package x\n").expect("write");
        }
        dir
    }

    fn write_profile(dir: &Path, lines: &[&str]) -> PathBuf {
        let path = dir.join("coverage.out");
        std::fs::write(&path, lines.join("\n") + "\n").expect("write profile");
        path
    }

    #[test]
    fn resolve_ignores_expands_globs_to_files() {
        let root = module_fixture();
        let ignored = resolve_ignores(
            root.path(),
            &["internal/testing/**/*.go".to_string(), "libs/debug/*.go".to_string()],
        )
        .expect("resolve");

        assert!(ignored.contains(Path::new("internal/testing/require/call.go")));
        assert!(ignored.contains(Path::new("libs/debug/stack.go")));
        assert!(!ignored.contains(Path::new("pkg/a.go")));
    }

    #[test]
    fn filter_drops_matching_lines_and_preserves_order() {
        let root = module_fixture();
        let profile = write_profile(
            root.path(),
            &[
                "mode: atomic",
                "example.com/project/pkg/a.go:3.10,5.2 1 1",
                "example.com/project/internal/testing/require/call.go:7.1,9.2 2 0",
                "example.com/project/pkg/b.go:3.10,5.2 1 0",
                "example.com/project/libs/debug/stack.go:11.1,14.2 3 1",
                "example.com/project/pkg/a.go:8.1,10.2 1 1",
            ],
        );

        filter_profile(
            &profile,
            MODULE,
            root.path(),
            &["internal/testing/**/*.go".to_string(), "libs/debug/*.go".to_string()],
        )
        .expect("filter");

        let out = std::fs::read_to_string(&profile).expect("read");
        assert_eq!(
            out,
            "mode: atomic\n\
             example.com/project/pkg/a.go:3.10,5.2 1 1\n\
             example.com/project/pkg/b.go:3.10,5.2 1 0\n\
             example.com/project/pkg/a.go:8.1,10.2 1 1\n"
        );
    }

    #[test]
    fn filter_without_globs_keeps_everything() {
        let root = module_fixture();
        let lines = [
            "mode: set",
            "example.com/project/pkg/a.go:3.10,5.2 1 1",
            "example.com/project/pkg/b.go:3.10,5.2 1 0",
        ];
        let profile = write_profile(root.path(), &lines);

        filter_profile(&profile, MODULE, root.path(), &[]).expect("filter");

        let out = std::fs::read_to_string(&profile).expect("read");
        assert_eq!(out, lines.join("\n") + "\n");
    }

    #[test]
    fn malformed_line_fails_and_leaves_profile_untouched() {
        let root = module_fixture();
        let lines = [
            "mode: atomic",
            "example.com/project/pkg/a.go:3.10,5.2 1 1",
            "this line has no delimiter",
        ];
        let profile = write_profile(root.path(), &lines);
        let before = std::fs::read_to_string(&profile).expect("read before");

        let err = filter_profile(&profile, MODULE, root.path(), &[]).unwrap_err();

        match err {
            Error::ProfileParse { line, content } => {
                assert_eq!(line, 3);
                assert_eq!(content, "this line has no delimiter");
            }
            other => panic!("expected ProfileParse, got {:?}", other),
        }
        let after = std::fs::read_to_string(&profile).expect("read after");
        assert_eq!(before, after);
    }

    #[test]
    fn header_is_kept_even_when_it_lacks_a_delimiter_subject() {
        let root = module_fixture();
        // A profile consisting of only the header.
        let profile = write_profile(root.path(), &["mode: count"]);

        filter_profile(&profile, MODULE, root.path(), &["pkg/*.go".to_string()])
            .expect("filter");

        assert_eq!(
            std::fs::read_to_string(&profile).expect("read"),
            "mode: count\n"
        );
    }

    #[test]
    fn subjects_outside_the_module_prefix_are_kept() {
        let root = module_fixture();
        let profile = write_profile(
            root.path(),
            &[
                "mode: atomic",
                "other.example.com/dep/pkg/a.go:1.1,2.2 1 1",
            ],
        );

        filter_profile(&profile, MODULE, root.path(), &["pkg/*.go".to_string()])
            .expect("filter");

        let out = std::fs::read_to_string(&profile).expect("read");
        assert!(out.contains("other.example.com/dep/pkg/a.go"));
    }
}
