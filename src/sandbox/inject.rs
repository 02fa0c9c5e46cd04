//! Bootstrap injection into the sandbox copy of one designated file.
//!
//! The injected payload's `init` prints the run identifier before any
//! other test output, which is how the output relay finds the boundary
//! between toolchain noise and real test output. The whole pipeline
//! therefore depends on the payload landing exactly once, directly after
//! the file's package clause.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Placeholder substituted by the run identifier in the payload.
pub const RUN_ID_PLACEHOLDER: &str = "{run_id}";

/// Structural position at which the payload is inserted.
///
/// Insertion points are matched by a minimal token parse of each line,
/// not by substring search, so a marker appearing inside a comment or a
/// string literal cannot trigger injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionPoint {
    /// Immediately after the file's package clause
    /// (`package <identifier>`).
    PackageClause,
}

impl InsertionPoint {
    /// Returns true when `line` is the structural boundary this variant
    /// names.
    pub fn matches(self, line: &str) -> bool {
        match self {
            Self::PackageClause => {
                let mut tokens = line.split_whitespace();
                tokens.next() == Some("package")
                    && tokens
                        .next()
                        .is_some_and(|ident| ident.chars().all(|c| c.is_alphanumeric() || c == '_'))
            }
        }
    }
}

/// Copies `source` to `dest` line by line, emitting `payload` (with the
/// run-id placeholder substituted) immediately after the first line
/// matching `point`. Later matches are copied verbatim.
///
/// A file with no insertion point is a fatal construction error: the
/// sandbox would silently produce output the relay can never anchor on.
pub fn inject(
    source: &Path,
    dest: &Path,
    point: InsertionPoint,
    payload: &str,
    run_id: &str,
) -> Result<()> {
    let reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(dest)?);

    let mut injected = false;
    for line in reader.lines() {
        let line = line?;
        writeln!(writer, "{}", line)?;
        if !injected && point.matches(&line) {
            writer.write_all(payload.replace(RUN_ID_PLACEHOLDER, run_id).as_bytes())?;
            injected = true;
        }
    }
    writer.flush()?;

    if !injected {
        return Err(Error::InsertionPointMissing {
            file: source.to_path_buf(),
        });
    }

    tracing::debug!(source = ?source, dest = ?dest, "injected bootstrap payload");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAYLOAD: &str = "\nfunc init() {\n    println(\"{run_id}\")\n}\n";

    fn write_source(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("call.go");
        std::fs::write(&path, content).expect("write source");
        path
    }

    #[test]
    fn package_clause_matches_declarations_only() {
        let point = InsertionPoint::PackageClause;

        assert!(point.matches("package require"));
        assert!(point.matches("package main"));
        assert!(!point.matches("// package require"));
        assert!(!point.matches("\"package require\""));
        assert!(!point.matches("packaged goods"));
        assert!(!point.matches("package"));
    }

    #[test]
    fn inject_places_payload_after_package_clause() {
        let dir = TempDir::new().expect("tempdir");
        let source = write_source(&dir, "// header\npackage require\n\nfunc Call() {}\n");
        let dest = dir.path().join("0.go");

        inject(
            &source,
            &dest,
            InsertionPoint::PackageClause,
            PAYLOAD,
            "test:abc123",
        )
        .expect("inject");

        let out = std::fs::read_to_string(&dest).expect("read dest");
        let expected = "// header\npackage require\n\nfunc init() {\n    println(\"test:abc123\")\n}\n\nfunc Call() {}\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn inject_triggers_only_on_first_match() {
        let dir = TempDir::new().expect("tempdir");
        let source = write_source(
            &dir,
            "package require\n\n// package comment is not a clause\npackage duplicate\n",
        );
        let dest = dir.path().join("0.go");

        inject(
            &source,
            &dest,
            InsertionPoint::PackageClause,
            PAYLOAD,
            "test:abc123",
        )
        .expect("inject");

        let out = std::fs::read_to_string(&dest).expect("read dest");
        assert_eq!(out.matches("test:abc123").count(), 1);
        // The second clause was copied verbatim, after the payload.
        let payload_at = out.find("test:abc123").expect("payload");
        let duplicate_at = out.find("package duplicate").expect("duplicate");
        assert!(payload_at < duplicate_at);
    }

    #[test]
    fn inject_fails_without_insertion_point() {
        let dir = TempDir::new().expect("tempdir");
        let source = write_source(&dir, "// a file with no package clause\nvar x = 1\n");
        let dest = dir.path().join("0.go");

        let err = inject(
            &source,
            &dest,
            InsertionPoint::PackageClause,
            PAYLOAD,
            "test:abc123",
        )
        .unwrap_err();

        assert!(matches!(err, Error::InsertionPointMissing { .. }));
    }

    #[test]
    fn inject_substitutes_every_placeholder_occurrence() {
        let dir = TempDir::new().expect("tempdir");
        let source = write_source(&dir, "package require\n");
        let dest = dir.path().join("0.go");

        inject(
            &source,
            &dest,
            InsertionPoint::PackageClause,
            "// {run_id}\nfunc init() { println(\"{run_id}\") }\n",
            "test:xyz",
        )
        .expect("inject");

        let out = std::fs::read_to_string(&dest).expect("read dest");
        assert_eq!(out.matches("test:xyz").count(), 2);
        assert!(!out.contains(RUN_ID_PLACEHOLDER));
    }
}
