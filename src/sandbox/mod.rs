//! Ephemeral test sandboxes.
//!
//! A sandbox is a temporary directory mirroring the source tree through
//! symlinks, with an independently mutable copy of the module manifest
//! and one materialized file carrying the injected bootstrap payload.
//! Tests run against the sandbox without touching the real checkout; the
//! directory is removed when the sandbox goes out of scope.

mod inject;
mod mirror;

pub use inject::{inject, InsertionPoint, RUN_ID_PLACEHOLDER};
pub use mirror::{mirror_tree, FileSelector};

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::toolchain::{EnvOverlay, GoToolchain};

/// Module manifest files copied verbatim into the sandbox.
///
/// These are real copies, never symlinks: dependency resolution mutates
/// the sandbox manifest and must not write through to the checkout.
const MANIFEST_FILES: &[&str] = &["go.mod", "go.sum"];

/// An ephemeral sandbox holding a mirrored source tree.
///
/// Construction is atomic from the caller's perspective: any failing step
/// yields an error and the partially built directory is removed when the
/// `TempDir` drops. On success the sandbox exposes its path and run
/// identifier, both read-only.
pub struct TestSandbox {
    dir: TempDir,
    run_id: String,
}

impl TestSandbox {
    /// Builds a sandbox for the project at `source_root`.
    ///
    /// Steps, in order: create the ephemeral root, copy manifest files,
    /// mirror test artifacts and Go sources, inject the bootstrap payload
    /// into the designated file's materialized twin, then resolve the
    /// meta dependency and tidy the sandbox manifest (skipped when no
    /// meta package is configured).
    pub async fn build(
        source_root: &Path,
        config: &HarnessConfig,
        go: &GoToolchain,
        env: &EnvOverlay,
    ) -> Result<Self> {
        let dir = TempDir::with_prefix("gauntlet_")
            .map_err(|e| Error::Construction(format!("cannot create sandbox root: {}", e)))?;
        let run_id = format!("test:{}", uuid::Uuid::new_v4().simple());

        copy_manifests(source_root, dir.path())?;

        mirror_tree(
            source_root,
            dir.path(),
            &[FileSelector::TestArtifacts, FileSelector::GoSources],
        )?;

        // The twin's name exists only in the sandbox, so it can never
        // collide with a mirrored link.
        let inject_source = source_root.join(&config.sandbox.inject_file);
        let twin_dir = dir.path().join(
            config
                .sandbox
                .inject_file
                .parent()
                .unwrap_or_else(|| Path::new("")),
        );
        std::fs::create_dir_all(&twin_dir)?;
        inject(
            &inject_source,
            &twin_dir.join(&config.sandbox.inject_as),
            InsertionPoint::PackageClause,
            &config.bootstrap_payload(),
            &run_id,
        )?;

        if let Some(meta) = &config.sandbox.meta_package {
            go.get(meta, &config.sandbox.meta_version, dir.path(), env)
                .await
                .map_err(|e| Error::MetaDependency(e.to_string()))?;
            go.tidy(dir.path(), env)
                .await
                .map_err(|e| Error::Construction(format!("tidy: {}", e)))?;
        }

        tracing::info!(
            sandbox_path = ?dir.path(),
            run_id = %run_id,
            "built test sandbox"
        );

        Ok(Self { dir, run_id })
    }

    /// Returns the sandbox root directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the run identifier emitted by the injected bootstrap.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Removes the sandbox directory, reporting any error.
    ///
    /// Dropping the sandbox removes the directory too; `close` exists for
    /// callers that want the error instead of a best-effort cleanup.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

impl std::fmt::Debug for TestSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSandbox")
            .field("path", &self.dir.path())
            .field("run_id", &self.run_id)
            .finish()
    }
}

/// Copies manifest files present at the source root into the sandbox.
fn copy_manifests(source_root: &Path, dest_root: &Path) -> Result<()> {
    for name in MANIFEST_FILES {
        let source = source_root.join(name);
        if source.exists() {
            std::fs::copy(&source, dest_root.join(name))?;
        }
    }
    Ok(())
}

/// Returns the environment overlay for commands run inside a sandbox:
/// the sandbox joins `GOPATH` and cgo is enabled for the race detector.
pub fn sandbox_env(base: &EnvOverlay, sandbox: &TestSandbox) -> EnvOverlay {
    base.clone()
        .append_path("GOPATH", sandbox.path())
        .set("CGO_ENABLED", "1")
}
