//! Go toolchain discovery and invocation.
//!
//! All Go commands are opaque subprocesses; this module only knows how to
//! locate the toolchain, install auxiliary tools (cache-aware), and run
//! `go` subcommands with an explicit environment overlay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{Error, Result};

/// Environment variables that indicate a CI execution context.
const CI_KEYS: &[&str] = &["GITHUB_ACTIONS", "TRAVIS", "CIRCLECI", "GITLAB_CI"];

/// Returns true when running inside a detected CI pipeline.
pub fn is_ci() -> bool {
    CI_KEYS
        .iter()
        .any(|key| std::env::var(key).is_ok_and(|v| !v.is_empty()))
}

/// An explicit environment for spawned subprocesses.
///
/// Concurrently launched children must never read a shared mutable
/// environment, so the parent's environment is snapshotted once and
/// overrides are applied to the copy. The parent process environment is
/// never written.
#[derive(Debug, Clone)]
pub struct EnvOverlay {
    vars: HashMap<String, String>,
}

impl EnvOverlay {
    /// Snapshots the current process environment.
    pub fn current() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Sets (or overrides) a variable in the overlay.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Returns the overlay value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Appends a path-list entry to `key` (colon-separated), creating the
    /// variable if absent.
    pub fn append_path(self, key: &str, entry: &Path) -> Self {
        let entry = entry.display().to_string();
        let value = match self.vars.get(key) {
            Some(existing) if !existing.is_empty() => format!("{}:{}", existing, entry),
            _ => entry,
        };
        self.set(key.to_string(), value)
    }

    /// Applies the overlay to a command, replacing its inherited
    /// environment entirely.
    pub fn apply(&self, command: &mut Command) {
        command.env_clear().envs(&self.vars);
    }
}

/// Returns the first entry of a colon-separated root list.
fn first_root(value: &str) -> &str {
    value.split(':').next().unwrap_or_default()
}

/// Handle to an installed Go toolchain.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    root: PathBuf,
}

impl GoToolchain {
    /// Creates a toolchain handle rooted at a known GOROOT.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discovers the toolchain root from `GOROOT`, falling back to
    /// `go env GOROOT`. A colon-separated list names the active root
    /// first; the rest is ignored.
    pub async fn discover() -> Result<Self> {
        if let Ok(root) = std::env::var("GOROOT") {
            let root = first_root(&root);
            if !root.is_empty() {
                return Ok(Self::new(root));
            }
        }

        let output = Command::new("go")
            .args(["env", "GOROOT"])
            .output()
            .await
            .map_err(|e| Error::Toolchain(format!("failed to run 'go env GOROOT': {}", e)))?;

        if !output.status.success() {
            return Err(Error::Toolchain(
                "'go env GOROOT' exited non-zero".to_string(),
            ));
        }

        let root = first_root(String::from_utf8_lossy(&output.stdout).trim()).to_string();
        if root.is_empty() {
            return Err(Error::Toolchain("GOROOT could not be determined".to_string()));
        }

        tracing::debug!(goroot = %root, "discovered Go toolchain");
        Ok(Self::new(root))
    }

    /// Returns the toolchain root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the toolchain's binary directory.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Returns the path of a tool binary inside the toolchain.
    pub fn bin(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    /// Installs a tool into the toolchain's binary directory.
    ///
    /// The binary directory doubles as a filesystem-keyed cache: when the
    /// tool is already present (restored by the CI cache or a previous
    /// run), installation is skipped.
    pub async fn install(&self, package: &str, version: &str, env: &EnvOverlay) -> Result<()> {
        let tool = package.rsplit('/').next().unwrap_or(package);
        if self.bin(tool).exists() {
            tracing::debug!(tool = %tool, "tool already installed, skipping");
            return Ok(());
        }

        let spec = format!("{}@{}", package, version);
        println!("install: {}", spec);

        let workdir = tempfile::TempDir::with_prefix("gauntlet_install_")?;
        let env = env
            .clone()
            .set("GOBIN", self.bin_dir().display().to_string());
        self.run_go(&["install", &spec], workdir.path(), &env).await
    }

    /// Adds a dependency to the module in `cwd` (`go get pkg@version`).
    pub async fn get(&self, package: &str, version: &str, cwd: &Path, env: &EnvOverlay) -> Result<()> {
        let spec = format!("{}@{}", package, version);
        self.run_go(&["get", &spec], cwd, env).await
    }

    /// Reconciles the module manifest in `cwd` (`go mod tidy`).
    pub async fn tidy(&self, cwd: &Path, env: &EnvOverlay) -> Result<()> {
        self.run_go(&["mod", "tidy"], cwd, env).await
    }

    /// Runs a `go` subcommand to completion, inheriting the caller's
    /// stdout/stderr, and fails on a non-zero exit.
    pub async fn run_go(&self, args: &[&str], cwd: &Path, env: &EnvOverlay) -> Result<()> {
        tracing::debug!(args = ?args, cwd = ?cwd, "running go");

        let mut command = Command::new("go");
        command.args(args).current_dir(cwd);
        env.apply(&mut command);

        let status = command
            .status()
            .await
            .map_err(|e| Error::Toolchain(format!("failed to spawn go {:?}: {}", args, e)))?;

        if !status.success() {
            return Err(Error::Toolchain(format!(
                "go {} exited with {}",
                args.join(" "),
                status.code().unwrap_or(-1)
            )));
        }
        Ok(())
    }
}
