//! Harness configuration.
//!
//! Configuration is read from an optional `gauntlet.toml` at the project
//! root. Every field has a default, so a project with conventional layout
//! needs no config file at all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the optional configuration file at the project root.
pub const CONFIG_FILE: &str = "gauntlet.toml";

/// Default bootstrap payload injected into the sandbox copy of the
/// designated file, immediately after its package clause.
///
/// `{run_id}` is replaced with the sandbox run identifier and `{meta}`
/// with the meta dependency's module path. The `init` function must print
/// the run id before any other test-initialization side effect: the
/// output relay treats that line as the boundary between toolchain noise
/// and real test output.
const DEFAULT_BOOTSTRAP: &str = r#"
// test bootstrap (generated, sandbox only)

import (
    "fmt"

    _ "{meta}/pre-init/vendor-proxy/for-app"
    _ "{meta}/pre-init/vendor-proxy/for-tests"
)

func init() {
    fmt.Println("{run_id}")
}
"#;

/// Bootstrap payload used when no meta dependency is configured.
const DEFAULT_BOOTSTRAP_NO_META: &str = r#"
// test bootstrap (generated, sandbox only)

import "fmt"

func init() {
    fmt.Println("{run_id}")
}
"#;

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Module path of the project under test (the prefix stripped from
    /// coverage subject paths).
    #[serde(default = "default_module")]
    pub module: String,

    /// Sandbox construction settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Coverage filtering settings.
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// License gate settings.
    #[serde(default)]
    pub license: LicenseConfig,
}

/// Sandbox construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Module path of the private meta dependency pulled into the sandbox
    /// to assemble the full test closure. When unset, dependency
    /// resolution is skipped entirely.
    #[serde(default)]
    pub meta_package: Option<String>,

    /// Version requested for the meta dependency.
    #[serde(default = "default_meta_version")]
    pub meta_version: String,

    /// File (relative to the source root) that receives the bootstrap
    /// injection. Its sandbox twin is materialized, not symlinked.
    #[serde(default = "default_inject_file")]
    pub inject_file: PathBuf,

    /// Name of the materialized twin inside the sandbox, placed next to
    /// the injected file. Sorts first so its `init` runs before the
    /// package's own files.
    #[serde(default = "default_inject_as")]
    pub inject_as: String,
}

/// Coverage filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CoverageConfig {
    /// Glob patterns, relative to the module root, whose matching files
    /// are dropped from the coverage profile.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Profile file written by `gauntlet cover`, relative to the source
    /// root.
    #[serde(default = "default_profile")]
    pub profile: PathBuf,
}

/// License gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// Hex SHA-256 digest of the expected license header text (the text
    /// between the leading `/*` and `*/`, trimmed). Empty disables the
    /// gate.
    #[serde(default)]
    pub header_sha256: String,

    /// Top-level directories exempt from the header check.
    #[serde(default = "default_license_skip")]
    pub skip_dirs: Vec<String>,
}

fn default_module() -> String {
    "example.com/project".to_string()
}

fn default_meta_version() -> String {
    "latest".to_string()
}

fn default_inject_file() -> PathBuf {
    PathBuf::from("internal/testing/require/call.go")
}

fn default_inject_as() -> String {
    "0.go".to_string()
}

fn default_profile() -> PathBuf {
    PathBuf::from("coverage.out")
}

fn default_license_skip() -> Vec<String> {
    vec!["examples".to_string(), "docs".to_string()]
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            sandbox: SandboxConfig::default(),
            coverage: CoverageConfig::default(),
            license: LicenseConfig::default(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            meta_package: None,
            meta_version: default_meta_version(),
            inject_file: default_inject_file(),
            inject_as: default_inject_as(),
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            header_sha256: String::new(),
            skip_dirs: default_license_skip(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from `gauntlet.toml` under `root`, falling back
    /// to defaults when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Sets the module path.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Sets the meta dependency coordinates.
    pub fn with_meta_package(mut self, package: impl Into<String>) -> Self {
        self.sandbox.meta_package = Some(package.into());
        self
    }

    /// Sets the coverage ignore globs.
    pub fn with_coverage_ignore(mut self, globs: Vec<String>) -> Self {
        self.coverage.ignore = globs;
        self
    }

    /// Renders the bootstrap payload with the meta dependency substituted.
    ///
    /// The `{run_id}` placeholder is left in place; the injection writer
    /// substitutes it per sandbox.
    pub fn bootstrap_payload(&self) -> String {
        match &self.sandbox.meta_package {
            Some(meta) => DEFAULT_BOOTSTRAP.replace("{meta}", meta),
            None => DEFAULT_BOOTSTRAP_NO_META.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_defaults_are_sensible() {
        let config = HarnessConfig::default();

        assert_eq!(config.module, "example.com/project");
        assert!(config.sandbox.meta_package.is_none());
        assert_eq!(config.sandbox.meta_version, "latest");
        assert_eq!(
            config.sandbox.inject_file,
            PathBuf::from("internal/testing/require/call.go")
        );
        assert_eq!(config.sandbox.inject_as, "0.go");
        assert!(config.coverage.ignore.is_empty());
        assert_eq!(config.license.skip_dirs, vec!["examples", "docs"]);
    }

    #[test]
    fn load_returns_defaults_without_file() {
        let dir = TempDir::new().expect("tempdir");
        let config = HarnessConfig::load(dir.path()).expect("load");
        assert_eq!(config.module, HarnessConfig::default().module);
    }

    #[test]
    fn load_parses_partial_file() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
module = "github.com/acme/widget"

[sandbox]
meta_package = "github.com/acme/meta"

[coverage]
ignore = ["internal/testing/**", "libs/debug/**"]
"#,
        )
        .expect("write config");

        let config = HarnessConfig::load(dir.path()).expect("load");
        assert_eq!(config.module, "github.com/acme/widget");
        assert_eq!(
            config.sandbox.meta_package.as_deref(),
            Some("github.com/acme/meta")
        );
        // Unspecified fields keep their defaults.
        assert_eq!(config.sandbox.meta_version, "latest");
        assert_eq!(config.coverage.ignore.len(), 2);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), "module = [not toml").expect("write");

        let err = HarnessConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn bootstrap_payload_substitutes_meta_package() {
        let config = HarnessConfig::default().with_meta_package("github.com/acme/meta");
        let payload = config.bootstrap_payload();

        assert!(payload.contains("github.com/acme/meta/pre-init/vendor-proxy/for-app"));
        assert!(payload.contains("{run_id}"));
        assert!(!payload.contains("{meta}"));
    }

    #[test]
    fn bootstrap_payload_without_meta_still_prints_run_id() {
        let payload = HarnessConfig::default().bootstrap_payload();

        assert!(payload.contains("fmt.Println(\"{run_id}\")"));
        assert!(!payload.contains("vendor-proxy"));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = HarnessConfig::default()
            .with_module("github.com/acme/widget")
            .with_coverage_ignore(vec!["testdata/**".to_string()]);

        let json = serde_json::to_string(&config).expect("serialize");
        let back: HarnessConfig = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back.module, "github.com/acme/widget");
        assert_eq!(back.coverage.ignore, vec!["testdata/**"]);
    }
}
