//! Error types for the gauntlet harness.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to build the test sandbox.
    #[error("failed to build sandbox: {0}")]
    Construction(String),

    /// The designated insertion point was never found in the injected file.
    #[error("no insertion point found in {}: injected bootstrap would never emit the run id", .file.display())]
    InsertionPointMissing { file: PathBuf },

    /// The private meta dependency could not be resolved into the sandbox.
    #[error("failed to resolve meta dependency: {0}")]
    MetaDependency(String),

    /// Go toolchain discovery or invocation failed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// A coverage profile line did not match the `<subject>:<rest>` shape.
    #[error("malformed coverage profile at line {line}: {content:?}")]
    ProfileParse { line: usize, content: String },

    /// A single external command exited non-zero.
    #[error("command '{name}' failed with exit code {code}")]
    CommandFailed { name: String, code: i32 },

    /// One or more commands in a parallel batch exited non-zero.
    #[error("quality gates failed: {}", .failures.join(", "))]
    GatesFailed { failures: Vec<String> },

    /// A required license header is missing or altered.
    #[error("license header mismatch in {}", .0.display())]
    LicenseHeader(PathBuf),

    /// Harness configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The user interrupted a blocking wait.
    #[error("interrupted")]
    Interrupted,

    /// IO error during sandbox or profile operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;
