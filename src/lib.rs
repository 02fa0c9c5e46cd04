//! Gauntlet - quality-gate harness for Go projects
//!
//! This library builds ephemeral symlink sandboxes in which a project's
//! test suite (including a private meta dependency) runs without
//! mutating the checkout, relays subprocess output with sandbox paths
//! rewritten back to source paths, executes independent quality gates
//! concurrently with deterministic reporting, and filters coverage
//! profiles.

pub mod commands;
pub mod config;
pub mod coverage;
pub mod error;
pub mod gates;
pub mod relay;
pub mod sandbox;
pub mod toolchain;

pub use commands::{GateCommand, Harness};
pub use config::HarnessConfig;
pub use coverage::filter_profile;
pub use error::{Error, Result};
pub use gates::{run_all, CommandResult, CommandTask};
pub use relay::{run_in_sandbox, SentinelRewriter};
pub use sandbox::{FileSelector, InsertionPoint, TestSandbox};
pub use toolchain::{is_ci, EnvOverlay, GoToolchain};
