//! Concurrent execution of independent quality-gate commands.
//!
//! Each gate is an external command whose output is captured in full and
//! replayed only after every gate in the batch has finished, in the order
//! the gates were submitted. Completion order therefore never affects
//! console output, and one failing gate never hides failures in its
//! siblings.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};
use crate::toolchain::EnvOverlay;

/// One named external command in a gate batch.
#[derive(Debug, Clone)]
pub struct CommandTask {
    /// Gate name used in reporting; identifies the task within a batch.
    pub name: String,
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory for the subprocess.
    pub cwd: PathBuf,
    /// Environment for the subprocess.
    pub env: EnvOverlay,
}

impl CommandTask {
    /// Creates a task running `program` with `args` in `cwd`.
    pub fn new(
        name: impl Into<String>,
        program: impl Into<PathBuf>,
        args: &[&str],
        cwd: impl Into<PathBuf>,
        env: EnvOverlay,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: cwd.into(),
            env,
        }
    }

    /// Runs the task to completion with fully buffered output.
    async fn run(self) -> CommandResult {
        tracing::debug!(name = %self.name, program = ?self.program, "launching gate");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        self.env.apply(&mut command);

        match command.output().await {
            Ok(output) => CommandResult {
                name: self.name,
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.status.code().unwrap_or(-1),
            },
            // Spawn failures are reported like any other failing gate so
            // the batch still runs to completion.
            Err(e) => CommandResult {
                name: self.name.clone(),
                stdout: Vec::new(),
                stderr: format!("failed to launch {}: {}\n", self.name, e).into_bytes(),
                exit_code: -1,
            },
        }
    }
}

/// Captured outcome of one gate, 1:1 with its task by name.
#[derive(Debug)]
pub struct CommandResult {
    /// Name of the task that produced this result.
    pub name: String,
    /// Full captured stdout.
    pub stdout: Vec<u8>,
    /// Full captured stderr.
    pub stderr: Vec<u8>,
    /// Process exit code (-1 when the process was killed by a signal or
    /// never launched).
    pub exit_code: i32,
}

impl CommandResult {
    /// Returns true when the gate passed.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs every task concurrently, one worker per task, and replays all
/// captured output in submission order once the whole batch has finished.
///
/// Fails with [`Error::GatesFailed`] naming every non-zero gate. Siblings
/// of a failing gate always run to completion.
pub async fn run_all(tasks: Vec<CommandTask>) -> Result<()> {
    let results = run_all_collect(tasks).await;
    replay(&results)?;

    let failures: Vec<String> = results
        .iter()
        .filter(|r| !r.success())
        .map(|r| format!("{} (exit {})", r.name, r.exit_code))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::GatesFailed { failures })
    }
}

/// Launches every task concurrently and collects results in submission
/// order. All tasks have exited by the time this returns.
pub async fn run_all_collect(tasks: Vec<CommandTask>) -> Vec<CommandResult> {
    let handles: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let name = task.name.clone();
            (name, tokio::spawn(task.run()))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => CommandResult {
                name,
                stdout: Vec::new(),
                stderr: format!("gate worker panicked: {}\n", e).into_bytes(),
                exit_code: -1,
            },
        };
        results.push(result);
    }
    results
}

/// Prints each result's stdout then stderr, in result order.
fn replay(results: &[CommandResult]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for result in results {
        writeln!(out, "--- {} (exit {})", result.name, result.exit_code)?;
        out.write_all(&result.stdout)?;
        out.write_all(&result.stderr)?;
    }
    out.flush()?;
    Ok(())
}
