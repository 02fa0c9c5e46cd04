//! Live output relay for sandboxed subprocesses.
//!
//! Test binaries run inside the sandbox, so every path they print refers
//! to the ephemeral directory. The relay forwards subprocess output line
//! by line and, once the injected bootstrap's run-id sentinel has been
//! seen, rewrites sandbox paths back to checkout paths. Everything before
//! the sentinel is toolchain noise and passes through untouched; the
//! sentinel line itself is synthetic and is dropped.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::sandbox::{sandbox_env, TestSandbox};
use crate::toolchain::EnvOverlay;

/// Per-line state machine classifying and rewriting relay output.
#[derive(Debug)]
pub struct SentinelRewriter {
    run_id: String,
    dest_root: String,
    source_root: String,
    sentinel_seen: bool,
}

impl SentinelRewriter {
    /// Creates a rewriter mapping `dest_root` (the sandbox) back to
    /// `source_root` once the `run_id` sentinel appears.
    pub fn new(run_id: impl Into<String>, source_root: &Path, dest_root: &Path) -> Self {
        Self {
            run_id: run_id.into(),
            dest_root: dest_root.display().to_string(),
            source_root: source_root.display().to_string(),
            sentinel_seen: false,
        }
    }

    /// Processes one line. Returns the line to forward, or `None` for the
    /// sentinel line, which is consumed.
    pub fn apply(&mut self, line: &str) -> Option<String> {
        if !self.sentinel_seen {
            if line.contains(&self.run_id) {
                self.sentinel_seen = true;
                return None;
            }
            return Some(line.to_string());
        }
        Some(line.replace(&self.dest_root, &self.source_root))
    }

    /// Returns true once the sentinel has been consumed.
    pub fn sentinel_seen(&self) -> bool {
        self.sentinel_seen
    }
}

/// Relays one line-oriented stream through a rewriter into `output`.
///
/// Used directly by tests; `run_in_sandbox` drives two of these loops
/// (stdout and stderr) over a shared rewriter.
pub async fn relay_stream<R, W>(reader: R, output: &mut W, rewriter: &mut SentinelRewriter) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(line) = rewriter.apply(&line) {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
    }
    Ok(())
}

/// Runs `program args` inside the sandbox, relaying combined output to
/// the caller's stdout with sandbox paths rewritten to `source_root`.
///
/// Both pipes are drained as the subprocess writes (the relay starts
/// before waiting on the child, and blocks only on pipe reads), so the
/// child never stalls on a full OS pipe buffer. stdout and stderr share
/// one sentinel state; the sentinel arrives on stdout.
pub async fn run_in_sandbox(
    program: &str,
    args: &[&str],
    sandbox: &TestSandbox,
    source_root: &Path,
    base_env: &EnvOverlay,
) -> Result<()> {
    let mut rewriter = SentinelRewriter::new(sandbox.run_id(), source_root, sandbox.path());
    let env = sandbox_env(base_env, sandbox);

    println!("run command: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(sandbox.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());
    env.apply(&mut command);

    let mut child = command
        .spawn()
        .map_err(|e| Error::Toolchain(format!("failed to spawn {}: {}", program, e)))?;

    // Readers are taken before the first wait; Stdio::piped guarantees
    // they are present.
    let stdout = child.stdout.take().ok_or_else(|| {
        Error::Toolchain("child stdout was not piped".to_string())
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        Error::Toolchain("child stderr was not piped".to_string())
    })?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    let mut out = tokio::io::stdout();
    while !(stdout_done && stderr_done) {
        tokio::select! {
            line = stdout_lines.next_line(), if !stdout_done => match line? {
                Some(line) => forward(&mut out, &mut rewriter, &line).await?,
                None => stdout_done = true,
            },
            line = stderr_lines.next_line(), if !stderr_done => match line? {
                Some(line) => forward(&mut out, &mut rewriter, &line).await?,
                None => stderr_done = true,
            },
        }
    }
    out.flush().await?;

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Toolchain(format!("failed to wait for {}: {}", program, e)))?;

    if !rewriter.sentinel_seen() {
        tracing::warn!(run_id = %sandbox.run_id(), "sentinel never appeared in test output");
    }

    if !status.success() {
        return Err(Error::CommandFailed {
            name: program.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

async fn forward<W: AsyncWrite + Unpin>(
    output: &mut W,
    rewriter: &mut SentinelRewriter,
    line: &str,
) -> Result<()> {
    if let Some(line) = rewriter.apply(line) {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }
    Ok(())
}
