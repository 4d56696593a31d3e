//! ABOUTME: Process runner for external commands with timeouts and logging
//! ABOUTME: Captures binary stdout (camera stills, encoder output) with size bounds

use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};
use sw_core::{Error, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
    time::timeout,
};
use tracing::{debug, error, instrument, warn};

/// Maximum bytes to capture from stdout/stderr
const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024 * 1024; // 16MB, full-res JPEGs fit

/// Command specification for process execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Path to the program to execute
    pub program: PathBuf,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory for the command
    pub cwd: Option<PathBuf>,
    /// Timeout for command execution
    pub timeout: Duration,
    /// Additional time to wait after timeout before giving up on the kill
    pub kill_after: Duration,
    /// Maximum bytes to capture from stdout
    pub stdout_limit: usize,
    /// Maximum bytes to capture from stderr
    pub stderr_limit: usize,
}

impl CommandSpec {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(30),
            kill_after: Duration::from_secs(5),
            stdout_limit: DEFAULT_OUTPUT_LIMIT,
            stderr_limit: 64 * 1024,
        }
    }

    /// Add command line arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Set working directory
    pub fn cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set timeout duration
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set kill grace period after timeout
    pub fn kill_after(mut self, kill_after: Duration) -> Self {
        self.kill_after = kill_after;
        self
    }
}

/// Result of command execution
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status of the command
    pub status: ExitStatus,
    /// Captured stdout as raw bytes (bounded)
    pub stdout: Vec<u8>,
    /// Captured stderr (bounded)
    pub stderr: String,
    /// Total execution duration
    pub duration: Duration,
    /// Whether the command was killed due to timeout
    pub timed_out: bool,
    /// Whether stdout was truncated due to size limits
    pub stdout_truncated: bool,
    /// Whether stderr was truncated due to size limits
    pub stderr_truncated: bool,
}

impl CommandOutput {
    /// Check if the command succeeded (exit code 0)
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code if available
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run a command according to the specification
#[instrument(skip(spec), fields(program = %spec.program.display(), args = ?spec.args))]
pub async fn run(spec: CommandSpec) -> Result<CommandOutput> {
    let start = Instant::now();

    debug!(
        program = %spec.program.display(),
        timeout_secs = spec.timeout.as_secs(),
        "Starting command execution"
    );

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn().map_err(|e| {
        Error::Process(format!(
            "Failed to spawn command {}: {}",
            spec.program.display(),
            e
        ))
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Process("Failed to capture stderr".to_string()))?;

    let stdout_task = capture_stdout(stdout, spec.stdout_limit);
    let stderr_task = capture_stderr(stderr, spec.stderr_limit);

    let execution = timeout(spec.timeout, async {
        let (status, stdout_out, stderr_out) = tokio::join!(child.wait(), stdout_task, stderr_task);
        let status = status.map_err(|e| Error::Process(format!("Failed to wait for command: {}", e)))?;
        Ok::<_, Error>((status, stdout_out, stderr_out))
    })
    .await;

    let (status, (stdout, stdout_truncated), (stderr, stderr_truncated), timed_out) = match execution
    {
        Ok(Ok((status, stdout_out, stderr_out))) => (status, stdout_out, stderr_out, false),
        Ok(Err(e)) => {
            error!(error = %e, "Command execution failed");
            return Err(e);
        }
        Err(_) => {
            warn!(
                timeout_secs = spec.timeout.as_secs(),
                "Command timed out, killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out process");
            }
            match timeout(spec.kill_after, child.wait()).await {
                Ok(Ok(status)) => (status, (Vec::new(), false), (String::new(), false), true),
                _ => {
                    return Err(Error::Process(format!(
                        "Command {} did not terminate after timeout",
                        spec.program.display()
                    )));
                }
            }
        }
    };

    let duration = start.elapsed();
    let result = CommandOutput {
        status,
        stdout,
        stderr,
        duration,
        timed_out,
        stdout_truncated,
        stderr_truncated,
    };

    if result.success() && !result.timed_out {
        debug!(
            duration_ms = duration.as_millis(),
            output_bytes = result.stdout.len(),
            "Command completed successfully"
        );
    } else {
        warn!(
            duration_ms = duration.as_millis(),
            exit_code = result.exit_code(),
            timed_out = result.timed_out,
            stderr = %result.stderr,
            "Command failed or timed out"
        );
    }

    Ok(result)
}

/// Capture raw bytes from stdout with a size limit. Stills and encoded
/// artifacts are binary, so no line-based handling here.
async fn capture_stdout(
    mut stream: tokio::process::ChildStdout,
    limit: usize,
) -> (Vec<u8>, bool) {
    let mut output = Vec::new();
    // Heap-allocated: this buffer lives across await points, so a stack
    // array would bloat every future that composes this one
    let mut buf = vec![0u8; 64 * 1024];
    let mut truncated = false;

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let remaining = limit.saturating_sub(output.len());
                if n > remaining {
                    output.extend_from_slice(&buf[..remaining]);
                    truncated = true;
                    // Keep draining so the child is not blocked on a full pipe
                    let mut sink = vec![0u8; 64 * 1024];
                    while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
                    break;
                }
                output.extend_from_slice(&buf[..n]);
            }
            Err(e) => {
                debug!(error = %e, "Error reading stdout");
                break;
            }
        }
    }

    if truncated {
        debug!(captured_bytes = output.len(), limit, "Stdout truncated due to size limit");
    }
    (output, truncated)
}

/// Capture stderr line by line, logging as lines arrive
async fn capture_stderr(stream: tokio::process::ChildStderr, limit: usize) -> (String, bool) {
    let mut reader = BufReader::new(stream);
    let mut output = String::new();
    let mut buffer = String::new();
    let mut truncated = false;

    while output.len() < limit {
        buffer.clear();
        match reader.read_line(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = buffer.trim_end();
                if !line.is_empty() {
                    debug!(line = %line, "Process stderr");
                }
                let remaining = limit - output.len();
                if buffer.len() > remaining {
                    output.push_str(&buffer[..remaining]);
                    truncated = true;
                    break;
                }
                output.push_str(&buffer);
            }
            Err(e) => {
                debug!(error = %e, "Error reading stderr");
                break;
            }
        }
    }

    if truncated {
        debug!(captured_bytes = output.len(), limit, "Stderr truncated due to size limit");
    }
    (output, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let spec = CommandSpec::new("echo".into()).args(["hello", "world"]);
        let result = run(spec).await.expect("Command should succeed");

        assert!(result.success());
        assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "hello world");
        assert!(!result.timed_out);
        assert!(!result.stdout_truncated);
    }

    #[tokio::test]
    async fn test_binary_stdout_preserved() {
        // JPEG magic bytes are not valid UTF-8; capture must be byte-exact
        let spec = CommandSpec::new("printf".into()).args([r"\xff\xd8\xff\xe0"]);
        let result = run(spec).await.expect("Command should succeed");

        assert!(result.success());
        assert_eq!(result.stdout, vec![0xff, 0xd8, 0xff, 0xe0]);
    }

    #[tokio::test]
    async fn test_large_binary_stdout_captured() {
        // A megabyte of output crosses the read buffer many times; the
        // whole capture must run within a default-sized thread stack
        let spec = CommandSpec::new("sh".into()).args(["-c", "head -c 1048576 /dev/zero"]);
        let result = run(spec).await.expect("Command should succeed");

        assert!(result.success());
        assert_eq!(result.stdout.len(), 1_048_576);
        assert!(!result.stdout_truncated);
    }

    #[tokio::test]
    async fn test_command_with_cwd() {
        let spec = CommandSpec::new("pwd".into()).cwd("/tmp");
        let result = run(spec).await.expect("Command should succeed");

        assert!(result.success());
        assert!(String::from_utf8_lossy(&result.stdout).trim().ends_with("tmp"));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let spec = CommandSpec::new("sleep".into())
            .args(["2"])
            .timeout(Duration::from_millis(100))
            .kill_after(Duration::from_millis(500));

        let result = run(spec).await.expect("Command should complete with timeout");

        assert!(result.timed_out);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_stdout_truncation() {
        let large_text = "x".repeat(2000);
        let mut spec = CommandSpec::new("echo".into()).args([&large_text]);
        spec.stdout_limit = 100;

        let result = run(spec).await.expect("Command should succeed");

        assert!(result.success());
        assert!(result.stdout_truncated);
        assert_eq!(result.stdout.len(), 100);
    }

    #[tokio::test]
    async fn test_failed_command() {
        let spec = CommandSpec::new("sh".into()).args(["-c", "exit 42"]);
        let result = run(spec).await.expect("Command should execute");

        assert!(!result.success());
        assert_eq!(result.exit_code(), Some(42));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_nonexistent_command() {
        let spec = CommandSpec::new("this_command_does_not_exist_12345".into());
        assert!(run(spec).await.is_err());
    }
}
