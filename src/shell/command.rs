//! External command execution.
//!
//! Commands are spawned directly (no shell) with an explicit environment:
//! the child sees exactly the variables in [`ResolvedCommand::env`].

use crate::error::{GantryError, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a child is polled while a timeout is armed.
const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A fully interpolated command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    /// Program to execute.
    pub program: String,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Complete child environment.
    pub env: BTreeMap<String, String>,

    /// Working directory.
    pub cwd: Option<PathBuf>,
}

impl ResolvedCommand {
    /// Create a command with no arguments or environment.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Result of executing an external command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal or timeout).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,

    /// Whether the command was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl CommandResult {
    /// Create a success result.
    pub fn success(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code: Some(0),
            stdout,
            stderr,
            duration,
            success: true,
            timed_out: false,
        }
    }

    /// Create a failure result.
    pub fn failure(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            success: false,
            timed_out: false,
        }
    }

    /// Create a result for a command killed at its timeout.
    pub fn timeout(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(None, stdout, stderr, duration)
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Kill the command after this long (None = no timeout).
    pub timeout: Option<Duration>,
}

/// Runs external commands.
///
/// The orchestrator only talks to external systems through this trait,
/// which keeps scheduling testable without spawning processes.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion (or timeout).
    ///
    /// Returns `Err` only when the command could not be started.
    fn run(&self, command: &ResolvedCommand, options: &CommandOptions) -> Result<CommandResult>;
}

/// [`CommandRunner`] that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &ResolvedCommand, options: &CommandOptions) -> Result<CommandResult> {
        execute(command, options)
    }
}

/// Execute a command, capturing stdout and stderr.
pub fn execute(command: &ResolvedCommand, options: &CommandOptions) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .env_clear()
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    own_process_group(&mut cmd);

    let mut child = cmd.spawn().map_err(|e| {
        tracing::debug!(program = %command.program, error = %e, "spawn failed");
        GantryError::CommandFailed {
            command: format!("{} ({})", command.display(), e),
            code: None,
        }
    })?;

    let stdout_handle = spawn_reader(child.stdout.take());
    let stderr_handle = spawn_reader(child.stderr.take());

    let status = match options.timeout {
        Some(timeout) => wait_with_timeout(&mut child, timeout),
        None => child.wait().map(Some),
    }
    .map_err(|e| GantryError::CommandFailed {
        command: format!("{} ({})", command.display(), e),
        code: None,
    })?;

    let stdout = join_reader(stdout_handle);
    let stderr = join_reader(stderr_handle);
    let duration = start.elapsed();

    Ok(match status {
        None => CommandResult::timeout(stdout, stderr, duration),
        Some(status) if status.success() => CommandResult::success(stdout, stderr, duration),
        Some(status) => CommandResult::failure(status.code(), stdout, stderr, duration),
    })
}

/// Wait for the child, killing it once `timeout` elapses.
///
/// Returns `None` when the child was killed.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            // The child may exit between try_wait and kill.
            if let Err(e) = kill_process_group(child) {
                tracing::debug!(error = %e, "kill after timeout failed");
            }
            child.wait()?;
            return Ok(None);
        }

        thread::sleep(TIMEOUT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Start the child in its own process group so a timeout kill also reaches
/// the processes it spawned (which would otherwise keep the pipes open).
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) with a negative pid signals the group created for this child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        child.kill()
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ResolvedCommand {
        let mut cmd = ResolvedCommand::new("sh").with_args(["-c", script]);
        if let Ok(path) = std::env::var("PATH") {
            cmd.env.insert("PATH".to_string(), path);
        }
        cmd
    }

    #[test]
    fn execute_successful_command() {
        let result = execute(&sh("echo hello"), &CommandOptions::default()).unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
        assert!(!result.timed_out);
    }

    #[test]
    fn execute_failing_command_captures_stderr() {
        let result = execute(&sh("echo boom >&2; exit 3"), &CommandOptions::default()).unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stderr.contains("boom"));
    }

    #[test]
    fn execute_uses_only_given_env() {
        let mut cmd = sh("echo \"[$MY_VAR][$HOME]\"");
        cmd.env.insert("MY_VAR".to_string(), "my_value".to_string());

        let result = execute(&cmd, &CommandOptions::default()).unwrap();

        assert!(result.stdout.contains("[my_value][]"));
    }

    #[test]
    fn execute_with_cwd() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut cmd = sh("pwd");
        cmd.cwd = Some(temp.path().to_path_buf());

        let result = execute(&cmd, &CommandOptions::default()).unwrap();

        let name = temp.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(result.stdout.contains(&name));
    }

    #[test]
    fn execute_kills_on_timeout() {
        let options = CommandOptions {
            timeout: Some(Duration::from_millis(200)),
        };

        let result = execute(&sh("sleep 5"), &options).unwrap();

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(result.duration < Duration::from_secs(4));
    }

    #[test]
    fn execute_within_timeout_succeeds() {
        let options = CommandOptions {
            timeout: Some(Duration::from_secs(10)),
        };

        let result = execute(&sh("echo quick"), &options).unwrap();

        assert!(result.success);
        assert!(!result.timed_out);
    }

    #[test]
    fn execute_missing_program_is_error() {
        let cmd = ResolvedCommand::new("definitely-not-a-real-program-gantry");
        let err = execute(&cmd, &CommandOptions::default()).unwrap_err();
        assert!(matches!(err, GantryError::CommandFailed { code: None, .. }));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = ResolvedCommand::new("az").with_args(["group", "create", "--name", "my group"]);
        assert_eq!(cmd.display(), "az group create --name 'my group'");
    }
}
