// Standard library
use std::ffi::OsStr;
use std::thread;
use std::time::{Duration, Instant};

// External crates
use crate::error::{CoreError, Result};
use duct::cmd;
use tracing::debug;
use which::which;

/// Captured result of a finished external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Last `lines` lines of stderr (stdout when stderr is empty), for error reports.
    pub fn tail(&self, lines: usize) -> String {
        let combined = if self.stderr.trim().is_empty() {
            self.stdout.as_str()
        } else {
            self.stderr.as_str()
        };
        let tail: Vec<&str> = combined.lines().rev().take(lines).collect();
        tail.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

const SECRET_MARKERS: [&str; 4] = ["KEY", "TOKEN", "SECRET", "PASSWORD"];

/// Mask the value of `NAME=value` arguments whose name looks like a credential.
fn redact_arg(arg: &str) -> String {
    match arg.split_once('=') {
        Some((name, _))
            if SECRET_MARKERS
                .iter()
                .any(|marker| name.to_ascii_uppercase().contains(marker)) =>
        {
            format!("{}=***", name)
        }
        _ => arg.to_string(),
    }
}

/// Command line for logs and error messages, with credentials masked.
fn render<A: AsRef<OsStr>>(command: &str, args: &[A]) -> String {
    format!(
        "{} {}",
        command,
        args.iter()
            .map(|a| redact_arg(&a.as_ref().to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    )
}

fn with_env<A: AsRef<OsStr>>(command: &str, args: &[A], envs: &[(String, String)]) -> duct::Expression {
    let mut expression = cmd(command, args);
    for (key, value) in envs {
        expression = expression.env(key, value);
    }
    expression
}

/// Run a command to completion and capture its output.
///
/// A non-zero exit status is not an error here; callers decide what a failed
/// exit means. With `timeout_secs` set the process is killed once the limit
/// passes and `CoreError::Timeout` is returned.
pub fn run_command<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
    envs: &[(String, String)],
    timeout_secs: Option<u64>,
) -> Result<CommandOutput> {
    let full_command = render(command, args);
    debug!("Running command: {}", full_command);

    let handle = with_env(command, args, envs)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .start()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::Dependency(command.to_string())
            } else {
                CoreError::Command(format!("Failed to start '{}': {}", full_command, e))
            }
        })?;

    let output = match timeout_secs {
        None => handle.wait().map_err(|e| {
            CoreError::Command(format!("Error waiting for '{}': {}", full_command, e))
        })?,
        Some(secs) => {
            let start = Instant::now();
            let timeout = Duration::from_secs(secs);
            loop {
                if start.elapsed() >= timeout {
                    let _ = handle.kill();
                    return Err(CoreError::Timeout {
                        command: full_command,
                        seconds: secs,
                    });
                }
                match handle.try_wait() {
                    Ok(Some(output)) => break output,
                    Ok(None) => thread::sleep(Duration::from_millis(100)),
                    Err(e) => {
                        return Err(CoreError::Command(format!(
                            "Error waiting for '{}': {}",
                            full_command, e
                        )));
                    }
                }
            }
        }
    };

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a command and turn a non-zero exit into `CoreError::Command`.
pub fn run_checked<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
    envs: &[(String, String)],
    timeout_secs: Option<u64>,
) -> Result<CommandOutput> {
    let output = run_command(command, args, envs, timeout_secs)?;
    if !output.success() {
        return Err(CoreError::Command(format!(
            "{} exited with {:?}\n\nOutput (last 50 lines):\n{}",
            render(command, args),
            output.status,
            output.tail(50)
        )));
    }
    Ok(output)
}

/// Quote a value for a POSIX shell so it is passed as a single word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
