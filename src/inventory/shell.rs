//! Command execution on the host that owns the brain directory.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::ControlError;

/// Captured result of one script run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// True when either stream contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }

    /// Text worth showing for a failed run: stderr, or stdout when the
    /// tool reports errors there (as `git commit` does).
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs POSIX shell scripts. Implementations differ only in where the
/// script executes.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run `script`, feeding `stdin` when given. A non-zero exit is not an
    /// error here; callers inspect [`ShellOutput::code`].
    async fn run_with_input(
        &self,
        script: &str,
        stdin: Option<&str>,
    ) -> Result<ShellOutput, ControlError>;

    async fn run(&self, script: &str) -> Result<ShellOutput, ControlError> {
        self.run_with_input(script, None).await
    }

    /// Run `script` and turn a non-zero exit into [`ControlError::Shell`].
    async fn run_checked(&self, script: &str) -> Result<ShellOutput, ControlError> {
        let output = self.run(script).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ControlError::Shell {
                command: script.to_string(),
                stderr: output.error_text(),
            })
        }
    }
}

/// Runs scripts on a remote host through `ssh` (key-based, non-interactive).
pub struct SshShell {
    host: String,
    timeout: Duration,
}

impl SshShell {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Shell for SshShell {
    async fn run_with_input(
        &self,
        script: &str,
        stdin: Option<&str>,
    ) -> Result<ShellOutput, ControlError> {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes", self.host.as_str(), script]);
        execute(cmd, script, stdin, self.timeout).await
    }
}

/// Runs scripts through the local `sh`. Used when no SSH host is set.
pub struct LocalShell {
    timeout: Duration,
}

impl LocalShell {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Shell for LocalShell {
    async fn run_with_input(
        &self,
        script: &str,
        stdin: Option<&str>,
    ) -> Result<ShellOutput, ControlError> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        execute(cmd, script, stdin, self.timeout).await
    }
}

async fn execute(
    mut cmd: Command,
    script: &str,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ShellOutput, ControlError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    tracing::debug!(script = %script, "running shell command");

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn shell for `{}`", script))?;

    // Input is written while the child runs so a script that exits early
    // (or fills its stdout pipe first) cannot stall the writer.
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_owned();
            Some(tokio::spawn(async move {
                let result = pipe.write_all(input.as_bytes()).await;
                drop(pipe);
                result
            }))
        }
        _ => None,
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.context("Failed to wait for shell command")?,
        Err(_) => {
            tracing::warn!(script = %script, secs = timeout.as_secs(), "shell command timed out");
            return Err(ControlError::ShellTimeout {
                command: script.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if let Some(writer) = writer {
        match writer.await.context("Command input writer panicked")? {
            Ok(()) => {}
            // The script exited without reading all of its input; its exit
            // status decides the outcome.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(script = %script, "shell command closed stdin early");
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to write command input").into()),
        }
    }

    Ok(ShellOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        code: output.status.code(),
    })
}

/// Quote `value` as a single POSIX shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalShell {
        LocalShell::new(Duration::from_secs(10))
    }

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("hello world"), "'hello world'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let out = ShellOutput {
            stdout: "out".into(),
            stderr: " err \n".into(),
            code: Some(1),
        };
        assert_eq!(out.error_text(), "err");
        let out = ShellOutput {
            stdout: "nothing to commit\n".into(),
            stderr: String::new(),
            code: Some(1),
        };
        assert_eq!(out.error_text(), "nothing to commit");
    }

    #[test]
    fn test_mentions_checks_both_streams() {
        let out = ShellOutput {
            stdout: "nothing to commit, working tree clean\n".into(),
            stderr: "hook: ok\n".into(),
            code: Some(1),
        };
        assert!(out.mentions("nothing to commit"));
        assert!(out.mentions("hook"));
        assert!(!out.mentions("rejected"));
    }

    #[tokio::test]
    async fn test_local_shell_captures_output_and_code() {
        let out = local().run("echo hi; echo oops >&2; exit 3").await.unwrap();
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_local_shell_feeds_stdin() {
        let out = local()
            .run_with_input("cat", Some("line one\nline two"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "line one\nline two");
    }

    #[tokio::test]
    async fn test_script_ignoring_stdin_keeps_its_exit_code() {
        let input = "x".repeat(1 << 20);
        for _ in 0..20 {
            let out = local().run_with_input("exit 3", Some(&input)).await.unwrap();
            assert_eq!(out.code, Some(3));
        }
    }

    #[tokio::test]
    async fn test_large_input_is_fed_completely() {
        let input = "y".repeat(1 << 20);
        let out = local().run_with_input("wc -c", Some(&input)).await.unwrap();
        assert_eq!(out.stdout.trim(), (1usize << 20).to_string());
    }

    #[tokio::test]
    async fn test_quoted_value_survives_the_shell() {
        let tricky = "a 'quoted' $HOME `x` \"y\"";
        let out = local()
            .run(&format!("printf '%s' {}", shell_quote(tricky)))
            .await
            .unwrap();
        assert_eq!(out.stdout, tricky);
    }

    #[tokio::test]
    async fn test_run_checked_maps_failure_to_shell_error() {
        let err = local().run_checked("echo broken >&2; false").await.unwrap_err();
        match err {
            ControlError::Shell { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("Expected Shell error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let shell = LocalShell::new(Duration::from_millis(100));
        let err = shell.run("sleep 5").await.unwrap_err();
        assert!(matches!(err, ControlError::ShellTimeout { .. }));
    }
}
