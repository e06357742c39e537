//! Async process execution shared by the CLI-driven backends.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;
use which::which;

use crate::error::{ProviderError, Result};

/// Captured result of a finished child process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Check if a tool is installed and available in PATH.
pub fn is_tool_installed(tool: &str) -> bool {
    which(tool).is_ok()
}

/// Run `program args...` to completion and capture its output.
///
/// The child is killed if the returned future is dropped, which is how
/// callers' deadlines propagate into backend processes. A non-zero exit maps
/// to [`ProviderError::CommandFailed`].
pub async fn run_command<S: AsRef<str>>(
    program: &str,
    args: &[S],
    env: &[(String, String)],
) -> Result<CommandOutput> {
    let rendered = render(program, args);
    debug!(command = %rendered, "running backend command");

    let output = Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ProviderError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        Ok(CommandOutput { stdout, stderr })
    } else {
        Err(ProviderError::command_failed(
            rendered,
            output.status.code(),
            stderr,
        ))
    }
}

/// Spawn a long-lived child without waiting for it (e.g. a VM's run loop).
pub fn spawn_detached<S: AsRef<str>>(program: &str, args: &[S]) -> Result<()> {
    debug!(command = %render(program, args), "spawning detached backend process");
    Command::new(program)
        .args(args.iter().map(AsRef::as_ref))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false)
        .spawn()
        .map(|_| ())
        .map_err(|source| ProviderError::Spawn {
            program: program.to_string(),
            source,
        })
}

fn render<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    // Long inline scripts make terrible log lines.
    let mut out = program.to_string();
    for arg in args {
        let arg = arg.as_ref();
        out.push(' ');
        if arg.len() > 80 {
            let cut = (0..=80).rev().find(|i| arg.is_char_boundary(*i)).unwrap_or(0);
            out.push_str(&arg[..cut]);
            out.push_str("...");
        } else {
            out.push_str(arg);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_truncates_long_arguments() {
        let script = "x".repeat(200);
        let rendered = render("docker", &["exec", "box", script.as_str()]);
        assert!(rendered.starts_with("docker exec box xxx"));
        assert!(rendered.ends_with("..."));
        assert!(rendered.len() < 120);
    }

    #[test]
    fn test_render_respects_char_boundaries() {
        let script = "é".repeat(60);
        let rendered = render("sh", &[script.as_str()]);
        assert!(rendered.ends_with("..."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let output = run_command("sh", &["-c", "echo hello"], &[]).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_reports_exit_code() {
        let err = run_command("sh", &["-c", "echo boom >&2; exit 3"], &[])
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_passes_env() {
        let env = vec![("NEXUS_TEST_VALUE".to_string(), "42".to_string())];
        let output = run_command("sh", &["-c", "echo $NEXUS_TEST_VALUE"], &env)
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command::<&str>("definitely-not-a-real-binary-nexus", &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Spawn { .. }));
    }
}
