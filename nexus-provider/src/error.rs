//! Error types for provider operations.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while driving an execution backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` exited with {}: {stderr}", describe_exit(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Execution context not found: {0}")]
    NotFound(String),

    #[error("Failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl ProviderError {
    pub fn command_failed(
        command: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Exit code of the failed command, if the failure was a non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}
