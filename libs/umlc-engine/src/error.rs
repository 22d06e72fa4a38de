//! Failure taxonomy for a single run.
//!
//! Every variant is caught at the orchestrator boundary and folded into an
//! [`ExecutionResult`](umlc_common::types::ExecutionResult); front-ends only
//! ever see the resulting status.

use std::io;

use thiserror::Error;
use umlc_common::types::{ExecutionStatus, Language};

use crate::engine::ProcessOutput;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No profile for the requested language. Unreachable with the built-in
    /// profile set, reachable with a hand-edited languages.json.
    #[error("no language profile configured for '{0}'")]
    Configuration(Language),

    #[error("required tool '{tool}' was not found on PATH")]
    ToolMissing { tool: String },

    #[error("compilation failed")]
    Compile { output: ProcessOutput },

    #[error("program exited with a failure status")]
    Runtime { output: ProcessOutput },

    #[error("{phase} timed out after {timeout_ms}ms")]
    Timeout {
        phase: &'static str,
        timeout_ms: u64,
        output: ProcessOutput,
    },

    #[error("run was cancelled")]
    Cancelled { output: ProcessOutput },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    InvalidRequest(String),
}

impl ExecutionError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        ExecutionError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            ExecutionError::Configuration(_) => ExecutionStatus::ConfigurationError,
            ExecutionError::ToolMissing { .. } => ExecutionStatus::ToolMissing,
            ExecutionError::Compile { .. } => ExecutionStatus::CompileError,
            ExecutionError::Runtime { .. } => ExecutionStatus::RuntimeError,
            ExecutionError::Timeout { .. } => ExecutionStatus::Timeout,
            ExecutionError::Cancelled { .. } => ExecutionStatus::Cancelled,
            ExecutionError::Io { .. } => ExecutionStatus::IoError,
            ExecutionError::InvalidRequest(_) => ExecutionStatus::Rejected,
        }
    }

    /// Captured process output carried by the variant, if any.
    pub fn output(&self) -> Option<&ProcessOutput> {
        match self {
            ExecutionError::Compile { output }
            | ExecutionError::Runtime { output }
            | ExecutionError::Timeout { output, .. }
            | ExecutionError::Cancelled { output } => Some(output),
            _ => None,
        }
    }
}

pub type ExecResult<T> = std::result::Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ExecutionError::Configuration(Language::Java).status(),
            ExecutionStatus::ConfigurationError
        );
        assert_eq!(
            ExecutionError::ToolMissing { tool: "gcc".into() }.status(),
            ExecutionStatus::ToolMissing
        );
        assert_eq!(
            ExecutionError::io("write source", io::Error::other("disk full")).status(),
            ExecutionStatus::IoError
        );
        assert_eq!(
            ExecutionError::InvalidRequest("No code to run!".into()).status(),
            ExecutionStatus::Rejected
        );
    }

    #[test]
    fn test_messages() {
        let err = ExecutionError::ToolMissing { tool: "javac".into() };
        assert_eq!(err.to_string(), "required tool 'javac' was not found on PATH");

        let err = ExecutionError::Timeout {
            phase: "Execution",
            timeout_ms: 250,
            output: ProcessOutput::default(),
        };
        assert_eq!(err.to_string(), "Execution timed out after 250ms");
        assert!(err.output().is_some());
    }
}
