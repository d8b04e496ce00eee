//! Unified error types for the pmem-usc-core library.
//!
//! Uses SNAFU for context-rich error handling. Every failure carries enough
//! context (raw command output, the offending path or field name) to diagnose
//! without re-running the external tool.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to spawn an external command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// The input directory does not exist or is not a directory.
    #[snafu(display("'{}' is not an existing directory", path.display()))]
    PathNotFound { path: PathBuf },

    /// Resolution succeeded syntactically but the device does not exist.
    #[snafu(display("device not found: {message}"))]
    DeviceNotFound { message: String },

    /// An expected line, row or column is missing from textual tool output.
    #[snafu(display("output of '{command}' could not be parsed:\n{output}"))]
    UnparsableToolOutput { command: String, output: String },

    /// An expected key is absent from structured output or from a DIMM handle.
    #[snafu(display("missing field '{field}'"))]
    MissingField { field: String },

    /// External command returned a non-zero exit status.
    #[snafu(display("command '{command}' exited with code {code}: {output}"))]
    ToolInvocationFailed {
        command: String,
        code: i32,
        output: String,
    },

    /// The supplied or selected tool cannot operate in this configuration.
    #[snafu(display("invalid unsafe-shutdown tool: {message}"))]
    InvalidToolType { message: String },
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }
}
