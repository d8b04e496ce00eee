//! Command execution abstraction.
//!
//! This module provides the seam between the library and the external
//! vendor tools it drives. Production code shells out through
//! [`SystemRunner`]; tests substitute a scripted implementation so that
//! tool output parsing can be exercised without the tools installed.

use std::process::Command;

use crate::error::{IoResultExt, Result};

/// Captured result of a single external command invocation.
///
/// Invocations are synchronous and blocking; the exit status and both
/// output streams are available once the process has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns true if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Both output streams combined, for diagnostic reports.
    pub fn merged(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (false, true) => self.stdout.clone(),
            _ => self.stderr.clone(),
        }
    }
}

/// Runs external commands and captures their output.
///
/// Implementations must be blocking: `run` returns only after the
/// command has exited. A spawn failure (tool not installed, permission
/// denied) is an error; a non-zero exit status is not — callers decide
/// how to interpret it.
pub trait CommandRunner {
    /// Runs `program` with `args` and captures its output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Production runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .command_context(display_command(program, args))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Formats a program and its arguments as a single command line for
/// error messages.
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by the unit tests of the modules that
    //! shell out to vendor tools.

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{CommandOutput, CommandRunner, display_command};
    use crate::error::Result;

    #[derive(Default)]
    struct Inner {
        outputs: RefCell<VecDeque<CommandOutput>>,
        calls: RefCell<Vec<String>>,
    }

    /// Replays queued outputs in order and records every invocation.
    ///
    /// Clones share state, so a test can keep one handle for assertions
    /// while moving another into the code under test.
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedRunner {
        inner: Rc<Inner>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queues a successful invocation producing `stdout`.
        pub(crate) fn expect_ok(self, stdout: &str) -> Self {
            self.inner.outputs.borrow_mut().push_back(CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            });
            self
        }

        /// Queues a failing invocation with `code` and `stderr`.
        pub(crate) fn expect_fail(self, code: i32, stderr: &str) -> Self {
            self.inner.outputs.borrow_mut().push_back(CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            });
            self
        }

        /// Command lines recorded so far.
        pub(crate) fn calls(&self) -> Vec<String> {
            self.inner.calls.borrow().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.inner
                .calls
                .borrow_mut()
                .push(display_command(program, args));
            let output = self.inner.outputs.borrow_mut().pop_front();
            Ok(output.unwrap_or_else(|| panic!("unexpected command: {program} {args:?}")))
        }
    }
}
