//! Command Executor: run a host command to completion and capture its output.
//!
//! `SystemExecutor` is the production implementation. `ScriptedExecutor`
//! answers from per-program responders and records every invocation, for
//! tests and dry runs.

use std::collections::HashMap;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Captured result of one command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code; `None` when the process was killed by a signal or never started.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + self.stderr.len());
        s.push_str(&self.stdout);
        s.push_str(&self.stderr);
        s
    }
}

/// Synchronous, blocking command execution.
pub trait CommandExecutor: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> CommandOutput;

    /// Run `command_line` as the OS identity `user` through a login shell, so
    /// the identity's own profile (including runcom exports) is sourced.
    fn run_as(&self, user: &str, command_line: &str) -> CommandOutput {
        self.run("runuser", &[user, "-l", "-c", command_line])
    }
}

/// Render a command and its arguments for logs and error addenda.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut s = program.to_string();
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}

// ---------------------------------------------------------------------------
// SystemExecutor
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> CommandOutput {
        tracing::debug!(command = %command_line(program, args), "exec.run");
        match Command::new(program).args(args).output() {
            Ok(out) => CommandOutput {
                success: out.status.success(),
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            },
            Err(e) => {
                tracing::warn!(program = %program, error = %e, "exec.spawn_failed");
                CommandOutput::failure(None, "", format!("{program}: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor (for tests)
// ---------------------------------------------------------------------------

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

type Responder = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

/// Answers commands from registered responders. Programs without a responder
/// fail with exit code 127, like a shell would for a missing binary.
#[derive(Default)]
pub struct ScriptedExecutor {
    responders: HashMap<String, Responder>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, program: &str, f: F) -> Self
    where
        F: Fn(&[String]) -> CommandOutput + Send + Sync + 'static,
    {
        self.responders.insert(program.to_string(), Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Argument lists of every call made to `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .map(|c| c.args)
            .collect()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run(&self, program: &str, args: &[&str]) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                program: program.to_string(),
                args: args.clone(),
            });
        match self.responders.get(program) {
            Some(respond) => respond(&args),
            None => CommandOutput::failure(Some(127), "", format!("{program}: command not found")),
        }
    }
}
