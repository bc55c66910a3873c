//! Running recipe commands.  The executor only talks to the Spawner trait,
//! so builds can run against a fake in tests.

use std::time::Duration;

pub use crate::process_posix::run_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Interrupted,
    /// Carries the exit code; 128+N for death by signal N.
    Failure(i32),
    TimedOut,
}

#[derive(Debug)]
pub struct CommandResult {
    pub termination: Termination,
    /// stdout and stderr, interleaved as the command wrote them.
    pub output: Vec<u8>,
}

pub trait Spawner: Send + Sync {
    /// Run one command line to completion, killing it after `timeout`.
    fn run(&self, cmdline: &str, timeout: Option<Duration>) -> anyhow::Result<CommandResult>;
}

/// Runs commands with `/bin/sh -c`.
#[derive(Default)]
pub struct ShellSpawner;

impl Spawner for ShellSpawner {
    fn run(&self, cmdline: &str, timeout: Option<Duration>) -> anyhow::Result<CommandResult> {
        run_command(cmdline, timeout)
    }
}
