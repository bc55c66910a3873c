//! Build progress reporting: echoing recipe commands and relaying their
//! output to the console.

use crate::graph::NodeId;
use crate::process::Termination;
use rustc_hash::FxHashMap;
use std::io::Write;

/// Trait for build progress notifications.
pub trait Progress {
    /// Called when a recipe command starts, or in a dry run, would start.
    fn command_started(&mut self, id: NodeId, cmdline: &str);

    /// Called with the captured output of a command once it exits.
    fn command_output(&mut self, id: NodeId, output: &[u8]);

    /// Called when a recipe completes, successfully or not.
    fn task_finished(&mut self, id: NodeId, target: &str, termination: Termination);

    /// Log a line of output.
    fn log(&mut self, msg: &str);
}

/// Progress implementation for a plain console, make style: each command is
/// printed before it runs, followed by whatever it printed.
pub struct ConsoleProgress<W: Write = std::io::Stdout> {
    out: W,
    /// Whether to print command lines.
    echo: bool,
    /// With several recipes running at once, each recipe's echo and output
    /// is held back and written as one block when it finishes.
    buffers: Option<FxHashMap<NodeId, Vec<u8>>>,
}

impl ConsoleProgress {
    pub fn new(echo: bool, parallelism: usize) -> Self {
        Self::with_writer(std::io::stdout(), echo, parallelism)
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn with_writer(out: W, echo: bool, parallelism: usize) -> Self {
        ConsoleProgress {
            out,
            echo,
            buffers: if parallelism > 1 {
                Some(FxHashMap::default())
            } else {
                None
            },
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(err) = self.out.write_all(bytes).and_then(|_| self.out.flush()) {
            tracing::warn!("writing output: {}", err);
        }
    }

    fn emit(&mut self, id: NodeId, bytes: &[u8]) {
        match &mut self.buffers {
            Some(buffers) => buffers.entry(id).or_default().extend_from_slice(bytes),
            None => self.write(bytes),
        }
    }
}

impl<W: Write> Progress for ConsoleProgress<W> {
    fn command_started(&mut self, id: NodeId, cmdline: &str) {
        if self.echo {
            self.emit(id, format!("{}\n", cmdline).as_bytes());
        }
    }

    fn command_output(&mut self, id: NodeId, output: &[u8]) {
        self.emit(id, output);
        if !output.ends_with(b"\n") {
            self.emit(id, b"\n");
        }
    }

    fn task_finished(&mut self, id: NodeId, target: &str, termination: Termination) {
        if let Some(buffered) = self.buffers.as_mut().and_then(|b| b.remove(&id)) {
            self.write(&buffered);
        }
        match termination {
            Termination::Success => {}
            Termination::Interrupted => self.log(&format!("interrupted: {}", target)),
            Termination::Failure(_) | Termination::TimedOut => {
                self.log(&format!("failed: {}", target))
            }
        }
    }

    fn log(&mut self, msg: &str) {
        self.write(format!("{}\n", msg).as_bytes());
    }
}
