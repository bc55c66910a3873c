//! Runs recipes, potentially in parallel.
//! Unaware of the build graph; a recipe is just a list of command lines run
//! in order on a worker thread, reporting back over a channel.

use crate::graph::NodeId;
use crate::process::{Spawner, Termination};
use crate::signal;
use anyhow::anyhow;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// The result of executing a whole recipe.
#[derive(Debug)]
pub struct TaskResult {
    pub termination: Termination,
    /// The command that didn't succeed, if any.
    pub failed_command: Option<String>,
}

pub struct FinishedTask {
    /// A (faked) "thread id", used to put different finished recipes in
    /// different tracks in a performance trace.
    pub tid: usize,
    pub id: NodeId,
    pub span: (Instant, Instant),
    pub result: TaskResult,
}

/// Events from running recipes, in the order they happened for each recipe.
pub enum Message {
    CommandStarted { id: NodeId, cmdline: String },
    CommandOutput { id: NodeId, output: Vec<u8> },
    Finished(FinishedTask),
}

/// Runs a recipe's commands in order, stopping at the first one that
/// doesn't succeed.
fn run_task(
    spawner: &dyn Spawner,
    id: NodeId,
    cmdlines: Vec<String>,
    timeout: Option<Duration>,
    tx: &mpsc::Sender<Message>,
) -> TaskResult {
    for cmdline in cmdlines {
        if signal::was_interrupted() {
            return TaskResult {
                termination: Termination::Interrupted,
                failed_command: Some(cmdline),
            };
        }
        // Sends only fail if the receiver disappeared, e.g. due to shutting down.
        let _ = tx.send(Message::CommandStarted {
            id,
            cmdline: cmdline.clone(),
        });
        let (termination, output) = match spawner.run(&cmdline, timeout) {
            Ok(result) => (result.termination, result.output),
            // Failing to start the shell at all is like the shell failing.
            Err(err) => (Termination::Failure(127), format!("{:#}\n", err).into_bytes()),
        };
        if !output.is_empty() {
            let _ = tx.send(Message::CommandOutput { id, output });
        }
        if termination != Termination::Success {
            return TaskResult {
                termination,
                failed_command: Some(cmdline),
            };
        }
    }
    TaskResult {
        termination: Termination::Success,
        failed_command: None,
    }
}

/// Tracks faked "thread ids" -- integers assigned to running recipes to
/// track parallelism in perf trace output.
struct ThreadIds {
    /// An entry is true when claimed, false or nonexistent otherwise.
    slots: Vec<bool>,
}
impl ThreadIds {
    fn new() -> Self {
        ThreadIds { slots: Vec::new() }
    }

    fn claim(&mut self) -> usize {
        match self.slots.iter().position(|&used| !used) {
            Some(idx) => {
                self.slots[idx] = true;
                idx
            }
            None => {
                let idx = self.slots.len();
                self.slots.push(true);
                idx
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.slots[slot] = false;
    }
}

pub struct Runner {
    spawner: Arc<dyn Spawner>,
    send: mpsc::Sender<Message>,
    recv: mpsc::Receiver<Message>,
    running: usize,
    tids: ThreadIds,
    parallelism: usize,
    timeout: Option<Duration>,
}

impl Runner {
    pub fn new(spawner: Arc<dyn Spawner>, parallelism: usize, timeout: Option<Duration>) -> Self {
        let (send, recv) = mpsc::channel();
        Runner {
            spawner,
            send,
            recv,
            running: 0,
            tids: ThreadIds::new(),
            parallelism: parallelism.max(1),
            timeout,
        }
    }

    pub fn can_start_more(&self) -> bool {
        self.running < self.parallelism
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn start(&mut self, id: NodeId, cmdlines: Vec<String>) {
        let tid = self.tids.claim();
        let tx = self.send.clone();
        let spawner = self.spawner.clone();
        let timeout = self.timeout;
        std::thread::spawn(move || {
            let start = Instant::now();
            let result = run_task(spawner.as_ref(), id, cmdlines, timeout, &tx);
            let finish = Instant::now();
            let _ = tx.send(Message::Finished(FinishedTask {
                tid,
                id,
                span: (start, finish),
                result,
            }));
        });
        self.running += 1;
    }

    /// Wait for the next event from a running recipe.
    pub fn wait(&mut self) -> anyhow::Result<Message> {
        let msg = self
            .recv
            .recv()
            .map_err(|_| anyhow!("task channel closed"))?;
        if let Message::Finished(task) = &msg {
            self.tids.release(task.tid);
            self.running -= 1;
        }
        Ok(msg)
    }
}
