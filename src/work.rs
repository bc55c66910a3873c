//! Build runner, choosing and executing recipes in dependency order.

use crate::canon::canon_path;
use crate::error::BuildError;
use crate::eval::Evaluator;
use crate::fs::FileSystem;
use crate::graph::{Graph, NodeId};
use crate::load::State;
use crate::process::{Spawner, Termination};
use crate::progress::Progress;
use crate::task::{Message, Runner};
use crate::{signal, stale, trace};
use anyhow::Context;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct Options {
    /// Print the commands that would run instead of running them.
    pub dry_run: bool,
    /// Targets to rebuild regardless of mtimes, along with their dependents.
    pub assume_stale: FxHashSet<String>,
    /// Maximum number of recipes running at once.
    pub parallelism: usize,
    /// Per-command time limit.
    pub timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            dry_run: false,
            assume_stale: FxHashSet::default(),
            parallelism: 1,
            timeout: None,
        }
    }
}

pub struct Work<'a> {
    graph: Graph,
    state: &'a State,
    fs: &'a dyn FileSystem,
    runner: Runner,
    progress: &'a mut dyn Progress,
    options: Options,
    /// The requested targets.
    roots: Vec<NodeId>,
}

impl<'a> Work<'a> {
    pub fn new(
        state: &'a State,
        fs: &'a dyn FileSystem,
        spawner: Arc<dyn Spawner>,
        progress: &'a mut dyn Progress,
        mut options: Options,
    ) -> Self {
        // Graph nodes are named by canonical path; match -W names the same way.
        options.assume_stale = options.assume_stale.drain().map(canon_path).collect();
        let runner = Runner::new(spawner, options.parallelism, options.timeout);
        Work {
            graph: Graph::new(),
            state,
            fs,
            runner,
            progress,
            options,
            roots: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Request a target be brought up to date by run().
    pub fn want_file(&mut self, name: &str) -> anyhow::Result<NodeId> {
        let id = self.graph.build(&self.state.rules, name)?;
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
        Ok(id)
    }

    /// The expanded command lines of a node's recipe; blank lines dropped.
    fn expand_recipe(&self, id: NodeId) -> anyhow::Result<Vec<String>> {
        let node = self.graph.node(id);
        let rule = match node.rule {
            Some(rule) => self.state.rules.rule(rule),
            None => return Ok(Vec::new()),
        };
        let auto = self.graph.auto_vars(id);
        let evaluator = Evaluator::new(&self.state.vars, self.fs).with_auto(&auto);
        let mut cmdlines = Vec::with_capacity(rule.recipe.len());
        for line in rule.recipe.iter() {
            let cmdline = evaluator
                .evaluate(line)
                .with_context(|| format!("{}: recipe for {:?}", rule.location, node.name))?;
            if !cmdline.trim().is_empty() {
                cmdlines.push(cmdline);
            }
        }
        Ok(cmdlines)
    }

    /// Pick up a node's new mtime after its recipe ran.
    fn refresh(&mut self, id: NodeId) -> Result<(), BuildError> {
        let node = self.graph.node_mut(id);
        if node.phony {
            return Ok(());
        }
        node.mtime = self.fs.stat(&node.name).map_err(|source| BuildError::Stat {
            path: node.name.clone(),
            source,
        })?;
        if !node.mtime.exists() && node.rule.is_some() {
            tracing::debug!("recipe for {} did not create it", node.name);
        }
        Ok(())
    }

    fn print_commands(&mut self, order: &[NodeId]) -> anyhow::Result<usize> {
        let mut count = 0;
        for &id in order {
            let cmdlines = self.expand_recipe(id)?;
            if cmdlines.is_empty() {
                continue;
            }
            for cmdline in &cmdlines {
                self.progress.log(cmdline);
            }
            count += 1;
        }
        Ok(count)
    }

    fn execute(&mut self, mut pending: Vec<NodeId>) -> anyhow::Result<usize> {
        // Nodes not pending are up to date already.
        let mut finished = vec![true; self.graph.len()];
        for &id in &pending {
            finished[id.index()] = false;
        }
        let mut ran = 0;
        let mut failure: Option<anyhow::Error> = None;

        loop {
            while failure.is_none() && !signal::was_interrupted() && self.runner.can_start_more() {
                // Pending is in post-order, so the first ready node is the
                // one a serial build would run next.
                let graph = &self.graph;
                let ready = pending.iter().position(|&id| {
                    graph
                        .node(id)
                        .prereqs
                        .iter()
                        .all(|prereq| finished[prereq.index()])
                });
                let id = match ready {
                    Some(pos) => pending.remove(pos),
                    None => break,
                };
                let cmdlines = match self.expand_recipe(id) {
                    Ok(cmdlines) => cmdlines,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                if cmdlines.is_empty() {
                    self.refresh(id)?;
                    finished[id.index()] = true;
                    continue;
                }
                self.runner.start(id, cmdlines);
            }

            if !self.runner.is_running() {
                break;
            }

            match self.runner.wait()? {
                Message::CommandStarted { id, cmdline } => self.progress.command_started(id, &cmdline),
                Message::CommandOutput { id, output } => self.progress.command_output(id, &output),
                Message::Finished(task) => {
                    let target = self.graph.node(task.id).name.clone();
                    trace::write_complete(&target, task.tid + 1, task.span.0, task.span.1);
                    let termination = task.result.termination;
                    self.progress.task_finished(task.id, &target, termination);
                    let command = task.result.failed_command.unwrap_or_default();
                    let err = match termination {
                        Termination::Success => {
                            ran += 1;
                            self.refresh(task.id)?;
                            finished[task.id.index()] = true;
                            continue;
                        }
                        Termination::Failure(code) => BuildError::RecipeFailed {
                            target,
                            command,
                            code,
                        },
                        Termination::TimedOut => BuildError::RecipeTimeout {
                            target,
                            command,
                            timeout: self.options.timeout.unwrap_or_default(),
                        },
                        Termination::Interrupted => BuildError::Interrupted { target },
                    };
                    // Later failures of recipes already running are only
                    // shown, not returned.
                    if failure.is_none() {
                        failure = Some(err.into());
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(&id) = pending.first() {
            // Only an interrupt leaves work undone without a failure.
            return Err(BuildError::Interrupted {
                target: self.graph.node(id).name.clone(),
            }
            .into());
        }
        Ok(ran)
    }

    /// Bring the wanted targets up to date, returning the number of recipes
    /// run (or in a dry run, that would have run).
    pub fn run(&mut self) -> anyhow::Result<usize> {
        let roots = self.roots.clone();
        trace::scope("stale::mark", || {
            stale::mark(
                &mut self.graph,
                &roots,
                self.fs,
                &self.options.assume_stale,
            )
        })?;
        let graph = &self.graph;
        let order: Vec<NodeId> = graph
            .post_order(&roots)
            .into_iter()
            .filter(|&id| graph.node(id).needs_build)
            .collect();

        if self.options.dry_run {
            return self.print_commands(&order);
        }
        trace::scope("work.execute", || self.execute(order))
    }
}
