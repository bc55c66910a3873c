//! Decides which nodes need building, from file existence and mtimes.

use crate::error::BuildError;
use crate::fs::{FileSystem, MTime};
use crate::graph::{Graph, NodeId};
use crate::trace;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

/// Why a node needs building, or None if it's up to date.
fn stale_reason(graph: &Graph, id: NodeId, assume_stale: &FxHashSet<String>) -> Option<String> {
    let node = graph.node(id);
    if node.phony {
        return Some("phony".to_owned());
    }
    if assume_stale.contains(&node.name) {
        return Some("assumed stale".to_owned());
    }
    let mtime = match node.mtime {
        MTime::Missing => return Some("missing".to_owned()),
        MTime::Stamp(mtime) => mtime,
    };
    for &prereq in &node.prereqs {
        let prereq = graph.node(prereq);
        if prereq.needs_build {
            return Some(format!("prerequisite {:?} needs building", prereq.name));
        }
        // Equal timestamps count as up to date.
        if let MTime::Stamp(prereq_mtime) = prereq.mtime {
            if prereq_mtime > mtime {
                return Some(format!("older than prerequisite {:?}", prereq.name));
            }
        }
    }
    None
}

/// Stat every node reachable from `roots` and set `needs_build` on each.
/// Files that are needed, missing and have no rule to make them are errors.
pub fn mark(
    graph: &mut Graph,
    roots: &[NodeId],
    fs: &dyn FileSystem,
    assume_stale: &FxHashSet<String>,
) -> Result<(), BuildError> {
    let order = graph.post_order(roots);

    let mtimes: Vec<MTime> = trace::scope("stat", || {
        let graph = &*graph;
        order
            .par_iter()
            .map(|&id| {
                let node = graph.node(id);
                if node.phony {
                    return Ok(MTime::Missing);
                }
                fs.stat(&node.name).map_err(|source| BuildError::Stat {
                    path: node.name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()
    })?;
    for (&id, mtime) in order.iter().zip(mtimes) {
        graph.node_mut(id).mtime = mtime;
    }

    for &id in &order {
        let node = graph.node(id);
        if node.rule.is_none() && !node.phony && !node.mtime.exists() {
            let name = node.name.clone();
            let needed_by = order
                .iter()
                .find(|&&other| graph.node(other).prereqs.contains(&id));
            return Err(match needed_by {
                Some(&other) if !roots.contains(&id) => BuildError::MissingSource {
                    name,
                    needed_by: graph.node(other).name.clone(),
                },
                _ => BuildError::NoRuleForTarget { target: name },
            });
        }

        let reason = stale_reason(graph, id, assume_stale);
        if let Some(reason) = &reason {
            tracing::debug!("{} is stale: {}", graph.node(id).name, reason);
        }
        graph.node_mut(id).needs_build = reason.is_some();
    }
    Ok(())
}
