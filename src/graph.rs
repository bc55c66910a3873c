//! The dependency graph of one build: a node per file reachable from the
//! requested targets, linked to the nodes of its prerequisites.

use crate::canon::canon_path;
use crate::error::BuildError;
use crate::eval::AutoVars;
use crate::fs::MTime;
use crate::rules::{RuleId, RuleRegistry};
use rustc_hash::FxHashMap;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeId(usize);
impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(index)
    }
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    /// The rule that makes this file, if any.  Files without one are sources.
    pub rule: Option<RuleId>,
    /// What `%` matched, when the rule is a pattern rule.
    pub stem: Option<String>,
    pub phony: bool,
    /// Deduplicated, in declaration order.
    pub prereqs: Vec<NodeId>,
    pub mtime: MTime,
    pub needs_build: bool,
}

/// All nodes, shared by id: a file needed by several targets is one node.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
    by_name: FxHashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Add the node for `name` and everything it depends on, returning its
    /// id.  Nodes already in the graph are reused.
    pub fn build(&mut self, rules: &RuleRegistry, name: &str) -> Result<NodeId, BuildError> {
        let mut stack = Vec::new();
        self.visit(rules, canon_path(name), &mut stack)
    }

    /// `stack` holds the nodes whose prerequisites are being visited; meeting
    /// one of them again means a cycle.
    fn visit(
        &mut self,
        rules: &RuleRegistry,
        name: String,
        stack: &mut Vec<NodeId>,
    ) -> Result<NodeId, BuildError> {
        if let Some(id) = self.lookup(&name) {
            if let Some(pos) = stack.iter().position(|&s| s == id) {
                let mut cycle: Vec<String> = stack[pos..]
                    .iter()
                    .map(|&s| self.node(s).name.clone())
                    .collect();
                cycle.push(name);
                return Err(BuildError::CyclicDependency { cycle });
            }
            return Ok(id);
        }

        // Pattern rules already making a node on the stack.
        let active: Vec<RuleId> = stack
            .iter()
            .map(|&s| self.node(s))
            .filter(|node| node.stem.is_some())
            .filter_map(|node| node.rule)
            .collect();
        let (rule, stem, prereq_names) = match rules.lookup_excluding(&name, &active) {
            Some(m) => {
                let prereqs = m.prerequisites();
                (Some(m.id), m.stem, prereqs)
            }
            None => (None, None, Vec::new()),
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.clone(),
            rule,
            stem,
            phony: rules.is_phony(&name),
            prereqs: Vec::new(),
            mtime: MTime::Missing,
            needs_build: false,
        });
        self.by_name.insert(name, id);

        stack.push(id);
        let mut prereqs = Vec::with_capacity(prereq_names.len());
        for prereq in prereq_names {
            let prereq = self.visit(rules, canon_path(prereq), stack)?;
            if !prereqs.contains(&prereq) {
                prereqs.push(prereq);
            }
        }
        stack.pop();

        self.nodes[id.0].prereqs = prereqs;
        Ok(id)
    }

    /// The automatic variable values for the recipe making `id`.
    pub fn auto_vars(&self, id: NodeId) -> AutoVars {
        let node = self.node(id);
        AutoVars {
            target: node.name.clone(),
            prereqs: node
                .prereqs
                .iter()
                .map(|&p| self.node(p).name.clone())
                .collect(),
            stem: node.stem.clone(),
        }
    }

    /// All nodes reachable from `roots`, each after its prerequisites, with
    /// prerequisites taken in declaration order.
    pub fn post_order(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        for &root in roots {
            if visited[root.0] {
                continue;
            }
            visited[root.0] = true;
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            while let Some(top) = stack.last_mut() {
                let (id, next) = *top;
                match self.nodes[id.0].prereqs.get(next) {
                    Some(&prereq) => {
                        top.1 += 1;
                        if !visited[prereq.0] {
                            visited[prereq.0] = true;
                            stack.push((prereq, 0));
                        }
                    }
                    None => {
                        order.push(id);
                        stack.pop();
                    }
                }
            }
        }
        order
    }
}
