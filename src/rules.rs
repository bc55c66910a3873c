//! Rules as declared in the build file, and finding the rule that makes a
//! given target.

use crate::error::BuildError;
use crate::eval::EvalString;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;
use std::rc::Rc;

/// A name containing a single `%` wildcard, e.g. `results/%.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    prefix: String,
    suffix: String,
}

impl Pattern {
    /// Splits text around its first `%`; None if there is no `%`.
    pub fn parse(text: &str) -> Option<Pattern> {
        let pos = text.find('%')?;
        Some(Pattern {
            prefix: text[..pos].to_owned(),
            suffix: text[pos + 1..].to_owned(),
        })
    }

    /// The text `%` stands for when this pattern matches `name`.
    /// The stem may be empty; pattern rules reject that, patsubst does not.
    pub fn match_stem<'a>(&self, name: &'a str) -> Option<&'a str> {
        if name.len() < self.prefix.len() + self.suffix.len() {
            return None;
        }
        name.strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())
    }

    pub fn substitute(&self, stem: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + stem.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(stem);
        out.push_str(&self.suffix);
        out
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%{}", self.prefix, self.suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    Literal(String),
    Pattern(Pattern),
}

impl std::fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleTarget::Literal(name) => f.write_str(name),
            RuleTarget::Pattern(pattern) => write!(f, "{}", pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileLoc {
    pub filename: Rc<PathBuf>,
    pub line: usize,
}
impl std::fmt::Display for FileLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}", self.filename.display(), self.line)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RuleId(usize);

#[derive(Debug)]
pub struct Rule {
    pub target: RuleTarget,
    /// Prerequisite names, already variable-expanded.  In pattern rules a `%`
    /// here stands for the stem.
    pub prereqs: Vec<String>,
    /// Recipe lines, expanded per target when the recipe runs.  Shared by all
    /// the targets of one rule line.
    pub recipe: Rc<[EvalString]>,
    pub location: FileLoc,
}

/// The rule chosen for a concrete target name.
#[derive(Debug)]
pub struct Match<'a> {
    pub id: RuleId,
    pub rule: &'a Rule,
    /// Set for pattern rules.
    pub stem: Option<String>,
}

impl<'a> Match<'a> {
    /// The rule's prerequisites with the stem substituted.
    pub fn prerequisites(&self) -> Vec<String> {
        match &self.stem {
            None => self.rule.prereqs.clone(),
            Some(stem) => self
                .rule
                .prereqs
                .iter()
                .map(|prereq| match Pattern::parse(prereq) {
                    Some(pattern) => pattern.substitute(stem),
                    None => prereq.clone(),
                })
                .collect(),
        }
    }
}

/// All rules of one build, plus the phony set.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    literal: FxHashMap<String, RuleId>,
    /// Pattern rules in declaration order; the first match wins.
    patterns: Vec<RuleId>,
    phony: FxHashSet<String>,
    first_target: Option<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        RuleRegistry::default()
    }

    pub fn register(&mut self, rule: Rule) -> Result<RuleId, BuildError> {
        let id = RuleId(self.rules.len());
        match &rule.target {
            RuleTarget::Literal(name) => {
                if let Some(&prev) = self.literal.get(name) {
                    return Err(BuildError::DuplicateTarget {
                        target: name.clone(),
                        location: rule.location.to_string(),
                        previous: self.rule(prev).location.to_string(),
                    });
                }
                // Special targets like .SUFFIXES never become the default.
                if self.first_target.is_none() && !name.starts_with('.') {
                    self.first_target = Some(name.clone());
                }
                self.literal.insert(name.clone(), id);
            }
            RuleTarget::Pattern(_) => self.patterns.push(id),
        }
        self.rules.push(rule);
        Ok(id)
    }

    pub fn mark_phony(&mut self, name: String) {
        self.phony.insert(name);
    }

    pub fn is_phony(&self, name: &str) -> bool {
        self.phony.contains(name)
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first declared literal target, the default goal absent any other
    /// instruction.
    pub fn first_target(&self) -> Option<&str> {
        self.first_target.as_deref()
    }

    pub fn lookup(&self, name: &str) -> Option<Match<'_>> {
        self.lookup_excluding(name, &[])
    }

    /// Like lookup, but never picks a pattern rule in `active`.  A pattern
    /// rule isn't used again for the prerequisites it produced, so rules
    /// like `%: %.in` end at a source file instead of recursing forever.
    pub fn lookup_excluding(&self, name: &str, active: &[RuleId]) -> Option<Match<'_>> {
        if let Some(&id) = self.literal.get(name) {
            return Some(Match {
                id,
                rule: self.rule(id),
                stem: None,
            });
        }
        // Phony targets are never made by pattern rules.
        if self.is_phony(name) {
            return None;
        }
        self.patterns.iter().find_map(|&id| {
            if active.contains(&id) {
                return None;
            }
            let rule = self.rule(id);
            let stem = match &rule.target {
                RuleTarget::Pattern(pattern) => pattern.match_stem(name)?,
                RuleTarget::Literal(_) => return None,
            };
            if stem.is_empty() {
                return None;
            }
            Some(Match {
                id,
                rule,
                stem: Some(stem.to_owned()),
            })
        })
    }
}
