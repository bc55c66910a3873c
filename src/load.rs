//! Build file loading: runs parsing, evaluates rule lines and fills in the
//! rule registry and variable environment.

use crate::canon::canon_path;
use crate::eval::{Binding, EvalString, Evaluator, Vars};
use crate::fs::FileSystem;
use crate::parse::{self, Assignment, Flavor, Statement};
use crate::rules::{FileLoc, Pattern, Rule, RuleRegistry, RuleTarget};
use crate::trace;
use anyhow::{anyhow, bail, Context};
use std::path::PathBuf;
use std::rc::Rc;

/// Includes nested deeper than this are assumed to include themselves.
const MAX_INCLUDE_DEPTH: usize = 32;

/// Internal state used while loading.
struct Loader<'a> {
    fs: &'a dyn FileSystem,
    rules: RuleRegistry,
    vars: Vars,
    depth: usize,
}

impl<'a> Loader<'a> {
    fn evaluate(&self, s: &EvalString) -> Result<String, crate::error::BuildError> {
        Evaluator::new(&self.vars, self.fs).evaluate(s)
    }

    fn read_file(&mut self, path: &str) -> anyhow::Result<()> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            bail!("{}: include nesting too deep", path);
        }
        let bytes = match trace::scope("fs::read", || self.fs.read(path)) {
            Ok(b) => b,
            Err(e) => bail!("read {}: {}", path, e),
        };
        self.depth += 1;
        let result = self.parse(PathBuf::from(path), &bytes);
        self.depth -= 1;
        result
    }

    fn parse(&mut self, path: PathBuf, bytes: &[u8]) -> anyhow::Result<()> {
        let filename = Rc::new(path);
        let mut parser = parse::Parser::new(bytes);
        loop {
            let stmt = match parser
                .read()
                .map_err(|err| anyhow!(parser.format_parse_error(&filename, err)))?
            {
                None => break,
                Some(s) => s,
            };
            match stmt {
                Statement::Assignment(assignment) => self.assign(&filename, assignment)?,
                Statement::Rule(rule) => self.add_rule(&filename, rule)?,
                Statement::Include { paths, line } => {
                    let paths = self
                        .evaluate(&paths)
                        .with_context(|| format!("{}:{}", filename.display(), line))?;
                    for path in paths.split_whitespace() {
                        let path = canon_path(path);
                        trace::scope("include", || self.read_file(&path))
                            .with_context(|| format!("{}:{}: include", filename.display(), line))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, filename: &Rc<PathBuf>, a: Assignment) -> anyhow::Result<()> {
        let loc = || format!("{}:{}", filename.display(), a.line);
        let binding = match a.flavor {
            Flavor::Recursive => Binding::Recursive(a.value.clone()),
            Flavor::Simple => Binding::Simple(self.evaluate(&a.value).with_context(loc)?),
            Flavor::Conditional => {
                if self.vars.is_defined(&a.name) {
                    return Ok(());
                }
                Binding::Recursive(a.value.clone())
            }
        };
        if !self.vars.define(&a.name, binding).with_context(loc)? {
            tracing::debug!("{}: {} overridden from the command line", loc(), a.name);
        }
        Ok(())
    }

    fn add_rule(&mut self, filename: &Rc<PathBuf>, r: parse::Rule) -> anyhow::Result<()> {
        let location = FileLoc {
            filename: filename.clone(),
            line: r.line,
        };
        let targets = self
            .evaluate(&r.targets)
            .with_context(|| location.to_string())?;
        let prereqs: Vec<String> = self
            .evaluate(&r.prereqs)
            .with_context(|| location.to_string())?
            .split_whitespace()
            .map(canon_path)
            .collect();

        if targets.trim() == ".PHONY" {
            for name in prereqs {
                self.rules.mark_phony(name);
            }
            return Ok(());
        }

        let recipe: Rc<[EvalString]> = r.recipe.into();
        for target in targets.split_whitespace() {
            let target = canon_path(target);
            if target.matches('%').count() > 1 {
                bail!("{}: more than one '%' in target {:?}", location, target);
            }
            let target = match Pattern::parse(&target) {
                Some(pattern) => {
                    if let Some(bad) = prereqs.iter().find(|p| p.matches('%').count() > 1) {
                        bail!("{}: more than one '%' in prerequisite {:?}", location, bad);
                    }
                    RuleTarget::Pattern(pattern)
                }
                None => RuleTarget::Literal(target),
            };
            self.rules.register(Rule {
                target,
                prereqs: prereqs.clone(),
                recipe: recipe.clone(),
                location: location.clone(),
            })?;
        }
        Ok(())
    }
}

/// State loaded by read().
pub struct State {
    pub rules: RuleRegistry,
    pub vars: Vars,
    /// The goal built when no target is requested.
    pub default: Option<String>,
}

/// Load a build file and everything it includes.  `vars` carries the
/// command-line overrides.
pub fn read(fs: &dyn FileSystem, path: &str, vars: Vars) -> anyhow::Result<State> {
    let mut loader = Loader {
        fs,
        rules: RuleRegistry::new(),
        vars,
        depth: 0,
    };
    trace::scope("loader.read_file", || loader.read_file(&canon_path(path)))?;

    let default = if loader.vars.is_defined(".DEFAULT_GOAL") {
        let goal = Evaluator::new(&loader.vars, fs).var(".DEFAULT_GOAL")?;
        let goal = goal.trim();
        if goal.is_empty() {
            None
        } else {
            Some(canon_path(goal))
        }
    } else {
        None
    };
    let default = default.or_else(|| loader.rules.first_target().map(str::to_owned));

    Ok(State {
        rules: loader.rules,
        vars: loader.vars,
        default,
    })
}
