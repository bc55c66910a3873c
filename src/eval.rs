//! Represents parsed build file strings with embedded variable references,
//! e.g. `python $(COUNT_SRC) $< > $@`, and mechanisms for expanding those into
//! plain strings.

use crate::error::BuildError;
use crate::fs::FileSystem;
use crate::glob::glob;
use crate::rules::Pattern;
use rustc_hash::{FxHashMap, FxHashSet};

/// Variables referencing variables deeper than this are assumed to be
/// referencing themselves.
pub const MAX_EVAL_DEPTH: usize = 64;

/// The per-recipe variables, `$@ $< $^ $*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoVar {
    /// `$@`: the target name.
    Target,
    /// `$<`: the first prerequisite, or empty.
    FirstPrereq,
    /// `$^`: all prerequisites, deduplicated.
    AllPrereqs,
    /// `$*`: the stem of a pattern rule match.
    Stem,
}

impl AutoVar {
    pub fn from_char(c: char) -> Option<AutoVar> {
        Some(match c {
            '@' => AutoVar::Target,
            '<' => AutoVar::FirstPrereq,
            '^' => AutoVar::AllPrereqs,
            '*' => AutoVar::Stem,
            _ => return None,
        })
    }
}

/// Built-in functions callable as `$(name args...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Wildcard,
    Patsubst,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "wildcard" => Some(Func::Wildcard),
            "patsubst" => Some(Func::Patsubst),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Wildcard => "wildcard",
            Func::Patsubst => "patsubst",
        }
    }

    /// Number of comma-separated arguments; commas past the last one are
    /// part of the final argument.
    pub fn arity(&self) -> usize {
        match self {
            Func::Wildcard => 1,
            Func::Patsubst => 3,
        }
    }
}

/// One token within an EvalString.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalPart {
    Literal(String),
    /// `$(NAME)`, `${NAME}` or `$N`.
    VarRef(String),
    /// `$(NAME:from=to)`.
    SubstRef {
        name: String,
        from: String,
        to: String,
    },
    Auto(AutoVar),
    Call(Func, Vec<EvalString>),
}

/// A parsed but unexpanded variable-reference string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvalString(Vec<EvalPart>);

impl EvalString {
    pub fn new(parts: Vec<EvalPart>) -> Self {
        EvalString(parts)
    }

    pub fn literal(text: impl Into<String>) -> Self {
        EvalString(vec![EvalPart::Literal(text.into())])
    }

    pub fn parts(&self) -> &[EvalPart] {
        &self.0
    }

    pub fn maybe_literal(&self) -> Option<&str> {
        match self.0.as_slice() {
            [] => Some(""),
            [EvalPart::Literal(text)] => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// `NAME = value`: expanded on each use.
    Recursive(EvalString),
    /// `NAME := value`: expanded once, when defined.
    Simple(String),
}

/// The variable environment of one build.  A name is bound at most once;
/// names given on the command line shadow the build file's bindings.
#[derive(Default)]
pub struct Vars {
    bindings: FxHashMap<String, Binding>,
    overridden: FxHashSet<String>,
    warn_undefined: bool,
}

impl Vars {
    pub fn new() -> Self {
        Vars::default()
    }

    pub fn set_warn_undefined(&mut self, warn: bool) {
        self.warn_undefined = warn;
    }

    /// Bind a command-line `NAME=VALUE`.
    pub fn set_override(&mut self, name: &str, value: &str) {
        self.bindings
            .insert(name.to_owned(), Binding::Simple(value.to_owned()));
        self.overridden.insert(name.to_owned());
    }

    /// Bind a build file variable.  Returns false if the binding was ignored
    /// because the command line overrides it.
    pub fn define(&mut self, name: &str, binding: Binding) -> Result<bool, BuildError> {
        if self.overridden.contains(name) {
            return Ok(false);
        }
        if self.bindings.contains_key(name) {
            return Err(BuildError::VariableRedefined {
                name: name.to_owned(),
            });
        }
        self.bindings.insert(name.to_owned(), binding);
        Ok(true)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }
}

/// Values of the automatic variables for one target's recipe.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AutoVars {
    pub target: String,
    pub prereqs: Vec<String>,
    pub stem: Option<String>,
}

impl AutoVars {
    fn write(&self, result: &mut String, var: AutoVar) {
        match var {
            AutoVar::Target => result.push_str(&self.target),
            AutoVar::FirstPrereq => {
                if let Some(first) = self.prereqs.first() {
                    result.push_str(first);
                }
            }
            AutoVar::AllPrereqs => push_words(result, self.prereqs.iter().map(String::as_str)),
            AutoVar::Stem => {
                if let Some(stem) = &self.stem {
                    result.push_str(stem);
                }
            }
        }
    }
}

fn push_words<'a>(result: &mut String, words: impl IntoIterator<Item = &'a str>) {
    for (i, word) in words.into_iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        result.push_str(word);
    }
}

/// Rewrite each word matching `from` into `to`, keeping order.  `%` in `from`
/// captures a stem that replaces `%` in `to`; without a `%`, `from` must match
/// the whole word.  Words that don't match pass through unchanged.
pub fn pattern_substitute(from: &str, to: &str, words: &[&str]) -> Vec<String> {
    let from_pattern = Pattern::parse(from);
    let to_pattern = Pattern::parse(to);
    words
        .iter()
        .map(|&word| {
            let stem = match &from_pattern {
                Some(pattern) => pattern.match_stem(word),
                None if word == from => Some(""),
                None => None,
            };
            match (stem, &to_pattern) {
                (None, _) => word.to_owned(),
                (Some(stem), Some(pattern)) => pattern.substitute(stem),
                (Some(_), None) => to.to_owned(),
            }
        })
        .collect()
}

/// Expands EvalStrings against a variable environment.  Automatic variables
/// expand to nothing unless a recipe's values were provided.
pub struct Evaluator<'a> {
    vars: &'a Vars,
    fs: &'a dyn FileSystem,
    auto: Option<&'a AutoVars>,
}

impl<'a> Evaluator<'a> {
    pub fn new(vars: &'a Vars, fs: &'a dyn FileSystem) -> Self {
        Evaluator {
            vars,
            fs,
            auto: None,
        }
    }

    pub fn with_auto(mut self, auto: &'a AutoVars) -> Self {
        self.auto = Some(auto);
        self
    }

    pub fn evaluate(&self, s: &EvalString) -> Result<String, BuildError> {
        let mut result = String::new();
        self.evaluate_inner(&mut result, s, 0)?;
        Ok(result)
    }

    /// The fully expanded value of a variable; empty if undefined.
    pub fn var(&self, name: &str) -> Result<String, BuildError> {
        let mut result = String::new();
        self.var_inner(&mut result, name, 0)?;
        Ok(result)
    }

    fn evaluate_inner(
        &self,
        result: &mut String,
        s: &EvalString,
        depth: usize,
    ) -> Result<(), BuildError> {
        for part in s.parts() {
            match part {
                EvalPart::Literal(text) => result.push_str(text),
                EvalPart::VarRef(name) => self.var_inner(result, name, depth)?,
                EvalPart::SubstRef { name, from, to } => {
                    let mut value = String::new();
                    self.var_inner(&mut value, name, depth)?;
                    // `$(X:.txt=.dat)` is shorthand for `$(patsubst %.txt,%.dat,$(X))`.
                    let (from, to) = if from.contains('%') {
                        (from.clone(), to.clone())
                    } else {
                        (format!("%{}", from), format!("%{}", to))
                    };
                    let words: Vec<&str> = value.split_whitespace().collect();
                    let subst = pattern_substitute(&from, &to, &words);
                    push_words(result, subst.iter().map(String::as_str));
                }
                EvalPart::Auto(var) => {
                    if let Some(auto) = self.auto {
                        auto.write(result, *var);
                    }
                }
                EvalPart::Call(func, args) => self.call(result, *func, args, depth)?,
            }
        }
        Ok(())
    }

    fn var_inner(&self, result: &mut String, name: &str, depth: usize) -> Result<(), BuildError> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(BuildError::RecursiveVariable {
                name: name.to_owned(),
            });
        }
        match self.vars.get(name) {
            Some(Binding::Simple(value)) => result.push_str(value),
            Some(Binding::Recursive(value)) => self.evaluate_inner(result, value, depth + 1)?,
            None => {
                if self.vars.warn_undefined {
                    tracing::warn!("undefined variable {:?}", name);
                }
            }
        }
        Ok(())
    }

    fn call(
        &self,
        result: &mut String,
        func: Func,
        args: &[EvalString],
        depth: usize,
    ) -> Result<(), BuildError> {
        let want = func.arity();
        if args.len() != want {
            return Err(BuildError::FunctionArgument {
                function: func.name(),
                message: format!("expected {} argument(s), got {}", want, args.len()),
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let mut value = String::new();
            self.evaluate_inner(&mut value, arg, depth + 1)?;
            values.push(value);
        }

        match func {
            Func::Wildcard => {
                let mut matches = Vec::new();
                for pattern in values[0].split_whitespace() {
                    matches.extend(glob(self.fs, pattern)?);
                }
                push_words(result, matches.iter().map(String::as_str));
            }
            Func::Patsubst => {
                let from = values[0].trim();
                let to = values[1].trim();
                if from.is_empty() {
                    return Err(BuildError::FunctionArgument {
                        function: func.name(),
                        message: "empty pattern".to_owned(),
                    });
                }
                let words: Vec<&str> = values[2].split_whitespace().collect();
                let subst = pattern_substitute(from, to, &words);
                push_words(result, subst.iter().map(String::as_str));
            }
        }
        Ok(())
    }
}
