//! Errors that callers may want to distinguish.  Everything else travels as
//! a plain anyhow::Error.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{location}: duplicate rule for {target:?}, first defined at {previous}")]
    DuplicateTarget {
        target: String,
        location: String,
        previous: String,
    },

    #[error("no rule to make target {target:?}")]
    NoRuleForTarget { target: String },

    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("no rule to make {name:?}, needed by {needed_by:?}")]
    MissingSource { name: String, needed_by: String },

    #[error("{target}: command {command:?} failed with exit code {code}")]
    RecipeFailed {
        target: String,
        command: String,
        code: i32,
    },

    #[error("{target}: command {command:?} timed out after {}s", .timeout.as_secs_f64())]
    RecipeTimeout {
        target: String,
        command: String,
        timeout: Duration,
    },

    #[error("{target}: interrupted")]
    Interrupted { target: String },

    /// A malformed `$(wildcard ...)` or `$(patsubst ...)` call.
    #[error("$({function} ...): {message}")]
    FunctionArgument {
        function: &'static str,
        message: String,
    },

    #[error("recursive variable {name:?} references itself (eventually)")]
    RecursiveVariable { name: String },

    #[error("variable {name:?} is already defined")]
    VariableRedefined { name: String },

    #[error("stat {path}: {source}")]
    Stat {
        path: String,
        source: std::io::Error,
    },
}
