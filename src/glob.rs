//! Shell-style globbing (`*`, `?`, `[...]`) against a FileSystem, for
//! `$(wildcard ...)`.

use crate::error::BuildError;
use crate::fs::FileSystem;
use globset::{GlobBuilder, GlobMatcher};

fn is_magic(component: &str) -> bool {
    component.chars().any(|c| matches!(c, '*' | '?' | '['))
}

fn compile(component: &str) -> Result<GlobMatcher, BuildError> {
    GlobBuilder::new(component)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| BuildError::FunctionArgument {
            function: "wildcard",
            message: err.to_string(),
        })
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Expand a glob into the existing paths it matches, sorted
/// lexicographically.  Matching is done one path component at a time, so `*`
/// never crosses a `/`, and dotfiles only match components that start with
/// `.` themselves.  A pattern without wildcards yields itself if it exists.
pub fn glob(fs: &dyn FileSystem, pattern: &str) -> Result<Vec<String>, BuildError> {
    let mut paths = vec![if pattern.starts_with('/') {
        "/".to_owned()
    } else {
        String::new()
    }];
    // Whether the paths so far came from directory listings or were just
    // assembled from text.
    let mut listed = false;

    for component in pattern.split('/').filter(|c| !c.is_empty()) {
        if !is_magic(component) {
            for path in paths.iter_mut() {
                *path = join(path, component);
            }
            listed = false;
            continue;
        }

        let matcher = compile(component)?;
        let mut next = Vec::new();
        for dir in &paths {
            // Unreadable or absent directories just contribute no matches.
            let names = match fs.read_dir(dir) {
                Ok(names) => names,
                Err(_) => continue,
            };
            for name in names {
                if name.starts_with('.') && !component.starts_with('.') {
                    continue;
                }
                if matcher.is_match(&name) {
                    next.push(join(dir, &name));
                }
            }
        }
        paths = next;
        listed = true;
        if paths.is_empty() {
            break;
        }
    }

    if !listed {
        let mut existing = Vec::with_capacity(paths.len());
        for path in paths {
            let mtime = fs.stat(&path).map_err(|source| BuildError::Stat {
                path: path.clone(),
                source,
            })?;
            if mtime.exists() {
                existing.push(path);
            }
        }
        paths = existing;
    }

    paths.sort();
    Ok(paths)
}
