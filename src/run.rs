//! Command-line entry point: flag parsing, logging setup and the top-level
//! load/build sequence.

use crate::eval::Vars;
use crate::fs::RealFileSystem;
use crate::process::ShellSpawner;
use crate::progress::ConsoleProgress;
use crate::{load, signal, trace, work};
use anyhow::{anyhow, bail};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Build files looked for when -f isn't given, in order.
const DEFAULT_BUILD_FILES: [&str; 3] = ["GNUmakefile", "makefile", "Makefile"];

#[derive(argh::FromArgs)]
/// remake, a make-style incremental build tool
struct Args {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// input build file [default=GNUmakefile, makefile or Makefile]
    #[argh(option, short = 'f')]
    file: Option<String>,

    /// print the commands that would run, without running them
    #[argh(switch, short = 'n')]
    dry_run: bool,

    /// treat TARGET as changed, rebuilding everything that depends on it
    #[argh(option, short = 'W')]
    what_if: Vec<String>,

    /// don't print commands as they run
    #[argh(switch, short = 's')]
    silent: bool,

    /// parallelism, 0 for one per CPU [default=1]
    #[argh(option, short = 'j', default = "1")]
    jobs: usize,

    /// kill any command running longer than this many seconds
    #[argh(option)]
    timeout: Option<f64>,

    /// warn about references to undefined variables
    #[argh(switch)]
    warn_undefined_variables: bool,

    /// debugging tools, "-d list" to list
    #[argh(option, short = 'd')]
    debug: Option<String>,

    /// targets to build, and NAME=VALUE variable overrides
    #[argh(positional)]
    args: Vec<String>,
}

fn init_logging(explain: bool) {
    let filter = if explain {
        EnvFilter::new("remake=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // Fails only if a subscriber is already installed, which is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .try_init();
}

/// Split free arguments into targets and `NAME=VALUE` overrides.
fn split_args(args: Vec<String>, vars: &mut Vars) -> anyhow::Result<Vec<String>> {
    let mut targets = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                // Accept make's `NAME:=VALUE` spelling too.
                let name = name.strip_suffix(':').unwrap_or(name).trim();
                if name.is_empty() {
                    bail!("invalid variable assignment {:?}", arg);
                }
                vars.set_override(name, value);
            }
            None => targets.push(arg),
        }
    }
    Ok(targets)
}

fn find_build_file(flag: Option<String>) -> anyhow::Result<String> {
    if let Some(file) = flag {
        return Ok(file);
    }
    match DEFAULT_BUILD_FILES
        .iter()
        .find(|name| Path::new(name).exists())
    {
        Some(name) => Ok(name.to_string()),
        None => bail!("no build file found (looked for {})", DEFAULT_BUILD_FILES.join(", ")),
    }
}

fn run_impl() -> anyhow::Result<i32> {
    let args: Args = argh::from_env();

    let mut explain = false;
    if let Some(debug) = &args.debug {
        match debug.as_str() {
            "list" => {
                println!("debug tools:");
                println!("  explain  print why each target is considered stale");
                println!("  trace    generate json performance trace");
                return Ok(1);
            }
            "explain" => explain = true,
            "trace" => trace::open("trace.json")?,
            _ => bail!("unknown -d {:?}, use -d list to list", debug),
        }
    }
    init_logging(explain);

    let parallelism = match args.jobs {
        0 => usize::from(std::thread::available_parallelism()?),
        n => n,
    };
    let timeout = match args.timeout {
        None => None,
        Some(secs) if secs > 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
        Some(secs) => bail!("invalid --timeout {}", secs),
    };

    let mut vars = Vars::new();
    vars.set_warn_undefined(args.warn_undefined_variables);
    let mut targets = split_args(args.args, &mut vars)?;

    if let Some(dir) = &args.chdir {
        let dir = Path::new(dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }

    let build_file = find_build_file(args.file)?;
    let fs = RealFileSystem::new();
    let state = trace::scope("load::read", || load::read(&fs, &build_file, vars))?;

    if targets.is_empty() {
        match &state.default {
            Some(default) => targets.push(default.clone()),
            None => bail!("no targets specified and no default target in {}", build_file),
        }
    }

    signal::register_sigint();

    let mut progress = ConsoleProgress::new(!args.silent, parallelism);
    let options = work::Options {
        dry_run: args.dry_run,
        assume_stale: args.what_if.into_iter().collect(),
        parallelism,
        timeout,
    };
    let mut work = work::Work::new(
        &state,
        &fs,
        Arc::new(ShellSpawner),
        &mut progress,
        options,
    );
    trace::scope("want_file", || -> anyhow::Result<()> {
        for target in &targets {
            work.want_file(target)?;
        }
        Ok(())
    })?;

    match trace::scope("work.run", || work.run())? {
        0 => {
            // Special case: don't print numbers when no work done.
            println!("remake: no work to do");
        }
        _ if args.dry_run => {}
        n => println!("remake: ran {} recipes, now up to date", n),
    }

    Ok(0)
}

pub fn run() -> anyhow::Result<i32> {
    let res = run_impl();
    if let Err(err) = trace::close() {
        tracing::warn!("writing trace: {}", err);
    }
    res
}
