//! Tests for command-line flags.

use super::*;
use std::time::{Duration, Instant};

fn pipeline_space() -> anyhow::Result<TestSpace> {
    let space = TestSpace::new()?;
    space.write("Makefile", PIPELINE)?;
    space.write("books/isles.txt", "a b c\n")?;
    space.write("books/abyss.txt", "x y\n")?;
    Ok(space)
}

#[test]
fn dry_run() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    let out = space.run_expect(&mut remake_command(vec!["-n"]))?;
    assert_output_contains(&out, "mkdir -p results\nwc -w < books/isles.txt > results/isles.dat\n");
    assert_output_not_contains(&out, "remake: ran");
    assert!(!space.exists("results"));
    Ok(())
}

#[test]
fn dry_run_silent_still_prints() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    let out = space.run_expect(&mut remake_command(vec!["-n", "-s"]))?;
    assert_output_contains(&out, "wc -w < books/abyss.txt > results/abyss.dat");
    Ok(())
}

#[test]
fn silent() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", ".PHONY: hello\nhello:\n\techo hello world\n")?;
    let out = space.run_expect(&mut remake_command(vec!["-s", "hello"]))?;
    assert_output_not_contains(&out, "echo hello");
    assert_output_contains(&out, "hello world\n");
    Ok(())
}

#[test]
fn chdir_and_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("sub/build.mk", "out:\n\ttouch out\n")?;
    space.run_expect(&mut remake_command(vec!["-C", "sub", "-f", "build.mk"]))?;
    assert!(space.exists("sub/out"));
    Ok(())
}

#[test]
fn variable_override() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "Makefile",
        "GREETING := hello\n.PHONY: say\nsay:\n\techo $(GREETING)\n",
    )?;
    let out = space.run_expect(&mut remake_command(vec!["say", "GREETING=bonjour"]))?;
    assert_output_contains(&out, "echo bonjour\nbonjour\n");
    Ok(())
}

#[test]
fn what_if() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    space.run_expect(&mut remake_command(vec![]))?;
    let out = space.run_expect(&mut remake_command(vec!["-W", "books/isles.txt"]))?;
    assert_output_contains(&out, "books/isles.txt");
    assert_output_not_contains(&out, "books/abyss.txt");
    Ok(())
}

#[test]
fn parallel() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    let out = space.run_expect(&mut remake_command(vec!["-j", "2"]))?;
    assert_output_contains(&out, "remake: ran 2 recipes, now up to date");
    assert!(space.exists("results/isles.dat"));
    assert!(space.exists("results/abyss.dat"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn timeout() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", ".PHONY: slow\nslow:\n\tsleep 10\n")?;
    let start = Instant::now();
    let out = space.run(&mut remake_command(vec!["--timeout", "0.2", "slow"]))?;
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "timed out");
    Ok(())
}

#[test]
fn warn_undefined_variables() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", ".PHONY: say\nsay:\n\techo [$(NOPE)]\n")?;
    let out = space.run_expect(&mut remake_command(vec![
        "--warn-undefined-variables",
        "say",
    ]))?;
    assert_output_contains(&out, "echo []\n");
    assert_stderr_contains(&out, "undefined variable \"NOPE\"");
    Ok(())
}

#[test]
fn debug_list() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut remake_command(vec!["-d", "list"]))?;
    assert_output_contains(&out, "explain");
    assert_output_contains(&out, "trace");
    Ok(())
}

#[test]
fn debug_trace() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out:\n\ttouch out\n")?;
    space.run_expect(&mut remake_command(vec!["-d", "trace"]))?;
    let trace = String::from_utf8(space.read("trace.json")?)?;
    assert!(trace.starts_with('['));
    assert!(trace.contains("\"out\""));
    Ok(())
}
