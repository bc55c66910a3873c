//! Tests for behavior around missing files.

use super::*;

#[test]
fn missing_input() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out: in\n\ttouch out\n")?;

    let out = space.run(&mut remake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "no rule to make \"in\", needed by \"out\"");
    assert!(!space.exists("out"));

    Ok(())
}

#[test]
fn missing_target() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out: in\n\ttouch out\n")?;

    let out = space.run(&mut remake_command(vec!["nope"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "no rule to make target \"nope\"");

    Ok(())
}

#[test]
fn pattern_without_source() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", PIPELINE)?;
    space.write("books/isles.txt", "a b c\n")?;

    let out = space.run(&mut remake_command(vec!["results/jane_eyre.dat"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(
        &out,
        "no rule to make \"books/jane_eyre.txt\", needed by \"results/jane_eyre.dat\"",
    );

    Ok(())
}

#[test]
fn missing_generated() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "Makefile",
        "out: mid
\ttouch out
mid:
\techo never writes mid
",
    )?;

    let out = space.run_expect(&mut remake_command(vec!["out"]))?;
    assert_output_contains(&out, "echo never writes mid");
    assert_output_contains(&out, "touch out");

    // mid is still missing, so both rerun.
    let out = space.run_expect(&mut remake_command(vec!["out"]))?;
    assert_output_contains(&out, "remake: ran 2 recipes, now up to date");

    Ok(())
}
