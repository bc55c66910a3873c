use crate::e2e::*;

fn pipeline_space() -> anyhow::Result<TestSpace> {
    let space = TestSpace::new()?;
    space.write("Makefile", PIPELINE)?;
    space.write("books/isles.txt", "a b c\n")?;
    space.write("books/abyss.txt", "x y\n")?;
    Ok(space)
}

fn word_count(space: &TestSpace, path: &str) -> anyhow::Result<String> {
    Ok(String::from_utf8(space.read(path)?)?.trim().to_owned())
}

#[test]
fn empty_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "")?;
    let out = space.run(&mut remake_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "no targets specified and no default target");
    Ok(())
}

#[test]
fn no_build_file() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut remake_command(vec![]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "no build file found");
    Ok(())
}

#[test]
fn basic_build() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    let out = space.run_expect(&mut remake_command(vec![]))?;
    assert_output_contains(&out, "wc -w < books/isles.txt > results/isles.dat");
    assert_output_contains(&out, "wc -w < books/abyss.txt > results/abyss.dat");
    assert_output_contains(&out, "remake: ran 2 recipes, now up to date");
    assert_eq!(word_count(&space, "results/isles.dat")?, "3");
    assert_eq!(word_count(&space, "results/abyss.dat")?, "2");

    let out = space.run_expect(&mut remake_command(vec![]))?;
    assert_eq!(std::str::from_utf8(&out.stdout)?, "remake: no work to do\n");
    Ok(())
}

#[test]
fn rebuild_after_input_changes() -> anyhow::Result<()> {
    let space = pipeline_space()?;
    space.run_expect(&mut remake_command(vec![]))?;

    space.set_mtime("books/isles.txt", 1_000)?;
    space.set_mtime("books/abyss.txt", 1_000)?;
    space.set_mtime("results/isles.dat", 2_000)?;
    space.set_mtime("results/abyss.dat", 2_000)?;
    space.write("books/abyss.txt", "x y z w\n")?;
    space.set_mtime("books/abyss.txt", 3_000)?;

    let out = space.run_expect(&mut remake_command(vec![]))?;
    assert_output_contains(&out, "books/abyss.txt");
    assert_output_not_contains(&out, "books/isles.txt");
    assert_output_contains(&out, "remake: ran 1 recipes, now up to date");
    assert_eq!(word_count(&space, "results/abyss.dat")?, "4");
    Ok(())
}

#[test]
fn equal_mtimes_are_up_to_date() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out: in\n\ttouch out\n")?;
    space.write("in", "")?;
    space.write("out", "")?;
    space.set_mtime("in", 5_000)?;
    space.set_mtime("out", 5_000)?;
    let out = space.run_expect(&mut remake_command(vec!["out"]))?;
    assert_output_not_contains(&out, "touch out");
    Ok(())
}

#[test]
fn recipe_output_follows_command() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", ".PHONY: hello\nhello:\n\techo hello world\n")?;
    let out = space.run_expect(&mut remake_command(vec!["hello"]))?;
    assert_eq!(
        std::str::from_utf8(&out.stdout)?,
        "echo hello world\nhello world\nremake: ran 1 recipes, now up to date\n"
    );
    Ok(())
}

#[test]
fn failing_recipe() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out:\n\tfalse\n\ttouch out\n")?;
    let out = space.run(&mut remake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_output_contains(&out, "failed: out");
    assert_output_not_contains(&out, "touch out");
    assert_stderr_contains(&out, "command \"false\" failed with exit code 1");
    assert!(!space.exists("out"));
    Ok(())
}

#[test]
fn cycle() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "a: b\n\ttouch a\nb: a\n\ttouch b\n")?;
    let out = space.run(&mut remake_command(vec!["a"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "dependency cycle: a -> b -> a");
    assert!(!space.exists("a"));
    assert!(!space.exists("b"));
    Ok(())
}

#[test]
fn include() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("config.mk", "GREETING := hi from config\n")?;
    space.write(
        "Makefile",
        "include config.mk\n.PHONY: greet\ngreet:\n\techo $(GREETING)\n",
    )?;
    let out = space.run_expect(&mut remake_command(vec!["greet"]))?;
    assert_output_contains(&out, "\nhi from config\n");
    Ok(())
}

#[test]
fn parse_error_points_at_line() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("Makefile", "out: in\n\ttouch out\nthis line is wrong\n")?;
    let out = space.run(&mut remake_command(vec!["out"]))?;
    assert_eq!(out.status.code(), Some(1));
    assert_stderr_contains(&out, "missing separator");
    assert_stderr_contains(&out, "Makefile:3");
    Ok(())
}
