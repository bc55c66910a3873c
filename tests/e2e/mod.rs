//! Support code for e2e tests, which run remake as a binary.

mod basic;
mod missing;
mod options;

/// A command running the remake binary built alongside this test.
pub fn remake_command(args: Vec<&str>) -> std::process::Command {
    let exe = std::env::current_exe().expect("test binary path");
    // target/debug/deps/e2e_test-HASH -> target/debug/remake
    let bin_dir = exe
        .parent()
        .and_then(|deps| deps.parent())
        .expect("binary directory");
    let mut cmd = std::process::Command::new(bin_dir.join("remake"));
    cmd.args(args);
    // Keep log output out of the asserted streams.
    cmd.env_remove("RUST_LOG");
    cmd
}

fn check_stream(name: &str, bytes: &[u8], text: &str, want: bool) {
    let stream = String::from_utf8_lossy(bytes);
    if stream.contains(text) != want {
        let verb = if want { "contain" } else { "not contain" };
        panic!("expected {} to {} {:?}, got:\n{}", name, verb, text, stream);
    }
}

pub fn assert_output_contains(out: &std::process::Output, text: &str) {
    check_stream("stdout", &out.stdout, text, true);
}

pub fn assert_output_not_contains(out: &std::process::Output, text: &str) {
    check_stream("stdout", &out.stdout, text, false);
}

pub fn assert_stderr_contains(out: &std::process::Output, text: &str) {
    check_stream("stderr", &out.stderr, text, true);
}

/// Manages a temporary directory for invoking remake.
pub struct TestSpace {
    dir: tempfile::TempDir,
}
impl TestSpace {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        Ok(TestSpace { dir })
    }

    /// Write a file into the working space, creating parent directories.
    pub fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        let path = self.dir.path().join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
    }

    /// Read a file from the working space.
    pub fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.dir.path().join(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    /// Set a file's mtime to a fixed number of seconds since the epoch, so
    /// tests don't depend on filesystem timestamp granularity.
    pub fn set_mtime(&self, path: &str, secs: i64) -> std::io::Result<()> {
        filetime::set_file_mtime(
            self.dir.path().join(path),
            filetime::FileTime::from_unix_time(secs, 0),
        )
    }

    /// Invoke remake, returning process output.
    pub fn run(&self, cmd: &mut std::process::Command) -> std::io::Result<std::process::Output> {
        cmd.current_dir(self.dir.path()).output()
    }

    /// Like run, but fails with both output streams when remake does.
    pub fn run_expect(
        &self,
        cmd: &mut std::process::Command,
    ) -> anyhow::Result<std::process::Output> {
        let out = self.run(cmd)?;
        if !out.status.success() {
            anyhow::bail!(
                "remake exited with {}\nstdout:\n{}\nstderr:\n{}",
                out.status,
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
        }
        Ok(out)
    }
}

/// A two-step pipeline in the style of a data analysis project.
pub const PIPELINE: &str = "
COUNT := wc -w

all: results/isles.dat results/abyss.dat
.PHONY: all

results/%.dat: books/%.txt
\tmkdir -p results
\t$(COUNT) < $< > $@
";
