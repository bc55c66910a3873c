//! Implements run_command on posix using posix_spawn.
//! See run_command comments for why.

use crate::process::{CommandResult, Termination};
use crate::signal;
use anyhow::{anyhow, bail};
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

extern "C" {
    static environ: *const *mut libc::c_char;
}

/// How often to check on a command that has a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The posix_spawn family returns an error number rather than setting errno.
fn check_posix_spawn(func: &str, ret: libc::c_int) -> anyhow::Result<()> {
    if ret != 0 {
        bail!("{}: {}", func, std::io::Error::from_raw_os_error(ret));
    }
    Ok(())
}

fn check_errno(func: &str, ret: libc::c_int) -> anyhow::Result<()> {
    if ret < 0 {
        bail!("{}: {}", func, std::io::Error::last_os_error());
    }
    Ok(())
}

/// Wraps libc::posix_spawn_file_actions_t, in particular to implement Drop.
struct PosixSpawnFileActions(libc::posix_spawn_file_actions_t);

impl PosixSpawnFileActions {
    fn new() -> anyhow::Result<Self> {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            check_posix_spawn(
                "posix_spawn_file_actions_init",
                libc::posix_spawn_file_actions_init(&mut actions),
            )?;
            Ok(Self(actions))
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.0
    }

    fn adddup2(&mut self, fd: i32, newfd: i32) -> anyhow::Result<()> {
        unsafe {
            check_posix_spawn(
                "posix_spawn_file_actions_adddup2",
                libc::posix_spawn_file_actions_adddup2(&mut self.0, fd, newfd),
            )
        }
    }

    fn addclose(&mut self, fd: i32) -> anyhow::Result<()> {
        unsafe {
            check_posix_spawn(
                "posix_spawn_file_actions_addclose",
                libc::posix_spawn_file_actions_addclose(&mut self.0, fd),
            )
        }
    }
}

impl Drop for PosixSpawnFileActions {
    fn drop(&mut self) {
        unsafe { libc::posix_spawn_file_actions_destroy(&mut self.0) };
    }
}

/// Wraps libc::posix_spawnattr_t.
struct PosixSpawnAttr(libc::posix_spawnattr_t);

impl PosixSpawnAttr {
    fn new() -> anyhow::Result<Self> {
        unsafe {
            let mut attr: libc::posix_spawnattr_t = std::mem::zeroed();
            check_posix_spawn("posix_spawnattr_init", libc::posix_spawnattr_init(&mut attr))?;
            Ok(Self(attr))
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawnattr_t {
        &self.0
    }

    /// Put the child in a new process group (pgid == its pid), so the whole
    /// command tree can be signalled at once.
    fn set_new_process_group(&mut self) -> anyhow::Result<()> {
        unsafe {
            check_posix_spawn(
                "posix_spawnattr_setpgroup",
                libc::posix_spawnattr_setpgroup(&mut self.0, 0),
            )?;
            check_posix_spawn(
                "posix_spawnattr_setflags",
                libc::posix_spawnattr_setflags(&mut self.0, libc::POSIX_SPAWN_SETPGROUP as _),
            )
        }
    }
}

impl Drop for PosixSpawnAttr {
    fn drop(&mut self) {
        unsafe { libc::posix_spawnattr_destroy(&mut self.0) };
    }
}

/// A pipe whose ends are not inherited by commands spawned from other
/// threads.  Returns (read, write).
fn cloexec_pipe() -> anyhow::Result<(File, File)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    unsafe {
        #[cfg(target_os = "linux")]
        check_errno("pipe2", libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC))?;
        #[cfg(not(target_os = "linux"))]
        {
            check_errno("pipe", libc::pipe(fds.as_mut_ptr()))?;
            for fd in fds {
                check_errno("fcntl", libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
            }
        }
        Ok((File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])))
    }
}

fn waitpid(pid: libc::pid_t, flags: libc::c_int) -> anyhow::Result<Option<ExitStatus>> {
    loop {
        let mut status: libc::c_int = 0;
        let ret = unsafe { libc::waitpid(pid, &mut status, flags) };
        if ret < 0 {
            if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            check_errno("waitpid", ret)?;
        }
        if ret == 0 {
            // WNOHANG and still running.
            return Ok(None);
        }
        return Ok(Some(ExitStatus::from_raw(status)));
    }
}

fn kill_group(pid: libc::pid_t, sig: libc::c_int) {
    // Failure means the group is already gone.
    unsafe { libc::kill(-pid, sig) };
}

/// Wait for a command running in its own process group, killing the group
/// once the deadline passes.  Returns None on timeout.
fn wait_with_timeout(
    pid: libc::pid_t,
    mut pipe: File,
    timeout: Duration,
) -> anyhow::Result<(Option<ExitStatus>, Vec<u8>)> {
    // The pipe must be drained while we wait, or a chatty command blocks.
    let reader = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut output = Vec::new();
        pipe.read_to_end(&mut output)?;
        Ok(output)
    });

    let deadline = Instant::now() + timeout;
    let mut forwarded_sigint = false;
    let status = loop {
        if let Some(status) = waitpid(pid, libc::WNOHANG)? {
            break Some(status);
        }
        // The terminal's SIGINT doesn't reach a background process group.
        if !forwarded_sigint && signal::was_interrupted() {
            kill_group(pid, libc::SIGINT);
            forwarded_sigint = true;
        }
        if Instant::now() >= deadline {
            kill_group(pid, libc::SIGKILL);
            waitpid(pid, 0)?;
            break None;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let output = reader
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))??;
    Ok((status, output))
}

pub fn run_command(cmdline: &str, timeout: Option<Duration>) -> anyhow::Result<CommandResult> {
    // Spawn the subprocess using posix_spawn with output redirected to the pipe.
    // We don't use Rust's process spawning because we want to feed both
    // stdout and stderr into the same pipe, which cannot be done with the
    // existing std::process API.
    let cmdline_nul = match CString::new(cmdline) {
        Ok(c) => c,
        Err(_) => bail!("command contains a nul byte: {:?}", cmdline),
    };
    let (read_end, write_end) = cloexec_pipe()?;
    let pid = unsafe {
        let write_fd = write_end.as_raw_fd();

        let mut actions = PosixSpawnFileActions::new()?;
        // stdout/stderr => pipe; dup2 clears close-on-exec on the copies.
        actions.adddup2(write_fd, 1)?;
        actions.adddup2(write_fd, 2)?;
        actions.addclose(read_end.as_raw_fd())?;
        actions.addclose(write_fd)?;

        let mut attr = PosixSpawnAttr::new()?;
        if timeout.is_some() {
            attr.set_new_process_group()?;
        }

        let mut pid: libc::pid_t = 0;
        let path = b"/bin/sh\0".as_ptr() as *const libc::c_char;
        let argv: [*mut libc::c_char; 4] = [
            path as *mut libc::c_char,
            b"-c\0".as_ptr() as *mut libc::c_char,
            cmdline_nul.as_ptr() as *mut libc::c_char,
            std::ptr::null_mut(),
        ];

        check_posix_spawn(
            "posix_spawn",
            libc::posix_spawn(
                &mut pid,
                path,
                actions.as_ptr(),
                attr.as_ptr(),
                argv.as_ptr(),
                environ,
            ),
        )?;
        pid
    };
    // Our copy of the write end must close for reads to see EOF.
    drop(write_end);

    let (status, mut output) = match timeout {
        None => {
            let mut pipe = read_end;
            let mut output = Vec::new();
            pipe.read_to_end(&mut output)?;
            (waitpid(pid, 0)?, output)
        }
        Some(timeout) => wait_with_timeout(pid, read_end, timeout)?,
    };

    let termination = match status {
        None => Termination::TimedOut,
        Some(status) if status.success() => Termination::Success,
        Some(status) => match status.signal() {
            Some(libc::SIGINT) => {
                output.extend_from_slice(b"interrupted");
                Termination::Interrupted
            }
            Some(sig) => {
                output.extend_from_slice(format!("signal {}", sig).as_bytes());
                Termination::Failure(128 + sig)
            }
            None => Termination::Failure(status.code().unwrap_or(1)),
        },
    };

    Ok(CommandResult {
        termination,
        output,
    })
}
