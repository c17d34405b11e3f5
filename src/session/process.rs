use crate::weak_error;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Backend process prepared for spawning.
pub struct Launch {
    program: PathBuf,
    args: Vec<String>,
    capture_output: bool,
}

impl Launch {
    /// Create a new launch template, but dont start the process.
    ///
    /// # Arguments
    ///
    /// * `program`: path to backend executable
    /// * `args`: backend arguments
    /// * `capture_output`: pipe stdio to the caller instead of null devices
    pub fn new<ARGS: IntoIterator<Item = I>, I: Into<String>>(
        program: impl Into<PathBuf>,
        args: ARGS,
        capture_output: bool,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            capture_output,
        }
    }

    pub fn spawn(&self) -> io::Result<Child> {
        let stdio = || {
            if self.capture_output {
                Stdio::piped()
            } else {
                Stdio::null()
            }
        };
        Command::new(&self.program)
            .args(&self.args)
            .stdin(stdio())
            .stdout(stdio())
            .stderr(stdio())
            .spawn()
    }
}

/// Piped stdio of a backend process.
pub struct BackendIo {
    /// Assert prompt replies go here.
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl BackendIo {
    pub(super) fn take(child: &mut Child) -> Self {
        Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        }
    }
}

/// Wait until process exits. Return `false` if it's still alive after `timeout`.
pub fn wait_for_exit(child: &mut Child, timeout: Duration) -> io::Result<bool> {
    let start = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Stop a backend process: SIGTERM first, SIGKILL if it still runs after the grace period.
/// The process is reaped in any case.
pub fn terminate(child: &mut Child, grace_period: Duration) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    let pid = Pid::from_raw(child.id() as i32);
    if weak_error!(signal::kill(pid, Signal::SIGTERM), "send SIGTERM:").is_some() {
        if let Some(true) = weak_error!(wait_for_exit(child, grace_period)) {
            log::debug!(target: "session", "backend process {pid} terminated");
            return;
        }
        log::warn!(target: "session", "backend process {pid} ignores SIGTERM, kill it");
    }

    weak_error!(child.kill(), "kill backend process:");
    weak_error!(child.wait(), "wait backend process:");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_terminate() {
        let mut child = Launch::new("sleep", ["30"], false).spawn().unwrap();
        let start = Instant::now();
        terminate(&mut child, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_terminate_escalation() {
        // ignored SIGTERM survives exec, only SIGKILL stops the process
        let mut child = Launch::new("sh", ["-c", "trap '' TERM; exec sleep 30"], false)
            .spawn()
            .unwrap();
        // let the shell install the trap
        thread::sleep(Duration::from_millis(200));
        let start = Instant::now();
        terminate(&mut child, Duration::from_millis(300));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_some());
    }
}
