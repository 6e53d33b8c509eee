//! Subprocess execution with a hard timeout.
//!
//! A timeout is an outcome (`timed_out = true`), not an error. Only a failure to
//! spawn the program at all is reported as `Err`. On Unix each child runs in its
//! own process group so a timeout kills the whole tree, including the kubectl
//! calls a test script fans out to.

#![allow(missing_docs)]

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

use crate::core::env_file::EnvOverlay;
use crate::core::errors::{Result, StoError};

/// Interval between `try_wait` polls.
const POLL_STEP: Duration = Duration::from_millis(50);

/// How long to wait for stdout/stderr to close once the child is gone.
const PIPE_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for the pipes to close after stragglers are killed.
const PIPE_SETTLE: Duration = Duration::from_millis(500);

const CHUNK_SIZE: usize = 8 * 1024;

const SPAWN_RETRIES: u32 = 5;

/// Exit code reported for a timed-out command, matching coreutils `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// What to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: EnvOverlay,
    pub timeout: Duration,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: EnvOverlay::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn envs(mut self, env: &EnvOverlay) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Program plus arguments, for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit code with timeouts and signals folded into a single number.
    #[must_use]
    pub fn effective_exit_code(&self) -> i32 {
        if self.timed_out {
            TIMEOUT_EXIT_CODE
        } else {
            self.exit_code.unwrap_or(-1)
        }
    }

    /// Stdout of a successful command, or the failure as an error.
    pub fn into_stdout(self, spec: &CommandSpec) -> Result<String> {
        if self.timed_out {
            return Err(StoError::CommandTimeout {
                program: spec.display(),
                timeout_secs: spec.timeout.as_secs(),
            });
        }
        if self.exit_code != Some(0) {
            return Err(StoError::CommandFailed {
                program: spec.display(),
                exit_code: self.effective_exit_code(),
                stderr: self.stderr.trim().to_string(),
            });
        }
        Ok(self.stdout)
    }
}

/// Run a command to completion or until its timeout elapses.
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput> {
    let started = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        command.process_group(0);
    }

    let mut child = spawn_with_retry(&mut command).map_err(|source| StoError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let mut stdout_pipe = drain_pipe(child.stdout.take());
    let mut stderr_pipe = drain_pipe(child.stderr.take());

    let deadline = started + spec.timeout;
    let mut timed_out = false;
    let status = loop {
        match child
            .try_wait()
            .map_err(|source| StoError::io(&spec.program, source))?
        {
            Some(status) => break Some(status),
            None if Instant::now() >= deadline => {
                timed_out = true;
                terminate(&mut child);
                break child.wait().ok();
            }
            None => thread::sleep(POLL_STEP),
        }
    };

    // Background processes the command left behind can keep the pipes open long
    // after it exits. Keep what was written and kill the rest of the group.
    let grace = Instant::now() + PIPE_GRACE;
    stdout_pipe.fill_until(grace);
    stderr_pipe.fill_until(grace);
    if !(stdout_pipe.closed && stderr_pipe.closed) {
        kill_group(child.id());
        let settle = Instant::now() + PIPE_SETTLE;
        stdout_pipe.fill_until(settle);
        stderr_pipe.fill_until(settle);
    }

    let stdout = stdout_pipe.into_text();
    let mut stderr = stderr_pipe.into_text();
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!(
            "Command timed out after {}s",
            spec.timeout.as_secs()
        ));
    }

    Ok(CommandOutput {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        timed_out,
        elapsed: started.elapsed(),
    })
}

/// Spawn, retrying briefly on ETXTBSY: a script written moments ago can still be
/// held open by a sibling thread's fork.
fn spawn_with_retry(command: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Err(e) if is_text_busy(&e) && attempt < SPAWN_RETRIES => {
                attempt += 1;
                thread::sleep(POLL_STEP);
            }
            other => return other,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32)
}

#[cfg(not(unix))]
fn is_text_busy(_error: &std::io::Error) -> bool {
    false
}

/// Bytes read so far from one child pipe.
struct PipeCapture {
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    closed: bool,
}

impl PipeCapture {
    /// Collect chunks until the pipe reaches EOF or `deadline` passes.
    fn fill_until(&mut self, deadline: Instant) {
        while !self.closed {
            match self.rx.recv_deadline(deadline) {
                Ok(chunk) => self.buf.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => self.closed = true,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }
    }

    fn into_text(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Read a pipe on a helper thread, forwarding chunks as they arrive. The channel
/// disconnects at EOF.
fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> PipeCapture {
    let (tx, rx) = unbounded::<Vec<u8>>();
    if let Some(mut pipe) = pipe {
        let spawned = thread::Builder::new()
            .name("sto-pipe".to_string())
            .spawn(move || {
                let mut chunk = vec![0_u8; CHUNK_SIZE];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(chunk[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(_) => break,
                    }
                }
            });
        if let Err(e) = spawned {
            eprintln!("[STO-EXEC] failed to spawn pipe reader: {e}");
        }
    }
    PipeCapture {
        rx,
        buf: Vec::new(),
        closed: false,
    }
}

fn terminate(child: &mut Child) {
    if !kill_group(child.id()) {
        let _ = child.kill();
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    i32::try_from(pid)
        .ok()
        .is_some_and(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL).is_ok())
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new("sh", timeout).args(["-c", script])
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_command(&sh("echo hello; echo oops >&2", Duration::from_secs(10))).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.exit_code, Some(0));
    }

    #[test]
    fn non_zero_exit_is_an_outcome() {
        let spec = sh("exit 3", Duration::from_secs(10));
        let out = run_command(&spec).unwrap();
        assert!(!out.success());
        assert_eq!(out.effective_exit_code(), 3);
        let err = out.into_stdout(&spec).unwrap_err();
        assert_eq!(err.code(), "STO-2002");
    }

    #[test]
    fn timeout_kills_the_process_tree() {
        let spec = sh("sleep 30 & sleep 30", Duration::from_millis(300));
        let out = run_command(&spec).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert_eq!(out.effective_exit_code(), TIMEOUT_EXIT_CODE);
        assert!(out.elapsed < Duration::from_secs(10));
        assert!(out.stderr.contains("timed out"));
        assert_eq!(out.into_stdout(&spec).unwrap_err().code(), "STO-2003");
    }

    #[test]
    fn env_overlay_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = EnvOverlay::new();
        env.insert("STO_POOL".to_string(), "spot".to_string());
        let spec = sh("echo $STO_POOL; pwd", Duration::from_secs(10))
            .envs(&env)
            .current_dir(dir.path());
        let out = run_command(&spec).unwrap();
        let lines: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(lines[0], "spot");
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(lines[1]).canonicalize().unwrap(), canonical);
    }

    #[test]
    fn output_survives_a_background_process_holding_the_pipes() {
        let spec = sh("echo hello; echo oops >&2; sleep 30 &", Duration::from_secs(10));
        let out = run_command(&spec).unwrap();
        assert!(out.success());
        assert!(!out.timed_out);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(out.elapsed < Duration::from_secs(15));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let spec = CommandSpec::new("sto-definitely-not-installed", Duration::from_secs(1));
        let err = run_command(&spec).unwrap_err();
        assert_eq!(err.code(), "STO-2004");
    }

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("kubectl", Duration::from_secs(1)).args(["get", "nodes"]);
        assert_eq!(spec.display(), "kubectl get nodes");
    }
}
