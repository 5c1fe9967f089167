//! External command execution.
//!
//! Every observation this crate makes is obtained by driving host utilities
//! (`iwlist`, `iw`, `tcpdump`, `zip`), so command handling is shared
//! infrastructure: synchronous runs with timeout, asynchronous spawns that
//! return an owning handle, and cancellation that signals the whole process
//! group. Commands are templated strings executed through `sh -c` because
//! the link-sampling loop needs shell syntax; a sanitizer rejects any other
//! compound-shell construct before anything runs.

use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;

/// Multi-character sequences the sanitizer strips before checking for shell
/// metacharacters. These are the only compound-shell constructs a command
/// may contain: the link-sampling loop and the node self-update pipeline.
const ALLOWED_SEQUENCES: &[&str] = &[
    "sleep 1;",
    "while true; do",
    "date -Ins;",
    "; done",
    "git fetch &&",
    "wget -q -O - https://raw.githubusercontent.com/sigscout/sigscout/main/node-setup.sh | ",
];

const METACHARACTERS: [char; 5] = [';', '|', '>', '<', '&'];

/// Poll interval while waiting for a child to exit.
const WAIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum CmdError {
    /// The sanitizer rejected the command. This is the only hard error the
    /// runner emits; execution failures degrade to empty output instead.
    #[error("unsafe command: {0:?}")]
    Unsafe(String),
    /// The child process could not be started.
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Raw result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Reject commands containing shell metacharacters, except for the fixed
/// allow-list of sequences templated commands legitimately use.
///
/// Commands are templated with operator-controlled strings (interface names,
/// SSIDs), so this is a belt-and-braces guard, not a security boundary.
pub fn sanitize(cmd: &str) -> Result<(), CmdError> {
    let mut stripped = cmd.to_string();
    for seq in ALLOWED_SEQUENCES {
        stripped = stripped.replace(seq, "");
    }
    for meta in METACHARACTERS {
        if stripped.contains(&format!(" {meta}")) || stripped.contains(&format!("{meta} ")) {
            return Err(CmdError::Unsafe(cmd.to_string()));
        }
    }
    Ok(())
}

/// Run a command synchronously and return its stdout.
///
/// A command counts as successful when it exits 0 **or** printed nothing to
/// stderr; many host utilities exit non-zero with warnings but still produce
/// usable output. Failures and timeouts return an empty string, never an
/// error, so a scan or sweep can partially succeed.
pub fn run(
    cmd: &str,
    prefix: &str,
    log_result: bool,
    timeout: Option<Duration>,
) -> Result<String, CmdError> {
    sanitize(cmd)?;
    info!("{prefix}: {cmd}");
    let handle = match spawn_group(cmd) {
        Ok(handle) => handle,
        Err(err) => {
            warn!("{prefix} error: {err}");
            return Ok(String::new());
        }
    };
    let out = handle.settle(prefix, timeout);
    if !out.timed_out && (out.returncode == 0 || out.stderr.is_empty()) {
        if log_result {
            debug!("{}", out.stdout);
        }
        Ok(out.stdout)
    } else {
        warn!("{prefix} error:\n{}", out.stderr);
        Ok(String::new())
    }
}

/// Run a command synchronously and return returncode, stdout, and stderr
/// regardless of the outcome. A timeout yields returncode 1 with the timeout
/// message in stderr.
pub fn run_raw(cmd: &str, prefix: &str, timeout: Option<Duration>) -> Result<RawOutput, CmdError> {
    sanitize(cmd)?;
    info!("{prefix}: {cmd}");
    let handle = match spawn_group(cmd) {
        Ok(handle) => handle,
        Err(err) => {
            warn!("{prefix} error: {err}");
            return Ok(RawOutput {
                returncode: 1,
                stdout: String::new(),
                stderr: err.to_string(),
            });
        }
    };
    let out = handle.settle(prefix, timeout);
    Ok(RawOutput {
        returncode: out.returncode,
        stdout: out.stdout,
        stderr: out.stderr,
    })
}

/// Start a command asynchronously. The caller owns the returned handle and
/// must eventually resolve it; dropping an unresolved handle abandons the
/// child process.
pub fn run_async(cmd: &str, prefix: &str) -> Result<CmdHandle, CmdError> {
    sanitize(cmd)?;
    info!("{prefix}: {cmd}");
    spawn_group(cmd)
}

/// An owning reference to a running child process group with its stdout and
/// stderr being drained in the background. Single-shot: resolving consumes
/// the handle.
pub struct CmdHandle {
    child: Child,
    pgid: Pid,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
}

struct Settled {
    returncode: i32,
    stdout: String,
    stderr: String,
    timed_out: bool,
}

impl CmdHandle {
    /// Finish an asynchronous command and return its stdout.
    ///
    /// With `kill`, the whole process group receives SIGINT first, and an
    /// otherwise-nonzero exit still counts as success when stderr is empty
    /// (`tcpdump` prints its capture summary to stderr but is fine). On
    /// timeout the group is hard-killed and the result is empty.
    pub fn resolve(
        self,
        prefix: &str,
        log_result: bool,
        timeout: Option<Duration>,
        kill: bool,
    ) -> String {
        if kill {
            let _ = killpg(self.pgid, Signal::SIGINT);
        }
        let out = self.settle(prefix, timeout);
        if !out.timed_out && (out.returncode == 0 || (kill && out.stderr.is_empty())) {
            if log_result {
                debug!("{}", out.stdout);
            }
            out.stdout
        } else {
            warn!("{prefix} error:\n{}", out.stderr);
            String::new()
        }
    }

    /// Finish an asynchronous command, returning returncode, stdout, and
    /// stderr regardless of the outcome.
    pub fn resolve_raw(self, prefix: &str, timeout: Option<Duration>, kill: bool) -> RawOutput {
        if kill {
            let _ = killpg(self.pgid, Signal::SIGINT);
        }
        let out = self.settle(prefix, timeout);
        RawOutput {
            returncode: out.returncode,
            stdout: out.stdout,
            stderr: out.stderr,
        }
    }

    /// Wait for the child to exit, hard-killing the process group when the
    /// timeout elapses, then collect the drained output.
    fn settle(mut self, prefix: &str, timeout: Option<Duration>) -> Settled {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;
        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        timed_out = true;
                        let _ = killpg(self.pgid, Signal::SIGKILL);
                        break self.child.wait().ok();
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(_) => break None,
            }
        };
        let stdout = String::from_utf8_lossy(&self.stdout.join().unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr.join().unwrap_or_default()).into_owned();

        if timed_out {
            let msg = format!("{prefix} timed out after {:?}", timeout.unwrap_or_default());
            warn!("{msg}");
            return Settled {
                returncode: 1,
                stdout: String::new(),
                stderr: msg,
                timed_out,
            };
        }

        // Exit-by-signal maps to the conventional 128 + signo
        let returncode = status
            .and_then(|s| s.code().or_else(|| s.signal().map(|sig| 128 + sig)))
            .unwrap_or(-1);
        Settled {
            returncode,
            stdout,
            stderr,
            timed_out,
        }
    }
}

/// Spawn `sh -c <cmd>` in a fresh process group with piped output, so a
/// later signal reaches the shell and everything it started.
fn spawn_group(cmd: &str) -> Result<CmdHandle, CmdError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()?;
    let pgid = Pid::from_raw(child.id() as i32);
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    Ok(CmdHandle {
        child,
        pgid,
        stdout,
        stderr,
    })
}

/// Drain a pipe to completion on a background thread. Draining from spawn
/// time keeps long-running children from blocking on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
