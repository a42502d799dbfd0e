//! Bounded-timeout execution of external commands.
//!
//! Every command gets a null stdin and piped stdout/stderr. Output lines are
//! streamed into the log as they arrive unless the caller asked for stdout
//! to be captured. When the deadline passes the process receives SIGTERM
//! and is always awaited afterwards, so no zombie is left behind.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ComposeError, ComposeResult};

/// How long a terminated process gets to exit before it is killed outright.
pub const KILL_GRACE: Duration = Duration::from_secs(10);

/// How long output readers may lag behind process exit. A detached
/// grandchild can keep the pipes open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// A fully described invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Return stdout to the caller instead of logging it.
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Program and arguments joined with spaces, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a command that was spawned successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub timed_out: bool,
    /// Captured stdout (empty unless the spec asked for capture).
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn timeout() -> Self {
        Self {
            code: None,
            timed_out: true,
            stdout: String::new(),
        }
    }

    /// Turn a timeout or a non-zero exit into an error.
    pub fn check(self, spec: &CommandSpec) -> ComposeResult<Self> {
        if self.timed_out {
            return Err(ComposeError::TimedOut {
                command: spec.display(),
                timeout: spec.timeout,
            });
        }
        match self.code {
            Some(0) => Ok(self),
            Some(code) => Err(ComposeError::Failed {
                command: spec.display(),
                status: format!("exit code {code}"),
            }),
            None => Err(ComposeError::Failed {
                command: spec.display(),
                status: "signal".to_string(),
            }),
        }
    }
}

/// Runs external commands. The engine only ever talks to this trait, so
/// tests can script command outcomes without spawning processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec) -> ComposeResult<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: CommandSpec) -> ComposeResult<CommandOutput> {
        let command = spec.display();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        debug!(%command, cwd = ?spec.cwd, "spawning command");
        let mut child = cmd.spawn().map_err(|source| ComposeError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let stdout = tokio::spawn(drain(
            child.stdout.take(),
            spec.capture,
            command.clone(),
            "stdout",
        ));
        let stderr = tokio::spawn(drain(
            child.stderr.take(),
            false,
            command.clone(),
            "stderr",
        ));

        let (status, timed_out) = match tokio::time::timeout(spec.timeout, child.wait()).await {
            Ok(status) => (status?, false),
            Err(_) => {
                warn!(%command, timeout = ?spec.timeout, "command timed out, terminating");
                terminate(&mut child);
                let status = match tokio::time::timeout(KILL_GRACE, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(%command, "command ignored SIGTERM, killing");
                        child.kill().await?;
                        child.wait().await?
                    }
                };
                (status, true)
            }
        };

        let stdout = join_drain(stdout, &command).await;
        join_drain(stderr, &command).await;

        let output = CommandOutput {
            code: if timed_out { None } else { status.code() },
            timed_out,
            stdout,
        };
        debug!(%command, code = ?output.code, timed_out, "command finished");
        Ok(output)
    }
}

fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        return;
    }
    let _ = child.start_kill();
}

async fn join_drain(handle: JoinHandle<String>, command: &str) -> String {
    let abort = handle.abort_handle();
    match tokio::time::timeout(DRAIN_GRACE, handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            warn!(%command, "output pipe still open after exit, abandoning it");
            abort.abort();
            String::new()
        }
    }
}

async fn drain<R>(reader: Option<R>, capture: bool, command: String, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let mut captured = String::new();
    let Some(reader) = reader else {
        return captured;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if capture {
                    captured.push_str(&line);
                } else {
                    let line = strip_control(line.trim_end());
                    if !line.is_empty() {
                        info!(%command, stream, "{line}");
                    }
                }
            }
            Err(e) => {
                warn!(%command, stream, error = %e, "failed to read command output");
                break;
            }
        }
    }
    captured
}

/// Remove ANSI escape sequences and other control characters from a line.
pub fn strip_control(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // CSI: parameters then a final byte in '@'..='~'.
                for c in chars.by_ref() {
                    if ('@'..='~').contains(&c) {
                        break;
                    }
                }
            }
            continue;
        }
        if c == '\t' || !c.is_control() {
            out.push(c);
        }
    }
    out
}
