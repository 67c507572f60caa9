//! Renderer subprocess handle.
//!
//! Owns the child's pipes: a buffered writer on stdin, a [`LineChannel`] on
//! stdout, and stderr, which is only read when diagnosing a failure.

use super::channel::LineChannel;
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{ChannelError, PoolError, Result};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::io::{self, BufWriter, Write};
use std::process::{Child, ChildStderr, ChildStdin};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a process gets to exit after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Line-level access to one renderer instance.
///
/// The pool only talks to instances through this trait, so tests can drive
/// it with scripted instances instead of real processes.
pub trait Instance: Send + 'static {
    /// Queue one line (a newline is appended).
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Push queued lines to the process.
    fn flush(&mut self) -> io::Result<()>;

    /// Next line of output, waiting at most `timeout`.
    fn read_line(&mut self, timeout: Duration) -> std::result::Result<String, ChannelError>;

    /// Shut the instance down.
    fn close(self);

    /// Shut the instance down after a failure, returning whatever it wrote
    /// to stderr (at most `max_lines` lines, each awaited for `line_timeout`).
    fn close_with_stderr(self, line_timeout: Duration, max_lines: usize) -> String;
}

/// A running renderer process.
pub struct ProcessInstance {
    pid: Pid,
    font: String,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: Option<LineChannel>,
    stderr: Option<ChildStderr>,
    /// Set once the process has been reaped.
    exit: Option<TerminationReason>,
}

impl ProcessInstance {
    /// Wrap a child spawned with piped stdin, stdout and stderr.
    pub fn from_child(mut child: Child, font: &str) -> Result<Self> {
        let pid = Pid::from_raw(child.id() as i32);

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PoolError::transport("Renderer stdio not captured"));
        };

        let stdout = match LineChannel::spawn(stdout, &format!("renderer {pid}")) {
            Ok(channel) => channel,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        Ok(Self {
            pid,
            font: font.to_string(),
            stdin: Some(BufWriter::new(stdin)),
            stdout: Some(stdout),
            stderr: child.stderr.take(),
            exit: None,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn font(&self) -> &str {
        &self.font
    }

    /// Reap the process if it has exited, without blocking.
    fn poll_exit(&mut self, sent: Option<Signal>) -> Option<TerminationReason> {
        if self.exit.is_some() {
            return self.exit;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(status) => {
                self.exit = Some(analyze_wait_status(status, sent));
                self.exit
            }
            Err(_) => {
                self.exit = Some(TerminationReason::Unknown);
                self.exit
            }
        }
    }

    /// SIGTERM, a short grace period, then SIGKILL.
    fn terminate(&mut self) -> TerminationReason {
        if let Some(reason) = self.poll_exit(None) {
            return reason;
        }

        let _ = signal::kill(self.pid, Signal::SIGTERM);
        let start = Instant::now();
        while start.elapsed() < TERM_GRACE {
            if let Some(reason) = self.poll_exit(Some(Signal::SIGTERM)) {
                return reason;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let _ = signal::kill(self.pid, Signal::SIGKILL);
        let reason = match waitpid(self.pid, None) {
            Ok(status) => analyze_wait_status(status, Some(Signal::SIGKILL)),
            Err(_) => TerminationReason::Unknown,
        };
        self.exit = Some(reason);
        reason
    }

    /// Read up to `max_lines` lines of stderr, waiting `line_timeout` for each.
    fn capture_stderr(
        &mut self,
        line_timeout: Duration,
        max_lines: usize,
    ) -> (Vec<String>, Option<LineChannel>) {
        let Some(stderr) = self.stderr.take() else {
            return (Vec::new(), None);
        };
        let channel = match LineChannel::spawn(stderr, &format!("renderer {} stderr", self.pid)) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(pid = %self.pid, error = %e, "Cannot read renderer stderr");
                return (Vec::new(), None);
            }
        };

        let mut lines = Vec::new();
        while lines.len() < max_lines {
            match channel.next_line(line_timeout) {
                Ok(line) => lines.push(line),
                Err(_) => break,
            }
        }
        (lines, Some(channel))
    }

    /// Close stdin, stop the reader, end the process, then join the reader.
    fn teardown(&mut self, capture: Option<(Duration, usize)>) -> String {
        self.stdin.take();

        let (lines, stderr_channel) = match capture {
            Some((line_timeout, max_lines)) => self.capture_stderr(line_timeout, max_lines),
            None => (Vec::new(), None),
        };

        let crashed = self.poll_exit(None);
        if let Some(channel) = self.stdout.as_mut() {
            channel.request_close();
        }
        let reason = self.terminate();

        if let Some(channel) = self.stdout.take() {
            channel.await_closed();
        }
        if let Some(mut channel) = stderr_channel {
            channel.request_close();
            channel.await_closed();
        }

        match crashed {
            Some(early) if early.is_crash() => {
                warn!(pid = %self.pid, font = %self.font, reason = %early, stderr_lines = lines.len(), "Renderer exited unexpectedly");
            }
            _ => {
                debug!(pid = %self.pid, font = %self.font, reason = %reason, "Renderer closed");
            }
        }
        for line in &lines {
            warn!(pid = %self.pid, "stderr: {}", line);
        }

        lines.join("\n")
    }
}

impl Instance for ProcessInstance {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "renderer stdin closed"))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(writer) => writer.flush(),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "renderer stdin closed",
            )),
        }
    }

    fn read_line(&mut self, timeout: Duration) -> std::result::Result<String, ChannelError> {
        self.stdout
            .as_ref()
            .ok_or(ChannelError::Closed)?
            .next_line(timeout)
    }

    fn close(mut self) {
        self.teardown(None);
    }

    fn close_with_stderr(mut self, line_timeout: Duration, max_lines: usize) -> String {
        self.teardown(Some((line_timeout, max_lines)))
    }
}

impl Drop for ProcessInstance {
    fn drop(&mut self) {
        if self.exit.is_some() {
            return;
        }
        self.stdin.take();
        if let Some(channel) = self.stdout.as_mut() {
            channel.request_close();
        }
        let _ = signal::kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
        self.exit = Some(TerminationReason::Terminated);
    }
}
