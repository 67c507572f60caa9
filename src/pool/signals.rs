//! Exit-status analysis for renderer processes.
//!
//! Used for diagnostics only: the pool treats every early exit the same way.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Why a renderer process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by a signal we did not send.
    Signaled(Signal),
    /// Stopped by the pool's own SIGTERM/SIGKILL.
    Terminated,
    /// Process is still running.
    StillAlive,
    Unknown,
}

impl TerminationReason {
    /// Whether the process went away on its own terms.
    pub fn is_crash(&self) -> bool {
        match self {
            Self::Exited(code) => *code != 0,
            Self::Signaled(_) => true,
            _ => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {code}"),
            Self::Signaled(sig) => format!("killed by signal {sig:?}"),
            Self::Terminated => "terminated by pool".to_string(),
            Self::StillAlive => "still running".to_string(),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

/// Map a wait status to a reason. `sent` is the signal the pool delivered, if any.
pub fn analyze_wait_status(status: WaitStatus, sent: Option<Signal>) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) if Some(signal) == sent => TerminationReason::Terminated,
        WaitStatus::Signaled(_, signal, _) => TerminationReason::Signaled(signal),
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}
