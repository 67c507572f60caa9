//! Supervised pool of long-lived renderer processes.
//!
//! Each renderer instance is a child process started for one font. It reads
//! requests on stdin and answers with a framed, line-oriented response on
//! stdout. The pool keeps up to `max_instances` of them alive and hands them
//! out to callers, preferring an idle instance of the requested font.
//!
//! ```text
//!   convert(eq) ──► ResultCache ──hit──► result
//!                      │ miss
//!                      ▼
//!                 acquire(font) ──► PoolState::decide
//!                      │              ├─ Take            idle, same font
//!                      │              ├─ WaitForSameFont busy, same font, within grace
//!                      │              ├─ Reclaim         full: close oldest idle
//!                      │              ├─ WaitForRelease  full, all busy
//!                      │              ├─ Throttle        spawned too recently
//!                      │              └─ Spawn           start a new process
//!                      ▼
//!                 protocol::exchange ──► ProcessInstance (stdin / LineChannel)
//!                      │
//!                      ▼
//!                 release(healthy) ──► idle list, or close + capture stderr
//!
//!   Reaper thread ──every reaper_period──► shed_spares (keeps recent peak)
//! ```

mod channel;
#[allow(clippy::module_inception)]
mod pool;
mod process;
mod protocol;
mod reaper;
mod signals;
mod spawn;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{LineChannel, MAX_LINE_LENGTH};
pub use pool::{PoolConfig, WorkerPool, default_max_instances};
pub use process::{Instance, ProcessInstance};
pub use protocol::{exchange, request_lines, sanitize_content};
pub use signals::TerminationReason;
pub use spawn::{ProcessSpawner, RendererConfig, Spawner};
pub use state::{Worker, WorkerId};
