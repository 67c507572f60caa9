//! mathpool - pooled maths renderer processes.
//!
//! Converts TeX and MathML to SVG by driving a pool of long-lived renderer
//! processes over a line protocol, with a FIFO result cache and telemetry.

pub mod cache;
pub mod cli;
pub mod equation;
pub mod error;
pub mod logging;
pub mod output;
pub mod pool;
pub mod telemetry;
pub mod theme;

pub use cache::ResultCache;
pub use equation::{ConversionResult, DEFAULT_FONT, Equation, InputFormat, KNOWN_FONTS};
pub use error::{ChannelError, PoolError, Result};
pub use pool::{PoolConfig, RendererConfig, WorkerPool};
pub use telemetry::{PoolStatus, Telemetry};
