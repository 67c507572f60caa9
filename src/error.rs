//! Error types for mathpool.

use thiserror::Error;

/// Main error type for mathpool.
///
/// Callers of [`WorkerPool::convert`](crate::pool::WorkerPool::convert) get
/// either a result, a [`PoolError::Transport`] (the renderer process or its
/// protocol failed; the instance was destroyed) or a
/// [`PoolError::Conversion`] (the renderer reported a problem with the
/// equation; the instance is still healthy).
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Renderer transport failure: {message}{}", stderr_suffix(.stderr))]
    Transport { message: String, stderr: String },

    #[error("{0}")]
    Conversion(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker pool is shutting down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reading a line from a child process stream.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Timeout reading line from process")]
    Timeout,

    #[error("Process output stream closed")]
    Closed,

    #[error("Exceeded maximum line length ({0} bytes)")]
    LineTooLong(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr.trim_end())
    }
}

impl PoolError {
    /// Build a transport error with no stderr captured (yet).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            stderr: String::new(),
        }
    }

    /// Attach captured stderr to a transport error. Other variants pass through.
    pub fn with_stderr(self, captured: String) -> Self {
        match self {
            Self::Transport { message, .. } => Self::Transport {
                message,
                stderr: captured,
            },
            other => other,
        }
    }

    /// True when the failure means the instance must be destroyed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Io(_))
    }

    /// True when the renderer itself rejected the equation.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion(_))
    }
}

impl From<ChannelError> for PoolError {
    fn from(err: ChannelError) -> Self {
        Self::transport(err.to_string())
    }
}

/// Result type alias for mathpool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_transport_error_appends_stderr() {
        let err = PoolError::transport("Failed during readLine")
            .with_stderr("This\nis\nstderr\n".to_string());
        let msg = err.to_string();
        assert!(msg.ends_with("Failed during readLine\nThis\nis\nstderr"));
        assert!(err.is_transport());
        assert!(!err.is_conversion());
    }

    #[test]
    fn test_transport_error_without_stderr() {
        let err = PoolError::transport("Timeout reading line from process");
        assert_eq!(
            err.to_string(),
            "Renderer transport failure: Timeout reading line from process"
        );
    }

    #[test]
    fn test_conversion_message_passthrough() {
        let err = PoolError::Conversion("Undefined control sequence \\frak".to_string());
        assert_eq!(err.to_string(), "Undefined control sequence \\frak");
        assert!(err.is_conversion());
    }

    #[test]
    fn test_with_stderr_ignores_other_variants() {
        let err = PoolError::ShutDown.with_stderr("ignored".to_string());
        assert!(matches!(err, PoolError::ShutDown));
    }

    #[test]
    fn test_channel_error_becomes_transport() {
        let err: PoolError = ChannelError::LineTooLong(262144).into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("262144"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: PoolError = io_err.into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_config_error_message() {
        let err = PoolError::Config("max_instances must be at least 1".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("max_instances"));
    }
}
