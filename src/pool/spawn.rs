//! Renderer subprocess spawning.
//!
//! An instance is launched as `[launcher] executable renderer_dir font`
//! with all three standard streams piped. Each instance serves one font.

use super::process::{Instance, ProcessInstance};
use crate::error::{PoolError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// Creates renderer instances for the pool.
pub trait Spawner: Send + Sync + 'static {
    type Instance: Instance;

    /// Start a new instance pinned to `font`.
    fn spawn(&self, font: &str) -> Result<Self::Instance>;
}

/// How to launch the renderer program.
#[derive(Debug, Clone, Serialize)]
pub struct RendererConfig {
    /// Interpreter the executable runs under, e.g. `node`.
    pub launcher: Option<String>,
    /// Renderer script or binary.
    pub executable: PathBuf,
    /// Directory passed to the renderer for its own resources.
    pub renderer_dir: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            launcher: Some("node".to_string()),
            executable: PathBuf::from("mathjax/main.js"),
            renderer_dir: PathBuf::from("mathjax"),
        }
    }
}

impl RendererConfig {
    /// Build the command for one instance.
    pub fn command(&self, font: &str) -> Command {
        let mut cmd = match &self.launcher {
            Some(launcher) => {
                let mut cmd = Command::new(launcher);
                cmd.arg(&self.executable);
                cmd
            }
            None => Command::new(&self.executable),
        };
        cmd.arg(&self.renderer_dir);
        cmd.arg(font);

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }
}

/// Spawns real renderer processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner {
    config: RendererConfig,
}

impl ProcessSpawner {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl Spawner for ProcessSpawner {
    type Instance = ProcessInstance;

    fn spawn(&self, font: &str) -> Result<ProcessInstance> {
        let child = self.config.command(font).spawn().map_err(|e| {
            PoolError::transport(format!(
                "Failed to start renderer {}: {}",
                self.config.executable.display(),
                e
            ))
        })?;
        let instance = ProcessInstance::from_child(child, font)?;
        debug!(pid = %instance.pid(), font, "Spawned renderer");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_command_with_launcher() {
        let config = RendererConfig {
            launcher: Some("node".into()),
            executable: "/opt/mj/main.js".into(),
            renderer_dir: "/opt/mj".into(),
        };
        let cmd = config.command("STIX-Web");
        assert_eq!(cmd.get_program(), "node");
        assert_eq!(args(&cmd), vec!["/opt/mj/main.js", "/opt/mj", "STIX-Web"]);
    }

    #[test]
    fn test_command_without_launcher() {
        let config = RendererConfig {
            launcher: None,
            executable: "/usr/bin/renderer".into(),
            renderer_dir: "/tmp".into(),
        };
        let cmd = config.command("TeX");
        assert_eq!(cmd.get_program(), "/usr/bin/renderer");
        assert_eq!(args(&cmd), vec!["/tmp", "TeX"]);
    }

    #[test]
    fn test_missing_executable_is_transport_error() {
        let spawner = ProcessSpawner::new(RendererConfig {
            launcher: None,
            executable: "/nonexistent/mathpool-renderer".into(),
            renderer_dir: "/tmp".into(),
        });
        let err = spawner.spawn("TeX").err().unwrap();
        assert!(err.is_transport());
        assert!(err.to_string().contains("Failed to start renderer"));
    }
}
