//! Process drivers.
//!
//! A driver runs one command and reports what it printed and how it ended
//! as a stream of [`ProcessEvent`]s. Every `Output` event is delivered
//! before the single terminal `Exited`/`Failed` event.

pub mod pipe;
pub mod pty;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::blocks::Stream;

pub use pipe::PipeDriver;
pub use pty::PtyDriver;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to open pty: {0}")]
    Open(String),
    #[error("failed to spawn process: {0}")]
    Spawn(String),
    #[error("process i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("process is no longer running")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// The interpreter a command string is handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ShellSpec {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            let program = std::env::var("SHELL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "/bin/sh".to_string());
            Self {
                program,
                args: vec!["-c".to_string()],
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub command: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub size: TermSize,
    pub shell: ShellSpec,
}

impl SpawnRequest {
    pub fn new(command: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            command: command.into(),
            cwd,
            env: BTreeMap::new(),
            size: TermSize::default(),
            shell: ShellSpec::default(),
        }
    }

    /// Program arguments: the shell's own args followed by the command.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.shell.args.clone();
        argv.push(self.command.clone());
        argv
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output { stream: Stream, bytes: Vec<u8> },
    /// `None` when the platform reports no code.
    Exited { code: Option<i32> },
    Failed(String),
}

impl ProcessEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessEvent::Output { .. })
    }
}

/// Handle to a running process.
pub trait ProcessControl: Send + std::fmt::Debug {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProcessError>;
    fn resize(&mut self, size: TermSize) -> Result<(), ProcessError>;
    /// Ctrl+C semantics.
    fn interrupt(&mut self) -> Result<(), ProcessError>;
    fn kill(&mut self) -> Result<(), ProcessError>;
    fn pid(&self) -> Option<u32>;
}

pub struct SpawnedProcess {
    pub control: Box<dyn ProcessControl>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

pub trait ProcessDriver: Send + Sync + std::fmt::Debug {
    fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, ProcessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    Pty,
    Pipe,
}

pub fn build_driver(kind: DriverKind, drain_timeout: Duration) -> Arc<dyn ProcessDriver> {
    match kind {
        DriverKind::Pty => Arc::new(PtyDriver::new(drain_timeout)),
        DriverKind::Pipe => Arc::new(PipeDriver::new(drain_timeout)),
    }
}
