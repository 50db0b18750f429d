use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    ProcessControl, ProcessDriver, ProcessError, ProcessEvent, SpawnRequest, SpawnedProcess,
    TermSize,
};
use crate::blocks::Stream;

/// Runs each command in its own pseudo-terminal.
#[derive(Debug, Clone)]
pub struct PtyDriver {
    drain_timeout: Duration,
}

impl PtyDriver {
    pub fn new(drain_timeout: Duration) -> Self {
        Self { drain_timeout }
    }
}

impl Default for PtyDriver {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Sender shared by the reader and waiter threads. The waiter takes it
/// when it sends the exit event, so nothing can follow that event.
type SharedSender = Arc<Mutex<Option<mpsc::UnboundedSender<ProcessEvent>>>>;

fn send_shared(tx: &SharedSender, event: ProcessEvent) -> bool {
    let guard = tx.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(tx) => tx.send(event).is_ok(),
        None => false,
    }
}

/// Signal number for the text portable-pty reports (`strsignal` output,
/// or `Signal N` when libc has no name for it).
fn signal_number(name: &str) -> Option<i32> {
    let name = name.trim();
    if let Some(n) = name
        .rsplit([' ', ':'])
        .next()
        .and_then(|tail| tail.parse::<i32>().ok())
    {
        return Some(n);
    }
    let known = match name.to_ascii_lowercase().as_str() {
        "hangup" => 1,
        "interrupt" => 2,
        "quit" => 3,
        "aborted" | "abort trap" => 6,
        "killed" => 9,
        "segmentation fault" => 11,
        "broken pipe" => 13,
        "alarm clock" => 14,
        "terminated" => 15,
        _ => return None,
    };
    Some(known)
}

/// Same convention as a shell: 128 + n for a signal death.
fn exit_code(status: &portable_pty::ExitStatus) -> Option<i32> {
    match status.signal() {
        Some(name) => signal_number(name).map(|n| 128 + n),
        None => Some(status.exit_code() as i32),
    }
}

impl ProcessDriver for PtyDriver {
    fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
        let pty_system = native_pty_system();
        let PtyPair { master, slave } = pty_system
            .openpty(pty_size(request.size))
            .map_err(|e| ProcessError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&request.shell.program);
        cmd.args(request.argv());
        cmd.cwd(&request.cwd);
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let mut child = slave
            .spawn_command(cmd)
            .map_err(|e| ProcessError::Spawn(e.to_string()))?;
        // The master only sees EOF once every slave handle is closed.
        drop(slave);

        let mut reader = master
            .try_clone_reader()
            .map_err(|e| ProcessError::Open(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| ProcessError::Open(e.to_string()))?;
        let killer = child.clone_killer();
        let pid = child.process_id();

        tracing::info!(pid = ?pid, command = %request.command, "spawned pty process");

        let (tx, rx) = mpsc::unbounded_channel();
        let shared: SharedSender = Arc::new(Mutex::new(Some(tx)));
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let reader_tx = shared.clone();
        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let event = ProcessEvent::Output {
                                stream: Stream::Stdout,
                                bytes: buf[..n].to_vec(),
                            };
                            if !send_shared(&reader_tx, event) {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        // EIO once the slave side is gone
                        Err(_) => break,
                    }
                }
                let _ = done_tx.send(());
            })?;

        let drain = self.drain_timeout;
        std::thread::Builder::new()
            .name("pty-waiter".into())
            .spawn(move || {
                let status = child.wait();
                if done_rx.recv_timeout(drain).is_err() {
                    tracing::debug!(pid = ?pid, "pty reader still open after exit; closing stream");
                }

                let event = match status {
                    Ok(status) => ProcessEvent::Exited {
                        code: exit_code(&status),
                    },
                    Err(e) => ProcessEvent::Failed(format!("wait failed: {}", e)),
                };
                tracing::info!(pid = ?pid, ?event, "pty process ended");

                let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(tx) = guard.take() {
                    let _ = tx.send(event);
                }
            })?;

        Ok(SpawnedProcess {
            control: Box::new(PtyControl {
                master,
                writer,
                killer,
                pid,
            }),
            events: rx,
        })
    }
}

pub struct PtyControl {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl std::fmt::Debug for PtyControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyControl")
            .field("master", &"Box<dyn MasterPty + Send>")
            .field("writer", &"Box<dyn Write + Send>")
            .field("pid", &self.pid)
            .finish()
    }
}

impl ProcessControl for PtyControl {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, size: TermSize) -> Result<(), ProcessError> {
        self.master
            .resize(pty_size(size))
            .map_err(|e| ProcessError::Io(std::io::Error::other(e.to_string())))
    }

    fn interrupt(&mut self) -> Result<(), ProcessError> {
        // ETX; the line discipline turns it into SIGINT for the foreground group
        self.write(&[0x03])
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        self.killer.kill()?;
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
