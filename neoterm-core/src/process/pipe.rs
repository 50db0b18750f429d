use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{
    ProcessControl, ProcessDriver, ProcessError, ProcessEvent, SpawnRequest, SpawnedProcess,
    TermSize,
};
use crate::blocks::Stream;

#[cfg(unix)]
use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};

/// Runs commands with plain pipes. Keeps stdout and stderr apart, but
/// programs see no terminal. Must be used from inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct PipeDriver {
    drain_timeout: Duration,
}

impl PipeDriver {
    pub fn new(drain_timeout: Duration) -> Self {
        Self { drain_timeout }
    }
}

impl Default for PipeDriver {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

fn pump<R>(mut src: R, stream: Stream, tx: mpsc::UnboundedSender<ProcessEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match src.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let event = ProcessEvent::Output {
                        stream,
                        bytes: buf[..n].to_vec(),
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for a reader to hit EOF, or stop it once the drain window closes.
async fn drain(mut handle: JoinHandle<()>, timeout: Duration) {
    if tokio::time::timeout(timeout, &mut handle).await.is_err() {
        handle.abort();
        let _ = handle.await;
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| 128 + s))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Signal the process group led by `pid`. The shell and everything it
/// started share that group.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: Signal) -> Result<(), ProcessError> {
    let pid = pid.ok_or(ProcessError::Closed)?;
    killpg(Pid::from_raw(pid as i32), signal)
        .map_err(|e| ProcessError::Io(std::io::Error::from(e)))
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Err(e) = signal_group(pid, Signal::SIGKILL) {
        tracing::debug!(pid = ?pid, "group kill failed: {}", e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

impl ProcessDriver for PipeDriver {
    fn spawn(&self, request: SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
        let mut command = tokio::process::Command::new(&request.shell.program);
        command
            .args(request.argv())
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so signals reach the shell's children too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ProcessError::Spawn(format!("{}: {}", request.shell.program, e)))?;

        let pid = child.id();
        tracing::info!(pid = ?pid, command = %request.command, "spawned piped process");

        let (tx, rx) = mpsc::unbounded_channel();

        let stdout = child.stdout.take().map(|s| pump(s, Stream::Stdout, tx.clone()));
        let stderr = child.stderr.take().map(|s| pump(s, Stream::Stderr, tx.clone()));

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(bytes) = input_rx.recv().await {
                    if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
                        break;
                    }
                }
            });
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let timeout = self.drain_timeout;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    kill_group(pid);
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            for handle in [stdout, stderr].into_iter().flatten() {
                drain(handle, timeout).await;
            }

            let event = match status {
                Ok(status) => ProcessEvent::Exited {
                    code: exit_code(status),
                },
                Err(e) => ProcessEvent::Failed(format!("wait failed: {}", e)),
            };
            tracing::info!(pid = ?pid, ?event, "piped process ended");
            let _ = tx.send(event);
        });

        Ok(SpawnedProcess {
            control: Box::new(PipeControl {
                input: input_tx,
                kill: Some(kill_tx),
                pid,
            }),
            events: rx,
        })
    }
}

#[derive(Debug)]
pub struct PipeControl {
    input: mpsc::UnboundedSender<Vec<u8>>,
    kill: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
}

impl ProcessControl for PipeControl {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProcessError> {
        self.input
            .send(bytes.to_vec())
            .map_err(|_| ProcessError::Closed)
    }

    fn resize(&mut self, _size: TermSize) -> Result<(), ProcessError> {
        Ok(())
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> Result<(), ProcessError> {
        signal_group(self.pid, Signal::SIGINT)
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> Result<(), ProcessError> {
        self.kill()
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        match self.kill.take() {
            Some(tx) => tx.send(()).map_err(|_| ProcessError::Closed),
            None => Err(ProcessError::Closed),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
