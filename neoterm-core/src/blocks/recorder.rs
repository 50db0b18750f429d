//! Block recorder.
//!
//! Inputs:
//! - process events for one block (output bytes, exit, failure)
//! - OSC events found in that output (cwd, title)
//!
//! Output:
//! - session mutations (fragments, final status)
//! - `EngineEvent`s for the front end
//! - the finished block persisted to the vault

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use crate::process::ProcessEvent;
use crate::term::{OscEvent, OutputFilter};
use crate::vault::Vault;
use crate::EngineEvent;

use super::model::{BlockId, BlockStatus, OutputFragment};
use super::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Pending,
    Finished {
        status: BlockStatus,
        exit_code: Option<i32>,
    },
}

impl RecordOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, RecordOutcome::Finished { .. })
    }
}

pub(crate) fn lock_session(session: &Mutex<Session>) -> std::sync::MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug)]
pub struct BlockRecorder {
    block: BlockId,
    session: Arc<Mutex<Session>>,
    vault: Option<Vault>,
    events: mpsc::UnboundedSender<EngineEvent>,
    status: watch::Sender<Option<BlockStatus>>,
    filter: OutputFilter,
    reported_cwd: Option<String>,
    finished: bool,
}

impl BlockRecorder {
    pub fn new(
        block: BlockId,
        session: Arc<Mutex<Session>>,
        vault: Option<Vault>,
        events: mpsc::UnboundedSender<EngineEvent>,
        status: watch::Sender<Option<BlockStatus>>,
    ) -> Self {
        Self {
            block,
            session,
            vault,
            events,
            status,
            filter: OutputFilter::new(),
            reported_cwd: None,
            finished: false,
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn on_event(&mut self, event: ProcessEvent) -> RecordOutcome {
        if self.finished {
            return self.outcome();
        }

        match event {
            ProcessEvent::Output { stream, bytes } => {
                let filtered = self.filter.feed(&bytes);
                for ev in filtered.events {
                    self.on_osc(ev);
                }
                if !filtered.text.is_empty() {
                    let fragment = OutputFragment {
                        text: filtered.text,
                        stream,
                    };
                    let appended = lock_session(&self.session)
                        .append_output(self.block, fragment.clone());
                    match appended {
                        Ok(()) => {
                            let _ = self.events.send(EngineEvent::Output {
                                id: self.block,
                                fragment,
                            });
                        }
                        Err(e) => tracing::debug!(block = %self.block, "dropped output: {}", e),
                    }
                }
                RecordOutcome::Pending
            }
            ProcessEvent::Exited { code } => {
                let code = code.unwrap_or(-1);
                let result = lock_session(&self.session).finish(self.block, code);
                if let Err(e) = result {
                    tracing::warn!(block = %self.block, "finish failed: {}", e);
                }
                self.complete()
            }
            ProcessEvent::Failed(message) => {
                self.fail(&message);
                self.complete()
            }
        }
    }

    /// The event stream ended without an exit event.
    pub fn on_stream_closed(&mut self) -> RecordOutcome {
        if !self.finished {
            self.fail("process stream closed unexpectedly");
            return self.complete();
        }
        self.outcome()
    }

    fn fail(&mut self, message: &str) {
        if let Err(e) = lock_session(&self.session).fail(self.block, message) {
            tracing::warn!(block = %self.block, "fail failed: {}", e);
        }
    }

    fn on_osc(&mut self, event: OscEvent) {
        match event {
            OscEvent::Title(title) => {
                let _ = lock_session(&self.session).set_title(self.block, title);
            }
            OscEvent::Cwd(cwd) => self.reported_cwd = Some(cwd),
            OscEvent::Unknown(payload) => tracing::trace!(%payload, "ignored osc"),
        }
    }

    fn outcome(&self) -> RecordOutcome {
        let session = lock_session(&self.session);
        match session.get(self.block) {
            Some(b) if b.status.is_terminal() => RecordOutcome::Finished {
                status: b.status,
                exit_code: b.exit_code,
            },
            Some(_) => RecordOutcome::Pending,
            None => RecordOutcome::Finished {
                status: BlockStatus::Error,
                exit_code: None,
            },
        }
    }

    fn complete(&mut self) -> RecordOutcome {
        self.finished = true;

        let snapshot = {
            let mut session = lock_session(&self.session);
            let snapshot = session.get(self.block).cloned();
            if let (Some(block), Some(cwd)) = (&snapshot, self.reported_cwd.take()) {
                if block.status == BlockStatus::Done {
                    session.set_cwd(PathBuf::from(cwd));
                }
            }
            snapshot
        };

        let (status, exit_code) = match &snapshot {
            Some(block) => (block.status, block.exit_code),
            None => (BlockStatus::Error, None),
        };

        if let (Some(vault), Some(block)) = (&self.vault, &snapshot) {
            if let Err(e) = vault.record_block(block) {
                tracing::warn!(block = %self.block, "failed to persist block: {}", e);
            }
        }

        tracing::debug!(block = %self.block, status = status.label(), ?exit_code, "block finished");
        let _ = self.status.send(Some(status));
        let _ = self.events.send(EngineEvent::BlockFinished {
            id: self.block,
            status,
            exit_code,
        });

        RecordOutcome::Finished { status, exit_code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, SessionLimits, Stream};

    struct Fixture {
        session: Arc<Mutex<Session>>,
        rx: mpsc::UnboundedReceiver<EngineEvent>,
        status_rx: watch::Receiver<Option<BlockStatus>>,
        recorder: BlockRecorder,
        id: BlockId,
    }

    fn fixture() -> Fixture {
        let mut s = Session::new(SessionLimits::default(), PathBuf::from("/home"));
        let id = s.begin(BlockKind::Shell, "make");
        let session = Arc::new(Mutex::new(s));
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(None);
        let recorder = BlockRecorder::new(id, session.clone(), None, tx, status_tx);
        Fixture {
            session,
            rx,
            status_rx,
            recorder,
            id,
        }
    }

    fn output(bytes: &[u8]) -> ProcessEvent {
        ProcessEvent::Output {
            stream: Stream::Stdout,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_output_is_filtered_and_published() {
        let mut f = fixture();
        f.recorder.on_event(output(b"\x1b[32mok\x1b[0m\n"));
        let block = lock_session(&f.session).get(f.id).cloned().unwrap();
        assert_eq!(block.output_text(), "ok\n");
        match f.rx.try_recv().unwrap() {
            EngineEvent::Output { fragment, .. } => assert_eq!(fragment.text, "ok\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exit_finishes_block() {
        let mut f = fixture();
        let outcome = f.recorder.on_event(ProcessEvent::Exited { code: Some(2) });
        assert_eq!(
            outcome,
            RecordOutcome::Finished {
                status: BlockStatus::Error,
                exit_code: Some(2)
            }
        );
        assert_eq!(*f.status_rx.borrow(), Some(BlockStatus::Error));
    }

    #[test]
    fn test_cwd_applied_only_on_success() {
        let mut f = fixture();
        f.recorder.on_event(output(b"\x1b]7;file:///srv\x07"));
        f.recorder.on_event(ProcessEvent::Exited { code: Some(0) });
        assert_eq!(lock_session(&f.session).cwd(), std::path::Path::new("/srv"));

        let mut g = fixture();
        g.recorder.on_event(output(b"\x1b]7;file:///srv\x07"));
        g.recorder.on_event(ProcessEvent::Exited { code: Some(1) });
        assert_eq!(lock_session(&g.session).cwd(), std::path::Path::new("/home"));
    }

    #[test]
    fn test_title_recorded() {
        let mut f = fixture();
        f.recorder.on_event(output(b"\x1b]2;building\x07"));
        let title = lock_session(&f.session).get(f.id).unwrap().title.clone();
        assert_eq!(title.as_deref(), Some("building"));
    }

    #[test]
    fn test_stream_closed_fails_block() {
        let mut f = fixture();
        f.recorder.on_stream_closed();
        let block = lock_session(&f.session).get(f.id).cloned().unwrap();
        assert_eq!(block.status, BlockStatus::Error);
        assert!(block.output_text().contains("closed unexpectedly"));
    }

    #[test]
    fn test_events_after_finish_ignored() {
        let mut f = fixture();
        f.recorder.on_event(ProcessEvent::Exited { code: Some(0) });
        f.recorder.on_event(output(b"late\n"));
        let block = lock_session(&f.session).get(f.id).cloned().unwrap();
        assert_eq!(block.output_text(), "");
        assert_eq!(block.status, BlockStatus::Done);
    }
}
