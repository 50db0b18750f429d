use crate::blocks::recorder::lock_session;
use crate::blocks::{BlockId, BlockKind, BlockRecorder, BlockStatus, OutputFragment, Session};
use crate::builtins::{self, BuiltinOutcome};
use crate::cwd;
use crate::process::{
    ProcessControl, ProcessDriver, ProcessEvent, ShellSpec, SpawnRequest, TermSize,
};
use crate::runtime::parser::{CommandParser, CommandType};
use crate::vault::Vault;
use crate::EngineEvent;

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Result of executing a command: what the front end should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteResult {
    /// A process is running for this block; output arrives as events.
    Started(BlockId),
    /// The block was answered immediately (builtin, `cd`, spawn failure).
    Completed(BlockId),
    /// Put `text` on the clipboard; `block` is the note the builtin left.
    Clipboard { block: BlockId, text: String },
    /// Scroll so that `block` starts at the top of the view.
    Show { block: BlockId },
    ClearScreen,
    Exit,
    /// Blank input.
    Nothing,
}

/// How commands are spawned.
#[derive(Debug, Clone, Default)]
pub struct RunnerSettings {
    pub shell: ShellSpec,
    pub env: BTreeMap<String, String>,
    pub size: TermSize,
}

pub(crate) type Controls = Arc<tokio::sync::Mutex<HashMap<BlockId, Box<dyn ProcessControl>>>>;
type Waiters = Arc<Mutex<HashMap<BlockId, watch::Receiver<Option<BlockStatus>>>>>;

#[derive(Debug)]
pub struct Runner {
    pub(crate) session: Arc<Mutex<Session>>,
    pub(crate) vault: Option<Vault>,
    pub(crate) aliases: Mutex<BTreeMap<String, String>>,
    driver: Arc<dyn ProcessDriver>,
    events: mpsc::UnboundedSender<EngineEvent>,
    pub(crate) controls: Controls,
    waiters: Waiters,
    shell: ShellSpec,
    env: BTreeMap<String, String>,
    size: Mutex<TermSize>,
    home: Option<PathBuf>,
}

impl Runner {
    pub fn new(
        session: Arc<Mutex<Session>>,
        driver: Arc<dyn ProcessDriver>,
        vault: Option<Vault>,
        settings: RunnerSettings,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let aliases = vault
            .as_ref()
            .and_then(|v| match v.list_aliases() {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!("failed to load aliases: {}", e);
                    None
                }
            })
            .unwrap_or_default()
            .into_iter()
            .map(|a| (a.name, a.expansion))
            .collect();

        Self {
            session,
            vault,
            aliases: Mutex::new(aliases),
            driver,
            events,
            controls: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            waiters: Arc::new(Mutex::new(HashMap::new())),
            shell: settings.shell,
            env: settings.env,
            size: Mutex::new(settings.size),
            home: cwd::home_dir(),
        }
    }

    pub fn session(&self) -> &Arc<Mutex<Session>> {
        &self.session
    }

    pub fn vault(&self) -> Option<&Vault> {
        self.vault.as_ref()
    }

    pub fn alias_names(&self) -> Vec<String> {
        self.lock_aliases().keys().cloned().collect()
    }

    pub(crate) fn lock_aliases(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.aliases.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn size(&self) -> TermSize {
        *self.size.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_size(&self, size: TermSize) {
        *self.size.lock().unwrap_or_else(|e| e.into_inner()) = size;
    }

    /// Parse user input and route it.
    pub async fn execute(&self, input: &str) -> Result<ExecuteResult> {
        let normalized = input.replace("\r\n", "\n");

        match CommandParser::parse(&normalized) {
            CommandType::Empty => Ok(ExecuteResult::Nothing),

            CommandType::Builtin(name, args) => Ok(self.run_builtin(&normalized, &name, &args)),

            CommandType::Assistant(prompt) => {
                tracing::debug!(%prompt, "assistant prompt without provider");
                let id = self.immediate_block(
                    BlockKind::Assistant,
                    normalized.trim(),
                    Err("no assistant provider is configured".to_string()),
                    false,
                );
                Ok(ExecuteResult::Completed(id))
            }

            CommandType::ChangeDir(target) => Ok(ExecuteResult::Completed(
                self.change_dir(normalized.trim(), target.as_deref()),
            )),

            CommandType::Shell(cmd) => self.spawn_shell(&cmd).await,
        }
    }

    // ----------------------------------------------------------------
    // Shell commands
    // ----------------------------------------------------------------

    /// Replace the first word when it names an alias.
    pub fn expand_alias(&self, command: &str) -> String {
        let trimmed = command.trim_start();
        let (first, rest) = match trimmed.find(char::is_whitespace) {
            Some(i) => (&trimmed[..i], &trimmed[i..]),
            None => (trimmed, ""),
        };
        match self.lock_aliases().get(first) {
            Some(expansion) => format!("{}{}", expansion, rest),
            None => command.to_string(),
        }
    }

    async fn spawn_shell(&self, command: &str) -> Result<ExecuteResult> {
        let expanded = self.expand_alias(command);
        let (id, cwd) = self.begin_block(BlockKind::Shell, command);

        let (status_tx, status_rx) = watch::channel(None);
        self.lock_waiters().insert(id, status_rx);
        let mut recorder = BlockRecorder::new(
            id,
            self.session.clone(),
            self.vault.clone(),
            self.events.clone(),
            status_tx,
        );

        let request = SpawnRequest {
            command: expanded,
            cwd,
            env: self.env.clone(),
            size: self.size(),
            shell: self.shell.clone(),
        };

        match self.driver.spawn(request) {
            Ok(spawned) => {
                self.controls.lock().await.insert(id, spawned.control);

                let controls = self.controls.clone();
                let waiters = self.waiters.clone();
                let mut events = spawned.events;
                tokio::spawn(async move {
                    let mut finished = false;
                    while let Some(event) = events.recv().await {
                        if recorder.on_event(event).is_finished() {
                            finished = true;
                            break;
                        }
                    }
                    if !finished {
                        recorder.on_stream_closed();
                    }
                    controls.lock().await.remove(&id);
                    waiters.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                });

                Ok(ExecuteResult::Started(id))
            }
            Err(e) => {
                tracing::warn!(block = %id, "spawn failed: {}", e);
                recorder.on_event(ProcessEvent::Failed(e.to_string()));
                self.lock_waiters().remove(&id);
                Ok(ExecuteResult::Completed(id))
            }
        }
    }

    fn lock_waiters(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<BlockId, watch::Receiver<Option<BlockStatus>>>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_block(&self, kind: BlockKind, command: &str) -> (BlockId, PathBuf) {
        let (id, seq, cwd) = {
            let mut session = lock_session(&self.session);
            let id = session.begin(kind, command);
            let seq = session.get(id).map(|b| b.seq).unwrap_or_default();
            (id, seq, session.cwd().to_path_buf())
        };
        let _ = self.events.send(EngineEvent::BlockStarted {
            id,
            seq,
            kind,
            command: command.to_string(),
        });
        (id, cwd)
    }

    /// Status receiver for a running block.
    pub(crate) fn waiter(&self, id: BlockId) -> Option<watch::Receiver<Option<BlockStatus>>> {
        self.lock_waiters().get(&id).cloned()
    }

    // ----------------------------------------------------------------
    // Blocks answered in place
    // ----------------------------------------------------------------

    /// Create a block that is finished as soon as it is created.
    fn immediate_block(
        &self,
        kind: BlockKind,
        command: &str,
        result: std::result::Result<String, String>,
        persist: bool,
    ) -> BlockId {
        let (id, _) = self.begin_block(kind, command);

        // Failures get exit code 1, as a shell builtin would.
        let (fragment, code) = match result {
            Ok(text) => (OutputFragment::stdout(with_newline(text)), 0),
            Err(text) => (OutputFragment::stderr(with_newline(text)), 1),
        };

        let snapshot = {
            let mut session = lock_session(&self.session);
            let _ = session.append_output(id, fragment.clone());
            if let Err(e) = session.finish(id, code) {
                tracing::warn!(block = %id, "finish failed: {}", e);
            }
            session.get(id).cloned()
        };

        if !fragment.text.is_empty() {
            let _ = self.events.send(EngineEvent::Output { id, fragment });
        }

        let (status, exit_code) = match &snapshot {
            Some(b) => (b.status, b.exit_code),
            None => (BlockStatus::Error, None),
        };

        if persist {
            if let (Some(vault), Some(block)) = (&self.vault, &snapshot) {
                if let Err(e) = vault.record_block(block) {
                    tracing::warn!("failed to persist block: {}", e);
                }
            }
        }

        let _ = self.events.send(EngineEvent::BlockFinished {
            id,
            status,
            exit_code,
        });
        id
    }

    fn change_dir(&self, command: &str, target: Option<&str>) -> BlockId {
        // configured env wins over the process env, as it does for spawns
        let target = target.map(|t| {
            cwd::expand_vars(t, |name| {
                self.env
                    .get(name)
                    .cloned()
                    .or_else(|| std::env::var(name).ok())
            })
        });
        let resolved = {
            let session = lock_session(&self.session);
            cwd::resolve_cd(
                target.as_deref(),
                session.cwd(),
                session.previous_cwd(),
                self.home.as_deref(),
            )
        };

        let result = match resolved {
            Ok(path) => {
                tracing::debug!(cwd = %path.display(), "changed directory");
                lock_session(&self.session).set_cwd(path);
                Ok(String::new())
            }
            Err(e) => Err(e.to_string()),
        };
        self.immediate_block(BlockKind::Builtin, command, result, true)
    }

    fn run_builtin(&self, command: &str, name: &str, args: &[String]) -> ExecuteResult {
        let command = command.trim();
        match builtins::dispatch(self, name, args) {
            BuiltinOutcome::Output(text) => ExecuteResult::Completed(self.immediate_block(
                BlockKind::Builtin,
                command,
                Ok(text),
                false,
            )),
            BuiltinOutcome::Failure(text) => ExecuteResult::Completed(self.immediate_block(
                BlockKind::Builtin,
                command,
                Err(text),
                false,
            )),
            BuiltinOutcome::Clipboard { text, note } => {
                let block = self.immediate_block(BlockKind::Builtin, command, Ok(note), false);
                ExecuteResult::Clipboard { block, text }
            }
            BuiltinOutcome::Show { target, note } => {
                self.immediate_block(BlockKind::Builtin, command, Ok(note), false);
                ExecuteResult::Show { block: target }
            }
            BuiltinOutcome::Clear => {
                let removed = lock_session(&self.session).clear();
                tracing::debug!(removed, "cleared session");
                let _ = self.events.send(EngineEvent::Cleared);
                ExecuteResult::ClearScreen
            }
            BuiltinOutcome::Exit => ExecuteResult::Exit,
        }
    }

    // ----------------------------------------------------------------
    // Running processes
    // ----------------------------------------------------------------

    pub async fn write_to(&self, id: BlockId, bytes: &[u8]) -> Result<bool> {
        let mut controls = self.controls.lock().await;
        match controls.get_mut(&id) {
            Some(control) => {
                control.write(bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn interrupt(&self, id: BlockId) -> Result<bool> {
        let mut controls = self.controls.lock().await;
        match controls.get_mut(&id) {
            Some(control) => {
                tracing::info!(block = %id, pid = ?control.pid(), "interrupting");
                control.interrupt()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn resize_all(&self, size: TermSize) -> Result<()> {
        self.set_size(size);
        let mut controls = self.controls.lock().await;
        for (id, control) in controls.iter_mut() {
            if let Err(e) = control.resize(size) {
                tracing::warn!(block = %id, "resize failed: {}", e);
            }
        }
        Ok(())
    }

    pub async fn kill_all(&self) -> usize {
        let mut controls = self.controls.lock().await;
        let mut killed = 0;
        for (id, control) in controls.iter_mut() {
            match control.kill() {
                Ok(()) => killed += 1,
                Err(e) => tracing::warn!(block = %id, "kill failed: {}", e),
            }
        }
        killed
    }
}

fn with_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
