use crate::blocks::recorder::lock_session;
use crate::blocks::{BlockId, BlockStatus, Session};
use crate::config::Config;
use crate::process::{build_driver, ProcessDriver, TermSize};
use crate::runner::{ExecuteResult, Runner, RunnerSettings};
use crate::vault::Vault;
use crate::EngineEvent;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// The main entry point for the NeoTerm core.
/// A front end holds one instance of this and listens on the event channel.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    runner: Arc<Runner>,
}

impl Engine {
    /// Builds the driver, vault and runner from configuration.
    ///
    /// A vault that fails to open is logged and skipped; the session still
    /// works, it just is not persisted.
    pub fn start(config: Config, events: mpsc::UnboundedSender<EngineEvent>) -> Result<Self> {
        let driver = build_driver(config.terminal.driver, config.drain_timeout());

        let vault = match config.vault_path() {
            Some(path) => match Vault::open(&path) {
                Ok(v) => {
                    tracing::info!(
                        path = %path.display(),
                        session = v.session_id(),
                        "vault opened"
                    );
                    Some(v)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "vault unavailable: {}", e);
                    None
                }
            },
            None => None,
        };

        Self::with_driver(config, driver, vault, events)
    }

    /// Same as [`Engine::start`] with the driver and vault supplied.
    pub fn with_driver(
        config: Config,
        driver: Arc<dyn ProcessDriver>,
        vault: Option<Vault>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        let session = Session::new(config.session_limits(), cwd);

        let settings = RunnerSettings {
            shell: config.shell_spec(),
            env: config.shell.env.clone(),
            size: config.term_size(),
        };
        let runner = Arc::new(Runner::new(
            Arc::new(Mutex::new(session)),
            driver,
            vault,
            settings,
            events,
        ));

        tracing::info!(driver = ?config.terminal.driver, "engine started");
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    pub fn session(&self) -> &Arc<Mutex<Session>> {
        self.runner.session()
    }

    pub fn vault(&self) -> Option<&Vault> {
        self.runner.vault()
    }

    pub fn alias_names(&self) -> Vec<String> {
        self.runner.alias_names()
    }

    /// Run a closure against the locked session.
    pub fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        f(&lock_session(self.runner.session()))
    }

    /// User pressed Enter -> route through the runner.
    pub async fn submit(&self, input: &str) -> Result<ExecuteResult> {
        self.runner
            .execute(input)
            .await
            .with_context(|| format!("failed to execute '{}'", input.trim()))
    }

    /// Write raw bytes to a running block's process. `false` if the block
    /// has no live process.
    pub async fn send_input(&self, id: BlockId, bytes: &[u8]) -> Result<bool> {
        self.runner
            .write_to(id, bytes)
            .await
            .context("failed to write to process")
    }

    pub async fn interrupt(&self, id: BlockId) -> Result<bool> {
        self.runner
            .interrupt(id)
            .await
            .context("failed to interrupt process")
    }

    /// Interrupt the newest running block, if any.
    pub async fn interrupt_latest(&self) -> Result<Option<BlockId>> {
        let Some(id) = self.latest_running() else {
            return Ok(None);
        };
        Ok(self.interrupt(id).await?.then_some(id))
    }

    pub fn latest_running(&self) -> Option<BlockId> {
        self.with_session(|s| s.running().last().map(|b| b.id))
    }

    /// Resize every running process and remember the size for new ones.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.runner.resize_all(TermSize { cols, rows }).await
    }

    /// Wait for a block to reach a terminal status. `None` for unknown ids.
    pub async fn wait(&self, id: BlockId) -> Option<BlockStatus> {
        if let Some(mut rx) = self.runner.waiter(id) {
            if let Ok(status) = rx.wait_for(|s| s.is_some()).await {
                return *status;
            }
        }
        // Finished (waiter gone) or never spawned
        self.with_session(|s| s.get(id).map(|b| b.status))
            .filter(|status| status.is_terminal())
    }

    /// Kill running processes and close the vault session.
    pub async fn shutdown(&self) -> Result<()> {
        let killed = self.runner.kill_all().await;
        if killed > 0 {
            tracing::info!(killed, "killed running processes");
        }
        if let Some(vault) = self.runner.vault() {
            vault.close_session().context("failed to close vault session")?;
        }
        Ok(())
    }
}
