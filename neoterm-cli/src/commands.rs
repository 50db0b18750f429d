//! Headless subcommands.

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use neoterm_core::blocks::{BlockStatus, Stream};
use neoterm_core::config::Config;
use neoterm_core::vault::{HistoryRecord, Vault};
use neoterm_core::{Engine, EngineEvent, ExecuteResult};
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;

use crate::cli::ConfigAction;

/// Exit code for an `Error` block that has none of its own.
const FAILURE: i32 = 1;

pub fn exit_code_for(status: BlockStatus, exit_code: Option<i32>) -> i32 {
    match (status, exit_code) {
        (_, Some(code)) => code,
        (BlockStatus::Error, None) => FAILURE,
        _ => 0,
    }
}

// ────────────────────────────────────────────────────────────────
// exec
// ────────────────────────────────────────────────────────────────

/// Run one line as a block, streaming its output. Returns the exit code.
pub async fn exec(config: Config, command: &str) -> Result<i32> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let engine = Engine::start(config, tx)?;

    let result = engine.submit(command).await?;
    let code = match result {
        ExecuteResult::Started(_) | ExecuteResult::Completed(_) => stream_block(&mut events).await?,
        ExecuteResult::Clipboard { text, .. } => {
            // No clipboard in headless mode; print what would have been copied
            print!("{}", text);
            std::io::stdout().flush().context("failed to flush output")?;
            0
        }
        ExecuteResult::Show { .. }
        | ExecuteResult::ClearScreen
        | ExecuteResult::Exit
        | ExecuteResult::Nothing => 0,
    };

    engine.shutdown().await?;
    Ok(code)
}

/// Copy output events to stdout/stderr until the block finishes.
async fn stream_block(events: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Result<i32> {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();

    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Output { fragment, .. } => {
                let sink: &mut dyn Write = match fragment.stream {
                    Stream::Stdout => &mut stdout,
                    Stream::Stderr => &mut stderr,
                };
                sink.write_all(fragment.text.as_bytes())
                    .context("failed to write output")?;
                sink.flush().context("failed to flush output")?;
            }
            EngineEvent::BlockFinished {
                status, exit_code, ..
            } => return Ok(exit_code_for(status, exit_code)),
            EngineEvent::BlockStarted { .. } | EngineEvent::Cleared => {}
        }
    }
    bail!("engine stopped before the command finished")
}

// ────────────────────────────────────────────────────────────────
// history / bookmarks
// ────────────────────────────────────────────────────────────────

fn open_vault(config: &Config) -> Result<Vault> {
    let Some(path) = config.vault_path() else {
        bail!("the vault is disabled (vault.enabled = false)");
    };
    Vault::open(&path).with_context(|| format!("failed to open vault at {}", path.display()))
}

fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

pub fn format_record(record: &HistoryRecord) -> String {
    let code = record
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:>4}  {}  {}",
        format_timestamp(record.timestamp),
        code,
        record.directory,
        record.command
    )
}

pub fn history(config: &Config, search: Option<&str>, limit: usize, export: bool) -> Result<()> {
    let vault = open_vault(config)?;
    let mut out = std::io::stdout().lock();

    if export {
        for entry in vault.export_history(limit)? {
            writeln!(out, "{}", entry)?;
        }
    } else {
        let records = vault.search_history(search.unwrap_or(""), limit)?;
        if records.is_empty() {
            writeln!(out, "No matching history.")?;
        }
        // oldest at the top, like a shell
        for record in records.iter().rev() {
            writeln!(out, "{}", format_record(record))?;
        }
    }

    vault.close_session()?;
    Ok(())
}

pub fn bookmarks(config: &Config) -> Result<()> {
    let vault = open_vault(config)?;
    let saved = vault.list_bookmarks()?;
    let mut out = std::io::stdout().lock();

    if saved.is_empty() {
        writeln!(out, "No bookmarks saved.")?;
    }
    for bm in saved {
        let label = bm.label.map(|l| format!(" [{}]", l)).unwrap_or_default();
        writeln!(
            out,
            "{:>4}{}  {}  {}",
            bm.id,
            label,
            format_timestamp(bm.created_at),
            bm.command
        )?;
    }

    vault.close_session()?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// config
// ────────────────────────────────────────────────────────────────

pub fn config(path: &Path, action: &ConfigAction) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match action {
        ConfigAction::Path => writeln!(out, "{}", path.display())?,
        ConfigAction::Get { key } => {
            let config = Config::load(path)?;
            match config.get(key)? {
                Some(value) => writeln!(out, "{}", value)?,
                None => writeln!(out, "(unset)")?,
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(key, value)?;
            config.save(path)?;
            tracing::info!(%key, path = %path.display(), "config updated");
        }
        ConfigAction::List => {
            let config = Config::load(path)?;
            for (key, value) in config.list()? {
                writeln!(out, "{} = {}", key, value)?;
            }
        }
    }
    Ok(())
}
