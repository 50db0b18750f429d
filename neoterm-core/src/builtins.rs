//! Built-in `!` command handlers.
//!
//! Handlers only read and annotate state. The runner turns each
//! [`BuiltinOutcome`] into a block (or a screen action for `!clear`/`!exit`).

use std::path::PathBuf;

use crate::blocks::recorder::lock_session;
use crate::blocks::{render, BlockId, ExportFormat, Session};
use crate::runner::Runner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinOutcome {
    /// Finished `Done` block carrying this text.
    Output(String),
    /// Finished `Error` block carrying this message.
    Failure(String),
    /// Put `text` on the clipboard; `note` goes in the block.
    Clipboard { text: String, note: String },
    /// Scroll to `target`.
    Show { target: BlockId, note: String },
    Clear,
    Exit,
}

const DEFAULT_HISTORY: usize = 20;

/// Central dispatch for all `!` commands. `name` is lowercase, without `!`.
pub fn dispatch(runner: &Runner, name: &str, args: &[String]) -> BuiltinOutcome {
    match name {
        // ── Screen ──
        "clear" | "cls" => BuiltinOutcome::Clear,
        "exit" | "quit" => BuiltinOutcome::Exit,
        "help" => BuiltinOutcome::Output(help_text()),

        // ── History / search ──
        "history" => history(runner, args),
        "search" => search(runner, args),
        "stats" => stats(runner),

        // ── Blocks ──
        "bookmark" | "bm" => bookmark(runner, args),
        "bookmarks" => bookmarks(runner),
        "copy" => copy(runner, args),
        "export" => export(runner, args),
        "collapse" => set_collapsed(runner, args, true),
        "expand" => set_collapsed(runner, args, false),
        "show" => show(runner, args),

        // ── Aliases ──
        "alias" => alias(runner, args),
        "unalias" => unalias(runner, args),

        "" => BuiltinOutcome::Failure(
            "Missing command name. Type !help for available commands.".into(),
        ),
        other => BuiltinOutcome::Failure(format!(
            "Unknown command: !{}\nType !help for available commands.",
            other
        )),
    }
}

fn help_text() -> String {
    [
        "Built-in commands:",
        "",
        "  !help                      Show this help",
        "  !clear, !cls               Drop finished blocks (bookmarks stay)",
        "  !exit, !quit               Exit neoterm",
        "  !history [n]               Show last n commands (default: 20)",
        "  !search <query>            Search commands and output in this session",
        "  !stats                     Session and vault statistics",
        "",
        "  !bookmark [ref] [label]    Toggle a bookmark (default: last block)",
        "  !bookmarks                 List bookmarks",
        "  !copy <ref> [format]       Copy a block to the clipboard",
        "  !export <ref> [format]     Write a block to a file in the current directory",
        "  !collapse <ref|all>        Hide block output",
        "  !expand <ref|all>          Show block output",
        "  !show <ref>                Scroll to the start of a block",
        "",
        "  !alias                     List aliases",
        "  !alias <name> <expansion>  Create or update an alias",
        "  !unalias <name>            Remove an alias",
        "",
        "  A <ref> is `last`, a block number (`3` or `#3`) or an id prefix.",
        "  Formats: plain, md, json.",
        "",
        "Keys:",
        "  Ctrl+C     Interrupt the running block, or clear the line",
        "  Ctrl+D     Exit on an empty line",
        "  Ctrl+L     Clear the screen",
        "  Tab        Cycle completions",
        "  Up/Down    Navigate command history",
        "",
        "  `cd` changes the session directory; `#` or `/ai` asks the assistant.",
    ]
    .join("\n")
}

/// Resolve a block reference, defaulting to the latest block.
fn resolve(session: &Session, reference: Option<&String>) -> Result<BlockId, String> {
    match reference {
        Some(r) => session.resolve(r).map_err(|e| e.to_string()),
        None => session
            .latest()
            .map(|b| b.id)
            .ok_or_else(|| "No blocks yet.".to_string()),
    }
}

/// True when `arg` reads as a block reference rather than a label.
fn looks_like_reference(arg: &str) -> bool {
    let digits = arg.strip_prefix('#').unwrap_or(arg);
    arg.eq_ignore_ascii_case("last")
        || (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

fn parse_format(arg: Option<&String>) -> Result<ExportFormat, String> {
    match arg {
        Some(raw) => raw.parse::<ExportFormat>().map_err(|e| e.to_string()),
        None => Ok(ExportFormat::default()),
    }
}

// ────────────────────────────────────────────────────────────────────
// History
// ────────────────────────────────────────────────────────────────────

fn history(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    let limit = match args.first() {
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => return BuiltinOutcome::Failure(format!("Usage: !history [n] (got '{}')", raw)),
        },
        None => DEFAULT_HISTORY,
    };

    let commands = match &runner.vault {
        Some(vault) => match vault.recent_unique(limit) {
            Ok(list) => list,
            Err(e) => return BuiltinOutcome::Failure(format!("Error reading history: {}", e)),
        },
        None => {
            let session = lock_session(&runner.session);
            let mut seen = Vec::new();
            for block in session.blocks().iter().rev() {
                if !seen.contains(&block.command) {
                    seen.push(block.command.clone());
                }
                if seen.len() >= limit {
                    break;
                }
            }
            seen
        }
    };

    if commands.is_empty() {
        return BuiltinOutcome::Output("No command history yet.".into());
    }

    let mut lines = vec![format!("Last {} unique commands:", commands.len())];
    for (i, cmd) in commands.iter().enumerate() {
        lines.push(format!("  {:>3}. {}", i + 1, cmd));
    }
    BuiltinOutcome::Output(lines.join("\n"))
}

fn search(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    if args.is_empty() {
        return BuiltinOutcome::Failure("Usage: !search <query>".into());
    }
    let query = args.join(" ");
    let hits = lock_session(&runner.session).search(&query);

    if hits.is_empty() {
        return BuiltinOutcome::Output(format!("No results for '{}'", query));
    }

    let mut lines = vec![format!("{} results for '{}':", hits.len(), query)];
    for hit in &hits {
        match hit.line_index {
            Some(i) => lines.push(format!("  #{}:{}  {}", hit.seq, i + 1, hit.context)),
            None => lines.push(format!("  #{}  $ {}", hit.seq, hit.context)),
        }
    }
    BuiltinOutcome::Output(lines.join("\n"))
}

fn stats(runner: &Runner) -> BuiltinOutcome {
    let s = lock_session(&runner.session).stats();
    let mut lines = vec![
        "Session:".to_string(),
        format!("  Blocks:      {}", s.total_blocks),
        format!("  Lines:       {}", s.total_lines),
        format!("  Running:     {}", s.running),
        format!("  Errors:      {}", s.errors),
        format!("  Bookmarked:  {}", s.bookmarked),
    ];

    if let Some(vault) = &runner.vault {
        match vault.stats() {
            Ok(v) => {
                lines.push(String::new());
                lines.push("Vault:".to_string());
                lines.push(format!("  Commands:        {}", v.total_commands));
                lines.push(format!("  This session:    {}", v.session_commands));
                lines.push(format!("  Unique:          {}", v.unique_commands));
                lines.push(format!("  Failed:          {}", v.failed_commands));
                lines.push(format!("  Sessions:        {}", v.total_sessions));
                lines.push(format!("  Aliases:         {}", v.alias_count));
                lines.push(format!("  Bookmarks:       {}", v.bookmark_count));
            }
            Err(e) => lines.push(format!("Vault unavailable: {}", e)),
        }
    }
    BuiltinOutcome::Output(lines.join("\n"))
}

// ────────────────────────────────────────────────────────────────────
// Blocks
// ────────────────────────────────────────────────────────────────────

fn bookmark(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    let (reference, label_args) = match args.first() {
        Some(first) if looks_like_reference(first) => (Some(first), &args[1..]),
        _ => (None, args),
    };
    let label = (!label_args.is_empty()).then(|| label_args.join(" "));

    let (id, seq, command, now_bookmarked) = {
        let mut session = lock_session(&runner.session);
        let id = match resolve(&session, reference) {
            Ok(id) => id,
            Err(e) => return BuiltinOutcome::Failure(e),
        };
        let now = match session.toggle_bookmark(id) {
            Ok(now) => now,
            Err(e) => return BuiltinOutcome::Failure(e.to_string()),
        };
        let (seq, command) = session
            .get(id)
            .map(|b| (b.seq, b.command.clone()))
            .unwrap_or_default();
        (id, seq, command, now)
    };

    if let Some(vault) = &runner.vault {
        let block_id = id.to_string();
        let stored = if now_bookmarked {
            vault
                .add_bookmark(&command, label.as_deref(), Some(&block_id))
                .map(|_| ())
        } else {
            vault.remove_bookmarks_for_block(&block_id).map(|_| ())
        };
        if let Err(e) = stored {
            tracing::warn!(block = %id, "bookmark not saved: {}", e);
        }
    }

    if now_bookmarked {
        let suffix = label.map(|l| format!(" [{}]", l)).unwrap_or_default();
        BuiltinOutcome::Output(format!("Bookmarked #{}: {}{}", seq, command, suffix))
    } else {
        BuiltinOutcome::Output(format!("Removed bookmark from #{}", seq))
    }
}

fn bookmarks(runner: &Runner) -> BuiltinOutcome {
    let mut lines = Vec::new();

    {
        let session = lock_session(&runner.session);
        let marked: Vec<_> = session.bookmarked().collect();
        if !marked.is_empty() {
            lines.push("This session:".to_string());
            for b in marked {
                lines.push(format!("  #{}  {}", b.seq, b.command));
            }
        }
    }

    if let Some(vault) = &runner.vault {
        match vault.list_bookmarks() {
            Ok(saved) if !saved.is_empty() => {
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.push("Saved:".to_string());
                for bm in saved {
                    let label = bm.label.map(|l| format!(" [{}]", l)).unwrap_or_default();
                    lines.push(format!("  {}{}: {}", bm.id, label, bm.command));
                }
            }
            Ok(_) => {}
            Err(e) => return BuiltinOutcome::Failure(format!("Error listing bookmarks: {}", e)),
        }
    }

    if lines.is_empty() {
        return BuiltinOutcome::Output(
            "No bookmarks saved.\nUsage: !bookmark [ref] [label]".into(),
        );
    }
    BuiltinOutcome::Output(lines.join("\n"))
}

/// Render the referenced block. Shared by `!copy` and `!export`.
fn rendered(
    runner: &Runner,
    args: &[String],
    usage: &str,
) -> Result<(u64, ExportFormat, String, PathBuf), String> {
    if args.is_empty() {
        return Err(usage.to_string());
    }
    let format = parse_format(args.get(1))?;
    let session = lock_session(&runner.session);
    let id = resolve(&session, args.first())?;
    let block = session
        .get(id)
        .ok_or_else(|| format!("no such block: {}", args[0]))?;
    let text = render(block, format).map_err(|e| e.to_string())?;
    Ok((block.seq, format, text, session.cwd().to_path_buf()))
}

fn copy(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    match rendered(runner, args, "Usage: !copy <ref> [plain|md|json]") {
        Ok((seq, _, text, _)) => BuiltinOutcome::Clipboard {
            note: format!("Copied #{} ({} bytes)", seq, text.len()),
            text,
        },
        Err(e) => BuiltinOutcome::Failure(e),
    }
}

fn export(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    let (seq, format, text, cwd) =
        match rendered(runner, args, "Usage: !export <ref> [plain|md|json]") {
            Ok(r) => r,
            Err(e) => return BuiltinOutcome::Failure(e),
        };

    let path = cwd.join(format!("neoterm-block-{}.{}", seq, format.extension()));
    match std::fs::write(&path, text) {
        Ok(()) => BuiltinOutcome::Output(format!("Exported #{} to {}", seq, path.display())),
        Err(e) => BuiltinOutcome::Failure(format!("Failed to write {}: {}", path.display(), e)),
    }
}

fn set_collapsed(runner: &Runner, args: &[String], collapsed: bool) -> BuiltinOutcome {
    let verb = if collapsed { "Collapsed" } else { "Expanded" };
    let mut session = lock_session(&runner.session);

    match args.first() {
        Some(all) if all.eq_ignore_ascii_case("all") => {
            if collapsed {
                session.collapse_all();
            } else {
                session.expand_all();
            }
            BuiltinOutcome::Output(format!("{} {} blocks", verb, session.len()))
        }
        reference => {
            let id = match resolve(&session, reference) {
                Ok(id) => id,
                Err(e) => return BuiltinOutcome::Failure(e),
            };
            if let Err(e) = session.set_collapsed(id, collapsed) {
                return BuiltinOutcome::Failure(e.to_string());
            }
            let seq = session.get(id).map(|b| b.seq).unwrap_or_default();
            BuiltinOutcome::Output(format!("{} #{}", verb, seq))
        }
    }
}

fn show(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    let Some(reference) = args.first() else {
        return BuiltinOutcome::Failure("Usage: !show <ref>".into());
    };
    let session = lock_session(&runner.session);
    match session.resolve(reference) {
        Ok(target) => {
            let seq = session.get(target).map(|b| b.seq).unwrap_or_default();
            BuiltinOutcome::Show {
                target,
                note: format!("Showing #{}", seq),
            }
        }
        Err(e) => BuiltinOutcome::Failure(e.to_string()),
    }
}

// ────────────────────────────────────────────────────────────────────
// Aliases
// ────────────────────────────────────────────────────────────────────

fn alias(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    match args {
        [] => {
            let aliases = runner.lock_aliases();
            if aliases.is_empty() {
                return BuiltinOutcome::Output(
                    "No aliases defined.\nUsage: !alias <name> <expansion>".into(),
                );
            }
            let lines: Vec<String> = aliases
                .iter()
                .map(|(name, expansion)| format!("  {} = {}", name, expansion))
                .collect();
            BuiltinOutcome::Output(format!("Aliases:\n{}", lines.join("\n")))
        }
        [_] => BuiltinOutcome::Failure("Usage: !alias <name> <expansion>".into()),
        [name, rest @ ..] => {
            if name.starts_with('!') || name.contains(char::is_whitespace) {
                return BuiltinOutcome::Failure(format!("Invalid alias name: {}", name));
            }
            let expansion = rest.join(" ");
            if let Some(vault) = &runner.vault {
                if let Err(e) = vault.set_alias(name, &expansion) {
                    return BuiltinOutcome::Failure(format!("Error saving alias: {}", e));
                }
            }
            runner.lock_aliases().insert(name.clone(), expansion.clone());
            BuiltinOutcome::Output(format!("Alias set: {} = {}", name, expansion))
        }
    }
}

fn unalias(runner: &Runner, args: &[String]) -> BuiltinOutcome {
    let Some(name) = args.first() else {
        return BuiltinOutcome::Failure("Usage: !unalias <name>".into());
    };

    if let Some(vault) = &runner.vault {
        if let Err(e) = vault.remove_alias(name) {
            return BuiltinOutcome::Failure(format!("Error removing alias: {}", e));
        }
    }
    match runner.lock_aliases().remove(name) {
        Some(_) => BuiltinOutcome::Output(format!("Removed alias: {}", name)),
        None => BuiltinOutcome::Failure(format!("No alias named '{}'", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, OutputFragment, SessionLimits};
    use crate::process::{ProcessDriver, ProcessError, SpawnRequest, SpawnedProcess};
    use crate::runner::RunnerSettings;
    use crate::vault::Vault;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct NoDriver;

    impl ProcessDriver for NoDriver {
        fn spawn(&self, _: SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
            Err(ProcessError::Spawn("disabled".into()))
        }
    }

    fn runner_in(cwd: PathBuf, vault: Option<Vault>) -> Runner {
        let session = Session::new(SessionLimits::default(), cwd);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Runner::new(
            Arc::new(Mutex::new(session)),
            Arc::new(NoDriver),
            vault,
            RunnerSettings::default(),
            tx,
        )
    }

    fn runner() -> Runner {
        runner_in(PathBuf::from("/tmp"), None)
    }

    fn add_block(runner: &Runner, command: &str, output: &str, code: i32) -> BlockId {
        let mut session = lock_session(&runner.session);
        let id = session.begin(BlockKind::Shell, command);
        session
            .append_output(id, OutputFragment::stdout(output))
            .unwrap();
        session.finish(id, code).unwrap();
        id
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn text(outcome: BuiltinOutcome) -> String {
        match outcome {
            BuiltinOutcome::Output(t) => t,
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_empty_names_fail() {
        let r = runner();
        assert!(matches!(
            dispatch(&r, "nope", &[]),
            BuiltinOutcome::Failure(m) if m.contains("!nope")
        ));
        assert!(matches!(dispatch(&r, "", &[]), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_screen_commands() {
        let r = runner();
        assert_eq!(dispatch(&r, "clear", &[]), BuiltinOutcome::Clear);
        assert_eq!(dispatch(&r, "quit", &[]), BuiltinOutcome::Exit);
        assert!(text(dispatch(&r, "help", &[])).contains("!bookmark"));
    }

    #[test]
    fn test_history_from_session_without_vault() {
        let r = runner();
        add_block(&r, "ls", "", 0);
        add_block(&r, "pwd", "", 0);
        add_block(&r, "ls", "", 0);
        let out = text(dispatch(&r, "history", &[]));
        assert!(out.starts_with("Last 2 unique commands"));
        assert!(out.contains("1. ls"));
        assert!(matches!(dispatch(&r, "history", &args(&["x"])), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_search_reports_line_numbers() {
        let r = runner();
        add_block(&r, "cat log", "ok\nerror: disk\n", 0);
        let out = text(dispatch(&r, "search", &args(&["error"])));
        assert!(out.contains("#1:2  error: disk"));
        assert!(matches!(dispatch(&r, "search", &[]), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_bookmark_toggle_syncs_vault() {
        let vault = Vault::open_in_memory().unwrap();
        let r = runner_in(PathBuf::from("/tmp"), Some(vault.clone()));
        let id = add_block(&r, "cargo build", "", 0);
        add_block(&r, "ls", "", 0);

        let out = text(dispatch(&r, "bookmark", &args(&["1", "release", "build"])));
        assert!(out.contains("#1"));
        assert!(lock_session(&r.session).get(id).unwrap().bookmarked);
        let saved = vault.list_bookmarks().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].label.as_deref(), Some("release build"));

        text(dispatch(&r, "bookmark", &args(&["#1"])));
        assert!(!lock_session(&r.session).get(id).unwrap().bookmarked);
        assert!(vault.list_bookmarks().unwrap().is_empty());
    }

    #[test]
    fn test_bookmark_defaults_to_latest() {
        let r = runner();
        add_block(&r, "ls", "", 0);
        let latest = add_block(&r, "pwd", "", 0);
        text(dispatch(&r, "bookmark", &args(&["keep"])));
        assert!(lock_session(&r.session).get(latest).unwrap().bookmarked);
        assert!(text(dispatch(&r, "bookmarks", &[])).contains("#2  pwd"));
    }

    #[test]
    fn test_bookmark_unknown_reference() {
        let r = runner();
        assert!(matches!(dispatch(&r, "bookmark", &[]), BuiltinOutcome::Failure(_)));
        add_block(&r, "ls", "", 0);
        assert!(matches!(dispatch(&r, "bookmark", &args(&["9"])), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_copy_renders_block() {
        let r = runner();
        add_block(&r, "echo hi", "hi\n", 0);
        match dispatch(&r, "copy", &args(&["last"])) {
            BuiltinOutcome::Clipboard { text, note } => {
                assert_eq!(text, "$ echo hi\nhi\n[exit 0]\n");
                assert!(note.contains("#1"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            dispatch(&r, "copy", &args(&["1", "pdf"])),
            BuiltinOutcome::Failure(_)
        ));
    }

    #[test]
    fn test_export_writes_into_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner_in(dir.path().to_path_buf(), None);
        add_block(&r, "echo hi", "hi\n", 0);
        text(dispatch(&r, "export", &args(&["1", "md"])));
        let written = std::fs::read_to_string(dir.path().join("neoterm-block-1.md")).unwrap();
        assert!(written.contains("echo hi"));
    }

    #[test]
    fn test_collapse_and_expand() {
        let r = runner();
        let a = add_block(&r, "ls", "a\n", 0);
        let b = add_block(&r, "pwd", "b\n", 0);
        text(dispatch(&r, "collapse", &args(&["all"])));
        assert!(lock_session(&r.session).get(b).unwrap().collapsed);
        text(dispatch(&r, "expand", &args(&["#1"])));
        let session = lock_session(&r.session);
        assert!(!session.get(a).unwrap().collapsed);
        assert!(session.get(b).unwrap().collapsed);
    }

    #[test]
    fn test_show_targets_block() {
        let r = runner();
        let id = add_block(&r, "ls", "", 0);
        assert!(matches!(
            dispatch(&r, "show", &args(&["1"])),
            BuiltinOutcome::Show { target, .. } if target == id
        ));
        assert!(matches!(dispatch(&r, "show", &[]), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_alias_roundtrip_through_vault() {
        let vault = Vault::open_in_memory().unwrap();
        let r = runner_in(PathBuf::from("/tmp"), Some(vault.clone()));

        text(dispatch(&r, "alias", &args(&["gs", "git", "status"])));
        assert_eq!(vault.get_alias("gs").unwrap().as_deref(), Some("git status"));
        assert_eq!(r.expand_alias("gs -s"), "git status -s");
        assert!(text(dispatch(&r, "alias", &[])).contains("gs = git status"));

        text(dispatch(&r, "unalias", &args(&["gs"])));
        assert!(vault.get_alias("gs").unwrap().is_none());
        assert!(matches!(dispatch(&r, "unalias", &args(&["gs"])), BuiltinOutcome::Failure(_)));
        assert!(matches!(dispatch(&r, "alias", &args(&["only"])), BuiltinOutcome::Failure(_)));
    }

    #[test]
    fn test_stats_includes_vault() {
        let vault = Vault::open_in_memory().unwrap();
        let r = runner_in(PathBuf::from("/tmp"), Some(vault));
        add_block(&r, "false", "", 1);
        let out = text(dispatch(&r, "stats", &[]));
        assert!(out.contains("Errors:      1"));
        assert!(out.contains("Vault:"));
    }
}
