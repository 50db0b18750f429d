use neoterm_core::blocks::{BlockKind, BlockStatus, OutputFragment, Session, SessionLimits, Stream};
use neoterm_core::history::HistoryNavigator;
use neoterm_core::runtime::parser::{CommandParser, CommandType};
use neoterm_core::term::{OscEvent, OutputFilter};
use neoterm_core::vault::Vault;
use neoterm_core::EngineEvent;
use std::path::PathBuf;

fn session() -> Session {
    Session::new(SessionLimits::default(), PathBuf::from("/work"))
}

// ============================================================================
// Block lifecycle Tests
// ============================================================================

#[test]
fn test_block_done_on_zero_exit() {
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "ls");
    s.append_output(id, OutputFragment::stdout("a\nb\n")).unwrap();
    assert_eq!(s.finish(id, 0).unwrap(), BlockStatus::Done);

    let block = s.get(id).unwrap();
    assert_eq!(block.exit_code, Some(0));
    assert_eq!(block.lines(), vec!["a", "b"]);
    assert!(block.finished_at.is_some());
}

#[test]
fn test_block_error_on_nonzero_exit() {
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "false");
    assert_eq!(s.finish(id, 1).unwrap(), BlockStatus::Error);
}

#[test]
fn test_no_output_after_terminal_status() {
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "true");
    s.finish(id, 0).unwrap();
    assert!(s.append_output(id, OutputFragment::stdout("late")).is_err());
    assert!(s.finish(id, 0).is_err());
    assert_eq!(s.get(id).unwrap().output_text(), "");
}

#[test]
fn test_carriage_return_and_backspace() {
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "progress");
    s.append_output(id, OutputFragment::stdout("10%\r100%\nab\x08c\n"))
        .unwrap();
    assert_eq!(s.get(id).unwrap().lines(), vec!["100%", "ac"]);
}

#[test]
fn test_stderr_fragments_kept_apart() {
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "make");
    s.append_output(id, OutputFragment::stdout("ok\n")).unwrap();
    s.append_output(id, OutputFragment::stderr("warn\n")).unwrap();
    s.append_output(id, OutputFragment::stderr("more\n")).unwrap();

    let output = &s.get(id).unwrap().output;
    assert_eq!(output.len(), 2);
    assert_eq!(output[1].stream, Stream::Stderr);
    assert_eq!(output[1].text, "warn\nmore\n");
}

// ============================================================================
// Session ordering Tests
// ============================================================================

#[test]
fn test_submission_order_and_seq() {
    let mut s = session();
    let ids: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|c| s.begin(BlockKind::Shell, c))
        .collect();
    let listed: Vec<_> = s.blocks().iter().map(|b| b.id).collect();
    assert_eq!(listed, ids);
    assert!(s.blocks().windows(2).all(|w| w[0].seq < w[1].seq));
}

#[test]
fn test_pruning_spares_running_and_bookmarked() {
    let mut s = Session::new(
        SessionLimits {
            max_blocks: 2,
            max_total_lines: 10_000,
        },
        PathBuf::from("/"),
    );
    let running = s.begin(BlockKind::Shell, "sleep 100");
    let kept = s.begin(BlockKind::Shell, "important");
    s.finish(kept, 0).unwrap();
    s.set_bookmarked(kept, true).unwrap();
    let other = s.begin(BlockKind::Shell, "ls");
    s.finish(other, 0).unwrap();
    s.begin(BlockKind::Shell, "pwd");

    assert!(s.get(running).is_some());
    assert!(s.get(kept).is_some());
    assert!(s.get(other).is_none());
}

// ============================================================================
// CommandParser Tests
// ============================================================================

#[test]
fn test_parse_empty() {
    assert_eq!(CommandParser::parse("   \n"), CommandType::Empty);
}

#[test]
fn test_parse_builtin() {
    assert_eq!(
        CommandParser::parse("!History 5"),
        CommandType::Builtin("history".into(), vec!["5".into()])
    );
}

#[test]
fn test_parse_assistant_prefixes() {
    assert_eq!(
        CommandParser::parse("# list big files"),
        CommandType::Assistant("list big files".into())
    );
    assert_eq!(
        CommandParser::parse("/ai explain this"),
        CommandType::Assistant("explain this".into())
    );
    // `/ai` only counts as a whole word
    assert_eq!(
        CommandParser::parse("/aix"),
        CommandType::Shell("/aix".into())
    );
}

#[test]
fn test_parse_cd() {
    assert_eq!(CommandParser::parse("cd"), CommandType::ChangeDir(None));
    assert_eq!(
        CommandParser::parse("cd ~/src"),
        CommandType::ChangeDir(Some("~/src".into()))
    );
    assert_eq!(
        CommandParser::parse("cd \"My Documents\""),
        CommandType::ChangeDir(Some("My Documents".into()))
    );
}

#[test]
fn test_parse_cd_with_operators_is_shell() {
    assert_eq!(
        CommandParser::parse("cd /tmp && ls"),
        CommandType::Shell("cd /tmp && ls".into())
    );
    assert_eq!(
        CommandParser::parse("cd $(git rev-parse --show-toplevel)"),
        CommandType::Shell("cd $(git rev-parse --show-toplevel)".into())
    );
}

#[test]
fn test_parse_shell_keeps_text() {
    assert_eq!(
        CommandParser::parse("  echo  hi  \n"),
        CommandType::Shell("  echo  hi  ".into())
    );
    assert_eq!(
        CommandParser::parse("cdrom"),
        CommandType::Shell("cdrom".into())
    );
}

// ============================================================================
// Output filter Tests
// ============================================================================

#[test]
fn test_filter_drops_sgr() {
    let mut f = OutputFilter::new();
    let out = f.feed(b"\x1b[1;31merror\x1b[0m: bad\r\n");
    assert_eq!(out.text, "error: bad\r\n");
    assert!(out.events.is_empty());
}

#[test]
fn test_filter_decodes_osc() {
    let mut f = OutputFilter::new();
    let out = f.feed(b"\x1b]0;vim\x07\x1b]7;file://host/tmp/a%20b\x1b\\x");
    assert_eq!(
        out.events,
        vec![
            OscEvent::Title("vim".into()),
            OscEvent::Cwd("/tmp/a b".into())
        ]
    );
    assert_eq!(out.text, "x");
}

#[test]
fn test_filter_utf8_across_chunks() {
    let mut f = OutputFilter::new();
    let bytes = "héllo".as_bytes();
    let first = f.feed(&bytes[..2]);
    let second = f.feed(&bytes[2..]);
    assert_eq!(format!("{}{}", first.text, second.text), "héllo");
}

// ============================================================================
// History Tests
// ============================================================================

#[test]
fn test_history_restores_draft() {
    let mut h = HistoryNavigator::new(10);
    h.push("make");
    h.push("make");
    h.push("make test");
    assert_eq!(h.len(), 2);

    assert_eq!(h.older("ma"), Some("make test"));
    assert_eq!(h.older("make test"), Some("make"));
    assert_eq!(h.newer(), Some("make test"));
    assert_eq!(h.newer(), Some("ma"));
}

// ============================================================================
// Vault Tests
// ============================================================================

#[test]
fn test_vault_records_finished_blocks() {
    let vault = Vault::open_in_memory().unwrap();
    let mut s = session();
    let id = s.begin(BlockKind::Shell, "cargo test");
    s.append_output(id, OutputFragment::stdout("ok\n")).unwrap();
    s.finish(id, 0).unwrap();
    vault.record_block(s.get(id).unwrap()).unwrap();

    let hits = vault.search_history("cargo", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].block_id, id.to_string());
    assert_eq!(hits[0].status, "done");
    assert_eq!(hits[0].directory, "/work");
    assert_eq!(vault.session_command_count().unwrap(), 1);
}

#[test]
fn test_vault_aliases() {
    let vault = Vault::open_in_memory().unwrap();
    vault.set_alias("gs", "git status").unwrap();
    vault.set_alias("gs", "git status -sb").unwrap();
    assert_eq!(vault.get_alias("gs").unwrap().as_deref(), Some("git status -sb"));
    assert_eq!(vault.list_aliases().unwrap().len(), 1);
    assert!(vault.remove_alias("gs").unwrap());
    assert!(!vault.remove_alias("gs").unwrap());
}

// ============================================================================
// EngineEvent Tests
// ============================================================================

#[test]
fn test_engine_event_equality() {
    let id = uuid::Uuid::new_v4();
    let a = EngineEvent::Output {
        id,
        fragment: OutputFragment::stdout("x"),
    };
    assert_eq!(a.clone(), a);
    assert_ne!(a, EngineEvent::Cleared);
}
