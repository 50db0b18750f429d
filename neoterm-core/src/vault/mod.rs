// neoterm-core/src/vault/mod.rs

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::blocks::Block;

pub mod schema;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create vault directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

// ════════════════════════════════════════════════════════════════════
// Data types
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub id: i64,
    pub session_id: String,
    pub block_id: String,
    pub seq: i64,
    pub kind: String,
    pub command: String,
    pub output: Option<String>,
    pub status: String,
    pub exit_code: Option<i32>,
    pub directory: String,
    pub duration_ms: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct Alias {
    pub name: String,
    pub expansion: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct Bookmark {
    pub id: i64,
    pub command: String,
    pub label: Option<String>,
    pub block_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct VaultStats {
    pub total_commands: i64,
    pub session_commands: i64,
    pub total_sessions: i64,
    pub unique_commands: i64,
    pub failed_commands: i64,
    pub alias_count: i64,
    pub bookmark_count: i64,
    pub earliest_timestamp: Option<i64>,
    pub db_size_bytes: i64,
}

// ════════════════════════════════════════════════════════════════════
// Vault
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Vault {
    conn: Arc<Mutex<Connection>>,
    session_id: String,
    start_time: i64,
}

impl Vault {
    /// Open the Vault at the specified path (`:memory:` for a throwaway one).
    /// Creates the database file and runs all migrations if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";
        if !in_memory {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if !in_memory {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(%mode, "vault journal mode");
        }

        conn.execute_batch(schema::MIGRATION_INIT)?;
        conn.execute_batch(schema::MIGRATION_V2)?;

        let vault = Self {
            conn: Arc::new(Mutex::new(conn)),
            session_id: Uuid::new_v4().to_string(),
            start_time: Utc::now().timestamp(),
        };

        vault.start_session()?;
        tracing::info!(path = %path.display(), session = %vault.session_id, "vault opened");

        Ok(vault)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ────────────────────────────────────────────────────────────────
    // Sessions
    // ────────────────────────────────────────────────────────────────

    fn start_session(&self) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session (id, start_time) VALUES (?1, ?2)",
            params![self.session_id, self.start_time],
        )?;
        Ok(())
    }

    /// Mark the current session as ended.
    pub fn close_session(&self) -> Result<()> {
        self.conn().execute(
            "UPDATE session SET end_time = ?1 WHERE id = ?2",
            params![Utc::now().timestamp(), self.session_id],
        )?;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Command History
    // ────────────────────────────────────────────────────────────────

    /// Log a finished block.
    pub fn record_block(&self, block: &Block) -> Result<()> {
        let output = block.output_text();
        self.conn().execute(
            "INSERT INTO history (session_id, block_id, seq, kind, command, output, status,
                                  exit_code, timestamp, directory, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.session_id,
                block.id.to_string(),
                block.seq as i64,
                block.kind.label(),
                block.command,
                if output.is_empty() { None } else { Some(output) },
                block.status.label(),
                block.exit_code,
                block.started_at.timestamp(),
                block.cwd.to_string_lossy().into_owned(),
                block.duration_ms(),
            ],
        )?;
        Ok(())
    }

    /// Search history for commands containing `query`, newest first.
    pub fn search_history(&self, query: &str, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, block_id, seq, kind, command, output, status, exit_code,
                    timestamp, directory, duration_ms
             FROM history
             WHERE command LIKE ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let search_term = format!("%{}%", query);
        let rows = stmt.query_map(params![search_term, limit as i64], |row| {
            Ok(HistoryRecord {
                id: row.get(0)?,
                session_id: row.get(1)?,
                block_id: row.get(2)?,
                seq: row.get(3)?,
                kind: row.get(4)?,
                command: row.get(5)?,
                output: row.get(6)?,
                status: row.get(7)?,
                exit_code: row.get(8)?,
                timestamp: row.get(9)?,
                directory: row.get(10)?,
                duration_ms: row.get(11)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Get the last N unique commands (deduplicated, most recent first).
    pub fn recent_unique(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT command FROM history
             GROUP BY command
             ORDER BY MAX(id) DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Count commands in the current session.
    pub fn session_command_count(&self) -> Result<i64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM history WHERE session_id = ?1",
            params![self.session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ────────────────────────────────────────────────────────────────
    // Aliases
    // ────────────────────────────────────────────────────────────────

    /// Set (create or update) an alias.
    pub fn set_alias(&self, name: &str, expansion: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO aliases (name, expansion, created_at) VALUES (?1, ?2, ?3)",
            params![name, expansion, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn remove_alias(&self, name: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM aliases WHERE name = ?1", params![name])?;
        Ok(affected > 0)
    }

    pub fn get_alias(&self, name: &str) -> Result<Option<String>> {
        let expansion = self
            .conn()
            .query_row(
                "SELECT expansion FROM aliases WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(expansion)
    }

    pub fn list_aliases(&self) -> Result<Vec<Alias>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT name, expansion, created_at FROM aliases ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Alias {
                name: row.get(0)?,
                expansion: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ────────────────────────────────────────────────────────────────
    // Bookmarks
    // ────────────────────────────────────────────────────────────────

    pub fn add_bookmark(
        &self,
        command: &str,
        label: Option<&str>,
        block_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO bookmarks (command, label, block_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![command, label, block_id, Utc::now().timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn remove_bookmark(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Drop the bookmarks that were created from a block.
    pub fn remove_bookmarks_for_block(&self, block_id: &str) -> Result<usize> {
        let affected = self
            .conn()
            .execute("DELETE FROM bookmarks WHERE block_id = ?1", params![block_id])?;
        Ok(affected)
    }

    /// All bookmarks, newest first.
    pub fn list_bookmarks(&self) -> Result<Vec<Bookmark>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, command, label, block_id, created_at FROM bookmarks ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Bookmark {
                id: row.get(0)?,
                command: row.get(1)?,
                label: row.get(2)?,
                block_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ────────────────────────────────────────────────────────────────
    // Statistics
    // ────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> Result<VaultStats> {
        let conn = self.conn();
        let count =
            |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };

        let total_commands = count("SELECT COUNT(*) FROM history")?;
        let session_commands: i64 = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE session_id = ?1",
            params![self.session_id],
            |row| row.get(0),
        )?;
        let total_sessions = count("SELECT COUNT(*) FROM session")?;
        let unique_commands = count("SELECT COUNT(DISTINCT command) FROM history")?;
        let failed_commands = count("SELECT COUNT(*) FROM history WHERE status = 'error'")?;
        let alias_count = count("SELECT COUNT(*) FROM aliases")?;
        let bookmark_count = count("SELECT COUNT(*) FROM bookmarks")?;

        let earliest_timestamp: Option<i64> =
            conn.query_row("SELECT MIN(timestamp) FROM history", [], |row| row.get(0))?;

        // page_count * page_size gives approximate DB size
        let page_count = count("PRAGMA page_count").unwrap_or(0);
        let page_size = count("PRAGMA page_size").unwrap_or(4096);

        Ok(VaultStats {
            total_commands,
            session_commands,
            total_sessions,
            unique_commands,
            failed_commands,
            alias_count,
            bookmark_count,
            earliest_timestamp,
            db_size_bytes: page_count * page_size,
        })
    }

    // ────────────────────────────────────────────────────────────────
    // Export
    // ────────────────────────────────────────────────────────────────

    /// Export history as lines of text suitable for a shell history file.
    pub fn export_history(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT command, timestamp FROM history ORDER BY id ASC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let cmd: String = row.get(0)?;
            let ts: i64 = row.get(1)?;
            Ok(format!("# {}\n{}", ts, cmd))
        })?;
        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, OutputFragment};
    use std::path::PathBuf;

    fn finished(seq: u64, command: &str, code: i32) -> Block {
        let mut b = Block::new(seq, BlockKind::Shell, command, PathBuf::from("/work"));
        b.push_output(OutputFragment::stdout("out\n")).unwrap();
        b.finish(code).unwrap();
        b
    }

    #[test]
    fn test_record_and_search() {
        let vault = Vault::open_in_memory().unwrap();
        vault.record_block(&finished(1, "cargo build", 0)).unwrap();
        vault.record_block(&finished(2, "cargo test", 101)).unwrap();
        vault.record_block(&finished(3, "ls", 0)).unwrap();

        let hits = vault.search_history("cargo", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].command, "cargo test");
        assert_eq!(hits[0].status, "error");
        assert_eq!(hits[0].exit_code, Some(101));
        assert_eq!(hits[0].directory, "/work");
        assert_eq!(hits[0].output.as_deref(), Some("out\n"));
        assert_eq!(vault.session_command_count().unwrap(), 3);
    }

    #[test]
    fn test_recent_unique_dedupes() {
        let vault = Vault::open_in_memory().unwrap();
        for (i, cmd) in ["ls", "pwd", "ls"].iter().enumerate() {
            vault.record_block(&finished(i as u64 + 1, cmd, 0)).unwrap();
        }
        assert_eq!(vault.recent_unique(10).unwrap(), vec!["ls", "pwd"]);
    }

    #[test]
    fn test_bookmark_by_block() {
        let vault = Vault::open_in_memory().unwrap();
        let id = vault.add_bookmark("make", Some("build"), Some("abc")).unwrap();
        vault.add_bookmark("ls", None, None).unwrap();
        assert_eq!(vault.list_bookmarks().unwrap().len(), 2);
        assert_eq!(vault.remove_bookmarks_for_block("abc").unwrap(), 1);
        assert!(!vault.remove_bookmark(id).unwrap());
        assert_eq!(vault.list_bookmarks().unwrap()[0].command, "ls");
    }

    #[test]
    fn test_stats_counts_failures() {
        let vault = Vault::open_in_memory().unwrap();
        vault.record_block(&finished(1, "false", 1)).unwrap();
        let stats = vault.stats().unwrap();
        assert_eq!(stats.total_commands, 1);
        assert_eq!(stats.failed_commands, 1);
        assert_eq!(stats.total_sessions, 1);
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vault.db");
        let vault = Vault::open(&path).unwrap();
        vault.close_session().unwrap();
        assert!(path.exists());
    }
}
