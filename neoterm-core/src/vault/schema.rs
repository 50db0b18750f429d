/// neoterm-core/src/vault/schema.rs
/// Sessions and the per-block history log.
pub const MIGRATION_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER
);

CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    block_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    kind TEXT NOT NULL,
    command TEXT NOT NULL,
    output TEXT,
    status TEXT NOT NULL,
    exit_code INTEGER,
    timestamp INTEGER NOT NULL,
    directory TEXT NOT NULL,
    duration_ms INTEGER,
    FOREIGN KEY(session_id) REFERENCES session(id)
);

CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp);
CREATE INDEX IF NOT EXISTS idx_history_command ON history(command);
CREATE INDEX IF NOT EXISTS idx_history_session ON history(session_id);
"#;

/// Aliases and bookmarks.
pub const MIGRATION_V2: &str = r#"
-- User-defined command aliases
CREATE TABLE IF NOT EXISTS aliases (
    name TEXT PRIMARY KEY,
    expansion TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Bookmarked commands; block_id is set when the bookmark came from a block
CREATE TABLE IF NOT EXISTS bookmarks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command TEXT NOT NULL,
    label TEXT,
    block_id TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bookmarks_block ON bookmarks(block_id);
"#;
