//! The ordered block history of one terminal.
//!
//! Blocks are appended in submission order and never reordered. Pruning
//! (when the configured limits are exceeded) and `clear` only remove
//! blocks that are finished and not bookmarked.

use std::path::{Path, PathBuf};
use thiserror::Error;

use super::model::{Block, BlockError, BlockId, BlockKind, BlockStatus, OutputFragment};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no such block: {0}")]
    UnknownBlock(String),
    #[error("block reference '{0}' is ambiguous")]
    AmbiguousReference(String),
    #[error(transparent)]
    Block(#[from] BlockError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_blocks: usize,
    pub max_total_lines: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_blocks: 500,
            max_total_lines: 50_000,
        }
    }
}

/// A search result hit within the block history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub block_id: BlockId,
    pub seq: u64,
    /// `None` when the command itself matched.
    pub line_index: Option<usize>,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub total_blocks: usize,
    pub total_lines: usize,
    pub running: usize,
    pub errors: usize,
    pub bookmarked: usize,
}

#[derive(Debug)]
pub struct Session {
    blocks: Vec<Block>,
    next_seq: u64,
    limits: SessionLimits,
    cwd: PathBuf,
    previous_cwd: Option<PathBuf>,
}

impl Default for Session {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::new(SessionLimits::default(), cwd)
    }
}

impl Session {
    pub fn new(limits: SessionLimits, cwd: PathBuf) -> Self {
        Self {
            blocks: Vec::with_capacity(64),
            next_seq: 1,
            limits,
            cwd,
            previous_cwd: None,
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    // ────────────────────────────────────────────────────────────────
    // Working directory
    // ────────────────────────────────────────────────────────────────

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn previous_cwd(&self) -> Option<&Path> {
        self.previous_cwd.as_deref()
    }

    pub fn set_cwd(&mut self, cwd: PathBuf) {
        if cwd != self.cwd {
            let old = std::mem::replace(&mut self.cwd, cwd);
            self.previous_cwd = Some(old);
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────

    /// Append a new running block. Returns its id.
    pub fn begin(&mut self, kind: BlockKind, command: &str) -> BlockId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let block = Block::new(seq, kind, command, self.cwd.clone());
        let id = block.id;
        self.blocks.push(block);

        self.enforce_limits(id);
        id
    }

    pub fn append_output(
        &mut self,
        id: BlockId,
        fragment: OutputFragment,
    ) -> Result<(), SessionError> {
        self.block_mut(id)?.push_output(fragment)?;
        Ok(())
    }

    pub fn finish(&mut self, id: BlockId, exit_code: i32) -> Result<BlockStatus, SessionError> {
        let block = self.block_mut(id)?;
        block.finish(exit_code)?;
        let status = block.status;
        self.enforce_limits(id);
        Ok(status)
    }

    pub fn fail(&mut self, id: BlockId, message: &str) -> Result<(), SessionError> {
        self.block_mut(id)?.fail(message)?;
        self.enforce_limits(id);
        Ok(())
    }

    pub fn set_title(&mut self, id: BlockId, title: String) -> Result<(), SessionError> {
        self.block_mut(id)?.title = Some(title);
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Lookup
    // ────────────────────────────────────────────────────────────────

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_by_seq(&self, seq: u64) -> Option<&Block> {
        // seqs increase along the list
        self.blocks
            .binary_search_by_key(&seq, |b| b.seq)
            .ok()
            .map(|i| &self.blocks[i])
    }

    /// Blocks that have not finished yet, oldest first.
    pub fn running(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.is_running())
    }

    /// Resolve a user reference: `last`, a seq (`3` or `#3`), or a UUID prefix.
    pub fn resolve(&self, reference: &str) -> Result<BlockId, SessionError> {
        let r = reference.trim();
        let unknown = || SessionError::UnknownBlock(r.to_string());

        if r.eq_ignore_ascii_case("last") {
            return self.latest().map(|b| b.id).ok_or_else(unknown);
        }

        let digits = r.strip_prefix('#').unwrap_or(r);
        if let Ok(seq) = digits.parse::<u64>() {
            return self.get_by_seq(seq).map(|b| b.id).ok_or_else(unknown);
        }

        let prefix = r.to_ascii_lowercase();
        if prefix.len() < 4 {
            return Err(unknown());
        }
        let mut matches = self
            .blocks
            .iter()
            .filter(|b| b.id.to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(b), None) => Ok(b.id),
            (Some(_), Some(_)) => Err(SessionError::AmbiguousReference(r.to_string())),
            _ => Err(unknown()),
        }
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, SessionError> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| SessionError::UnknownBlock(id.to_string()))
    }

    // ────────────────────────────────────────────────────────────────
    // Annotations
    // ────────────────────────────────────────────────────────────────

    /// Returns the new bookmark state.
    pub fn toggle_bookmark(&mut self, id: BlockId) -> Result<bool, SessionError> {
        Ok(self.block_mut(id)?.toggle_bookmark())
    }

    pub fn set_bookmarked(&mut self, id: BlockId, bookmarked: bool) -> Result<(), SessionError> {
        self.block_mut(id)?.set_bookmarked(bookmarked);
        Ok(())
    }

    pub fn bookmarked(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.bookmarked)
    }

    pub fn toggle_collapse(&mut self, id: BlockId) -> Result<bool, SessionError> {
        Ok(self.block_mut(id)?.toggle_collapsed())
    }

    pub fn set_collapsed(&mut self, id: BlockId, collapsed: bool) -> Result<(), SessionError> {
        self.block_mut(id)?.collapsed = collapsed;
        Ok(())
    }

    pub fn collapse_all(&mut self) {
        for block in &mut self.blocks {
            block.collapsed = true;
        }
    }

    pub fn expand_all(&mut self) {
        for block in &mut self.blocks {
            block.collapsed = false;
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Queries
    // ────────────────────────────────────────────────────────────────

    /// Case-insensitive search over commands and output lines.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        if needle.is_empty() {
            return hits;
        }

        for block in &self.blocks {
            if block.command.to_lowercase().contains(&needle) {
                hits.push(SearchHit {
                    block_id: block.id,
                    seq: block.seq,
                    line_index: None,
                    context: block.command.clone(),
                });
            }
            for (i, line) in block.lines().into_iter().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    hits.push(SearchHit {
                        block_id: block.id,
                        seq: block.seq,
                        line_index: Some(i),
                        context: line,
                    });
                }
            }
        }
        hits
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_blocks: self.blocks.len(),
            total_lines: self.total_lines(),
            running: self.blocks.iter().filter(|b| b.is_running()).count(),
            errors: self
                .blocks
                .iter()
                .filter(|b| b.status == BlockStatus::Error)
                .count(),
            bookmarked: self.blocks.iter().filter(|b| b.bookmarked).count(),
        }
    }

    fn total_lines(&self) -> usize {
        self.blocks.iter().map(Block::line_count).sum()
    }

    /// Drop finished, unbookmarked blocks. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|b| !is_disposable(b));
        before - self.blocks.len()
    }

    /// Remove the oldest disposable blocks until within limits. `keep` is
    /// the block being changed and is never removed.
    fn enforce_limits(&mut self, keep: BlockId) {
        while self.blocks.len() > self.limits.max_blocks {
            if !self.prune_oldest(keep) {
                break;
            }
        }
        while self.total_lines() > self.limits.max_total_lines {
            if !self.prune_oldest(keep) {
                break;
            }
        }
    }

    fn prune_oldest(&mut self, keep: BlockId) -> bool {
        match self
            .blocks
            .iter()
            .position(|b| b.id != keep && is_disposable(b))
        {
            Some(i) => {
                let removed = self.blocks.remove(i);
                tracing::debug!(seq = removed.seq, "pruned block");
                true
            }
            None => false,
        }
    }
}

fn is_disposable(block: &Block) -> bool {
    block.status.is_terminal() && !block.bookmarked
}
