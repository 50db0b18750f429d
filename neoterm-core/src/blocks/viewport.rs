//! Line layout of a session and a scrolling window over it.

use super::model::BlockId;
use super::session::Session;

/// Where one block sits in the flattened line list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub block_id: BlockId,
    /// Index of the header line.
    pub start_line: usize,
    /// Header plus visible output lines.
    pub len: usize,
}

/// Flatten the session: one header line per block, followed by its output
/// lines unless the block is collapsed.
pub fn layout(session: &Session) -> Vec<BlockSpan> {
    let mut spans = Vec::with_capacity(session.len());
    let mut line = 0;
    for block in session.blocks() {
        let body = if block.collapsed { 0 } else { block.line_count() };
        let len = 1 + body;
        spans.push(BlockSpan {
            block_id: block.id,
            start_line: line,
            len,
        });
        line += len;
    }
    spans
}

pub fn total_lines(spans: &[BlockSpan]) -> usize {
    spans.last().map(|s| s.start_line + s.len).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// First visible line.
    pub offset: usize,
    pub height: usize,
    /// Stick to the bottom as new output arrives.
    pub follow: bool,
}

impl Viewport {
    pub fn new(height: usize) -> Self {
        Self {
            offset: 0,
            height: height.max(1),
            follow: true,
        }
    }

    fn max_offset(&self, total: usize) -> usize {
        total.saturating_sub(self.height)
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.offset = self.offset.saturating_sub(n);
        self.follow = false;
    }

    pub fn scroll_down(&mut self, n: usize, total: usize) {
        let max = self.max_offset(total);
        self.offset = (self.offset + n).min(max);
        self.follow = self.offset == max;
    }

    pub fn scroll_to_top(&mut self) {
        self.offset = 0;
        self.follow = false;
    }

    pub fn scroll_to_bottom(&mut self, total: usize) {
        self.offset = self.max_offset(total);
        self.follow = true;
    }

    /// Put the header of block `id` at the top of the window.
    /// Returns false when the block is not in the session.
    pub fn scroll_to_block_start(&mut self, session: &Session, id: BlockId) -> bool {
        let spans = layout(session);
        match spans.iter().find(|s| s.block_id == id) {
            Some(span) => {
                self.offset = span.start_line;
                self.follow = false;
                true
            }
            None => false,
        }
    }

    pub fn set_height(&mut self, height: usize, total: usize) {
        self.height = height.max(1);
        if self.follow {
            self.offset = self.max_offset(total);
        } else {
            self.offset = self.offset.min(self.max_offset(total));
        }
    }

    /// Half-open line range currently on screen.
    pub fn visible_range(&self, total: usize) -> std::ops::Range<usize> {
        let start = if self.follow {
            self.max_offset(total)
        } else {
            self.offset.min(total)
        };
        let end = (start + self.height).min(total);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, OutputFragment, SessionLimits};
    use std::path::PathBuf;

    fn session_with_blocks() -> (Session, Vec<BlockId>) {
        let mut s = Session::new(SessionLimits::default(), PathBuf::from("/"));
        let mut ids = Vec::new();
        for (cmd, out) in [("a", "1\n2\n"), ("b", "3\n"), ("c", "4\n5\n6\n")] {
            let id = s.begin(BlockKind::Shell, cmd);
            s.append_output(id, OutputFragment::stdout(out)).unwrap();
            s.finish(id, 0).unwrap();
            ids.push(id);
        }
        (s, ids)
    }

    #[test]
    fn test_layout_counts_headers() {
        let (s, ids) = session_with_blocks();
        let spans = layout(&s);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].len, 3);
        assert_eq!(spans[1].start_line, 3);
        assert_eq!(spans[2].block_id, ids[2]);
        assert_eq!(total_lines(&spans), 10);
    }

    #[test]
    fn test_collapsed_block_is_header_only() {
        let (mut s, ids) = session_with_blocks();
        s.toggle_collapse(ids[0]).unwrap();
        let spans = layout(&s);
        assert_eq!(spans[0].len, 1);
        assert_eq!(spans[1].start_line, 1);
    }

    #[test]
    fn test_scroll_to_block_start() {
        let (s, ids) = session_with_blocks();
        let mut vp = Viewport::new(4);
        assert!(vp.scroll_to_block_start(&s, ids[1]));
        assert_eq!(vp.offset, 3);
        assert!(!vp.follow);
        assert_eq!(vp.visible_range(10), 3..7);
        assert!(!vp.scroll_to_block_start(&s, uuid::Uuid::new_v4()));
    }

    #[test]
    fn test_follow_tracks_bottom() {
        let mut vp = Viewport::new(4);
        assert_eq!(vp.visible_range(10), 6..10);
        vp.scroll_up(2);
        assert!(!vp.follow);
        vp.scroll_down(100, 10);
        assert!(vp.follow);
        assert_eq!(vp.offset, 6);
    }

    #[test]
    fn test_short_content() {
        let mut vp = Viewport::new(20);
        vp.scroll_to_bottom(5);
        assert_eq!(vp.visible_range(5), 0..5);
        vp.scroll_to_top();
        assert_eq!(vp.visible_range(0), 0..0);
    }
}
