//! Line editing for the interactive prompt.
//!
//! Front ends translate their key events into [`KeyInput`] and act on the
//! returned [`EditorAction`]. History and Tab completion live here so every
//! front end gets the same behaviour.

use std::path::PathBuf;

use crate::completer::{complete, CompletionState};
use crate::history::HistoryNavigator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    Up,
    Down,
    Tab,
    Enter,
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D
    Eof,
    /// Ctrl+L
    ClearScreen,
    /// Ctrl+U
    KillLine,
    /// Ctrl+W
    DeleteWord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    None,
    Redraw,
    Submit(String),
    Interrupt,
    Eof,
    ClearScreen,
}

#[derive(Debug, Clone)]
pub struct LineEditor {
    buffer: Vec<char>,
    /// Char index, `0..=buffer.len()`.
    cursor: usize,
    history: HistoryNavigator,
    completion: Option<CompletionState>,
    aliases: Vec<String>,
    cwd: PathBuf,
}

impl LineEditor {
    pub fn new(history: HistoryNavigator) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            history,
            completion: None,
            aliases: Vec::new(),
            cwd: PathBuf::from("."),
        }
    }

    /// Aliases and directory used for Tab completion.
    pub fn set_completion_context(&mut self, aliases: Vec<String>, cwd: PathBuf) {
        self.aliases = aliases;
        self.cwd = cwd;
    }

    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn history(&self) -> &HistoryNavigator {
        &self.history
    }

    /// Add a submitted command to the Up/Down history.
    pub fn remember(&mut self, line: &str) {
        self.history.push(line);
    }

    pub fn set_text(&mut self, text: &str) {
        self.buffer = text.chars().collect();
        self.cursor = self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.completion = None;
        self.history.reset();
    }

    pub fn handle_key(&mut self, key: KeyInput) -> EditorAction {
        if key != KeyInput::Tab {
            self.completion = None;
        }

        match key {
            KeyInput::Char(c) => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
                EditorAction::Redraw
            }
            KeyInput::Backspace => {
                if self.cursor == 0 {
                    return EditorAction::None;
                }
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
                EditorAction::Redraw
            }
            KeyInput::Delete => {
                if self.cursor >= self.buffer.len() {
                    return EditorAction::None;
                }
                self.buffer.remove(self.cursor);
                EditorAction::Redraw
            }
            KeyInput::Left => self.move_to(self.cursor.saturating_sub(1)),
            KeyInput::Right => self.move_to((self.cursor + 1).min(self.buffer.len())),
            KeyInput::Home => self.move_to(0),
            KeyInput::End => self.move_to(self.buffer.len()),
            KeyInput::Up => {
                let current = self.text();
                match self.history.older(&current).map(str::to_string) {
                    Some(entry) => {
                        self.set_text(&entry);
                        EditorAction::Redraw
                    }
                    None => EditorAction::None,
                }
            }
            KeyInput::Down => match self.history.newer().map(str::to_string) {
                Some(entry) => {
                    self.set_text(&entry);
                    EditorAction::Redraw
                }
                None => EditorAction::None,
            },
            KeyInput::Tab => self.tab(),
            // History is recorded by the caller through `remember`
            KeyInput::Enter => {
                let line = self.text();
                self.history.reset();
                self.buffer.clear();
                self.cursor = 0;
                EditorAction::Submit(line)
            }
            KeyInput::Interrupt => {
                self.clear();
                EditorAction::Interrupt
            }
            KeyInput::Eof => {
                if self.buffer.is_empty() {
                    EditorAction::Eof
                } else {
                    self.handle_key(KeyInput::Delete)
                }
            }
            KeyInput::ClearScreen => EditorAction::ClearScreen,
            KeyInput::KillLine => {
                self.buffer.drain(..self.cursor);
                self.cursor = 0;
                EditorAction::Redraw
            }
            KeyInput::DeleteWord => {
                let end = self.cursor;
                let mut start = end;
                while start > 0 && self.buffer[start - 1].is_whitespace() {
                    start -= 1;
                }
                while start > 0 && !self.buffer[start - 1].is_whitespace() {
                    start -= 1;
                }
                if start == end {
                    return EditorAction::None;
                }
                self.buffer.drain(start..end);
                self.cursor = start;
                EditorAction::Redraw
            }
        }
    }

    fn move_to(&mut self, cursor: usize) -> EditorAction {
        if cursor == self.cursor {
            return EditorAction::None;
        }
        self.cursor = cursor;
        EditorAction::Redraw
    }

    fn tab(&mut self) -> EditorAction {
        let next = match &mut self.completion {
            Some(state) => state.next().to_string(),
            None => match complete(&self.text(), &self.aliases, &self.cwd) {
                Some(state) => {
                    let first = state.current().to_string();
                    self.completion = Some(state);
                    first
                }
                None => return EditorAction::None,
            },
        };
        self.set_text(&next);
        EditorAction::Redraw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> LineEditor {
        LineEditor::new(HistoryNavigator::new(100))
    }

    fn type_str(ed: &mut LineEditor, s: &str) {
        for c in s.chars() {
            ed.handle_key(KeyInput::Char(c));
        }
    }

    #[test]
    fn test_insert_and_submit() {
        let mut ed = editor();
        type_str(&mut ed, "lx");
        ed.handle_key(KeyInput::Left);
        ed.handle_key(KeyInput::Backspace);
        type_str(&mut ed, "l");
        ed.handle_key(KeyInput::End);
        ed.handle_key(KeyInput::Backspace);
        type_str(&mut ed, "s");
        assert_eq!(ed.handle_key(KeyInput::Enter), EditorAction::Submit("ls".into()));
        assert!(ed.is_empty());
    }

    #[test]
    fn test_history_through_editor() {
        let mut ed = editor();
        type_str(&mut ed, "echo one");
        if let EditorAction::Submit(line) = ed.handle_key(KeyInput::Enter) {
            ed.remember(&line);
        }
        type_str(&mut ed, "draft");
        ed.handle_key(KeyInput::Up);
        assert_eq!(ed.text(), "echo one");
        ed.handle_key(KeyInput::Down);
        assert_eq!(ed.text(), "draft");
    }

    #[test]
    fn test_enter_alone_does_not_record_history() {
        let mut ed = editor();
        type_str(&mut ed, "hunter2");
        assert_eq!(
            ed.handle_key(KeyInput::Enter),
            EditorAction::Submit("hunter2".into())
        );
        assert!(ed.history().is_empty());
        assert_eq!(ed.handle_key(KeyInput::Up), EditorAction::None);
        assert!(ed.is_empty());
    }

    #[test]
    fn test_ctrl_d() {
        let mut ed = editor();
        assert_eq!(ed.handle_key(KeyInput::Eof), EditorAction::Eof);
        type_str(&mut ed, "ab");
        ed.handle_key(KeyInput::Home);
        ed.handle_key(KeyInput::Eof);
        assert_eq!(ed.text(), "b");
    }

    #[test]
    fn test_interrupt_clears_line() {
        let mut ed = editor();
        type_str(&mut ed, "sleep 10");
        assert_eq!(ed.handle_key(KeyInput::Interrupt), EditorAction::Interrupt);
        assert!(ed.is_empty());
    }

    #[test]
    fn test_delete_word_and_kill_line() {
        let mut ed = editor();
        type_str(&mut ed, "git commit  ");
        ed.handle_key(KeyInput::DeleteWord);
        assert_eq!(ed.text(), "git ");
        ed.handle_key(KeyInput::KillLine);
        assert_eq!(ed.text(), "");
    }

    #[test]
    fn test_tab_cycles() {
        let mut ed = editor();
        type_str(&mut ed, "!ex");
        ed.handle_key(KeyInput::Tab);
        assert_eq!(ed.text(), "!exit");
        ed.handle_key(KeyInput::Tab);
        assert_eq!(ed.text(), "!expand");
        type_str(&mut ed, " a");
        ed.handle_key(KeyInput::Tab);
        assert_eq!(ed.text(), "!expand all");
    }

    #[test]
    fn test_unicode_cursor() {
        let mut ed = editor();
        type_str(&mut ed, "héllo");
        ed.handle_key(KeyInput::Home);
        ed.handle_key(KeyInput::Right);
        ed.handle_key(KeyInput::Delete);
        assert_eq!(ed.text(), "hllo");
        assert_eq!(ed.cursor(), 1);
    }
}
