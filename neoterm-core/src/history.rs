//! Up/Down navigation over submitted input lines.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct HistoryNavigator {
    /// Most recent first.
    entries: VecDeque<String>,
    capacity: usize,
    /// Index into `entries` while navigating.
    cursor: Option<usize>,
    /// What the user had typed before pressing Up.
    draft: String,
}

impl HistoryNavigator {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            cursor: None,
            draft: String::new(),
        }
    }

    /// Seed from stored history, most recent first.
    pub fn with_entries(capacity: usize, recent_first: impl IntoIterator<Item = String>) -> Self {
        let mut nav = Self::new(capacity);
        for entry in recent_first {
            if nav.entries.len() >= nav.capacity {
                break;
            }
            if entry.trim().is_empty() || nav.entries.back() == Some(&entry) {
                continue;
            }
            nav.entries.push_back(entry);
        }
        nav
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Record a submitted line and end navigation.
    pub fn push(&mut self, line: &str) {
        self.reset();
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || self.entries.front().map(String::as_str) == Some(line) {
            return;
        }
        self.entries.push_front(line.to_string());
        self.entries.truncate(self.capacity);
    }

    /// Step to an older entry. `current` is the editor's text, kept as the
    /// draft on the first step.
    pub fn older(&mut self, current: &str) -> Option<&str> {
        let next = match self.cursor {
            None => {
                if self.entries.is_empty() {
                    return None;
                }
                self.draft = current.to_string();
                0
            }
            Some(i) if i + 1 < self.entries.len() => i + 1,
            Some(i) => i,
        };
        self.cursor = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Step to a newer entry; past the newest, the draft comes back.
    pub fn newer(&mut self) -> Option<&str> {
        match self.cursor {
            None => None,
            Some(0) => {
                self.cursor = None;
                Some(self.draft.as_str())
            }
            Some(i) => {
                self.cursor = Some(i - 1);
                self.entries.get(i - 1).map(String::as_str)
            }
        }
    }

    pub fn is_navigating(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.draft.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_restores_draft() {
        let mut h = HistoryNavigator::new(10);
        h.push("ls");
        h.push("pwd");

        assert_eq!(h.older("git st"), Some("pwd"));
        assert_eq!(h.older("pwd"), Some("ls"));
        assert_eq!(h.older("ls"), Some("ls"));
        assert_eq!(h.newer(), Some("pwd"));
        assert_eq!(h.newer(), Some("git st"));
        assert_eq!(h.newer(), None);
    }

    #[test]
    fn test_duplicates_and_blanks_skipped() {
        let mut h = HistoryNavigator::new(10);
        h.push("ls");
        h.push("ls");
        h.push("   ");
        h.push("ls\n");
        assert_eq!(h.len(), 1);
        h.push("pwd");
        h.push("ls");
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_capacity() {
        let mut h = HistoryNavigator::new(2);
        h.push("a");
        h.push("b");
        h.push("c");
        assert_eq!(h.entries().collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn test_empty_history() {
        let mut h = HistoryNavigator::new(5);
        assert_eq!(h.older("x"), None);
        assert!(!h.is_navigating());
    }

    #[test]
    fn test_seeded() {
        let h = HistoryNavigator::with_entries(
            2,
            vec!["b".to_string(), "b".to_string(), "a".to_string(), "z".to_string()],
        );
        assert_eq!(h.entries().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
