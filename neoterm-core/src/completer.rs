//! Tab Completion Engine
//!
//! Provides context-aware completions for:
//! - ! commands (e.g., !bo → !bookmark, !bookmarks)
//! - builtin arguments (e.g., !export 3 m → !export 3 md)
//! - file/directory paths (e.g., cd Dow → cd Downloads/)
//! - alias names

use std::path::Path;

use crate::blocks::ExportFormat;

/// Known top-level ! commands.
pub const BUILTIN_NAMES: &[&str] = &[
    "alias", "bookmark", "bookmarks", "clear", "collapse", "copy", "exit", "expand", "export",
    "help", "history", "quit", "search", "show", "stats", "unalias",
];

/// Completion state that tracks cycling through results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionState {
    /// The original input text when Tab was first pressed.
    pub original: String,
    /// All matching completions.
    pub completions: Vec<String>,
    /// Current index into completions (cycles on repeated Tab).
    pub index: usize,
}

impl CompletionState {
    fn new(original: &str, completions: Vec<String>) -> Option<Self> {
        if completions.is_empty() || (completions.len() == 1 && completions[0] == original) {
            return None;
        }
        Some(Self {
            original: original.to_string(),
            completions,
            index: 0,
        })
    }

    /// Advance to the next completion, cycling around.
    pub fn next(&mut self) -> &str {
        if self.completions.is_empty() {
            return &self.original;
        }
        self.index = (self.index + 1) % self.completions.len();
        &self.completions[self.index]
    }

    pub fn current(&self) -> &str {
        self.completions
            .get(self.index)
            .map(String::as_str)
            .unwrap_or(&self.original)
    }

    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }
}

/// Generate completions for the given input.
pub fn complete(input: &str, aliases: &[String], cwd: &Path) -> Option<CompletionState> {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix('!') {
        return complete_builtin(trimmed, rest);
    }

    match trimmed.rfind(' ') {
        Some(last_space) => {
            let prefix = &trimmed[..=last_space];
            let partial = &trimmed[last_space + 1..];
            if partial.is_empty() {
                return None;
            }
            complete_path(partial, prefix, cwd)
        }
        None => {
            let matches: Vec<String> = aliases
                .iter()
                .filter(|a| a.starts_with(trimmed))
                .cloned()
                .collect();
            CompletionState::new(trimmed, matches).or_else(|| complete_path(trimmed, "", cwd))
        }
    }
}

fn complete_builtin(input: &str, without_bang: &str) -> Option<CompletionState> {
    let parts: Vec<&str> = without_bang.split(' ').collect();

    if parts.len() == 1 {
        let partial = parts[0].to_lowercase();
        let matches = BUILTIN_NAMES
            .iter()
            .filter(|cmd| cmd.starts_with(&partial))
            .map(|cmd| format!("!{}", cmd))
            .collect();
        return CompletionState::new(input, matches);
    }

    let cmd = parts[0];
    let partial = parts[parts.len() - 1].to_lowercase();
    let head = &input[..input.len() - parts[parts.len() - 1].len()];

    let candidates: &[&str] = match (cmd, parts.len()) {
        ("copy" | "export", 3) => ExportFormat::NAMES,
        ("collapse" | "expand", 2) => &["all", "last"],
        ("bookmark" | "show" | "copy" | "export", 2) => &["last"],
        _ => &[],
    };

    let matches = candidates
        .iter()
        .filter(|c| c.starts_with(&partial))
        .map(|c| format!("{}{}", head, c))
        .collect();
    CompletionState::new(input, matches)
}

/// Complete a file/directory path relative to `cwd`.
/// `partial` is the fragment being completed, `prefix` is everything before it.
fn complete_path(partial: &str, prefix: &str, cwd: &Path) -> Option<CompletionState> {
    let sep = partial.rfind('/');
    let (dir_part, name_fragment) = match sep {
        Some(i) => (&partial[..=i], &partial[i + 1..]),
        None => ("", partial),
    };

    let search_dir = if Path::new(dir_part).is_absolute() {
        Path::new(dir_part).to_path_buf()
    } else {
        cwd.join(dir_part)
    };

    let entries = std::fs::read_dir(&search_dir).ok()?;
    let name_lower = name_fragment.to_lowercase();
    let mut matches: Vec<(bool, String)> = Vec::new();

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Skip hidden files unless the user is explicitly typing a dot
        if name.starts_with('.') && !name_fragment.starts_with('.') {
            continue;
        }
        if !name.to_lowercase().starts_with(&name_lower) {
            continue;
        }

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let suffix = if is_dir { "/" } else { "" };
        matches.push((is_dir, format!("{}{}{}{}", prefix, dir_part, name, suffix)));
    }

    // directories first, then alphabetical
    matches.sort_by(|(a_dir, a), (b_dir, b)| {
        b_dir
            .cmp(a_dir)
            .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
    });

    let original = format!("{}{}", prefix, partial);
    CompletionState::new(&original, matches.into_iter().map(|(_, m)| m).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bang_command_completion() {
        let state = complete("!bo", &[], Path::new(".")).unwrap();
        assert_eq!(state.completions, vec!["!bookmark", "!bookmarks"]);
    }

    #[test]
    fn test_bang_exact_no_completion() {
        assert!(complete("!help", &[], Path::new(".")).is_none());
    }

    #[test]
    fn test_export_format_completion() {
        let state = complete("!export 3 j", &[], Path::new(".")).unwrap();
        assert_eq!(state.completions, vec!["!export 3 json"]);
        let state = complete("!collapse a", &[], Path::new(".")).unwrap();
        assert_eq!(state.completions, vec!["!collapse all"]);
    }

    #[test]
    fn test_alias_completion() {
        let aliases = vec!["gst".to_string(), "gco".to_string()];
        let state = complete("gs", &aliases, Path::new("/nonexistent")).unwrap();
        assert_eq!(state.completions, vec!["gst"]);
    }

    #[test]
    fn test_path_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Downloads")).unwrap();
        std::fs::write(dir.path().join("Documents.txt"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();

        let state = complete("cd Do", &[], dir.path()).unwrap();
        assert_eq!(state.completions, vec!["cd Downloads/", "cd Documents.txt"]);
        assert_eq!(state.original, "cd Do");

        let state = complete("cat .h", &[], dir.path()).unwrap();
        assert_eq!(state.completions, vec!["cat .hidden"]);
    }

    #[test]
    fn test_nested_path_completion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/bin")).unwrap();
        let state = complete("ls src/b", &[], dir.path());
        assert_eq!(state.unwrap().completions, vec!["ls src/bin/"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(complete("", &[], Path::new(".")).is_none());
    }

    #[test]
    fn test_cycling() {
        let mut state = complete("!ex", &[], Path::new(".")).unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(state.current(), "!exit");
        assert_eq!(state.next(), "!expand");
        assert_eq!(state.next(), "!export");
        assert_eq!(state.next(), "!exit");
    }
}
