#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandType {
    /// Nothing but whitespace.
    Empty,
    /// `!name args...`
    Builtin(String, Vec<String>),
    /// `# prompt` or `/ai prompt`
    Assistant(String),
    /// A plain `cd`, handled without spawning a shell.
    ChangeDir(Option<String>),
    Shell(String),
}

/// Characters that make `cd` part of a larger shell expression.
const SHELL_CONTROL: &[&str] = &[";", "&", "|", "<", ">", "`", "$("];

pub struct CommandParser;

impl CommandParser {
    pub fn parse(input: &str) -> CommandType {
        let line = input.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();

        if trimmed.is_empty() {
            return CommandType::Empty;
        }

        if let Some(rest) = trimmed.strip_prefix('!') {
            let mut parts = rest.split_whitespace();
            if let Some(name) = parts.next() {
                let args = parts.map(str::to_string).collect();
                return CommandType::Builtin(name.to_lowercase(), args);
            }
            return CommandType::Builtin(String::new(), Vec::new());
        }

        if let Some(prompt) = trimmed.strip_prefix('#') {
            return CommandType::Assistant(prompt.trim().to_string());
        }

        if let Some(prompt) = strip_word(trimmed, "/ai") {
            return CommandType::Assistant(prompt.to_string());
        }

        if let Some(target) = strip_word(trimmed, "cd") {
            if !SHELL_CONTROL.iter().any(|op| target.contains(op)) {
                let target = unquote(target);
                return CommandType::ChangeDir((!target.is_empty()).then(|| target.to_string()));
            }
        }

        CommandType::Shell(line.to_string())
    }
}

/// `word` followed by whitespace or the end of input; returns the rest.
fn strip_word<'a>(input: &'a str, word: &str) -> Option<&'a str> {
    let rest = input.strip_prefix(word)?;
    if rest.is_empty() {
        return Some("");
    }
    if rest.starts_with(char::is_whitespace) {
        return Some(rest.trim());
    }
    None
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
