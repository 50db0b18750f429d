//! Render a block for the clipboard or a file.

use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

use super::model::{Block, BlockStatus};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format '{0}' (expected plain, md or json)")]
    UnknownFormat(String),
    #[error("failed to serialize block: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Plain,
    Markdown,
    Json,
}

impl ExportFormat {
    pub const NAMES: &'static [&'static str] = &["plain", "md", "json"];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Plain => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "txt" => Ok(ExportFormat::Plain),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

pub fn render(block: &Block, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Plain => Ok(render_plain(block)),
        ExportFormat::Markdown => Ok(render_markdown(block)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(block)?),
    }
}

fn render_plain(block: &Block) -> String {
    let mut out = format!("$ {}\n", block.command);
    for line in block.lines() {
        out.push_str(&line);
        out.push('\n');
    }
    if let Some(code) = block.exit_code {
        let _ = writeln!(out, "[exit {}]", code);
    }
    out
}

fn render_markdown(block: &Block) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "```shell");
    let _ = writeln!(out, "$ {}", block.command);
    for line in block.lines() {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "```");

    let status = match (block.status, block.exit_code) {
        (BlockStatus::Running, _) => "running".to_string(),
        (_, Some(code)) => format!("{} (exit {})", block.status.label(), code),
        (_, None) => block.status.label().to_string(),
    };
    let _ = write!(out, "\n_{}_ in `{}`", status, block.cwd.display());
    if let Some(ms) = block.duration_ms() {
        let _ = write!(out, ", {} ms", ms);
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockKind, OutputFragment};
    use std::path::PathBuf;

    fn finished_block() -> Block {
        let mut b = Block::new(4, BlockKind::Shell, "ls", PathBuf::from("/srv"));
        b.push_output(OutputFragment::stdout("a.txt\nb.txt\n")).unwrap();
        b.finish(0).unwrap();
        b
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("TEXT".parse::<ExportFormat>().unwrap(), ExportFormat::Plain);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_render_plain() {
        let text = render(&finished_block(), ExportFormat::Plain).unwrap();
        assert_eq!(text, "$ ls\na.txt\nb.txt\n[exit 0]\n");
    }

    #[test]
    fn test_render_markdown() {
        let text = render(&finished_block(), ExportFormat::Markdown).unwrap();
        assert!(text.starts_with("```shell\n$ ls\na.txt\n"));
        assert!(text.contains("_done (exit 0)_ in `/srv`"));
    }

    #[test]
    fn test_render_json() {
        let text = render(&finished_block(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["command"], "ls");
        assert_eq!(value["status"], "done");
        assert_eq!(value["seq"], 4);
    }

    #[test]
    fn test_plain_without_exit_code() {
        let b = Block::new(1, BlockKind::Shell, "sleep 5", PathBuf::from("/"));
        assert_eq!(render(&b, ExportFormat::Plain).unwrap(), "$ sleep 5\n");
    }
}
