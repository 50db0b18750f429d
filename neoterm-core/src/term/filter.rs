//! Strip terminal escape sequences from process output.
//!
//! Keeps printable text plus `\n`, `\r`, `\t` and backspace so that
//! `Block::lines` can replay carriage-return overwrites. CSI and ESC
//! sequences are dropped; OSC sequences are surfaced as [`OscEvent`]s.

use alacritty_terminal::vte::{Parser, Perform};

use super::osc::{parse_osc_params, OscEvent};

/// Streaming filter. Sequences (and UTF-8 characters) split across
/// chunks are carried over to the next `feed`.
pub struct OutputFilter {
    parser: Parser,
    sink: Sink,
}

impl std::fmt::Debug for OutputFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFilter")
            .field("pending_events", &self.sink.events.len())
            .finish()
    }
}

impl Default for OutputFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// The result of one `feed` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub text: String,
    pub events: Vec<OscEvent>,
}

#[derive(Default)]
struct Sink {
    text: String,
    events: Vec<OscEvent>,
}

impl Perform for Sink {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\r' | b'\t' | 0x08 => self.text.push(byte as char),
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if let Some(ev) = parse_osc_params(params) {
            self.events.push(ev);
        }
    }
}

impl OutputFilter {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: Sink::default(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Filtered {
        self.parser.advance(&mut self.sink, bytes);
        Filtered {
            text: std::mem::take(&mut self.sink.text),
            events: std::mem::take(&mut self.sink.events),
        }
    }
}
