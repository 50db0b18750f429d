//! Keyboard dispatch.
//!
//! Ctrl+C interrupts (the REPL decides whether that means the running
//! block or the input line). Scrolling keys never reach the line editor.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use neoterm_core::input::KeyInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Edit(KeyInput),
    ScrollUp(usize),
    ScrollDown(usize),
    PageUp,
    PageDown,
    ScrollTop,
    ScrollBottom,
}

pub fn map_key(event: KeyEvent) -> Option<KeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);
    let alt = event.modifiers.contains(KeyModifiers::ALT);

    // ── Ctrl combos ──
    if ctrl {
        return match event.code {
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                'c' => Some(KeyAction::Edit(KeyInput::Interrupt)),
                'd' => Some(KeyAction::Edit(KeyInput::Eof)),
                'l' => Some(KeyAction::Edit(KeyInput::ClearScreen)),
                'u' => Some(KeyAction::Edit(KeyInput::KillLine)),
                'w' => Some(KeyAction::Edit(KeyInput::DeleteWord)),
                'a' => Some(KeyAction::Edit(KeyInput::Home)),
                'e' => Some(KeyAction::Edit(KeyInput::End)),
                _ => None,
            },
            KeyCode::Home => Some(KeyAction::ScrollTop),
            KeyCode::End => Some(KeyAction::ScrollBottom),
            KeyCode::Backspace => Some(KeyAction::Edit(KeyInput::DeleteWord)),
            _ => None,
        };
    }

    // ── Scrolling ──
    match event.code {
        KeyCode::PageUp => return Some(KeyAction::PageUp),
        KeyCode::PageDown => return Some(KeyAction::PageDown),
        KeyCode::Up if shift => return Some(KeyAction::ScrollUp(1)),
        KeyCode::Down if shift => return Some(KeyAction::ScrollDown(1)),
        _ => {}
    }

    // ── Bare keys ──
    let input = match event.code {
        KeyCode::Char(_) if alt => return None,
        KeyCode::Char(c) => KeyInput::Char(c),
        KeyCode::Backspace => KeyInput::Backspace,
        KeyCode::Delete => KeyInput::Delete,
        KeyCode::Left => KeyInput::Left,
        KeyCode::Right => KeyInput::Right,
        KeyCode::Home => KeyInput::Home,
        KeyCode::End => KeyInput::End,
        KeyCode::Up => KeyInput::Up,
        KeyCode::Down => KeyInput::Down,
        KeyCode::Tab => KeyInput::Tab,
        KeyCode::Enter => KeyInput::Enter,
        _ => return None,
    };
    Some(KeyAction::Edit(input))
}
