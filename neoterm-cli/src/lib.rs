//! NeoTerm front end library target.
//!
//! The binary entry point is in `main.rs`; this file exists so `tests/*.rs`
//! can reach the front end's logic.

pub mod cli;
pub mod commands;
pub mod keyboard;
pub mod render;
pub mod repl;
pub mod util;
