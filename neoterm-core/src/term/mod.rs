//! Terminal-side parsing helpers.
//!
//! - `filter`: escape stripping over a `vte` parser
//! - `osc`: OSC payload decoding (OSC 7 cwd, OSC 0/2 title)

pub mod filter;
pub mod osc;

pub use filter::{Filtered, OutputFilter};
pub use osc::OscEvent;
