//! Input routing.

pub mod parser;

pub use parser::{CommandParser, CommandType};
