pub mod blocks;
pub mod builtins;
pub mod completer;
pub mod config;
pub mod cwd;
pub mod engine;
pub mod history;
pub mod input;
pub mod process;
pub mod runner;
pub mod runtime;
pub mod term;
pub mod vault;

// Re-export the main struct so front ends can just use `neoterm_core::Engine`
pub use engine::Engine;

pub use blocks::{
    Block, BlockId, BlockKind, BlockStatus, OutputFragment, Session, Stream, Viewport,
};
pub use config::Config;
pub use runner::ExecuteResult;

/// The event stream from the engine. Front ends listen to this to know when
/// to redraw.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A block was added to the session.
    BlockStarted {
        id: BlockId,
        seq: u64,
        kind: BlockKind,
        command: String,
    },
    /// Filtered output appended to a block.
    Output { id: BlockId, fragment: OutputFragment },
    /// A block reached `Done` or `Error`.
    BlockFinished {
        id: BlockId,
        status: BlockStatus,
        exit_code: Option<i32>,
    },
    /// `!clear` removed finished blocks.
    Cleared,
}
