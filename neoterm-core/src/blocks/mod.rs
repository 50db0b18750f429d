//! Blocks and the session that orders them.
//!
//! A "block" is one terminal interaction:
//! - command
//! - output fragments (escape-free text, per stream)
//! - status + exit code
//! - cwd
//! - timing
//!
//! The recorder glues process events to the session.

pub mod export;
pub mod model;
pub mod recorder;
pub mod session;
pub mod viewport;

pub use export::{render, ExportError, ExportFormat};
pub use model::{Block, BlockError, BlockId, BlockKind, BlockStatus, OutputFragment, Stream};
pub use recorder::{BlockRecorder, RecordOutcome};
pub use session::{SearchHit, Session, SessionError, SessionLimits, SessionStats};
pub use viewport::{layout, BlockSpan, Viewport};
