//! Review orchestration: the checkpointed workflow, progress reporting and
//! the JSON views of a session.

pub mod engine;
pub mod output;
pub mod progress;
pub mod results;

pub use engine::{completed_session, recorded_milestone, session_status, EngineOptions, ReviewEngine, ReviewTarget};
pub use output::{ReviewOutput, StatusOutput};
pub use progress::{ProgressReporter, TerminalReporter};
