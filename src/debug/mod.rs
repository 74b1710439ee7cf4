//! Instrumented, pausable execution of engine-owned workflows.

pub mod debugger;
pub mod js_engine;
pub mod session;
pub mod shell;
pub mod store;

pub use debugger::{Debugger, StartSession};
pub use session::*;
pub use store::{Breakpoint, DebugStore, WatchVariable};

#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error("debug session not found: {0}")]
    SessionNotFound(String),

    #[error("session {session} is {status:?}, expected {expected}")]
    InvalidState {
        session: String,
        status: SessionStatus,
        expected: &'static str,
    },

    #[error("debug state error: {0}")]
    State(String),
}
