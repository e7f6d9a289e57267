//! Session management
//!
//! Server-side session state, lifecycle and shutdown fan-out.

mod manager;
mod state;

pub use manager::SessionManager;
pub use state::{SessionId, SessionPhase, SessionState};
