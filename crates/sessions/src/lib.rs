//! Avatar session lifecycle and the teleport handoff state machine.

pub mod manager;
pub mod session;

pub use {
    manager::{ManagerTimeouts, SessionError, SessionManager},
    session::{Session, SessionState},
};
