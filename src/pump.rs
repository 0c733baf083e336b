// pump.rs
use std::time::Duration;

use thiserror::Error;

use crate::driver::{OsMessage, SurfaceHandle};

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PumpError(pub String);

/// Outcome of one [`MessagePump::next_message`] wait.
#[derive(Debug)]
pub enum PumpWait {
    /// A message arrived and should be dispatched.
    Message(OsMessage),
    /// The timeout elapsed with nothing pending.
    Idle,
    /// A quit was requested; the pump thread should exit its loop.
    Quit,
}

/// The host OS message loop, reduced to the calls the pump thread needs.
///
/// Exactly one thread (the manager's pump thread) calls `create_surface`,
/// `next_message` and `dispatch_default`; `request_quit` may be called from
/// any thread.
pub trait MessagePump: Send + Sync {
    /// Create the hidden message-receiving surface. Called once, on the
    /// pump thread, before the manager reports ready.
    fn create_surface(&self) -> Result<SurfaceHandle, PumpError>;

    /// Block for the next pending message, up to `timeout`.
    fn next_message(&self, timeout: Duration) -> PumpWait;

    /// Default handling for messages no registered device claimed.
    fn dispatch_default(&self, msg: &OsMessage);

    /// Make a pending or future `next_message` return [`PumpWait::Quit`].
    fn request_quit(&self);
}
