//! Core error type
//!
//! Startup and connection failures use `anyhow`; the model operations below
//! return this typed error so callers can tell a stale handle from a real fault.

use thiserror::Error;
use x11rb::protocol::xproto::Window;

use crate::wm::client::ClientId;
use crate::wm::screen::ScreenId;

#[derive(Debug, Error)]
pub enum WmError {
    #[error("stale client handle {0:?}")]
    StaleClient(ClientId),

    #[error("stale screen handle {0:?}")]
    StaleScreen(ScreenId),

    #[error("window 0x{0:x} is not managed")]
    UnknownWindow(Window),

    #[error("window 0x{0:x} is already managed")]
    AlreadyManaged(Window),

    #[error("transient_for of window 0x{0:x} would form a cycle")]
    TransientCycle(Window),

    #[error("tag index {0} out of range")]
    NoSuchTag(usize),
}

pub type WmResult<T> = std::result::Result<T, WmError>;
