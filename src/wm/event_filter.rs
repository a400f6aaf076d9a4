//! Event Filter Module
//!
//! Drops events the manager caused itself and protocol errors that are
//! known benign races.

use std::collections::VecDeque;

use tracing::{trace, warn};
use x11rb::protocol::xproto::{CONFIGURE_WINDOW_REQUEST, KILL_CLIENT_REQUEST, SET_INPUT_FOCUS_REQUEST};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::X11Error;

/// Event filter status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// Pass event through
    Pass,
    /// Remove/ignore event
    Remove,
}

/// Sequence-number windows during which EnterNotify/LeaveNotify are ours.
///
/// `begin` is recorded from the first request of an operation that moves
/// windows under the pointer, `end` from the last. Events carry the sequence
/// of the last request the server processed, so an event whose sequence
/// falls in a window was generated by that operation.
#[derive(Debug, Default)]
pub struct EnterLeaveSuppressor {
    open: Option<u64>,
    closed: VecDeque<(u64, u64)>,
}

impl EnterLeaveSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, sequence: u64) {
        if self.open.is_none() {
            self.open = Some(sequence);
        }
    }

    pub fn end(&mut self, sequence: u64) {
        if let Some(begin) = self.open.take() {
            self.closed.push_back((begin, sequence.max(begin)));
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Pending closed windows (not yet consumed by events)
    pub fn pending(&self) -> usize {
        self.closed.len()
    }

    /// Whether an enter/leave event with this sequence must be dropped.
    /// Windows fully behind `sequence` are pruned.
    pub fn filter(&mut self, sequence: u64) -> FilterStatus {
        if matches!(self.open, Some(begin) if sequence >= begin) {
            trace!("enter/leave {} inside open window", sequence);
            return FilterStatus::Remove;
        }
        while matches!(self.closed.front(), Some(&(_, end)) if end < sequence) {
            self.closed.pop_front();
        }
        match self.closed.front() {
            Some(&(begin, end)) if begin <= sequence && sequence <= end => {
                trace!("enter/leave {} inside [{}, {}]", sequence, begin, end);
                FilterStatus::Remove
            }
            _ => FilterStatus::Pass,
        }
    }
}

/// Known races: the window went away, a focus or configure raced its
/// unmap, or a kill raced the client exiting.
pub fn classify_error(kind: ErrorKind, major_opcode: u8) -> FilterStatus {
    match kind {
        ErrorKind::Window => FilterStatus::Remove,
        ErrorKind::Match if major_opcode == SET_INPUT_FOCUS_REQUEST || major_opcode == CONFIGURE_WINDOW_REQUEST => {
            FilterStatus::Remove
        }
        ErrorKind::Value if major_opcode == KILL_CLIENT_REQUEST => FilterStatus::Remove,
        _ => FilterStatus::Pass,
    }
}

/// Drop benign errors, log the rest with decoded fields
pub fn handle_error(error: &X11Error) {
    if classify_error(error.error_kind, error.major_opcode) == FilterStatus::Remove {
        trace!("ignoring {:?} on request {}", error.error_kind, error.major_opcode);
        return;
    }
    warn!(
        "X error: request {} (major {}, minor {}{}), error {:?} (code {}), bad value 0x{:x}, sequence {}",
        error.request_name.unwrap_or("unknown"),
        error.major_opcode,
        error.minor_opcode,
        error
            .extension_name
            .as_deref()
            .map(|ext| format!(", extension {}", ext))
            .unwrap_or_default(),
        error.error_kind,
        error.error_code,
        error.bad_value,
        error.sequence,
    );
}
