//! X11 event source
//!
//! Polls the X11 file descriptor with mio on the main thread. The poll is the
//! only place the manager sleeps; its timeout comes from the pending
//! debounced work, so timers need no thread of their own.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{trace, warn};

const X11: Token = Token(0);

/// Readiness of the X11 connection
pub struct X11EventSource {
    poll: Poll,
    events: Events,
    fd: RawFd,
}

impl X11EventSource {
    pub fn new(stream: &impl AsRawFd) -> Result<Self> {
        let fd = stream.as_raw_fd();
        let poll = Poll::new().context("Failed to create mio Poll")?;
        poll.registry()
            .register(&mut SourceFd(&fd), X11, Interest::READABLE)
            .context("Failed to register X11 FD with mio")?;
        Ok(Self {
            poll,
            events: Events::with_capacity(4),
            fd,
        })
    }

    /// Block until the connection is readable or `timeout` elapses.
    /// Returns whether the connection became readable.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("poll interrupted");
                return Ok(false);
            }
            Err(e) => return Err(e).context("X11 socket poll failed"),
        }
        let readable = self.events.iter().any(|event| event.token() == X11);
        if !readable && timeout.is_none() {
            warn!("woke without events on fd {}", self.fd);
        }
        Ok(readable)
    }
}

/// Coalesces repeated triggers into one action `delay` after the first.
///
/// Used for screen rescans: a burst of RandR notifications results in a
/// single refresh.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    /// Arm the timer unless it already is
    pub fn trigger(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.delay);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the action is due, for the poll timeout
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Disarm and report whether the action is due
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_triggers_fires_once() {
        let start = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(100));
        assert_eq!(d.timeout(start), None);

        d.trigger(start);
        d.trigger(start + Duration::from_millis(50));
        assert_eq!(d.timeout(start + Duration::from_millis(40)), Some(Duration::from_millis(60)));
        assert!(!d.take_due(start + Duration::from_millis(99)));
        assert!(d.take_due(start + Duration::from_millis(100)));
        assert!(!d.is_pending());
        assert!(!d.take_due(start + Duration::from_millis(500)));
    }

    #[test]
    fn overdue_timeout_is_zero() {
        let start = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(10));
        d.trigger(start);
        assert_eq!(d.timeout(start + Duration::from_secs(1)), Some(Duration::ZERO));
    }

    #[test]
    fn readable_pipe_wakes_the_poll() {
        let (reader, mut writer) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut source = X11EventSource::new(&reader).unwrap();
        assert!(!source.wait(Some(Duration::from_millis(1))).unwrap());
        io::Write::write_all(&mut writer, b"x").unwrap();
        assert!(source.wait(Some(Duration::from_secs(5))).unwrap());
    }
}
