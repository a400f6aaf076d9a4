//! Startup Notification Module
//!
//! Pending startup sequences registered by the spawner, and matching of
//! newly managed clients against them.

use tracing::debug;

/// A launch the spawner is waiting to see a window for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupSequence {
    pub id: String,
    pub wmclass: Option<String>,
    pub binary_name: Option<String>,
    pub timestamp: u32,
}

impl StartupSequence {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            wmclass: None,
            binary_name: None,
            timestamp: x11rb::CURRENT_TIME,
        }
    }
}

/// Startup notification manager
#[derive(Debug, Default)]
pub struct StartupTracker {
    pending: Vec<StartupSequence>,
}

impl StartupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sequence: StartupSequence) {
        debug!("registering startup sequence {}", sequence.id);
        self.pending.retain(|s| s.id != sequence.id);
        self.pending.push(sequence);
    }

    /// The sequence ended without a window (timeout, launch failure)
    pub fn cancel(&mut self, id: &str) -> Option<StartupSequence> {
        let pos = self.pending.iter().position(|s| s.id == id)?;
        Some(self.pending.remove(pos))
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Find and complete the sequence a new client belongs to: exact
    /// startup id first, then WM class against class or instance, then the
    /// binary name, case-insensitively.
    pub fn complete_for(&mut self, startup_id: Option<&str>, class: &str, instance: &str) -> Option<StartupSequence> {
        let matches_name = |name: &str| !name.is_empty() && (name == class || name == instance);
        let matches_binary =
            |name: &str| !name.is_empty() && (name.eq_ignore_ascii_case(class) || name.eq_ignore_ascii_case(instance));

        let pos = startup_id
            .and_then(|id| self.pending.iter().position(|s| s.id == id))
            .or_else(|| {
                self.pending
                    .iter()
                    .position(|s| s.wmclass.as_deref().map_or(false, matches_name))
            })
            .or_else(|| {
                self.pending
                    .iter()
                    .position(|s| s.binary_name.as_deref().map_or(false, matches_binary))
            })?;

        let sequence = self.pending.remove(pos);
        debug!("startup sequence {} completed", sequence.id);
        Some(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> StartupTracker {
        let mut t = StartupTracker::new();
        t.register(StartupSequence {
            binary_name: Some("Firefox".into()),
            ..StartupSequence::new("ff-1")
        });
        t.register(StartupSequence {
            wmclass: Some("Gimp".into()),
            ..StartupSequence::new("gimp-1")
        });
        t.register(StartupSequence::new("term-1"));
        t
    }

    #[test]
    fn exact_id_wins() {
        let mut t = tracker();
        let seq = t.complete_for(Some("term-1"), "Gimp", "gimp").unwrap();
        assert_eq!(seq.id, "term-1");
        assert!(!t.is_pending("term-1"));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn wmclass_matches_class_or_instance() {
        let mut t = tracker();
        assert_eq!(t.complete_for(None, "Gimp-2.10", "Gimp").unwrap().id, "gimp-1");
    }

    #[test]
    fn binary_name_is_case_insensitive() {
        let mut t = tracker();
        assert_eq!(t.complete_for(Some("unknown"), "firefox", "Navigator").unwrap().id, "ff-1");
    }

    #[test]
    fn no_match_leaves_sequences_alone() {
        let mut t = tracker();
        assert!(t.complete_for(None, "xterm", "xterm").is_none());
        assert!(t.complete_for(None, "", "").is_none());
        assert_eq!(t.len(), 3);
        assert!(t.cancel("ff-1").is_some());
        assert_eq!(t.len(), 2);
    }
}
