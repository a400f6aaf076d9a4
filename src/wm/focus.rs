//! Focus Module
//!
//! Tracks which client holds focus and decides, at refresh time, which
//! server window input focus goes to.

use tracing::{debug, trace};
use x11rb::protocol::xproto::Window;

use crate::wm::client::ClientId;
use crate::wm::registry::Registry;
use crate::wm::tags::Tags;

/// Where server input focus should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// The client's own window
    Window(Window),
    /// The client's input-only stand-in window (created on demand)
    NoFocusWindow(ClientId),
    /// The single manager-owned fallback window
    Fallback,
}

/// Outcome of resolving focus during a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusPlan {
    pub client: Option<ClientId>,
    pub target: FocusTarget,
    /// Window to send `WM_TAKE_FOCUS` to
    pub take_focus: Option<Window>,
    /// Previously focused client that is no longer visible and lost focus
    pub dropped: Option<ClientId>,
}

#[derive(Debug, Default)]
pub struct FocusCoordinator {
    focused: Option<ClientId>,
    need_update: bool,
}

impl FocusCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<ClientId> {
        self.focused
    }

    pub fn is_focused(&self, id: ClientId) -> bool {
        self.focused == Some(id)
    }

    /// Set the focused client. Returns the previous one.
    pub fn set(&mut self, id: Option<ClientId>) -> Option<ClientId> {
        self.need_update = true;
        std::mem::replace(&mut self.focused, id)
    }

    pub fn mark_needs_update(&mut self) {
        self.need_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.need_update
    }

    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.need_update)
    }

    /// Decide the focus target. A focused client that is neither sticky nor
    /// on a selected tag loses focus here.
    pub fn resolve(&mut self, registry: &Registry, tags: &Tags) -> FocusPlan {
        let visible = self.focused.and_then(|id| {
            let client = registry.get(id)?;
            (client.is_sticky() || tags.on_selected_tag(id)).then_some((id, client))
        });

        match visible {
            Some((id, client)) => {
                let target = if client.is_focusable() {
                    FocusTarget::Window(client.window)
                } else {
                    FocusTarget::NoFocusWindow(id)
                };
                let take_focus = client.wants_take_focus().then_some(client.window);
                trace!("focus goes to {:?} ({:?})", id, target);
                FocusPlan {
                    client: Some(id),
                    target,
                    take_focus,
                    dropped: None,
                }
            }
            None => {
                let dropped = self.focused.take();
                if let Some(id) = dropped {
                    debug!("{:?} is no longer visible, dropping focus", id);
                }
                FocusPlan {
                    client: None,
                    target: FocusTarget::Fallback,
                    take_focus: None,
                    dropped,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;
    use crate::wm::client::Client;
    use crate::wm::client_flags::{ClientFlags, WmProtocols};

    fn setup() -> (Registry, Tags, ClientId) {
        let mut reg = Registry::new();
        let id = reg.insert_front(Client::new(10, 20, Geometry::default(), 0)).unwrap();
        let mut tags = Tags::new(&["1".to_string(), "2".to_string()]);
        tags.tag_client(0, id).unwrap();
        (reg, tags, id)
    }

    #[test]
    fn nothing_focused_goes_to_fallback() {
        let (reg, tags, _) = setup();
        let mut focus = FocusCoordinator::new();
        let plan = focus.resolve(&reg, &tags);
        assert_eq!(plan.target, FocusTarget::Fallback);
        assert_eq!(plan.client, None);
    }

    #[test]
    fn visible_client_gets_its_window() {
        let (reg, tags, id) = setup();
        let mut focus = FocusCoordinator::new();
        focus.set(Some(id));
        assert!(focus.take_needs_update());
        let plan = focus.resolve(&reg, &tags);
        assert_eq!(plan.target, FocusTarget::Window(10));
        assert_eq!(plan.take_focus, None);
    }

    #[test]
    fn unfocusable_client_uses_stand_in_and_take_focus() {
        let (mut reg, tags, id) = setup();
        let c = reg.get_mut(id).unwrap();
        c.wm_hints.input = Some(false);
        c.protocols.insert(WmProtocols::TAKE_FOCUS);
        let mut focus = FocusCoordinator::new();
        focus.set(Some(id));
        let plan = focus.resolve(&reg, &tags);
        assert_eq!(plan.target, FocusTarget::NoFocusWindow(id));
        assert_eq!(plan.take_focus, Some(10));
    }

    #[test]
    fn hidden_client_loses_focus_unless_sticky() {
        let (mut reg, mut tags, id) = setup();
        let mut focus = FocusCoordinator::new();
        focus.set(Some(id));
        tags.view_only(1).unwrap();

        reg.get_mut(id).unwrap().flags.insert(ClientFlags::STICKY);
        assert_eq!(focus.resolve(&reg, &tags).client, Some(id));

        reg.get_mut(id).unwrap().flags.remove(ClientFlags::STICKY);
        let plan = focus.resolve(&reg, &tags);
        assert_eq!(plan.dropped, Some(id));
        assert_eq!(plan.target, FocusTarget::Fallback);
        assert_eq!(focus.focused(), None);
    }
}
