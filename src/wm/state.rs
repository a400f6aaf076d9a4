//! Window manager state
//!
//! Everything the manager knows that does not need a server connection:
//! clients, stacking, focus, screens, tags, overlays and the deferred
//! destroy list. All mutation happens here; `WindowManager` turns the
//! resulting dirty flags and plans into requests.

use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::error::WmResult;
use crate::shared::{Geometry, Insets};
use crate::wm::client::ClientId;
use crate::wm::client_flags::{ClientFlags, ClientProperty};
use crate::wm::focus::{FocusCoordinator, FocusPlan};
use crate::wm::registry::Registry;
use crate::wm::screen::{ScannedViewport, ScreenEvent, ScreenId, ScreenModel};
use crate::wm::signals::{ActivateContext, Hooks, Signal, Verdict};
use crate::wm::stacking::{Overlay, Stack};
use crate::wm::startup::StartupTracker;
use crate::wm::strut::Strut;
use crate::wm::tags::Tags;
use crate::wm::xembed::EmbeddedWindows;

pub struct WmState {
    pub registry: Registry,
    pub stack: Stack,
    pub focus: FocusCoordinator,
    pub screens: ScreenModel,
    pub tags: Tags,
    pub overlays: Vec<Overlay>,
    pub startup: StartupTracker,
    pub embedded: EmbeddedWindows,
    /// Helper windows to destroy at the next refresh
    pub deferred_destroy: Vec<Window>,
    /// Geometry of the root window, for strut math
    pub root_geometry: Geometry,
    /// Default border for newly managed clients
    pub border_width: u32,
    /// Default decoration insets for newly managed clients
    pub titlebar: Insets,
    pub client_list_dirty: bool,
    /// Some client's geometry or pending configure needs flushing
    pub geometry_dirty: bool,
    pub workarea_dirty: bool,
    pub desktops_dirty: bool,
    hooks: Box<dyn Hooks>,
}

impl WmState {
    pub fn new(root_geometry: Geometry, tag_names: &[String], auto_scan: bool, hooks: Box<dyn Hooks>) -> Self {
        Self {
            registry: Registry::new(),
            stack: Stack::new(),
            focus: FocusCoordinator::new(),
            screens: ScreenModel::new(auto_scan),
            tags: Tags::new(tag_names),
            overlays: Vec::new(),
            startup: StartupTracker::new(),
            embedded: EmbeddedWindows::new(),
            deferred_destroy: Vec::new(),
            root_geometry,
            border_width: 0,
            titlebar: Insets::ZERO,
            client_list_dirty: true,
            geometry_dirty: false,
            workarea_dirty: true,
            desktops_dirty: true,
            hooks,
        }
    }

    pub fn emit(&mut self, signal: Signal) {
        self.hooks.emit(&signal);
    }

    pub(crate) fn hooks(&mut self) -> &mut dyn Hooks {
        self.hooks.as_mut()
    }

    pub fn emit_property(&mut self, client: ClientId, property: ClientProperty) {
        self.emit(Signal::PropertyChanged { client, property });
    }

    /// Sticky or on a selected tag
    pub fn is_visible(&self, id: ClientId) -> bool {
        self.registry.get(id).map_or(false, |c| c.is_sticky()) || self.tags.on_selected_tag(id)
    }

    // ---- stacking ----

    pub fn raise(&mut self, id: ClientId) -> WmResult<()> {
        self.registry.try_get(id)?;
        self.stack.push_front(&self.registry, id);
        self.emit(Signal::Raised(id));
        Ok(())
    }

    pub fn lower(&mut self, id: ClientId) -> WmResult<()> {
        self.registry.try_get(id)?;
        self.stack.push_back(&self.registry, id);
        self.emit(Signal::Lowered(id));
        Ok(())
    }

    /// Stacked server windows, bottom to top
    pub fn stacking_windows(&self) -> Vec<Window> {
        self.stack.windows(&self.registry, self.focus.focused(), &self.overlays)
    }

    /// Client windows for `_NET_CLIENT_LIST_STACKING`, bottom to top
    pub fn stacking_client_windows(&self) -> Vec<Window> {
        self.stack
            .layered(&self.registry, self.focus.focused())
            .into_iter()
            .filter_map(|id| self.registry.get(id).map(|c| c.window))
            .collect()
    }

    pub fn add_overlay(&mut self, overlay: Overlay) {
        debug!("overlay 0x{:x} (ontop: {})", overlay.window, overlay.ontop);
        self.overlays.retain(|o| o.window != overlay.window);
        self.overlays.push(overlay);
        self.stack.mark_dirty();
        self.workarea_dirty = true;
    }

    pub fn is_overlay(&self, window: Window) -> bool {
        self.overlays.iter().any(|o| o.window == window)
    }

    pub fn set_overlay_strut(&mut self, window: Window, strut: Strut) {
        if let Some(overlay) = self.overlays.iter_mut().find(|o| o.window == window) {
            if overlay.strut != strut {
                overlay.strut = strut;
                self.workarea_dirty = true;
            }
        }
    }

    pub fn remove_overlay(&mut self, window: Window) {
        self.overlays.retain(|o| o.window != window);
        self.stack.mark_dirty();
        self.workarea_dirty = true;
    }

    // ---- focus ----

    /// Give focus to `id`, emitting unfocus/focus and clearing urgency
    pub fn focus_client(&mut self, id: ClientId) -> WmResult<()> {
        self.registry.try_get(id)?;
        if self.focus.is_focused(id) {
            return Ok(());
        }
        let previous = self.focus.set(Some(id));
        if let Some(prev) = previous.filter(|p| self.registry.contains(*p)) {
            self.emit(Signal::Unfocus(prev));
        }
        // Fullscreen layering depends on focus.
        self.stack.mark_dirty();
        self.set_urgent(id, false)?;
        self.client_list_dirty = true;
        self.emit(Signal::Focus(id));
        Ok(())
    }

    pub fn unfocus(&mut self) {
        if let Some(prev) = self.focus.set(None) {
            self.stack.mark_dirty();
            if self.registry.contains(prev) {
                self.emit(Signal::Unfocus(prev));
            }
        }
    }

    /// `request::activate`: by default make the client visible, focus and raise it
    pub fn activate(&mut self, id: ClientId, context: ActivateContext) -> WmResult<()> {
        self.registry.try_get(id)?;
        match self.hooks.request_activate(id, context) {
            Verdict::Deny => {
                debug!("activation of {:?} denied", id);
                return Ok(());
            }
            Verdict::Default | Verdict::Replace(()) => {}
        }
        if !self.is_visible(id) {
            if let Some(first) = self.tags.client_tags(id).first().copied() {
                self.view_tag(first)?;
            }
        }
        if let Some(c) = self.registry.get_mut(id) {
            if c.flags.contains(ClientFlags::MINIMIZED) {
                c.flags.remove(ClientFlags::MINIMIZED);
                self.emit_property(id, ClientProperty::State(ClientFlags::MINIMIZED));
            }
        }
        self.focus_client(id)?;
        self.raise(id)
    }

    /// Refresh-time focus decision. `None` when nothing needs doing.
    pub fn refresh_focus(&mut self) -> Option<FocusPlan> {
        if !self.focus.take_needs_update() {
            return None;
        }
        let plan = self.focus.resolve(&self.registry, &self.tags);
        if let Some(dropped) = plan.dropped {
            self.stack.mark_dirty();
            if self.registry.contains(dropped) {
                self.emit(Signal::Unfocus(dropped));
            }
        }
        Some(plan)
    }

    // ---- urgency ----

    /// `request::urgent`
    pub fn set_urgent(&mut self, id: ClientId, urgent: bool) -> WmResult<()> {
        let current = self.registry.try_get(id)?.flags.contains(ClientFlags::URGENT);
        let urgent = match self.hooks.request_urgent(id, urgent) {
            Verdict::Deny => return Ok(()),
            Verdict::Replace(value) => value,
            Verdict::Default => urgent,
        };
        if current != urgent {
            self.registry.try_get_mut(id)?.flags.set(ClientFlags::URGENT, urgent);
            self.emit_property(id, ClientProperty::State(ClientFlags::URGENT));
        }
        Ok(())
    }

    // ---- tags ----

    /// `request::tag`. `None` means all tags (sticky).
    pub fn request_tag(&mut self, id: ClientId, tag: Option<usize>) -> WmResult<()> {
        self.registry.try_get(id)?;
        let tag = match self.hooks.request_tag(id, tag) {
            Verdict::Deny => return Ok(()),
            Verdict::Replace(tag) => tag,
            Verdict::Default => tag,
        };
        match tag {
            None => {
                self.set_flag(id, ClientFlags::STICKY, true)?;
            }
            Some(index) => {
                self.tags.set_client_tag(index, id)?;
                self.set_flag(id, ClientFlags::STICKY, false)?;
            }
        }
        self.focus.mark_needs_update();
        self.desktops_dirty = true;
        Ok(())
    }

    pub fn view_tag(&mut self, index: usize) -> WmResult<()> {
        if self.tags.view_only(index)? {
            info!("viewing tag {}", index);
            self.focus.mark_needs_update();
            self.stack.mark_dirty();
            self.desktops_dirty = true;
        }
        Ok(())
    }

    // ---- state flags ----

    /// Set one boolean state flag, emitting a change notification when it changed
    pub fn set_flag(&mut self, id: ClientId, flag: ClientFlags, on: bool) -> WmResult<bool> {
        let client = self.registry.try_get_mut(id)?;
        if client.flags.contains(flag) == on {
            return Ok(false);
        }
        client.flags.set(flag, on);
        // Mutually exclusive pairs
        if on && flag == ClientFlags::ABOVE {
            client.flags.remove(ClientFlags::BELOW);
        } else if on && flag == ClientFlags::BELOW {
            client.flags.remove(ClientFlags::ABOVE);
        }
        if flag.intersects(ClientFlags::ABOVE | ClientFlags::BELOW | ClientFlags::ONTOP | ClientFlags::FULLSCREEN) {
            self.stack.mark_dirty();
        }
        if flag.intersects(ClientFlags::STICKY | ClientFlags::MINIMIZED | ClientFlags::HIDDEN) {
            self.focus.mark_needs_update();
            self.desktops_dirty = true;
        }
        self.emit_property(id, ClientProperty::State(flag));
        Ok(true)
    }

    // ---- struts ----

    pub fn set_strut(&mut self, id: ClientId, strut: Strut) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        if client.strut != strut {
            client.strut = strut;
            self.workarea_dirty = true;
            self.emit_property(id, ClientProperty::Strut);
        }
        Ok(())
    }

    /// Recompute every screen's work area from client and overlay struts
    pub fn update_workareas(&mut self) -> Vec<ScreenId> {
        let struts: Vec<Strut> = self
            .registry
            .iter()
            .map(|(_, c)| c.strut)
            .chain(self.overlays.iter().map(|o| o.strut))
            .filter(|s| !s.is_empty())
            .collect();
        let root = self.root_geometry;
        self.screens.update_workareas(&root, struts.iter())
    }

    // ---- screens ----

    /// Initial scan. Without any scanned screen, one screen covers the root.
    pub fn scan_screens(&mut self, found: &[ScannedViewport]) {
        let mut created = self.screens.scan(found);
        if self.screens.is_empty() {
            debug!("no scanned screens, covering the root");
            created.push(self.screens.add_external(self.root_geometry));
        }
        for id in created {
            self.emit(Signal::ScreenAdded(id));
        }
        self.workarea_dirty = true;
    }

    /// Apply a rescan: emit the minimal notifications and move clients off
    /// removed screens.
    pub fn refresh_screens(&mut self, found: &[ScannedViewport]) -> Vec<ScreenEvent> {
        let events = self.screens.refresh(found);
        for event in &events {
            match *event {
                ScreenEvent::Removed(screen) => {
                    self.relocate_clients_from(screen);
                    self.emit(Signal::ScreenRemoved(screen));
                }
                ScreenEvent::Added(screen) => self.emit(Signal::ScreenAdded(screen)),
                ScreenEvent::GeometryChanged(screen) => self.emit(Signal::ScreenGeometryChanged(screen)),
                ScreenEvent::PrimaryChanged(screen) => self.emit(Signal::ScreenPrimaryChanged(screen)),
            }
        }
        if !events.is_empty() {
            self.workarea_dirty = true;
        }
        events
    }

    /// Clients on a screen that no longer exists go to the nearest survivor
    fn relocate_clients_from(&mut self, removed: ScreenId) {
        let orphans: Vec<(ClientId, i32, i32)> = self
            .registry
            .iter()
            .filter(|(_, c)| c.screen == Some(removed))
            .map(|(id, c)| (id, c.geometry.x, c.geometry.y))
            .collect();
        for (id, x, y) in orphans {
            let target = self.screens.nearest(x, y);
            if target.is_none() {
                warn!("no screen left for {:?}", id);
            }
            if let Some(c) = self.registry.get_mut(id) {
                debug!("relocating 0x{:x} to {:?}", c.window, target);
                c.screen = target;
            }
        }
    }

    pub fn set_primary_output(&mut self, output: &str) {
        if let Some(screen) = self.screens.set_primary_output(output) {
            self.emit(Signal::ScreenPrimaryChanged(screen));
        }
    }

    /// Take the helper windows queued for destruction
    pub fn take_deferred_destroy(&mut self) -> Vec<Window> {
        std::mem::take(&mut self.deferred_destroy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::screen::{Output, ScannedViewport};
    use crate::wm::signals::testing::Recorder;

    fn state() -> (WmState, Recorder) {
        let recorder = Recorder::default();
        let names: Vec<String> = (1..=3).map(|i| i.to_string()).collect();
        let mut state = WmState::new(
            Geometry::new(0, 0, 3000, 3000),
            &names,
            true,
            Box::new(recorder.clone()),
        );
        state.scan_screens(&[viewport(0, 0, 1000, 1000, "A")]);
        recorder.clear();
        (state, recorder)
    }

    fn viewport(x: i32, y: i32, w: u32, h: u32, name: &str) -> ScannedViewport {
        ScannedViewport::new(
            Geometry::new(x, y, w, h),
            vec![Output {
                name: name.into(),
                mm_width: 0,
                mm_height: 0,
            }],
        )
    }

    #[test]
    fn removed_screen_relocates_to_nearest() {
        let (mut state, rec) = state();
        state.refresh_screens(&[
            viewport(0, 0, 1000, 1000, "A"),
            viewport(2000, 0, 1000, 1000, "B"),
            viewport(0, 2000, 1000, 1000, "C"),
        ]);
        let a = state.screens.ids()[0];
        let id = state
            .admit(1, 101, Geometry::new(50, 50, 100, 100), crate::wm::signals::ManageContext::New)
            .unwrap();
        assert_eq!(state.registry.get(id).unwrap().screen, Some(a));

        // A goes away; C also moves up and ends up closer to (50,50) than B.
        state.refresh_screens(&[viewport(2000, 0, 1000, 1000, "B"), viewport(0, 1900, 1000, 1000, "C")]);
        let c = state.screens.screen_at(0, 1900).unwrap();
        assert_eq!(state.registry.get(id).unwrap().screen, Some(c));
        assert_eq!(rec.count(|s| matches!(s, Signal::ScreenRemoved(r) if *r == a)), 1);
    }

    #[test]
    fn flags_mark_stack_dirty_and_emit() {
        let (mut state, rec) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        state.stack.take_dirty();
        assert!(state.set_flag(id, ClientFlags::ABOVE, true).unwrap());
        assert!(state.stack.is_dirty());
        assert!(!state.set_flag(id, ClientFlags::ABOVE, true).unwrap());
        assert!(state.set_flag(id, ClientFlags::BELOW, true).unwrap());
        let flags = state.registry.get(id).unwrap().flags;
        assert!(flags.contains(ClientFlags::BELOW) && !flags.contains(ClientFlags::ABOVE));
        assert_eq!(
            rec.count(|s| matches!(s, Signal::PropertyChanged { property: ClientProperty::State(_), .. })),
            2
        );
    }

    #[test]
    fn denied_activation_changes_nothing() {
        let (mut state, rec) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        *rec.activate.borrow_mut() = Some(Verdict::Deny);
        state.activate(id, ActivateContext::Ewmh).unwrap();
        assert_eq!(state.focus.focused(), None);

        *rec.activate.borrow_mut() = None;
        state.activate(id, ActivateContext::Ewmh).unwrap();
        assert_eq!(state.focus.focused(), Some(id));
        assert_eq!(rec.count(|s| *s == Signal::Focus(id)), 1);
    }

    #[test]
    fn activation_views_the_clients_tag() {
        let (mut state, _) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        state.request_tag(id, Some(2)).unwrap();
        assert!(!state.is_visible(id));
        state.activate(id, ActivateContext::Other).unwrap();
        assert_eq!(state.tags.selected(), vec![2]);
        assert!(state.is_visible(id));
    }

    #[test]
    fn focus_refresh_keeps_at_most_one_visible_focus() {
        let (mut state, rec) = state();
        let a = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        let b = state
            .admit(2, 102, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        state.focus_client(a).unwrap();
        state.focus_client(b).unwrap();
        assert_eq!(rec.count(|s| *s == Signal::Unfocus(a)), 1);

        state.request_tag(b, Some(1)).unwrap();
        let plan = state.refresh_focus().unwrap();
        assert_eq!(plan.dropped, Some(b));
        assert_eq!(state.focus.focused(), None);
        assert!(state.refresh_focus().is_none());
    }

    #[test]
    fn urgency_goes_through_request() {
        let (mut state, rec) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        *rec.urgent.borrow_mut() = Some(Verdict::Replace(false));
        state.set_urgent(id, true).unwrap();
        assert!(!state.registry.get(id).unwrap().flags.contains(ClientFlags::URGENT));
        *rec.urgent.borrow_mut() = None;
        state.set_urgent(id, true).unwrap();
        assert!(state.registry.get(id).unwrap().flags.contains(ClientFlags::URGENT));
    }

    #[test]
    fn overlays_stack_and_reserve_space() {
        let (mut state, _) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        state.stack.take_dirty();
        state.add_overlay(Overlay {
            window: 900,
            ontop: true,
            strut: Strut::from_legacy(&[0, 0, 40, 0]).unwrap(),
        });
        assert!(state.is_overlay(900));
        assert!(state.stack.is_dirty());
        assert_eq!(state.stacking_windows(), vec![101, 900]);
        let changed = state.update_workareas();
        assert_eq!(state.screens.get(changed[0]).unwrap().workarea, Geometry::new(0, 40, 1000, 960));

        state.workarea_dirty = false;
        state.set_overlay_strut(900, Strut::default());
        assert!(state.workarea_dirty);
        state.update_workareas();
        assert_eq!(state.screens.get(changed[0]).unwrap().workarea, Geometry::new(0, 0, 1000, 1000));

        state.remove_overlay(900);
        assert!(!state.is_overlay(900));
        assert!(state.registry.contains(id));
    }

    #[test]
    fn root_screen_without_auto_scan() {
        let recorder = Recorder::default();
        let names = vec!["1".to_string()];
        let mut state = WmState::new(Geometry::new(0, 0, 1280, 800), &names, false, Box::new(recorder.clone()));
        state.scan_screens(&[viewport(0, 0, 640, 800, "A")]);
        assert_eq!(state.screens.len(), 1);
        let root = state.screens.primary().unwrap();
        assert_eq!(state.screens.get(root).unwrap().geometry, Geometry::new(0, 0, 1280, 800));
        assert_eq!(recorder.count(|s| *s == Signal::ScreenAdded(root)), 1);

        // rescans leave it alone
        assert!(state.refresh_screens(&[viewport(0, 0, 1280, 800, "A")]).is_empty());
        let id = state
            .admit(1, 101, Geometry::new(700, 10, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        assert_eq!(state.registry.get(id).unwrap().screen, Some(root));
    }

    #[test]
    fn struts_shrink_workarea() {
        let (mut state, _) = state();
        let id = state
            .admit(1, 101, Geometry::new(0, 0, 10, 10), crate::wm::signals::ManageContext::New)
            .unwrap();
        state.set_strut(id, Strut::from_legacy(&[0, 0, 25, 0]).unwrap()).unwrap();
        let changed = state.update_workareas();
        assert_eq!(changed.len(), 1);
        let screen = state.screens.get(changed[0]).unwrap();
        assert_eq!(screen.workarea, Geometry::new(0, 25, 1000, 975));
    }
}
