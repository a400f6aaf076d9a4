//! Client lifecycle
//!
//! The connection-free half of manage/unmanage plus every geometry and
//! state operation on a managed client. `WindowManager` issues the server
//! requests around these calls.

use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::error::{WmError, WmResult};
use crate::shared::{Geometry, Insets};
use crate::wm::client::{Client, ClientId, ClientState};
use crate::wm::client_flags::{ClientFlags, ClientProperty, WmProtocols};
use crate::wm::ewmh::{Desktop, StateAction};
use crate::wm::gravity::{border_change, translate_for_gravity};
use crate::wm::hints::apply_size_hints;
use crate::wm::properties::{ClientProperties, PropertyUpdate};
use crate::wm::signals::{GeometryContext, ManageContext, Signal, UnmanageReason, Verdict};
use crate::wm::state::WmState;
use crate::wm::transients;

/// Fields of a ConfigureRequest, already filtered by its value mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigureChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub border_width: Option<u32>,
}

/// What the refresh pass must send for one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryPlan {
    /// Configure the frame and the inner window. `synthetic` asks for an
    /// additional synthetic ConfigureNotify because the client moved
    /// without being resized and will not get a real one.
    Configure { frame: Geometry, inner: Geometry, synthetic: bool },
    /// Nothing moved but a ConfigureRequest is waiting for an answer
    SyntheticOnly,
}

/// How to get rid of a client politely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Delete,
    Kill,
}

impl WmState {
    // ---- manage ----

    /// First half of manage: register the client, place it on a screen and
    /// the selected tags, and put it on top of the stack.
    pub fn admit(&mut self, window: Window, frame: Window, geometry: Geometry, context: ManageContext) -> WmResult<ClientId> {
        let mut client = Client::new(window, frame, geometry, self.border_width);
        client.state = ClientState::Managing(context);
        client.titlebar = self.titlebar;
        client.screen = self
            .screens
            .screen_at(geometry.x, geometry.y)
            .or_else(|| self.screens.nearest(geometry.x, geometry.y));

        let id = self.registry.insert_front(client)?;
        for tag in self.tags.selected() {
            self.tags.tag_client(tag, id)?;
        }
        self.stack.push_front(&self.registry, id);
        self.client_list_dirty = true;
        self.geometry_dirty = true;
        debug!("admitted 0x{:x} as {:?} ({:?})", window, id, context);
        Ok(id)
    }

    /// Store the batch of properties read at manage time
    pub fn apply_properties(&mut self, id: ClientId, props: ClientProperties) -> WmResult<()> {
        let tag_count = self.tags.len();
        let client = self.registry.try_get_mut(id)?;
        client.size_hints = props.size_hints;
        client.wm_hints = props.wm_hints;
        client.group = props.wm_hints.window_group;
        client.leader = props.leader;
        client.instance = props.instance;
        client.class = props.class;
        client.machine = props.machine;
        client.role = props.role;
        client.pid = props.pid;
        client.icons = props.icons;
        client.name = props.name;
        client.icon_name = props.icon_name;
        client.protocols = props.protocols;
        client.motif_hints = props.motif_hints;
        client.window_type = props.window_type;
        client.startup_id = props.startup_id;
        client.flags |= props.state;
        if props.wm_hints.urgent {
            client.flags.insert(ClientFlags::URGENT);
        }
        if !client.motif_hints.wants_decorations() {
            client.titlebar = Insets::ZERO;
        }

        let fullscreen = client.is_fullscreen();
        let adjusted = apply_size_hints(&client.size_hints, client.geometry, &client.insets(), fullscreen);
        client.geometry = adjusted;

        if let Err(e) = transients::set_transient_for(&mut self.registry, id, props.transient_for) {
            debug!("transient relation of {:?} dropped: {}", id, e);
        }
        self.set_strut(id, props.strut)?;

        match props.desktop.map(Desktop::from_u32) {
            Some(Desktop::All) => {
                if let Some(c) = self.registry.get_mut(id) {
                    c.flags.insert(ClientFlags::STICKY);
                }
            }
            Some(Desktop::Index(index)) if index < tag_count => self.tags.set_client_tag(index, id)?,
            Some(Desktop::Index(index)) => debug!("ignoring desktop {} of {:?}", index, id),
            None => {}
        }

        if fullscreen {
            self.enter_fullscreen_geometry(id)?;
        }
        self.stack.mark_dirty();
        self.geometry_dirty = true;
        Ok(())
    }

    /// Last half of manage: bind waiting transients, complete a startup
    /// sequence and announce the client.
    pub fn finish_manage(&mut self, id: ClientId) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        let context = match client.state {
            ClientState::Managing(context) => context,
            state => {
                warn!("finish_manage on {:?} in state {:?}", id, state);
                return Ok(());
            }
        };
        client.state = ClientState::Managed;
        let window = client.window;
        let startup_id = client.startup_id.clone();
        let class = client.class.clone();
        let instance = client.instance.clone();

        transients::bind_waiting(&mut self.registry, id);
        // Owner links may have changed the stacking of this client's group.
        self.stack.push_front(&self.registry, id);

        if let Some(sequence) = self.startup.complete_for(startup_id.as_deref(), &class, &instance) {
            info!("startup sequence {} completed by 0x{:x}", sequence.id, window);
            self.emit(Signal::StartupCompleted {
                id: sequence.id,
                client: id,
            });
        }

        info!("managed 0x{:x} ({}) as {:?}", window, class, id);
        self.emit(Signal::Manage { client: id, context });
        self.emit(Signal::ListChanged);
        self.focus.mark_needs_update();
        Ok(())
    }

    // ---- unmanage ----

    /// Remove a client from every structure. The returned `Client` is the
    /// caller's to restore on the server.
    pub fn forget(&mut self, id: ClientId, reason: UnmanageReason) -> WmResult<Client> {
        self.registry.try_get_mut(id)?.state = ClientState::Unmanaging;

        transients::clear_references_to(&mut self.registry, id);
        if self.focus.is_focused(id) {
            self.unfocus();
        }
        self.focus.mark_needs_update();
        self.stack.remove(id);
        self.tags.remove_client(id);
        self.emit(Signal::Unmanage { client: id, reason });

        let client = self.registry.remove(id)?;
        if client.frame != client.window {
            self.deferred_destroy.push(client.frame);
        }
        self.deferred_destroy.extend(client.nofocus_window);
        if !client.strut.is_empty() {
            self.workarea_dirty = true;
        }
        self.client_list_dirty = true;
        self.desktops_dirty = true;
        self.emit(Signal::ListChanged);
        info!("unmanaged 0x{:x} ({:?})", client.window, reason);
        Ok(client)
    }

    // ---- geometry ----

    /// `request::geometry` followed by size hints. Returns whether the
    /// geometry changed.
    pub fn request_geometry(&mut self, id: ClientId, proposed: Geometry, context: GeometryContext) -> WmResult<bool> {
        self.registry.try_get(id)?;
        let geometry = match self.hooks().request_geometry(id, proposed, context) {
            Verdict::Deny => {
                debug!("geometry request for {:?} denied", id);
                return Ok(false);
            }
            Verdict::Replace(geometry) => geometry,
            Verdict::Default => proposed,
        };
        let client = self.registry.try_get(id)?;
        let geometry = apply_size_hints(&client.size_hints, geometry, &client.insets(), client.is_fullscreen());
        self.apply_geometry(id, geometry)
    }

    /// Store a resolved geometry and emit the matching notifications
    fn apply_geometry(&mut self, id: ClientId, geometry: Geometry) -> WmResult<bool> {
        let client = self.registry.try_get_mut(id)?;
        let old = client.geometry;
        if old == geometry {
            return Ok(false);
        }
        client.geometry = geometry;
        self.geometry_dirty = true;

        if let Some(screen) = self.screens.screen_at(geometry.x, geometry.y) {
            if let Some(c) = self.registry.get_mut(id) {
                c.screen = Some(screen);
            }
        }

        self.emit_property(id, ClientProperty::Geometry);
        if old.x != geometry.x {
            self.emit_property(id, ClientProperty::X);
        }
        if old.y != geometry.y {
            self.emit_property(id, ClientProperty::Y);
        }
        if old.width != geometry.width {
            self.emit_property(id, ClientProperty::Width);
        }
        if old.height != geometry.height {
            self.emit_property(id, ClientProperty::Height);
        }
        Ok(true)
    }

    /// Change the border, moving the frame so its gravity point stays put
    pub fn set_border_width(&mut self, id: ClientId, width: u32) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        if client.border_width == width {
            return Ok(());
        }
        let (dx, dy) = border_change(client.size_hints.gravity(), client.border_width, width);
        client.border_width = width;
        client.geometry.x += dx;
        client.geometry.y += dy;
        self.geometry_dirty = true;
        self.emit_property(id, ClientProperty::BorderWidth);
        if (dx, dy) != (0, 0) {
            self.emit_property(id, ClientProperty::Geometry);
        }
        Ok(())
    }

    /// Change decoration insets. The inner window keeps its size; the frame
    /// grows or shrinks around it according to gravity.
    pub fn set_titlebar(&mut self, id: ClientId, insets: Insets) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        let old = client.titlebar;
        if old == insets {
            return Ok(());
        }
        client.titlebar = insets;
        if client.is_fullscreen() {
            return Ok(());
        }
        let before = (
            insets.left as i32 - old.left as i32,
            insets.top as i32 - old.top as i32,
        );
        let after = (
            insets.right as i32 - old.right as i32,
            insets.bottom as i32 - old.bottom as i32,
        );
        let (dx, dy) = translate_for_gravity(client.size_hints.gravity(), before, after);
        let g = client.geometry;
        let geometry = Geometry::new(
            g.x + dx,
            g.y + dy,
            (g.width as i32 + before.0 + after.0).max(1) as u32,
            (g.height as i32 + before.1 + after.1).max(1) as u32,
        );
        self.apply_geometry(id, geometry)?;
        self.geometry_dirty = true;
        Ok(())
    }

    /// ConfigureRequest from a managed client. Sizes in the request are of
    /// the client window, positions of its outer corner; both are converted
    /// to frame terms before going through `request::geometry`.
    pub fn configure_request(&mut self, id: ClientId, changes: ConfigureChanges) -> WmResult<()> {
        if let Some(width) = changes.border_width {
            self.set_border_width(id, width)?;
        }
        let client = self.registry.try_get_mut(id)?;
        client.configure_pending = true;
        self.geometry_dirty = true;

        let client = self.registry.try_get(id)?;
        let gravity = client.size_hints.gravity();
        let insets = client.insets();
        let bw = client.border_width as i32;
        let deco_left = bw + insets.left as i32;
        let deco_top = bw + insets.top as i32;
        let deco_right = bw + insets.right as i32;
        let deco_bottom = bw + insets.bottom as i32;

        let mut geometry = client.geometry;
        if let Some(x) = changes.x {
            let (dx, _) = translate_for_gravity(gravity, (deco_left, 0), (deco_right, 0));
            geometry.x = x + dx;
        }
        if let Some(y) = changes.y {
            let (_, dy) = translate_for_gravity(gravity, (0, deco_top), (0, deco_bottom));
            geometry.y = y + dy;
        }
        if let Some(width) = changes.width {
            let old = geometry.width as i32;
            geometry.width = width.saturating_add(insets.horizontal());
            if changes.x.is_none() {
                let (dx, _) = translate_for_gravity(gravity, (0, 0), (geometry.width as i32 - old, 0));
                geometry.x += dx;
            }
        }
        if let Some(height) = changes.height {
            let old = geometry.height as i32;
            geometry.height = height.saturating_add(insets.vertical());
            if changes.y.is_none() {
                let (_, dy) = translate_for_gravity(gravity, (0, 0), (0, geometry.height as i32 - old));
                geometry.y += dy;
            }
        }

        // A fullscreen client keeps its geometry; the pending flag still
        // earns it a synthetic reply.
        if self.registry.try_get(id)?.is_fullscreen() {
            return Ok(());
        }
        self.request_geometry(id, geometry, GeometryContext::ConfigureRequest)?;
        Ok(())
    }

    /// Compare each client's geometry with what the server last saw.
    /// Clears the dirty flag and every pending configure it answers.
    pub fn plan_geometry_refresh(&mut self) -> Vec<(ClientId, GeometryPlan)> {
        if !std::mem::take(&mut self.geometry_dirty) {
            return Vec::new();
        }
        let ids: Vec<ClientId> = self.registry.ids().to_vec();
        let mut plans = Vec::new();
        for id in ids {
            let Some(client) = self.registry.get_mut(id) else {
                continue;
            };
            let insets = client.insets();
            if client.geometry.width <= insets.horizontal() || client.geometry.height <= insets.vertical() {
                warn!(
                    "0x{:x}: frame {}x{} smaller than decorations {:?}, clamping",
                    client.window, client.geometry.width, client.geometry.height, insets
                );
                client.geometry.width = client.geometry.width.max(insets.horizontal() + 1);
                client.geometry.height = client.geometry.height.max(insets.vertical() + 1);
            }
            let frame = client.geometry;
            let inner = client.inner_geometry();

            if client.applied_frame == Some(frame) && client.applied_inner == Some(inner) {
                if std::mem::take(&mut client.configure_pending) {
                    plans.push((id, GeometryPlan::SyntheticOnly));
                }
                continue;
            }
            let resized = client.applied_inner.map_or(true, |old| (old.width, old.height) != (inner.width, inner.height));
            let moved = client.applied_frame.map_or(false, |old| (old.x, old.y) != (frame.x, frame.y));
            client.applied_frame = Some(frame);
            client.applied_inner = Some(inner);
            client.configure_pending = false;
            plans.push((
                id,
                GeometryPlan::Configure {
                    frame,
                    inner,
                    synthetic: moved && !resized,
                },
            ));
        }
        plans
    }

    // ---- state changes ----

    fn enter_fullscreen_geometry(&mut self, id: ClientId) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        if client.saved_geometry.is_none() {
            client.saved_geometry = Some(client.geometry);
        }
        let screen = client.screen;
        let area = screen
            .and_then(|s| self.screens.get(s))
            .map_or(self.root_geometry, |s| s.geometry);
        self.request_geometry(id, area, GeometryContext::Fullscreen)?;
        Ok(())
    }

    pub fn set_fullscreen(&mut self, id: ClientId, on: bool) -> WmResult<()> {
        if !self.set_flag(id, ClientFlags::FULLSCREEN, on)? {
            return Ok(());
        }
        if on {
            self.enter_fullscreen_geometry(id)
        } else {
            self.restore_geometry(id)
        }
    }

    /// `flag` is one of the three maximized flags
    pub fn set_maximized(&mut self, id: ClientId, flag: ClientFlags, on: bool) -> WmResult<()> {
        let flag = flag & (ClientFlags::MAXIMIZED | ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT);
        if flag.is_empty() {
            return Ok(());
        }
        let client = self.registry.try_get_mut(id)?;
        let before = client.flags;
        let mut after = before;
        after.set(flag, on);
        if flag == ClientFlags::MAXIMIZED {
            after.set(ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT, on);
        }
        let both = after.contains(ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT);
        after.set(ClientFlags::MAXIMIZED, both);
        if before == after {
            return Ok(());
        }
        if client.saved_geometry.is_none() {
            client.saved_geometry = Some(client.geometry);
        }
        client.flags = after;
        let horz = after.contains(ClientFlags::MAXIMIZED_HORZ);
        let vert = after.contains(ClientFlags::MAXIMIZED_VERT);
        let saved = client.saved_geometry.unwrap_or(client.geometry);
        let bw2 = client.border_width * 2;
        let screen = client.screen;
        if !horz && !vert && !client.is_fullscreen() {
            client.saved_geometry = None;
        }
        self.stack.mark_dirty();
        self.emit_property(id, ClientProperty::State(before ^ after));

        let area = screen
            .and_then(|s| self.screens.get(s))
            .map_or(self.root_geometry, |s| s.workarea);
        let mut geometry = saved;
        if horz {
            geometry.x = area.x;
            geometry.width = area.width.saturating_sub(bw2).max(1);
        }
        if vert {
            geometry.y = area.y;
            geometry.height = area.height.saturating_sub(bw2).max(1);
        }
        self.request_geometry(id, geometry, GeometryContext::Other)?;
        Ok(())
    }

    fn restore_geometry(&mut self, id: ClientId) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        let constrained = client.flags.intersects(ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT);
        let Some(saved) = (if constrained { client.saved_geometry } else { client.saved_geometry.take() }) else {
            return Ok(());
        };
        self.request_geometry(id, saved, GeometryContext::Fullscreen)?;
        Ok(())
    }

    /// Minimize or restore. A minimized client loses focus.
    pub fn set_minimized(&mut self, id: ClientId, on: bool) -> WmResult<()> {
        if !self.set_flag(id, ClientFlags::MINIMIZED, on)? {
            return Ok(());
        }
        if on && self.focus.is_focused(id) {
            self.unfocus();
        }
        self.client_list_dirty = true;
        Ok(())
    }

    /// `_NET_WM_STATE` client message: apply `action` to each named flag
    pub fn change_state(&mut self, id: ClientId, action: StateAction, flags: &[ClientFlags]) -> WmResult<()> {
        for &flag in flags {
            let current = self.registry.try_get(id)?.flags.contains(flag);
            let wanted = action.apply(current);
            if wanted == current {
                continue;
            }
            if flag == ClientFlags::FULLSCREEN {
                self.set_fullscreen(id, wanted)?;
            } else if flag.intersects(ClientFlags::MAXIMIZED | ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT) {
                self.set_maximized(id, flag, wanted)?;
            } else if flag == ClientFlags::MINIMIZED {
                self.set_minimized(id, wanted)?;
            } else if flag == ClientFlags::URGENT {
                self.set_urgent(id, wanted)?;
            } else if flag == ClientFlags::STICKY {
                if wanted {
                    self.request_tag(id, None)?;
                } else {
                    self.set_flag(id, ClientFlags::STICKY, false)?;
                    if !self.tags.is_tagged(id) {
                        if let Some(tag) = self.tags.selected().first().copied() {
                            self.tags.tag_client(tag, id)?;
                        }
                    }
                }
            } else {
                self.set_flag(id, flag, wanted)?;
            }
        }
        Ok(())
    }

    // ---- property updates ----

    /// Store a refetched property, emitting a notification only on change
    pub fn apply_property_update(&mut self, id: ClientId, update: PropertyUpdate) -> WmResult<()> {
        let client = self.registry.try_get_mut(id)?;
        let mut refit = false;
        let changed = match update {
            PropertyUpdate::SizeHints(hints) => {
                refit = replace(&mut client.size_hints, hints);
                refit.then_some(ClientProperty::SizeHints)
            }
            PropertyUpdate::WmHints(hints) => {
                let old = client.wm_hints;
                client.wm_hints = hints;
                client.group = hints.window_group;
                if old.urgent != hints.urgent {
                    self.set_urgent(id, hints.urgent)?;
                }
                if old.input != hints.input {
                    self.focus.mark_needs_update();
                    Some(ClientProperty::Focusable)
                } else if old.window_group != hints.window_group {
                    Some(ClientProperty::Group)
                } else {
                    None
                }
            }
            PropertyUpdate::TransientFor(owner) => {
                if client.transient_for_window == owner {
                    None
                } else {
                    if let Err(e) = transients::set_transient_for(&mut self.registry, id, owner) {
                        debug!("transient relation of {:?} dropped: {}", id, e);
                    }
                    self.stack.push_front(&self.registry, id);
                    Some(ClientProperty::TransientFor)
                }
            }
            PropertyUpdate::Leader(leader) => replace(&mut client.leader, leader).then_some(ClientProperty::Leader),
            PropertyUpdate::Class { instance, class } => {
                let a = replace(&mut client.instance, instance);
                let b = replace(&mut client.class, class);
                (a || b).then_some(ClientProperty::Class)
            }
            PropertyUpdate::Machine(machine) => replace(&mut client.machine, machine).then_some(ClientProperty::Machine),
            PropertyUpdate::Role(role) => replace(&mut client.role, role).then_some(ClientProperty::Role),
            PropertyUpdate::Pid(pid) => replace(&mut client.pid, pid).then_some(ClientProperty::Pid),
            PropertyUpdate::Icons(icons) => replace(&mut client.icons, icons).then_some(ClientProperty::Icon),
            PropertyUpdate::Name(name) => replace(&mut client.name, name).then_some(ClientProperty::Name),
            PropertyUpdate::IconName(name) => replace(&mut client.icon_name, name).then_some(ClientProperty::IconName),
            PropertyUpdate::Protocols(protocols) => {
                client.protocols = protocols;
                None
            }
            PropertyUpdate::Motif(hints) => {
                client.motif_hints = hints;
                None
            }
            PropertyUpdate::WindowType(window_type) => {
                let changed = replace(&mut client.window_type, window_type);
                if changed {
                    self.stack.mark_dirty();
                    self.focus.mark_needs_update();
                }
                changed.then_some(ClientProperty::Type)
            }
            PropertyUpdate::Strut(strut) => {
                self.set_strut(id, strut)?;
                None
            }
            PropertyUpdate::StartupId(startup_id) => {
                replace(&mut client.startup_id, startup_id).then_some(ClientProperty::StartupId)
            }
            PropertyUpdate::Xembed(_) => None,
        };
        if let Some(property) = changed {
            self.emit_property(id, property);
        }
        if refit {
            // New constraints apply to the current geometry right away.
            let current = self.registry.try_get(id)?.geometry;
            self.request_geometry(id, current, GeometryContext::Other)?;
        }
        Ok(())
    }

    // ---- close ----

    pub fn close_action(&self, id: ClientId) -> WmResult<CloseAction> {
        let client = self.registry.try_get(id)?;
        Ok(if client.protocols.contains(WmProtocols::DELETE_WINDOW) {
            CloseAction::Delete
        } else {
            CloseAction::Kill
        })
    }

    /// Client owning `window` as its own window or frame
    pub fn client_for(&self, window: Window) -> WmResult<ClientId> {
        self.registry.by_any(window).ok_or(WmError::UnknownWindow(window))
    }
}

/// Assign if different, reporting whether it was
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::hints::SizeHints;
    use crate::wm::screen::{Output, ScannedViewport};
    use crate::wm::signals::testing::Recorder;
    use x11rb::protocol::xproto::Gravity;

    fn state() -> (WmState, Recorder) {
        let recorder = Recorder::default();
        let names: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let mut state = WmState::new(Geometry::new(0, 0, 1920, 1080), &names, true, Box::new(recorder.clone()));
        state.scan_screens(&[ScannedViewport::new(
            Geometry::new(0, 0, 1920, 1080),
            vec![Output {
                name: "eDP-1".into(),
                mm_width: 300,
                mm_height: 200,
            }],
        )]);
        recorder.clear();
        (state, recorder)
    }

    fn manage(state: &mut WmState, window: Window, geometry: Geometry, props: ClientProperties) -> ClientId {
        let id = state.admit(window, window + 100, geometry, ManageContext::New).unwrap();
        state.apply_properties(id, props).unwrap();
        state.finish_manage(id).unwrap();
        id
    }

    #[test]
    fn manage_without_hints() {
        let (mut state, rec) = state();
        let other = manage(&mut state, 1, Geometry::new(0, 0, 50, 50), ClientProperties::default());
        rec.clear();
        let id = manage(&mut state, 2, Geometry::new(100, 100, 640, 480), ClientProperties::default());

        let client = state.registry.get(id).unwrap();
        assert_eq!(client.geometry, Geometry::new(100, 100, 640, 480));
        assert_eq!(client.insets(), Insets::ZERO);
        assert_eq!(client.state, ClientState::Managed);
        assert_eq!(state.stack.ids(), &[other, id]);
        assert_eq!(state.registry.ids()[0], id);
        assert_eq!(rec.count(|s| matches!(s, Signal::Manage { client, .. } if *client == id)), 1);

        // a second finish is ignored
        state.finish_manage(id).unwrap();
        assert_eq!(rec.count(|s| matches!(s, Signal::Manage { .. })), 1);
    }

    #[test]
    fn unmanage_leaves_no_trace() {
        let (mut state, rec) = state();
        let owner = manage(&mut state, 1, Geometry::new(0, 0, 100, 100), ClientProperties::default());
        let dialog = manage(
            &mut state,
            2,
            Geometry::new(10, 10, 50, 50),
            ClientProperties {
                transient_for: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(state.registry.get(dialog).unwrap().transient_for, Some(owner));
        state.focus_client(owner).unwrap();
        rec.clear();

        let client = state.forget(owner, UnmanageReason::Destroyed).unwrap();
        assert_eq!(client.window, 1);
        assert!(!state.registry.contains(owner));
        assert!(!state.stack.contains(owner));
        assert!(!state.tags.is_tagged(owner));
        assert_eq!(state.registry.get(dialog).unwrap().transient_for, None);
        assert_eq!(state.focus.focused(), None);
        assert_eq!(state.take_deferred_destroy(), vec![101]);

        let signals = rec.signals.borrow();
        let unfocus = signals.iter().position(|s| *s == Signal::Unfocus(owner)).unwrap();
        let unmanage = signals
            .iter()
            .position(|s| matches!(s, Signal::Unmanage { client, .. } if *client == owner))
            .unwrap();
        assert!(unfocus < unmanage);
        drop(signals);

        assert!(matches!(state.forget(owner, UnmanageReason::User), Err(WmError::StaleClient(id)) if id == owner));
    }

    #[test]
    fn startup_desktop_and_sticky_are_honoured() {
        let (mut state, _) = state();
        let id = manage(
            &mut state,
            1,
            Geometry::new(0, 0, 10, 10),
            ClientProperties {
                desktop: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(state.tags.client_tags(id), vec![1]);
        let sticky = manage(
            &mut state,
            2,
            Geometry::new(0, 0, 10, 10),
            ClientProperties {
                desktop: Some(0xFFFF_FFFF),
                ..Default::default()
            },
        );
        assert!(state.registry.get(sticky).unwrap().is_sticky());
    }

    #[test]
    fn denied_geometry_request_is_obeyed() {
        let (mut state, rec) = state();
        let id = manage(&mut state, 1, Geometry::new(0, 0, 100, 100), ClientProperties::default());
        *rec.geometry.borrow_mut() = Some(Verdict::Deny);
        assert!(!state
            .request_geometry(id, Geometry::new(5, 5, 200, 200), GeometryContext::Other)
            .unwrap());
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(0, 0, 100, 100));

        *rec.geometry.borrow_mut() = Some(Verdict::Replace(Geometry::new(1, 2, 30, 40)));
        rec.clear();
        assert!(state
            .request_geometry(id, Geometry::new(5, 5, 200, 200), GeometryContext::Other)
            .unwrap());
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(1, 2, 30, 40));
        assert_eq!(
            rec.count(|s| matches!(s, Signal::PropertyChanged { property: ClientProperty::Width, .. })),
            1
        );
    }

    #[test]
    fn unchanged_configure_request_gets_synthetic_reply() {
        let (mut state, _) = state();
        let id = manage(&mut state, 1, Geometry::new(10, 10, 100, 100), ClientProperties::default());
        let plans = state.plan_geometry_refresh();
        assert!(matches!(plans[..], [(p, GeometryPlan::Configure { synthetic: false, .. })] if p == id));
        assert!(state.plan_geometry_refresh().is_empty());

        state
            .configure_request(
                id,
                ConfigureChanges {
                    width: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(state.plan_geometry_refresh(), vec![(id, GeometryPlan::SyntheticOnly)]);
        assert!(!state.registry.get(id).unwrap().configure_pending);

        state
            .configure_request(
                id,
                ConfigureChanges {
                    x: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();
        match state.plan_geometry_refresh()[..] {
            [(_, GeometryPlan::Configure { frame, synthetic, .. })] => {
                assert_eq!(frame.x, 40);
                assert!(synthetic);
            }
            ref other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn configure_request_respects_gravity_and_titlebar() {
        let (mut state, _) = state();
        let id = manage(&mut state, 1, Geometry::new(100, 100, 200, 100), ClientProperties::default());
        state.set_titlebar(id, Insets::new(20, 0, 0, 0)).unwrap();
        // inner size kept, frame grew by the titlebar
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(100, 100, 200, 120));

        state.registry.get_mut(id).unwrap().size_hints = SizeHints {
            win_gravity: Some(Gravity::SOUTH_EAST),
            ..Default::default()
        };
        state
            .configure_request(
                id,
                ConfigureChanges {
                    width: Some(100),
                    height: Some(50),
                    ..Default::default()
                },
            )
            .unwrap();
        // bottom right corner stays at (300, 220)
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(200, 150, 100, 70));
    }

    #[test]
    fn changed_size_hints_refit_current_geometry() {
        let (mut state, _) = state();
        let id = manage(&mut state, 1, Geometry::new(10, 10, 400, 300), ClientProperties::default());
        let hints = SizeHints {
            max_size: Some((200, 150)),
            ..Default::default()
        };
        state.apply_property_update(id, PropertyUpdate::SizeHints(hints)).unwrap();
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(10, 10, 200, 150));

        // the same hints again leave the geometry alone
        state.apply_property_update(id, PropertyUpdate::SizeHints(hints)).unwrap();
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(10, 10, 200, 150));
    }

    #[test]
    fn fullscreen_round_trip_restores_geometry() {
        let (mut state, _) = state();
        let id = manage(&mut state, 1, Geometry::new(30, 40, 300, 200), ClientProperties::default());
        state.set_fullscreen(id, true).unwrap();
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(0, 0, 1920, 1080));
        state.set_fullscreen(id, false).unwrap();
        let client = state.registry.get(id).unwrap();
        assert_eq!(client.geometry, Geometry::new(30, 40, 300, 200));
        assert_eq!(client.saved_geometry, None);
    }

    #[test]
    fn maximize_uses_workarea() {
        let (mut state, _) = state();
        let panel = manage(&mut state, 1, Geometry::new(0, 0, 1920, 30), ClientProperties::default());
        state
            .set_strut(panel, crate::wm::strut::Strut::from_legacy(&[0, 0, 30, 0]).unwrap())
            .unwrap();
        state.update_workareas();
        let id = manage(&mut state, 2, Geometry::new(30, 40, 300, 200), ClientProperties::default());

        state.change_state(id, StateAction::Add, &[ClientFlags::MAXIMIZED_VERT]).unwrap();
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(30, 30, 300, 1050));
        state.change_state(id, StateAction::Add, &[ClientFlags::MAXIMIZED_HORZ]).unwrap();
        let client = state.registry.get(id).unwrap();
        assert!(client.flags.contains(ClientFlags::MAXIMIZED));
        assert_eq!(client.geometry, Geometry::new(0, 30, 1920, 1050));

        state.change_state(id, StateAction::Toggle, &[ClientFlags::MAXIMIZED]).unwrap();
        assert_eq!(state.registry.get(id).unwrap().geometry, Geometry::new(30, 40, 300, 200));
    }

    #[test]
    fn property_updates_emit_only_on_change() {
        let (mut state, rec) = state();
        let id = manage(&mut state, 1, Geometry::new(0, 0, 10, 10), ClientProperties::default());
        rec.clear();
        state.apply_property_update(id, PropertyUpdate::Name("xterm".into())).unwrap();
        state.apply_property_update(id, PropertyUpdate::Name("xterm".into())).unwrap();
        assert_eq!(
            rec.count(|s| matches!(s, Signal::PropertyChanged { property: ClientProperty::Name, .. })),
            1
        );

        let mut hints = state.registry.get(id).unwrap().wm_hints;
        hints.urgent = true;
        state.apply_property_update(id, PropertyUpdate::WmHints(hints)).unwrap();
        assert!(state.registry.get(id).unwrap().flags.contains(ClientFlags::URGENT));
    }

    #[test]
    fn close_prefers_delete_window() {
        let (mut state, _) = state();
        let id = manage(&mut state, 1, Geometry::new(0, 0, 10, 10), ClientProperties::default());
        assert_eq!(state.close_action(id).unwrap(), CloseAction::Kill);
        state
            .apply_property_update(id, PropertyUpdate::Protocols(WmProtocols::DELETE_WINDOW))
            .unwrap();
        assert_eq!(state.close_action(id).unwrap(), CloseAction::Delete);
    }
}
