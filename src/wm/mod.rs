//! Window Manager Module
//!
//! `WmState` holds the model; `WindowManager` owns the connection, feeds
//! events into the model and, once per loop iteration, turns what changed
//! into server requests.

pub mod client;
pub mod client_flags;
pub mod display;
pub mod event_filter;
pub mod events;
pub mod ewmh;
pub mod focus;
pub mod gravity;
pub mod hints;
pub mod lifecycle;
pub mod manage;
pub mod monitors;
pub mod properties;
pub mod registry;
pub mod screen;
pub mod signals;
pub mod stacking;
pub mod startup;
pub mod state;
pub mod strut;
pub mod tags;
pub mod transients;
pub mod xembed;

use anyhow::Result;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;

use crate::config::Config;
use crate::event_source::{Debounce, X11EventSource};
use crate::shared::{Geometry, Insets};
use crate::wm::client::ClientId;
use crate::wm::client_flags::ClientFlags;
use crate::wm::display::DisplayInfo;
use crate::wm::events::EventIntake;
use crate::wm::ewmh::Desktop;
use crate::wm::focus::FocusTarget;
use crate::wm::hints::{WM_STATE_ICONIC, WM_STATE_NORMAL};
use crate::wm::lifecycle::GeometryPlan;
use crate::wm::properties::{PropertyKind, PropertyUpdate, UpdateCookie};
use crate::wm::signals::{LoggingHooks, UnmanageReason};
use crate::wm::stacking::restack_pairs;
use crate::wm::state::WmState;
use crate::wm::xembed::MapChange;

/// Per-client EWMH properties as last written to the server
#[derive(Debug, Clone, PartialEq)]
struct Published {
    state: Vec<Atom>,
    desktop: Desktop,
    extents: (Insets, u32),
}

pub struct WindowManager {
    pub display: DisplayInfo,
    pub state: WmState,
    intake: EventIntake,
    /// Pending monitor rescan
    rescan: Debounce,
    /// PropertyNotify refetches queued during the current drain
    pending_properties: Vec<(Window, PropertyKind)>,
    running: bool,
    shutting_down: bool,
    /// Newest server timestamp seen on an event
    last_time: Timestamp,
    published: HashMap<Window, Published>,
    /// Where focus goes when no client can take it
    fallback_focus: Window,
    active_window: Option<Option<Window>>,
}

impl WindowManager {
    /// Build the model from the configuration and the initial monitor scan
    pub fn new(display: DisplayInfo, config: &Config) -> Self {
        let mut state = WmState::new(
            display.root_geometry,
            &config.tags.names,
            config.screens.auto_scan,
            Box::new(LoggingHooks),
        );
        state.border_width = config.clients.border_width;
        state.titlebar = config.clients.titlebar.into();

        let (source, found) = monitors::scan(&display.conn, display.root, display.root_geometry, &display.extensions);
        info!("WM: {} viewports from {:?}", found.len(), source);
        state.scan_screens(&found);
        if display.extensions.randr.is_some() {
            match monitors::primary_output(&display.conn, display.root) {
                Ok(Some(output)) => state.set_primary_output(&output),
                Ok(None) => debug!("WM: no primary output"),
                Err(e) => debug!("WM: primary output query failed: {}", e),
            }
        }

        let fallback_focus = if config.focus.fallback_to_root_window {
            display.root
        } else {
            display.check_window
        };

        Self {
            display,
            state,
            intake: EventIntake::new(),
            rescan: Debounce::new(config.screens.refresh_debounce()),
            pending_properties: Vec::new(),
            running: false,
            shutting_down: false,
            last_time: x11rb::CURRENT_TIME,
            published: HashMap::new(),
            fallback_focus,
            active_window: None,
        }
    }

    /// Main loop. `backlog` holds events read while taking over the screen.
    pub fn run(&mut self, source: &mut X11EventSource, backlog: Vec<Event>) -> Result<()> {
        self.running = true;
        for event in backlog {
            self.pump(event, 0);
        }

        while self.running {
            self.drain()?;
            self.refresh()?;
            if !self.running {
                break;
            }
            // Replies read during the refresh may have queued events that
            // the socket will never report as readable again.
            if let Some((event, sequence)) = self.display.conn.poll_for_event_with_sequence()? {
                self.pump(event, sequence);
                continue;
            }
            source.wait(self.rescan.timeout(Instant::now()))?;
        }

        self.shutdown()
    }

    /// Push every change accumulated by the event handlers to the server
    pub fn refresh(&mut self) -> Result<()> {
        self.refetch_properties()?;
        if self.rescan.take_due(Instant::now()) {
            self.rescan_screens();
        }
        if std::mem::take(&mut self.state.workarea_dirty) {
            self.publish_workarea()?;
        }
        self.apply_geometry()?;
        self.apply_visibility()?;
        self.apply_stacking()?;
        self.apply_focus()?;
        self.publish_clients()?;
        self.publish_desktops()?;
        for window in self.state.take_deferred_destroy() {
            trace!("WM: destroying helper 0x{:x}", window);
            self.display.conn.destroy_window(window)?;
        }
        self.display.conn.flush()?;
        Ok(())
    }

    /// Release every client and the screen
    pub fn shutdown(&mut self) -> Result<()> {
        info!("WM: shutting down");
        self.shutting_down = true;
        let ids: Vec<ClientId> = self.state.registry.ids().to_vec();
        for id in ids {
            if let Err(e) = self.unmanage(id, UnmanageReason::User) {
                warn!("WM: unmanage of {:?} during shutdown failed: {:#}", id, e);
            }
        }
        for window in self.state.take_deferred_destroy() {
            self.display.conn.destroy_window(window)?;
        }
        self.display.release()?;
        self.display.conn.flush()?;
        Ok(())
    }

    /// One batch of round trips for every property that changed this drain
    fn refetch_properties(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_properties);
        if pending.is_empty() {
            return Ok(());
        }
        let conn = &self.display.conn;
        let atoms = &self.display.atoms;
        let cookies = pending
            .into_iter()
            .map(|(window, kind)| Ok((window, UpdateCookie::request(conn, atoms, window, kind)?)))
            .collect::<Result<Vec<_>, ConnectionError>>()?;

        let protocols = atoms.protocol_atoms();
        for (window, cookie) in cookies {
            let Some(update) = cookie.collect(&protocols, &self.display.types) else {
                continue;
            };
            match update {
                PropertyUpdate::Xembed(info) => match self.state.embedded.update(window, info) {
                    Some(MapChange::Map) => {
                        conn.map_window(window)?;
                    }
                    Some(MapChange::Unmap) => {
                        conn.unmap_window(window)?;
                    }
                    None => {}
                },
                PropertyUpdate::Strut(strut) if self.state.is_overlay(window) => {
                    self.state.set_overlay_strut(window, strut);
                }
                update => match self.state.registry.by_window(window) {
                    Some(id) => {
                        if let Err(e) = self.state.apply_property_update(id, update) {
                            debug!("WM: property update for 0x{:x} dropped: {}", window, e);
                        }
                    }
                    None => trace!("WM: 0x{:x} went away before its property refetch", window),
                },
            }
        }
        Ok(())
    }

    fn rescan_screens(&mut self) {
        let display = &self.display;
        let (source, found) = monitors::scan(&display.conn, display.root, display.root_geometry, &display.extensions);
        let events = self.state.refresh_screens(&found);
        if display.extensions.randr.is_some() {
            if let Ok(Some(output)) = monitors::primary_output(&display.conn, display.root) {
                self.state.set_primary_output(&output);
            }
        }
        if events.is_empty() {
            debug!("WM: rescan via {:?} found no changes", source);
        } else {
            info!("WM: screen layout changed via {:?}: {:?}", source, events);
            self.state.geometry_dirty = true;
        }
    }

    fn publish_workarea(&mut self) -> Result<()> {
        self.state.update_workareas();
        let area = self
            .state
            .screens
            .primary()
            .and_then(|id| self.state.screens.get(id))
            .map_or(self.state.root_geometry, |s| s.workarea);
        self.display
            .atoms
            .set_workarea(&self.display.conn, self.display.root, &area, self.state.tags.len())
    }

    fn apply_geometry(&mut self) -> Result<()> {
        let plans = self.state.plan_geometry_refresh();
        if plans.is_empty() {
            return Ok(());
        }
        self.begin_suppress()?;
        for (id, plan) in plans {
            let Some(client) = self.state.registry.get(id) else { continue };
            let conn = &self.display.conn;
            match plan {
                GeometryPlan::Configure { frame, inner, synthetic } => {
                    trace!("WM: configuring 0x{:x} to {:?}", client.window, frame);
                    conn.configure_window(
                        client.frame,
                        &ConfigureWindowAux::new()
                            .x(frame.x)
                            .y(frame.y)
                            .width(frame.width)
                            .height(frame.height)
                            .border_width(client.border_width),
                    )?;
                    conn.configure_window(
                        client.window,
                        &ConfigureWindowAux::new()
                            .x(inner.x)
                            .y(inner.y)
                            .width(inner.width)
                            .height(inner.height),
                    )?;
                    if synthetic {
                        let event = synthetic_configure(client.window, &frame, &inner, client.border_width);
                        conn.send_event(false, client.window, EventMask::STRUCTURE_NOTIFY, event)?;
                    }
                }
                GeometryPlan::SyntheticOnly => {
                    let event = synthetic_configure(
                        client.window,
                        &client.geometry,
                        &client.inner_geometry(),
                        client.border_width,
                    );
                    conn.send_event(false, client.window, EventMask::STRUCTURE_NOTIFY, event)?;
                }
            }
        }
        self.end_suppress()
    }

    /// Map frames that became visible, unmap the rest
    fn apply_visibility(&mut self) -> Result<()> {
        let changes: Vec<(ClientId, Window, Window, bool)> = self
            .state
            .registry
            .iter()
            .filter_map(|(id, c)| {
                let visible = self.state.is_visible(id) && !c.flags.intersects(ClientFlags::MINIMIZED | ClientFlags::HIDDEN);
                (visible != c.mapped).then_some((id, c.frame, c.window, visible))
            })
            .collect();
        if changes.is_empty() {
            return Ok(());
        }

        self.begin_suppress()?;
        for (id, frame, window, visible) in changes {
            let conn = &self.display.conn;
            if visible {
                conn.map_window(frame)?;
                self.display.atoms.set_wm_state(conn, window, WM_STATE_NORMAL)?;
            } else {
                conn.unmap_window(frame)?;
                self.display.atoms.set_wm_state(conn, window, WM_STATE_ICONIC)?;
            }
            if let Some(client) = self.state.registry.get_mut(id) {
                client.mapped = visible;
            }
        }
        self.state.focus.mark_needs_update();
        self.end_suppress()
    }

    fn apply_stacking(&mut self) -> Result<()> {
        if !self.state.stack.take_dirty() {
            return Ok(());
        }
        let windows = self.state.stacking_windows();
        self.begin_suppress()?;
        let conn = &self.display.conn;
        for (window, sibling) in restack_pairs(&windows) {
            conn.configure_window(window, &ConfigureWindowAux::new().sibling(sibling).stack_mode(StackMode::ABOVE))?;
        }
        let clients = self.state.stacking_client_windows();
        self.display
            .atoms
            .set_client_list_stacking(conn, self.display.root, &clients)?;
        self.end_suppress()
    }

    fn apply_focus(&mut self) -> Result<()> {
        let Some(plan) = self.state.refresh_focus() else {
            return Ok(());
        };
        let target = match plan.target {
            FocusTarget::Window(window) => window,
            FocusTarget::NoFocusWindow(id) => self.nofocus_window(id)?,
            FocusTarget::Fallback => self.fallback_focus,
        };
        let revert = if target == self.display.root {
            InputFocus::POINTER_ROOT
        } else {
            InputFocus::PARENT
        };
        debug!("WM: focusing 0x{:x} for {:?}", target, plan.client);
        let conn = &self.display.conn;
        conn.set_input_focus(revert, target, self.last_time)?;
        if let Some(window) = plan.take_focus {
            let atoms = &self.display.atoms;
            atoms.send_protocol(conn, window, atoms.WM_TAKE_FOCUS, self.last_time)?;
        }

        let active = plan.client.and_then(|id| self.state.registry.get(id)).map(|c| c.window);
        if self.active_window != Some(active) {
            self.display.atoms.set_active_window(conn, self.display.root, active)?;
            self.active_window = Some(active);
        }
        Ok(())
    }

    /// `_NET_CLIENT_LIST` and the per-client properties that differ from
    /// what was last written
    fn publish_clients(&mut self) -> Result<()> {
        let conn = &self.display.conn;
        let atoms = &self.display.atoms;
        if std::mem::take(&mut self.state.client_list_dirty) {
            // Oldest first
            let windows: Vec<Window> = self
                .state
                .registry
                .ids()
                .iter()
                .rev()
                .filter_map(|&id| self.state.registry.get(id).map(|c| c.window))
                .collect();
            atoms.set_client_list(conn, self.display.root, &windows)?;
        }

        let snapshots: Vec<(Window, Published)> = self
            .state
            .registry
            .iter()
            .map(|(id, c)| {
                (
                    c.window,
                    Published {
                        state: self.display.states.atoms(c.flags),
                        desktop: self.desktop_of(id),
                        extents: (c.insets(), c.border_width),
                    },
                )
            })
            .collect();

        for (window, now) in snapshots {
            let before = self.published.get(&window);
            if before.map(|p| &p.state) != Some(&now.state) {
                atoms.set_wm_state_atoms(conn, window, &now.state)?;
            }
            if before.map(|p| p.desktop) != Some(now.desktop) {
                atoms.set_wm_desktop(conn, window, now.desktop)?;
            }
            if before.map(|p| p.extents) != Some(now.extents) {
                atoms.set_frame_extents(conn, window, &now.extents.0, now.extents.1)?;
            }
            self.published.insert(window, now);
        }
        Ok(())
    }

    fn publish_desktops(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.state.desktops_dirty) {
            return Ok(());
        }
        let current = self.state.tags.selected().first().copied().unwrap_or(0) as u32;
        self.display
            .atoms
            .set_desktops(&self.display.conn, self.display.root, &self.state.tags.names(), current)
    }
}

/// ICCCM 4.1.5: a client that was moved but not resized gets a synthetic
/// ConfigureNotify in root coordinates.
fn synthetic_configure(window: Window, frame: &Geometry, inner: &Geometry, border: u32) -> ConfigureNotifyEvent {
    ConfigureNotifyEvent {
        response_type: CONFIGURE_NOTIFY_EVENT,
        sequence: 0,
        event: window,
        window,
        above_sibling: x11rb::NONE,
        x: (frame.x + border as i32 + inner.x) as i16,
        y: (frame.y + border as i32 + inner.y) as i16,
        width: inner.width as u16,
        height: inner.height as u16,
        border_width: 0,
        override_redirect: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_configure_uses_root_coordinates() {
        let frame = Geometry::new(100, 50, 420, 320);
        let inner = Geometry::new(0, 20, 420, 300);
        let event = synthetic_configure(0x40_0001, &frame, &inner, 2);
        assert_eq!((event.x, event.y), (102, 72));
        assert_eq!((event.width, event.height), (420, 300));
        assert_eq!(event.window, event.event);
        assert_eq!(event.border_width, 0);
    }
}
