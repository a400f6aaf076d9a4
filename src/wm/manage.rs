//! Manage and unmanage on the server side.
//!
//! Framing, save-set bookkeeping and the ICCCM withdraw dance. The model
//! half lives in `lifecycle`.

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask, MapState, SetMode,
    Window, WindowClass,
};

use crate::shared::Geometry;
use crate::wm::client::ClientId;
use crate::wm::client_flags::WindowType;
use crate::wm::ewmh::Desktop;
use crate::wm::hints::{WM_STATE_ICONIC, WM_STATE_WITHDRAWN};
use crate::wm::properties::{OverlayCookies, PropertyCookies};
use crate::wm::signals::{ManageContext, UnmanageReason};
use crate::wm::stacking::Overlay;
use crate::wm::WindowManager;

/// Events selected on every frame
fn frame_events() -> EventMask {
    EventMask::SUBSTRUCTURE_REDIRECT
        | EventMask::SUBSTRUCTURE_NOTIFY
        | EventMask::ENTER_WINDOW
        | EventMask::LEAVE_WINDOW
        | EventMask::FOCUS_CHANGE
}

/// Events selected on every client window
fn client_events() -> EventMask {
    EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY | EventMask::FOCUS_CHANGE
}

impl WindowManager {
    /// Start managing a window that asked to be mapped
    pub fn manage(&mut self, window: Window, context: ManageContext) -> Result<()> {
        self.manage_window(window, context, false)
    }

    fn manage_window(&mut self, window: Window, context: ManageContext, iconic: bool) -> Result<()> {
        if window == self.display.check_window || self.state.registry.by_any(window).is_some() {
            return Ok(());
        }
        debug!("WM: Managing window 0x{:x}", window);

        // Everything goes out before the first reply is awaited.
        let conn = &self.display.conn;
        let attrs_cookie = conn.get_window_attributes(window)?;
        let geom_cookie = conn.get_geometry(window)?;
        let prop_cookies = PropertyCookies::request(conn, &self.display.atoms, window)?;
        let (attrs, geom) = match (attrs_cookie.reply(), geom_cookie.reply()) {
            (Ok(attrs), Ok(geom)) => (attrs, geom),
            (Err(e), _) | (_, Err(e)) => {
                debug!("WM: window 0x{:x} disappeared before manage: {}", window, e);
                return Ok(());
            }
        };
        let props = prop_cookies.collect(&self.display.atoms, &self.display.states, &self.display.types);
        if attrs.override_redirect {
            debug!("WM: window 0x{:x} is override-redirect, skipping", window);
            return Ok(());
        }

        let insets = self.state.titlebar;
        let frame_geometry = Geometry::new(
            geom.x as i32,
            geom.y as i32,
            geom.width as u32 + insets.horizontal(),
            geom.height as u32 + insets.vertical(),
        );
        let frame = conn.generate_id()?;

        self.begin_suppress()?;
        let conn = &self.display.conn;
        conn.create_window(
            self.display.root_depth,
            frame,
            self.display.root,
            frame_geometry.x as i16,
            frame_geometry.y as i16,
            frame_geometry.width.max(1) as u16,
            frame_geometry.height.max(1) as u16,
            self.state.border_width as u16,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().override_redirect(1).event_mask(frame_events()),
        )?;
        conn.change_save_set(SetMode::INSERT, window)?;
        conn.configure_window(window, &ConfigureWindowAux::new().border_width(0))?;
        let reparent = conn.reparent_window(window, frame, insets.left as i16, insets.top as i16)?;
        // Selected after the reparent so its implicit unmap is not reported
        // on the window itself.
        conn.change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(client_events()))?;
        let reparented = reparent.check();
        self.end_suppress()?;

        let id = match self.state.admit(window, frame, frame_geometry, context) {
            Ok(id) => id,
            Err(e) => {
                self.display.conn.destroy_window(frame)?;
                return Err(e.into());
            }
        };
        if let Err(e) = reparented {
            // The window vanished between the map request and the reparent.
            debug!("WM: reparent of 0x{:x} failed: {}", window, e);
            return self.unmanage(id, UnmanageReason::Failed);
        }

        let initially_iconic = iconic || props.wm_hints.initial_state == Some(WM_STATE_ICONIC);
        let finished = self
            .state
            .apply_properties(id, props)
            .and_then(|_| self.state.finish_manage(id))
            .and_then(|_| if initially_iconic { self.state.set_minimized(id, true) } else { Ok(()) });
        if let Err(e) = finished {
            warn!("WM: manage of 0x{:x} failed: {}", window, e);
            return self.unmanage(id, UnmanageReason::Failed);
        }

        let client = self.state.registry.try_get(id)?;
        let atoms = &self.display.atoms;
        atoms.set_frame_extents(&self.display.conn, window, &client.insets(), client.border_width)?;
        atoms.set_wm_desktop(&self.display.conn, window, self.desktop_of(id))?;
        self.display.conn.map_window(window)?;
        Ok(())
    }

    /// Give a window back to the root
    pub fn unmanage(&mut self, id: ClientId, reason: UnmanageReason) -> Result<()> {
        let client = self.state.forget(id, reason)?;
        self.published.remove(&client.window);
        if reason == UnmanageReason::Destroyed {
            return Ok(());
        }

        self.begin_suppress()?;
        let conn = &self.display.conn;
        let atoms = &self.display.atoms;
        if !self.shutting_down {
            atoms.set_wm_state(conn, client.window, WM_STATE_WITHDRAWN)?;
            conn.delete_property(client.window, atoms._NET_WM_DESKTOP)?;
            conn.delete_property(client.window, atoms._NET_WM_STATE)?;
        }
        if reason != UnmanageReason::Reparented {
            let inner = client.geometry.shrink(&client.insets());
            conn.reparent_window(client.window, self.display.root, inner.x as i16, inner.y as i16)?;
            if self.shutting_down {
                conn.map_window(client.window)?;
            }
        }
        if !self.shutting_down {
            conn.change_save_set(SetMode::DELETE, client.window)?;
        }
        self.end_suppress()
    }

    /// Adopt the windows that were already mapped when we started
    pub fn scan_existing(&mut self) -> Result<()> {
        let conn = &self.display.conn;
        let atoms = &self.display.atoms;
        let tree = conn.query_tree(self.display.root)?.reply()?;
        let cookies = tree
            .children
            .iter()
            .map(|&w| {
                Ok((
                    w,
                    conn.get_window_attributes(w)?,
                    conn.get_property(false, w, atoms.WM_STATE, atoms.WM_STATE, 0, 2)?,
                ))
            })
            .collect::<Result<Vec<_>, ConnectionError>>()?;

        let mut adopt = Vec::new();
        let mut overlays = Vec::new();
        for (window, attrs, wm_state) in cookies {
            let Ok(attrs) = attrs.reply() else { continue };
            if window == self.display.check_window {
                continue;
            }
            if attrs.override_redirect {
                if attrs.map_state == MapState::VIEWABLE {
                    overlays.push(window);
                }
                continue;
            }
            let iconic = wm_state
                .reply()
                .ok()
                .and_then(|r| r.value32().and_then(|mut v| v.next()))
                == Some(WM_STATE_ICONIC);
            if attrs.map_state == MapState::VIEWABLE || iconic {
                adopt.push((window, iconic));
            }
        }

        for window in overlays {
            self.track_overlay(window)?;
        }
        info!("WM: adopting {} existing windows", adopt.len());
        for (window, iconic) in adopt {
            if let Err(e) = self.manage_window(window, ManageContext::Startup, iconic) {
                warn!("WM: could not adopt 0x{:x}: {:#}", window, e);
            }
        }
        Ok(())
    }

    /// Stack an override-redirect dock or desktop window and honour its
    /// strut. Anything else that bypasses the manager is left alone.
    pub(crate) fn track_overlay(&mut self, window: Window) -> Result<()> {
        if self.state.is_overlay(window) {
            return Ok(());
        }
        let conn = &self.display.conn;
        let (window_type, strut) = OverlayCookies::request(conn, &self.display.atoms, window)?.collect(&self.display.types);
        let ontop = match window_type {
            WindowType::Dock => true,
            WindowType::Desktop => false,
            _ => return Ok(()),
        };
        // Strut updates arrive as property notifies.
        if let Err(e) = conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE))?
            .check()
        {
            debug!("WM: overlay 0x{:x} vanished: {}", window, e);
            return Ok(());
        }
        self.state.add_overlay(Overlay { window, ontop, strut });
        Ok(())
    }

    /// `_NET_WM_DESKTOP` value for a client
    pub(crate) fn desktop_of(&self, id: ClientId) -> Desktop {
        if self.state.registry.get(id).map_or(false, |c| c.is_sticky()) {
            return Desktop::All;
        }
        match self.state.tags.client_tags(id).first() {
            Some(&index) => Desktop::Index(index),
            None => Desktop::All,
        }
    }

    /// Input-only child of the frame that holds focus for clients that do
    /// not take it themselves. Created on first use.
    pub(crate) fn nofocus_window(&mut self, id: ClientId) -> Result<Window> {
        let client = self.state.registry.try_get(id)?;
        if let Some(window) = client.nofocus_window {
            return Ok(window);
        }
        let frame = client.frame;
        let conn = &self.display.conn;
        let window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            frame,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )?;
        conn.map_window(window)?;
        self.state.registry.try_get_mut(id)?.nofocus_window = Some(window);
        debug!("WM: created nofocus window 0x{:x} for {:?}", window, id);
        Ok(window)
    }
}
