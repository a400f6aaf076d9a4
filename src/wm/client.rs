use x11rb::protocol::xproto::Window;

use crate::shared::{Geometry, Insets};
use crate::wm::client_flags::{ClientFlags, WindowType, WmProtocols};
use crate::wm::hints::{MotifHints, SizeHints, WmHints};
use crate::wm::screen::ScreenId;
use crate::wm::signals::ManageContext;
use crate::wm::strut::Strut;

slotmap::new_key_type! {
    /// Handle to a managed client. Stays valid as a key after unmanage but
    /// no longer resolves.
    pub struct ClientId;
}

/// Where a client is in its lifecycle.
///
/// Unmanaged and Destroyed have no representation: before `manage` there is
/// no `Client`, and after `unmanage` the handle no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Properties are being read; no manage notification yet
    Managing(ManageContext),
    Managed,
    Unmanaging,
}

/// One `_NET_WM_ICON` entry, ARGB pixels row by row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub width: u32,
    pub height: u32,
    pub argb: Vec<u32>,
}

/// Window Manager client state
/// Represents a window being managed by the WM
#[derive(Debug)]
pub struct Client {
    /// The application's own window
    pub window: Window,

    /// Frame window we reparented `window` into
    pub frame: Window,

    pub state: ClientState,

    /// Frame geometry, border excluded
    pub geometry: Geometry,

    pub border_width: u32,

    /// Decoration sizes per edge
    pub titlebar: Insets,

    pub size_hints: SizeHints,
    pub wm_hints: WmHints,
    pub motif_hints: MotifHints,
    pub protocols: WmProtocols,

    pub name: String,
    pub icon_name: String,
    pub class: String,
    pub instance: String,
    pub role: String,
    pub machine: String,
    pub startup_id: Option<String>,
    pub pid: Option<u32>,

    pub flags: ClientFlags,

    /// Explicit override of the focusable heuristic
    pub focusable: Option<bool>,

    pub window_type: WindowType,
    pub icons: Vec<Icon>,

    /// Resolved owner; never part of a cycle
    pub transient_for: Option<ClientId>,

    /// Raw `WM_TRANSIENT_FOR`, kept so the relation can bind once the owner is managed
    pub transient_for_window: Option<Window>,

    pub leader: Option<Window>,
    pub group: Option<Window>,

    pub screen: Option<ScreenId>,

    pub strut: Strut,

    /// Lazily created input-only window used as focus target when the
    /// client does not accept input itself
    pub nofocus_window: Option<Window>,

    /// A ConfigureRequest arrived and has not been answered yet
    pub configure_pending: bool,

    /// Geometries last sent to the server, frame then inner
    pub applied_frame: Option<Geometry>,
    pub applied_inner: Option<Geometry>,

    /// Geometry to restore when leaving fullscreen or maximized state
    pub saved_geometry: Option<Geometry>,
    /// Whether the frame is currently mapped on the server
    pub mapped: bool,
}

impl Client {
    pub fn new(window: Window, frame: Window, geometry: Geometry, border_width: u32) -> Self {
        Self {
            window,
            frame,
            state: ClientState::Managing(ManageContext::New),
            geometry,
            border_width,
            titlebar: Insets::ZERO,
            size_hints: SizeHints::default(),
            wm_hints: WmHints::default(),
            motif_hints: MotifHints::default(),
            protocols: WmProtocols::empty(),
            name: String::new(),
            icon_name: String::new(),
            class: String::new(),
            instance: String::new(),
            role: String::new(),
            machine: String::new(),
            startup_id: None,
            pid: None,
            flags: ClientFlags::empty(),
            focusable: None,
            window_type: WindowType::Normal,
            icons: Vec::new(),
            transient_for: None,
            transient_for_window: None,
            leader: None,
            group: None,
            screen: None,
            strut: Strut::default(),
            nofocus_window: None,
            configure_pending: false,
            applied_frame: None,
            applied_inner: None,
            saved_geometry: None,
            mapped: false,
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.flags.contains(ClientFlags::FULLSCREEN)
    }

    pub fn is_sticky(&self) -> bool {
        self.flags.contains(ClientFlags::STICKY)
    }

    /// Decoration insets in effect (none while fullscreen)
    pub fn insets(&self) -> Insets {
        if self.is_fullscreen() {
            Insets::ZERO
        } else {
            self.titlebar
        }
    }

    /// Geometry of the application window relative to its frame
    pub fn inner_geometry(&self) -> Geometry {
        let insets = self.insets();
        Geometry {
            x: insets.left as i32,
            y: insets.top as i32,
            width: self.geometry.width.saturating_sub(insets.horizontal()),
            height: self.geometry.height.saturating_sub(insets.vertical()),
        }
    }

    /// Whether the client's own window can take input focus.
    ///
    /// Docks and desktops never do unless explicitly overridden. Otherwise
    /// `WM_HINTS.input` decides, and a missing hint means yes.
    pub fn is_focusable(&self) -> bool {
        if let Some(focusable) = self.focusable {
            return focusable;
        }
        if matches!(self.window_type, WindowType::Dock | WindowType::Desktop) {
            return false;
        }
        self.wm_hints.input.unwrap_or(true)
    }

    /// ICCCM "no input" models still want WM_TAKE_FOCUS
    pub fn wants_take_focus(&self) -> bool {
        self.protocols.contains(WmProtocols::TAKE_FOCUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_geometry_excludes_titlebar() {
        let mut c = Client::new(1, 2, Geometry::new(10, 10, 200, 120), 0);
        c.titlebar = Insets::new(20, 1, 1, 1);
        assert_eq!(c.inner_geometry(), Geometry::new(1, 20, 198, 99));
        c.flags.insert(ClientFlags::FULLSCREEN);
        assert_eq!(c.inner_geometry(), Geometry::new(0, 0, 200, 120));
    }

    #[test]
    fn focusable_follows_input_hint_and_override() {
        let mut c = Client::new(1, 2, Geometry::default(), 0);
        assert!(c.is_focusable());
        c.wm_hints.input = Some(false);
        assert!(!c.is_focusable());
        c.focusable = Some(true);
        assert!(c.is_focusable());
        c.focusable = None;
        c.wm_hints.input = None;
        c.window_type = WindowType::Dock;
        assert!(!c.is_focusable());
    }
}
