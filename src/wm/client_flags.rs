//! Client Flags
//!
//! Bitfield flags for client state and protocol capabilities.

use bitflags::bitflags;

bitflags! {
    /// Boolean client state, mirrored into `_NET_WM_STATE`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientFlags: u32 {
        const STICKY            = 1 << 0;
        const URGENT            = 1 << 1;
        const HIDDEN            = 1 << 2;
        const MINIMIZED         = 1 << 3;
        const FULLSCREEN        = 1 << 4;
        const MAXIMIZED         = 1 << 5;
        const MAXIMIZED_HORZ    = 1 << 6;
        const MAXIMIZED_VERT    = 1 << 7;
        const ABOVE             = 1 << 8;
        const BELOW             = 1 << 9;
        const ONTOP             = 1 << 10;
        const MODAL             = 1 << 11;
        const SKIP_TASKBAR      = 1 << 12;
        const SKIP_PAGER        = 1 << 13;
        const SHADED            = 1 << 14;
    }
}

bitflags! {
    /// Protocols advertised in `WM_PROTOCOLS`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WmProtocols: u32 {
        const DELETE_WINDOW = 1 << 0;
        const TAKE_FOCUS    = 1 << 1;
        const PING          = 1 << 2;
        const SYNC_REQUEST  = 1 << 3;
    }
}

/// Window type (EWMH `_NET_WM_WINDOW_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    #[default]
    Normal,
    Desktop,
    Dock,
    Dialog,
    Toolbar,
    Menu,
    Utility,
    Splash,
    Notification,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Combo,
    Dnd,
}

/// Which kind of property changed on a client, for `property::*` notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProperty {
    Geometry,
    X,
    Y,
    Width,
    Height,
    BorderWidth,
    Name,
    IconName,
    Class,
    Role,
    Machine,
    Pid,
    StartupId,
    Icon,
    SizeHints,
    TransientFor,
    Group,
    Leader,
    Type,
    Strut,
    Focusable,
    State(ClientFlags),
}
