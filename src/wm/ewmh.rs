//! EWMH (Extended Window Manager Hints) implementation
//!
//! Atom interning, the state/type tables, client-message decoding, and the
//! writers for root and per-client properties.

use anyhow::Result;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ClientMessageEvent, ConnectionExt as _, EventMask, PropMode, Window};
use x11rb::wrapper::ConnectionExt as _;

use crate::shared::{Geometry, Insets};
use crate::wm::client_flags::{ClientFlags, WindowType, WmProtocols};
use crate::wm::hints;
use crate::wm::tags::ALL_DESKTOPS;

x11rb::atom_manager! {
    /// Every atom the manager uses, interned in one round trip
    pub Atoms: AtomsCookie {
        UTF8_STRING,
        MANAGER,
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_TAKE_FOCUS,
        WM_STATE,
        WM_CHANGE_STATE,
        WM_CLIENT_LEADER,
        WM_WINDOW_ROLE,
        _MOTIF_WM_HINTS,
        _XEMBED,
        _XEMBED_INFO,
        _NET_SUPPORTED,
        _NET_SUPPORTING_WM_CHECK,
        _NET_CLIENT_LIST,
        _NET_CLIENT_LIST_STACKING,
        _NET_ACTIVE_WINDOW,
        _NET_NUMBER_OF_DESKTOPS,
        _NET_CURRENT_DESKTOP,
        _NET_DESKTOP_NAMES,
        _NET_WORKAREA,
        _NET_CLOSE_WINDOW,
        _NET_MOVERESIZE_WINDOW,
        _NET_FRAME_EXTENTS,
        _NET_STARTUP_ID,
        _NET_WM_NAME,
        _NET_WM_ICON_NAME,
        _NET_WM_DESKTOP,
        _NET_WM_PID,
        _NET_WM_ICON,
        _NET_WM_STRUT,
        _NET_WM_STRUT_PARTIAL,
        _NET_WM_STATE,
        _NET_WM_STATE_STICKY,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_BELOW,
        _NET_WM_STATE_MODAL,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_SHADED,
        _NET_WM_STATE_DEMANDS_ATTENTION,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_MENU,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
        _NET_WM_WINDOW_TYPE_POPUP_MENU,
        _NET_WM_WINDOW_TYPE_TOOLTIP,
        _NET_WM_WINDOW_TYPE_NOTIFICATION,
        _NET_WM_WINDOW_TYPE_COMBO,
        _NET_WM_WINDOW_TYPE_DND,
        _NET_WM_WINDOW_TYPE_NORMAL,
    }
}

/// `_NET_WM_STATE` client message action (data[0])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    Remove,
    Add,
    Toggle,
}

impl StateAction {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Remove),
            1 => Some(Self::Add),
            2 => Some(Self::Toggle),
            _ => None,
        }
    }

    /// New value of a flag currently `current`
    pub fn apply(self, current: bool) -> bool {
        match self {
            Self::Remove => false,
            Self::Add => true,
            Self::Toggle => !current,
        }
    }
}

/// `_NET_WM_DESKTOP` / `_NET_CURRENT_DESKTOP` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desktop {
    All,
    Index(usize),
}

impl Desktop {
    pub fn from_u32(value: u32) -> Self {
        if value == ALL_DESKTOPS {
            Self::All
        } else {
            Self::Index(value as usize)
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::All => ALL_DESKTOPS,
            Self::Index(i) => i as u32,
        }
    }
}

/// Bidirectional map between `_NET_WM_STATE_*` atoms and client flags
#[derive(Debug, Clone)]
pub struct StateTable {
    entries: Vec<(Atom, ClientFlags)>,
}

impl StateTable {
    pub fn new(atoms: &Atoms) -> Self {
        Self::from_pairs(vec![
            (atoms._NET_WM_STATE_STICKY, ClientFlags::STICKY),
            (atoms._NET_WM_STATE_SKIP_TASKBAR, ClientFlags::SKIP_TASKBAR),
            (atoms._NET_WM_STATE_SKIP_PAGER, ClientFlags::SKIP_PAGER),
            (atoms._NET_WM_STATE_FULLSCREEN, ClientFlags::FULLSCREEN),
            (atoms._NET_WM_STATE_MAXIMIZED_HORZ, ClientFlags::MAXIMIZED_HORZ),
            (atoms._NET_WM_STATE_MAXIMIZED_VERT, ClientFlags::MAXIMIZED_VERT),
            (atoms._NET_WM_STATE_ABOVE, ClientFlags::ABOVE),
            (atoms._NET_WM_STATE_BELOW, ClientFlags::BELOW),
            (atoms._NET_WM_STATE_MODAL, ClientFlags::MODAL),
            (atoms._NET_WM_STATE_HIDDEN, ClientFlags::MINIMIZED),
            (atoms._NET_WM_STATE_SHADED, ClientFlags::SHADED),
            (atoms._NET_WM_STATE_DEMANDS_ATTENTION, ClientFlags::URGENT),
        ])
    }

    pub fn from_pairs(entries: Vec<(Atom, ClientFlags)>) -> Self {
        Self { entries }
    }

    pub fn flag(&self, atom: Atom) -> Option<ClientFlags> {
        self.entries.iter().find(|(a, _)| *a == atom).map(|(_, f)| *f)
    }

    /// Flags named by a `_NET_WM_STATE` value. Both maximized directions
    /// together also set `MAXIMIZED`.
    pub fn flags(&self, atoms: &[Atom]) -> ClientFlags {
        let mut flags = atoms
            .iter()
            .filter_map(|a| self.flag(*a))
            .fold(ClientFlags::empty(), |acc, f| acc | f);
        if flags.contains(ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT) {
            flags.insert(ClientFlags::MAXIMIZED);
        }
        flags
    }

    /// `_NET_WM_STATE` value for a set of flags
    pub fn atoms(&self, flags: ClientFlags) -> Vec<Atom> {
        let mut flags = flags;
        if flags.contains(ClientFlags::MAXIMIZED) {
            flags.insert(ClientFlags::MAXIMIZED_HORZ | ClientFlags::MAXIMIZED_VERT);
        }
        self.entries
            .iter()
            .filter(|(_, f)| flags.contains(*f))
            .map(|(a, _)| *a)
            .collect()
    }

    pub fn atoms_all(&self) -> impl Iterator<Item = Atom> + '_ {
        self.entries.iter().map(|(a, _)| *a)
    }
}

/// Map from `_NET_WM_WINDOW_TYPE_*` atoms to window types
#[derive(Debug, Clone)]
pub struct TypeTable {
    entries: Vec<(Atom, WindowType)>,
}

impl TypeTable {
    pub fn new(atoms: &Atoms) -> Self {
        Self::from_pairs(vec![
            (atoms._NET_WM_WINDOW_TYPE_DESKTOP, WindowType::Desktop),
            (atoms._NET_WM_WINDOW_TYPE_DOCK, WindowType::Dock),
            (atoms._NET_WM_WINDOW_TYPE_TOOLBAR, WindowType::Toolbar),
            (atoms._NET_WM_WINDOW_TYPE_MENU, WindowType::Menu),
            (atoms._NET_WM_WINDOW_TYPE_UTILITY, WindowType::Utility),
            (atoms._NET_WM_WINDOW_TYPE_SPLASH, WindowType::Splash),
            (atoms._NET_WM_WINDOW_TYPE_DIALOG, WindowType::Dialog),
            (atoms._NET_WM_WINDOW_TYPE_DROPDOWN_MENU, WindowType::DropdownMenu),
            (atoms._NET_WM_WINDOW_TYPE_POPUP_MENU, WindowType::PopupMenu),
            (atoms._NET_WM_WINDOW_TYPE_TOOLTIP, WindowType::Tooltip),
            (atoms._NET_WM_WINDOW_TYPE_NOTIFICATION, WindowType::Notification),
            (atoms._NET_WM_WINDOW_TYPE_COMBO, WindowType::Combo),
            (atoms._NET_WM_WINDOW_TYPE_DND, WindowType::Dnd),
            (atoms._NET_WM_WINDOW_TYPE_NORMAL, WindowType::Normal),
        ])
    }

    pub fn from_pairs(entries: Vec<(Atom, WindowType)>) -> Self {
        Self { entries }
    }

    /// First recognised type in preference order, `Normal` otherwise
    pub fn window_type(&self, atoms: &[Atom]) -> WindowType {
        atoms
            .iter()
            .find_map(|a| self.entries.iter().find(|(t, _)| t == a).map(|(_, w)| *w))
            .unwrap_or_default()
    }

    pub fn atoms_all(&self) -> impl Iterator<Item = Atom> + '_ {
        self.entries.iter().map(|(a, _)| *a)
    }
}

/// The `WM_PROTOCOLS` members the manager acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAtoms {
    pub delete_window: Atom,
    pub take_focus: Atom,
}

impl ProtocolAtoms {
    /// Protocols advertised in a `WM_PROTOCOLS` value
    pub fn protocols(&self, atoms: &[Atom]) -> WmProtocols {
        atoms.iter().fold(WmProtocols::empty(), |acc, a| {
            if *a == self.delete_window {
                acc | WmProtocols::DELETE_WINDOW
            } else if *a == self.take_focus {
                acc | WmProtocols::TAKE_FOCUS
            } else {
                acc
            }
        })
    }
}

impl Atoms {
    pub fn protocol_atoms(&self) -> ProtocolAtoms {
        ProtocolAtoms {
            delete_window: self.WM_DELETE_WINDOW,
            take_focus: self.WM_TAKE_FOCUS,
        }
    }

    /// Set up `_NET_SUPPORTED` and the check window
    pub fn set_supported<C: Connection>(
        &self,
        conn: &C,
        root: Window,
        check_window: Window,
        states: &StateTable,
        types: &TypeTable,
    ) -> Result<()> {
        let mut supported = vec![
            self._NET_SUPPORTED,
            self._NET_SUPPORTING_WM_CHECK,
            self._NET_CLIENT_LIST,
            self._NET_CLIENT_LIST_STACKING,
            self._NET_ACTIVE_WINDOW,
            self._NET_NUMBER_OF_DESKTOPS,
            self._NET_CURRENT_DESKTOP,
            self._NET_DESKTOP_NAMES,
            self._NET_WORKAREA,
            self._NET_CLOSE_WINDOW,
            self._NET_MOVERESIZE_WINDOW,
            self._NET_FRAME_EXTENTS,
            self._NET_STARTUP_ID,
            self._NET_WM_NAME,
            self._NET_WM_ICON_NAME,
            self._NET_WM_DESKTOP,
            self._NET_WM_PID,
            self._NET_WM_ICON,
            self._NET_WM_STRUT,
            self._NET_WM_STRUT_PARTIAL,
            self._NET_WM_STATE,
            self._NET_WM_WINDOW_TYPE,
        ];
        supported.extend(states.atoms_all());
        supported.extend(types.atoms_all());

        conn.change_property32(PropMode::REPLACE, root, self._NET_SUPPORTED, AtomEnum::ATOM, &supported)?;
        for window in [root, check_window] {
            conn.change_property32(
                PropMode::REPLACE,
                window,
                self._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[check_window],
            )?;
        }
        conn.change_property8(PropMode::REPLACE, check_window, self._NET_WM_NAME, self.UTF8_STRING, b"strata")?;
        Ok(())
    }

    /// Remove everything `set_supported` and the refresh pass wrote on the root
    pub fn clear_root<C: Connection>(&self, conn: &C, root: Window) -> Result<()> {
        for atom in [
            self._NET_SUPPORTED,
            self._NET_SUPPORTING_WM_CHECK,
            self._NET_CLIENT_LIST,
            self._NET_CLIENT_LIST_STACKING,
            self._NET_ACTIVE_WINDOW,
        ] {
            conn.delete_property(root, atom)?;
        }
        Ok(())
    }

    pub fn set_client_list<C: Connection>(&self, conn: &C, root: Window, windows: &[Window]) -> Result<()> {
        conn.change_property32(PropMode::REPLACE, root, self._NET_CLIENT_LIST, AtomEnum::WINDOW, windows)?;
        Ok(())
    }

    pub fn set_client_list_stacking<C: Connection>(&self, conn: &C, root: Window, windows: &[Window]) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self._NET_CLIENT_LIST_STACKING,
            AtomEnum::WINDOW,
            windows,
        )?;
        Ok(())
    }

    /// Update _NET_ACTIVE_WINDOW (None writes 0)
    pub fn set_active_window<C: Connection>(&self, conn: &C, root: Window, window: Option<Window>) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self._NET_ACTIVE_WINDOW,
            AtomEnum::WINDOW,
            &[window.unwrap_or(x11rb::NONE)],
        )?;
        Ok(())
    }

    pub fn set_desktops<C: Connection>(&self, conn: &C, root: Window, names: &[&str], current: u32) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            root,
            self._NET_NUMBER_OF_DESKTOPS,
            AtomEnum::CARDINAL,
            &[names.len() as u32],
        )?;
        conn.change_property32(PropMode::REPLACE, root, self._NET_CURRENT_DESKTOP, AtomEnum::CARDINAL, &[current])?;
        conn.change_property8(
            PropMode::REPLACE,
            root,
            self._NET_DESKTOP_NAMES,
            self.UTF8_STRING,
            &encode_utf8_list(names),
        )?;
        Ok(())
    }

    /// `_NET_WORKAREA`: one rectangle per desktop
    pub fn set_workarea<C: Connection>(&self, conn: &C, root: Window, area: &Geometry, desktops: usize) -> Result<()> {
        let one = [area.x as u32, area.y as u32, area.width, area.height];
        let data: Vec<u32> = one.iter().copied().cycle().take(4 * desktops.max(1)).collect();
        conn.change_property32(PropMode::REPLACE, root, self._NET_WORKAREA, AtomEnum::CARDINAL, &data)?;
        Ok(())
    }

    pub fn set_wm_state_atoms<C: Connection>(&self, conn: &C, window: Window, atoms: &[Atom]) -> Result<()> {
        conn.change_property32(PropMode::REPLACE, window, self._NET_WM_STATE, AtomEnum::ATOM, atoms)?;
        Ok(())
    }

    pub fn set_wm_desktop<C: Connection>(&self, conn: &C, window: Window, desktop: Desktop) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self._NET_WM_DESKTOP,
            AtomEnum::CARDINAL,
            &[desktop.to_u32()],
        )?;
        Ok(())
    }

    /// Update _NET_FRAME_EXTENTS for a window (left, right, top, bottom)
    pub fn set_frame_extents<C: Connection>(&self, conn: &C, window: Window, insets: &Insets, border: u32) -> Result<()> {
        conn.change_property32(
            PropMode::REPLACE,
            window,
            self._NET_FRAME_EXTENTS,
            AtomEnum::CARDINAL,
            &[
                insets.left + border,
                insets.right + border,
                insets.top + border,
                insets.bottom + border,
            ],
        )?;
        Ok(())
    }

    /// ICCCM `WM_STATE`: state and icon window
    pub fn set_wm_state<C: Connection>(&self, conn: &C, window: Window, state: u32) -> Result<()> {
        debug_assert!(matches!(
            state,
            hints::WM_STATE_WITHDRAWN | hints::WM_STATE_NORMAL | hints::WM_STATE_ICONIC
        ));
        conn.change_property32(PropMode::REPLACE, window, self.WM_STATE, self.WM_STATE, &[state, x11rb::NONE])?;
        Ok(())
    }

    /// Send a `WM_PROTOCOLS` client message (`WM_DELETE_WINDOW`, `WM_TAKE_FOCUS`)
    pub fn send_protocol<C: Connection>(&self, conn: &C, window: Window, protocol: Atom, time: u32) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, self.WM_PROTOCOLS, [protocol, time, 0, 0, 0]);
        if let Err(e) = conn.send_event(false, window, EventMask::NO_EVENT, event) {
            debug!("failed to send protocol message to 0x{:x}: {}", window, e);
        }
        Ok(())
    }
}

/// NUL-terminated UTF-8 strings, as `_NET_DESKTOP_NAMES` wants them
pub fn encode_utf8_list(names: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

/// Decoded `_NET_WM_STATE` request: the action and up to two state atoms
pub fn decode_state_request(data: [u32; 5]) -> Option<(StateAction, Vec<Atom>)> {
    let action = StateAction::from_u32(data[0])?;
    let atoms = [data[1], data[2]].into_iter().filter(|a| *a != x11rb::NONE).collect();
    Some((action, atoms))
}

/// `_NET_MOVERESIZE_WINDOW` data: gravity and flags in data[0], then x, y, w, h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveResize {
    pub gravity: Option<u8>,
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MoveResize {
    pub fn decode(data: [u32; 5]) -> Self {
        let flags = data[0];
        let gravity = (flags & 0xff) as u8;
        let has = |bit: u32| flags & (1 << bit) != 0;
        Self {
            gravity: (gravity != 0).then_some(gravity),
            x: has(8).then_some(data[1] as i32),
            y: has(9).then_some(data[2] as i32),
            width: has(10).then_some(data[3]),
            height: has(11).then_some(data[4]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> StateTable {
        StateTable::from_pairs(vec![
            (10, ClientFlags::STICKY),
            (11, ClientFlags::FULLSCREEN),
            (12, ClientFlags::MAXIMIZED_HORZ),
            (13, ClientFlags::MAXIMIZED_VERT),
            (14, ClientFlags::URGENT),
        ])
    }

    #[test]
    fn state_atoms_map_both_ways() {
        let table = states();
        assert_eq!(table.flag(11), Some(ClientFlags::FULLSCREEN));
        assert_eq!(table.flag(99), None);
        let flags = table.flags(&[10, 12, 13, 99]);
        assert!(flags.contains(ClientFlags::STICKY | ClientFlags::MAXIMIZED));
        assert_eq!(table.atoms(ClientFlags::MAXIMIZED), vec![12, 13]);
        assert_eq!(table.atoms(ClientFlags::URGENT | ClientFlags::STICKY), vec![10, 14]);
    }

    #[test]
    fn state_request_layout() {
        let (action, atoms) = decode_state_request([2, 11, 0, 1, 0]).unwrap();
        assert_eq!(action, StateAction::Toggle);
        assert_eq!(atoms, vec![11]);
        assert!(action.apply(false));
        assert!(!action.apply(true));
        assert!(StateAction::Add.apply(true));
        assert!(!StateAction::Remove.apply(true));
        assert!(decode_state_request([3, 11, 0, 0, 0]).is_none());
    }

    #[test]
    fn all_desktops_sentinel() {
        assert_eq!(Desktop::from_u32(0xFFFF_FFFF), Desktop::All);
        assert_eq!(Desktop::from_u32(3), Desktop::Index(3));
        assert_eq!(Desktop::All.to_u32(), 0xFFFF_FFFF);
    }

    #[test]
    fn window_type_takes_first_known() {
        let table = TypeTable::from_pairs(vec![(1, WindowType::Dialog), (2, WindowType::Normal)]);
        assert_eq!(table.window_type(&[77, 1, 2]), WindowType::Dialog);
        assert_eq!(table.window_type(&[77]), WindowType::Normal);
    }

    #[test]
    fn moveresize_flags() {
        let mr = MoveResize::decode([(1 << 8) | (1 << 11) | 5, 40, 50, 60, 70]);
        assert_eq!(mr.gravity, Some(5));
        assert_eq!(mr.x, Some(40));
        assert_eq!(mr.y, None);
        assert_eq!(mr.width, None);
        assert_eq!(mr.height, Some(70));
    }

    #[test]
    fn desktop_names_are_nul_terminated() {
        assert_eq!(encode_utf8_list(&["a", "bc"]), b"a\0bc\0".to_vec());
    }
}
