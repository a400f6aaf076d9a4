//! XEMBED
//!
//! `_XEMBED_INFO` layout, `_XEMBED` message encoding and the set of
//! windows embedded by the tray collaborator.

use tracing::debug;
use x11rb::protocol::xproto::Window;

pub const XEMBED_VERSION: u32 = 0;

/// `_XEMBED_INFO` flags
pub const XEMBED_MAPPED: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    EmbeddedNotify = 0,
    WindowActivate = 1,
    WindowDeactivate = 2,
    RequestFocus = 3,
    FocusIn = 4,
    FocusOut = 5,
    FocusNext = 6,
    FocusPrev = 7,
    ModalityOn = 10,
    ModalityOff = 11,
    RegisterAccelerator = 12,
    UnregisterAccelerator = 13,
    ActivateAccelerator = 14,
}

impl Opcode {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::EmbeddedNotify,
            1 => Self::WindowActivate,
            2 => Self::WindowDeactivate,
            3 => Self::RequestFocus,
            4 => Self::FocusIn,
            5 => Self::FocusOut,
            6 => Self::FocusNext,
            7 => Self::FocusPrev,
            10 => Self::ModalityOn,
            11 => Self::ModalityOff,
            12 => Self::RegisterAccelerator,
            13 => Self::UnregisterAccelerator,
            14 => Self::ActivateAccelerator,
            _ => return None,
        })
    }
}

/// `FocusIn` detail: focus the first widget
pub const XEMBED_FOCUS_FIRST: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XembedInfo {
    pub version: u32,
    pub flags: u32,
}

impl XembedInfo {
    pub fn from_raw(values: &[u32]) -> Option<Self> {
        match values {
            [version, flags, ..] => Some(Self {
                version: *version,
                flags: *flags,
            }),
            _ => None,
        }
    }

    pub fn to_raw(self) -> [u32; 2] {
        [self.version, self.flags]
    }

    pub fn is_mapped(&self) -> bool {
        self.flags & XEMBED_MAPPED != 0
    }
}

/// Data of an `_XEMBED` client message (format 32)
pub fn message_data(time: u32, opcode: Opcode, detail: u32, data1: u32, data2: u32) -> [u32; 5] {
    [time, opcode as u32, detail, data1, data2]
}

/// A decoded `_XEMBED` client message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub time: u32,
    pub opcode: Opcode,
    pub detail: u32,
    pub data1: u32,
    pub data2: u32,
}

impl Message {
    pub fn decode(data: [u32; 5]) -> Option<Self> {
        Some(Self {
            time: data[0],
            opcode: Opcode::from_u32(data[1])?,
            detail: data[2],
            data1: data[3],
            data2: data[4],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embedded {
    pub window: Window,
    pub info: XembedInfo,
}

/// Map state change to apply after an `_XEMBED_INFO` update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapChange {
    Map,
    Unmap,
}

/// Windows embedded by the tray collaborator
#[derive(Debug, Default)]
pub struct EmbeddedWindows {
    windows: Vec<Embedded>,
}

impl EmbeddedWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, window: Window, info: XembedInfo) {
        self.windows.retain(|e| e.window != window);
        self.windows.push(Embedded { window, info });
    }

    pub fn remove(&mut self, window: Window) -> Option<Embedded> {
        let pos = self.windows.iter().position(|e| e.window == window)?;
        Some(self.windows.remove(pos))
    }

    pub fn contains(&self, window: Window) -> bool {
        self.windows.iter().any(|e| e.window == window)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Embedded> {
        self.windows.iter()
    }

    /// Record new info; returns what to do with the window's map state.
    /// A missing property means "unmapped".
    pub fn update(&mut self, window: Window, info: Option<XembedInfo>) -> Option<MapChange> {
        let entry = self.windows.iter_mut().find(|e| e.window == window)?;
        let info = info.unwrap_or_default();
        let was_mapped = entry.info.is_mapped();
        entry.info = info;
        match (was_mapped, info.is_mapped()) {
            (false, true) => {
                debug!("xembed: mapping 0x{:x}", window);
                Some(MapChange::Map)
            }
            (true, false) => {
                debug!("xembed: unmapping 0x{:x}", window);
                Some(MapChange::Unmap)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_layout() {
        let info = XembedInfo::from_raw(&[0, XEMBED_MAPPED]).unwrap();
        assert!(info.is_mapped());
        assert_eq!(info.to_raw(), [0, 1]);
        assert!(XembedInfo::from_raw(&[0]).is_none());
    }

    #[test]
    fn message_layout() {
        let data = message_data(1234, Opcode::FocusIn, XEMBED_FOCUS_FIRST, 0, 0);
        assert_eq!(data, [1234, 4, 1, 0, 0]);
        let msg = Message::decode(data).unwrap();
        assert_eq!(msg.opcode, Opcode::FocusIn);
        assert!(Message::decode([0, 8, 0, 0, 0]).is_none());
    }

    #[test]
    fn mapped_flag_drives_map_state() {
        let mut set = EmbeddedWindows::new();
        set.register(42, XembedInfo { version: 0, flags: 0 });
        let mapped = XembedInfo { version: 0, flags: XEMBED_MAPPED };
        assert_eq!(set.update(42, Some(mapped)), Some(MapChange::Map));
        assert_eq!(set.update(42, Some(mapped)), None);
        assert_eq!(set.update(42, None), Some(MapChange::Unmap));
        assert_eq!(set.update(7, Some(mapped)), None);
    }
}
