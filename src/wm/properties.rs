//! Client property fetching
//!
//! All properties a client needs at manage time are requested in one batch
//! and the replies consumed in a fixed order, so managing costs a single
//! round trip. PropertyNotify refetches go through the same parsers.

use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::cookie::Cookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, GetPropertyReply, Window};

use crate::wm::client::Icon;
use crate::wm::client_flags::{ClientFlags, WindowType, WmProtocols};
use crate::wm::ewmh::{Atoms, ProtocolAtoms, StateTable, TypeTable};
use crate::wm::hints::{MotifHints, SizeHints, WmHints};
use crate::wm::strut::Strut;
use crate::wm::xembed::XembedInfo;

/// Upper bound on `_NET_WM_ICON` data we are willing to fetch, in CARD32s
const ICON_FETCH_LIMIT: u32 = 1 << 20;
const STRING_FETCH_LIMIT: u32 = 1024;

/// Everything read from a window at manage time. Missing or malformed
/// properties leave the documented default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientProperties {
    pub size_hints: SizeHints,
    pub wm_hints: WmHints,
    pub transient_for: Option<Window>,
    pub leader: Option<Window>,
    pub instance: String,
    pub class: String,
    pub machine: String,
    pub role: String,
    pub pid: Option<u32>,
    pub icons: Vec<Icon>,
    pub name: String,
    pub icon_name: String,
    pub protocols: WmProtocols,
    pub motif_hints: MotifHints,
    pub window_type: WindowType,
    pub state: ClientFlags,
    pub strut: Strut,
    pub startup_id: Option<String>,
    pub desktop: Option<u32>,
}

/// A single property that changed on a managed window
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    SizeHints(SizeHints),
    WmHints(WmHints),
    TransientFor(Option<Window>),
    Leader(Option<Window>),
    Class { instance: String, class: String },
    Machine(String),
    Role(String),
    Pid(Option<u32>),
    Icons(Vec<Icon>),
    Name(String),
    IconName(String),
    Protocols(WmProtocols),
    Motif(MotifHints),
    WindowType(WindowType),
    Strut(Strut),
    StartupId(Option<String>),
    Xembed(Option<XembedInfo>),
}

/// Which property an atom names, for PropertyNotify routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    SizeHints,
    WmHints,
    TransientFor,
    Leader,
    Class,
    Machine,
    Role,
    Pid,
    Icon,
    Name,
    IconName,
    Protocols,
    Motif,
    WindowType,
    Strut,
    StartupId,
    Xembed,
}

impl PropertyKind {
    pub fn from_atom(atoms: &Atoms, atom: Atom) -> Option<Self> {
        let kind = if atom == u32::from(AtomEnum::WM_NORMAL_HINTS) {
            Self::SizeHints
        } else if atom == u32::from(AtomEnum::WM_HINTS) {
            Self::WmHints
        } else if atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
            Self::TransientFor
        } else if atom == atoms.WM_CLIENT_LEADER {
            Self::Leader
        } else if atom == u32::from(AtomEnum::WM_CLASS) {
            Self::Class
        } else if atom == u32::from(AtomEnum::WM_CLIENT_MACHINE) {
            Self::Machine
        } else if atom == atoms.WM_WINDOW_ROLE {
            Self::Role
        } else if atom == atoms._NET_WM_PID {
            Self::Pid
        } else if atom == atoms._NET_WM_ICON {
            Self::Icon
        } else if atom == u32::from(AtomEnum::WM_NAME) || atom == atoms._NET_WM_NAME {
            Self::Name
        } else if atom == u32::from(AtomEnum::WM_ICON_NAME) || atom == atoms._NET_WM_ICON_NAME {
            Self::IconName
        } else if atom == atoms.WM_PROTOCOLS {
            Self::Protocols
        } else if atom == atoms._MOTIF_WM_HINTS {
            Self::Motif
        } else if atom == atoms._NET_WM_WINDOW_TYPE {
            Self::WindowType
        } else if atom == atoms._NET_WM_STRUT || atom == atoms._NET_WM_STRUT_PARTIAL {
            Self::Strut
        } else if atom == atoms._NET_STARTUP_ID {
            Self::StartupId
        } else if atom == atoms._XEMBED_INFO {
            Self::Xembed
        } else {
            return None;
        };
        Some(kind)
    }
}

fn get<C: Connection>(
    conn: &C,
    window: Window,
    property: impl Into<Atom>,
    type_: impl Into<Atom>,
    length: u32,
) -> Result<Cookie<'_, C, GetPropertyReply>, ConnectionError> {
    conn.get_property(false, window, property, type_, 0, length)
}

fn reply<C: Connection>(cookie: Cookie<'_, C, GetPropertyReply>, what: &str) -> Option<GetPropertyReply> {
    match cookie.reply() {
        Ok(reply) => present(reply),
        Err(e) => {
            trace!("no {} ({})", what, e);
            None
        }
    }
}

/// A reply of type `None` means the property is not set
fn present(reply: GetPropertyReply) -> Option<GetPropertyReply> {
    (reply.type_ != x11rb::NONE && reply.value_len > 0).then_some(reply)
}

fn values32(reply: Option<GetPropertyReply>) -> Vec<u32> {
    reply
        .and_then(|r| r.value32().map(|v| v.collect()))
        .unwrap_or_default()
}

fn first32(reply: Option<GetPropertyReply>) -> Option<u32> {
    values32(reply).first().copied().filter(|v| *v != 0)
}

/// Latin-1 / UTF-8 text, up to the first NUL
pub fn parse_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// `WM_CLASS`: instance then class, NUL separated
pub fn parse_class(bytes: &[u8]) -> (String, String) {
    let mut parts = bytes.split(|b| *b == 0).map(|p| String::from_utf8_lossy(p).into_owned());
    let instance = parts.next().unwrap_or_default();
    let class = parts.next().unwrap_or_default();
    (instance, class)
}

/// `_NET_WM_ICON`: repeated `[width, height, pixels...]`. A truncated
/// trailing entry is dropped.
pub fn parse_icons(values: &[u32]) -> Vec<Icon> {
    let mut icons = Vec::new();
    let mut rest = values;
    while let [width, height, tail @ ..] = rest {
        let len = (*width as usize).saturating_mul(*height as usize);
        if len == 0 || len > tail.len() {
            break;
        }
        icons.push(Icon {
            width: *width,
            height: *height,
            argb: tail[..len].to_vec(),
        });
        rest = &tail[len..];
    }
    icons
}

fn text(reply: Option<GetPropertyReply>) -> String {
    reply.map(|r| parse_string(&r.value)).unwrap_or_default()
}

fn strut(partial: Option<GetPropertyReply>, legacy: Option<GetPropertyReply>) -> Strut {
    Strut::from_partial(&values32(partial))
        .or_else(|| Strut::from_legacy(&values32(legacy)))
        .unwrap_or_default()
}

/// Pending replies for every manage-time property of one window
pub struct PropertyCookies<'c, C: Connection> {
    size_hints: Cookie<'c, C, GetPropertyReply>,
    wm_hints: Cookie<'c, C, GetPropertyReply>,
    transient_for: Cookie<'c, C, GetPropertyReply>,
    leader: Cookie<'c, C, GetPropertyReply>,
    class: Cookie<'c, C, GetPropertyReply>,
    machine: Cookie<'c, C, GetPropertyReply>,
    role: Cookie<'c, C, GetPropertyReply>,
    pid: Cookie<'c, C, GetPropertyReply>,
    icon: Cookie<'c, C, GetPropertyReply>,
    net_name: Cookie<'c, C, GetPropertyReply>,
    wm_name: Cookie<'c, C, GetPropertyReply>,
    net_icon_name: Cookie<'c, C, GetPropertyReply>,
    wm_icon_name: Cookie<'c, C, GetPropertyReply>,
    protocols: Cookie<'c, C, GetPropertyReply>,
    motif: Cookie<'c, C, GetPropertyReply>,
    window_type: Cookie<'c, C, GetPropertyReply>,
    state: Cookie<'c, C, GetPropertyReply>,
    strut_partial: Cookie<'c, C, GetPropertyReply>,
    strut: Cookie<'c, C, GetPropertyReply>,
    startup_id: Cookie<'c, C, GetPropertyReply>,
    desktop: Cookie<'c, C, GetPropertyReply>,
}

impl<'c, C: Connection> PropertyCookies<'c, C> {
    /// Issue every request without waiting
    pub fn request(conn: &'c C, atoms: &Atoms, window: Window) -> Result<Self, ConnectionError> {
        Ok(Self {
            size_hints: get(conn, window, AtomEnum::WM_NORMAL_HINTS, AtomEnum::WM_SIZE_HINTS, 18)?,
            wm_hints: get(conn, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 9)?,
            transient_for: get(conn, window, AtomEnum::WM_TRANSIENT_FOR, AtomEnum::WINDOW, 1)?,
            leader: get(conn, window, atoms.WM_CLIENT_LEADER, AtomEnum::WINDOW, 1)?,
            class: get(conn, window, AtomEnum::WM_CLASS, AtomEnum::STRING, STRING_FETCH_LIMIT)?,
            machine: get(conn, window, AtomEnum::WM_CLIENT_MACHINE, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
            role: get(conn, window, atoms.WM_WINDOW_ROLE, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
            pid: get(conn, window, atoms._NET_WM_PID, AtomEnum::CARDINAL, 1)?,
            icon: get(conn, window, atoms._NET_WM_ICON, AtomEnum::CARDINAL, ICON_FETCH_LIMIT)?,
            net_name: get(conn, window, atoms._NET_WM_NAME, atoms.UTF8_STRING, STRING_FETCH_LIMIT)?,
            wm_name: get(conn, window, AtomEnum::WM_NAME, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
            net_icon_name: get(conn, window, atoms._NET_WM_ICON_NAME, atoms.UTF8_STRING, STRING_FETCH_LIMIT)?,
            wm_icon_name: get(conn, window, AtomEnum::WM_ICON_NAME, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
            protocols: get(conn, window, atoms.WM_PROTOCOLS, AtomEnum::ATOM, 32)?,
            motif: get(conn, window, atoms._MOTIF_WM_HINTS, atoms._MOTIF_WM_HINTS, 5)?,
            window_type: get(conn, window, atoms._NET_WM_WINDOW_TYPE, AtomEnum::ATOM, 32)?,
            state: get(conn, window, atoms._NET_WM_STATE, AtomEnum::ATOM, 32)?,
            strut_partial: get(conn, window, atoms._NET_WM_STRUT_PARTIAL, AtomEnum::CARDINAL, 12)?,
            strut: get(conn, window, atoms._NET_WM_STRUT, AtomEnum::CARDINAL, 4)?,
            startup_id: get(conn, window, atoms._NET_STARTUP_ID, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
            desktop: get(conn, window, atoms._NET_WM_DESKTOP, AtomEnum::CARDINAL, 1)?,
        })
    }

    /// Consume the replies in request order
    pub fn collect(self, atoms: &Atoms, states: &StateTable, types: &TypeTable) -> ClientProperties {
        let size_hints = values32(reply(self.size_hints, "WM_NORMAL_HINTS"));
        let wm_hints = values32(reply(self.wm_hints, "WM_HINTS"));
        let transient_for = first32(reply(self.transient_for, "WM_TRANSIENT_FOR"));
        let leader = first32(reply(self.leader, "WM_CLIENT_LEADER"));
        let (instance, class) = reply(self.class, "WM_CLASS")
            .map(|r| parse_class(&r.value))
            .unwrap_or_default();
        let machine = text(reply(self.machine, "WM_CLIENT_MACHINE"));
        let role = text(reply(self.role, "WM_WINDOW_ROLE"));
        let pid = first32(reply(self.pid, "_NET_WM_PID"));
        let icons = parse_icons(&values32(reply(self.icon, "_NET_WM_ICON")));
        let net_name = text(reply(self.net_name, "_NET_WM_NAME"));
        let wm_name = text(reply(self.wm_name, "WM_NAME"));
        let net_icon_name = text(reply(self.net_icon_name, "_NET_WM_ICON_NAME"));
        let wm_icon_name = text(reply(self.wm_icon_name, "WM_ICON_NAME"));
        let protocols = atoms
            .protocol_atoms()
            .protocols(&values32(reply(self.protocols, "WM_PROTOCOLS")));
        let motif = values32(reply(self.motif, "_MOTIF_WM_HINTS"));
        let window_type = types.window_type(&values32(reply(self.window_type, "_NET_WM_WINDOW_TYPE")));
        let state = states.flags(&values32(reply(self.state, "_NET_WM_STATE")));
        let strut = strut(
            reply(self.strut_partial, "_NET_WM_STRUT_PARTIAL"),
            reply(self.strut, "_NET_WM_STRUT"),
        );
        let startup_id = Some(text(reply(self.startup_id, "_NET_STARTUP_ID"))).filter(|s| !s.is_empty());
        let desktop = values32(reply(self.desktop, "_NET_WM_DESKTOP")).first().copied();

        ClientProperties {
            size_hints: SizeHints::from_raw(&size_hints).unwrap_or_default(),
            wm_hints: WmHints::from_raw(&wm_hints).unwrap_or_default(),
            transient_for,
            leader,
            instance,
            class,
            machine,
            role,
            pid,
            icons,
            name: if net_name.is_empty() { wm_name } else { net_name },
            icon_name: if net_icon_name.is_empty() { wm_icon_name } else { net_icon_name },
            protocols,
            motif_hints: MotifHints::from_raw(&motif).unwrap_or_default(),
            window_type,
            state,
            strut,
            startup_id,
            desktop,
        }
    }
}

/// Cookies for one PropertyNotify refetch. Names and struts need two
/// requests (EWMH and legacy); other kinds use only the first.
pub struct UpdateCookie<'c, C: Connection> {
    kind: PropertyKind,
    primary: Cookie<'c, C, GetPropertyReply>,
    fallback: Option<Cookie<'c, C, GetPropertyReply>>,
}

impl<'c, C: Connection> UpdateCookie<'c, C> {
    pub fn request(conn: &'c C, atoms: &Atoms, window: Window, kind: PropertyKind) -> Result<Self, ConnectionError> {
        let (primary, fallback) = match kind {
            PropertyKind::SizeHints => (get(conn, window, AtomEnum::WM_NORMAL_HINTS, AtomEnum::WM_SIZE_HINTS, 18)?, None),
            PropertyKind::WmHints => (get(conn, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 9)?, None),
            PropertyKind::TransientFor => (get(conn, window, AtomEnum::WM_TRANSIENT_FOR, AtomEnum::WINDOW, 1)?, None),
            PropertyKind::Leader => (get(conn, window, atoms.WM_CLIENT_LEADER, AtomEnum::WINDOW, 1)?, None),
            PropertyKind::Class => (get(conn, window, AtomEnum::WM_CLASS, AtomEnum::STRING, STRING_FETCH_LIMIT)?, None),
            PropertyKind::Machine => (
                get(conn, window, AtomEnum::WM_CLIENT_MACHINE, AtomEnum::ANY, STRING_FETCH_LIMIT)?,
                None,
            ),
            PropertyKind::Role => (get(conn, window, atoms.WM_WINDOW_ROLE, AtomEnum::ANY, STRING_FETCH_LIMIT)?, None),
            PropertyKind::Pid => (get(conn, window, atoms._NET_WM_PID, AtomEnum::CARDINAL, 1)?, None),
            PropertyKind::Icon => (get(conn, window, atoms._NET_WM_ICON, AtomEnum::CARDINAL, ICON_FETCH_LIMIT)?, None),
            PropertyKind::Name => (
                get(conn, window, atoms._NET_WM_NAME, atoms.UTF8_STRING, STRING_FETCH_LIMIT)?,
                Some(get(conn, window, AtomEnum::WM_NAME, AtomEnum::ANY, STRING_FETCH_LIMIT)?),
            ),
            PropertyKind::IconName => (
                get(conn, window, atoms._NET_WM_ICON_NAME, atoms.UTF8_STRING, STRING_FETCH_LIMIT)?,
                Some(get(conn, window, AtomEnum::WM_ICON_NAME, AtomEnum::ANY, STRING_FETCH_LIMIT)?),
            ),
            PropertyKind::Protocols => (get(conn, window, atoms.WM_PROTOCOLS, AtomEnum::ATOM, 32)?, None),
            PropertyKind::Motif => (get(conn, window, atoms._MOTIF_WM_HINTS, atoms._MOTIF_WM_HINTS, 5)?, None),
            PropertyKind::WindowType => (get(conn, window, atoms._NET_WM_WINDOW_TYPE, AtomEnum::ATOM, 32)?, None),
            PropertyKind::Strut => (
                get(conn, window, atoms._NET_WM_STRUT_PARTIAL, AtomEnum::CARDINAL, 12)?,
                Some(get(conn, window, atoms._NET_WM_STRUT, AtomEnum::CARDINAL, 4)?),
            ),
            PropertyKind::StartupId => (get(conn, window, atoms._NET_STARTUP_ID, AtomEnum::ANY, STRING_FETCH_LIMIT)?, None),
            PropertyKind::Xembed => (get(conn, window, atoms._XEMBED_INFO, atoms._XEMBED_INFO, 2)?, None),
        };
        Ok(Self { kind, primary, fallback })
    }

    /// `None` when the request failed; the caller keeps the previous value
    pub fn collect(self, protocols: &ProtocolAtoms, types: &TypeTable) -> Option<PropertyUpdate> {
        let fallback = self.fallback.and_then(|c| c.reply().ok());
        decode_update(self.kind, self.primary.reply(), fallback, protocols, types)
    }
}

/// Turn a refetch reply into an update. A failed request yields `None`;
/// a property that no longer exists yields its documented default.
pub fn decode_update(
    kind: PropertyKind,
    primary: Result<GetPropertyReply, ReplyError>,
    fallback: Option<GetPropertyReply>,
    protocols: &ProtocolAtoms,
    types: &TypeTable,
) -> Option<PropertyUpdate> {
    let primary = match primary {
        Ok(reply) => present(reply),
        Err(e) => {
            debug!("refetch of {:?} failed, keeping the previous value: {}", kind, e);
            return None;
        }
    };
    let fallback = fallback.and_then(present);
    let update = match kind {
        PropertyKind::SizeHints => PropertyUpdate::SizeHints(SizeHints::from_raw(&values32(primary)).unwrap_or_default()),
        PropertyKind::WmHints => PropertyUpdate::WmHints(WmHints::from_raw(&values32(primary)).unwrap_or_default()),
        PropertyKind::TransientFor => PropertyUpdate::TransientFor(first32(primary)),
        PropertyKind::Leader => PropertyUpdate::Leader(first32(primary)),
        PropertyKind::Class => {
            let (instance, class) = primary.map(|r| parse_class(&r.value)).unwrap_or_default();
            PropertyUpdate::Class { instance, class }
        }
        PropertyKind::Machine => PropertyUpdate::Machine(text(primary)),
        PropertyKind::Role => PropertyUpdate::Role(text(primary)),
        PropertyKind::Pid => PropertyUpdate::Pid(first32(primary)),
        PropertyKind::Icon => PropertyUpdate::Icons(parse_icons(&values32(primary))),
        PropertyKind::Name => {
            let name = text(primary);
            PropertyUpdate::Name(if name.is_empty() { text(fallback) } else { name })
        }
        PropertyKind::IconName => {
            let name = text(primary);
            PropertyUpdate::IconName(if name.is_empty() { text(fallback) } else { name })
        }
        PropertyKind::Protocols => PropertyUpdate::Protocols(protocols.protocols(&values32(primary))),
        PropertyKind::Motif => PropertyUpdate::Motif(MotifHints::from_raw(&values32(primary)).unwrap_or_default()),
        PropertyKind::WindowType => PropertyUpdate::WindowType(types.window_type(&values32(primary))),
        PropertyKind::Strut => PropertyUpdate::Strut(strut(primary, fallback)),
        PropertyKind::StartupId => PropertyUpdate::StartupId(Some(text(primary)).filter(|s| !s.is_empty())),
        PropertyKind::Xembed => PropertyUpdate::Xembed(XembedInfo::from_raw(&values32(primary))),
    };
    debug!("refetched {:?}", kind);
    Some(update)
}

/// Window type and struts of an override-redirect window
pub struct OverlayCookies<'c, C: Connection> {
    window_type: Cookie<'c, C, GetPropertyReply>,
    strut_partial: Cookie<'c, C, GetPropertyReply>,
    strut: Cookie<'c, C, GetPropertyReply>,
}

impl<'c, C: Connection> OverlayCookies<'c, C> {
    pub fn request(conn: &'c C, atoms: &Atoms, window: Window) -> Result<Self, ConnectionError> {
        Ok(Self {
            window_type: get(conn, window, atoms._NET_WM_WINDOW_TYPE, AtomEnum::ATOM, 32)?,
            strut_partial: get(conn, window, atoms._NET_WM_STRUT_PARTIAL, AtomEnum::CARDINAL, 12)?,
            strut: get(conn, window, atoms._NET_WM_STRUT, AtomEnum::CARDINAL, 4)?,
        })
    }

    pub fn collect(self, types: &TypeTable) -> (WindowType, Strut) {
        let window_type = types.window_type(&values32(reply(self.window_type, "_NET_WM_WINDOW_TYPE")));
        let strut = strut(
            reply(self.strut_partial, "_NET_WM_STRUT_PARTIAL"),
            reply(self.strut, "_NET_WM_STRUT"),
        );
        (window_type, strut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::ErrorKind;
    use x11rb::x11_utils::X11Error;

    const PROTOCOLS: ProtocolAtoms = ProtocolAtoms {
        delete_window: 301,
        take_focus: 302,
    };

    fn types() -> TypeTable {
        TypeTable::from_pairs(vec![(401, WindowType::Dock)])
    }

    fn bad_window() -> ReplyError {
        ReplyError::X11Error(X11Error {
            error_kind: ErrorKind::Window,
            error_code: 3,
            sequence: 0,
            bad_value: 0x40_0001,
            minor_opcode: 0,
            major_opcode: 20,
            extension_name: None,
            request_name: Some("GetProperty"),
        })
    }

    fn text_reply(value: &[u8]) -> GetPropertyReply {
        GetPropertyReply {
            format: 8,
            type_: AtomEnum::STRING.into(),
            value_len: value.len() as u32,
            value: value.to_vec(),
            ..Default::default()
        }
    }

    fn cardinal_reply(values: &[u32]) -> GetPropertyReply {
        GetPropertyReply {
            format: 32,
            type_: AtomEnum::CARDINAL.into(),
            value_len: values.len() as u32,
            value: values.iter().flat_map(|v| v.to_ne_bytes()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn failed_refetch_keeps_previous_value() {
        for kind in [PropertyKind::Name, PropertyKind::SizeHints, PropertyKind::Protocols] {
            assert_eq!(decode_update(kind, Err(bad_window()), None, &PROTOCOLS, &types()), None);
        }
    }

    #[test]
    fn deleted_property_resets_to_default() {
        let deleted = GetPropertyReply::default();
        assert_eq!(
            decode_update(PropertyKind::SizeHints, Ok(deleted.clone()), None, &PROTOCOLS, &types()),
            Some(PropertyUpdate::SizeHints(SizeHints::default()))
        );
        assert_eq!(
            decode_update(PropertyKind::Protocols, Ok(deleted), None, &PROTOCOLS, &types()),
            Some(PropertyUpdate::Protocols(WmProtocols::empty()))
        );
    }

    #[test]
    fn name_falls_back_to_legacy_property() {
        let update = decode_update(
            PropertyKind::Name,
            Ok(GetPropertyReply::default()),
            Some(text_reply(b"xterm")),
            &PROTOCOLS,
            &types(),
        );
        assert_eq!(update, Some(PropertyUpdate::Name("xterm".into())));
        let update = decode_update(
            PropertyKind::Name,
            Ok(text_reply(b"vim")),
            Some(text_reply(b"xterm")),
            &PROTOCOLS,
            &types(),
        );
        assert_eq!(update, Some(PropertyUpdate::Name("vim".into())));
    }

    #[test]
    fn refetched_size_hints_are_parsed() {
        let mut raw = [0u32; 18];
        raw[0] = crate::wm::hints::SizeHintFlags::P_MAX_SIZE.bits();
        raw[7] = 640;
        raw[8] = 480;
        match decode_update(PropertyKind::SizeHints, Ok(cardinal_reply(&raw)), None, &PROTOCOLS, &types()) {
            Some(PropertyUpdate::SizeHints(hints)) => assert_eq!(hints.max_size, Some((640, 480))),
            other => panic!("unexpected update {:?}", other),
        }
    }

    #[test]
    fn class_is_instance_then_class() {
        assert_eq!(
            parse_class(b"navigator\0Firefox\0"),
            ("navigator".to_string(), "Firefox".to_string())
        );
        assert_eq!(parse_class(b"xterm"), ("xterm".to_string(), String::new()));
    }

    #[test]
    fn strings_stop_at_nul() {
        assert_eq!(parse_string(b"title\0junk"), "title");
        assert_eq!(parse_string(b""), "");
    }

    #[test]
    fn icons_are_split_and_truncation_dropped() {
        let mut data = vec![2, 1, 0xff00_0000, 0xffff_ffff, 1, 1, 0x1234_5678];
        let icons = parse_icons(&data);
        assert_eq!(icons.len(), 2);
        assert_eq!((icons[0].width, icons[0].height), (2, 1));
        assert_eq!(icons[1].argb, vec![0x1234_5678]);

        data.extend_from_slice(&[16, 16, 1, 2, 3]);
        assert_eq!(parse_icons(&data).len(), 2);
        assert!(parse_icons(&[0, 5]).is_empty());
    }
}
