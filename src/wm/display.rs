//! Display Module
//!
//! The X11 connection and everything fixed at startup: the root window,
//! interned atoms, extension event bases, the manager selection and the
//! check window that doubles as the fallback focus target.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _, CreateWindowAux, EventMask,
    PropMode, Timestamp, Window, WindowClass,
};
use x11rb::protocol::{randr, shape, xfixes, xkb, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::ExtensionInformation;

use crate::event_source::X11EventSource;
use crate::shared::Geometry;
use crate::wm::ewmh::{Atoms, StateTable, TypeTable};

/// How long a previous manager gets to let go of the selection
const TAKEOVER_TIMEOUT: Duration = Duration::from_secs(15);
/// How long the server gets to answer our timestamp round trip
const TIMESTAMP_TIMEOUT: Duration = Duration::from_secs(5);

/// Event bases of the optional extensions, resolved once
#[derive(Debug, Clone, Copy, Default)]
pub struct Extensions {
    pub randr: Option<ExtensionInformation>,
    /// RandR 1.5 (`GetMonitors`) is available
    pub randr_monitors: bool,
    pub shape: Option<ExtensionInformation>,
    pub xkb: Option<ExtensionInformation>,
    pub xfixes: Option<ExtensionInformation>,
}

/// Which extension an event number belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionEvent {
    Randr,
    Shape,
    Xkb,
    Xfixes,
}

impl Extensions {
    fn query(conn: &RustConnection) -> Result<Self> {
        let info = |name: &'static str| -> Result<Option<ExtensionInformation>> {
            Ok(conn
                .extension_information(name)
                .with_context(|| format!("Failed to query extension {}", name))?)
        };
        let mut ext = Self {
            randr: info(randr::X11_EXTENSION_NAME)?,
            randr_monitors: false,
            shape: info(shape::X11_EXTENSION_NAME)?,
            xkb: info(xkb::X11_EXTENSION_NAME)?,
            xfixes: info(xfixes::X11_EXTENSION_NAME)?,
        };

        if ext.randr.is_some() {
            use x11rb::protocol::randr::ConnectionExt;
            match conn.randr_query_version(1, 5)?.reply() {
                Ok(version) => {
                    debug!("RandR version: {}.{}", version.major_version, version.minor_version);
                    ext.randr_monitors = version.major_version > 1 || version.minor_version >= 5;
                }
                Err(e) => {
                    warn!("RandR present but version query failed: {}", e);
                    ext.randr = None;
                }
            }
        }
        if ext.xfixes.is_some() {
            use x11rb::protocol::xfixes::ConnectionExt;
            // XFIXES must be told which version we speak before any other request.
            if let Err(e) = conn.xfixes_query_version(5, 0)?.reply() {
                warn!("XFIXES version query failed: {}", e);
                ext.xfixes = None;
            }
        }
        if ext.xkb.is_some() {
            use x11rb::protocol::xkb::ConnectionExt;
            match conn.xkb_use_extension(1, 0)?.reply() {
                Ok(reply) if reply.supported => {}
                _ => {
                    warn!("XKB present but unusable");
                    ext.xkb = None;
                }
            }
        }
        Ok(ext)
    }

    /// Route an extension event by the first event number of each extension
    pub fn classify(&self, response_type: u8) -> Option<ExtensionEvent> {
        let code = response_type & 0x7f;
        let within = |ext: Option<ExtensionInformation>, count: u8| {
            ext.map_or(false, |e| code >= e.first_event && code < e.first_event.saturating_add(count))
        };
        if within(self.randr, randr::NOTIFY_EVENT + 1) {
            Some(ExtensionEvent::Randr)
        } else if within(self.shape, shape::NOTIFY_EVENT + 1) {
            Some(ExtensionEvent::Shape)
        } else if within(self.xkb, 1) {
            Some(ExtensionEvent::Xkb)
        } else if within(self.xfixes, xfixes::CURSOR_NOTIFY_EVENT + 1) {
            Some(ExtensionEvent::Xfixes)
        } else {
            None
        }
    }
}

/// DisplayInfo - the connection and global, startup-fixed state
pub struct DisplayInfo {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub root: Window,
    pub root_geometry: Geometry,
    pub root_depth: u8,
    pub atoms: Atoms,
    pub states: StateTable,
    pub types: TypeTable,
    pub extensions: Extensions,
    /// `_NET_SUPPORTING_WM_CHECK` window, owner of `WM_Sn` and fallback focus
    pub check_window: Window,
    /// `WM_Sn` for our screen
    pub selection: Atom,
    /// Timestamp we acquired the selection with
    pub selection_time: Timestamp,
}

impl DisplayInfo {
    /// Connect and intern everything. Nothing is owned yet.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display).context("Failed to connect to X server")?;
        info!("Connected to X server, screen {}", screen_num);

        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .context("X server reported no such screen")?;
        let root = screen.root;
        let root_depth = screen.root_depth;
        let root_geometry = Geometry::new(0, 0, screen.width_in_pixels as u32, screen.height_in_pixels as u32);

        let atoms = Atoms::new(&conn)?.reply().context("Failed to intern atoms")?;
        let selection_name = format!("WM_S{}", screen_num);
        let selection = conn
            .intern_atom(false, selection_name.as_bytes())?
            .reply()
            .context("Failed to intern the manager selection")?
            .atom;

        let extensions = Extensions::query(&conn)?;
        info!(
            "X11 Extensions: randr={} (monitors={}), shape={}, xkb={}, xfixes={}",
            extensions.randr.is_some(),
            extensions.randr_monitors,
            extensions.shape.is_some(),
            extensions.xkb.is_some(),
            extensions.xfixes.is_some(),
        );

        let check_window = conn.generate_id()?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            check_window,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .override_redirect(1)
                .event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        conn.map_window(check_window)?;
        debug!("Created check window: 0x{:x}", check_window);

        let states = StateTable::new(&atoms);
        let types = TypeTable::new(&atoms);
        Ok(Self {
            conn,
            screen_num,
            root,
            root_geometry,
            root_depth,
            atoms,
            states,
            types,
            extensions,
            check_window,
            selection,
            selection_time: x11rb::CURRENT_TIME,
        })
    }

    /// ICCCM 2.8 manager handshake followed by the substructure redirect.
    ///
    /// Events that arrive while waiting are returned for normal dispatch.
    pub fn acquire_manager(&mut self, source: &mut X11EventSource, replace: bool) -> Result<Vec<Event>> {
        let mut backlog = Vec::new();
        let previous = self.conn.get_selection_owner(self.selection)?.reply()?.owner;
        if previous != x11rb::NONE {
            if !replace {
                bail!("Another window manager owns the selection (window 0x{:x}); use --replace", previous);
            }
            info!("Replacing the window manager owning 0x{:x}", previous);
            // We want its DestroyNotify.
            self.conn.change_window_attributes(
                previous,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
            )?;
        }

        let timestamp = self.server_time(source, &mut backlog)?;
        self.conn.set_selection_owner(self.check_window, self.selection, timestamp)?;
        let owner = self.conn.get_selection_owner(self.selection)?.reply()?.owner;
        if owner != self.check_window {
            bail!("Failed to acquire the manager selection");
        }
        self.selection_time = timestamp;

        let announce = ClientMessageEvent::new(
            32,
            self.root,
            self.atoms.MANAGER,
            [timestamp, self.selection, self.check_window, 0, 0],
        );
        self.conn
            .send_event(false, self.root, EventMask::STRUCTURE_NOTIFY, announce)?;

        if previous != x11rb::NONE {
            let gone = wait_for(
                &self.conn,
                source,
                TAKEOVER_TIMEOUT,
                &mut backlog,
                |e| matches!(e, Event::DestroyNotify(d) if d.window == previous),
            )?;
            if gone.is_none() {
                bail!("Previous window manager did not exit within {:?}", TAKEOVER_TIMEOUT);
            }
            info!("Previous window manager exited");
        }

        let redirect = self.conn.change_window_attributes(
            self.root,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::PROPERTY_CHANGE
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW
                    | EventMask::FOCUS_CHANGE,
            ),
        )?;
        redirect
            .check()
            .context("Substructure redirect refused, another window manager is running")?;

        self.select_extension_input()?;
        self.atoms
            .set_supported(&self.conn, self.root, self.check_window, &self.states, &self.types)?;
        info!("Acquired {} at time {}", self.selection, timestamp);
        Ok(backlog)
    }

    /// A real server timestamp: append nothing to a property and read the
    /// time off the resulting PropertyNotify.
    fn server_time(&self, source: &mut X11EventSource, backlog: &mut Vec<Event>) -> Result<Timestamp> {
        self.conn.change_property(
            PropMode::APPEND,
            self.check_window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            8,
            0,
            &[],
        )?;
        let check = self.check_window;
        let event = wait_for(&self.conn, source, TIMESTAMP_TIMEOUT, backlog, |e| {
            matches!(e, Event::PropertyNotify(p) if p.window == check)
        })?;
        match event {
            Some(Event::PropertyNotify(p)) => Ok(p.time),
            _ => bail!("X server did not answer the timestamp round trip"),
        }
    }

    fn select_extension_input(&self) -> Result<()> {
        if self.extensions.randr.is_some() {
            use x11rb::protocol::randr::{ConnectionExt, NotifyMask};
            self.conn.randr_select_input(
                self.root,
                NotifyMask::SCREEN_CHANGE | NotifyMask::CRTC_CHANGE | NotifyMask::OUTPUT_CHANGE,
            )?;
        }
        if self.extensions.xfixes.is_some() {
            use x11rb::protocol::xfixes::{ConnectionExt, SelectionEventMask};
            // Tray and compositing managers announce themselves via selections.
            self.conn.xfixes_select_selection_input(
                self.check_window,
                self.selection,
                SelectionEventMask::SET_SELECTION_OWNER | SelectionEventMask::SELECTION_CLIENT_CLOSE,
            )?;
        }
        Ok(())
    }

    /// Release the selection and drop the properties we own on the root
    pub fn release(&self) -> Result<()> {
        self.atoms.clear_root(&self.conn, self.root)?;
        self.conn
            .set_selection_owner(x11rb::NONE, self.selection, self.selection_time)?;
        self.conn.destroy_window(self.check_window)?;
        self.conn.flush()?;
        Ok(())
    }
}

/// Bounded nested event loop: return the first event matching `pred`, or
/// `None` after `timeout`. Everything else is queued on `backlog`.
fn wait_for(
    conn: &RustConnection,
    source: &mut X11EventSource,
    timeout: Duration,
    backlog: &mut Vec<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Result<Option<Event>> {
    let deadline = Instant::now() + timeout;
    conn.flush()?;
    loop {
        while let Some(event) = conn.poll_for_event()? {
            if pred(&event) {
                return Ok(Some(event));
            }
            backlog.push(event);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        source.wait(Some(deadline - now))?;
    }
}
