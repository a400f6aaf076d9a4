//! Events Module
//!
//! The event pump: motion coalescing, enter/leave suppression, error
//! filtering and the routing of every event the manager selects.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ClientMessageEvent, ConfigWindow, ConfigureRequestEvent, ConfigureWindowAux, ConnectionExt as _, NotifyDetail,
    NotifyMode, PropertyNotifyEvent, StackMode,
};
use x11rb::protocol::Event;

use crate::wm::client_flags::ClientFlags;
use crate::wm::event_filter::{self, EnterLeaveSuppressor, FilterStatus};
use crate::wm::ewmh::{decode_state_request, Desktop, MoveResize};
use crate::wm::hints::WM_STATE_ICONIC;
use crate::wm::lifecycle::{CloseAction, ConfigureChanges};
use crate::wm::properties::PropertyKind;
use crate::wm::signals::{ActivateContext, GeometryContext, ManageContext, UnmanageReason};
use crate::wm::xembed;
use crate::wm::WindowManager;

/// How an event interacts with motion coalescing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerClass {
    /// Pointer motion, may be merged with the next one
    Motion,
    /// Enter/leave/button: must see every motion that preceded it
    Ordered,
    Other,
}

pub trait Coalesce {
    fn pointer_class(&self) -> PointerClass;
}

/// Holds back at most one motion event.
///
/// A newer motion replaces the pending one. An ordered event first releases
/// the pending motion so the two are dispatched in server order.
#[derive(Debug)]
pub struct MotionCoalescer<E> {
    pending: Option<E>,
}

impl<E> Default for MotionCoalescer<E> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<E: Coalesce> MotionCoalescer<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events to dispatch now, in order
    pub fn push(&mut self, event: E) -> Vec<E> {
        match event.pointer_class() {
            PointerClass::Motion => {
                self.pending = Some(event);
                Vec::new()
            }
            PointerClass::Ordered => self.pending.take().into_iter().chain(Some(event)).collect(),
            PointerClass::Other => vec![event],
        }
    }

    /// Release the pending motion at the end of a drain
    pub fn flush(&mut self) -> Option<E> {
        self.pending.take()
    }
}

/// An event with the sequence number of the last request the server had
/// processed when it generated it
#[derive(Debug)]
pub struct Sequenced {
    pub event: Event,
    pub sequence: u64,
}

impl Coalesce for Sequenced {
    fn pointer_class(&self) -> PointerClass {
        match self.event {
            Event::MotionNotify(_) => PointerClass::Motion,
            Event::EnterNotify(_) | Event::LeaveNotify(_) | Event::ButtonPress(_) | Event::ButtonRelease(_) => {
                PointerClass::Ordered
            }
            _ => PointerClass::Other,
        }
    }
}

/// Front of the event pump: motion coalescing, then enter/leave suppression
#[derive(Debug, Default)]
pub struct EventIntake {
    coalescer: MotionCoalescer<Sequenced>,
    pub suppressor: EnterLeaveSuppressor,
}

impl EventIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events ready for dispatch, in server order
    pub fn push(&mut self, event: Event, sequence: u64) -> Vec<Sequenced> {
        let ready = self.coalescer.push(Sequenced { event, sequence });
        let suppressor = &mut self.suppressor;
        ready
            .into_iter()
            .filter(|ev| match ev.event {
                Event::EnterNotify(_) | Event::LeaveNotify(_) => suppressor.filter(ev.sequence) == FilterStatus::Pass,
                _ => true,
            })
            .collect()
    }

    /// The motion still held back, if any
    pub fn flush(&mut self) -> Option<Sequenced> {
        self.coalescer.flush()
    }
}

/// Server timestamp carried by an event, if any
pub fn event_time(event: &Event) -> Option<u32> {
    let time = match event {
        Event::ButtonPress(e) => e.time,
        Event::ButtonRelease(e) => e.time,
        Event::KeyPress(e) => e.time,
        Event::KeyRelease(e) => e.time,
        Event::MotionNotify(e) => e.time,
        Event::EnterNotify(e) => e.time,
        Event::LeaveNotify(e) => e.time,
        Event::PropertyNotify(e) => e.time,
        Event::SelectionClear(e) => e.time,
        _ => return None,
    };
    (time != x11rb::CURRENT_TIME).then_some(time)
}

impl ConfigureChanges {
    pub fn from_request(ev: &ConfigureRequestEvent) -> Self {
        let has = |flag: ConfigWindow| ev.value_mask.contains(flag);
        Self {
            x: has(ConfigWindow::X).then_some(ev.x as i32),
            y: has(ConfigWindow::Y).then_some(ev.y as i32),
            width: has(ConfigWindow::WIDTH).then_some(ev.width as u32),
            height: has(ConfigWindow::HEIGHT).then_some(ev.height as u32),
            border_width: has(ConfigWindow::BORDER_WIDTH).then_some(ev.border_width as u32),
        }
    }
}

impl WindowManager {
    /// Feed one event from the connection through coalescing and dispatch
    pub(crate) fn pump(&mut self, event: Event, sequence: u64) {
        for ready in self.intake.push(event, sequence) {
            self.dispatch(ready);
        }
    }

    /// Drain everything the connection has buffered
    pub(crate) fn drain(&mut self) -> Result<()> {
        while let Some((event, sequence)) = self.display.conn.poll_for_event_with_sequence()? {
            self.pump(event, sequence);
        }
        if let Some(motion) = self.intake.flush() {
            self.dispatch(motion);
        }
        Ok(())
    }

    fn dispatch(&mut self, ev: Sequenced) {
        if let Some(time) = event_time(&ev.event) {
            self.last_time = time;
        }
        if let Err(e) = self.handle(ev) {
            warn!("event handler failed: {:#}", e);
        }
    }

    fn handle(&mut self, ev: Sequenced) -> Result<()> {
        match ev.event {
            Event::Error(e) => event_filter::handle_error(&e),

            Event::MapRequest(e) => match self.state.registry.by_window(e.window) {
                Some(id) => {
                    debug!("map request from managed 0x{:x}", e.window);
                    self.state.set_minimized(id, false)?;
                    self.state.activate(id, ActivateContext::Other)?;
                }
                None => self.manage(e.window, ManageContext::New)?,
            },

            Event::UnmapNotify(e) if self.state.is_overlay(e.window) => self.state.remove_overlay(e.window),

            Event::MapNotify(e) if e.override_redirect && e.event == self.display.root => self.track_overlay(e.window)?,

            Event::UnmapNotify(e) => {
                // Reparenting a mapped window unmaps it from the root; only
                // unmaps seen through the frame or the window itself count,
                // plus the synthetic ones ICCCM withdrawal sends to the root.
                let synthetic = e.response_type & 0x80 != 0;
                if e.event == self.display.root && !synthetic {
                    return Ok(());
                }
                if let Some(id) = self.state.registry.by_window(e.window) {
                    self.unmanage(id, UnmanageReason::Unmap)?;
                }
            }

            Event::DestroyNotify(e) => {
                if let Some(id) = self.state.registry.by_window(e.window) {
                    self.unmanage(id, UnmanageReason::Destroyed)?;
                } else if self.state.embedded.remove(e.window).is_some() {
                    debug!("embedded 0x{:x} destroyed", e.window);
                } else if self.state.is_overlay(e.window) {
                    self.state.remove_overlay(e.window);
                }
            }

            Event::ReparentNotify(e) => {
                if let Some(id) = self.state.registry.by_window(e.window) {
                    let frame = self.state.registry.get(id).map(|c| c.frame);
                    if Some(e.parent) != frame {
                        self.unmanage(id, UnmanageReason::Reparented)?;
                    }
                }
            }

            Event::ConfigureRequest(e) => self.configure_request(&e)?,

            Event::ConfigureNotify(e) if e.window == self.display.root => {
                let geometry = crate::shared::Geometry::new(0, 0, e.width as u32, e.height as u32);
                if geometry != self.state.root_geometry {
                    info!("root resized to {}x{}", e.width, e.height);
                    self.state.root_geometry = geometry;
                    self.display.root_geometry = geometry;
                    self.rescan.trigger(Instant::now());
                }
            }

            Event::PropertyNotify(e) => self.property_notify(&e),

            Event::ClientMessage(e) => self.client_message(&e)?,

            Event::EnterNotify(e) => {
                if let Some(id) = self.state.registry.by_any(e.event) {
                    trace!("pointer entered {:?}", id);
                }
            }
            Event::LeaveNotify(e) => trace!("pointer left 0x{:x}", e.event),

            Event::FocusIn(e) => {
                if matches!(e.mode, NotifyMode::GRAB | NotifyMode::UNGRAB)
                    || matches!(e.detail, NotifyDetail::POINTER | NotifyDetail::POINTER_ROOT | NotifyDetail::NONE)
                {
                    return Ok(());
                }
                if let Some(id) = self.state.registry.by_window(e.event) {
                    // A client took focus itself (globally active input model).
                    self.state.focus_client(id)?;
                }
            }

            Event::SelectionClear(e) if e.selection == self.display.selection => {
                info!("Lost the manager selection, exiting");
                self.running = false;
            }

            Event::RandrScreenChangeNotify(_) | Event::RandrNotify(_) => {
                debug!("monitor change notification");
                self.rescan.trigger(Instant::now());
            }

            Event::ShapeNotify(e) => trace!("shape changed on 0x{:x}", e.affected_window),

            Event::XfixesSelectionNotify(e) => {
                debug!("selection {} now owned by 0x{:x}", e.selection, e.owner);
            }

            Event::XkbStateNotify(_) | Event::XkbMapNotify(_) | Event::XkbNewKeyboardNotify(_) => {
                trace!("keyboard state changed");
            }

            Event::MotionNotify(e) => trace!("motion at {},{}", e.root_x, e.root_y),
            Event::ButtonPress(e) | Event::ButtonRelease(e) => trace!("button {} on 0x{:x}", e.detail, e.event),

            Event::Unknown(ref raw) => match raw.first().and_then(|t| self.display.extensions.classify(*t)) {
                Some(ext) => trace!("unparsed {:?} event", ext),
                None => debug!("unknown event {:?}", raw.first()),
            },

            _ => {}
        }
        Ok(())
    }

    fn configure_request(&mut self, e: &ConfigureRequestEvent) -> Result<()> {
        let Some(id) = self.state.registry.by_window(e.window) else {
            // Not ours: pass it on untouched.
            trace!("passing configure request of 0x{:x} through", e.window);
            let aux = ConfigureWindowAux::from_configure_request(e);
            self.display.conn.configure_window(e.window, &aux)?;
            return Ok(());
        };
        self.state.configure_request(id, ConfigureChanges::from_request(e))?;
        if e.value_mask.contains(ConfigWindow::STACK_MODE) {
            match e.stack_mode {
                StackMode::ABOVE => self.state.raise(id)?,
                StackMode::BELOW => self.state.lower(id)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn property_notify(&mut self, e: &PropertyNotifyEvent) {
        if e.window == self.display.root {
            return;
        }
        let Some(kind) = PropertyKind::from_atom(&self.display.atoms, e.atom) else {
            return;
        };
        let wanted = self.state.registry.by_window(e.window).is_some()
            || self.state.embedded.contains(e.window)
            || (kind == PropertyKind::Strut && self.state.is_overlay(e.window));
        if !wanted {
            return;
        }
        if !self.pending_properties.contains(&(e.window, kind)) {
            self.pending_properties.push((e.window, kind));
        }
    }

    fn client_message(&mut self, e: &ClientMessageEvent) -> Result<()> {
        let data = e.data.as_data32();
        let atoms = &self.display.atoms;

        if e.type_ == atoms._NET_CURRENT_DESKTOP {
            if let Desktop::Index(index) = Desktop::from_u32(data[0]) {
                self.state.view_tag(index)?;
            }
            return Ok(());
        }
        if e.type_ == atoms._XEMBED {
            match xembed::Message::decode(data) {
                Some(message) => debug!("xembed {:?} from 0x{:x}", message.opcode, e.window),
                None => debug!("malformed xembed message from 0x{:x}", e.window),
            }
            return Ok(());
        }

        let Some(id) = self.state.registry.by_window(e.window) else {
            trace!("client message {} for unmanaged 0x{:x}", e.type_, e.window);
            return Ok(());
        };

        if e.type_ == atoms._NET_WM_STATE {
            let Some((action, state_atoms)) = decode_state_request(data) else {
                debug!("bad _NET_WM_STATE action {}", data[0]);
                return Ok(());
            };
            let flags: Vec<ClientFlags> = state_atoms
                .into_iter()
                .filter_map(|a| self.display.states.flag(a))
                .collect();
            self.state.change_state(id, action, &flags)?;
        } else if e.type_ == atoms._NET_ACTIVE_WINDOW {
            self.state.activate(id, ActivateContext::Ewmh)?;
        } else if e.type_ == atoms._NET_CLOSE_WINDOW {
            self.close(id)?;
        } else if e.type_ == atoms._NET_WM_DESKTOP {
            match Desktop::from_u32(data[0]) {
                Desktop::All => self.state.request_tag(id, None)?,
                Desktop::Index(index) => self.state.request_tag(id, Some(index))?,
            }
        } else if e.type_ == atoms.WM_CHANGE_STATE {
            if data[0] == WM_STATE_ICONIC {
                self.state.set_minimized(id, true)?;
            }
        } else if e.type_ == atoms._NET_MOVERESIZE_WINDOW {
            let request = MoveResize::decode(data);
            let mut geometry = self.state.registry.try_get(id)?.geometry;
            if let Some(x) = request.x {
                geometry.x = x;
            }
            if let Some(y) = request.y {
                geometry.y = y;
            }
            if let Some(width) = request.width {
                geometry.width = width;
            }
            if let Some(height) = request.height {
                geometry.height = height;
            }
            self.state.request_geometry(id, geometry, GeometryContext::MoveResize)?;
        } else {
            trace!("ignoring client message {} on 0x{:x}", e.type_, e.window);
        }
        Ok(())
    }

    /// `_NET_CLOSE_WINDOW` and friends: ask politely if the client lets us
    pub fn close(&mut self, id: crate::wm::client::ClientId) -> Result<()> {
        let window = self.state.registry.try_get(id)?.window;
        match self.state.close_action(id)? {
            CloseAction::Delete => {
                debug!("sending WM_DELETE_WINDOW to 0x{:x}", window);
                let atoms = &self.display.atoms;
                atoms.send_protocol(&self.display.conn, window, atoms.WM_DELETE_WINDOW, self.last_time)?;
            }
            CloseAction::Kill => {
                info!("killing client 0x{:x}", window);
                self.display.conn.kill_client(window)?;
            }
        }
        Ok(())
    }

    /// Grab the server and ignore the enter/leave events generated until
    /// the matching `end_suppress`
    pub(crate) fn begin_suppress(&mut self) -> Result<()> {
        let cookie = self.display.conn.grab_server()?;
        self.intake.suppressor.begin(cookie.sequence_number());
        Ok(())
    }

    pub(crate) fn end_suppress(&mut self) -> Result<()> {
        let cookie = self.display.conn.ungrab_server()?;
        self.intake.suppressor.end(cookie.sequence_number());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x11rb::protocol::xproto::{EnterNotifyEvent, LeaveNotifyEvent, MotionNotifyEvent};

    #[derive(Debug, PartialEq)]
    enum Fake {
        Motion(u32),
        Enter(u32),
        Map(u32),
    }

    impl Coalesce for Fake {
        fn pointer_class(&self) -> PointerClass {
            match self {
                Fake::Motion(_) => PointerClass::Motion,
                Fake::Enter(_) => PointerClass::Ordered,
                Fake::Map(_) => PointerClass::Other,
            }
        }
    }

    #[test]
    fn only_the_last_motion_survives() {
        let mut c = MotionCoalescer::new();
        assert!(c.push(Fake::Motion(1)).is_empty());
        assert!(c.push(Fake::Motion(2)).is_empty());
        assert_eq!(c.flush(), Some(Fake::Motion(2)));
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn ordered_events_release_pending_motion_first() {
        let mut c = MotionCoalescer::new();
        c.push(Fake::Motion(1));
        assert_eq!(c.push(Fake::Enter(2)), vec![Fake::Motion(1), Fake::Enter(2)]);
        assert_eq!(c.push(Fake::Enter(3)), vec![Fake::Enter(3)]);
    }

    #[test]
    fn other_events_leave_motion_pending() {
        let mut c = MotionCoalescer::new();
        c.push(Fake::Motion(1));
        assert_eq!(c.push(Fake::Map(2)), vec![Fake::Map(2)]);
        assert_eq!(c.flush(), Some(Fake::Motion(1)));
    }

    fn motion(sequence: u64) -> (Event, u64) {
        (Event::MotionNotify(MotionNotifyEvent::default()), sequence)
    }

    fn enter(window: u32, sequence: u64) -> (Event, u64) {
        let event = EnterNotifyEvent {
            event: window,
            ..Default::default()
        };
        (Event::EnterNotify(event), sequence)
    }

    fn kinds(events: &[Sequenced]) -> Vec<(&'static str, u64)> {
        events
            .iter()
            .map(|ev| {
                let name = match ev.event {
                    Event::MotionNotify(_) => "motion",
                    Event::EnterNotify(_) => "enter",
                    Event::LeaveNotify(_) => "leave",
                    _ => "other",
                };
                (name, ev.sequence)
            })
            .collect()
    }

    #[test]
    fn intake_releases_motion_before_enter() {
        let mut intake = EventIntake::new();
        let (event, seq) = motion(3);
        assert!(intake.push(event, seq).is_empty());
        let (event, seq) = motion(4);
        assert!(intake.push(event, seq).is_empty());
        let (event, seq) = enter(7, 5);
        assert_eq!(kinds(&intake.push(event, seq)), vec![("motion", 4), ("enter", 5)]);
        assert!(intake.flush().is_none());
    }

    #[test]
    fn intake_drops_enter_caused_by_our_own_requests() {
        let mut intake = EventIntake::new();
        intake.suppressor.begin(10);
        intake.suppressor.end(12);

        let (event, seq) = motion(9);
        intake.push(event, seq);
        let (event, seq) = enter(7, 11);
        // the motion still goes out, the enter does not
        assert_eq!(kinds(&intake.push(event, seq)), vec![("motion", 9)]);

        let leave = LeaveNotifyEvent {
            event: 7,
            ..Default::default()
        };
        assert_eq!(kinds(&intake.push(Event::LeaveNotify(leave), 13)), vec![("leave", 13)]);
    }

    #[test]
    fn enter_during_an_open_grab_is_dropped() {
        let mut intake = EventIntake::new();
        intake.suppressor.begin(20);
        let (event, seq) = enter(7, 21);
        assert!(intake.push(event, seq).is_empty());
        intake.suppressor.end(22);
        let (event, seq) = enter(7, 23);
        assert_eq!(kinds(&intake.push(event, seq)), vec![("enter", 23)]);
    }

    #[test]
    fn configure_changes_follow_value_mask() {
        let ev = ConfigureRequestEvent {
            response_type: 23,
            stack_mode: StackMode::ABOVE,
            sequence: 0,
            parent: 1,
            window: 2,
            sibling: 0,
            x: 10,
            y: 20,
            width: 300,
            height: 200,
            border_width: 0,
            value_mask: ConfigWindow::X | ConfigWindow::HEIGHT,
        };
        assert_eq!(
            ConfigureChanges::from_request(&ev),
            ConfigureChanges {
                x: Some(10),
                height: Some(200),
                ..Default::default()
            }
        );
    }
}
