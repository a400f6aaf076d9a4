//! Signals and requests
//!
//! The boundary to collaborators (scripting layer, tray, spawner). The core
//! emits [`Signal`]s after the fact and asks [`Hooks`] before applying the
//! default policy for negotiable requests. A hook returning anything other
//! than [`Verdict::Default`] is obeyed.

use tracing::debug;

use crate::shared::Geometry;
use crate::wm::client::ClientId;
use crate::wm::client_flags::ClientProperty;
use crate::wm::screen::ScreenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageContext {
    /// Found by the startup scan
    Startup,
    /// Live MapRequest
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmanageReason {
    Destroyed,
    User,
    Reparented,
    Unmap,
    Failed,
}

/// Why a geometry change is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryContext {
    ConfigureRequest,
    MoveResize,
    Fullscreen,
    Screen,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateContext {
    /// `_NET_ACTIVE_WINDOW` from a pager or the client itself
    Ewmh,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Manage { client: ClientId, context: ManageContext },
    Unmanage { client: ClientId, reason: UnmanageReason },
    ListChanged,
    PropertyChanged { client: ClientId, property: ClientProperty },
    Focus(ClientId),
    Unfocus(ClientId),
    Raised(ClientId),
    Lowered(ClientId),
    ScreenAdded(ScreenId),
    ScreenRemoved(ScreenId),
    ScreenPrimaryChanged(ScreenId),
    ScreenGeometryChanged(ScreenId),
    /// A startup sequence completed by a newly managed client
    StartupCompleted { id: String, client: ClientId },
}

/// A hook's answer to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// Apply the built-in policy
    Default,
    /// Apply this value instead
    Replace(T),
    /// Do nothing
    Deny,
}

/// Capability interface the core calls into. Every method has a default so
/// implementors only override what they care about.
pub trait Hooks {
    fn emit(&mut self, signal: &Signal) {
        let _ = signal;
    }

    fn request_geometry(&mut self, client: ClientId, proposed: Geometry, context: GeometryContext) -> Verdict<Geometry> {
        let _ = (client, proposed, context);
        Verdict::Default
    }

    fn request_activate(&mut self, client: ClientId, context: ActivateContext) -> Verdict<()> {
        let _ = (client, context);
        Verdict::Default
    }

    /// `tag` is `None` for "all tags" (sticky)
    fn request_tag(&mut self, client: ClientId, tag: Option<usize>) -> Verdict<Option<usize>> {
        let _ = (client, tag);
        Verdict::Default
    }

    fn request_urgent(&mut self, client: ClientId, urgent: bool) -> Verdict<bool> {
        let _ = (client, urgent);
        Verdict::Default
    }
}

/// Hooks used when no collaborator is attached: log and accept the defaults
#[derive(Debug, Default)]
pub struct LoggingHooks;

impl Hooks for LoggingHooks {
    fn emit(&mut self, signal: &Signal) {
        debug!("signal: {:?}", signal);
    }
}
