//! Client registry
//!
//! Sole owner of every live [`Client`]. Keeps manage order (newest first)
//! and two reverse indexes: client window and frame window to handle.

use std::collections::HashMap;

use tracing::trace;
use x11rb::protocol::xproto::Window;

use slotmap::SlotMap;

use crate::error::{WmError, WmResult};
use crate::wm::client::{Client, ClientId};

#[derive(Default)]
pub struct Registry {
    clients: SlotMap<ClientId, Client>,
    order: Vec<ClientId>,
    by_window: HashMap<Window, ClientId>,
    by_frame: HashMap<Window, ClientId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front of the manage order.
    pub fn insert_front(&mut self, client: Client) -> WmResult<ClientId> {
        if self.by_window.contains_key(&client.window) || self.by_frame.contains_key(&client.window) {
            return Err(WmError::AlreadyManaged(client.window));
        }
        let window = client.window;
        let frame = client.frame;
        let id = self.clients.insert(client);
        self.order.insert(0, id);
        self.by_window.insert(window, id);
        if frame != window {
            self.by_frame.insert(frame, id);
        }
        trace!("registry: inserted 0x{:x} as {:?}", window, id);
        Ok(id)
    }

    pub fn remove(&mut self, id: ClientId) -> WmResult<Client> {
        let client = self.clients.remove(id).ok_or(WmError::StaleClient(id))?;
        self.order.retain(|c| *c != id);
        self.by_window.remove(&client.window);
        self.by_frame.remove(&client.frame);
        trace!("registry: removed 0x{:x}", client.window);
        Ok(client)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub fn try_get(&self, id: ClientId) -> WmResult<&Client> {
        self.clients.get(id).ok_or(WmError::StaleClient(id))
    }

    pub fn try_get_mut(&mut self, id: ClientId) -> WmResult<&mut Client> {
        self.clients.get_mut(id).ok_or(WmError::StaleClient(id))
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(id)
    }

    /// Look up by the application's own window
    pub fn by_window(&self, window: Window) -> Option<ClientId> {
        self.by_window.get(&window).copied()
    }

    pub fn by_frame(&self, window: Window) -> Option<ClientId> {
        self.by_frame.get(&window).copied()
    }

    /// Client window or frame
    pub fn by_any(&self, window: Window) -> Option<ClientId> {
        self.by_window(window).or_else(|| self.by_frame(window))
    }

    /// Handles in manage order, newest first
    pub fn ids(&self) -> &[ClientId] {
        &self.order
    }

    /// Clients in manage order, newest first
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &Client)> {
        self.order
            .iter()
            .filter_map(move |id| self.clients.get(*id).map(|c| (*id, c)))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;

    fn client(window: Window) -> Client {
        Client::new(window, window + 1000, Geometry::new(0, 0, 10, 10), 0)
    }

    #[test]
    fn newest_client_comes_first() {
        let mut reg = Registry::new();
        let a = reg.insert_front(client(1)).unwrap();
        let b = reg.insert_front(client(2)).unwrap();
        assert_eq!(reg.ids(), &[b, a]);
        assert_eq!(reg.by_window(1), Some(a));
        assert_eq!(reg.by_frame(1002), Some(b));
        assert_eq!(reg.by_any(1001), Some(a));
    }

    #[test]
    fn a_window_maps_to_one_client() {
        let mut reg = Registry::new();
        reg.insert_front(client(7)).unwrap();
        assert!(matches!(reg.insert_front(client(7)), Err(WmError::AlreadyManaged(7))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn removed_client_is_gone_everywhere() {
        let mut reg = Registry::new();
        let a = reg.insert_front(client(1)).unwrap();
        let removed = reg.remove(a).unwrap();
        assert_eq!(removed.window, 1);
        assert!(reg.by_window(1).is_none());
        assert!(reg.by_frame(1001).is_none());
        assert!(reg.ids().is_empty());
        assert!(matches!(reg.try_get(a), Err(WmError::StaleClient(id)) if id == a));
        assert!(reg.remove(a).is_err());
    }
}
