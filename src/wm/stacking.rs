//! Stacking Module
//!
//! Manages window z-order and layers. Operations only reorder the model and
//! set a dirty flag; the server sees the result in one restack pass during
//! the refresh.

use std::collections::HashSet;

use tracing::{trace, warn};
use x11rb::protocol::xproto::Window;

use crate::wm::client::{Client, ClientId};
use crate::wm::client_flags::{ClientFlags, WindowType};
use crate::wm::registry::Registry;
use crate::wm::strut::Strut;
use crate::wm::transients;

/// Stacking layers, bottom to top. Overlays are not clients and are placed
/// by [`Stack::windows`] around these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    /// Transient whose owner is stacked: it goes right above the owner
    Ignore,
    Desktop,
    Below,
    Normal,
    Above,
    /// Only while the client holds focus
    Fullscreen,
    Ontop,
}

const CLIENT_LAYERS_UNDER_OVERLAYS: [Layer; 1] = [Layer::Desktop];
const CLIENT_LAYERS_OVER_OVERLAYS: [Layer; 5] = [
    Layer::Below,
    Layer::Normal,
    Layer::Above,
    Layer::Fullscreen,
    Layer::Ontop,
];

/// Layer of a client given whether it currently holds focus
pub fn client_layer(client: &Client, focused: bool, owner_stacked: bool) -> Layer {
    let flags = client.flags;
    if flags.contains(ClientFlags::ONTOP) {
        Layer::Ontop
    } else if flags.contains(ClientFlags::FULLSCREEN) && focused {
        Layer::Fullscreen
    } else if flags.contains(ClientFlags::ABOVE) {
        Layer::Above
    } else if flags.contains(ClientFlags::BELOW) {
        Layer::Below
    } else if client.transient_for.is_some() && owner_stacked {
        Layer::Ignore
    } else if client.window_type == WindowType::Desktop {
        Layer::Desktop
    } else {
        Layer::Normal
    }
}

/// An override-redirect bar or desktop window: stacked and may reserve
/// space, but never managed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub window: Window,
    pub ontop: bool,
    pub strut: Strut,
}

/// Client stacking order, bottom to top
#[derive(Debug, Default)]
pub struct Stack {
    order: Vec<ClientId>,
    dirty: bool,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bottom to top, ignoring layers
    pub fn ids(&self) -> &[ClientId] {
        &self.order
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.order.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn remove(&mut self, id: ClientId) {
        let before = self.order.len();
        self.order.retain(|c| *c != id);
        if self.order.len() != before {
            self.dirty = true;
        }
    }

    /// Raise: the ancestor chain, root first, then `id` go to the top.
    pub fn push_front(&mut self, registry: &Registry, id: ClientId) {
        let chain = transients::ancestors(registry, id);
        for owner in chain.iter().rev() {
            self.order.retain(|c| c != owner);
            self.order.push(*owner);
        }
        self.order.retain(|c| *c != id);
        self.order.push(id);
        self.dirty = true;
        trace!("stack: pushed {:?} to front", id);
    }

    /// Lower: `id` goes to the bottom, then each owner below it.
    pub fn push_back(&mut self, registry: &Registry, id: ClientId) {
        self.order.retain(|c| *c != id);
        self.order.insert(0, id);
        for owner in transients::ancestors(registry, id) {
            self.order.retain(|c| *c != owner);
            self.order.insert(0, owner);
        }
        self.dirty = true;
        trace!("stack: pushed {:?} to back", id);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear and return the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn layer_of(&self, registry: &Registry, id: ClientId, focused: Option<ClientId>) -> Option<Layer> {
        let client = registry.get(id)?;
        let owner_stacked = client.transient_for.map_or(false, |o| self.contains(o));
        Some(client_layer(client, focused == Some(id), owner_stacked))
    }

    fn push_with_transients(
        &self,
        registry: &Registry,
        id: ClientId,
        focused: Option<ClientId>,
        out: &mut Vec<ClientId>,
        seen: &mut HashSet<ClientId>,
    ) {
        if !seen.insert(id) {
            return;
        }
        out.push(id);
        for child in self.order.iter().copied() {
            let is_child = registry.get(child).map_or(false, |c| c.transient_for == Some(id));
            if is_child && self.layer_of(registry, child, focused) == Some(Layer::Ignore) {
                self.push_with_transients(registry, child, focused, out, seen);
            }
        }
    }

    fn push_layer(
        &self,
        registry: &Registry,
        layer: Layer,
        focused: Option<ClientId>,
        out: &mut Vec<ClientId>,
        seen: &mut HashSet<ClientId>,
    ) {
        for id in self.order.iter().copied() {
            if self.layer_of(registry, id, focused) == Some(layer) {
                self.push_with_transients(registry, id, focused, out, seen);
            }
        }
    }

    /// Clients in final visual order, bottom to top
    pub fn layered(&self, registry: &Registry, focused: Option<ClientId>) -> Vec<ClientId> {
        let (under, over) = self.layered_split(registry, focused);
        under.into_iter().chain(over).collect()
    }

    /// Clients below the non-ontop overlays, and everything above them
    fn layered_split(&self, registry: &Registry, focused: Option<ClientId>) -> (Vec<ClientId>, Vec<ClientId>) {
        let mut seen = HashSet::new();
        let mut under = Vec::new();
        for layer in CLIENT_LAYERS_UNDER_OVERLAYS {
            self.push_layer(registry, layer, focused, &mut under, &mut seen);
        }
        let mut over = Vec::new();
        for layer in CLIENT_LAYERS_OVER_OVERLAYS {
            self.push_layer(registry, layer, focused, &mut over, &mut seen);
        }
        for id in self.order.iter().copied() {
            if registry.contains(id) && !seen.contains(&id) {
                warn!("stack: {:?} was not reached through its layer, placing it on top", id);
                seen.insert(id);
                over.push(id);
            }
        }
        (under, over)
    }

    /// Every stacked server window, bottom to top: desktop clients, then
    /// overlays that are not ontop, then the remaining layers, then ontop
    /// overlays.
    pub fn windows(&self, registry: &Registry, focused: Option<ClientId>, overlays: &[Overlay]) -> Vec<Window> {
        let (under, over) = self.layered_split(registry, focused);
        let frame = |id: ClientId| registry.get(id).map(|c| c.frame);
        under
            .into_iter()
            .filter_map(frame)
            .chain(overlays.iter().filter(|o| !o.ontop).map(|o| o.window))
            .chain(over.into_iter().filter_map(frame))
            .chain(overlays.iter().filter(|o| o.ontop).map(|o| o.window))
            .collect()
    }
}

/// `(window, sibling)` pairs stacking each window directly above the
/// previous one. The bottom window has no sibling and is skipped.
pub fn restack_pairs(windows: &[Window]) -> Vec<(Window, Window)> {
    windows.windows(2).map(|pair| (pair[1], pair[0])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;

    fn setup(n: u32) -> (Registry, Stack, Vec<ClientId>) {
        let mut reg = Registry::new();
        let mut stack = Stack::new();
        let mut ids = Vec::new();
        for w in 1..=n {
            let id = reg
                .insert_front(Client::new(w, w + 100, Geometry::new(0, 0, 10, 10), 0))
                .unwrap();
            stack.push_front(&reg, id);
            ids.push(id);
        }
        (reg, stack, ids)
    }

    fn is_permutation(reg: &Registry, order: &[ClientId]) -> bool {
        let mut a: Vec<_> = order.to_vec();
        let mut b: Vec<_> = reg.ids().to_vec();
        a.sort();
        b.sort();
        a == b
    }

    #[test]
    fn push_front_raises_without_reordering_others() {
        let (reg, mut stack, ids) = setup(4);
        stack.push_front(&reg, ids[1]);
        assert_eq!(stack.ids(), &[ids[0], ids[2], ids[3], ids[1]]);
        assert!(is_permutation(&reg, &stack.layered(&reg, None)));
    }

    #[test]
    fn push_front_brings_owner_chain() {
        let (mut reg, mut stack, ids) = setup(4);
        transients::set_transient_for(&mut reg, ids[0], Some(2)).unwrap();
        stack.push_front(&reg, ids[0]);
        assert_eq!(stack.ids(), &[ids[2], ids[3], ids[1], ids[0]]);
        let layered = stack.layered(&reg, None);
        assert_eq!(layered, vec![ids[2], ids[3], ids[1], ids[0]]);
    }

    #[test]
    fn push_back_relocates_transient_above_owner() {
        // C1 is transient for C2; lowering C2 puts C1 right above it.
        let (mut reg, mut stack, ids) = setup(3);
        let (c1, c2) = (ids[2], ids[1]);
        transients::set_transient_for(&mut reg, c1, Some(2)).unwrap();
        stack.push_back(&reg, c2);
        let layered = stack.layered(&reg, None);
        assert_eq!(layered, vec![c2, c1, ids[0]]);
        assert!(is_permutation(&reg, &layered));
    }

    #[test]
    fn push_back_of_transient_lowers_owner_too() {
        let (mut reg, mut stack, ids) = setup(3);
        transients::set_transient_for(&mut reg, ids[2], Some(2)).unwrap();
        stack.push_back(&reg, ids[2]);
        assert_eq!(stack.ids(), &[ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn layers_are_ordered() {
        let (mut reg, stack, ids) = setup(4);
        reg.get_mut(ids[0]).unwrap().flags.insert(ClientFlags::ONTOP);
        reg.get_mut(ids[1]).unwrap().window_type = WindowType::Desktop;
        reg.get_mut(ids[3]).unwrap().flags.insert(ClientFlags::BELOW);
        let layered = stack.layered(&reg, None);
        assert_eq!(layered, vec![ids[1], ids[3], ids[2], ids[0]]);
    }

    #[test]
    fn fullscreen_only_on_top_while_focused() {
        let (mut reg, stack, ids) = setup(2);
        reg.get_mut(ids[0]).unwrap().flags.insert(ClientFlags::FULLSCREEN);
        assert_eq!(stack.layered(&reg, None), vec![ids[0], ids[1]]);
        assert_eq!(stack.layered(&reg, Some(ids[0])), vec![ids[1], ids[0]]);
    }

    #[test]
    fn overlays_wrap_client_layers() {
        let (mut reg, stack, ids) = setup(2);
        reg.get_mut(ids[0]).unwrap().window_type = WindowType::Desktop;
        let overlays = [
            Overlay { window: 900, ontop: true, strut: Strut::default() },
            Overlay { window: 800, ontop: false, strut: Strut::default() },
        ];
        assert_eq!(stack.windows(&reg, None, &overlays), vec![101, 800, 102, 900]);
    }

    #[test]
    fn restack_skips_the_bottom_window() {
        assert_eq!(restack_pairs(&[1, 2, 3]), vec![(2, 1), (3, 2)]);
        assert!(restack_pairs(&[1]).is_empty());
        assert!(restack_pairs(&[]).is_empty());
    }

    #[test]
    fn dirty_flag() {
        let (reg, mut stack, ids) = setup(1);
        assert!(stack.take_dirty());
        assert!(!stack.is_dirty());
        stack.push_back(&reg, ids[0]);
        assert!(stack.take_dirty());
    }
}
