//! Transients Module
//!
//! `WM_TRANSIENT_FOR` relations between managed clients. The relation is a
//! handle into the registry and is kept acyclic: every walk is bounded by
//! the number of live clients.

use tracing::{debug, warn};
use x11rb::protocol::xproto::Window;

use crate::error::{WmError, WmResult};
use crate::wm::client::ClientId;
use crate::wm::registry::Registry;

/// True if following `transient_for` from `start` reaches `target`, or does
/// not terminate within the registry size (an existing cycle).
fn reaches(registry: &Registry, start: ClientId, target: ClientId) -> bool {
    let mut current = Some(start);
    for _ in 0..=registry.len() {
        match current {
            None => return false,
            Some(id) if id == target => return true,
            Some(id) => current = registry.get(id).and_then(|c| c.transient_for),
        }
    }
    true
}

/// Set the transient owner of `id` from a raw `WM_TRANSIENT_FOR` value.
///
/// The raw window is always recorded. The resolved relation is only set when
/// the owner is managed and the link would not close a cycle; a cycle clears
/// the relation and returns `TransientCycle`.
pub fn set_transient_for(registry: &mut Registry, id: ClientId, owner: Option<Window>) -> WmResult<()> {
    let window = registry.try_get(id)?.window;
    let resolved = owner.and_then(|w| registry.by_window(w));

    let result = match resolved {
        Some(parent) if reaches(registry, parent, id) => {
            warn!("transient_for of 0x{:x} would form a cycle, clearing it", window);
            Err(WmError::TransientCycle(window))
        }
        _ => Ok(()),
    };

    let client = registry.try_get_mut(id)?;
    client.transient_for_window = owner;
    client.transient_for = if result.is_ok() { resolved } else { None };
    if let Some(parent) = client.transient_for {
        debug!("0x{:x} is transient for {:?}", window, parent);
    }
    result
}

/// Bind clients whose `WM_TRANSIENT_FOR` names `new`'s window but that were
/// managed before it.
pub fn bind_waiting(registry: &mut Registry, new: ClientId) {
    let Some(window) = registry.get(new).map(|c| c.window) else {
        return;
    };
    let waiting: Vec<ClientId> = registry
        .iter()
        .filter(|(id, c)| *id != new && c.transient_for.is_none() && c.transient_for_window == Some(window))
        .map(|(id, _)| id)
        .collect();
    for id in waiting {
        if let Err(e) = set_transient_for(registry, id, Some(window)) {
            debug!("not binding late transient: {}", e);
        }
    }
}

/// Owners of `id`, nearest first. Bounded by the registry size.
pub fn ancestors(registry: &Registry, id: ClientId) -> Vec<ClientId> {
    let mut chain = Vec::new();
    let mut current = registry.get(id).and_then(|c| c.transient_for);
    while let Some(parent) = current {
        if chain.len() >= registry.len() || parent == id || chain.contains(&parent) {
            break;
        }
        chain.push(parent);
        current = registry.get(parent).and_then(|c| c.transient_for);
    }
    chain
}

/// Direct transients of `id`
pub fn children(registry: &Registry, id: ClientId) -> Vec<ClientId> {
    registry
        .iter()
        .filter(|(_, c)| c.transient_for == Some(id))
        .map(|(child, _)| child)
        .collect()
}

/// Drop every relation pointing at `id`. The raw window is kept so a
/// restarted owner can be bound again.
pub fn clear_references_to(registry: &mut Registry, id: ClientId) {
    for child in children(registry, id) {
        if let Some(c) = registry.get_mut(child) {
            c.transient_for = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;
    use crate::wm::client::Client;

    fn registry_with(windows: &[Window]) -> (Registry, Vec<ClientId>) {
        let mut reg = Registry::new();
        let ids = windows
            .iter()
            .map(|w| {
                reg.insert_front(Client::new(*w, w + 100, Geometry::new(0, 0, 10, 10), 0))
                    .unwrap()
            })
            .collect();
        (reg, ids)
    }

    #[test]
    fn chain_is_nearest_first() {
        let (mut reg, ids) = registry_with(&[1, 2, 3]);
        set_transient_for(&mut reg, ids[2], Some(2)).unwrap();
        set_transient_for(&mut reg, ids[1], Some(1)).unwrap();
        assert_eq!(ancestors(&reg, ids[2]), vec![ids[1], ids[0]]);
        assert!(ancestors(&reg, ids[0]).is_empty());
    }

    #[test]
    fn cycle_is_rejected_and_cleared() {
        let (mut reg, ids) = registry_with(&[1, 2]);
        set_transient_for(&mut reg, ids[0], Some(2)).unwrap();
        let err = set_transient_for(&mut reg, ids[1], Some(1));
        assert!(matches!(err, Err(WmError::TransientCycle(2))));
        assert_eq!(reg.get(ids[1]).unwrap().transient_for, None);
        assert_eq!(reg.get(ids[1]).unwrap().transient_for_window, Some(1));
    }

    #[test]
    fn self_transient_is_a_cycle() {
        let (mut reg, ids) = registry_with(&[5]);
        assert!(set_transient_for(&mut reg, ids[0], Some(5)).is_err());
        assert!(reg.get(ids[0]).unwrap().transient_for.is_none());
    }

    #[test]
    fn unmanaged_owner_binds_later() {
        let mut reg = Registry::new();
        let dialog = reg
            .insert_front(Client::new(2, 102, Geometry::default(), 0))
            .unwrap();
        set_transient_for(&mut reg, dialog, Some(1)).unwrap();
        assert!(reg.get(dialog).unwrap().transient_for.is_none());

        let owner = reg
            .insert_front(Client::new(1, 101, Geometry::default(), 0))
            .unwrap();
        bind_waiting(&mut reg, owner);
        assert_eq!(reg.get(dialog).unwrap().transient_for, Some(owner));
    }

    #[test]
    fn clearing_references() {
        let (mut reg, ids) = registry_with(&[1, 2, 3]);
        set_transient_for(&mut reg, ids[1], Some(1)).unwrap();
        set_transient_for(&mut reg, ids[2], Some(1)).unwrap();
        clear_references_to(&mut reg, ids[0]);
        assert!(reg.iter().all(|(_, c)| c.transient_for.is_none()));
    }
}
