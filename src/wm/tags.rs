//! Tags Module
//!
//! A minimal tag model: named sets of clients, any number of which may be
//! selected at once. Backs client visibility and the EWMH desktop properties.

use tracing::debug;

use crate::error::{WmError, WmResult};
use crate::wm::client::ClientId;

/// `_NET_WM_DESKTOP` value meaning "all desktops"
pub const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;

#[derive(Debug)]
pub struct Tag {
    pub name: String,
    pub selected: bool,
    clients: Vec<ClientId>,
}

impl Tag {
    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }
}

#[derive(Debug, Default)]
pub struct Tags {
    tags: Vec<Tag>,
}

impl Tags {
    /// The first tag starts selected
    pub fn new(names: &[String]) -> Self {
        let tags = names
            .iter()
            .enumerate()
            .map(|(i, name)| Tag {
                name: name.clone(),
                selected: i == 0,
                clients: Vec::new(),
            })
            .collect();
        Self { tags }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.tags.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    fn tag_mut(&mut self, index: usize) -> WmResult<&mut Tag> {
        self.tags.get_mut(index).ok_or(WmError::NoSuchTag(index))
    }

    pub fn tag_client(&mut self, index: usize, client: ClientId) -> WmResult<()> {
        let tag = self.tag_mut(index)?;
        if !tag.clients.contains(&client) {
            tag.clients.push(client);
        }
        Ok(())
    }

    /// Move a client onto exactly one tag
    pub fn set_client_tag(&mut self, index: usize, client: ClientId) -> WmResult<()> {
        if index >= self.tags.len() {
            return Err(WmError::NoSuchTag(index));
        }
        self.remove_client(client);
        self.tag_client(index, client)
    }

    pub fn remove_client(&mut self, client: ClientId) {
        for tag in &mut self.tags {
            tag.clients.retain(|c| *c != client);
        }
    }

    pub fn is_tagged(&self, client: ClientId) -> bool {
        self.tags.iter().any(|t| t.clients.contains(&client))
    }

    /// Indices of the tags holding `client`
    pub fn client_tags(&self, client: ClientId) -> Vec<usize> {
        self.tags
            .iter()
            .enumerate()
            .filter(|(_, t)| t.clients.contains(&client))
            .map(|(i, _)| i)
            .collect()
    }

    /// True when `client` is on at least one selected tag
    pub fn on_selected_tag(&self, client: ClientId) -> bool {
        self.tags.iter().any(|t| t.selected && t.clients.contains(&client))
    }

    pub fn selected(&self) -> Vec<usize> {
        self.tags
            .iter()
            .enumerate()
            .filter(|(_, t)| t.selected)
            .map(|(i, _)| i)
            .collect()
    }

    /// Select only `index`. Returns whether the selection changed.
    pub fn view_only(&mut self, index: usize) -> WmResult<bool> {
        if index >= self.tags.len() {
            return Err(WmError::NoSuchTag(index));
        }
        let mut changed = false;
        for (i, tag) in self.tags.iter_mut().enumerate() {
            let selected = i == index;
            changed |= tag.selected != selected;
            tag.selected = selected;
        }
        if changed {
            debug!("viewing tag {}", index);
        }
        Ok(changed)
    }
}
