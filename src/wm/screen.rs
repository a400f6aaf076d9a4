//! Screen Module
//!
//! Viewports are the physical display rectangles found by a monitor scan.
//! Screens are the logical areas clients live on, normally one per
//! viewport. Both live in slot maps; the links between them are keys
//! that either side may outlive.

use slotmap::SlotMap;
use tracing::{debug, info};

use crate::error::{WmError, WmResult};
use crate::shared::Geometry;
use crate::wm::strut::{self, Strut};

slotmap::new_key_type! {
    pub struct ScreenId;
    pub struct ViewportId;
}

/// A physical output (connector) contributing to a viewport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub name: String,
    pub mm_width: u32,
    pub mm_height: u32,
}

/// One rectangle reported by a scan strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedViewport {
    pub geometry: Geometry,
    pub outputs: Vec<Output>,
}

impl ScannedViewport {
    pub fn new(geometry: Geometry, outputs: Vec<Output>) -> Self {
        Self { geometry, outputs }
    }
}

#[derive(Debug)]
pub struct Viewport {
    pub geometry: Geometry,
    pub outputs: Vec<Output>,
    pub screen: Option<ScreenId>,
    marked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenLifecycle {
    /// Created and destroyed by monitor scans
    Scanned,
    /// Covers the root when automatic screens are off; scans leave it alone
    External,
}

#[derive(Debug)]
pub struct Screen {
    pub geometry: Geometry,
    pub workarea: Geometry,
    pub outputs: Vec<Output>,
    pub lifecycle: ScreenLifecycle,
    pub viewport: Option<ViewportId>,
}

impl Screen {
    fn new(geometry: Geometry, outputs: Vec<Output>, lifecycle: ScreenLifecycle) -> Self {
        Self {
            geometry,
            workarea: geometry,
            outputs,
            lifecycle,
            viewport: None,
        }
    }

    /// Stable identity across rescans: the sorted output names, or the
    /// origin when the scan strategy has no outputs to report.
    fn identity(&self) -> String {
        identity_of(&self.geometry, &self.outputs)
    }
}

fn identity_of(geometry: &Geometry, outputs: &[Output]) -> String {
    if outputs.is_empty() {
        return format!("@{},{}", geometry.x, geometry.y);
    }
    let mut names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
    names.sort_unstable();
    names.join("+")
}

/// What changed during a screen refresh, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    Removed(ScreenId),
    Added(ScreenId),
    GeometryChanged(ScreenId),
    PrimaryChanged(ScreenId),
}

/// Merge rectangles sharing a top-left origin into the larger extents,
/// repeating until no such pair remains.
pub fn deduplicate(list: &mut Vec<ScannedViewport>) {
    'restart: loop {
        for first in 0..list.len() {
            for second in (first + 1)..list.len() {
                let (a, b) = (list[first].geometry, list[second].geometry);
                if a.x == b.x && a.y == b.y {
                    debug!("screens {:?} and {:?} share an origin, merging", a, b);
                    let merged = list.remove(second);
                    let keep = &mut list[first];
                    keep.geometry.width = a.width.max(b.width);
                    keep.geometry.height = a.height.max(b.height);
                    for output in merged.outputs {
                        if !keep.outputs.contains(&output) {
                            keep.outputs.push(output);
                        }
                    }
                    continue 'restart;
                }
            }
        }
        break;
    }
}

pub struct ScreenModel {
    screens: SlotMap<ScreenId, Screen>,
    order: Vec<ScreenId>,
    viewports: SlotMap<ViewportId, Viewport>,
    primary: Option<ScreenId>,
    auto_scan: bool,
}

impl ScreenModel {
    /// `auto_scan = false` records viewports but never creates screens for them
    pub fn new(auto_scan: bool) -> Self {
        Self {
            screens: SlotMap::with_key(),
            order: Vec::new(),
            viewports: SlotMap::with_key(),
            primary: None,
            auto_scan,
        }
    }

    pub fn ids(&self) -> &[ScreenId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScreenId, &Screen)> {
        self.order
            .iter()
            .filter_map(move |id| self.screens.get(*id).map(|s| (*id, s)))
    }

    pub fn get(&self, id: ScreenId) -> Option<&Screen> {
        self.screens.get(id)
    }

    pub fn try_get(&self, id: ScreenId) -> WmResult<&Screen> {
        self.screens.get(id).ok_or(WmError::StaleScreen(id))
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn primary(&self) -> Option<ScreenId> {
        self.primary.filter(|p| self.screens.contains_key(*p))
    }

    pub fn viewports(&self) -> impl Iterator<Item = (ViewportId, &Viewport)> {
        self.viewports.iter()
    }

    /// Record this pass's viewports: exact geometry matches are kept and
    /// marked, new ones created, and anything unmarked afterwards purged.
    fn record_viewports(&mut self, found: &[ScannedViewport]) {
        let ids: Vec<ViewportId> = self.viewports.keys().collect();
        for id in &ids {
            if let Some(v) = self.viewports.get_mut(*id) {
                v.marked = false;
            }
        }

        for scanned in found {
            let existing = self
                .viewports
                .iter()
                .find(|(_, v)| v.geometry == scanned.geometry)
                .map(|(id, _)| id);
            match existing.and_then(|id| self.viewports.get_mut(id)) {
                Some(v) => {
                    v.marked = true;
                    v.outputs = scanned.outputs.clone();
                }
                None => {
                    self.viewports.insert(Viewport {
                        geometry: scanned.geometry,
                        outputs: scanned.outputs.clone(),
                        screen: None,
                        marked: true,
                    });
                }
            }
        }

        for id in ids {
            let stale = self.viewports.get(id).map_or(false, |v| !v.marked);
            if stale {
                if let Some(v) = self.viewports.remove(id) {
                    debug!("viewport {:?} disappeared", v.geometry);
                    if let Some(screen) = v.screen.and_then(|s| self.screens.get_mut(s)) {
                        screen.viewport = None;
                    }
                }
            }
        }
    }

    /// Point every screen and viewport at its counterpart with equal geometry
    fn relink(&mut self) {
        let viewport_ids: Vec<ViewportId> = self.viewports.keys().collect();
        for id in &viewport_ids {
            if let Some(v) = self.viewports.get_mut(*id) {
                v.screen = None;
            }
        }
        for screen_id in self.order.clone() {
            let Some(geometry) = self.screens.get(screen_id).map(|s| s.geometry) else {
                continue;
            };
            let viewport = viewport_ids
                .iter()
                .copied()
                .find(|v| self.viewports.get(*v).map_or(false, |v| v.geometry == geometry));
            if let Some(v) = viewport.and_then(|v| self.viewports.get_mut(v)) {
                v.screen = Some(screen_id);
            }
            if let Some(s) = self.screens.get_mut(screen_id) {
                s.viewport = viewport;
            }
        }
    }

    fn insert(&mut self, screen: Screen) -> ScreenId {
        let id = self.screens.insert(screen);
        self.order.push(id);
        id
    }

    /// First scan at startup. Returns the created screens in order.
    pub fn scan(&mut self, found: &[ScannedViewport]) -> Vec<ScreenId> {
        self.record_viewports(found);
        if !self.auto_scan {
            debug!("automatic screen creation is disabled");
            return Vec::new();
        }
        let mut candidates = found.to_vec();
        deduplicate(&mut candidates);
        let created: Vec<ScreenId> = candidates
            .into_iter()
            .map(|c| {
                info!("screen {:?} ({})", c.geometry, identity_of(&c.geometry, &c.outputs));
                self.insert(Screen::new(c.geometry, c.outputs, ScreenLifecycle::Scanned))
            })
            .collect();
        self.relink();
        if self.primary().is_none() {
            self.primary = self.order.first().copied();
        }
        created
    }

    /// Screen not driven by scans
    pub fn add_external(&mut self, geometry: Geometry) -> ScreenId {
        let id = self.insert(Screen::new(geometry, Vec::new(), ScreenLifecycle::External));
        self.relink();
        if self.primary().is_none() {
            self.primary = Some(id);
        }
        id
    }

    pub fn remove(&mut self, id: ScreenId) -> Option<Screen> {
        let screen = self.screens.remove(id)?;
        self.order.retain(|s| *s != id);
        if let Some(v) = screen.viewport.and_then(|v| self.viewports.get_mut(v)) {
            v.screen = None;
        }
        if self.primary == Some(id) {
            self.primary = self.order.first().copied();
        }
        Some(screen)
    }

    /// Rescan after a monitor change, updating screens in place where their
    /// outputs persist. Removed screens are already gone from the model when
    /// this returns; clients still pointing at them need relocating.
    pub fn refresh(&mut self, found: &[ScannedViewport]) -> Vec<ScreenEvent> {
        self.record_viewports(found);
        let mut events = Vec::new();
        if !self.auto_scan {
            self.relink();
            return events;
        }

        let old_primary = self.primary();
        let mut candidates = found.to_vec();
        deduplicate(&mut candidates);

        let mut existing: Vec<(ScreenId, String)> = self
            .iter()
            .filter(|(_, s)| s.lifecycle == ScreenLifecycle::Scanned)
            .map(|(id, s)| (id, s.identity()))
            .collect();

        let mut added = Vec::new();
        let mut changed = Vec::new();
        for candidate in candidates {
            let identity = identity_of(&candidate.geometry, &candidate.outputs);
            match existing.iter().position(|(_, ident)| *ident == identity) {
                Some(pos) => {
                    let (id, _) = existing.remove(pos);
                    if let Some(screen) = self.screens.get_mut(id) {
                        if screen.geometry != candidate.geometry || screen.outputs != candidate.outputs {
                            debug!("screen {:?} changed to {:?}", id, candidate.geometry);
                            if screen.geometry != candidate.geometry {
                                changed.push(id);
                            }
                            screen.geometry = candidate.geometry;
                            screen.workarea = candidate.geometry;
                            screen.outputs = candidate.outputs;
                        }
                    }
                }
                None => {
                    info!("screen added at {:?} ({})", candidate.geometry, identity);
                    added.push(self.insert(Screen::new(
                        candidate.geometry,
                        candidate.outputs,
                        ScreenLifecycle::Scanned,
                    )));
                }
            }
        }

        for (id, identity) in existing {
            info!("screen removed ({})", identity);
            self.remove(id);
            events.push(ScreenEvent::Removed(id));
        }
        events.extend(added.into_iter().map(ScreenEvent::Added));
        events.extend(changed.into_iter().map(ScreenEvent::GeometryChanged));

        self.relink();
        if self.primary().is_none() {
            self.primary = self.order.first().copied();
        }
        if let Some(primary) = self.primary() {
            if old_primary != Some(primary) {
                events.push(ScreenEvent::PrimaryChanged(primary));
            }
        }
        events
    }

    /// Make the screen carrying `output` primary. Returns it if that changed.
    pub fn set_primary_output(&mut self, output: &str) -> Option<ScreenId> {
        let id = self
            .iter()
            .find(|(_, s)| s.outputs.iter().any(|o| o.name == output))
            .map(|(id, _)| id)?;
        if self.primary() == Some(id) {
            return None;
        }
        info!("primary screen is now {:?} ({})", id, output);
        self.primary = Some(id);
        Some(id)
    }

    /// Screen containing the point, else the nearest by squared distance
    pub fn screen_at(&self, x: i32, y: i32) -> Option<ScreenId> {
        self.iter()
            .find(|(_, s)| s.geometry.contains_point(x, y))
            .map(|(id, _)| id)
            .or_else(|| self.nearest(x, y))
    }

    /// Screen whose rectangle is closest to the point
    pub fn nearest(&self, x: i32, y: i32) -> Option<ScreenId> {
        self.iter()
            .min_by_key(|(_, s)| s.geometry.distance_sq_to(x, y))
            .map(|(id, _)| id)
    }

    /// Recompute work areas. Returns the screens whose work area changed.
    pub fn update_workareas<'a>(
        &mut self,
        root: &Geometry,
        struts: impl IntoIterator<Item = &'a Strut> + Clone,
    ) -> Vec<ScreenId> {
        let mut changed = Vec::new();
        for id in self.order.clone() {
            if let Some(screen) = self.screens.get_mut(id) {
                let area = strut::workarea(&screen.geometry, root, struts.clone());
                if area != screen.workarea {
                    screen.workarea = area;
                    changed.push(id);
                }
            }
        }
        changed
    }
}
