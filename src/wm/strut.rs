//! Struts
//!
//! Reserved edge space from `_NET_WM_STRUT_PARTIAL` / `_NET_WM_STRUT`, and
//! the work area computation it feeds.

use crate::shared::Geometry;

/// Reserved space along each root window edge. Extents are in root coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strut {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub left_start_y: u32,
    pub left_end_y: u32,
    pub right_start_y: u32,
    pub right_end_y: u32,
    pub top_start_x: u32,
    pub top_end_x: u32,
    pub bottom_start_x: u32,
    pub bottom_end_x: u32,
}

impl Strut {
    /// `_NET_WM_STRUT_PARTIAL`: twelve CARD32s
    pub fn from_partial(values: &[u32]) -> Option<Self> {
        let v: &[u32; 12] = values.get(..12)?.try_into().ok()?;
        Some(Self {
            left: v[0],
            right: v[1],
            top: v[2],
            bottom: v[3],
            left_start_y: v[4],
            left_end_y: v[5],
            right_start_y: v[6],
            right_end_y: v[7],
            top_start_x: v[8],
            top_end_x: v[9],
            bottom_start_x: v[10],
            bottom_end_x: v[11],
        })
    }

    /// `_NET_WM_STRUT`: four CARD32s, each spanning its whole edge
    pub fn from_legacy(values: &[u32]) -> Option<Self> {
        let v = values.get(..4)?;
        Some(Self {
            left: v[0],
            right: v[1],
            top: v[2],
            bottom: v[3],
            left_end_y: u32::MAX,
            right_end_y: u32::MAX,
            top_end_x: u32::MAX,
            bottom_end_x: u32::MAX,
            ..Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    /// Reserved rectangles in root coordinates
    pub fn reserved_rects(&self, root: &Geometry) -> Vec<Geometry> {
        let span = |start: u32, end: u32, limit: u32| -> (i32, u32) {
            let start = start.min(limit);
            let end = end.min(limit.saturating_sub(1));
            (start as i32, end.saturating_sub(start) + 1)
        };
        let mut rects = Vec::new();
        if self.left > 0 {
            let (y, h) = span(self.left_start_y, self.left_end_y, root.height);
            rects.push(Geometry::new(root.x, root.y + y, self.left, h));
        }
        if self.right > 0 {
            let (y, h) = span(self.right_start_y, self.right_end_y, root.height);
            rects.push(Geometry::new(root.right() - self.right as i32, root.y + y, self.right, h));
        }
        if self.top > 0 {
            let (x, w) = span(self.top_start_x, self.top_end_x, root.width);
            rects.push(Geometry::new(root.x + x, root.y, w, self.top));
        }
        if self.bottom > 0 {
            let (x, w) = span(self.bottom_start_x, self.bottom_end_x, root.width);
            rects.push(Geometry::new(root.x + x, root.bottom() - self.bottom as i32, w, self.bottom));
        }
        rects
    }
}

/// Screen geometry minus every strut whose reserved rectangle touches it
pub fn workarea<'a>(screen: &Geometry, root: &Geometry, struts: impl IntoIterator<Item = &'a Strut>) -> Geometry {
    let mut left = screen.x;
    let mut right = screen.right();
    let mut top = screen.y;
    let mut bottom = screen.bottom();

    for strut in struts {
        if strut.is_empty() {
            continue;
        }
        let rects = strut.reserved_rects(root);
        let mut rects = rects.iter();
        // reserved_rects yields left, right, top, bottom in that order
        // for whichever of them are non-zero
        if strut.left > 0 {
            if let Some(r) = rects.next().filter(|r| r.intersects(screen)) {
                left = left.max(r.right());
            }
        }
        if strut.right > 0 {
            if let Some(r) = rects.next().filter(|r| r.intersects(screen)) {
                right = right.min(r.x);
            }
        }
        if strut.top > 0 {
            if let Some(r) = rects.next().filter(|r| r.intersects(screen)) {
                top = top.max(r.bottom());
            }
        }
        if strut.bottom > 0 {
            if let Some(r) = rects.next().filter(|r| r.intersects(screen)) {
                bottom = bottom.min(r.y);
            }
        }
    }

    Geometry {
        x: left,
        y: top,
        width: (right - left).max(1) as u32,
        height: (bottom - top).max(1) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_panel_shrinks_its_screen_only() {
        let root = Geometry::new(0, 0, 3840, 1080);
        let left_screen = Geometry::new(0, 0, 1920, 1080);
        let right_screen = Geometry::new(1920, 0, 1920, 1080);
        let mut values = [0u32; 12];
        values[2] = 30; // top
        values[8] = 0;
        values[9] = 1919;
        let panel = Strut::from_partial(&values).unwrap();

        assert_eq!(workarea(&left_screen, &root, [&panel]), Geometry::new(0, 30, 1920, 1050));
        assert_eq!(workarea(&right_screen, &root, [&panel]), right_screen);
    }

    #[test]
    fn legacy_strut_spans_whole_edge() {
        let root = Geometry::new(0, 0, 1920, 1080);
        let dock = Strut::from_legacy(&[0, 0, 0, 40]).unwrap();
        let side = Strut::from_legacy(&[64, 0, 0, 0]).unwrap();
        assert_eq!(workarea(&root, &root, [&dock, &side]), Geometry::new(64, 0, 1856, 1040));
    }

    #[test]
    fn short_values_are_rejected() {
        assert!(Strut::from_partial(&[1, 2, 3]).is_none());
        assert!(Strut::from_legacy(&[1]).is_none());
        assert!(Strut::default().is_empty());
    }
}
