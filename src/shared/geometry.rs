//! Geometry primitives shared by the window manager core
//!
//! Rectangles are in root-window coordinates. Sizes are unsigned, positions signed.

/// Window geometry (position + size, border excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Squared Euclidean distance from a point to the closest point of this rectangle.
    ///
    /// Zero when the point lies inside.
    pub fn distance_sq_to(&self, x: i32, y: i32) -> i64 {
        let dx = if x < self.x {
            (self.x - x) as i64
        } else if x >= self.right() {
            (x - self.right() + 1) as i64
        } else {
            0
        };
        let dy = if y < self.y {
            (self.y - y) as i64
        } else if y >= self.bottom() {
            (y - self.bottom() + 1) as i64
        } else {
            0
        };
        dx * dx + dy * dy
    }

    /// Shrink by per-edge insets. Sizes saturate at zero.
    pub fn shrink(&self, insets: &Insets) -> Geometry {
        Geometry {
            x: self.x + insets.left as i32,
            y: self.y + insets.top as i32,
            width: self.width.saturating_sub(insets.horizontal()),
            height: self.height.saturating_sub(insets.vertical()),
        }
    }
}

/// Per-edge sizes (decoration titlebars, frame extents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Insets {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Insets {
    pub const ZERO: Insets = Insets { top: 0, right: 0, bottom: 0, left: 0 };

    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self { top, right, bottom, left }
    }

    pub fn horizontal(&self) -> u32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> u32 {
        self.top + self.bottom
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_inside() {
        let g = Geometry::new(0, 0, 100, 100);
        assert_eq!(g.distance_sq_to(50, 50), 0);
        assert_eq!(g.distance_sq_to(0, 0), 0);
    }

    #[test]
    fn distance_outside_corner() {
        let g = Geometry::new(100, 100, 50, 50);
        // (97, 96) -> dx 3, dy 4
        assert_eq!(g.distance_sq_to(97, 96), 25);
    }

    #[test]
    fn shrink_saturates() {
        let g = Geometry::new(0, 0, 10, 10);
        let s = g.shrink(&Insets::new(8, 0, 8, 0));
        assert_eq!(s.height, 0);
        assert_eq!(s.y, 8);
    }

    #[test]
    fn intersects_edges_exclusive() {
        let a = Geometry::new(0, 0, 100, 100);
        assert!(!a.intersects(&Geometry::new(100, 0, 10, 10)));
        assert!(a.intersects(&Geometry::new(99, 99, 10, 10)));
    }
}
