//! Hints Module
//!
//! ICCCM size hints (`WM_NORMAL_HINTS`), WM hints (`WM_HINTS`), Motif
//! decoration hints, and the size-hint resolver that turns a proposed
//! geometry into a legal one.

use tracing::trace;
use x11rb::protocol::xproto::Gravity;

use crate::shared::{Geometry, Insets};

bitflags::bitflags! {
    /// `WM_SIZE_HINTS.flags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SizeHintFlags: u32 {
        const US_POSITION  = 1 << 0;
        const US_SIZE      = 1 << 1;
        const P_POSITION   = 1 << 2;
        const P_SIZE       = 1 << 3;
        const P_MIN_SIZE   = 1 << 4;
        const P_MAX_SIZE   = 1 << 5;
        const P_RESIZE_INC = 1 << 6;
        const P_ASPECT     = 1 << 7;
        const P_BASE_SIZE  = 1 << 8;
        const P_WIN_GRAVITY = 1 << 9;
    }
}

/// Aspect ratio as sent on the wire (numerator / denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aspect {
    pub num: u32,
    pub den: u32,
}

impl Aspect {
    fn ratio(&self) -> Option<f64> {
        (self.den != 0).then(|| self.num as f64 / self.den as f64)
    }
}

/// Parsed `WM_NORMAL_HINTS`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeHints {
    pub flags: SizeHintFlags,
    pub min_size: Option<(u32, u32)>,
    pub max_size: Option<(u32, u32)>,
    pub base_size: Option<(u32, u32)>,
    pub increment: Option<(u32, u32)>,
    pub aspect: Option<(Aspect, Aspect)>,
    pub win_gravity: Option<Gravity>,
    pub user_position: bool,
    pub program_position: bool,
}

impl SizeHints {
    /// Parse the raw CARD32 list. Pre-ICCCM clients send 15 values (no base
    /// size or gravity), which is accepted.
    pub fn from_raw(values: &[u32]) -> Option<Self> {
        if values.len() < 15 {
            return None;
        }
        let flags = SizeHintFlags::from_bits_truncate(values[0]);
        let pair = |flag: SizeHintFlags, a: usize, b: usize| -> Option<(u32, u32)> {
            (flags.contains(flag) && values.len() > b).then(|| (values[a], values[b]))
        };
        let aspect = flags.contains(SizeHintFlags::P_ASPECT).then(|| {
            (
                Aspect { num: values[11], den: values[12] },
                Aspect { num: values[13], den: values[14] },
            )
        });
        let win_gravity = if flags.contains(SizeHintFlags::P_WIN_GRAVITY) && values.len() > 17 {
            Some(Gravity::from(values[17] as u8))
        } else {
            None
        };
        Some(Self {
            flags,
            min_size: pair(SizeHintFlags::P_MIN_SIZE, 5, 6),
            max_size: pair(SizeHintFlags::P_MAX_SIZE, 7, 8),
            increment: pair(SizeHintFlags::P_RESIZE_INC, 9, 10),
            aspect,
            base_size: pair(SizeHintFlags::P_BASE_SIZE, 15, 16),
            win_gravity,
            user_position: flags.contains(SizeHintFlags::US_POSITION),
            program_position: flags.contains(SizeHintFlags::P_POSITION),
        })
    }

    /// Gravity used for configure requests and border changes (NorthWest when unset)
    pub fn gravity(&self) -> Gravity {
        self.win_gravity.unwrap_or(Gravity::NORTH_WEST)
    }
}

/// Parsed `WM_HINTS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WmHints {
    pub input: Option<bool>,
    pub initial_state: Option<u32>,
    pub icon_pixmap: Option<u32>,
    pub icon_mask: Option<u32>,
    pub window_group: Option<u32>,
    pub urgent: bool,
}

const WM_HINT_INPUT: u32 = 1 << 0;
const WM_HINT_STATE: u32 = 1 << 1;
const WM_HINT_ICON_PIXMAP: u32 = 1 << 2;
const WM_HINT_ICON_MASK: u32 = 1 << 5;
const WM_HINT_WINDOW_GROUP: u32 = 1 << 6;
const WM_HINT_URGENCY: u32 = 1 << 8;

/// `WM_STATE` values (ICCCM 4.1.3.1)
pub const WM_STATE_WITHDRAWN: u32 = 0;
pub const WM_STATE_NORMAL: u32 = 1;
pub const WM_STATE_ICONIC: u32 = 3;

impl WmHints {
    /// Pre-ICCCM clients send 8 values (no window group), which is accepted.
    pub fn from_raw(values: &[u32]) -> Option<Self> {
        if values.len() < 8 {
            return None;
        }
        let flags = values[0];
        let opt = |bit: u32, v: u32| (flags & bit != 0 && v != 0).then_some(v);
        Some(Self {
            input: (flags & WM_HINT_INPUT != 0).then(|| values[1] != 0),
            initial_state: (flags & WM_HINT_STATE != 0).then_some(values[2]),
            icon_pixmap: opt(WM_HINT_ICON_PIXMAP, values[3]),
            icon_mask: opt(WM_HINT_ICON_MASK, values[7]),
            window_group: values.get(8).and_then(|v| opt(WM_HINT_WINDOW_GROUP, *v)),
            urgent: flags & WM_HINT_URGENCY != 0,
        })
    }

    /// Encode back to the wire layout, used to clear urgency on focus
    pub fn to_raw(&self) -> [u32; 9] {
        let mut raw = [0u32; 9];
        if let Some(input) = self.input {
            raw[0] |= WM_HINT_INPUT;
            raw[1] = input as u32;
        }
        if let Some(state) = self.initial_state {
            raw[0] |= WM_HINT_STATE;
            raw[2] = state;
        }
        if let Some(pixmap) = self.icon_pixmap {
            raw[0] |= WM_HINT_ICON_PIXMAP;
            raw[3] = pixmap;
        }
        if let Some(mask) = self.icon_mask {
            raw[0] |= WM_HINT_ICON_MASK;
            raw[7] = mask;
        }
        if let Some(group) = self.window_group {
            raw[0] |= WM_HINT_WINDOW_GROUP;
            raw[8] = group;
        }
        if self.urgent {
            raw[0] |= WM_HINT_URGENCY;
        }
        raw
    }
}

/// `_MOTIF_WM_HINTS`, only the decoration part is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotifHints {
    pub decorations: Option<u32>,
}

const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
const MWM_DECOR_ALL: u32 = 1 << 0;

impl MotifHints {
    pub fn from_raw(values: &[u32]) -> Option<Self> {
        if values.len() < 3 {
            return None;
        }
        Some(Self {
            decorations: (values[0] & MWM_HINTS_DECORATIONS != 0).then_some(values[2]),
        })
    }

    /// False only when the client explicitly asked for no decorations
    pub fn wants_decorations(&self) -> bool {
        match self.decorations {
            Some(d) => d != 0 || d & MWM_DECOR_ALL != 0,
            None => true,
        }
    }
}

/// Bounds on one inner dimension, taken from the size hints
#[derive(Debug, Clone, Copy)]
struct Axis {
    base: i64,
    min: i64,
    max: i64,
    inc: i64,
}

impl Axis {
    fn clamp(&self, value: i64) -> i64 {
        value.min(self.max).max(self.min)
    }

    fn on_grid(&self, value: i64) -> bool {
        self.inc <= 0 || value <= self.base || (value - self.base) % self.inc == 0
    }

    /// Round down onto the increment grid, or up one step when down would
    /// fall below the minimum. Left alone when no grid value fits.
    fn snap(&self, value: i64) -> i64 {
        if self.on_grid(value) {
            return value;
        }
        let down = value - (value - self.base) % self.inc;
        if down >= self.min {
            down
        } else if down + self.inc <= self.max {
            down + self.inc
        } else {
            value
        }
    }

    /// A smaller legal value for `current`, if `target` leads to one
    fn shrink_to(&self, current: i64, target: i64) -> i64 {
        let candidate = self.snap(target);
        if candidate < current && candidate >= self.min && self.on_grid(candidate) {
            candidate
        } else {
            current
        }
    }
}

/// One pass of min/max, increments and aspect over an inner size
fn constrain(hints: &SizeHints, w: &Axis, h: &Axis, (width, height): (i64, i64)) -> (i64, i64) {
    let mut width = w.snap(w.clamp(width));
    let mut height = h.snap(h.clamp(height));

    let Some((min_aspect, max_aspect)) = hints.aspect else {
        return (width, height);
    };
    let (Some(min), Some(max)) = (min_aspect.ratio(), max_aspect.ratio()) else {
        return (width, height);
    };
    if min <= 0.0 || max <= 0.0 || width <= w.base || height <= h.base {
        return (width, height);
    }
    let dx = width - w.base;
    let dy = height - h.base;
    // Within half a pixel of the ratio counts as matching it.
    let widest = (dy as f64 * max + 0.5).trunc() as i64;
    let tallest = (dx as f64 / min + 0.5).trunc() as i64;
    if dx > widest {
        width = w.shrink_to(width, widest + w.base);
    } else if dy > tallest {
        height = h.shrink_to(height, tallest + h.base);
    }
    (width, height)
}

/// Resolve a proposed frame geometry against the client's size hints.
///
/// `insets` are the decoration sizes; hints apply to the inner window only.
/// The result is a fixed point: feeding it back in returns it unchanged.
/// Passes repeat until nothing moves. After the first pass only the aspect
/// step changes anything, and it only ever shrinks onto the grid.
pub fn apply_size_hints(
    hints: &SizeHints,
    geometry: Geometry,
    insets: &Insets,
    fullscreen: bool,
) -> Geometry {
    if fullscreen {
        return geometry;
    }

    let (base_w, base_h) = hints
        .base_size
        .or(hints.min_size)
        .map(|(w, h)| (w as i64, h as i64))
        .unwrap_or((0, 0));
    let (min_w, min_h) = hints
        .min_size
        .or(hints.base_size)
        .map(|(w, h)| (w as i64, h as i64))
        .unwrap_or((0, 0));
    let limit = |v: u32| if v > 0 { v as i64 } else { i64::MAX };
    let (max_w, max_h) = hints
        .max_size
        .map(|(w, h)| (limit(w), limit(h)))
        .unwrap_or((i64::MAX, i64::MAX));
    let (inc_w, inc_h) = hints
        .increment
        .filter(|(w, h)| *w > 0 && *h > 0)
        .map(|(w, h)| (w as i64, h as i64))
        .unwrap_or((0, 0));

    let w = Axis { base: base_w, min: min_w, max: max_w, inc: inc_w };
    let h = Axis { base: base_h, min: min_h, max: max_h, inc: inc_h };

    let mut size = (
        geometry.width as i64 - insets.horizontal() as i64,
        geometry.height as i64 - insets.vertical() as i64,
    );
    loop {
        let next = constrain(hints, &w, &h, size);
        if next == size {
            break;
        }
        size = next;
    }

    let width = size.0.max(1) as u32;
    let height = size.1.max(1) as u32;
    trace!("size hints resolved inner size to {}x{}", width, height);

    Geometry {
        x: geometry.x,
        y: geometry.y,
        width: width + insets.horizontal(),
        height: height + insets.vertical(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspect_4_3() -> SizeHints {
        SizeHints {
            base_size: Some((16, 16)),
            aspect: Some((Aspect { num: 4, den: 3 }, Aspect { num: 4, den: 3 })),
            ..SizeHints::default()
        }
    }

    #[test]
    fn no_hints_is_identity() {
        let g = Geometry::new(100, 100, 640, 480);
        assert_eq!(apply_size_hints(&SizeHints::default(), g, &Insets::ZERO, false), g);
    }

    #[test]
    fn fullscreen_is_untouched() {
        let hints = SizeHints {
            max_size: Some((10, 10)),
            ..SizeHints::default()
        };
        let g = Geometry::new(0, 0, 1920, 1080);
        assert_eq!(apply_size_hints(&hints, g, &Insets::ZERO, true), g);
    }

    #[test]
    fn aspect_ratio_is_enforced() {
        let g = apply_size_hints(&aspect_4_3(), Geometry::new(0, 0, 800, 401), &Insets::ZERO, false);
        assert_eq!((g.width, g.height), (529, 401));
        let ratio = (g.width - 16) as f64 / (g.height - 16) as f64;
        assert!((ratio - 4.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn aspect_ratio_is_idempotent() {
        let hints = aspect_4_3();
        let once = apply_size_hints(&hints, Geometry::new(0, 0, 800, 401), &Insets::ZERO, false);
        let twice = apply_size_hints(&hints, once, &Insets::ZERO, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn combined_hints_reach_a_fixed_point() {
        let aspect = |num, den| Some((Aspect { num, den }, Aspect { num, den }));
        let cases = [
            (
                "aspect and increments",
                SizeHints {
                    aspect: aspect(4, 3),
                    increment: Some((5, 5)),
                    ..SizeHints::default()
                },
                (800, 401),
                (520, 390),
            ),
            (
                "aspect and max",
                SizeHints {
                    aspect: aspect(1, 1),
                    max_size: Some((200, 1000)),
                    ..SizeHints::default()
                },
                (500, 300),
                (200, 200),
            ),
            (
                "aspect, min and increments",
                SizeHints {
                    aspect: aspect(2, 1),
                    min_size: Some((100, 100)),
                    increment: Some((10, 10)),
                    ..SizeHints::default()
                },
                (305, 180),
                (260, 180),
            ),
        ];
        for (name, hints, (width, height), expected) in cases {
            let once = apply_size_hints(&hints, Geometry::new(0, 0, width, height), &Insets::ZERO, false);
            assert_eq!((once.width, once.height), expected, "{}", name);
            let twice = apply_size_hints(&hints, once, &Insets::ZERO, false);
            assert_eq!(once, twice, "{}", name);
        }
    }

    #[test]
    fn conflicting_min_and_max_settle() {
        let hints = SizeHints {
            min_size: Some((300, 300)),
            max_size: Some((200, 200)),
            increment: Some((7, 7)),
            aspect: Some((Aspect { num: 1, den: 2 }, Aspect { num: 1, den: 2 })),
            ..SizeHints::default()
        };
        let once = apply_size_hints(&hints, Geometry::new(0, 0, 640, 480), &Insets::ZERO, false);
        assert_eq!((once.width, once.height), (300, 300));
        assert_eq!(apply_size_hints(&hints, once, &Insets::ZERO, false), once);
    }

    #[test]
    fn tall_request_shrinks_height() {
        let g = apply_size_hints(&aspect_4_3(), Geometry::new(0, 0, 416, 800), &Insets::ZERO, false);
        // dx = 400 -> dy = 300
        assert_eq!((g.width, g.height), (416, 316));
    }

    #[test]
    fn increments_snap_to_grid() {
        let hints = SizeHints {
            base_size: Some((4, 4)),
            increment: Some((10, 20)),
            ..SizeHints::default()
        };
        let g = apply_size_hints(&hints, Geometry::new(0, 0, 57, 93), &Insets::ZERO, false);
        assert_eq!((g.width, g.height), (54, 84));
        assert_eq!(apply_size_hints(&hints, g, &Insets::ZERO, false), g);
    }

    #[test]
    fn increments_below_base_do_not_underflow() {
        let hints = SizeHints {
            base_size: Some((100, 100)),
            min_size: Some((10, 10)),
            increment: Some((7, 7)),
            ..SizeHints::default()
        };
        let g = apply_size_hints(&hints, Geometry::new(0, 0, 50, 50), &Insets::ZERO, false);
        assert_eq!((g.width, g.height), (50, 50));
    }

    #[test]
    fn min_and_max_clamp() {
        let hints = SizeHints {
            min_size: Some((200, 100)),
            max_size: Some((300, 0)),
            ..SizeHints::default()
        };
        let g = apply_size_hints(&hints, Geometry::new(0, 0, 500, 50), &Insets::ZERO, false);
        assert_eq!((g.width, g.height), (300, 100));
    }

    #[test]
    fn insets_are_excluded_from_hints() {
        let hints = SizeHints {
            increment: Some((10, 10)),
            ..SizeHints::default()
        };
        let insets = Insets::new(20, 0, 0, 0);
        let g = apply_size_hints(&hints, Geometry::new(0, 0, 105, 125), &insets, false);
        // inner 105x105 -> 100x100, plus the titlebar
        assert_eq!((g.width, g.height), (100, 120));
        assert_eq!(apply_size_hints(&hints, g, &insets, false), g);
    }

    #[test]
    fn parses_raw_size_hints() {
        let mut raw = [0u32; 18];
        raw[0] = (SizeHintFlags::P_MIN_SIZE | SizeHintFlags::P_WIN_GRAVITY).bits();
        raw[5] = 40;
        raw[6] = 30;
        raw[17] = 5; // Center
        let hints = SizeHints::from_raw(&raw).unwrap();
        assert_eq!(hints.min_size, Some((40, 30)));
        assert_eq!(hints.max_size, None);
        assert_eq!(hints.gravity(), Gravity::CENTER);
    }

    #[test]
    fn short_size_hints_are_rejected() {
        assert!(SizeHints::from_raw(&[0; 4]).is_none());
    }

    #[test]
    fn wm_hints_urgency_and_input() {
        let mut raw = [0u32; 9];
        raw[0] = WM_HINT_INPUT | WM_HINT_URGENCY;
        raw[1] = 0;
        let hints = WmHints::from_raw(&raw).unwrap();
        assert!(hints.urgent);
        assert_eq!(hints.input, Some(false));
        assert_eq!(WmHints::from_raw(&hints.to_raw()), Some(hints));
    }

    #[test]
    fn wm_hints_without_window_group() {
        let mut raw = [0u32; 8];
        raw[0] = WM_HINT_STATE | WM_HINT_WINDOW_GROUP;
        raw[2] = WM_STATE_ICONIC;
        let hints = WmHints::from_raw(&raw).unwrap();
        assert_eq!(hints.initial_state, Some(WM_STATE_ICONIC));
        assert_eq!(hints.window_group, None);
        assert!(WmHints::from_raw(&raw[..7]).is_none());
    }

    #[test]
    fn motif_no_decorations() {
        let hints = MotifHints::from_raw(&[MWM_HINTS_DECORATIONS, 0, 0, 0, 0]).unwrap();
        assert!(!hints.wants_decorations());
        assert!(MotifHints::default().wants_decorations());
    }
}
