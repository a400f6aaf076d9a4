//! Window gravity
//!
//! When a border or titlebar is inserted around a window, the frame grows.
//! The window's gravity decides which point of it stays fixed on screen.

use x11rb::protocol::xproto::Gravity;

/// Offset to apply to a frame position so the gravity's anchor point stays put.
///
/// `before` is the size change on the leading edges (left/top), `after` on
/// the trailing ones (right/bottom). Positive values mean the frame grew.
pub fn translate_for_gravity(gravity: Gravity, before: (i32, i32), after: (i32, i32)) -> (i32, i32) {
    let change_width = before.0 + after.0;
    let change_height = before.1 + after.1;

    match gravity {
        Gravity::NORTH => (-change_width / 2, 0),
        Gravity::NORTH_EAST => (-change_width, 0),
        Gravity::WEST => (0, -change_height / 2),
        Gravity::CENTER => (-change_width / 2, -change_height / 2),
        Gravity::EAST => (-change_width, -change_height / 2),
        Gravity::SOUTH_WEST => (0, -change_height),
        Gravity::SOUTH => (-change_width / 2, -change_height),
        Gravity::SOUTH_EAST => (-change_width, -change_height),
        Gravity::STATIC => (-before.0, -before.1),
        // NorthWest, and Unmap which the server treats the same for frames
        _ => (0, 0),
    }
}

/// Offset caused by changing the border width from `old` to `new`.
pub fn border_change(gravity: Gravity, old: u32, new: u32) -> (i32, i32) {
    let delta = new as i32 - old as i32;
    translate_for_gravity(gravity, (delta, delta), (delta, delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_west_does_not_move() {
        assert_eq!(translate_for_gravity(Gravity::NORTH_WEST, (4, 20), (4, 4)), (0, 0));
        assert_eq!(translate_for_gravity(Gravity::WIN_UNMAP, (4, 20), (4, 4)), (0, 0));
    }

    #[test]
    fn corners_and_edges() {
        let before = (2, 10);
        let after = (2, 2);
        assert_eq!(translate_for_gravity(Gravity::NORTH, before, after), (-2, 0));
        assert_eq!(translate_for_gravity(Gravity::NORTH_EAST, before, after), (-4, 0));
        assert_eq!(translate_for_gravity(Gravity::WEST, before, after), (0, -6));
        assert_eq!(translate_for_gravity(Gravity::CENTER, before, after), (-2, -6));
        assert_eq!(translate_for_gravity(Gravity::EAST, before, after), (-4, -6));
        assert_eq!(translate_for_gravity(Gravity::SOUTH_WEST, before, after), (0, -12));
        assert_eq!(translate_for_gravity(Gravity::SOUTH, before, after), (-2, -12));
        assert_eq!(translate_for_gravity(Gravity::SOUTH_EAST, before, after), (-4, -12));
    }

    #[test]
    fn static_anchors_to_the_client_origin() {
        // Titlebar of 20 on top, nothing elsewhere: the client must not move,
        // so the frame moves up by exactly the leading change.
        assert_eq!(translate_for_gravity(Gravity::STATIC, (0, 20), (0, 0)), (0, -20));
        assert_eq!(translate_for_gravity(Gravity::STATIC, (3, 3), (3, 3)), (-3, -3));
    }

    #[test]
    fn shrinking_border_moves_back() {
        assert_eq!(border_change(Gravity::SOUTH_EAST, 0, 2), (-4, -4));
        assert_eq!(border_change(Gravity::SOUTH_EAST, 2, 0), (4, 4));
        assert_eq!(border_change(Gravity::NORTH_WEST, 0, 2), (0, 0));
    }
}
