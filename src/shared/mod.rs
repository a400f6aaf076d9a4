//! Types shared across the window manager modules

pub mod geometry;

pub use geometry::{Geometry, Insets};
