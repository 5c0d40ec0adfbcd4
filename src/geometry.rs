//! Coordinate conversion.
//!
//! Stored icon positions use a top-left origin with y growing downward.
//! Consumers that lay out views with a bottom-left origin (y growing
//! upward) convert with the helpers below.  Both directions apply the same
//! reflection `y' = view_height - y - icon_height`, so converting twice is
//! the identity.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn reflect(p: Point, view_height: f64, icon_height: f64) -> Point {
    Point { x: p.x, y: view_height - p.y - icon_height }
}

/// Stored (top-left origin) point to a bottom-left-origin point.
pub fn to_bottom_left(stored: Point, view_height: f64, icon_height: f64) -> Point {
    reflect(stored, view_height, icon_height)
}

/// Bottom-left-origin point to the stored (top-left origin) form.
pub fn to_top_left(view: Point, view_height: f64, icon_height: f64) -> Point {
    reflect(view, view_height, icon_height)
}
