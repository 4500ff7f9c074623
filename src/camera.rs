//! Pan/zoom transforms for the rendered view.
//!
//! Every function takes a camera by value and returns the new one; the session
//! controller owns the only live instance.

use crate::model::{Camera, Direction, PanSource};

/// Distance moved by one directional nudge, in world units.
pub const NUDGE_DISTANCE: f64 = 100.0;

impl Camera {
    pub fn new(x: f64, y: f64, zoom: f64) -> Option<Self> {
        if zoom.is_finite() && zoom > 0.0 {
            Some(Self { x, y, zoom })
        } else {
            None
        }
    }
}

pub fn pan(camera: Camera, dx: f64, dy: f64, source: PanSource) -> Camera {
    match source {
        PanSource::Wheel => Camera {
            x: camera.x - dx,
            y: camera.y - dy,
            ..camera
        },
        PanSource::Drag => Camera {
            x: camera.x + dx,
            y: camera.y + dy,
            ..camera
        },
    }
}

pub fn discrete_step(camera: Camera, direction: Direction) -> Camera {
    let (dx, dy) = match direction {
        Direction::Up => (0.0, -NUDGE_DISTANCE),
        Direction::Down => (0.0, NUDGE_DISTANCE),
        Direction::Left => (-NUDGE_DISTANCE, 0.0),
        Direction::Right => (NUDGE_DISTANCE, 0.0),
    };
    Camera {
        x: camera.x + dx,
        y: camera.y + dy,
        ..camera
    }
}
