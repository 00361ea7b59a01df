//! Exclusion zones: normalized rectangles where detections are ignored

use serde::Deserialize;

use crate::ConfigError;

/// A normalized rectangle (fractions of frame width/height), so the same
/// zone works across differing camera and model resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "[f32; 4]")]
pub struct Zone {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl Zone {
    /// Validated construction; all values must lie in [0, 1] with
    /// left < right and top < bottom.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self, ConfigError> {
        for v in [left, top, right, bottom] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::InvalidZone(format!(
                    "coordinate {v} outside [0, 1] in ({left}, {top}, {right}, {bottom})"
                )));
            }
        }
        if left >= right || top >= bottom {
            return Err(ConfigError::InvalidZone(format!(
                "degenerate rectangle ({left}, {top}, {right}, {bottom})"
            )));
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Zone corners scaled to absolute pixels for the given frame size.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (f32, f32, f32, f32) {
        (
            self.left * frame_width as f32,
            self.top * frame_height as f32,
            self.right * frame_width as f32,
            self.bottom * frame_height as f32,
        )
    }

    /// Strict containment: points exactly on a boundary are NOT inside.
    pub fn contains(&self, x: f32, y: f32, frame_width: u32, frame_height: u32) -> bool {
        let (left, top, right, bottom) = self.to_pixels(frame_width, frame_height);
        left < x && x < right && top < y && y < bottom
    }
}

impl TryFrom<[f32; 4]> for Zone {
    type Error = ConfigError;

    fn try_from(v: [f32; 4]) -> Result<Self, Self::Error> {
        Zone::new(v[0], v[1], v[2], v[3])
    }
}

/// True when the anchor point falls inside any of the zones.
pub fn in_any_zone(point: (f32, f32), zones: &[Zone], frame_width: u32, frame_height: u32) -> bool {
    zones
        .iter()
        .any(|zone| zone.contains(point.0, point.1, frame_width, frame_height))
}
