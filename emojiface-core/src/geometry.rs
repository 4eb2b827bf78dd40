//! Turn a detection record into where and how large an emoji should be drawn.

use crate::detection::Detection;
use crate::error::{OverlayError, ensure_finite};

/// Factors that map detector-input coordinates back to the base image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    pub const IDENTITY: Self = Self { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Center, size and roll of one face in base-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementGeometry {
    pub center_x: f32,
    pub center_y: f32,
    pub diameter: f32,
    pub angle_degrees: f32,
}

/// Emoji diameter for a box: the width for square boxes, moving towards the
/// diagonal as the box gets more elongated.
pub fn blended_diameter(width: f32, height: f32) -> f32 {
    let (w, h) = (f64::from(width), f64::from(height));
    let diagonal = w.hypot(h);
    let diff_ratio = (w - h).abs() / w.max(h);
    (w * (1.0 - diff_ratio) + diagonal * diff_ratio) as f32
}

/// Roll of the line from the left eye to the right eye, in degrees.
///
/// Positive angles are clockwise on screen (y grows downwards).
pub fn roll_angle_degrees(left_eye: (f32, f32), right_eye: (f32, f32)) -> f32 {
    let dx = f64::from(right_eye.0) - f64::from(left_eye.0);
    let dy = f64::from(right_eye.1) - f64::from(left_eye.1);
    dy.atan2(dx).to_degrees() as f32
}

/// Resolve the placement geometry of `detection` in base-image coordinates.
pub fn resolve_geometry(
    detection: &Detection,
    scale: ScaleFactors,
) -> Result<PlacementGeometry, OverlayError> {
    let center_x = ensure_finite("center x", detection.center_x * scale.x)?;
    let center_y = ensure_finite("center y", detection.center_y * scale.y)?;
    let width = ensure_finite("width", detection.width * scale.x)?;
    let height = ensure_finite("height", detection.height * scale.y)?;
    if width.max(height) <= 0.0 || width < 0.0 || height < 0.0 {
        return Err(OverlayError::DegenerateBox { width, height });
    }

    let left = detection.left_eye();
    let right = detection.right_eye();
    let left = (
        ensure_finite("left eye x", left.x * scale.x)?,
        ensure_finite("left eye y", left.y * scale.y)?,
    );
    let right = (
        ensure_finite("right eye x", right.x * scale.x)?,
        ensure_finite("right eye y", right.y * scale.y)?,
    );

    Ok(PlacementGeometry {
        center_x,
        center_y,
        diameter: blended_diameter(width, height),
        angle_degrees: roll_angle_degrees(left, right),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DETECTION_WIDTH;

    fn detection(w: f32, h: f32, left: (f32, f32), right: (f32, f32)) -> Detection {
        let mut row = [0.0f32; DETECTION_WIDTH];
        row[..5].copy_from_slice(&[50.0, 40.0, w, h, 0.9]);
        row[6] = left.0;
        row[7] = left.1;
        row[9] = right.0;
        row[10] = right.1;
        Detection::from_row(&row).unwrap()
    }

    #[test]
    fn square_box_uses_width() {
        assert!((blended_diameter(100.0, 100.0) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn elongated_box_blends_towards_diagonal() {
        // diff_ratio = 0.4, diagonal = sqrt(13600)
        let expected = 60.0 * 0.6 + 13600f32.sqrt() * 0.4;
        let d = blended_diameter(60.0, 100.0);
        assert!((d - expected).abs() < 1e-3);
        assert!((d - 82.65).abs() < 0.01);
    }

    #[test]
    fn eye_line_gives_roll() {
        assert!((roll_angle_degrees((0.0, 0.0), (10.0, 10.0)) - 45.0).abs() < 1e-4);
        assert!(roll_angle_degrees((0.0, 5.0), (10.0, 5.0)).abs() < 1e-6);
        assert!((roll_angle_degrees((10.0, 0.0), (0.0, 0.0)).abs() - 180.0).abs() < 1e-4);
    }

    #[test]
    fn scales_each_axis_independently() {
        let det = detection(20.0, 20.0, (0.0, 0.0), (10.0, 10.0));
        let geo = resolve_geometry(&det, ScaleFactors::new(2.0, 0.5)).expect("geometry");
        assert_eq!(geo.center_x, 100.0);
        assert_eq!(geo.center_y, 20.0);
        // 40 x 10 box
        assert!((geo.diameter - blended_diameter(40.0, 10.0)).abs() < 1e-4);
        // eyes (0,0) -> (20,5)
        assert!((geo.angle_degrees - 5f32.atan2(20.0).to_degrees()).abs() < 1e-4);
    }

    #[test]
    fn identity_scale_keeps_coordinates() {
        let det = detection(100.0, 100.0, (0.0, 0.0), (10.0, 10.0));
        let geo = resolve_geometry(&det, ScaleFactors::IDENTITY).unwrap();
        assert_eq!((geo.center_x, geo.center_y), (50.0, 40.0));
        assert!((geo.diameter - 100.0).abs() < 1e-4);
        assert!((geo.angle_degrees - 45.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_boxes_are_rejected() {
        let det = detection(0.0, 0.0, (0.0, 0.0), (1.0, 0.0));
        assert!(matches!(
            resolve_geometry(&det, ScaleFactors::IDENTITY),
            Err(OverlayError::DegenerateBox { .. })
        ));

        let det = detection(f32::NAN, 10.0, (0.0, 0.0), (1.0, 0.0));
        assert!(matches!(
            resolve_geometry(&det, ScaleFactors::IDENTITY),
            Err(OverlayError::NonFinite { .. })
        ));
    }
}
