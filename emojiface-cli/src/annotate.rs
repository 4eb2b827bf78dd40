//! Debug annotation of placements.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use emojiface_core::Placement;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

/// Draw each placement's circle, center and roll direction on a copy of `base`.
pub fn annotate_placements(base: &RgbaImage, placements: &[Placement]) -> RgbaImage {
    let mut image = base.clone();
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return image;
    }

    let circle_color = Rgba([255, 0, 0, 255]);
    let center_color = Rgba([0, 255, 0, 255]);

    for placement in placements {
        let radius = (placement.diameter / 2.0).round().max(1.0) as i32;
        let center = (
            placement.center_x.round() as i32,
            placement.center_y.round() as i32,
        );
        draw_hollow_circle_mut(&mut image, center, radius, circle_color);

        // Clockwise roll in image coordinates: positive angles tip the line downward.
        let theta = placement.angle_degrees.to_radians();
        let half = placement.diameter / 2.0;
        let (dx, dy) = (theta.cos() * half, theta.sin() * half);
        draw_line_segment_mut(
            &mut image,
            (placement.center_x - dx, placement.center_y - dy),
            (placement.center_x + dx, placement.center_y + dy),
            circle_color,
        );

        let cx = clamp_to_i32(placement.center_x, img_w);
        let cy = clamp_to_i32(placement.center_y, img_h);
        draw_filled_circle_mut(&mut image, (cx, cy), 2, center_color);
    }
    image
}

/// Annotate and save to `output_path`, creating parent directories as needed.
pub fn save_annotated(
    base: &RgbaImage,
    placements: &[Placement],
    output_path: &Path,
) -> Result<PathBuf> {
    let image = annotate_placements(base, placements);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    image
        .save(output_path)
        .with_context(|| format!("failed to save annotated image {}", output_path.display()))?;

    Ok(output_path.to_path_buf())
}

/// Clamp a floating-point coordinate to a valid integer pixel index.
#[inline]
fn clamp_to_i32(value: f32, max_extent: u32) -> i32 {
    if max_extent == 0 {
        return 0;
    }
    let max = (max_extent - 1) as f32;
    value.clamp(0.0, max).round() as i32
}
