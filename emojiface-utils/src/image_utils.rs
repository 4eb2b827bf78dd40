use std::{borrow::Cow, io::Cursor, path::Path};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Decode an encoded image (PNG, JPEG, WebP, BMP) held in memory.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    anyhow::ensure!(!bytes.is_empty(), "image buffer is empty");
    image::load_from_memory(bytes).context("failed to decode image bytes")
}

/// Encode an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buffer.into_inner())
}

/// Shrink `image` so that neither side exceeds `max_side`, preserving aspect ratio.
///
/// Images already within the limit are borrowed unchanged. A `max_side` of zero
/// disables scaling.
pub fn downscale_to_limit(image: &DynamicImage, max_side: u32) -> Cow<'_, DynamicImage> {
    let (width, height) = (image.width(), image.height());
    if max_side == 0 || (width <= max_side && height <= max_side) {
        return Cow::Borrowed(image);
    }

    let factor = max_side as f32 / width.max(height) as f32;
    let scaled_w = ((width as f32 * factor) as u32).max(1);
    let scaled_h = ((height as f32 * factor) as u32).max(1);
    Cow::Owned(image.resize_exact(scaled_w, scaled_h, FilterType::Triangle))
}

/// Convert an RGB image into a BGR CHW array with raw 0..255 channel values.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32; // Blue
        array[(1, yi, xi)] = pixel[1] as f32; // Green
        array[(2, yi, xi)] = pixel[0] as f32; // Red
    }
    array
}

/// Scale factors that map coordinates in `target` back to `original`.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}
