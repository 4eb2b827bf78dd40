//! Letterbox preprocessing for the pose model.
//!
//! The image is resized to fit the model input without enlarging or cropping,
//! centered on a grey canvas, converted to BGR CHW and scaled into `0..1`.

use anyhow::Result;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, imageops, imageops::FilterType};
use tract_onnx::prelude::Tensor;

use emojiface_utils::{config::InputDimensions, rgb_to_bgr_chw, telemetry::timing_guard};

/// Grey used for the letterbox border.
pub const PAD_VALUE: u8 = 114;

/// Model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

impl From<&InputDimensions> for InputSize {
    fn from(dims: &InputDimensions) -> Self {
        Self::new(dims.model_width, dims.model_height)
    }
}

/// Where the source image ended up inside the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMeta {
    /// Resized size divided by original size (same on both axes).
    pub ratio: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub original_size: (u32, u32),
}

impl LetterboxMeta {
    /// Map a point from model-input space back to the source image.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.ratio, (y - self.pad_y) / self.ratio)
    }

    /// Map a length from model-input space back to the source image.
    pub fn length_to_source(&self, length: f32) -> f32 {
        length / self.ratio
    }
}

/// Model-ready tensor plus the mapping needed to undo the letterbox.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub tensor: Tensor,
    pub letterbox: LetterboxMeta,
}

/// Letterbox `image` into a `[1, 3, H, W]` BGR tensor with values in `0..1`.
pub fn letterbox_image(image: &DynamicImage, input_size: InputSize) -> Result<PreprocessOutput> {
    let _guard = timing_guard("emojiface_core::letterbox", log::Level::Trace);
    let (input_w, input_h) = (input_size.width, input_size.height);
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );
    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );

    let ratio = (input_w as f32 / orig_w as f32).min(input_h as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * ratio).round() as u32).clamp(1, input_w);
    let new_h = ((orig_h as f32 * ratio).round() as u32).clamp(1, input_h);
    let pad_x = (input_w - new_w) / 2;
    let pad_y = (input_h - new_h) / 2;

    let resized = if (new_w, new_h) == (orig_w, orig_h) {
        image.to_rgb8()
    } else {
        image
            .resize_exact(new_w, new_h, FilterType::Triangle)
            .to_rgb8()
    };
    let mut canvas = RgbImage::from_pixel(input_w, input_h, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));

    let mut chw = rgb_to_bgr_chw(&canvas);
    chw.mapv_inplace(|v| v / 255.0);
    let shape = [1usize, 3, input_h as usize, input_w as usize];
    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&shape, &data)
        .map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))?;

    Ok(PreprocessOutput {
        tensor,
        letterbox: LetterboxMeta {
            ratio,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            original_size: (orig_w, orig_h),
        },
    })
}
