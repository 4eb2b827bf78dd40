use std::path::Path;

use anyhow::Result;
use image::DynamicImage;

use emojiface_utils::{config::AppSettings, config::DEFAULT_MODEL_PATH, decode_image, timing_guard};

use crate::detection::{Detection, DetectionSource};
use crate::model::PoseModel;
use crate::postprocess::{PostprocessConfig, decode_pose_output};
use crate::preprocess::{InputSize, letterbox_image};

/// Face pose detector backed by a YOLOv8-face ONNX model.
///
/// Detections are returned in the pixel space of the image passed in.
#[derive(Debug)]
pub struct PoseDetector {
    model: PoseModel,
    postprocess: PostprocessConfig,
}

impl PoseDetector {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: InputSize,
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        let model = PoseModel::load(model_path, input_size)?;
        Ok(Self { model, postprocess })
    }

    /// Build a detector from application settings.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let model_path = settings.model_path.as_deref().unwrap_or(DEFAULT_MODEL_PATH);
        Self::new(
            model_path,
            InputSize::from(&settings.input),
            PostprocessConfig::from(&settings.detection),
        )
    }

    /// Run detection on a decoded image.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let _guard = timing_guard("emojiface_core::detect_image", log::Level::Debug);
        let prep = letterbox_image(image, self.model.input_size())?;

        let raw = {
            let _guard = timing_guard("emojiface_core::onnx_inference", log::Level::Debug);
            self.model.run(prep.tensor)?
        };

        let _guard = timing_guard("emojiface_core::postprocess", log::Level::Debug);
        decode_pose_output(&raw, &prep.letterbox, &self.postprocess)
    }
}

impl DetectionSource for PoseDetector {
    fn detect(&self, image_bytes: &[u8]) -> Result<Vec<Detection>> {
        let image = decode_image(image_bytes)?;
        self.detect_image(&image)
    }
}
