//! Face detection to emoji overlay pipeline.
//!
//! Detection records from a [`DetectionSource`] are turned into placements
//! (center, diameter, roll), each placement gets a symbol from an
//! [`EmojiAssigner`], and the [`OverlayRenderer`] composites the whole list onto
//! a copy of the base image. [`EmojiSession`] ties these together and keeps the
//! list editable.

/// Placements and the editable annotation list.
pub mod annotation;
/// Emoji assignment from a refilling pool.
pub mod assign;
/// Detection records and detection sources.
pub mod detection;
/// YOLOv8-face pose detector.
pub mod detector;
/// Library error type.
pub mod error;
/// Placement geometry from detection records.
pub mod geometry;
/// ONNX model loading and execution.
pub mod model;
/// Pose output decoding (score filter, NMS, letterbox undo).
pub mod postprocess;
/// Letterbox preprocessing.
pub mod preprocess;
/// Overlay rendering.
pub mod render;
/// Session controller with background detection.
pub mod session;

pub use annotation::{AnnotationList, EditOutcome, Placement};
pub use assign::EmojiAssigner;
pub use detection::{
    DETECTION_WIDTH, Detection, DetectionSource, FnSource, KEYPOINT_COUNT, Keypoint,
    RecordedDetections, source_fn,
};
pub use detector::PoseDetector;
pub use error::OverlayError;
pub use geometry::{
    PlacementGeometry, ScaleFactors, blended_diameter, resolve_geometry, roll_angle_degrees,
};
pub use model::PoseModel;
pub use postprocess::{PostprocessConfig, decode_pose_output};
pub use preprocess::{InputSize, LetterboxMeta, PreprocessOutput, letterbox_image};
pub use render::{FontGlyphs, GlyphInk, GlyphSource, OverlayRenderer, ShapedSymbol};
pub use session::{DetectionJob, EmojiSession, SessionEvent, SessionOptions};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
