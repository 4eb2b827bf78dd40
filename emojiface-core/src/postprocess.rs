use std::cmp::Ordering;

use anyhow::Result;
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};

use emojiface_utils::config::DetectionSettings;

use crate::detection::{Detection, KEYPOINT_COUNT, Keypoint};
use crate::preprocess::LetterboxMeta;

/// Values per candidate in the raw pose output: box (4), score (1), keypoints (5 × 3).
pub const POSE_CHANNELS: usize = 4 + 1 + KEYPOINT_COUNT * 3;

/// Pose output filtering parameters.
#[derive(Debug, Clone)]
pub struct PostprocessConfig {
    /// Minimum confidence for a candidate to be kept.
    pub score_threshold: f32,
    /// IoU above which the weaker of two boxes is suppressed.
    pub nms_threshold: f32,
    /// Maximum number of candidates kept after sorting by score (0 = unlimited).
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        DetectionSettings::default().into()
    }
}

impl From<DetectionSettings> for PostprocessConfig {
    fn from(settings: DetectionSettings) -> Self {
        PostprocessConfig {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        settings.clone().into()
    }
}

/// Decode raw pose output into detections in source-image coordinates.
///
/// Accepts `[1, 20, N]` (channels first, the usual YOLOv8 export), `[1, N, 20]` or
/// `[N, 20]`. Applies the score threshold, sorts by score, caps at `top_k`, runs NMS
/// and finally undoes the letterbox.
pub fn decode_pose_output(
    output: &Tensor,
    letterbox: &LetterboxMeta,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>> {
    let rows = candidate_rows(output)?;

    let mut detections = Vec::new();
    for row in rows.rows() {
        let score = row[4];
        if !score.is_finite() || score < config.score_threshold {
            continue;
        }
        let (cx, cy) = letterbox.to_source(row[0], row[1]);
        let width = letterbox.length_to_source(row[2]);
        let height = letterbox.length_to_source(row[3]);
        if width <= 0.0 || height <= 0.0 {
            continue;
        }

        let keypoint = |i: usize| {
            let base = 5 + i * 3;
            let (x, y) = letterbox.to_source(row[base], row[base + 1]);
            Keypoint {
                x,
                y,
                confidence: row[base + 2],
            }
        };

        detections.push(Detection {
            center_x: cx,
            center_y: cy,
            width,
            height,
            confidence: score,
            class_id: 0.0,
            keypoints: [keypoint(0), keypoint(1), keypoint(2), keypoint(3), keypoint(4)],
        });
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    if config.top_k > 0 && detections.len() > config.top_k {
        detections.truncate(config.top_k);
    }

    if config.nms_threshold > 0.0 && detections.len() > 1 {
        detections = non_max_suppression(detections, config.nms_threshold);
    }

    Ok(detections)
}

/// View the output as one row per candidate, transposing channel-first layouts.
fn candidate_rows(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("pose output is not f32: {e}"))?;

    let view = match output.shape() {
        [1, POSE_CHANNELS, n] | [POSE_CHANNELS, n] => {
            ArrayView2::from_shape((POSE_CHANNELS, *n), slice).map(|v| v.reversed_axes())
        }
        [1, n, POSE_CHANNELS] | [n, POSE_CHANNELS] => {
            ArrayView2::from_shape((*n, POSE_CHANNELS), slice)
        }
        other => anyhow::bail!(
            "pose output must have shape [1, {POSE_CHANNELS}, N] or [1, N, {POSE_CHANNELS}] (got {other:?})"
        ),
    };
    view.map_err(|_| anyhow::anyhow!("pose output data is not contiguous"))
}

fn non_max_suppression(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    let mut result: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections.drain(..) {
        let suppressed = result
            .iter()
            .any(|kept| detection.iou(kept) > threshold);
        if !suppressed {
            result.push(detection);
        }
    }
    result
}
