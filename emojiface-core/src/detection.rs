//! Detection records and the sources that produce them.
//!
//! A detection record is a fixed-width row of 21 floats:
//!
//! | index | meaning |
//! |-------|---------|
//! | 0..4  | box center x, center y, width, height |
//! | 4     | confidence |
//! | 5     | class id |
//! | 6..21 | five keypoints as (x, y, confidence): left eye, right eye, nose, left mouth corner, right mouth corner |
//!
//! Coordinates are in the pixel space of the image handed to the source.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::OverlayError;

/// Number of values in one detection record.
pub const DETECTION_WIDTH: usize = 21;
/// Number of keypoints carried by a record.
pub const KEYPOINT_COUNT: usize = 5;

/// A facial keypoint in detector-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// One decoded detection record.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: f32,
    /// Left eye, right eye, nose, left mouth corner, right mouth corner.
    pub keypoints: [Keypoint; KEYPOINT_COUNT],
}

impl Detection {
    /// Parse a record. Values past index 20 are ignored.
    pub fn from_row(row: &[f32]) -> Result<Self, OverlayError> {
        if row.len() < DETECTION_WIDTH {
            return Err(OverlayError::MalformedRecord(row.len()));
        }
        let keypoint = |i: usize| {
            let base = 6 + i * 3;
            Keypoint {
                x: row[base],
                y: row[base + 1],
                confidence: row[base + 2],
            }
        };
        Ok(Self {
            center_x: row[0],
            center_y: row[1],
            width: row[2],
            height: row[3],
            confidence: row[4],
            class_id: row[5],
            keypoints: [keypoint(0), keypoint(1), keypoint(2), keypoint(3), keypoint(4)],
        })
    }

    /// Flatten back into the record layout.
    pub fn to_row(&self) -> [f32; DETECTION_WIDTH] {
        let mut row = [0.0; DETECTION_WIDTH];
        row[..6].copy_from_slice(&[
            self.center_x,
            self.center_y,
            self.width,
            self.height,
            self.confidence,
            self.class_id,
        ]);
        for (i, kp) in self.keypoints.iter().enumerate() {
            let base = 6 + i * 3;
            row[base] = kp.x;
            row[base + 1] = kp.y;
            row[base + 2] = kp.confidence;
        }
        row
    }

    pub fn left_eye(&self) -> Keypoint {
        self.keypoints[0]
    }

    pub fn right_eye(&self) -> Keypoint {
        self.keypoints[1]
    }

    /// Top-left corner, width and height of the box.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.width,
            self.height,
        )
    }

    /// Intersection over union of two boxes.
    pub fn iou(&self, other: &Self) -> f32 {
        let (ax, ay, aw, ah) = self.bounds();
        let (bx, by, bw, bh) = other.bounds();
        let x1 = ax.max(bx);
        let y1 = ay.max(by);
        let x2 = (ax + aw).min(bx + bw);
        let y2 = (ay + ah).min(by + bh);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = aw.max(0.0) * ah.max(0.0) + bw.max(0.0) * bh.max(0.0) - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Anything that turns encoded image bytes into detection records.
///
/// Records must be expressed in the pixel space of the image encoded in `image_bytes`.
pub trait DetectionSource: Send + Sync {
    fn detect(&self, image_bytes: &[u8]) -> Result<Vec<Detection>>;
}

/// Adapter that lets a closure act as a [`DetectionSource`].
pub struct FnSource<F>(F);

/// Wrap a closure as a detection source.
pub fn source_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(&[u8]) -> Result<Vec<Detection>> + Send + Sync,
{
    FnSource(f)
}

impl<F> DetectionSource for FnSource<F>
where
    F: Fn(&[u8]) -> Result<Vec<Detection>> + Send + Sync,
{
    fn detect(&self, image_bytes: &[u8]) -> Result<Vec<Detection>> {
        (self.0)(image_bytes)
    }
}

/// Replays a fixed list of records regardless of the image it is given.
#[derive(Debug, Clone, Default)]
pub struct RecordedDetections {
    detections: Vec<Detection>,
}

impl RecordedDetections {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Build from raw rows, rejecting any row that is too short.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, OverlayError> {
        let detections = rows
            .iter()
            .map(|row| Detection::from_row(row.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { detections })
    }

    /// Load rows from a JSON file containing an array of number arrays.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read detections file {}", path.display()))?;
        let rows: Vec<Vec<f32>> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse detections JSON at {}", path.display()))?;
        Self::from_rows(&rows)
            .with_context(|| format!("invalid detection record in {}", path.display()))
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

impl DetectionSource for RecordedDetections {
    fn detect(&self, _image_bytes: &[u8]) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}
