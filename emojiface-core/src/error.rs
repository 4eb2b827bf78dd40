use std::time::Duration;

use thiserror::Error;

use crate::detection::DETECTION_WIDTH;

/// Contract violations raised by the overlay pipeline.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("emoji palette is empty")]
    EmptyPalette,
    #[error("no placement at index {index} (list holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("diameter must be a positive finite number (got {0})")]
    InvalidDiameter(f32),
    #[error("{name} must be finite (got {value})")]
    NonFinite { name: &'static str, value: f32 },
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("detection record has {0} values, expected at least {DETECTION_WIDTH}")]
    MalformedRecord(usize),
    #[error("detection box is degenerate ({width}x{height})")]
    DegenerateBox { width: f32, height: f32 },
    #[error("no image loaded")]
    NoImage,
    #[error("a font is required to draw {0} placement(s)")]
    MissingGlyphs(usize),
    #[error("detection failed: {0}")]
    Detection(String),
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("detection job {0} was superseded")]
    Superseded(u64),
}

impl OverlayError {
    /// Wrap an `anyhow` failure from a detection source, keeping its context chain.
    pub fn detection(err: anyhow::Error) -> Self {
        Self::Detection(format!("{err:#}"))
    }
}

pub(crate) fn ensure_finite(name: &'static str, value: f32) -> Result<f32, OverlayError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OverlayError::NonFinite { name, value })
    }
}

pub(crate) fn ensure_diameter(value: f32) -> Result<f32, OverlayError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(OverlayError::InvalidDiameter(value))
    }
}
