//! Shared types and conversions for emojiface.

use emojiface_core::Placement;
use serde::{Deserialize, Serialize};

/// A serializable summary of one decorated photo.
#[derive(Debug, Serialize)]
pub struct OverlayReport {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub placements: Vec<Placement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
}

/// Placement input: either a bare list or an [`OverlayReport`] read back from disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PlacementFile {
    List(Vec<Placement>),
    Report { placements: Vec<Placement> },
}

impl PlacementFile {
    pub fn into_placements(self) -> Vec<Placement> {
        match self {
            Self::List(placements) | Self::Report { placements } => placements,
        }
    }
}
