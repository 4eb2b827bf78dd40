//! Command-line argument definitions for emojiface.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Cover every face in a photo with an emoji.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct EmojiArgs {
    /// Photo to decorate.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the decorated PNG.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the pose ONNX model (defaults to the settings file).
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Replay detection rows from a JSON file instead of running the model.
    #[arg(long, conflicts_with = "placements")]
    pub detections: Option<PathBuf>,

    /// Skip detection and re-render an edited placement list (JSON).
    #[arg(long)]
    pub placements: Option<PathBuf>,

    /// Write placements to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write a debug image with placement circles and roll lines.
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// TrueType/OpenType font used to draw the emoji.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Emoji to draw from, e.g. "😂😎🤠" (empty restores the default set).
    #[arg(long)]
    pub palette: Option<String>,

    /// Seed for reproducible emoji assignment.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Glyph color as hex (#RRGGBB or #RRGGBBAA), used by outline fonts.
    #[arg(long, value_name = "HEX")]
    pub color: Option<String>,

    /// Downscale the photo so its longest side fits before detection (0 disables).
    #[arg(long)]
    pub max_side: Option<u32>,

    /// Override score threshold.
    #[arg(long)]
    pub score_threshold: Option<f32>,

    /// Override NMS threshold.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Override top_k limit.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Give up on detection after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Optional settings JSON. Defaults to `config/emojiface_settings.json` when present, otherwise built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}
