//! Shared configuration types consumed across the EmojiFace workspace.
//!
//! Settings are persisted as pretty-printed JSON. Every section is `#[serde(default)]`
//! so partial files only override what they mention.

use crate::{color::RgbaColor, palette};

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Default location of the pose model, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "models/yolov8n-face-pose.onnx";

/// Post-processing parameters for the pose detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum confidence for a detection to be kept.
    pub score_threshold: f32,
    /// IoU above which the weaker of two overlapping boxes is suppressed.
    pub nms_threshold: f32,
    /// Maximum number of candidates considered before NMS (0 = unlimited).
    pub top_k: usize,
    /// Give up waiting for the detector after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.45,
            nms_threshold: 0.5,
            top_k: 300,
            timeout_secs: None,
        }
    }
}

impl DetectionSettings {
    /// The detection timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Image sizes on the way into the detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    /// Photos are downscaled so their longest side is at most this many pixels
    /// before they are handed to the detector (0 disables downscaling).
    pub max_side: u32,
    /// Width of the model's input tensor.
    pub model_width: u32,
    /// Height of the model's input tensor.
    pub model_height: u32,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            max_side: 1024,
            model_width: 640,
            model_height: 640,
        }
    }
}

/// The symbols available for assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PaletteSettings {
    pub symbols: Vec<String>,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            symbols: palette::default_palette(),
        }
    }
}

impl PaletteSettings {
    /// Replace the palette from free-form text; empty text restores the default.
    pub fn set_from_text(&mut self, text: &str) {
        let symbols = palette::split_symbols(text);
        self.symbols = if symbols.is_empty() {
            palette::default_palette()
        } else {
            symbols
        };
    }

    /// The palette to hand to the assigner (never empty).
    pub fn resolved(&self) -> Vec<String> {
        palette::resolve_palette(&self.symbols)
    }
}

/// Emoji assignment options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AssignmentSettings {
    /// When set, every detection batch draws symbols from a generator seeded with
    /// this value, making assignments reproducible.
    pub seed: Option<u64>,
}

/// Overlay rendering options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RenderSettings {
    /// TrueType/OpenType font used to draw symbols.
    pub font_path: Option<String>,
    /// Color used for glyph coverage.
    pub color: RgbaColor,
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Path to the pose/face ONNX model.
    pub model_path: Option<String>,
    pub input: InputDimensions,
    pub detection: DetectionSettings,
    pub palette: PaletteSettings,
    pub assignment: AssignmentSettings,
    pub render: RenderSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_path: Some(DEFAULT_MODEL_PATH.into()),
            input: InputDimensions::default(),
            detection: DetectionSettings::default(),
            palette: PaletteSettings::default(),
            assignment: AssignmentSettings::default(),
            render: RenderSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// A missing `model_path` falls back to the default; an empty palette is
    /// replaced by the built-in one.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model_path.is_none() {
            settings.model_path = Some(DEFAULT_MODEL_PATH.into());
        }
        settings.palette.symbols = settings.palette.resolved();

        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Default path for persisted settings (`config/emojiface_settings.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/emojiface_settings.json"))
        .unwrap_or_else(|_| PathBuf::from("config/emojiface_settings.json"))
}
