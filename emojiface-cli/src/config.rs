//! Configuration loading and CLI override logic.

use std::path::PathBuf;

use anyhow::{Context, Result};
use emojiface_utils::{
    config::{AppSettings, default_settings_path},
    normalize_path, parse_hex_color,
};
use log::{info, warn};

use crate::args::EmojiArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        let default_path = default_settings_path();
        if default_path.exists() {
            let settings = AppSettings::load_from_path(&default_path).with_context(|| {
                format!(
                    "failed to load default settings from {}",
                    default_path.display()
                )
            })?;
            info!("Loaded settings from {}", default_path.display());
            Ok(settings)
        } else {
            Ok(AppSettings::default())
        }
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &EmojiArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }

    if let Some(model) = args.model.as_ref() {
        settings.model_path = Some(model.display().to_string());
    }
    if let Some(max_side) = args.max_side {
        settings.input.max_side = max_side;
    }
    if let Some(score) = args.score_threshold {
        settings.detection.score_threshold = score;
    }
    if let Some(nms) = args.nms_threshold {
        settings.detection.nms_threshold = nms;
    }
    if let Some(top_k) = args.top_k {
        settings.detection.top_k = top_k;
    }
    if let Some(secs) = args.timeout_secs {
        settings.detection.timeout_secs = Some(secs);
    }

    if let Some(text) = args.palette.as_ref() {
        settings.palette.set_from_text(text);
    }
    if let Some(seed) = args.seed {
        settings.assignment.seed = Some(seed);
    }
    if let Some(font) = args.font.as_ref() {
        settings.render.font_path = Some(font.display().to_string());
    }
    if let Some(ref hex) = args.color {
        match parse_hex_color(hex) {
            Some(color) => settings.render.color = color,
            None => warn!("failed to parse --color '{hex}', keeping {:?}", settings.render.color),
        }
    }
}
