//! Common helpers shared across EmojiFace crates.

/// Basic RGBA color type and hex parsing.
pub mod color;
/// Application configuration and settings management.
pub mod config;
/// Image loading, downscaling, encoding, and tensor conversion.
pub mod image_utils;
/// Emoji palette parsing and defaults.
pub mod palette;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use color::{RgbaColor, parse_hex_color};
pub use image_utils::{
    compute_resize_scales, decode_image, downscale_to_limit, encode_png, load_image,
    rgb_to_bgr_chw,
};
pub use palette::{DEFAULT_PALETTE, default_palette, resolve_palette, split_symbols};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    telemetry_level, timing_guard, timing_guard_if,
};

/// Initialize logging once for CLI and embedding applications.
///
/// Respects `RUST_LOG` when it is set and otherwise falls back to `default_filter`.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module("emojiface::telemetry", LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
