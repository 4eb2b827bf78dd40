/// Common test utilities and macros for CLI integration tests
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgba, RgbaImage};

#[allow(dead_code)]
pub fn find_model_path() -> Option<PathBuf> {
    let candidates = vec![
        "models/yolov8n-face-pose.onnx",
        "../models/yolov8n-face-pose.onnx",
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

#[allow(dead_code)]
pub fn find_fixture_image() -> Option<PathBuf> {
    let candidates = vec!["fixtures/images/faces.jpg", "../fixtures/images/faces.jpg"];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Any outline font will do; tests draw ASCII symbols.
#[allow(dead_code)]
pub fn find_font_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("EMOJIFACE_TEST_FONT").map(PathBuf::from)
        && path.exists()
    {
        return Some(path);
    }
    let candidates = vec![
        "fixtures/fonts/DejaVuSans.ttf",
        "../fixtures/fonts/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Write a small gradient photo and return its path.
#[allow(dead_code)]
pub fn write_photo(dir: &Path, width: u32, height: u32) -> PathBuf {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([180, 200, 220, 255]));
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        pixel[0] = (x * 3 % 256) as u8;
        pixel[2] = (y * 5 % 256) as u8;
    }
    let path = dir.join("photo.png");
    DynamicImage::ImageRgba8(image)
        .save(&path)
        .expect("save photo");
    path
}

/// A 21-value detection row with both eyes filled in.
#[allow(dead_code)]
pub fn detection_row(cx: f32, cy: f32, w: f32, h: f32) -> Vec<f32> {
    let mut row = vec![0.0f32; 21];
    row[..5].copy_from_slice(&[cx, cy, w, h, 0.9]);
    row[6] = cx - w * 0.2;
    row[7] = cy - h * 0.1;
    row[8] = 0.9;
    row[9] = cx + w * 0.2;
    row[10] = cy - h * 0.1;
    row[11] = 0.9;
    row
}

/// Macro to skip a test when an optional asset is missing.
///
/// # Usage
///
/// ```ignore
/// let font = require_asset!(common::find_font_path(), "font");
/// ```
#[macro_export]
macro_rules! require_asset {
    ($lookup:expr, $what:literal) => {{
        match $lookup {
            Some(p) => p,
            None => {
                eprintln!(concat!("Skipping test: ", $what, " not found"));
                return;
            }
        }
    }};
}

/// Macro to run the CLI with the given arguments.
///
/// Returns the Command output.
#[macro_export]
macro_rules! run_cli {
    ([$($arg:expr),* $(,)?]) => {{
        std::process::Command::new(env!("CARGO_BIN_EXE_emojiface"))
            .env("RUST_LOG", "warn")
            .args([$(std::ffi::OsStr::new($arg),)*])
            .output()
            .expect("execute CLI")
    }};
}

/// Macro to assert CLI success and print stderr on failure.
#[macro_export]
macro_rules! assert_cli_success {
    ($output:expr, $msg:literal) => {{
        if !$output.status.success() {
            eprintln!("CLI stderr: {}", String::from_utf8_lossy(&$output.stderr));
        }
        assert!($output.status.success(), $msg);
    }};
}
