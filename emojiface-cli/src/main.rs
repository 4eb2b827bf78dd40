mod annotate;
mod args;
mod config;
mod types;

use std::{
    fs::{self, File},
    path::Path,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use emojiface_core::{
    DetectionSource, EmojiSession, FontGlyphs, OverlayRenderer, Placement, PoseDetector,
    RecordedDetections, SessionOptions,
};
use emojiface_utils::{config::AppSettings, configure_telemetry, decode_image, init_logging, normalize_path};
use log::{info, warn};

use crate::{
    annotate::save_annotated,
    args::EmojiArgs,
    config::{apply_cli_overrides, load_settings},
    types::{OverlayReport, PlacementFile},
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = EmojiArgs::parse();

    let input_path = normalize_path(&args.input)?;
    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let bytes = fs::read(&input_path)
        .with_context(|| format!("failed to read image {}", input_path.display()))?;

    let renderer = build_renderer(&settings)?;
    let source = build_source(&args, &settings)?;
    let session = EmojiSession::new(
        source,
        renderer,
        settings.palette.resolved(),
        SessionOptions::from(&settings),
    )?;

    let placements = if let Some(path) = args.placements.as_ref() {
        let placements = read_placements(path)?;
        let image = decode_image(&bytes)
            .with_context(|| format!("failed to decode {}", input_path.display()))?;
        session.load_placements(&image, placements)?;
        info!("Re-rendered {} edited placement(s)", session.placements().len());
        session.placements()
    } else {
        let placements = session.detect(bytes).wait()?;
        info!(
            "{} -> {} face(s) decorated",
            input_path.display(),
            placements.len()
        );
        placements
    };

    let rendered = session
        .rendered()
        .context("session produced no rendered image")?;

    let output_path = if let Some(output) = args.output.as_ref() {
        create_parent_dir(output)?;
        rendered
            .save(output)
            .with_context(|| format!("failed to save {}", output.display()))?;
        info!("Saved decorated image to {}", output.display());
        Some(output.display().to_string())
    } else {
        None
    };

    let annotated_path = match (args.annotate.as_ref(), session.base_image()) {
        (Some(path), Some(base)) => match save_annotated(&base, &placements, path) {
            Ok(path) => {
                info!("Annotated image saved to {}", path.display());
                Some(path.display().to_string())
            }
            Err(err) => {
                warn!("Failed to annotate {}: {err:#}", input_path.display());
                None
            }
        },
        _ => None,
    };

    let report = OverlayReport {
        image: input_path.display().to_string(),
        width: rendered.width(),
        height: rendered.height(),
        placements,
        output: output_path,
        annotated: annotated_path,
    };

    if let Some(json_path) = args.json.as_ref() {
        create_parent_dir(json_path)?;
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, &report).with_context(|| {
            format!("failed to write placement JSON to {}", json_path.display())
        })?;
        info!("Wrote placements to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(&report).context("failed to serialize placements")?;
        println!("{json}");
    }

    Ok(())
}

fn build_renderer(settings: &AppSettings) -> Result<OverlayRenderer> {
    match settings.render.font_path.as_deref() {
        Some(path) => {
            let glyphs = FontGlyphs::load(path)?;
            info!("Loaded font from {path}");
            Ok(OverlayRenderer::new(Arc::new(glyphs), settings.render.color))
        }
        None => {
            info!("No font configured; only empty placement lists can be rendered");
            Ok(OverlayRenderer::without_glyphs(settings.render.color))
        }
    }
}

fn build_source(args: &EmojiArgs, settings: &AppSettings) -> Result<Arc<dyn DetectionSource>> {
    if let Some(path) = args.detections.as_ref() {
        let recorded = RecordedDetections::load_json(path)?;
        info!(
            "Replaying {} detection(s) from {}",
            recorded.detections().len(),
            path.display()
        );
        return Ok(Arc::new(recorded));
    }
    if args.placements.is_some() {
        return Ok(Arc::new(RecordedDetections::default()));
    }

    let detector = PoseDetector::from_settings(settings)?;
    info!(
        "Loaded pose model from {}",
        settings.model_path.as_deref().unwrap_or_default()
    );
    Ok(Arc::new(detector))
}

/// Accepts a bare placement array or a report previously written by this tool.
fn read_placements(path: &Path) -> Result<Vec<Placement>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read placements {}", path.display()))?;
    let file: PlacementFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse placements JSON at {}", path.display()))?;
    Ok(file.into_placements())
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(())
}
