//! cardfx: run card artwork through the processing pipeline from the
//! command line.
//!
//! Each input image becomes one job on the orchestrator. Stage progress
//! is reported on stderr; the final job statuses are printed on stdout,
//! either as a short report or as JSON.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin cardfx -- [OPTIONS] <IMAGES>...
//! ```
//!
//! Set `RUST_LOG=debug` for per-stage pipeline logging.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use cardfx_jobs::{JobEvent, JobState, JobStatus, Orchestrator, StageResult};
use cardfx_pipeline::annotate::annotate;
use cardfx_pipeline::decode::{decode_rgba, encode_png};
use cardfx_pipeline::{
    AspectRatio, EnhancementOptions, FilterKind, FilterOptions, HexColor, PipelineConfig,
    ResizeFilter, StageKind,
};
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Trading card image processing: subject detection, smart crop,
/// filters and enhancements.
#[derive(Parser)]
#[command(name = "cardfx", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Target crop aspect ratio, as `w:h`, `w/h` or a plain ratio.
    #[arg(long, default_value = "2.5:3.5")]
    aspect_ratio: AspectRatio,

    /// Keep the full frame instead of cropping to the best suggestion.
    #[arg(long)]
    no_crop: bool,

    /// Filter effect to apply after cropping.
    #[arg(long, value_enum)]
    filter: Option<Filter>,

    /// Filter strength (0.0-1.0).
    #[arg(long, default_value_t = 1.0)]
    intensity: f32,

    /// Tint for the team-colors filter (`#RRGGBB`, `RRGGBB` or `#RGB`).
    #[arg(long)]
    team_color: Option<HexColor>,

    /// Brightness adjustment (-100 to 100).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    brightness: f32,

    /// Contrast adjustment (-100 to 100).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    contrast: f32,

    /// Saturation adjustment (-100 to 100).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    saturation: f32,

    /// Sharpen the processed image.
    #[arg(long)]
    sharpen: bool,

    /// Correct dark or flat images from their brightness histogram.
    #[arg(long)]
    auto_enhance: bool,

    /// Stages to run, comma separated (preview, process, thumbnail).
    #[arg(long, value_delimiter = ',')]
    stages: Vec<StageKind>,

    /// Preview size (longest side in pixels).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_PREVIEW_MAX_DIMENSION)]
    preview_size: u32,

    /// Thumbnail size (longest side in pixels).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THUMBNAIL_MAX_DIMENSION)]
    thumbnail_size: u32,

    /// Resampling filter for previews and thumbnails.
    #[arg(long, value_enum, default_value_t = Resample::Triangle)]
    resize_filter: Resample,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Directory to write preview, processed and thumbnail PNGs into.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Also write the source with detections and crop suggestions drawn on.
    #[arg(long, requires = "out_dir")]
    annotate: bool,

    /// Print final job statuses as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Abort every job still running after this many milliseconds.
    #[arg(long)]
    abort_after_ms: Option<u64>,
}

/// Filter effect selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    Vintage,
    Sepia,
    BlackAndWhite,
    TeamColors,
    Hdr,
    Dramatic,
    Soft,
    Vivid,
}

impl From<Filter> for FilterKind {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Vintage => Self::Vintage,
            Filter::Sepia => Self::Sepia,
            Filter::BlackAndWhite => Self::BlackAndWhite,
            Filter::TeamColors => Self::TeamColors,
            Filter::Hdr => Self::Hdr,
            Filter::Dramatic => Self::Dramatic,
            Filter::Soft => Self::Soft,
            Filter::Vivid => Self::Vivid,
        }
    }
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Resample {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Resample> for ResizeFilter {
    fn from(r: Resample) -> Self {
        match r {
            Resample::Nearest => Self::Nearest,
            Resample::Triangle => Self::Triangle,
            Resample::CatmullRom => Self::CatmullRom,
            Resample::Gaussian => Self::Gaussian,
            Resample::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let filter = cli.filter.map(|f| {
        let options = FilterOptions::new(f.into()).with_intensity(cli.intensity);
        match cli.team_color {
            Some(color) => options.with_team_color(color),
            None => options,
        }
    });

    Ok(PipelineConfig {
        stages: if cli.stages.is_empty() {
            StageKind::DEFAULT_ORDER.to_vec()
        } else {
            cli.stages.clone()
        },
        aspect_ratio: Some(cli.aspect_ratio),
        apply_crop: !cli.no_crop,
        filter,
        enhancements: EnhancementOptions {
            brightness: cli.brightness,
            contrast: cli.contrast,
            saturation: cli.saturation,
            sharpen: cli.sharpen,
            auto_enhance: cli.auto_enhance,
        },
        preview_max_dimension: cli.preview_size,
        thumbnail_max_dimension: cli.thumbnail_size,
        resize_filter: cli.resize_filter.into(),
        ..PipelineConfig::default()
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut inputs = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        match std::fs::read(path) {
            Ok(bytes) => inputs.push(bytes),
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    let orchestrator = Orchestrator::new();
    let progress = tokio::spawn(report_progress(orchestrator.subscribe()));

    let ids = match orchestrator.start_batch(inputs, &config).await {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("Error starting jobs: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ms) = cli.abort_after_ms {
        let orchestrator = orchestrator.clone();
        let ids = ids.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            for id in ids {
                if orchestrator.abort_job(id) {
                    eprintln!("{id}: aborted after {ms} ms");
                }
            }
        });
    }

    let mut statuses = Vec::with_capacity(ids.len());
    for id in &ids {
        match orchestrator.wait_for(*id).await {
            Some(status) => statuses.push(status),
            None => {
                eprintln!("{id}: disappeared before finishing");
                return ExitCode::FAILURE;
            }
        }
    }
    progress.abort();

    if let Some(ref dir) = cli.out_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error creating {}: {e}", dir.display());
            return ExitCode::FAILURE;
        }
        for (path, status) in cli.images.iter().zip(&statuses) {
            write_artifacts(&orchestrator, dir, path, status);
            if cli.annotate {
                write_annotated(dir, path, status);
            }
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&statuses) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing statuses: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        for (path, status) in cli.images.iter().zip(&statuses) {
            print_report(path, status);
        }
    }

    if statuses.iter().all(|s| s.state == JobState::Completed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Print stage transitions on stderr until the channel closes.
async fn report_progress(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(JobEvent::StageStarted { id, index, name }) => {
                eprintln!("{id}: [{index}] {name} ...");
            }
            Ok(JobEvent::StageCompleted {
                id, name, duration, ..
            }) => {
                eprintln!("{id}: {name} done in {duration:.2?}");
            }
            Ok(JobEvent::Failed { id, index, error }) => {
                eprintln!("{id}: stage {index} failed: {error}");
            }
            Ok(JobEvent::Completed { id }) => eprintln!("{id}: completed"),
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => {
                log::debug!("progress reporter skipped {n} event(s)");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
}

/// Write every live artifact of a job as `<stem>-<name>.png`.
fn write_artifacts(orchestrator: &Orchestrator, dir: &Path, path: &Path, status: &JobStatus) {
    let stem = file_stem(path);
    for stage in &status.stages {
        let named: Vec<(&str, &str)> = match &stage.result {
            Some(StageResult::Preview {
                preview_url,
                placeholder_url,
                ..
            }) => vec![
                ("preview", preview_url.as_str()),
                ("placeholder", placeholder_url.as_str()),
            ],
            Some(StageResult::Processed { processed_url, .. }) => {
                vec![("processed", processed_url.as_str())]
            }
            Some(StageResult::Thumbnail { thumbnail_url, .. }) => {
                vec![("thumbnail", thumbnail_url.as_str())]
            }
            None => Vec::new(),
        };
        for (name, url) in named {
            let Some(artifact) = orchestrator.artifact(url) else {
                continue;
            };
            let out = dir.join(format!("{stem}-{name}.png"));
            match std::fs::write(&out, &artifact.bytes) {
                Ok(()) => eprintln!(
                    "Wrote {} ({}, {} bytes)",
                    out.display(),
                    artifact.dimensions,
                    artifact.bytes.len(),
                ),
                Err(e) => eprintln!("Error writing {}: {e}", out.display()),
            }
        }
    }
}

/// Write the source image with detections and crop suggestions drawn on.
fn write_annotated(dir: &Path, path: &Path, status: &JobStatus) {
    let Some(report) = &status.metadata else {
        return;
    };
    let source = match std::fs::read(path).map_err(|e| e.to_string()).and_then(|bytes| {
        decode_rgba(&bytes).map_err(|e| e.to_string())
    }) {
        Ok(decoded) => decoded.pixels,
        Err(e) => {
            eprintln!("Error re-reading {}: {e}", path.display());
            return;
        }
    };
    let overlay = annotate(&source, &report.regions, &report.suggestions);
    let out = dir.join(format!("{}-annotated.png", file_stem(path)));
    match encode_png(&overlay).map_err(|e| e.to_string()).and_then(|png| {
        std::fs::write(&out, png).map_err(|e| e.to_string())
    }) {
        Ok(()) => eprintln!("Wrote {}", out.display()),
        Err(e) => eprintln!("Error writing {}: {e}", out.display()),
    }
}

/// Human-readable summary of one finished job.
fn print_report(path: &Path, status: &JobStatus) {
    println!(
        "{} ({}): {:?}, {:.0}%",
        path.display(),
        status.id,
        status.state,
        status.overall_progress() * 100.0,
    );
    for stage in &status.stages {
        let duration = stage
            .duration
            .map_or_else(String::new, |d| format!(" in {d:.2?}"));
        println!(
            "  {:<20} {:?} {:>3}%{duration}",
            stage.name, stage.status, stage.progress
        );
        if let Some(ref error) = stage.error {
            println!("    error: {error}");
        }
    }
    if let Some(ref report) = status.metadata {
        println!("  source:     {}", report.original);
        println!("  processed:  {}", report.processed);
        for region in &report.regions {
            println!(
                "  region:     {:?} at ({}, {}) {}x{} confidence {:.2}",
                region.kind, region.x, region.y, region.width, region.height, region.confidence,
            );
        }
        if let Some(best) = report.suggestions.first() {
            println!(
                "  best crop:  {} {:.0}x{:.0} at ({:.0}, {:.0}) confidence {:.2}",
                best.rule, best.width, best.height, best.x, best.y, best.confidence,
            );
        }
        if let Some(ref correction) = report.auto_correction {
            println!(
                "  auto:       brightness {:+} contrast {:+}",
                correction.brightness, correction.contrast,
            );
        }
    }
}
