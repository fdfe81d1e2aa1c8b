//! Stage-by-stage execution over a single source image.
//!
//! A processing run is an ordered list of [`StageKind`]s executed against
//! one [`PipelineState`]. The state owns the encoded source and, once the
//! first stage has decoded it, the working pixel buffer that each stage
//! reads and (for [`StageKind::Process`]) replaces:
//!
//! ```rust
//! # use cardfx_pipeline::{PipelineConfig, PipelineError};
//! # use cardfx_pipeline::pipeline::{PipelineState, StageKind, run_stage};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let mut state = PipelineState::new(png);
//! for kind in &config.stages {
//!     let output = run_stage(&mut state, *kind, &config, &mut |pct| {
//!         println!("{kind}: {pct}%");
//!     })?;
//!     println!("{kind} produced {}", output.image().width());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Stages are synchronous and never catch their own errors; whoever
//! drives them (the job orchestrator, or [`crate::process`]) is the
//! error boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crop::suggest_crops_for;
use crate::decode::{SourceInfo, decode_rgba};
use crate::detect::detect_subjects;
use crate::enhance::{AutoCorrection, apply_enhancements};
use crate::filter::{FilterOptions, apply_filter};
use crate::resize::{fit_within, placeholder};
use crate::types::{
    CropSuggestion, DetectedRegion, Dimensions, PipelineConfig, PipelineError, PixelRect,
    RgbaImage,
};

/// One discrete, sequentially executed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    /// Decode and produce a downscaled preview plus blurred placeholder.
    Preview,
    /// Detect subjects, crop, filter and enhance.
    Process,
    /// Downscale the current working image to a thumbnail.
    Thumbnail,
}

impl StageKind {
    /// The standard stage order.
    pub const DEFAULT_ORDER: [Self; 3] = [Self::Preview, Self::Process, Self::Thumbnail];

    /// Stable identifier reported in job status.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Preview => "client-preview",
            Self::Process => "initial-processing",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = PipelineError;

    /// Accepts the short form (`preview`, `process`, `thumbnail`) or the
    /// reported name (`client-preview`, `initial-processing`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" | "client-preview" => Ok(Self::Preview),
            "process" | "processing" | "initial-processing" => Ok(Self::Process),
            "thumbnail" | "thumb" => Ok(Self::Thumbnail),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown stage {other:?}"
            ))),
        }
    }
}

/// What the processing stage found and did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    /// Encoded source facts.
    pub source: SourceInfo,
    /// Size of the decoded source.
    pub original: Dimensions,
    /// Size after cropping.
    pub processed: Dimensions,
    /// Regions found by the detector.
    pub regions: Vec<DetectedRegion>,
    /// Crop suggestions, best first.
    pub suggestions: Vec<CropSuggestion>,
    /// The crop that was applied, if any.
    pub applied_crop: Option<PixelRect>,
    /// The filter that was applied, if any.
    pub filter: Option<FilterOptions>,
    /// Auto-enhance measurement, if auto-enhance ran.
    pub auto_correction: Option<AutoCorrection>,
}

/// The pixels a stage produced.
#[derive(Debug, Clone)]
pub enum StageOutput {
    /// Downscaled preview and blurred placeholder.
    Preview {
        /// Preview image.
        preview: RgbaImage,
        /// Tiny blurred stand-in.
        placeholder: RgbaImage,
    },
    /// The cropped, filtered, enhanced image.
    Processed {
        /// Full-resolution processed image.
        image: RgbaImage,
        /// Detection and crop details.
        report: ProcessReport,
    },
    /// Downscaled working image.
    Thumbnail {
        /// Thumbnail image.
        thumbnail: RgbaImage,
    },
}

impl StageOutput {
    /// The primary image of this output.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        match self {
            Self::Preview { preview, .. } => preview,
            Self::Processed { image, .. } => image,
            Self::Thumbnail { thumbnail } => thumbnail,
        }
    }

    /// Which stage produced this output.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::Preview { .. } => StageKind::Preview,
            Self::Processed { .. } => StageKind::Process,
            Self::Thumbnail { .. } => StageKind::Thumbnail,
        }
    }
}

/// Everything a full run produced, one field per stage kind.
///
/// Fields for stages that were not configured stay `None`.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Preview-stage output.
    pub preview: Option<RgbaImage>,
    /// Blurred placeholder from the preview stage.
    pub placeholder: Option<RgbaImage>,
    /// Processed full-resolution image.
    pub processed: Option<RgbaImage>,
    /// Thumbnail-stage output.
    pub thumbnail: Option<RgbaImage>,
    /// Detection and crop details from the processing stage.
    pub report: Option<ProcessReport>,
}

impl ProcessResult {
    /// Store a stage output in its slot, replacing any earlier one.
    pub fn record(&mut self, output: StageOutput) {
        match output {
            StageOutput::Preview {
                preview,
                placeholder,
            } => {
                self.preview = Some(preview);
                self.placeholder = Some(placeholder);
            }
            StageOutput::Processed { image, report } => {
                self.processed = Some(image);
                self.report = Some(report);
            }
            StageOutput::Thumbnail { thumbnail } => self.thumbnail = Some(thumbnail),
        }
    }
}

/// Decoded working data, present once any stage has run.
#[derive(Debug, Clone)]
struct Decoded {
    source: SourceInfo,
    original: Dimensions,
    working: RgbaImage,
}

/// The source bytes and working buffer of a single processing run.
#[derive(Debug, Clone)]
pub struct PipelineState {
    source: Vec<u8>,
    decoded: Option<Decoded>,
}

impl PipelineState {
    /// Start a run over encoded image bytes.
    #[must_use]
    pub const fn new(source: Vec<u8>) -> Self {
        Self {
            source,
            decoded: None,
        }
    }

    /// Start a run over an already decoded image.
    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            source: Vec::new(),
            decoded: Some(Decoded {
                source: SourceInfo {
                    format: None,
                    byte_len: 0,
                },
                original: Dimensions::of(&image),
                working: image,
            }),
        }
    }

    /// The current working buffer, once decoded.
    #[must_use]
    pub fn working(&self) -> Option<&RgbaImage> {
        self.decoded.as_ref().map(|d| &d.working)
    }

    /// Size of the decoded source, once decoded.
    #[must_use]
    pub fn original_dimensions(&self) -> Option<Dimensions> {
        self.decoded.as_ref().map(|d| d.original)
    }

    /// Facts about the encoded source, once decoded.
    #[must_use]
    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.decoded.as_ref().map(|d| &d.source)
    }

    fn ensure_decoded(&mut self) -> Result<&mut Decoded, PipelineError> {
        let decoded = match self.decoded.take() {
            Some(decoded) => decoded,
            None => {
                let decoded = decode_rgba(&self.source)?;
                // The encoded bytes are no longer needed.
                self.source = Vec::new();
                Decoded {
                    original: Dimensions::of(&decoded.pixels),
                    source: decoded.source,
                    working: decoded.pixels,
                }
            }
        };
        Ok(self.decoded.insert(decoded))
    }
}

/// Run one stage, decoding the source first if no stage has yet.
///
/// `progress` receives integer percentages in `0..=100`, non-decreasing,
/// ending with 100 on success.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] or [`PipelineError::ImageDecode`]
/// if the source cannot be decoded.
pub fn run_stage(
    state: &mut PipelineState,
    kind: StageKind,
    config: &PipelineConfig,
    progress: &mut dyn FnMut(u8),
) -> Result<StageOutput, PipelineError> {
    progress(0);
    let decoded = state.ensure_decoded()?;
    log::debug!("running stage {kind} on {}", Dimensions::of(&decoded.working));

    let output = match kind {
        StageKind::Preview => {
            let (preview, _) = fit_within(
                &decoded.working,
                config.preview_max_dimension,
                config.resize_filter,
            );
            progress(50);
            let placeholder = placeholder(
                &preview,
                config.placeholder_size,
                config.placeholder_sigma,
            );
            StageOutput::Preview {
                preview,
                placeholder,
            }
        }
        StageKind::Process => process_working(decoded, config, progress),
        StageKind::Thumbnail => {
            let (thumbnail, _) = fit_within(
                &decoded.working,
                config.thumbnail_max_dimension,
                config.resize_filter,
            );
            StageOutput::Thumbnail { thumbnail }
        }
    };

    progress(100);
    Ok(output)
}

fn process_working(
    decoded: &mut Decoded,
    config: &PipelineConfig,
    progress: &mut dyn FnMut(u8),
) -> StageOutput {
    let regions = detect_subjects(&decoded.working);
    progress(25);

    let dims = Dimensions::of(&decoded.working);
    let suggestions = config
        .aspect_ratio
        .map(|ratio| suggest_crops_for(dims, &regions, ratio))
        .unwrap_or_default();

    let applied_crop = if config.apply_crop {
        suggestions.first().map(|best| best.to_pixel_rect(dims))
    } else {
        None
    };
    if let Some(rect) = applied_crop {
        decoded.working =
            image::imageops::crop_imm(&decoded.working, rect.x, rect.y, rect.width, rect.height)
                .to_image();
    }
    progress(50);

    if let Some(filter) = &config.filter {
        apply_filter(&mut decoded.working, filter);
    }
    progress(75);

    let auto_correction = if config.enhancements.is_noop() {
        None
    } else {
        let correction = apply_enhancements(&mut decoded.working, &config.enhancements);
        config.enhancements.auto_enhance.then_some(correction)
    };

    StageOutput::Processed {
        image: decoded.working.clone(),
        report: ProcessReport {
            source: decoded.source.clone(),
            original: decoded.original,
            processed: Dimensions::of(&decoded.working),
            regions,
            suggestions,
            applied_crop,
            filter: config.filter,
            auto_correction,
        },
    }
}
