//! cardfx-pipeline: Pure pixel pipeline for trading card artwork (sans-IO).
//!
//! Turns an encoded image into a preview, a cropped/filtered/enhanced
//! card image and a thumbnail through:
//! decode -> preview + placeholder -> subject detection -> crop
//! suggestion -> crop -> filter -> enhancements -> thumbnail.
//!
//! Every pixel operation here is a synchronous function over an
//! [`RgbaImage`]. Job bookkeeping, cancellation and artifact storage
//! live in `cardfx-jobs`.

pub mod annotate;
pub mod color;
pub mod crop;
pub mod decode;
pub mod detect;
pub mod enhance;
pub mod filter;
pub mod pipeline;
pub mod resize;
pub mod sharpen;
pub mod types;

pub use color::HexColor;
pub use crop::{suggest_crops, suggest_crops_for};
pub use detect::detect_subjects;
pub use enhance::{AutoCorrection, EnhancementOptions, apply_enhancements};
pub use filter::{FilterKind, FilterOptions, apply_filter};
pub use pipeline::{PipelineState, ProcessReport, ProcessResult, StageKind, StageOutput, run_stage};
pub use resize::ResizeFilter;
pub use sharpen::apply_sharpen;
pub use types::{
    AspectRatio, CropRule, CropSuggestion, DetectedRegion, Dimensions, PipelineConfig,
    PipelineError, PixelRect, RegionKind, RgbaImage,
};

/// Run every configured stage over `image_bytes`, in order.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn process(image_bytes: &[u8], config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    config.validate()?;
    let mut state = PipelineState::new(image_bytes.to_vec());
    let mut result = ProcessResult::default();
    for kind in &config.stages {
        result.record(run_stage(&mut state, *kind, config, &mut |_| {})?);
    }
    Ok(result)
}
