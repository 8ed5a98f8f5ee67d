//! Quality search that aims an encode at a byte size.

use image::DynamicImage;
use tracing::{debug, trace};
use crate::processing::{EncodeParams, Encoder};
use crate::utils::{EncodeError, OutputFormat};

pub const MIN_QUALITY: f32 = 0.01;
pub const MAX_QUALITY: f32 = 1.0;
pub const START_QUALITY: f32 = 0.7;
pub const MAX_ATTEMPTS: u32 = 10;
/// Relative distance from the target that counts as a hit
pub const TOLERANCE: f64 = 0.05;
/// Quality range width below which the search has converged
pub const MIN_RANGE: f32 = 0.01;

/// Result of a size search: the last encode and how it was reached.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub bytes: Vec<u8>,
    pub quality: f32,
    pub attempts: u32,
    /// Whether the size landed within tolerance of the target
    pub hit_target: bool,
}

/// Binary search over encoder quality.
///
/// Missing the target is not an error; the last attempt is returned. Only an
/// encoder failure ends the search with `Err`.
pub struct SizeTargetingSearch<'a> {
    encoder: &'a dyn Encoder,
}

impl<'a> SizeTargetingSearch<'a> {
    pub fn new(encoder: &'a dyn Encoder) -> Self {
        Self { encoder }
    }

    /// Runs the search. `on_attempt` is called with the 1-based attempt number
    /// after every encode.
    pub fn search(
        &self,
        pixels: &DynamicImage,
        format: OutputFormat,
        params: &EncodeParams,
        target_bytes: u64,
        on_attempt: &mut dyn FnMut(u32),
    ) -> Result<SearchOutcome, EncodeError> {
        let target = target_bytes.max(1) as f64;
        let mut low = MIN_QUALITY;
        let mut high = MAX_QUALITY;
        let mut quality = START_QUALITY;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let bytes = self.encoder.encode(pixels, format, &params.with_quality(quality))?;
            let size = bytes.len() as f64;
            on_attempt(attempts);
            trace!("Size search attempt {}: quality {:.3} -> {} bytes", attempts, quality, bytes.len());

            if (size - target).abs() / target < TOLERANCE {
                debug!("Size target {} met at quality {:.3} after {} attempts", target_bytes, quality, attempts);
                return Ok(SearchOutcome { bytes, quality, attempts, hit_target: true });
            }

            let used = quality;
            if size > target {
                high = quality;
                quality = (low + quality) / 2.0;
            } else {
                low = quality;
                quality = (quality + high) / 2.0;
            }

            if high - low < MIN_RANGE || attempts >= MAX_ATTEMPTS {
                debug!(
                    "Size target {} not met, keeping {} bytes at quality {:.3} after {} attempts",
                    target_bytes,
                    bytes.len(),
                    used,
                    attempts
                );
                return Ok(SearchOutcome { bytes, quality: used, attempts, hit_target: false });
            }
        }
    }
}
