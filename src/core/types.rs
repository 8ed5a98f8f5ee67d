//! Core types for conversion requests, sources and results.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::utils::{OutputFormat, size_reduction_percent};

/// Default number of files converted at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Fallback option values used when neither the caller nor saved settings provide one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDefaults {
    /// Quality percentage (1-100)
    pub quality: u32,
    /// PNG compression level (0-9)
    pub png_compression: u32,
}

impl Default for OptionDefaults {
    fn default() -> Self {
        Self {
            quality: 90,
            png_compression: 6,
        }
    }
}

/// Converter configuration snapshot handed to the resolver and the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterConfig {
    /// Upper bound on jobs running at the same time
    pub max_concurrent: usize,
    pub defaults: OptionDefaults,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            defaults: OptionDefaults::default(),
        }
    }
}

/// An input file: content plus the metadata the caller declared for it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub media_type: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the source in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Format specific encoder knobs. Only the selected format's options are carried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum FormatOptions {
    WebP {
        /// Keep the alpha channel
        alpha: bool,
    },
    Jpeg {
        progressive: bool,
    },
    Png {
        /// zlib style level, 0 (none) to 9 (best)
        #[serde(rename = "compressionLevel")]
        compression_level: u8,
    },
    Gif,
    Avif {
        /// Faster, smaller encode at some quality cost
        #[serde(rename = "lowDataMode")]
        low_data_mode: bool,
    },
}

impl FormatOptions {
    /// Options a format gets when the caller set nothing specific.
    pub fn defaults_for(format: OutputFormat, png_compression: u8) -> Self {
        match format {
            OutputFormat::WebP => Self::WebP { alpha: true },
            OutputFormat::Jpeg => Self::Jpeg { progressive: false },
            OutputFormat::Png => Self::Png { compression_level: png_compression },
            OutputFormat::Gif => Self::Gif,
            OutputFormat::Avif => Self::Avif { low_data_mode: false },
        }
    }
}

/// Resize part of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeSettings {
    /// Whether resizing is requested at all
    pub enabled: bool,
    /// Target width in pixels
    pub width: Option<u32>,
    /// Target height in pixels
    pub height: Option<u32>,
    pub maintain_aspect_ratio: bool,
    /// Uniform scale, 1-100. Anything other than 100 wins over width/height.
    pub scale_percent: u32,
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
            scale_percent: 100,
        }
    }
}

/// Normalised, immutable description of one conversion.
///
/// Built by [`crate::processing::OptionResolver`]; the invariants below hold for
/// every request it returns:
/// - `lossless` is only set for formats with a lossless mode
/// - `target_bytes` is only set for lossy WebP/JPEG/AVIF and is positive
/// - `resize.scale_percent` is within 1-100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub format: OutputFormat,
    /// 0.0 - 1.0, ignored when the format does not take a quality
    pub quality: f32,
    pub lossless: bool,
    /// Output size to aim for; `Some` means size optimisation is on
    pub target_bytes: Option<u64>,
    pub resize: ResizeSettings,
    pub format_options: FormatOptions,
    pub preserve_metadata: bool,
}

impl ConversionRequest {
    pub fn size_optimization(&self) -> bool {
        self.target_bytes.is_some()
    }

    /// The quality to hand to the encoder, or `None` when it has no effect.
    pub fn effective_quality(&self) -> Option<f32> {
        self.format
            .requires_quality_setting(self.lossless)
            .then_some(self.quality)
    }
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Output of a successful conversion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    /// Encoded output
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub format: OutputFormat,
    /// Subtype of the source's declared media type
    pub original_format: String,
    pub original_size: u64,
    pub output_size: u64,
    pub dimensions: Dimensions,
    pub elapsed_ms: f64,
    /// Quality chosen by size targeting, when it ran
    pub target_quality: Option<f32>,
    /// Encode attempts made by size targeting
    pub target_attempts: Option<u32>,
}

impl ConversionResult {
    /// Size reduction against the source, in whole percent.
    pub fn size_reduction(&self) -> u32 {
        size_reduction_percent(self.original_size, self.output_size)
    }
}
