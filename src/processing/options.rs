//! Resolution of raw, user-facing option values into a [`ConversionRequest`].

use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::core::{ConversionRequest, FormatOptions, OptionDefaults, ResizeSettings};
use crate::utils::{ConverterError, ConverterResult, OutputFormat};

/// Option values as a user (or a settings file) supplies them.
///
/// Nothing here is validated; [`OptionResolver::resolve`] does that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOptions {
    /// Output format name (`webp`, `jpeg`/`jpg`, `png`, `gif`, `avif`)
    pub format: Option<String>,
    /// Quality percentage (0-100)
    pub quality: Option<u32>,
    pub lossless: bool,
    pub size_optimization: bool,
    /// Target output size in KiB
    pub target_size_kb: Option<u64>,
    pub resize: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Defaults to `true`
    pub maintain_aspect_ratio: Option<bool>,
    pub scale_percent: Option<u32>,
    /// Defaults to `true`
    pub webp_alpha: Option<bool>,
    pub jpeg_progressive: bool,
    pub png_compression: Option<u32>,
    pub avif_low_data_mode: bool,
    pub preserve_metadata: bool,
}

/// Turns [`RawOptions`] into a normalised [`ConversionRequest`].
///
/// Pure: the result depends only on the defaults and the options passed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionResolver {
    defaults: OptionDefaults,
}

impl OptionResolver {
    pub fn new(defaults: OptionDefaults) -> Self {
        Self { defaults }
    }

    pub fn resolve(&self, raw: &RawOptions) -> ConverterResult<ConversionRequest> {
        let format: OutputFormat = raw
            .format
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConverterError::invalid_option("No output format selected"))?
            .parse()?;

        let quality = raw.quality.unwrap_or(self.defaults.quality).min(100) as f32 / 100.0;

        let lossless = if raw.lossless && !format.supports_lossless() {
            debug!("Lossless mode not available for {}, ignoring", format);
            false
        } else {
            raw.lossless
        };

        let target_bytes = if !raw.size_optimization {
            None
        } else if !format.supports_size_targeting() || lossless {
            debug!(
                "Size optimization does not apply to {}{}, ignoring target",
                format,
                if lossless { " (lossless)" } else { "" }
            );
            None
        } else {
            match raw.target_size_kb {
                Some(kb) if kb > 0 => Some(kb.saturating_mul(1024)),
                _ => {
                    return Err(ConverterError::invalid_option(
                        "Size optimization requires a positive target file size",
                    ));
                }
            }
        };

        let resize = if raw.resize {
            ResizeSettings {
                enabled: true,
                width: raw.width.filter(|w| *w > 0),
                height: raw.height.filter(|h| *h > 0),
                maintain_aspect_ratio: raw.maintain_aspect_ratio.unwrap_or(true),
                scale_percent: raw.scale_percent.unwrap_or(100).clamp(1, 100),
            }
        } else {
            ResizeSettings::default()
        };

        let png_compression = raw
            .png_compression
            .unwrap_or(self.defaults.png_compression)
            .min(9) as u8;

        let format_options = match format {
            OutputFormat::WebP => FormatOptions::WebP {
                alpha: raw.webp_alpha.unwrap_or(true),
            },
            OutputFormat::Jpeg => FormatOptions::Jpeg {
                progressive: raw.jpeg_progressive,
            },
            OutputFormat::Png => FormatOptions::Png {
                compression_level: png_compression,
            },
            OutputFormat::Gif => FormatOptions::Gif,
            OutputFormat::Avif => FormatOptions::Avif {
                low_data_mode: raw.avif_low_data_mode,
            },
        };

        Ok(ConversionRequest {
            format,
            quality,
            lossless,
            target_bytes,
            resize,
            format_options,
            preserve_metadata: raw.preserve_metadata,
        })
    }
}
