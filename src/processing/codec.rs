//! Decoder/encoder capabilities and the bundled `image` crate implementation.

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, Frame, ImageError};
use tracing::warn;
use crate::core::{ConversionRequest, FormatOptions};
use crate::utils::{ConverterError, ConverterResult, EncodeError, OutputFormat};

/// Quality used when a lossy encoder is called without one.
const FALLBACK_QUALITY: f32 = 0.9;
const AVIF_SPEED: u8 = 4;
const AVIF_SPEED_LOW_DATA: u8 = 8;

/// Per-call encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    /// 0.0 - 1.0; `None` when the format ignores quality
    pub quality: Option<f32>,
    pub lossless: bool,
    pub options: FormatOptions,
    pub preserve_metadata: bool,
}

impl EncodeParams {
    pub fn from_request(request: &ConversionRequest) -> Self {
        Self {
            quality: request.effective_quality(),
            lossless: request.lossless,
            options: request.format_options,
            preserve_metadata: request.preserve_metadata,
        }
    }

    pub fn with_quality(&self, quality: f32) -> Self {
        Self {
            quality: Some(quality),
            ..*self
        }
    }
}

/// Turns encoded file bytes into pixels.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> ConverterResult<DynamicImage>;
}

/// Turns pixels into encoded bytes.
///
/// `encode` must not mutate `pixels`; size targeting calls it repeatedly on
/// the same buffer with different qualities.
pub trait Encoder: Send + Sync {
    /// Whether this runtime can produce `format` at all
    fn supports(&self, format: OutputFormat) -> bool;

    fn encode(
        &self,
        pixels: &DynamicImage,
        format: OutputFormat,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Codec backed by the `image` crate, with WebP encoding through libwebp.
///
/// JPEG output is baseline regardless of `progressive`, and metadata is not
/// carried over; see [`unapplied_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl Decoder for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> ConverterResult<DynamicImage> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            ConverterError::decode(format!(
                "Failed to load image. The file may be corrupted or not supported: {e}"
            ))
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(ConverterError::decode("Image has no pixels"));
        }
        Ok(image)
    }
}

impl Encoder for ImageCodec {
    fn supports(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Avif => cfg!(feature = "avif"),
            _ => true,
        }
    }

    fn encode(
        &self,
        pixels: &DynamicImage,
        format: OutputFormat,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, EncodeError> {
        if !self.supports(format) {
            return Err(EncodeError::UnsupportedFormat(format));
        }

        for option in unapplied_options(format, params) {
            warn!("{} has no effect on {} output", option, format);
        }

        let reject = |e: ImageError| EncodeError::rejected(format, e.to_string());
        let mut buf = Vec::new();

        match format {
            OutputFormat::Jpeg => {
                let quality = quality_percent(params.quality);
                DynamicImage::ImageRgb8(pixels.to_rgb8())
                    .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
                    .map_err(reject)?;
            }
            OutputFormat::WebP => buf = encode_webp(pixels, params)?,
            OutputFormat::Png => {
                let level = match params.options {
                    FormatOptions::Png { compression_level } => compression_level,
                    _ => 6,
                };
                let encoder = PngEncoder::new_with_quality(
                    &mut buf,
                    png_compression(level),
                    FilterType::Adaptive,
                );
                to_8bit(pixels, pixels.color().has_alpha())
                    .write_with_encoder(encoder)
                    .map_err(reject)?;
            }
            OutputFormat::Gif => {
                let mut encoder = GifEncoder::new(&mut buf);
                encoder
                    .encode_frame(Frame::new(pixels.to_rgba8()))
                    .map_err(reject)?;
            }
            OutputFormat::Avif => encode_avif(pixels, params, &mut buf).map_err(reject)?,
        }

        if buf.is_empty() {
            return Err(EncodeError::rejected(format, "encoder produced no output"));
        }
        Ok(buf)
    }
}

#[cfg(feature = "avif")]
fn encode_avif(
    pixels: &DynamicImage,
    params: &EncodeParams,
    buf: &mut Vec<u8>,
) -> image::ImageResult<()> {
    use image::codecs::avif::AvifEncoder;

    let speed = match params.options {
        FormatOptions::Avif { low_data_mode: true } => AVIF_SPEED_LOW_DATA,
        _ => AVIF_SPEED,
    };
    let quality = if params.lossless { 100 } else { quality_percent(params.quality) };

    DynamicImage::ImageRgba8(pixels.to_rgba8())
        .write_with_encoder(AvifEncoder::new_with_speed_quality(buf, speed, quality))
}

#[cfg(not(feature = "avif"))]
fn encode_avif(
    _pixels: &DynamicImage,
    _params: &EncodeParams,
    _buf: &mut Vec<u8>,
) -> image::ImageResult<()> {
    use image::ImageFormat;
    use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};

    let hint = ImageFormatHint::Exact(ImageFormat::Avif);
    Err(ImageError::Unsupported(UnsupportedError::from_format_and_kind(
        hint.clone(),
        UnsupportedErrorKind::Format(hint),
    )))
}

/// Lossy VP8 at `quality`, or VP8L when `lossless` is set.
fn encode_webp(pixels: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, EncodeError> {
    let alpha = !matches!(params.options, FormatOptions::WebP { alpha: false });
    let quality = if params.lossless {
        100.0
    } else {
        params.quality.unwrap_or(FALLBACK_QUALITY).clamp(0.0, 1.0) * 100.0
    };

    let image = to_8bit(pixels, alpha);
    let (width, height) = (image.width(), image.height());
    let encoder = match &image {
        DynamicImage::ImageRgba8(rgba) => webp::Encoder::from_rgba(rgba.as_raw(), width, height),
        DynamicImage::ImageRgb8(rgb) => webp::Encoder::from_rgb(rgb.as_raw(), width, height),
        _ => return Err(EncodeError::rejected(OutputFormat::WebP, "unexpected pixel layout")),
    };

    encoder
        .encode_simple(params.lossless, quality)
        .map(|memory| memory.to_vec())
        .map_err(|e| EncodeError::rejected(OutputFormat::WebP, format!("{e:?}")))
}

/// Requested options this codec accepts but cannot honour for `format`.
pub fn unapplied_options(format: OutputFormat, params: &EncodeParams) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if format == OutputFormat::Jpeg
        && matches!(params.options, FormatOptions::Jpeg { progressive: true })
    {
        ignored.push("progressive");
    }
    if params.preserve_metadata {
        ignored.push("preserve_metadata");
    }
    ignored
}

/// Maps 0.0-1.0 onto the 1-100 scale the `image` encoders take.
fn quality_percent(quality: Option<f32>) -> u8 {
    let quality = quality.unwrap_or(FALLBACK_QUALITY);
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Maps a 0-9 zlib style level onto the encoder's presets.
fn png_compression(level: u8) -> CompressionType {
    match level {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn to_8bit(pixels: &DynamicImage, alpha: bool) -> DynamicImage {
    match (pixels, alpha) {
        (DynamicImage::ImageRgba8(_), true) | (DynamicImage::ImageRgb8(_), false) => pixels.clone(),
        (_, true) => DynamicImage::ImageRgba8(pixels.to_rgba8()),
        (_, false) => DynamicImage::ImageRgb8(pixels.to_rgb8()),
    }
}
