//! Per-file conversion: load, plan, resample, encode.

use std::sync::Arc;
use std::time::Instant;
use image::imageops::FilterType;
use tracing::{debug, info, warn};
use crate::core::{ConversionRequest, ConversionResult, Dimensions, JobState, ProgressReporter, SourceFile};
use crate::processing::{Decoder, EncodeParams, Encoder, SizeTargetingSearch, dimensions, size_target};
use crate::utils::{ConverterResult, EncodeError, format_label_from_mime, output_file_name};

/// Progress reported once the encoded bytes exist.
const ENCODED_PROGRESS: u8 = 90;
/// Progress band covered by size-search attempts.
const SEARCH_PROGRESS_START: u8 = 30;
const SEARCH_PROGRESS_END: u8 = 85;

/// Runs one file through decode, resample and encode.
///
/// Synchronous; the worker pool calls it on the blocking thread pool.
#[derive(Clone)]
pub struct ConversionPipeline {
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
}

impl ConversionPipeline {
    pub fn new(decoder: Arc<dyn Decoder>, encoder: Arc<dyn Encoder>) -> Self {
        Self { decoder, encoder }
    }

    /// Pipeline whose decoder and encoder are the same codec.
    pub fn with_codec<C>(codec: C) -> Self
    where
        C: Decoder + Encoder + 'static,
    {
        let codec = Arc::new(codec);
        Self {
            decoder: codec.clone(),
            encoder: codec,
        }
    }

    pub fn encoder(&self) -> &dyn Encoder {
        self.encoder.as_ref()
    }

    /// Converts `source` according to `request`.
    ///
    /// `on_progress` sees non-decreasing percentages:
    /// 5 (loading), 10 (planning), 30 (encoding), 35-85 per size-search
    /// attempt, 90 once encoded, then 100 when the result is built. The
    /// terminal state itself is the caller's to record.
    pub fn convert(
        &self,
        source: &SourceFile,
        request: &ConversionRequest,
        on_progress: &mut dyn FnMut(JobState, u8),
    ) -> ConverterResult<ConversionResult> {
        let start = Instant::now();
        let mut progress = ProgressReporter::new(on_progress);

        progress.enter(JobState::Loading);
        let decoded = self.decoder.decode(source.bytes())?;
        debug!("Decoded {} ({}x{})", source.name, decoded.width(), decoded.height());

        progress.enter(JobState::Planning);
        let target = dimensions::plan(decoded.width(), decoded.height(), &request.resize);
        let pixels = if target == Dimensions::new(decoded.width(), decoded.height()) {
            decoded
        } else {
            debug!("Resizing {} to {}x{}", source.name, target.width, target.height);
            // The decoded buffer is dropped here; only the resampled one is kept.
            decoded.resize_exact(target.width, target.height, FilterType::Lanczos3)
        };

        progress.enter(JobState::Encoding);
        if !self.encoder.supports(request.format) {
            warn!("{} output not available in this build", request.format);
            return Err(EncodeError::UnsupportedFormat(request.format).into());
        }

        let params = EncodeParams::from_request(request);
        let (bytes, target_quality, target_attempts) = match request.target_bytes {
            Some(target_bytes) => {
                let mut on_attempt = |attempt: u32| {
                    progress.report(JobState::Encoding, search_progress(attempt));
                };
                let outcome = SizeTargetingSearch::new(self.encoder.as_ref()).search(
                    &pixels,
                    request.format,
                    &params,
                    target_bytes,
                    &mut on_attempt,
                )?;
                (outcome.bytes, Some(outcome.quality), Some(outcome.attempts))
            }
            None => (self.encoder.encode(&pixels, request.format, &params)?, None, None),
        };
        drop(pixels);
        progress.report(JobState::Encoding, ENCODED_PROGRESS);

        let result = ConversionResult {
            file_name: output_file_name(&source.name, request.format),
            format: request.format,
            original_format: format_label_from_mime(&source.media_type),
            original_size: source.size(),
            output_size: bytes.len() as u64,
            bytes,
            dimensions: target,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            target_quality,
            target_attempts,
        };

        progress.report(JobState::Encoding, JobState::Succeeded.milestone());

        info!(
            "Converted {} -> {} ({} -> {} bytes, {:.1} ms)",
            source.name, result.file_name, result.original_size, result.output_size, result.elapsed_ms
        );
        Ok(result)
    }
}

fn search_progress(attempt: u32) -> u8 {
    let span = (SEARCH_PROGRESS_END - SEARCH_PROGRESS_START) as u32;
    let step = attempt.min(size_target::MAX_ATTEMPTS) * span / size_target::MAX_ATTEMPTS;
    SEARCH_PROGRESS_START + step as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormatOptions, ResizeSettings};
    use crate::processing::ImageCodec;
    use crate::utils::{ConverterError, OutputFormat};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn jpeg_source(name: &str, width: u32, height: u32) -> SourceFile {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
        }));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
        SourceFile::new(name, "image/jpeg", bytes.into_inner())
    }

    fn request(format: OutputFormat) -> ConversionRequest {
        ConversionRequest {
            format,
            quality: 0.9,
            lossless: false,
            target_bytes: None,
            resize: ResizeSettings::default(),
            format_options: FormatOptions::defaults_for(format, 6),
            preserve_metadata: false,
        }
    }

    struct NoAvif;

    impl Encoder for NoAvif {
        fn supports(&self, format: OutputFormat) -> bool {
            format != OutputFormat::Avif
        }

        fn encode(&self, pixels: &DynamicImage, format: OutputFormat, params: &EncodeParams) -> Result<Vec<u8>, EncodeError> {
            ImageCodec.encode(pixels, format, params)
        }
    }

    #[test]
    fn resized_webp_from_jpeg() {
        let source = jpeg_source("photo.jpg", 1000, 500);
        let request = ConversionRequest {
            resize: ResizeSettings {
                enabled: true,
                width: Some(250),
                ..ResizeSettings::default()
            },
            ..request(OutputFormat::WebP)
        };

        let mut seen = Vec::new();
        let result = ConversionPipeline::with_codec(ImageCodec)
            .convert(&source, &request, &mut |state, p| seen.push((state, p)))
            .unwrap();

        assert_eq!(result.file_name, "photo-webp.webp");
        assert_eq!(result.dimensions, Dimensions::new(250, 125));
        assert_eq!(result.original_format, "jpeg");
        assert_eq!(result.output_size, result.bytes.len() as u64);
        assert_eq!(image::guess_format(&result.bytes).unwrap(), ImageFormat::WebP);
        assert_eq!(
            seen,
            vec![
                (JobState::Loading, 5),
                (JobState::Planning, 10),
                (JobState::Encoding, 30),
                (JobState::Encoding, 90),
                (JobState::Encoding, 100),
            ]
        );
    }

    #[test]
    fn jpeg_without_resize_keeps_dimensions() {
        let source = jpeg_source("scan.jpg", 1000, 500);
        let result = ConversionPipeline::with_codec(ImageCodec)
            .convert(&source, &request(OutputFormat::Jpeg), &mut |_, _| {})
            .unwrap();

        assert_eq!(result.dimensions, Dimensions::new(1000, 500));
        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1000, 500));
        assert_eq!(result.target_quality, None);
    }

    #[test]
    fn size_target_records_search() {
        let source = jpeg_source("large.jpeg", 128, 128);
        let request = ConversionRequest {
            target_bytes: Some(2 * 1024),
            ..request(OutputFormat::Jpeg)
        };

        let mut seen = Vec::new();
        let result = ConversionPipeline::with_codec(ImageCodec)
            .convert(&source, &request, &mut |_, p| seen.push(p))
            .unwrap();

        let attempts = result.target_attempts.unwrap();
        assert!((1..=size_target::MAX_ATTEMPTS).contains(&attempts));
        assert!(result.target_quality.is_some());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(result.file_name, "large-jpeg.jpeg");
    }

    #[test]
    fn corrupt_source_fails_in_loading() {
        let source = SourceFile::new("broken.png", "image/png", b"\x89PNG garbage".to_vec());
        let mut seen = Vec::new();
        let err = ConversionPipeline::with_codec(ImageCodec)
            .convert(&source, &request(OutputFormat::Png), &mut |state, _| seen.push(state))
            .unwrap_err();
        assert!(matches!(err, ConverterError::Decode(_)));
        assert_eq!(seen, vec![JobState::Loading]);
    }

    #[test]
    fn unsupported_format_fails_in_encoding() {
        let pipeline = ConversionPipeline::new(Arc::new(ImageCodec), Arc::new(NoAvif));
        let source = jpeg_source("a.jpg", 4, 4);
        let mut last = None;
        let err = pipeline
            .convert(&source, &request(OutputFormat::Avif), &mut |state, p| last = Some((state, p)))
            .unwrap_err();
        assert_eq!(err, ConverterError::Encode(EncodeError::UnsupportedFormat(OutputFormat::Avif)));
        assert_eq!(last, Some((JobState::Encoding, 30)));
    }

    #[test]
    fn search_progress_band() {
        assert_eq!(search_progress(1), 35);
        assert_eq!(search_progress(10), 85);
        assert_eq!(search_progress(50), 85);
    }
}
