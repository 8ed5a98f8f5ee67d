use std::path::Path;
use tokio::fs;
use crate::core::SourceFile;
use crate::utils::{ConverterError, ConverterResult, OutputFormat, mime_from_extension};

/// Reads a file from disk into a [`SourceFile`].
///
/// The declared media type is taken from the extension; files without a
/// recognised image extension are rejected.
pub async fn read_source_file(path: impl AsRef<Path>) -> ConverterResult<SourceFile> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ConverterError::io(format!("Invalid file name: {}", path.display())))?
        .to_string();

    let media_type = mime_from_extension(&name).ok_or_else(|| {
        ConverterError::invalid_option(format!("Not an image file: {}", path.display()))
    })?;

    let bytes = fs::read(path)
        .await
        .map_err(|e| ConverterError::io(format!("Failed to read {}: {}", path.display(), e)))?;

    Ok(SourceFile::new(name, media_type, bytes))
}

/// Derives the output file name for `input_name` converted to `format`.
///
/// `photo.png` -> `photo-webp.webp`; a base name that already ends in
/// `-webp` or `_webp` only gets the extension.
pub fn output_file_name(input_name: &str, format: OutputFormat) -> String {
    let base = strip_extension(input_name);
    let ext = format.as_str();

    let lower = base.to_lowercase();
    let tagged = [format!("-{ext}"), format!("_{ext}")]
        .iter()
        .any(|suffix| lower.ends_with(suffix.as_str()));

    if tagged {
        format!("{base}.{ext}")
    } else {
        format!("{base}-{ext}.{ext}")
    }
}

/// Removes the last `.ext` from a file name, leaving dotfiles and names without extension intact.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => &name[..idx],
        _ => name,
    }
}

/// Human readable byte count ("512 B", "2.50 KB", "1.20 MB").
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Size reduction in whole percent; growth is reported as 0.
pub fn size_reduction_percent(original_size: u64, new_size: u64) -> u32 {
    if original_size == 0 {
        return 0;
    }
    let reduction = (original_size as f64 - new_size as f64) / original_size as f64 * 100.0;
    if reduction < 0.0 { 0 } else { reduction.round() as u32 }
}
