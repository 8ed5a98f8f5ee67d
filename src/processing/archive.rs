//! ZIP packaging of converted outputs.

use std::io::{Cursor, Write};
use tracing::debug;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};
use crate::utils::{ConverterError, ConverterResult};

/// File name offered for a downloaded archive.
pub const ARCHIVE_NAME: &str = "converted_images.zip";

/// Packs `(file name, bytes)` entries into an in-memory deflate ZIP.
///
/// Entry names must be unique.
pub fn create_archive<N, B>(entries: &[(N, B)]) -> ConverterResult<Vec<u8>>
where
    N: AsRef<str>,
    B: AsRef<[u8]>,
{
    if entries.is_empty() {
        return Err(ConverterError::archive("No converted files to download"));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, bytes) in entries {
        writer.start_file(name.as_ref(), options)?;
        writer
            .write_all(bytes.as_ref())
            .map_err(|e| ConverterError::archive(format!("Failed to add {}: {e}", name.as_ref())))?;
    }

    let archive = writer.finish()?.into_inner();
    debug!("Packed {} files into {} byte archive", entries.len(), archive.len());
    Ok(archive)
}
