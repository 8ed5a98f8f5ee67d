use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::utils::ConverterError;

/// Target encodings the converter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    WebP,
    Jpeg,
    Png,
    Gif,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        Self::WebP,
        Self::Jpeg,
        Self::Png,
        Self::Gif,
        Self::Avif,
    ];

    /// Canonical lowercase name, also used as the output file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebP => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Avif => "avif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
        }
    }

    /// Whether the format has a lossless encode mode
    pub fn supports_lossless(&self) -> bool {
        matches!(self, Self::WebP | Self::Png | Self::Gif)
    }

    /// Whether a quality value has any effect for this format.
    ///
    /// PNG and GIF are lossless by nature; lossless mode makes quality irrelevant.
    pub fn requires_quality_setting(&self, lossless: bool) -> bool {
        match self {
            Self::Png | Self::Gif => false,
            _ if lossless => false,
            Self::WebP | Self::Jpeg | Self::Avif => true,
        }
    }

    /// Formats whose output size can be steered through the quality knob
    pub fn supports_size_targeting(&self) -> bool {
        matches!(self, Self::WebP | Self::Jpeg | Self::Avif)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ConverterError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "webp" => Ok(Self::WebP),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "avif" => Ok(Self::Avif),
            _ => Err(ConverterError::invalid_option(format!(
                "Unsupported output format: {}", name
            ))),
        }
    }
}

/// Subtype of a declared media type, e.g. `image/png` -> `png`.
pub fn format_label_from_mime(media_type: &str) -> String {
    media_type
        .split_once('/')
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Media type for a source file, guessed from its extension.
pub fn mime_from_extension(path: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "avif" => Some("image/avif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}
