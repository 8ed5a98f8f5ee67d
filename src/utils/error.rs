//! Error types for the image converter.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.

use std::io;
use thiserror::Error;
use serde::Serialize;
use crate::utils::OutputFormat;

/// Errors reported by an encoder for a single encode call.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum EncodeError {
    /// The runtime has no codec for the requested format
    #[error("{} format is not supported by this runtime", .0.as_str().to_uppercase())]
    UnsupportedFormat(OutputFormat),
    /// The codec refused the pixel buffer or parameters
    #[error("Failed to convert to {format}: {message}")]
    Rejected {
        format: OutputFormat,
        message: String,
    },
}

impl EncodeError {
    pub fn rejected(format: OutputFormat, msg: impl Into<String>) -> Self {
        Self::Rejected { format, message: msg.into() }
    }
}

/// Coarse classification of a [`ConverterError`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidOption,
    Decode,
    Encode,
    UnsupportedFormat,
    Archive,
    Io,
    Settings,
}

/// Main error type for the converter.
///
/// Job failures are stored on the job record, so the type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ConverterError {
    /// Malformed or contradictory conversion options
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Source bytes could not be decoded into pixels
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoder rejected the format or parameters
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Packaging finished outputs failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// File IO error
    #[error("IO error: {0}")]
    IO(String),

    /// Persisted settings could not be read or written
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Convenience result type for converter operations.
pub type ConverterResult<T> = Result<T, ConverterError>;

// Helper methods for error creation
impl ConverterError {
    pub fn invalid_option<T: Into<String>>(msg: T) -> Self {
        Self::InvalidOption(msg.into())
    }

    pub fn decode<T: Into<String>>(msg: T) -> Self {
        Self::Decode(msg.into())
    }

    pub fn archive<T: Into<String>>(msg: T) -> Self {
        Self::Archive(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        Self::IO(msg.into())
    }

    pub fn settings<T: Into<String>>(msg: T) -> Self {
        Self::Settings(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOption(_) => ErrorKind::InvalidOption,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(EncodeError::UnsupportedFormat(_)) => ErrorKind::UnsupportedFormat,
            Self::Encode(_) => ErrorKind::Encode,
            Self::Archive(_) => ErrorKind::Archive,
            Self::IO(_) => ErrorKind::Io,
            Self::Settings(_) => ErrorKind::Settings,
        }
    }
}

// Convert std::io::Error to ConverterError
impl From<io::Error> for ConverterError {
    fn from(err: io::Error) -> Self {
        Self::IO(err.to_string())
    }
}

impl From<serde_json::Error> for ConverterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Settings(err.to_string())
    }
}

impl From<zip::result::ZipError> for ConverterError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_its_own_kind() {
        let err = ConverterError::from(EncodeError::UnsupportedFormat(OutputFormat::Avif));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(
            err.to_string(),
            "Encode error: AVIF format is not supported by this runtime"
        );

        let err = ConverterError::from(EncodeError::rejected(OutputFormat::Jpeg, "bad buffer"));
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert_eq!(err.to_string(), "Encode error: Failed to convert to jpeg: bad buffer");
    }

    #[test]
    fn io_errors_convert() {
        let err: ConverterError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
