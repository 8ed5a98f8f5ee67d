pub mod error;
pub mod formats;
pub mod fs;

pub use error::{ConverterError, ConverterResult, EncodeError, ErrorKind};
pub use formats::{OutputFormat, format_label_from_mime, mime_from_extension};
pub use fs::{
    format_file_size,
    output_file_name,
    read_source_file,
    size_reduction_percent,
};
