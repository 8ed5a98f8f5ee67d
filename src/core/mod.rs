//! Core types and job state.
//!
//! This module contains the fundamental types used throughout the crate:
//! - [`ConversionRequest`]: Normalised options for one conversion
//! - [`ConversionJob`]: One file's request plus its lifecycle state
//! - [`JobState`]: The per-job state machine
//! - [`JobEvent`]: Progress and outcome notifications
//! - [`SettingsStore`]: Last-used options on disk

mod progress;
mod settings;
mod state;
mod task;
mod types;

pub use progress::{BatchProgress, JobEvent, ProgressReporter};
pub use settings::{SETTINGS_KEY, SettingsStore};
pub use state::JobState;
pub use task::{ConversionJob, JobId, JobTicket};
pub use types::{
    ConversionRequest, ConversionResult, ConverterConfig, DEFAULT_MAX_CONCURRENT, Dimensions,
    FormatOptions, OptionDefaults, ResizeSettings, SourceFile,
};
