// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod processing;
pub mod worker;

// Public exports for external consumers
pub use core::{
    BatchProgress, ConversionJob, ConversionRequest, ConversionResult, ConverterConfig, JobEvent,
    JobId, JobState, SettingsStore, SourceFile,
};
pub use processing::{ConversionPipeline, ImageCodec, OptionResolver, RawOptions, create_archive};
pub use utils::{ConverterError, ConverterResult, OutputFormat};
pub use worker::{BatchScheduler, WorkerError, WorkerPool};

// The command line front end lives in main.rs and only uses this public API.
