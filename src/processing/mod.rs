mod archive;
mod codec;
mod dimensions;
mod options;
mod pipeline;
mod size_target;

pub use archive::{ARCHIVE_NAME, create_archive};
pub use codec::{Decoder, EncodeParams, Encoder, ImageCodec};
pub use dimensions::plan;
pub use options::{OptionResolver, RawOptions};
pub use pipeline::ConversionPipeline;
pub use size_target::{MAX_ATTEMPTS, SearchOutcome, SizeTargetingSearch};
