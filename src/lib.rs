
pub mod cluster;
pub mod config;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod simulation;
pub mod tracing_init;

pub use cluster::{extract_from_frame, extract_inter_channel, CrosstalkEstimate, QuadrantMap};
pub use config::{ExtractorConfig, FM0_PREAMBLE};
pub use detector::{DetectorEvent, FrameDetector, ReplyFrame, SampleWindow};
pub use error::ExtractError;
pub use extractor::extract_crosstalk;
