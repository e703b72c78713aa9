pub mod analyzer;
pub mod config;
pub mod decoder;
pub mod dump;
mod error;
pub mod pipeline;
pub mod types;

pub use config::PipelineConfig;
pub use decoder::{CustomAction, DecodedReplay, GameInfo, ReplayDecoder, RosterPlayer};
pub use dump::DumpDecoder;
pub use error::*;
pub use pipeline::{DiagnosticsMuted, Pipeline, PipelineResult};
pub use strum;
