pub mod action_dump;
pub mod analyzer;
pub mod channel;
pub mod matcher;
pub mod metadata;
pub mod payload;
pub mod positions;
pub mod survey;

pub use analyzer::*;
