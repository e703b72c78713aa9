use thiserror::Error;

/// Failures surfaced by a pipeline run.
///
/// Everything below the buffer/roster level (bad lines, missing fragments,
/// unparseable counters) is recovered locally and never shows up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("recording is empty")]
    EmptyRecording,
    #[error("recording too small ({size} bytes, need at least {min}); file may be corrupted or incomplete")]
    RecordingTooSmall { size: usize, min: usize },
    #[error("buffer out of range ({size} bytes); recording may be corrupted")]
    CorruptedRecording { size: usize },
    #[error("replay decoder failed: {0}")]
    DecodeFailed(String),
    #[error("recording contains {found} player(s), need at least {required}")]
    InsufficientPlayers { found: usize, required: usize },
}

/// Failures reported by a [`crate::ReplayDecoder`] implementation.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// The decoder ran off the end of the buffer or hit an impossible offset.
    #[error("read out of range: {0}")]
    OutOfRange(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type IResult<'a, O> = nom::IResult<&'a str, O>;
