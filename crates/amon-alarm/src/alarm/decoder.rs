//! Wire-line decoder.
//!
//! The sender speaks a two-token vocabulary, one token per line.  Decoding
//! is a pure function of the input bytes.

use amon_core::Signal;
use thiserror::Error;

pub const TOKEN_ON: &str = "ALARME_ON";
pub const TOKEN_OFF: &str = "ALARME_OFF";

/// Why a line did not produce a [`Signal`].  Always handled locally: the
/// line is dropped and at most logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The bytes are not valid UTF-8.
    #[error("line is not valid UTF-8")]
    Encoding,
    /// Valid text outside the vocabulary.
    #[error("unrecognised line '{0}'")]
    Unrecognized(String),
    /// Nothing but whitespace.
    #[error("empty line")]
    Empty,
}

/// Decode one raw line.  Surrounding whitespace (including `\r`) is
/// ignored; matching is exact and case-sensitive.
pub fn decode(raw: &[u8]) -> Result<Signal, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::Encoding)?;
    match text.trim() {
        "" => Err(DecodeError::Empty),
        TOKEN_ON => Ok(Signal::On),
        TOKEN_OFF => Ok(Signal::Off),
        other => Err(DecodeError::Unrecognized(other.to_string())),
    }
}
