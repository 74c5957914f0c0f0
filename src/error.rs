use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing a playlist.
///
/// The taxonomy distinguishes "not HLS at all" (`Unrecognized`) from "valid
/// header, malformed body" (`Format`) so callers can decide whether a retry
/// of the fetch makes sense. I/O errors from the underlying stream are
/// propagated unchanged, never wrapped as format failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not recognizable as any HLS playlist dialect: the
    /// mandatory `#EXTM3U` header is missing.
    #[error("input does not start with the #EXTM3U header")]
    Unrecognized,

    /// The input carries a valid header but violates the playlist grammar.
    #[error("malformed playlist: {0}")]
    Format(FormatError),

    /// An error from the underlying byte stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Details of a structural grammar violation: a human-readable reason and,
/// when available, the offending source line.
#[derive(Debug)]
pub struct FormatError {
    pub reason: String,
    pub line: Option<String>,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.line {
            Some(line) => write!(f, "{} in line {:?}", self.reason, line),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl Error {
    pub(crate) fn format(reason: impl Into<String>) -> Error {
        Error::Format(FormatError {
            reason: reason.into(),
            line: None,
        })
    }

    pub(crate) fn format_at(reason: impl Into<String>, line: &str) -> Error {
        Error::Format(FormatError {
            reason: reason.into(),
            line: Some(line.to_string()),
        })
    }
}
