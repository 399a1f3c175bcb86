// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `DcsError` provides an enumeration of all possible errors reported by dcs-rs.
#[derive(Debug)]
pub enum DcsError {
    /// An IO error occurred while reading or writing a stream or archive.
    IoError(io::Error),
    /// A ROM image or audio stream contained malformed data and could not be
    /// decoded.
    DecodeError(&'static str),
    /// An unsupported format feature was encountered.
    Unsupported(&'static str),
    /// The decoder hit a fatal condition (invalid track opcode, malformed
    /// track type) and must be re-initialized by the host before continuing.
    ResetRequired,
    /// The end of a stream was reached unexpectedly.
    EndOfStream,
    /// A ROM set could not be built from the compiled input.
    BuildError(String),
}

impl fmt::Display for DcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DcsError::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            DcsError::DecodeError(msg) => {
                write!(f, "malformed data: {}", msg)
            }
            DcsError::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            DcsError::ResetRequired => {
                write!(f, "decoder needs to be reset")
            }
            DcsError::EndOfStream => {
                write!(f, "unexpected end of stream")
            }
            DcsError::BuildError(ref msg) => {
                write!(f, "rom build error: {}", msg)
            }
        }
    }
}

impl error::Error for DcsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            DcsError::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DcsError {
    fn from(err: io::Error) -> DcsError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => DcsError::EndOfStream,
            _ => DcsError::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, DcsError>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(DcsError::DecodeError(desc))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(DcsError::Unsupported(feature))
}

/// Convenience function to create a reset required error.
pub fn reset_error<T>() -> Result<T> {
    Err(DcsError::ResetRequired)
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(DcsError::EndOfStream)
}

/// Convenience function to create a ROM build error.
pub fn build_error<T>(msg: String) -> Result<T> {
    Err(DcsError::BuildError(msg))
}
