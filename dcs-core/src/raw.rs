// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `raw` module implements the raw DCS stream interchange container.
//!
//! A raw stream file wraps one compressed audio stream, exactly as it would
//! appear in ROM, with a small header identifying the bit-stream dialect:
//!
//! ```text
//! "DCSa"         4 bytes, literal text, file type signature
//! <fmtVersion>   u16 BE; 0x9301 = OS93a, 0x9302 = OS93b, 0x9400 = OS94+
//! <channels>     u16 BE; always 1
//! <rate>         u16 BE; always 31250 (0x7A12)
//! <reserved>     22 bytes, all zero
//! <dataSize>     u32 BE, length of the stream data
//! <streamData>   the stream bytes
//! ```
//!
//! All integer fields are big-endian, matching the rest of the ROM format.

use crate::errors::{decode_error, Result};
use crate::rom::OsVersion;

/// File type signature.
pub const SIGNATURE: &[u8; 4] = b"DCSa";

/// Total size of the header preceding the stream data.
pub const HEADER_LEN: usize = 36;

/// Format version code for OS93a streams.
pub const FORMAT_OS93A: u16 = 0x9301;
/// Format version code for OS93b streams.
pub const FORMAT_OS93B: u16 = 0x9302;
/// Format version code for OS94+ streams.
pub const FORMAT_OS94: u16 = 0x9400;

/// Map a format version code to the firmware generation that plays it.
pub fn format_os_version(format_version: u16) -> Option<OsVersion> {
    match format_version {
        FORMAT_OS93A => Some(OsVersion::Os93a),
        FORMAT_OS93B => Some(OsVersion::Os93b),
        FORMAT_OS94 => Some(OsVersion::Os94),
        _ => None,
    }
}

/// Parsed raw stream file header.
#[derive(Debug, Clone, Copy)]
pub struct RawHeader {
    pub format_version: u16,
    pub data_len: u32,
}

/// Check whether `bytes` begins with a valid raw DCS stream header, and
/// parse it if so.
pub fn parse_header(bytes: &[u8]) -> Result<RawHeader> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != SIGNATURE {
        return decode_error("raw: not a raw DCS stream file");
    }

    let format_version = (u16::from(bytes[4]) << 8) | u16::from(bytes[5]);
    if format_os_version(format_version).is_none() {
        return decode_error("raw: unrecognized format version");
    }
    if bytes[6] != 0 || bytes[7] != 1 {
        return decode_error("raw: channel count must be 1");
    }
    if bytes[8] != 0x7A || bytes[9] != 0x12 {
        return decode_error("raw: sample rate must be 31250");
    }

    let data_len = (u32::from(bytes[32]) << 24)
        | (u32::from(bytes[33]) << 16)
        | (u32::from(bytes[34]) << 8)
        | u32::from(bytes[35]);

    Ok(RawHeader { format_version, data_len })
}

/// Build a raw stream file from a compressed stream.
pub fn write_file(format_version: u16, stream: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + stream.len());
    out.extend_from_slice(SIGNATURE);
    out.push((format_version >> 8) as u8);
    out.push(format_version as u8);
    out.extend_from_slice(&[0x00, 0x01, 0x7A, 0x12]);
    out.extend_from_slice(&[0u8; 22]);
    out.extend_from_slice(&(stream.len() as u32).to_be_bytes());
    out.extend_from_slice(stream);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_round_trip() {
        let stream = [0x00u8, 0x02, 0xFF, 0xFF, 0x10];
        let file = write_file(FORMAT_OS94, &stream);
        assert_eq!(file.len(), HEADER_LEN + stream.len());

        let hdr = parse_header(&file).unwrap();
        assert_eq!(hdr.format_version, FORMAT_OS94);
        assert_eq!(hdr.data_len as usize, stream.len());
        assert_eq!(&file[HEADER_LEN..], &stream);
    }

    #[test]
    fn verify_rejects_bad_signature() {
        let mut file = write_file(FORMAT_OS93B, &[0, 0]);
        file[0] = b'X';
        assert!(parse_header(&file).is_err());
    }

    #[test]
    fn verify_rejects_bad_version() {
        let mut file = write_file(FORMAT_OS94, &[0, 0]);
        file[5] = 0x05;
        assert!(parse_header(&file).is_err());
    }
}
