// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `frame` module implements the bit-stream frame decompressors.
//!
//! Three dialects coexist in the released ROMs. The OS94+ format is used by
//! every title from 1994 on. The 1993 titles share a distinct format for
//! Type 0 streams (and all OS93b streams); OS93a additionally has its own
//! scheme for Type 1 streams, built around a fixed sample-pair table. The
//! dialect is fixed per firmware generation, so it is selected once when
//! the decoder initializes.

mod os93;
mod os93a;
mod os94;

use dcs_core::errors::Result;
use dcs_core::rom::OsVersion;

use crate::channel::AudioStream;
use crate::transform::{transform_frame_93, transform_frame_94, FRAME_BUFFER_LEN};

/// Result of decompressing one frame.
pub struct FrameStatus {
    /// The frame decoder hit corrupt data; the channel must be stopped on
    /// the next main-loop pass.
    pub stop: bool,
}

/// Bit-stream dialect, with the transform algorithm paired to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Os93a,
    Os93b,
    Os94Plus,
}

impl Dialect {
    pub fn for_os_version(os: OsVersion) -> Dialect {
        match os {
            OsVersion::Os93a => Dialect::Os93a,
            OsVersion::Os93b => Dialect::Os93b,
            OsVersion::Os94 | OsVersion::Os95 => Dialect::Os94Plus,
        }
    }

    /// Decompress one frame from the stream, mixing the scaled samples into
    /// the frame buffer.
    pub fn decompress_frame(
        self,
        stream: &mut AudioStream,
        frame_buf: &mut [u16; FRAME_BUFFER_LEN],
        mixing_multiplier: u16,
    ) -> Result<FrameStatus> {
        match self {
            Dialect::Os93a => os93a::decompress_frame(stream, frame_buf, mixing_multiplier),
            Dialect::Os93b => os93::decompress_frame(stream, frame_buf, mixing_multiplier),
            Dialect::Os94Plus => os94::decompress_frame(stream, frame_buf, mixing_multiplier),
        }
    }

    /// Transform the frame buffer into PCM output.
    pub fn transform_frame(
        self,
        frame_buf: &mut [u16; FRAME_BUFFER_LEN],
        overlap: &mut [u16; 16],
        output: &mut [u16; 240],
        vol_shift: i32,
    ) {
        match self {
            Dialect::Os93a | Dialect::Os93b => {
                transform_frame_93(frame_buf, overlap, output, vol_shift)
            }
            Dialect::Os94Plus => transform_frame_94(frame_buf, overlap, output, vol_shift),
        }
    }
}
