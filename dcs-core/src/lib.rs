// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared primitives for the DCS pinball audio toolchain.
//!
//! The DCS sound boards used in Williams/Bally/Midway pinball machines of the
//! 1990s ran a frequency-domain, banded, Huffman-coded lossy audio codec on an
//! ADSP-2105 fixed-point DSP. This crate provides the pieces that both the
//! decoder and the encoder build on: the error type, the 1.15 fractional
//! fixed-point arithmetic of the original DSP (whose rounding behaviour is
//! load-bearing for bit-exact output), MSB-first packed bit streams, and the
//! 24-bit ROM address model shared by the two hardware generations.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all dcs-rs crates. Please see the
// workspace Cargo.toml for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

pub mod errors;
pub mod fixed;
pub mod io;
pub mod raw;
pub mod rom;

/// Number of PCM samples produced per DCS frame (7.68 ms at 31250 Hz).
pub const SAMPLES_PER_FRAME: usize = 240;

/// Fixed DCS playback sample rate in Hz.
pub const SAMPLE_RATE: u32 = 31250;

/// Maximum number of mixing channels across all firmware revisions. The 1993
/// firmware supports 4 channels and most later games 6; Safe Cracker uses 8.
pub const MAX_CHANNELS: usize = 8;
