// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! dcs-rs is a toolchain for the proprietary compressed audio format of
//! the Williams/Bally/Midway DCS pinball sound boards (1993-1998).
//!
//! The facade re-exports the member crates:
//!
//! * [`core`] — errors, 1.15 fixed-point arithmetic, bit streams, and the
//!   ROM address model.
//! * [`decoder`] — the bit-exact decoder: frame decompressors for the three
//!   stream dialects, the two inverse-transform generations, the track
//!   byte-code interpreter, and the host-facing [`decoder::Decoder`] API.
//! * [`encoder`] — the stream encoder, track script compiler, and ROM
//!   image builder.
//!
//! Decode a ROM set:
//!
//! ```no_run
//! use dcs::decoder::{Decoder, NullHost};
//!
//! let zip = std::fs::read("mm_sound.zip").unwrap();
//! let mut dec = Decoder::new(Box::new(NullHost));
//! dec.load_rom(&zip).unwrap();
//! dec.soft_boot().unwrap();
//! dec.add_track_command(0x0001);
//! let sample: i16 = dec.get_next_sample().unwrap();
//! # let _ = sample;
//! ```

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use dcs_core as core;
pub use dcs_decoder as decoder;
pub use dcs_encoder as encoder;

pub use dcs_core::errors::{DcsError, Result};
pub use dcs_core::rom::{HwVersion, OsVersion, RomPointer};
