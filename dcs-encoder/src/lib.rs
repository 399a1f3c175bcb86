// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DCS audio stream encoder, script compiler, and ROM image builder.
//!
//! The encoder consumes 31250 Hz PCM and produces compressed streams in the
//! native DCS byte format, playable by the original sound board firmware.
//! The 1994+ format is fully supported; the 1993 formats are supported for
//! Type 0 streams (the OS93a Type 1 sample-pair format has no encoder).
//! Sample-rate conversion and compressed-audio file decoding are outside
//! this crate; feed it PCM.
//!
//! ```no_run
//! use dcs_encoder::{Encoder, CompressionParams};
//!
//! let encoder = Encoder::new(CompressionParams::default());
//! let mut stream = encoder.open_stream();
//! stream.write_i16(&[0i16; 24000]);
//! let audio = encoder.close_stream(stream).unwrap();
//! assert_eq!(audio.n_frames, 100);
//! ```
//!
//! The [`compiler`] module builds complete ROM sets: it compiles track
//! scripts, lays out streams with best-fit-decreasing bin packing, and
//! emits a PinMame-style ZIP.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all dcs-rs crates. Please see the
// workspace Cargo.toml for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

use log::info;

use dcs_core::errors::{decode_error, unsupported_error, Result};
use dcs_core::raw;
use dcs_core::rom::OsVersion;

pub mod codebooks;
pub mod compiler;
pub mod compress;
pub mod dft;
pub mod rom_builder;
pub mod stream;

pub use stream::EncoderStream;

use compress::StreamWriter;

/// An encoded DCS audio stream, in the exact byte layout it occupies in
/// ROM: a frame-count prefix, the stream header, and the packed bit stream.
#[derive(Clone)]
pub struct DcsAudio {
    pub n_frames: u16,
    pub data: Vec<u8>,
}

/// Compression tuning. The defaults match the settings that reproduce
/// typical original-ROM streams.
#[derive(Debug, Clone, Copy)]
pub struct CompressionParams {
    /// Target format dialect: 0x9301 (OS93a), 0x9302 (OS93b), or 0x9400.
    /// The dialect must match the firmware that will play the stream.
    pub format_version: u16,
    /// Stream major type 0 or 1, or -1 to try both and keep the smaller.
    pub stream_format_type: i32,
    /// Stream sub-type 0-3, or -1 to try 0 and 3 and keep the smaller.
    /// Sub-types 1 and 2 decode identically to 3, so they are never
    /// searched.
    pub stream_format_sub_type: i32,
    /// Fraction of total RMS power to retain when discarding high bands.
    pub power_band_cutoff: f32,
    /// Nominal bits per second, used to seed the per-band scaling codes.
    pub target_bit_rate: i32,
    /// Bands whose dynamic range falls below this are dropped per frame.
    pub minimum_dynamic_range: f32,
    /// Ceiling on the RMS quantization error per band per frame.
    pub maximum_quantization_error: f32,
}

impl Default for CompressionParams {
    fn default() -> Self {
        CompressionParams {
            format_version: 0x9400,
            stream_format_type: 1,
            stream_format_sub_type: 3,
            power_band_cutoff: 0.97,
            target_bit_rate: 128_000,
            minimum_dynamic_range: 10.0 / 32768.0,
            maximum_quantization_error: 10.0 / 32768.0,
        }
    }
}

impl CompressionParams {
    /// The firmware generation that plays this dialect.
    pub fn os_version(&self) -> Option<OsVersion> {
        raw::format_os_version(self.format_version)
    }
}

/// The DCS audio encoder.
pub struct Encoder {
    pub params: CompressionParams,
}

impl Encoder {
    pub fn new(params: CompressionParams) -> Encoder {
        Encoder { params }
    }

    /// Begin a new stream. Write 31250 Hz PCM into it, then pass it to
    /// [`Encoder::close_stream`].
    pub fn open_stream(&self) -> EncoderStream {
        EncoderStream::new(self.params)
    }

    /// Finish a stream: choose the format variant, compress every frame,
    /// and return the encoded bytes.
    pub fn close_stream(&self, mut stream: EncoderStream) -> Result<DcsAudio> {
        stream.finish();

        // normalize the power sums by band size and find the cumulative
        // power cutoff, scanning up from the lowest band
        let is_93 = (self.params.format_version & 0xFF00) == 0x9300;
        let mut rms_power = [0f32; 16];
        let mut total_power = 0f32;
        for band in 0..16 {
            let norm = if is_93 {
                1.0
            }
            else {
                16.0 / codebooks::BAND_SAMPLE_COUNTS_94[band] as f32
            };
            rms_power[band] = (stream.power_sum[band] * norm).sqrt();
            total_power += rms_power[band];
        }

        let mut bands_to_keep = 16usize;
        if total_power != 0.0 {
            let mut power_below = 0f32;
            for (band, &p) in rms_power.iter().enumerate() {
                power_below += p / total_power;
                if power_below >= self.params.power_band_cutoff {
                    bands_to_keep = band;
                    break;
                }
            }
        }

        // OS93 has no sub-type distinction; collapse the request so the
        // candidate filter below matches exactly one sub-type per type
        let desired_type = self.params.stream_format_type;
        let desired_sub_type = if is_93 { 0 } else { self.params.stream_format_sub_type };

        // compress under every candidate format and keep the smallest
        const FORMATS: [(i32, i32); 4] = [(0, 0), (0, 3), (1, 0), (1, 3)];
        let mut best: Option<StreamWriter> = None;
        for &(major, minor) in FORMATS.iter() {
            if is_93 && minor != 0 {
                continue;
            }

            // A wildcard match never selects the unsupported OS93a Type 1
            // encoder; an explicit request still reaches it, so the caller
            // gets the specific unsupported-format error.
            if self.params.format_version == 0x9301 && major == 1 && desired_type < 0 {
                continue;
            }

            if (desired_type >= 0 && desired_type != major)
                || (desired_sub_type >= 0 && desired_sub_type != minor)
            {
                continue;
            }

            let mut params = self.params;
            params.stream_format_type = major;
            params.stream_format_sub_type = minor;
            let mut writer = StreamWriter::new(params);
            compress::compress_stream(&stream, &mut writer, bands_to_keep)?;

            if best.as_ref().map_or(true, |b| writer.stream_len() < b.stream_len()) {
                best = Some(writer);
            }
        }

        let Some(best) = best else {
            return unsupported_error(
                "encode: no available stream format matches the requested parameters",
            );
        };

        let n_frames = stream.frames.len() as u16;
        let audio = best.store(n_frames);
        info!(
            "encode: {} frames -> {} bytes ({:.1}:1)",
            n_frames,
            audio.data.len(),
            (usize::from(n_frames) * 480) as f32 / audio.data.len().max(1) as f32
        );
        Ok(audio)
    }

    /// Encode a buffer of 31250 Hz signed 16-bit PCM in one call.
    pub fn encode_pcm(&self, pcm: &[i16]) -> Result<DcsAudio> {
        let mut stream = self.open_stream();
        stream.write_i16(pcm);
        self.close_stream(stream)
    }

    /// Import a raw DCS stream file ("DCSa" container). A stream whose
    /// dialect is playable by the target firmware passes through without
    /// re-encoding; anything else is decoded with a standalone decoder and
    /// re-encoded under the current parameters.
    pub fn encode_raw_file(&self, file: &[u8]) -> Result<DcsAudio> {
        let hdr = raw::parse_header(file)?;
        let data = &file[raw::HEADER_LEN..];
        if data.len() < hdr.data_len as usize {
            return decode_error("raw: truncated stream data");
        }
        let data = &data[..hdr.data_len as usize];
        if data.len() < 3 {
            return decode_error("raw: stream too short");
        }
        let n_frames = (u16::from(data[0]) << 8) | u16::from(data[1]);

        // Dialect compatibility: an exact version match always plays, and
        // the two 1993 dialects share their Type 0 format.
        let stream_major_type = (data[2] & 0x80) >> 7;
        let compatible = hdr.format_version == self.params.format_version
            || ((hdr.format_version & 0xFF00) == 0x9300
                && (self.params.format_version & 0xFF00) == 0x9300
                && stream_major_type == 0);

        if compatible {
            return Ok(DcsAudio { n_frames, data: data.to_vec() });
        }

        // transcode: decode with a standalone decoder for the source
        // dialect, then re-encode
        let source_os = match raw::format_os_version(hdr.format_version) {
            Some(os) => os,
            None => return decode_error("raw: unrecognized format version"),
        };

        let mut decoder = dcs_decoder::Decoder::new(Box::new(dcs_decoder::NullHost));
        decoder.init_standalone(source_os);
        decoder.soft_boot()?;
        decoder.set_master_volume(255);
        decoder.load_audio_stream(0, data.to_vec(), 0xFF)?;

        let mut stream = self.open_stream();
        // one extra frame fades the tail to silence through the overlap
        let mut buf = [0i16; 240];
        for _ in 0..u32::from(n_frames) + 1 {
            for s in buf.iter_mut() {
                *s = decoder.get_next_sample()?;
            }
            stream.write_i16(&buf);
        }

        self.close_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_stream(audio: &DcsAudio, os: OsVersion, frames: usize) -> Vec<i16> {
        let mut dec = dcs_decoder::Decoder::new(Box::new(dcs_decoder::NullHost));
        dec.init_standalone(os);
        dec.soft_boot().unwrap();
        dec.set_master_volume(255);
        dec.load_audio_stream(0, audio.data.clone(), 0xFF).unwrap();

        let mut out = Vec::with_capacity(frames * 240);
        for _ in 0..frames * 240 {
            out.push(dec.get_next_sample().unwrap());
        }
        out
    }

    #[test]
    fn verify_silent_stream_round_trip() {
        // 100 frames of silence at OS94 Type 1 sub-type 3
        let params = CompressionParams {
            stream_format_type: 1,
            stream_format_sub_type: 3,
            ..Default::default()
        };
        let audio = Encoder::new(params).encode_pcm(&[0i16; 24000]).unwrap();
        assert_eq!(audio.n_frames, 100);

        // frame count prefix
        assert_eq!(audio.data[0], 0);
        assert_eq!(audio.data[1], 100);

        // Type 1 bit set in byte 0; sub-type 3 bits in bytes 1 and 2
        let header = &audio.data[2..18];
        assert_ne!(header[0] & 0x80, 0);
        assert_ne!(header[1] & 0x80, 0);
        assert_ne!(header[2] & 0x80, 0);

        // silence decodes to silence, all 24000 samples of it
        let pcm = decode_stream(&audio, OsVersion::Os94, 100);
        assert!(pcm.iter().all(|&s| s == 0));
    }

    #[test]
    fn verify_tone_header_is_well_formed() {
        // concentrate the power low so the cutoff drops the upper bands
        let tone: Vec<i16> = (0..24000)
            .map(|t| {
                let th = 2.0 * std::f32::consts::PI * (t as f32) / 64.0;
                (th.sin() * 12000.0) as i16
            })
            .collect();
        let audio = Encoder::new(Default::default()).encode_pcm(&tone).unwrap();

        // one 0x7F marker terminates the band list, at index <= 15, and
        // every byte after it reads as past-the-end too
        let header = &audio.data[2..18];
        let first_end = header.iter().position(|&b| (b & 0x7F) == 0x7F);
        let first_end = first_end.expect("no band list terminator");
        assert!(first_end <= 15);
        assert!(header[first_end..].iter().all(|&b| (b & 0x7F) == 0x7F));
        assert!(first_end > 0);
    }

    #[test]
    fn verify_impulse_round_trip() {
        // A unit impulse at the start of a one-frame stream. An impulse
        // spreads its power evenly across the spectrum, so the band cutoff
        // is lifted to retain every band; the residual is then pure
        // quantization error.
        let mut pcm = [0i16; 240];
        pcm[0] = 32767;
        let params = CompressionParams { power_band_cutoff: 1.01, ..Default::default() };
        let audio = Encoder::new(params).encode_pcm(&pcm).unwrap();
        assert_eq!(audio.n_frames, 1);

        // The encoder's analysis window leads the PCM by 16 samples of
        // phantom overlap, so the impulse lands 16 samples into the
        // decoded frame. Peak reconstruction error stays within 1 ppt of
        // full scale.
        let out = decode_stream(&audio, OsVersion::Os94, 1);
        let (peak_pos, &peak) =
            out.iter().enumerate().max_by_key(|(_, &s)| i32::from(s).abs()).unwrap();
        assert_eq!(peak_pos, 16);
        assert!((i32::from(peak) - 32767).abs() <= 256, "peak {}", peak);

        // away from the impulse, the reconstruction stays near silence
        for (t, &s) in out.iter().enumerate() {
            if t < 8 || t > 24 {
                assert!(i32::from(s).abs() <= 256, "sample {} = {}", t, s);
            }
        }
    }

    #[test]
    fn verify_tone_round_trip_all_dialects() {
        let tone: Vec<i16> = (0..2400)
            .map(|t| {
                let th = 2.0 * std::f32::consts::PI * (t as f32) / 100.0;
                (th.sin() * 9000.0) as i16
            })
            .collect();

        for (version, major, os) in [
            (0x9400u16, 0i32, OsVersion::Os94),
            (0x9400, 1, OsVersion::Os94),
            (0x9302, 0, OsVersion::Os93b),
            (0x9302, 1, OsVersion::Os93b),
            (0x9301, 0, OsVersion::Os93a),
        ] {
            let params = CompressionParams {
                format_version: version,
                stream_format_type: major,
                stream_format_sub_type: if version == 0x9400 { 3 } else { 0 },
                ..Default::default()
            };
            let audio = Encoder::new(params).encode_pcm(&tone).unwrap();
            let out = decode_stream(&audio, os, audio.n_frames as usize);

            // compare the decoded signal against the source, allowing for
            // the 16-sample analysis lead and the quantization budget
            let mut err_sum = 0f64;
            let mut n = 0f64;
            for t in 0..tone.len() - 16 {
                let want = f64::from(tone[t]);
                let got = f64::from(out[t + 16]);
                err_sum += (want - got) * (want - got);
                n += 1.0;
            }
            let rms = (err_sum / n).sqrt();
            assert!(
                rms < 400.0,
                "dialect {:04x}/{}: rms error {}",
                version,
                major,
                rms
            );
        }
    }

    #[test]
    fn verify_wildcard_search_picks_a_format() {
        let params = CompressionParams {
            stream_format_type: -1,
            stream_format_sub_type: -1,
            ..Default::default()
        };
        let audio = Encoder::new(params).encode_pcm(&[0i16; 2400]).unwrap();
        assert_eq!(audio.n_frames, 10);
    }

    #[test]
    fn verify_os93a_type1_is_rejected() {
        let params = CompressionParams {
            format_version: 0x9301,
            stream_format_type: 1,
            stream_format_sub_type: 0,
            ..Default::default()
        };
        assert!(Encoder::new(params).encode_pcm(&[0i16; 240]).is_err());
    }

    #[test]
    fn verify_raw_passthrough() {
        let audio = Encoder::new(Default::default()).encode_pcm(&[0i16; 480]).unwrap();
        let file = dcs_core::raw::write_file(0x9400, &audio.data);

        let back = Encoder::new(Default::default()).encode_raw_file(&file).unwrap();
        assert_eq!(back.data, audio.data);
    }
}
