// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `compress` module quantizes and entropy-codes frequency-domain
//! frames into the DCS bit-stream formats.
//!
//! The stream-level pass allocates a bit budget across the frequency bands
//! from a fixed psychoacoustic weighting, derives an initial scaling code
//! per band from the stream's dynamic range, and drops high bands beyond
//! the cumulative-power cutoff. Each frame then searches the reachable
//! band-type codes for the narrowest encoding whose RMS quantization error
//! stays under the configured ceiling. OS93 streams additionally search the
//! three band sub-types (direct, delta, double-delta). OS93a Type 1 has no
//! encoder; requesting it reports an unsupported-format error.

use log::debug;

use dcs_core::errors::{unsupported_error, Result};
use dcs_core::io::BitWriter;

use dcs_decoder::tables::{XLAT_BAND_0_2, XLAT_BAND_3_5, XLAT_BAND_6_15};
use dcs_decoder::tables::{PRE_ADJ_MAP_SUBTYPE0, PRE_ADJ_MAP_SUBTYPE3};

use crate::codebooks::{
    BAND_SAMPLE_COUNTS_93, BAND_SAMPLE_COUNTS_93B_TYPE1, BAND_SAMPLE_COUNTS_94, BAND_SHARE,
    CodebookEntry, FRAME_HEADER_CODES_94, HUFF_93_INVERT, HUFF_93_KEEP, SAMPLE_CODEBOOKS_94,
    SCALING_FACTORS,
};
use crate::stream::{EncoderStream, Frame};
use crate::{CompressionParams, DcsAudio};

/// An in-progress compressed stream: the bit stream, the stream header
/// under construction, and the running per-band type codes that mirror the
/// decoder's differential state.
pub(crate) struct StreamWriter {
    pub params: CompressionParams,
    pub header: [u8; 16],
    pub band_type_code: [i32; 16],
    pub bits: BitWriter,
}

impl StreamWriter {
    pub fn new(params: CompressionParams) -> StreamWriter {
        // 0xFF fill marks every band as past-the-end until the header is
        // built; the decoder stops at the first 0x7F low-bits byte
        StreamWriter { params, header: [0xFF; 16], band_type_code: [0; 16], bits: BitWriter::new() }
    }

    fn write_code(&mut self, code: &CodebookEntry) {
        self.bits.write(code.code_word, code.n_bits);
    }

    /// Header length: one byte for OS93a Type 1, 16 bytes otherwise.
    pub fn header_len(&self) -> usize {
        if self.params.format_version == 0x9301 && self.params.stream_format_type == 1 {
            1
        }
        else {
            16
        }
    }

    /// Total encoded size: frame-count prefix, header, packed bits.
    pub fn stream_len(&self) -> usize {
        2 + self.header_len() + self.bits.byte_len()
    }

    /// Assemble the final stream bytes.
    pub fn store(self, n_frames: u16) -> DcsAudio {
        let header_len = self.header_len();
        let body = self.bits.into_bytes();

        let mut data = Vec::with_capacity(2 + header_len + body.len());
        data.extend_from_slice(&n_frames.to_be_bytes());
        data.extend_from_slice(&self.header[..header_len]);
        data.extend_from_slice(&body);

        DcsAudio { n_frames, data }
    }
}

/// Interpretation of a band-type code: the sample bit width, the effective
/// scaling code, and the encoding's reference value (the zero point of the
/// stored sample values).
#[derive(Clone, Copy)]
struct BandEncoding {
    bit_width: i32,
    scale_code: i32,
    ref_val: i32,
}

/// Outcome of testing one band-type code against a band's samples.
#[derive(Clone, Copy)]
struct BandTestResult {
    band_type_code: i32,
    err_sum: f32,
    bit_width: i32,
    pass: bool,
}

impl Default for BandTestResult {
    fn default() -> Self {
        BandTestResult { band_type_code: -1, err_sum: 0.0, bit_width: 0, pass: false }
    }
}

/// Search the reachable band-type codes for the narrowest encoding whose
/// quantization error passes the configured ceiling, breaking ties by
/// minimum error. When nothing passes, the code minimizing error wins.
fn find_best_band_encoding(
    params: &CompressionParams,
    interpret: &dyn Fn(usize, i32) -> BandEncoding,
    min_new_code: i32,
    max_new_code: i32,
    band: usize,
    samples: &[f32],
) -> BandTestResult {
    let n_samples = samples.len();
    let err_sum_max =
        params.maximum_quantization_error * params.maximum_quantization_error * n_samples as f32;

    let mut results = [BandTestResult::default(); 16];
    for test_code in 1..=15i32 {
        // codes unreachable through the delta coding are off limits
        if test_code < min_new_code || test_code > max_new_code {
            continue;
        }

        let enc = interpret(band, test_code);
        // Type 1 scaling adjustments can push the code past the table for
        // extreme inputs; the top factor is the correct saturation.
        let scale_factor = SCALING_FACTORS[(enc.scale_code as usize).min(63)] as f32;

        // Reference the stored values to the midpoint of the unsigned
        // range; the round-trip behaviour is what matters, and biasing to
        // the midpoint sidesteps sign extension at every width.
        let ref_val = if enc.bit_width != 0 { 1 << (enc.bit_width - 1) } else { 0 };
        let mask = 0xFFFFu32 >> (16 - enc.bit_width);

        let mut err_sum = 0.0f32;
        for &orig in samples {
            let scaled = (orig * 32768.0 / scale_factor).round() as i32;
            let stored = ((scaled + ref_val) as u32) & mask;
            let reconstructed = (stored as i32 - ref_val) as f32 * scale_factor / 32768.0;
            let err = reconstructed - orig;
            err_sum += err * err;
        }

        results[test_code as usize] = BandTestResult {
            band_type_code: test_code,
            err_sum,
            bit_width: enc.bit_width,
            pass: err_sum <= err_sum_max,
        };
    }

    results[find_best_result(&results)]
}

fn find_best_result(results: &[BandTestResult]) -> usize {
    // narrowest bit width among the passing encodings, if any pass
    let mut narrowest_pass = -1i32;
    for r in results {
        if r.pass && (narrowest_pass == -1 || r.bit_width < narrowest_pass) {
            narrowest_pass = r.bit_width;
        }
    }

    // among those (or the whole set when nothing passes), minimize error
    let mut min_err = -1.0f32;
    let mut best = 0usize;
    for (i, r) in results.iter().enumerate() {
        if r.band_type_code < 0 {
            continue;
        }
        if narrowest_pass == -1 || r.bit_width == narrowest_pass {
            if min_err < 0.0 || r.err_sum < min_err {
                best = i;
                min_err = r.err_sum;
            }
        }
    }
    best
}

/// Interpret an OS94+ band-type code under the stream's major type.
fn interpret_band_code_94(
    w: &StreamWriter,
    pre_adj: &[u16; 3],
    band: usize,
    band_type_code: i32,
) -> BandEncoding {
    // code 0 is the zero-bit all-zeroes encoding
    if band_type_code == 0 {
        return BandEncoding { bit_width: 0, scale_code: 0, ref_val: 0 };
    }

    let scaling_code = i32::from(w.header[band] & 0x3F);

    if w.params.stream_format_type == 0 {
        // Type 0: the code is the bit width; widths 1-6 are Huffman coded
        // against a midpoint reference, 7+ raw two's complement
        let ref_val = if band_type_code <= 6 { 1 << (band_type_code - 1) } else { 0 };
        BandEncoding { bit_width: band_type_code, scale_code: scaling_code, ref_val }
    }
    else {
        // Type 1: the code selects a (width, scaling adjustment) pair from
        // the per-band translation table
        let (xlat, extra) = if band < 3 {
            (&XLAT_BAND_0_2, i32::from(pre_adj[band]))
        }
        else if band < 6 {
            (&XLAT_BAND_3_5, 0)
        }
        else {
            (&XLAT_BAND_6_15, 0)
        };
        let entry = xlat[band_type_code as usize];
        let bit_width = i32::from(entry.type_code);
        let ref_val = if bit_width >= 1 && bit_width <= 6 { 1 << (bit_width - 1) } else { 0 };
        BandEncoding {
            bit_width,
            scale_code: scaling_code + i32::from(entry.scaling_adj) + extra,
            ref_val,
        }
    }
}

/// Compress one frame in the 1994+ format.
fn compress_frame_94(w: &mut StreamWriter, frame: &Frame) -> Result<()> {
    let sub_type = w.params.stream_format_sub_type;

    // scaling pre-adjustment for bands 0-2, from the previous frame's codes
    let pre_adj_map = if sub_type == 0 { &PRE_ADJ_MAP_SUBTYPE0 } else { &PRE_ADJ_MAP_SUBTYPE3 };
    let mut pre_adj = [0u16; 3];
    for i in 0..3 {
        pre_adj[i] = pre_adj_map[w.band_type_code[i] as usize & 0x0F];
    }

    // First pass: choose each band's new type code and emit the
    // differential frame header.
    let mut first_sample = 0usize;
    for band in 0..16 {
        if (w.header[band] & 0x7F) == 0x7F {
            break;
        }
        let n_samples = BAND_SAMPLE_COUNTS_94[band];
        let old_code = w.band_type_code[band];

        let range = &frame.range[band];
        let new_code = if range.hi - range.lo < w.params.minimum_dynamic_range {
            // negligible content: the zero-bit encoding costs nothing
            0
        }
        else {
            // the delta coding reaches -16..+14 from the previous code
            let interp =
                |band: usize, code: i32| interpret_band_code_94(w, &pre_adj, band, code);
            find_best_band_encoding(
                &w.params,
                &interp,
                old_code - 16,
                old_code + 14,
                band,
                &frame.f[first_sample..first_sample + n_samples],
            )
            .band_type_code
        };

        let delta = new_code - old_code;
        if delta < -16 || delta > 14 {
            return unsupported_error("encode: band type delta out of range");
        }

        w.write_code(&FRAME_HEADER_CODES_94[(delta + 16) as usize]);
        w.band_type_code[band] = new_code;
        first_sample += n_samples;
    }

    // Second pass: emit the band samples.
    let mut first_sample = 0usize;
    for band in 0..16 {
        if (w.header[band] & 0x7F) == 0x7F {
            break;
        }
        let n_samples = BAND_SAMPLE_COUNTS_94[band];
        let enc = interpret_band_code_94(w, &pre_adj, band, w.band_type_code[band]);
        let mask = 0xFFFFu32 >> (16 - enc.bit_width);
        let scale_factor = SCALING_FACTORS[(enc.scale_code as usize).min(63)] as f32;
        let codebook = if enc.bit_width >= 1 && enc.bit_width <= 6 {
            Some(&SAMPLE_CODEBOOKS_94[enc.bit_width as usize - 1])
        }
        else {
            None
        };

        if enc.bit_width != 0 {
            // quantize the band into a staging buffer
            let mut staging = [0i32; 32];
            for (i, s) in staging.iter_mut().take(n_samples).enumerate() {
                *s = (frame.f[first_sample + i] * 32768.0 / scale_factor).round() as i32;
            }

            let mut i = 0usize;
            while i < n_samples {
                let sample = staging[i];
                if sample == 0 && i + 1 < n_samples && staging[i + 1] == 0 && codebook.is_some() {
                    // two consecutive zeroes collapse into the dedicated
                    // double-zero codeword
                    let dz = codebook.unwrap().double_zero;
                    w.bits.write(dz.code_word, dz.n_bits);
                    i += 1;
                }
                else {
                    let stored = ((sample + enc.ref_val) as u32) & mask;
                    match codebook {
                        Some(book) => {
                            let code = book.codes[stored as usize];
                            w.bits.write(code.code_word, code.n_bits);
                        }
                        None => w.bits.write(stored, enc.bit_width),
                    }
                }
                i += 1;
            }
        }

        first_sample += n_samples;
    }

    Ok(())
}

/// Compress one frame in the 1993 format: STTNG streams of both types, and
/// OS93a Type 0 streams.
fn compress_frame_93b(w: &mut StreamWriter, frame: &Frame) -> Result<()> {
    let stream_type = w.params.stream_format_type;
    let sample_counts: &[usize; 16] =
        if stream_type == 1 { &BAND_SAMPLE_COUNTS_93B_TYPE1 } else { &BAND_SAMPLE_COUNTS_93 };

    // interpret a band code: the bit width is the code (+1 for Type 0),
    // the scaling code comes from the band's header byte, and all OS93
    // encodings are plain two's complement with reference zero
    let header = w.header;
    let interpret = move |band: usize, band_type_code: i32| -> BandEncoding {
        if band_type_code == 0 {
            return BandEncoding { bit_width: 0, scale_code: 0, ref_val: 0 };
        }
        let bit_width = band_type_code + if stream_type == 0 { 1 } else { 0 };
        BandEncoding { bit_width, scale_code: i32::from(header[band] & 0x3F), ref_val: 0 }
    };

    let mut last_band_type_code = -1i32;

    // Type 1 streams open each frame with sub-type 0; Type 0 with 2. The
    // sub-type selects direct (0), delta (1), or double-delta (2) samples.
    let mut last_band_sub_type: i32 = if stream_type == 1 { 0 } else { 2 };

    // previous sample and delta carry across bands within the frame
    let mut prv_sample = 0i32;
    let mut prv_delta = 0i32;

    let mut first_sample = 0usize;
    for band in 0..16 {
        let cur_hdr_byte = w.header[band] & 0x7F;
        if cur_hdr_byte == 0x7F {
            break;
        }

        let n_samples = sample_counts[band];
        let scaling_code = (cur_hdr_byte & 0x3F) as usize;
        let scaling_factor = SCALING_FACTORS[scaling_code] as f32;
        let old_band_type_code = w.band_type_code[band];

        // Codes reachable for a given sub-type choice: Type 0 spells the
        // code out in 4 raw bits, so anything goes; Type 1 deltas are
        // bounded by the codebook, and the bound depends on whether the
        // sub-type changes (the Keep book spans -15..+14, Invert -16..+15).
        let code_range = |new_sub_type: i32| -> (i32, i32) {
            if stream_type == 0 {
                (0, 15)
            }
            else if new_sub_type == last_band_sub_type {
                (old_band_type_code - 15, old_band_type_code + 14)
            }
            else {
                (old_band_type_code - 16, old_band_type_code + 15)
            }
        };

        // Stage the direct, delta, and double-delta codings in parallel.
        let prv_frame_last_sample = prv_sample;
        let prv_frame_last_delta = prv_delta;
        let mut buf0 = [0i32; 16];
        let mut buf1 = [0i32; 16];
        let mut buf2 = [0i32; 16];
        for i in 0..n_samples {
            let cur = (frame.f[first_sample + i] * 32768.0 / scaling_factor).round() as i32;
            buf0[i] = cur;
            buf1[i] = cur - prv_sample;
            buf2[i] = cur - prv_sample - prv_delta;
            prv_delta = buf1[i];
            prv_sample = buf0[i];
        }

        // sub-type 0: search the error-bounded encodings directly
        let range0 = code_range(0);
        let band_code_subtype0 = find_best_band_encoding(
            &w.params,
            &interpret,
            range0.0,
            range0.1,
            band,
            &frame.f[first_sample..first_sample + n_samples],
        )
        .band_type_code;

        // sub-types 1 and 2 encode exact integer deltas, so the code is
        // simply the width of the widest delta
        let delta_band_code = |buf: &[i32; 16]| -> i32 {
            let mut lo = buf[0];
            let mut hi = buf[0];
            for &s in buf.iter().take(n_samples).skip(1) {
                if s < lo {
                    lo = s;
                }
                if s > hi {
                    hi = s;
                }
            }
            let mut hi = hi.abs().max(lo.abs());
            if hi == 0 {
                return 0;
            }
            let mut n_bits = 1;
            while hi != 0 {
                hi >>= 1;
                n_bits += 1;
            }
            n_bits - if stream_type == 0 { 1 } else { 0 }
        };
        let band_code_subtype1 = delta_band_code(&buf1);
        let band_code_subtype2 = delta_band_code(&buf2);

        // Pick the narrowest coding; the code ordering is a proxy for the
        // bit width. A tie prefers keeping sub-type 1, since changing
        // sub-types costs bits. Type 1 streams cannot use sub-type 2.
        let mut new_band_type_code = band_code_subtype0;
        let mut new_band_sub_type = 0i32;
        if band_code_subtype1 < new_band_type_code
            || (band_code_subtype1 == new_band_type_code && last_band_sub_type == 1)
        {
            new_band_sub_type = 1;
            new_band_type_code = band_code_subtype1;
        }
        if stream_type == 0 && band_code_subtype2 < new_band_type_code {
            new_band_sub_type = 2;
            new_band_type_code = band_code_subtype2;
        }

        if last_band_type_code == 0
            && new_band_type_code == 0
            && last_band_sub_type == new_band_sub_type
        {
            // a repeated type-0 band costs a single '1' bit
            w.bits.write(1, 1);
        }
        else {
            // after a type-0 band, a '0' bit declines the repeat
            if last_band_type_code == 0 {
                w.bits.write(0, 1);
            }

            if stream_type == 0 {
                // Type 0: a sub-type change is one bit (+1 or -1 mod 3),
                // then the code as 4 raw bits
                if new_band_sub_type == last_band_sub_type {
                    w.bits.write(0, 1);
                }
                else {
                    // the inc/dec bit from old sub-type to new
                    const FROM0: [u32; 3] = [9, 1, 0];
                    const FROM1: [u32; 3] = [0, 9, 1];
                    const FROM2: [u32; 3] = [1, 0, 9];
                    const DELTA_BIT: [[u32; 3]; 3] = [FROM0, FROM1, FROM2];
                    w.bits.write(1, 1);
                    w.bits.write(
                        DELTA_BIT[last_band_sub_type as usize][new_band_sub_type as usize],
                        1,
                    );
                }
                w.bits.write(new_band_type_code as u32, 4);
            }
            else {
                // Type 1: Huffman-coded frame-to-frame delta; the codebook
                // choice tells the decoder whether the sub-type inverts
                let codebook = if new_band_sub_type == last_band_sub_type {
                    &HUFF_93_KEEP
                }
                else {
                    &HUFF_93_INVERT
                };
                let delta = new_band_type_code - w.band_type_code[band];
                w.write_code(&codebook[(delta + 16) as usize]);

                // The frame-to-frame memory only updates when a delta is
                // written, matching the decoder's bookkeeping.
                w.band_type_code[band] = new_band_type_code;
            }

            if new_band_type_code == 0 {
                // zero-width samples: nothing to write, but the running
                // previous-sample state must land where the decoder's will
                match new_band_sub_type {
                    0 => {
                        prv_sample = 0;
                        prv_delta = 0;
                    }
                    1 => {
                        prv_sample = prv_frame_last_sample;
                        prv_delta = 0;
                    }
                    _ => {
                        prv_sample = prv_frame_last_sample;
                        prv_delta = prv_frame_last_delta;
                    }
                }
            }
            else {
                let n_bits = new_band_type_code + if stream_type == 0 { 1 } else { 0 };
                let mask = (1u32 << n_bits) - 1;
                let buf = match new_band_sub_type {
                    0 => &buf0,
                    1 => &buf1,
                    _ => &buf2,
                };
                for &s in buf.iter().take(n_samples) {
                    w.bits.write(s as u32 & mask, n_bits);
                }
            }
        }

        last_band_type_code = new_band_type_code;
        last_band_sub_type = new_band_sub_type;
        first_sample += n_samples;
    }

    Ok(())
}

/// Compress one frame in the OS93a dialect. Type 0 streams share the 1993
/// format; the Type 1 sample-pair scheme has no encoder.
fn compress_frame_93a(w: &mut StreamWriter, frame: &Frame) -> Result<()> {
    if w.params.stream_format_type == 0 {
        return compress_frame_93b(w, frame);
    }
    unsupported_error(
        "encode: OS93a Type 1 streams cannot be encoded; select Type 0 in the \
         encoding parameters instead",
    )
}

/// Compress all of a stream's frames under the writer's parameters. The
/// parameters must name a concrete type and sub-type (no wildcards here).
pub(crate) fn compress_stream(
    stream: &EncoderStream,
    w: &mut StreamWriter,
    bands_to_keep: usize,
) -> Result<()> {
    let params = w.params;
    let band_sample_counts: &[usize; 16] = if params.format_version == 0x9400 {
        &BAND_SAMPLE_COUNTS_94
    }
    else if params.stream_format_type == 1 {
        &BAND_SAMPLE_COUNTS_93B_TYPE1
    }
    else {
        &BAND_SAMPLE_COUNTS_93
    };

    // bits available per frame at the target rate
    let frames_per_second = 31250.0f32 / 240.0;
    let bits_per_frame = params.target_bit_rate as f32 / frames_per_second;

    // allocate the budget across the retained bands by the psychoacoustic
    // weighting, normalized by samples per band
    let mut band_share_norm = 0f32;
    for i in 0..bands_to_keep {
        band_share_norm += (BAND_SHARE[i] * band_sample_counts[i] as i32) as f32;
    }

    let mut bits_per_band = [0i32; 16];
    for i in 0..bands_to_keep {
        bits_per_band[i] = (BAND_SHARE[i] as f32 / band_share_norm * bits_per_frame) as i32;
    }

    // Seed each band's scaling code: the smallest factor that spans the
    // band's full-scale amplitude at the allocated bit depth.
    for band in 0..bands_to_keep {
        let lo = stream.range[band].lo * -32768.0;
        let hi = stream.range[band].hi * 32768.0;
        let full_scale = hi.max(lo).max(0.0);

        let divider = 1i64 << bits_per_band[band].clamp(0, 30);
        let target =
            if full_scale != 0.0 { (full_scale / divider as f32).ceil() as i32 } else { 1 };

        w.header[band] = 0;
        for (j, &f) in SCALING_FACTORS.iter().enumerate() {
            if f < target {
                w.header[band] = j as u8;
            }
            else {
                break;
            }
        }

        // Type 1 translation tables add a per-code scaling adjustment at
        // decode time; compensate with the inverse of the 6-bit encoding's
        // adjustment, plus a typical pre-adjustment for the low bands.
        if params.format_version == 0x9400 && params.stream_format_type == 1 {
            let mut adjust = if band < 3 { 0x0D } else { 0x17 };
            adjust += if params.stream_format_sub_type == 0 { 1 } else { 3 };
            if i32::from(w.header[band]) > adjust {
                w.header[band] -= adjust as u8;
            }
            else {
                w.header[band] = 0;
            }
        }
    }

    // unused bands read as end-of-header
    for band in bands_to_keep..16 {
        w.header[band] = 0xFF;
    }

    // major type and sub-type bits in the first three header bytes
    if params.stream_format_type != 0 {
        w.header[0] |= 0x80;
    }
    w.header[1] |= ((params.stream_format_sub_type & 0x02) << 6) as u8;
    w.header[2] |= ((params.stream_format_sub_type & 0x01) << 7) as u8;

    // pick the frame compressor for the dialect
    let compress_frame: fn(&mut StreamWriter, &Frame) -> Result<()> =
        if params.format_version == 0x9301 && params.stream_format_type == 1 {
            compress_frame_93a
        }
        else if (params.format_version & 0xFF00) == 0x9300 {
            compress_frame_93b
        }
        else {
            compress_frame_94
        };

    for frame in stream.frames.iter() {
        compress_frame(w, frame)?;
    }

    w.bits.flush();
    debug!(
        "compress: type {}/{} -> {} bytes",
        params.stream_format_type,
        params.stream_format_sub_type,
        w.stream_len()
    );
    Ok(())
}
