// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame decompression for the 1993 format, shared by OS93a Type 0 streams
//! and all OS93b streams.
//!
//! Every band carries 16 samples (15 in the first band of a Type 1 stream).
//! Samples are plain fixed-width integers; the compression comes from a
//! per-band SUB-TYPE that stores them directly (0), as deltas from the
//! previous sample (1), or as deltas of deltas (2), with the previous
//! sample and delta carried across bands within the frame. Type 0 streams
//! spell the sub-type and a 4-bit band-type code out in raw bits; Type 1
//! streams fold both into a Huffman codebook of frame-to-frame deltas.

use dcs_core::errors::{decode_error, Result};
use dcs_core::fixed::saturate16;
use dcs_core::io::BitReader;

use crate::channel::{AudioStream, HeaderBits};
use crate::frame::FrameStatus;
use crate::tables::{
    BAND_TYPE_HUFF_TREE_93, SCALING_FACTOR_MANTISSA, SUBTYPE_DEC, SUBTYPE_INC,
};
use crate::transform::FRAME_BUFFER_LEN;

/// Mix one sample into the frame buffer: scale by the band factor, then by
/// the channel mixing multiplier, and accumulate.
#[inline]
fn add_output(
    out: &mut [u16; FRAME_BUFFER_LEN],
    index: &mut usize,
    inc: usize,
    scaling_factor: u16,
    mixing_multiplier: u16,
    sample: u16,
) {
    let prod = ((sample as i16 as i64) * (scaling_factor as i64)) as u64;
    let prod_low = (prod & 0xFFFF) as u16;
    let mut prod = (prod & 0xFFFF) | (((out[*index] as i16 as i64) as u64) << 16);
    prod = prod.wrapping_add(((prod_low as i16 as i64) * (mixing_multiplier as i64)) as u64);
    out[*index] = ((prod >> 16) & 0xFFFF) as u16;
    *index += inc;
}

/// Read a Huffman-coded band-type delta from a Type 1 frame. The codeword
/// also encodes whether the band sub-type is kept or inverted (0 to 1,
/// non-zero to 0).
fn read_band_type_93(playback: &mut BitReader, band_sub_type: &mut usize) -> Result<i32> {
    let mut ele = BAND_TYPE_HUFF_TREE_93[0];
    loop {
        let bit = playback.get(1)?;
        let index = if bit != 0 { (ele >> 8) as usize } else { (ele & 0xFF) as usize };
        let Some(&next) = BAND_TYPE_HUFF_TREE_93.get(index) else {
            return decode_error("os93: band type tree walked out of range");
        };
        ele = next;
        if (ele & 0x8000) != 0 {
            break;
        }
    }

    // values up to 0x1D are excess 0x0F; the rest are excess 0x2E and also
    // invert the band sub-type
    let mut val = (ele & 0x3F) as i32;
    if val < 0x1E {
        val -= 0x0F;
    }
    else {
        val -= 0x2E;
        *band_sub_type = if *band_sub_type != 0 { 0 } else { 1 };
    }
    Ok(val)
}

pub(super) fn decompress_frame(
    stream: &mut AudioStream,
    out: &mut [u16; FRAME_BUFFER_LEN],
    mixing_multiplier: u16,
) -> Result<FrameStatus> {
    let mut playback = match stream.playback.take() {
        Some(p) => p,
        None => return decode_error("os93: no active stream"),
    };

    // sample [1] is preserved across the call, as in the OS94+ format
    let outbuf1 = out[1];

    let type1 = HeaderBits::from_bits_truncate(stream.header[0]).contains(HeaderBits::TYPE1);
    let mut band_sub_type: usize = if type1 { 0 } else { 2 };

    // Differential state carried across bands within the frame. Both reset
    // to zero at each frame start.
    let mut is_first_band = true;
    let mut prv_input: u16 = 0;
    let mut prv_input_delta: u16 = 0;
    let mut reuse_band_type_code = false;
    let mut cur_band_type_code: i32 = 0;

    let mut output_buf_index: usize = 1;

    for band in 0..16 {
        // the low 7 bits of each header byte give the scaling code; 0x7F
        // marks the last band
        let cur_hdr_byte = (stream.header[band] & 0x7F) as u16;
        if cur_hdr_byte == 0x7F {
            break;
        }

        let scaling_factor_index = (cur_hdr_byte & 0x0003) as usize;
        let scaling_factor_shift = ((cur_hdr_byte >> 2) & 0x000F) as i32 - 0x000F;
        let output_stride_code = cur_hdr_byte >> 6;

        let scaling_factor = dcs_core::fixed::lshift32(
            u32::from(SCALING_FACTOR_MANTISSA[scaling_factor_index]),
            scaling_factor_shift,
        ) as u16;

        // output geometry for the band
        let n_samples: usize;
        let output_buf_inc: usize;
        let output_buf_fixup: i32;
        let output_buf_stride: usize;
        if !type1 {
            if output_stride_code == 0 {
                n_samples = 16;
                output_buf_inc = 1;
                output_buf_fixup = 0;
                output_buf_stride = 16;
            }
            else {
                output_buf_index += 1;
                n_samples = 16;
                output_buf_inc = 2;
                output_buf_fixup = -1;
                output_buf_stride = 31;
            }
        }
        else if output_stride_code == 0 {
            n_samples = if is_first_band { 15 } else { 16 };
            output_buf_inc = 1;
            output_buf_fixup = 0;
            output_buf_stride = n_samples;
        }
        else {
            n_samples = 8;
            output_buf_inc = 2;
            output_buf_fixup = 0;
            output_buf_stride = 8;
        }

        // A band following a type-0 band can reuse type 0 with a single
        // '1' bit.
        if reuse_band_type_code {
            reuse_band_type_code = playback.get(1)? != 0;
        }

        if !reuse_band_type_code {
            if !type1 {
                // A '1' bit introduces a sub-type change: one more bit
                // selects +1 or -1 mod 3. The band-type code follows as 4
                // raw bits.
                if playback.get(1)? != 0 {
                    let xlat =
                        if playback.get(1)? != 0 { &SUBTYPE_INC } else { &SUBTYPE_DEC };
                    band_sub_type = xlat[band_sub_type] as usize;
                }
                cur_band_type_code = playback.get(4)? as i32;
            }
            else {
                // Type 1: Huffman-coded delta from the previous frame
                let delta = read_band_type_93(&mut playback, &mut band_sub_type)?;
                stream.band_type_buf[band] =
                    stream.band_type_buf[band].wrapping_add(delta as u16);
                cur_band_type_code = stream.band_type_buf[band] as i32;
            }
        }

        if cur_band_type_code == 0 {
            // No new inputs: fill with zeroes or repeat the previous
            // output, per the sub-type. The next band may reuse this code
            // with a single bit.
            reuse_band_type_code = true;

            match band_sub_type {
                0 => {
                    // independent zeroes add nothing; skip the outputs
                    output_buf_index += output_buf_stride;
                    prv_input = 0;
                    prv_input_delta = 0;
                }
                1 => {
                    // Repeat the previous input. The multiplier's low word
                    // is loaded once outside the loop and carries forward
                    // the previous product's low bits on each iteration,
                    // which perturbs the rounding of the subsequent add.
                    // The firmware behaves this way, so the decoder must.
                    let mut prod: i64 = (prv_input as i16 as i64) * (scaling_factor as i64);
                    let prod_low = (prod & 0xFFFF) as i16;
                    for _ in 0..n_samples {
                        prod = (prod & 0xFFFF)
                            | ((out[output_buf_index] as i16 as i64) << 16);
                        prod += (prod_low as i64) * (mixing_multiplier as i64);
                        out[output_buf_index] = ((prod >> 16) & 0xFFFF) as u16;
                        output_buf_index += output_buf_inc;
                    }
                    prv_input_delta = 0;
                    output_buf_index = (output_buf_index as i32 + output_buf_fixup) as usize;
                }
                _ => {
                    // repeat the previous output with the running increment
                    for _ in 0..n_samples {
                        prv_input = prv_input.wrapping_add(prv_input_delta);
                        add_output(
                            out,
                            &mut output_buf_index,
                            output_buf_inc,
                            scaling_factor,
                            mixing_multiplier,
                            prv_input,
                        );
                    }
                    output_buf_index = (output_buf_index as i32 + output_buf_fixup) as usize;
                }
            }
        }
        else {
            // fixed-width inputs for the band
            let mut bit_width = cur_band_type_code;
            if !type1 {
                bit_width += 1;
            }
            if bit_width < 0 || bit_width > 16 {
                return decode_error("os93: band bit width out of range");
            }

            let mut input_buf = [0u16; 0x10];
            for s in input_buf.iter_mut().take(n_samples) {
                *s = playback.get_signed(bit_width as u32)? as u16;
            }

            match band_sub_type {
                0 => {
                    // independent values
                    for &s in input_buf.iter().take(n_samples) {
                        add_output(
                            out,
                            &mut output_buf_index,
                            output_buf_inc,
                            scaling_factor,
                            mixing_multiplier,
                            s,
                        );
                    }
                    prv_input = input_buf[n_samples - 1];
                    prv_input_delta = prv_input.wrapping_sub(input_buf[n_samples - 2]);
                }
                1 => {
                    // deltas from the previous input
                    for &s in input_buf.iter().take(n_samples) {
                        prv_input_delta = s;
                        prv_input = prv_input.wrapping_add(prv_input_delta);
                        add_output(
                            out,
                            &mut output_buf_index,
                            output_buf_inc,
                            scaling_factor,
                            mixing_multiplier,
                            prv_input,
                        );
                    }
                }
                _ => {
                    // deltas applied to the previous delta
                    for &s in input_buf.iter().take(n_samples) {
                        prv_input_delta = prv_input_delta.wrapping_add(s);
                        prv_input = prv_input.wrapping_add(prv_input_delta);
                        add_output(
                            out,
                            &mut output_buf_index,
                            output_buf_inc,
                            scaling_factor,
                            mixing_multiplier,
                            prv_input,
                        );
                    }
                }
            }

            output_buf_index = (output_buf_index as i32 + output_buf_fixup) as usize;
        }

        is_first_band = false;
    }

    // propagate the first sample's delta into the zeroth sample and restore
    // the saved first sample
    let delta = saturate16((out[1] as i16 as i32) - (outbuf1 as i16 as i32));
    out[0] = saturate16((delta as i16 as i32) + (out[0] as i16 as i32));
    out[1] = outbuf1;

    stream.playback = Some(playback);
    Ok(FrameStatus { stop: false })
}
