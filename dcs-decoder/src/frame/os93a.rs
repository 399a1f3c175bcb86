// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame decompression for OS93a Type 1 streams.
//!
//! This scheme appears only in Judge Dredd. The stream header is a single
//! byte: the Type 1 flag, a codebook selector, and the band count. Each
//! band reads a Huffman-coded bit width, a Huffman-coded scaling delta, and
//! then N-bit indices into a fixed table of sample pairs; every index
//! produces two frame-buffer samples. Type 0 streams under OS93a use the
//! common 1993 format.

use dcs_core::errors::{decode_error, Result};
use dcs_core::fixed::multiply_round_add;

use crate::channel::{AudioStream, HeaderBits};
use crate::frame::{os93, FrameStatus};
use crate::tables::{
    BAND_BITS_CODEBOOKS_93A, INPUTS_PER_BAND_93A, SAMPLE_PAIR_TABLE_93A, SCALE_CODEBOOK_93A,
};
use crate::transform::FRAME_BUFFER_LEN;

pub(super) fn decompress_frame(
    stream: &mut AudioStream,
    out: &mut [u16; FRAME_BUFFER_LEN],
    mixing_multiplier: u16,
) -> Result<FrameStatus> {
    // Type 0 streams use the unified 1993 format.
    let hdr_byte = stream.header[0];
    if !HeaderBits::from_bits_truncate(hdr_byte).contains(HeaderBits::TYPE1) {
        return os93::decompress_frame(stream, out, mixing_multiplier);
    }

    let mut playback = match stream.playback.take() {
        Some(p) => p,
        None => return decode_error("os93a: no active stream"),
    };

    // header fields: t pp bbbbb = type bit, codebook selector, band count
    let codebook = &BAND_BITS_CODEBOOKS_93A[((hdr_byte & 0x60) >> 5) as usize];
    let num_bands = (hdr_byte & 0x1F) as usize;

    let mut prv_scale_code: i32 = 0x1A;
    let mut out_buf_index = 0usize;

    for band_no in 0..num_bands {
        let Some(&num_inputs) = INPUTS_PER_BAND_93A.get(band_no) else {
            return decode_error("os93a: band count exceeds the format limit");
        };

        // the band's bit width is Huffman coded against a 4-bit lookahead
        let ele = codebook[playback.peek(4)? as usize];
        playback.consume(ele.prefix_bits);

        // 0xFFFF marks the end of the frame
        if ele.band_bits == 0xFFFF {
            break;
        }
        let band_bits = u32::from(ele.band_bits);

        if band_bits != 0 {
            // the scaling code follows, through the two-level codebook; the
            // codeword can be longer than the 4-bit lookahead, so the skip
            // re-peeks as it consumes
            let mut scale_ele = &SCALE_CODEBOOK_93A[playback.peek(4)? as usize];
            playback.get(scale_ele.n_bits)?;
            if scale_ele.value == 0xFFFF {
                scale_ele = &SCALE_CODEBOOK_93A[scale_ele.sub_table + playback.peek(4)? as usize];
                playback.consume(scale_ele.n_bits - 4);
            }

            // The codebook entry is a delta from the previous base value;
            // the bit width contributes to the final code, and the code
            // space wraps at 0x39.
            let mut scale_code = prv_scale_code + scale_ele.value as i32 - 1 + band_bits as i32 * 2;
            if scale_code > 0x39 {
                scale_code -= 0x36;
            }
            if scale_code < 0 {
                return decode_error("os93a: scale code underflow");
            }
            prv_scale_code = scale_code - band_bits as i32 * 2;

            // expand the code into a 1.15 scale factor
            let shift = (scale_code >> 2) as u32;
            let exponent = scale_code & 3;
            let mut scale_factor: u32 = 0x8000;
            for _ in 0..exponent {
                scale_factor = (scale_factor * 0x9838) >> 15;
            }
            scale_factor <<= shift;

            // fold in the channel's mixing multiplier
            scale_factor = ((scale_factor >> 16) * u32::from(mixing_multiplier)) >> 15;

            // pairs for an N-bit band start at table element 2 << N
            let table_base = 2usize << band_bits;

            for _ in 0..num_inputs {
                let sample = playback.get(band_bits)? as usize;
                let pair = table_base + sample * 2;
                if pair + 1 >= SAMPLE_PAIR_TABLE_93A.len() || out_buf_index + 1 >= out.len() {
                    return decode_error("os93a: sample pair index out of range");
                }

                let mut mr = u64::from(out[out_buf_index]) << 16;
                out[out_buf_index] = multiply_round_add(
                    &mut mr,
                    SAMPLE_PAIR_TABLE_93A[pair],
                    scale_factor as u16,
                );
                out_buf_index += 1;

                let mut mr = u64::from(out[out_buf_index]) << 16;
                out[out_buf_index] = multiply_round_add(
                    &mut mr,
                    SAMPLE_PAIR_TABLE_93A[pair + 1],
                    scale_factor as u16,
                );
                out_buf_index += 1;
            }
        }
        else {
            // zero-width inputs are implicit zeroes; adding zero leaves the
            // frame buffer unchanged, so just skip the outputs
            out_buf_index += num_inputs * 2;
        }
    }

    stream.playback = Some(playback);
    Ok(FrameStatus { stop: false })
}
