// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Frame decompression for the 1994+ format.
//!
//! Two headers cooperate here. The STREAM header is the fixed 16-byte block
//! at the start of the stream: one byte per frequency band, giving the
//! band's scaling-factor code, plus format bits in the high bits of the
//! first three bytes. The FRAME header is a Huffman-coded block at the
//! start of every frame, carrying one band-type-code delta per band; the
//! running band-type code selects each band's sample bit width and
//! codebook. Type 1 streams additionally route the band-type code through a
//! per-band translation table that adjusts the scaling code frame by frame.

use log::warn;

use dcs_core::errors::{decode_error, Result};
use dcs_core::fixed::saturate16;

use crate::channel::{AudioStream, HeaderBits};
use crate::frame::FrameStatus;
use crate::tables::{
    BAND_SAMPLE_COUNTS_94, BAND_TYPE_HUFF_TREE_94, MAX_CODEWORD_BITS, PRE_ADJ_MAP_SUBTYPE0,
    PRE_ADJ_MAP_SUBTYPE3, SAMPLE_CODEBOOKS, SCALING_FACTOR_MANTISSA, XLAT_BAND_0_2,
    XLAT_BAND_3_5, XLAT_BAND_6_15,
};
use crate::transform::FRAME_BUFFER_LEN;

pub(super) fn decompress_frame(
    stream: &mut AudioStream,
    out: &mut [u16; FRAME_BUFFER_LEN],
    mixing_multiplier: u16,
) -> Result<FrameStatus> {
    let mut playback = match stream.playback.take() {
        Some(p) => p,
        None => return decode_error("os94: no active stream"),
    };

    // Sample [1] is preserved across the call; the delta it would have
    // received is propagated into sample [0] at the end.
    let outbuf1 = out[1];

    // major type and sub-type from the high bits of the first three
    // stream header bytes
    let type1 = HeaderBits::from_bits_truncate(stream.header[0]).contains(HeaderBits::TYPE1);
    let sub_type = ((stream.header[1] & 0x80) >> 6) | ((stream.header[2] & 0x80) >> 7);

    // Scaling-code pre-adjustments for bands 0-2 come from the PREVIOUS
    // frame's band-type codes, so they are computed before the new frame
    // header updates the codes. The firmware's sub-type dispatch collapses
    // sub-types 1-3 onto one table; that collapse is part of the format.
    let pre_adj_map =
        if sub_type == 0 { &PRE_ADJ_MAP_SUBTYPE0 } else { &PRE_ADJ_MAP_SUBTYPE3 };
    let mut pre_adj = [0u16; 3];
    for (adj, &code) in pre_adj.iter_mut().zip(stream.band_type_buf.iter()) {
        *adj = pre_adj_map.get(code as usize).copied().unwrap_or(0);
    }

    // Decode the frame header: one Huffman-coded band-type delta per band.
    for i in 0..16 {
        if (stream.header[i] & 0x7F) == 0x7F {
            break;
        }

        let mut node = 0usize;
        loop {
            let bit = playback.get(1)?;
            node += if bit != 0 { BAND_TYPE_HUFF_TREE_94[node] as usize } else { 1 };
            let Some(&ele) = BAND_TYPE_HUFF_TREE_94.get(node) else {
                return decode_error("os94: band type tree walked out of range");
            };
            if (ele & 0x8000) != 0 {
                break;
            }
        }

        let delta = (BAND_TYPE_HUFF_TREE_94[node] & 0xFF) as i32 - 0x2E;
        stream.band_type_buf[i] = stream.band_type_buf[i].wrapping_add(delta as u16);
    }

    let mut output_buf_index = 1usize;
    let mut outbuf_valid = true;
    let mut stop = false;

    for band_index in 0..16 {
        let cur_hdr_byte = (stream.header[band_index] & 0x7F) as i32;
        if cur_hdr_byte == 0x7F {
            break;
        }

        let mut output_count = BAND_SAMPLE_COUNTS_94[band_index];
        let mut output_inc = 1usize;
        if HeaderBits::from_bits_truncate(cur_hdr_byte as u8).contains(HeaderBits::HALF_DENSITY) {
            output_inc = 2;
            output_count /= 2;
        }

        let mut cur_band_type_code = stream.band_type_buf[band_index] as i32;
        if cur_band_type_code == 0 {
            // zero bit width: the samples are all zero and consume no input
            output_buf_index += output_count;
            continue;
        }

        // interpret the band type code and scaling code per the major type
        let mut scaling_factor_code = cur_hdr_byte;
        if type1 {
            let mut hdr_byte = cur_hdr_byte;
            let xlat = if band_index < 3 {
                hdr_byte += pre_adj[band_index] as i32;
                &XLAT_BAND_0_2
            }
            else if band_index < 6 {
                &XLAT_BAND_3_5
            }
            else {
                &XLAT_BAND_6_15
            };

            match xlat.get(cur_band_type_code as usize) {
                Some(entry) => {
                    cur_band_type_code = entry.type_code as i32;
                    scaling_factor_code = hdr_byte + entry.scaling_adj as i32;
                }
                None => {
                    // the running band-type code has left the table; the
                    // frame is corrupt
                    cur_band_type_code = 0;
                }
            }
        }

        // The scaling code packs 'xx eeee mm': a 2-bit mantissa selector
        // and an excess-15 exponent.
        let sample_scaling_factor = SCALING_FACTOR_MANTISSA[(scaling_factor_code & 0x03) as usize]
            >> (15 - ((scaling_factor_code >> 2) & 0x0F));

        // decompress the band into a working buffer
        let mut band_buf = [0u16; 0x20];
        if cur_band_type_code <= 0 || cur_band_type_code > 15 {
            // a zero or out-of-range code at this point is corrupt data
            warn!("os94: invalid band type code {} in band {}", cur_band_type_code, band_index);
            outbuf_valid = false;
            stop = true;
        }
        else if cur_band_type_code <= 6 {
            // codes 1-6: Huffman-coded samples referenced to 2^(code-1)
            let sample_value_ref = 1i32 << (cur_band_type_code - 1);
            let max_bits = MAX_CODEWORD_BITS[cur_band_type_code as usize];
            let codebook = SAMPLE_CODEBOOKS[cur_band_type_code as usize - 1];

            let mut bp = 0usize;
            let mut i = output_count as i32;
            while i != 0 {
                let lookahead = playback.peek(max_bits)? as usize;
                let entry = codebook[lookahead];
                let val = (entry & 0xFF) as i32;
                playback.consume(u32::from(entry >> 8));

                if (val & 0x80) != 0 {
                    // the double-zero code emits two samples
                    if i >= 2 {
                        band_buf[bp] = 0;
                        band_buf[bp + 1] = 0;
                        bp += 2;
                        i -= 1;
                    }
                    else {
                        // a double zero that overruns the band is corrupt
                        warn!("os94: double-zero overrun in band {}", band_index);
                        outbuf_valid = false;
                        stop = true;
                        i = 1;
                    }
                }
                else {
                    band_buf[bp] = (val - sample_value_ref) as u16;
                    bp += 1;
                }
                i -= 1;
            }
        }
        else {
            // codes 7+: raw fixed-width two's-complement samples
            for s in band_buf.iter_mut().take(output_count) {
                *s = playback.get_signed(cur_band_type_code as u32)? as u16;
            }
        }

        // a corrupted frame contributes silence from the failure point on
        if !outbuf_valid {
            band_buf = [0u16; 0x20];
        }

        // scale by the band's factor and the mixing multiplier, and
        // accumulate into the frame buffer
        for &sample in band_buf.iter().take(output_count) {
            let scaled = ((sample as i16 as i64) * (sample_scaling_factor as i64)) as u16;
            let mut prod =
                (((out[output_buf_index] as i16 as i64) as u64) << 16) | u64::from(scaled);
            prod = prod
                .wrapping_add(((scaled as i16 as i64) * (mixing_multiplier as i64)) as u64);
            out[output_buf_index] = ((prod >> 16) & 0xFFFF) as u16;
            output_buf_index += output_inc;
        }
    }

    // propagate the first sample's delta into the zeroth sample and restore
    // the saved first sample
    let delta = saturate16((out[1] as i16 as i32) - (outbuf1 as i16 as i32));
    out[0] = saturate16((delta as i16 as i32) + (out[0] as i16 as i32));
    out[1] = outbuf1;

    stream.playback = Some(playback);
    Ok(FrameStatus { stop })
}
