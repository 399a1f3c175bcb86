// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codebooks` module holds the encoding-side constant tables: the
//! Huffman codebooks mapping plain values to bit strings, and the scaling
//! factor table. The decode direction of each codebook lives in
//! `dcs_decoder::tables`; the bit strings here must stay in exact
//! correspondence with those tables.

/// One Huffman codeword: the plain value it encodes, the bit string
/// right-justified in `code_word`, and the number of bits used.
#[derive(Clone, Copy)]
pub struct CodebookEntry {
    pub plain_value: i32,
    pub code_word: u32,
    pub n_bits: i32,
}

const fn ce(plain_value: i32, code_word: u32, n_bits: i32) -> CodebookEntry {
    CodebookEntry { plain_value, code_word, n_bits }
}

/// OS94+ frame header codebook: band-type-code deltas, indexed by
/// (delta + 16). The shortest code, '01', encodes delta 0, so an unchanged
/// frame costs about two bits per band of header.
#[rustfmt::skip]
pub const FRAME_HEADER_CODES_94: [CodebookEntry; 31] = [
    ce(-16, 0x00050404, 20),
    ce(-15, 0x00050403, 20),
    ce(-14, 0x00282011, 23),
    ce(-13, 0x000a080b, 21),
    ce(-12, 0x00141009, 22),
    ce(-11, 0x00141001, 22),
    ce(-10, 0x00282010, 23),
    ce( -9, 0x000a0801, 21),
    ce( -8, 0x000a0805, 21),
    ce( -7, 0x00028203, 19),
    ce( -6, 0x00005041, 16),
    ce( -5, 0x00001411, 14),
    ce( -4, 0x00000140, 10),
    ce( -3, 0x00000029,  7),
    ce( -2, 0x0000000b,  5),
    ce( -1, 0x00000000,  2),
    ce(  0, 0x00000001,  1),
    ce(  1, 0x00000003,  3),
    ce(  2, 0x00000004,  4),
    ce(  3, 0x00000015,  6),
    ce(  4, 0x00000051,  8),
    ce(  5, 0x000000a1,  9),
    ce(  6, 0x00000283, 11),
    ce(  7, 0x00000505, 12),
    ce(  8, 0x00000a09, 13),
    ce(  9, 0x00002821, 15),
    ce( 10, 0x00141000, 22),
    ce( 11, 0x00014103, 18),
    ce( 12, 0x00050401, 20),
    ce( 13, 0x00014102, 18),
    ce( 14, 0x000a080a, 21),
];

// Sample codebooks for the compressed bit widths 1-6. Each encodes the
// signed two's-complement range of its width; entries are indexed by
// (value - range_lo).

#[rustfmt::skip]
const SAMPLE_CODES_1: [CodebookEntry; 2] = [
    ce( -1, 0x00000001, 2),
    ce(  0, 0x00000000, 2),
];

#[rustfmt::skip]
const SAMPLE_CODES_2: [CodebookEntry; 4] = [
    ce( -2, 0x00000002, 3),
    ce( -1, 0x00000000, 2),
    ce(  0, 0x00000003, 3),
    ce(  1, 0x00000002, 2),
];

#[rustfmt::skip]
const SAMPLE_CODES_3: [CodebookEntry; 8] = [
    ce( -4, 0x00000012, 5),
    ce( -3, 0x00000013, 5),
    ce( -2, 0x0000000e, 4),
    ce( -1, 0x00000001, 2),
    ce(  0, 0x00000006, 3),
    ce(  1, 0x00000000, 2),
    ce(  2, 0x00000005, 3),
    ce(  3, 0x00000008, 4),
];

#[rustfmt::skip]
const SAMPLE_CODES_4: [CodebookEntry; 16] = [
    ce( -8, 0x0000005a, 7),
    ce( -7, 0x0000005b, 7),
    ce( -6, 0x00000029, 6),
    ce( -5, 0x0000000e, 5),
    ce( -4, 0x00000017, 5),
    ce( -3, 0x00000009, 4),
    ce( -2, 0x00000001, 3),
    ce( -1, 0x00000007, 3),
    ce(  0, 0x00000002, 3),
    ce(  1, 0x00000006, 3),
    ce(  2, 0x00000000, 3),
    ce(  3, 0x00000008, 4),
    ce(  4, 0x00000006, 4),
    ce(  5, 0x0000000f, 5),
    ce(  6, 0x0000002c, 6),
    ce(  7, 0x00000028, 6),
];

#[rustfmt::skip]
const SAMPLE_CODES_5: [CodebookEntry; 32] = [
    ce(-16, 0x0000005a, 8),
    ce(-15, 0x0000005b, 8),
    ce(-14, 0x000000e9, 8),
    ce(-13, 0x000000ef, 8),
    ce(-12, 0x0000004c, 7),
    ce(-11, 0x00000075, 7),
    ce(-10, 0x00000017, 6),
    ce( -9, 0x0000002a, 6),
    ce( -8, 0x00000027, 6),
    ce( -7, 0x0000003d, 6),
    ce( -6, 0x00000012, 5),
    ce( -5, 0x0000001c, 5),
    ce( -4, 0x00000004, 4),
    ce( -3, 0x00000008, 4),
    ce( -2, 0x0000000d, 4),
    ce( -1, 0x00000001, 3),
    ce(  0, 0x0000000b, 4),
    ce(  1, 0x00000000, 3),
    ce(  2, 0x0000000c, 4),
    ce(  3, 0x00000007, 4),
    ce(  4, 0x0000001f, 5),
    ce(  5, 0x00000014, 5),
    ce(  6, 0x0000000c, 5),
    ce(  7, 0x0000003c, 6),
    ce(  8, 0x0000000a, 5),
    ce(  9, 0x0000002b, 6),
    ce( 10, 0x0000001a, 6),
    ce( 11, 0x00000076, 7),
    ce( 12, 0x0000004d, 7),
    ce( 13, 0x0000002c, 7),
    ce( 14, 0x000000ee, 8),
    ce( 15, 0x000000e8, 8),
];

#[rustfmt::skip]
const SAMPLE_CODES_6: [CodebookEntry; 64] = [
    ce(-32, 0x00000022, 9),
    ce(-31, 0x00000023, 9),
    ce(-30, 0x000000fa, 9),
    ce(-29, 0x000000fb, 9),
    ce(-28, 0x00000181, 9),
    ce(-27, 0x000001ce, 9),
    ce(-26, 0x000001cf, 9),
    ce(-25, 0x0000002a, 8),
    ce(-24, 0x00000079, 8),
    ce(-23, 0x000000a8, 8),
    ce(-22, 0x000000c1, 8),
    ce(-21, 0x000000e6, 8),
    ce(-20, 0x00000009, 7),
    ce(-19, 0x00000032, 7),
    ce(-18, 0x0000003f, 7),
    ce(-17, 0x00000061, 7),
    ce(-16, 0x0000003d, 7),
    ce(-15, 0x00000057, 7),
    ce(-14, 0x00000070, 7),
    ce(-13, 0x00000076, 7),
    ce(-12, 0x00000005, 6),
    ce(-11, 0x00000018, 6),
    ce(-10, 0x00000029, 6),
    ce( -9, 0x00000031, 6),
    ce( -8, 0x0000003c, 6),
    ce( -7, 0x00000003, 5),
    ce( -6, 0x0000000e, 5),
    ce( -5, 0x00000016, 5),
    ce( -4, 0x0000001b, 5),
    ce( -3, 0x00000000, 4),
    ce( -2, 0x00000005, 4),
    ce( -1, 0x00000009, 4),
    ce(  0, 0x00000003, 4),
    ce(  1, 0x00000008, 4),
    ce(  2, 0x00000004, 4),
    ce(  3, 0x0000001f, 5),
    ce(  4, 0x0000001a, 5),
    ce(  5, 0x00000017, 5),
    ce(  6, 0x0000000d, 5),
    ce(  7, 0x00000004, 5),
    ce(  8, 0x0000003a, 6),
    ce(  9, 0x00000032, 6),
    ce( 10, 0x00000028, 6),
    ce( 11, 0x0000000b, 6),
    ce( 12, 0x0000007b, 7),
    ce( 13, 0x00000072, 7),
    ce( 14, 0x00000066, 7),
    ce( 15, 0x00000055, 7),
    ce( 16, 0x00000077, 7),
    ce( 17, 0x00000067, 7),
    ce( 18, 0x00000056, 7),
    ce( 19, 0x00000033, 7),
    ce( 20, 0x00000014, 7),
    ce( 21, 0x000000f4, 8),
    ce( 22, 0x000000e2, 8),
    ce( 23, 0x000000a9, 8),
    ce( 24, 0x0000007c, 8),
    ce( 25, 0x0000002b, 8),
    ce( 26, 0x00000010, 8),
    ce( 27, 0x000001c7, 9),
    ce( 28, 0x000001c6, 9),
    ce( 29, 0x00000180, 9),
    ce( 30, 0x000000f1, 9),
    ce( 31, 0x000000f0, 9),
];

/// A sample codebook with its value range and the dedicated codeword that
/// emits two consecutive zero samples in one slot.
pub struct SampleCodebook {
    pub range_lo: i32,
    pub range_hi: i32,
    pub double_zero: CodebookEntry,
    pub codes: &'static [CodebookEntry],
}

/// Sample codebooks for bit widths 1-6, indexed by width minus one.
pub const SAMPLE_CODEBOOKS_94: [SampleCodebook; 6] = [
    SampleCodebook { range_lo: -1, range_hi: 0, double_zero: ce(-1, 0x00000001, 1), codes: &SAMPLE_CODES_1 },
    SampleCodebook { range_lo: -2, range_hi: 1, double_zero: ce(-1, 0x00000003, 2), codes: &SAMPLE_CODES_2 },
    SampleCodebook { range_lo: -4, range_hi: 3, double_zero: ce(-1, 0x0000000f, 4), codes: &SAMPLE_CODES_3 },
    SampleCodebook { range_lo: -8, range_hi: 7, double_zero: ce(-1, 0x00000015, 5), codes: &SAMPLE_CODES_4 },
    SampleCodebook { range_lo: -16, range_hi: 15, double_zero: ce(-1, 0x0000001b, 6), codes: &SAMPLE_CODES_5 },
    SampleCodebook { range_lo: -32, range_hi: 31, double_zero: ce(-1, 0x000000f5, 8), codes: &SAMPLE_CODES_6 },
];

/// OS93 Type 1 band-type delta codebook, "keep the band sub-type" variant,
/// indexed by (delta + 16). The -16 and +15 slots have no codewords.
#[rustfmt::skip]
pub const HUFF_93_KEEP: [CodebookEntry; 32] = [
    ce(-16, 0x00000000,  0),
    ce(-15, 0x0132e880, 26),
    ce(-14, 0x0132e881, 26),
    ce(-13, 0x00997443, 25),
    ce(-12, 0x004cba23, 24),
    ce(-11, 0x0004cb8a, 20),
    ce(-10, 0x0004cba7, 20),
    ce( -9, 0x0004cb2e, 20),
    ce( -8, 0x0004cba3, 20),
    ce( -7, 0x00026592, 19),
    ce( -6, 0x000132ca, 18),
    ce( -5, 0x00004cb3, 16),
    ce( -4, 0x000004c9, 12),
    ce( -3, 0x0000009b,  9),
    ce( -2, 0x0000000a,  5),
    ce( -1, 0x00000000,  2),
    ce(  0, 0x00000001,  1),
    ce(  1, 0x00000003,  3),
    ce(  2, 0x0000000b,  5),
    ce(  3, 0x0000004f,  8),
    ce(  4, 0x00000098,  9),
    ce(  5, 0x00000267, 11),
    ce(  6, 0x000004ca, 12),
    ce(  7, 0x0000132f, 14),
    ce(  8, 0x00002658, 15),
    ce(  9, 0x00009970, 17),
    ce( 10, 0x00026593, 19),
    ce( 11, 0x0004cba0, 20),
    ce( 12, 0x00099745, 21),
    ce( 13, 0x0004cb2f, 20),
    ce( 14, 0x00026596, 19),
    ce( 15, 0x00000000,  0),
];

/// OS93 Type 1 band-type delta codebook, "invert the band sub-type"
/// variant, indexed by (delta + 16).
#[rustfmt::skip]
pub const HUFF_93_INVERT: [CodebookEntry; 32] = [
    ce(-16, 0x004cba25, 24),
    ce(-15, 0x004cba24, 24),
    ce(-14, 0x0132e883, 26),
    ce(-13, 0x09974412, 29),
    ce(-12, 0x004cba22, 24),
    ce(-11, 0x0265d105, 27),
    ce(-10, 0x04cba208, 28),
    ce( -9, 0x0004cb8b, 20),
    ce( -8, 0x00026591, 19),
    ce( -7, 0x0004cb88, 20),
    ce( -6, 0x0004cba6, 20),
    ce( -5, 0x0004cba5, 20),
    ce( -4, 0x00004cb9, 16),
    ce( -3, 0x000004c8, 12),
    ce( -2, 0x0000009a,  9),
    ce( -1, 0x00000012,  6),
    ce(  0, 0x00000008,  5),
    ce(  1, 0x0000004e,  8),
    ce(  2, 0x00000266, 11),
    ce(  3, 0x0000132d, 14),
    ce(  4, 0x00004cbb, 16),
    ce(  5, 0x00009975, 17),
    ce(  6, 0x000132e3, 18),
    ce(  7, 0x0004cba4, 20),
    ce(  8, 0x0004cb89, 20),
    ce(  9, 0x00026590, 19),
    ce( 10, 0x0004cba1, 20),
    ce( 11, 0x00265d13, 23),
    ce( 12, 0x132e8826, 30),
    ce( 13, 0x132e8827, 30),
    ce( 14, 0x0132e884, 26),
    ce( 15, 0x0132e885, 26),
];

/// Numeric multiplier for each scaling factor code 0x00..0x3F. This is the
/// pre-computed expansion of the `ee ee mm` scaling formula.
#[rustfmt::skip]
pub const SCALING_FACTORS: [i32; 64] = [
        1,     1,     1,     1,     2,     2,     2,     3,
        4,     4,     5,     6,     8,     9,    11,    13,
       16,    19,    22,    26,    32,    38,    45,    53,
       64,    76,    90,   107,   128,   152,   181,   215,
      256,   304,   362,   430,   512,   608,   724,   861,
     1024,  1217,  1448,  1722,  2048,  2435,  2896,  3444,
     4096,  4871,  5792,  6888,  8192,  9742, 11585, 13777,
    16384, 19484, 23170, 27554, 32768, 38968, 46341, 55109,
];

/// Psychoacoustic bit-allocation weights per band: priority falls off with
/// rising frequency on a roughly logarithmic curve.
pub const BAND_SHARE: [i32; 16] = [16, 14, 12, 10, 9, 8, 6, 5, 4, 4, 3, 3, 3, 3, 2, 2];

/// Samples per band, 1994+ format.
pub const BAND_SAMPLE_COUNTS_94: [usize; 16] =
    [7, 8, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 32];

/// Samples per band, 1993 formats.
pub const BAND_SAMPLE_COUNTS_93: [usize; 16] = [16; 16];

/// Samples per band for OS93b Type 1 streams: 15 in the first band.
pub const BAND_SAMPLE_COUNTS_93B_TYPE1: [usize; 16] =
    [15, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16];

#[cfg(test)]
mod tests {
    use super::*;
    use dcs_decoder::tables::{MAX_CODEWORD_BITS, SAMPLE_CODEBOOKS};

    // Every encoding codeword, padded out to the decoder's lookup width,
    // must land on the decoder table entry with the same value and length.
    #[test]
    fn verify_sample_codebooks_match_decoder() {
        for (width0, book) in SAMPLE_CODEBOOKS_94.iter().enumerate() {
            let width = width0 + 1;
            let max_bits = MAX_CODEWORD_BITS[width];
            let dec_table = SAMPLE_CODEBOOKS[width0];
            let ref_val = 1i32 << (width - 1);

            for entry in book.codes.iter() {
                let pad = max_bits as i32 - entry.n_bits;
                let index = (entry.code_word << pad) as usize;
                let dec = dec_table[index];
                assert_eq!((dec >> 8) as i32, entry.n_bits, "width {}", width);
                let dec_val = (dec & 0xFF) as i32;
                assert_eq!(dec_val - ref_val, entry.plain_value, "width {}", width);
            }

            // and the double-zero code maps to a 0x80-flagged entry
            let dz = &book.double_zero;
            let pad = max_bits as i32 - dz.n_bits;
            let dec = dec_table[(dz.code_word << pad) as usize];
            assert_eq!((dec >> 8) as i32, dz.n_bits, "width {}", width);
            assert_ne!(dec & 0x80, 0, "width {}", width);
        }
    }

    // Walking each frame-header codeword through the decoder's delta tree
    // must recover the plain delta.
    #[test]
    fn verify_frame_header_codes_match_decoder_tree() {
        use dcs_decoder::tables::BAND_TYPE_HUFF_TREE_94;

        for entry in FRAME_HEADER_CODES_94.iter() {
            let mut node = 0usize;
            for bit_no in (0..entry.n_bits).rev() {
                let bit = (entry.code_word >> bit_no) & 1;
                node += if bit != 0 { BAND_TYPE_HUFF_TREE_94[node] as usize } else { 1 };
                if bit_no == 0 {
                    assert_ne!(BAND_TYPE_HUFF_TREE_94[node] & 0x8000, 0, "delta {}", entry.plain_value);
                }
                else {
                    assert_eq!(BAND_TYPE_HUFF_TREE_94[node] & 0x8000, 0, "delta {}", entry.plain_value);
                }
            }
            let decoded = (BAND_TYPE_HUFF_TREE_94[node] & 0xFF) as i32 - 0x2E;
            assert_eq!(decoded, entry.plain_value);
        }
    }

    // The scaling factor table is the closed form of the ee/mm formula used
    // by the decoder: mantissa {0x8000, 0x9838, 0xB505, 0xD745} >> (15 - e).
    #[test]
    fn verify_scaling_factor_expansion() {
        use dcs_decoder::tables::SCALING_FACTOR_MANTISSA;
        for (code, &factor) in SCALING_FACTORS.iter().enumerate() {
            let m = i32::from(SCALING_FACTOR_MANTISSA[code & 3]);
            let e = (code >> 2) & 0x0F;
            assert_eq!(factor, m >> (15 - e), "code {:#04x}", code);
        }
    }
}
