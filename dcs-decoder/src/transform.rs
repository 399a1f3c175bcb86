// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `transform` module converts a decompressed frequency-domain frame
//! into 240 PCM samples, with a 16-sample overlap carried between frames.
//!
//! The underlying operation is an inverse real-valued DFT over a 256-sample
//! window. Two mathematically equivalent algorithms exist: the 1993 firmware
//! expands the 256 samples into 512 via the RDFT mirror symmetry and runs a
//! full Cooley-Tukey pass, while the 1994+ firmware twiddles the samples
//! into a packed 128-point complex IFFT input and stops one iteration short.
//! The two accumulate different rounding errors, so both are implemented;
//! bit-exact output requires matching the algorithm to the firmware that
//! produced the stream.

use dcs_core::fixed::{
    ashift32, mr1, mul_ss, mul_su_mr, multiply_and_round, multiply_and_round_mr,
    multiply_round_add, multiply_round_sub, mul_ss_mr, normalize32, round_multiply_result,
    saturate16,
};

use crate::tables::{BIT_REV9, IFFT_COEFFICIENTS, OVERLAP_COEFFICIENTS};

/// Size of the in-place frame buffer: 256 decompressed samples, doubled for
/// the 1993 algorithm's mirror expansion.
pub const FRAME_BUFFER_LEN: usize = 0x200;

#[inline(always)]
fn sig(v: u16) -> i32 {
    v as i16 as i32
}

/// Transform one frame with the 1994+ algorithm.
///
/// Pre-processing twiddle passes rearrange the RDFT samples into complex
/// pairs, then six Cooley-Tukey iterations (one short of the full seven)
/// leave two interleaved 64-point results in bit-reversed order.
pub fn transform_frame_94(
    frame: &mut [u16; FRAME_BUFFER_LEN],
    overlap: &mut [u16; 16],
    output: &mut [u16; 240],
    vol_shift: i32,
) {
    // fold the dual halves around the midpoint
    frame[0x80] = mul_ss(frame[0x80], 0x8000);
    frame[0x81] = mul_ss((frame[0x81] as i16).wrapping_neg() as u16, 0x8000);
    let mut p0 = 0usize;
    let mut p1 = 0x100usize;
    for _ in 0..0x40 {
        let x0 = sig(frame[p0]);
        let y0 = sig(frame[p1]);
        let x1 = sig(frame[p0 + 1]);
        let y1 = sig(frame[p1 + 1]);

        frame[p0] = mul_ss(saturate16(x0 + y0), 0x8000);
        frame[p1] = mul_ss(saturate16(x0 - y0), 0x8000);
        frame[p0 + 1] = mul_ss(saturate16(x1 - y1), 0x8000);
        frame[p1 + 1] = mul_ss(saturate16(x1 + y1), 0x8000);

        p0 += 2;
        p1 -= 2;
    }

    // twiddle with the half-set coefficients
    let mut i0 = 2usize;
    let mut i1 = 0usize;
    let mut p4 = 0usize;
    let mut p5 = 0x100usize;
    for _ in 0..0x40 {
        let c0 = IFFT_COEFFICIENTS[BIT_REV9[i0] as usize];
        let c1 = IFFT_COEFFICIENTS[BIT_REV9[i1] as usize];

        let x0 = sig(frame[p4]);
        let x1 = sig(frame[p4 + 1]);
        let xn0 = frame[p5];
        let xn1 = frame[p5 + 1];

        let mut mr = 0u64;
        mul_ss_mr(&mut mr, xn1, c1);
        let prod0 = sig(multiply_round_sub(&mut mr, xn0, c0));

        mul_ss_mr(&mut mr, xn1, c0);
        let prod1 = sig(multiply_round_add(&mut mr, xn0, c1));

        frame[p4] = saturate16(prod1 + x0);
        frame[p4 + 1] = saturate16(prod0 + x1);
        frame[p5] = saturate16(x0 - prod1);
        frame[p5 + 1] = saturate16(prod0 - x1);

        p4 += 2;
        p5 -= 2;
        i0 += 4;
        i1 += 4;
    }

    // high/low fold
    let mut p0 = 0usize;
    let mut p1 = 0x80usize;
    for _ in 0..0x40 {
        let x0 = sig(frame[p0]);
        let y0 = sig(frame[p1]);
        let x1 = sig(frame[p0 + 1]);
        let y1 = sig(frame[p1 + 1]);

        frame[p0] = saturate16(x0 + y0);
        frame[p1] = saturate16(x0 - y0);
        frame[p0 + 1] = saturate16(x1 + y1);
        frame[p1 + 1] = saturate16(x1 - y1);

        p0 += 2;
        p1 += 2;
    }

    // Iterative in-place Cooley-Tukey IFFT, stopping one iteration short of
    // the full seven so the output carries two interleaved 64-point results.
    let mut n_partitions = 2usize;
    let mut partition_size = 0x40usize;
    for _ in 0..6 {
        let mut sin_idx = 0usize;
        let mut cos_idx = 0x80usize;
        let mut p0 = 0usize;
        let mut p1 = partition_size;

        for _ in 0..n_partitions {
            let c_sin = IFFT_COEFFICIENTS[sin_idx];
            let c_cos = IFFT_COEFFICIENTS[cos_idx];
            sin_idx += 1;
            cos_idx += 1;

            for _ in 0..partition_size / 2 {
                let a_real = frame[p1];
                let a_imag = frame[p1 + 1];

                let mut prod = 0u64;
                mul_ss_mr(&mut prod, a_real, c_cos);
                let t_real = sig(multiply_round_sub(&mut prod, a_imag, c_sin));

                mul_ss_mr(&mut prod, a_imag, c_cos);
                let t_imag = sig(multiply_round_add(&mut prod, a_real, c_sin));

                let u_real = sig(frame[p0]);
                let u_imag = sig(frame[p0 + 1]);

                frame[p0] = saturate16(u_real - t_real);
                frame[p0 + 1] = saturate16(u_imag - t_imag);
                frame[p1] = saturate16(u_real + t_real);
                frame[p1 + 1] = saturate16(u_imag + t_imag);

                p0 += 2;
                p1 += 2;
            }
            p0 += partition_size;
            p1 += partition_size;
        }
        n_partitions *= 2;
        partition_size /= 2;
    }

    // Undo the volume scale chosen by the main loop: the samples are 1.15
    // mantissas with an implied exponent of 2^-volShift.
    for s in frame.iter_mut().take(0x100) {
        *s = (sig(*s) >> vol_shift) as u16;
    }

    // mix the previous frame's overlap into the first 16 elements
    let mut co0 = 0usize;
    let mut co_n = 0x0Fusize;
    let mut ovp = 0usize;
    for i in (0..16).step_by(2) {
        let mut bi = BIT_REV9[i] as usize;

        let mut a = 0u64;
        let mut b = 0u64;
        mul_su_mr(&mut a, frame[bi], OVERLAP_COEFFICIENTS[co0]);
        mul_su_mr(&mut b, overlap[ovp], OVERLAP_COEFFICIENTS[co_n]);
        co0 += 1;
        co_n -= 1;
        ovp += 1;
        a = a.wrapping_add(b);
        frame[bi] = round_multiply_result(&mut a, 0);
        bi += 1;

        let mut a = 0u64;
        let mut b = 0u64;
        mul_su_mr(&mut a, frame[bi], OVERLAP_COEFFICIENTS[co0]);
        mul_su_mr(&mut b, overlap[ovp], OVERLAP_COEFFICIENTS[co_n]);
        co0 += 1;
        if co_n > 0 {
            co_n -= 1;
        }
        ovp += 1;
        a = a.wrapping_add(b);
        frame[bi] = round_multiply_result(&mut a, 0);
    }

    // fetch the 240 output samples in time order via the bit-reversal
    // permutation
    let mut outp = 0usize;
    for i in (0..240).step_by(2) {
        let bi = BIT_REV9[i] as usize;
        output[outp] = frame[bi];
        output[outp + 1] = frame[bi + 1];
        outp += 2;
    }

    // the last 16 samples become the next frame's overlap
    let mut ovp = 0usize;
    for i in (240..256).step_by(2) {
        let bi = BIT_REV9[i] as usize;
        overlap[ovp] = frame[bi];
        overlap[ovp + 1] = frame[bi + 1];
        ovp += 2;
    }
}

/// Transform one frame with the 1993 algorithm.
///
/// The 256 samples are expanded to 512 via the RDFT mirror symmetry and run
/// through the full seven Cooley-Tukey iterations. The intermediate adds do
/// not saturate, unlike the 1994+ algorithm; both behaviours match their
/// respective firmware.
pub fn transform_frame_93(
    frame: &mut [u16; FRAME_BUFFER_LEN],
    overlap: &mut [u16; 16],
    output: &mut [u16; 240],
    vol_shift: i32,
) {
    // The 1993 firmware treats the first element pair as a complex number
    // and rewrites it as a purely real value of the same magnitude, because
    // the rest of the algorithm assumes frame[1] is zero. The square root
    // runs as a 5th-order Taylor expansion in 1.15 arithmetic; every
    // observed stream already satisfies frame[1] == 0, but the calculation
    // still shapes the rounding when it runs.
    let mut ar = frame[0];
    let as_flag = (ar as i16) < 0;
    if as_flag {
        ar = (ar as i16).wrapping_neg() as u16;
    }

    // f0 = frame[0]^2 + frame[1]^2
    let mut mr = 0u64;
    let mut prod2 = 0u64;
    mul_ss_mr(&mut mr, frame[1], frame[1]);
    mul_ss_mr(&mut prod2, ar, ar);
    mr = mr.wrapping_add(prod2);

    let mut sr = (mr & 0xFFFF_FFFF) as u32;
    let mut exponent = normalize32(&mut sr) as i16 as i32;
    ar = mr1(sr as u64);

    if ar != 0 {
        // Taylor series for sqrt(f0):
        // 0.10379 + 0.72745*f0 - 0.67245*f0^2 + 0.5534*f0^3
        //         - 0.26825*f0^4 + 0.05606*f0^5
        mr = 0x0D49_0000;
        mr = mr.wrapping_add((((0x5D1Di64) * (ar as i16 as i64)) << 1) as u64);

        let mut mf = multiply_and_round(ar, ar);
        mr = mr.wrapping_add((((-22035i64) * (mf as i16 as i64)) << 1) as u64);

        mf = multiply_and_round(ar, mf);
        mr = mr.wrapping_add((((0x46D6i64) * (mf as i16 as i64)) << 1) as u64);

        mf = multiply_and_round(ar, mf);
        mr = mr.wrapping_add((((-8790i64) * (mf as i16 as i64)) << 1) as u64);

        mf = multiply_and_round(ar, mf);
        mr = mr.wrapping_add((((0x072Di64) * (mf as i16 as i64)) << 1) as u64);

        // an odd exponent folds in sqrt(2)/2 and becomes even
        if (exponent & 1) != 0 {
            let m = mr1(mr);
            multiply_and_round_mr(&mut mr, m, 0x5A82);
            exponent += 1;
        }

        exponent = exponent / 2 + 1;
        let sr = ashift32((mr & 0xFFFF_FFFF) as u32 as i32, exponent);
        ar = mr1(sr as u64);
        if as_flag {
            ar = (ar as i16).wrapping_neg() as u16;
        }
    }

    // store the real magnitude, zero the imaginary part, and copy both to
    // the phantom wrap-around element
    frame[0x000] = ar;
    frame[0x100] = ar;
    frame[0x001] = 0;
    frame[0x101] = 0;

    // expand 256 samples to 512 via the mirror symmetry
    let mut i0 = 0x002usize;
    let mut i1 = 0x0FEusize;
    let mut i2 = 0x102usize;
    let mut i3 = 0x1FEusize;
    for _ in 0..0x40 {
        let xr = sig(frame[i0]);
        let xi = sig(frame[i0 + 1]);
        let yr = sig(frame[i1]);
        let yi = sig(frame[i1 + 1]);

        frame[i0] = xr.wrapping_add(yr) as u16;
        frame[i1] = xr.wrapping_add(yr) as u16;
        frame[i2] = xr.wrapping_sub(yr) as u16;
        frame[i3] = yr.wrapping_sub(xr) as u16;

        frame[i2 + 1] = xi.wrapping_add(yi) as u16;
        frame[i3 + 1] = xi.wrapping_add(yi) as u16;
        frame[i0 + 1] = xi.wrapping_sub(yi) as u16;
        frame[i1 + 1] = yi.wrapping_sub(xi) as u16;

        i0 += 2;
        i1 -= 2;
        i2 += 2;
        i3 -= 2;
    }

    // full 7-iteration Cooley-Tukey IFFT over the 512-element set
    let mut n_partitions = 2usize;
    let mut partition_size = 0x80usize;
    for _ in 0..7 {
        let mut sin_idx = 0usize;
        let mut cos_idx = 0x80usize;
        let mut i0 = 0usize;
        let mut i1 = partition_size;

        for _ in 0..n_partitions {
            let c_sin = IFFT_COEFFICIENTS[sin_idx];
            let c_cos = IFFT_COEFFICIENTS[cos_idx];
            sin_idx += 1;
            cos_idx += 1;

            for _ in 0..partition_size / 2 {
                let a0 = frame[i1];
                let a1 = frame[i1 + 1];
                let y0 = sig(frame[i0]);
                let y1 = sig(frame[i0 + 1]);

                let mut mr = 0u64;
                mul_ss_mr(&mut mr, a0, c_cos);
                let x0 = sig(multiply_round_sub(&mut mr, a1, c_sin));

                mul_ss_mr(&mut mr, a1, c_cos);
                let x1 = sig(multiply_round_add(&mut mr, a0, c_sin));

                frame[i0] = y0.wrapping_sub(x0) as u16;
                frame[i0 + 1] = y1.wrapping_sub(x1) as u16;
                frame[i1] = x0.wrapping_add(y0) as u16;
                frame[i1 + 1] = x1.wrapping_add(y1) as u16;

                i0 += 2;
                i1 += 2;
            }
            i0 += partition_size;
            i1 += partition_size;
        }
        n_partitions *= 2;
        partition_size /= 2;
    }

    // apply the volume scale and extract in time order; the permuted
    // samples land at the odd indices, which the bit-reversed reads never
    // touch
    let mut i4 = 1usize;
    for i in 0..0x100 {
        frame[i4] = (sig(frame[BIT_REV9[i] as usize]) >> vol_shift) as u16;
        i4 += 2;
    }

    // the first 16 outputs blend the previous frame's overlap with the new
    // frame through the overlap window
    let mut outp = 0usize;
    let mut ovp = 0usize;
    let mut cp1 = 0usize;
    let mut cp2 = 0x0Fusize;
    let mut i3 = 1usize;
    for _ in 0..0x10 {
        let mut a = 0u64;
        let mut b = 0u64;
        mul_su_mr(&mut a, overlap[ovp], OVERLAP_COEFFICIENTS[cp2]);
        mul_su_mr(&mut b, frame[i3], OVERLAP_COEFFICIENTS[cp1]);
        ovp += 1;
        if cp2 > 0 {
            cp2 -= 1;
        }
        cp1 += 1;
        a = a.wrapping_add(b);
        output[outp] = round_multiply_result(&mut a, 0);
        outp += 1;
        i3 += 2;
    }

    // the next 224 outputs come directly from the frame
    for _ in 0..0xE0 {
        output[outp] = frame[i3];
        outp += 1;
        i3 += 2;
    }

    // the last 16 samples become the next frame's overlap
    let mut ovp = 0usize;
    for _ in 0..0x10 {
        overlap[ovp] = frame[i3];
        ovp += 1;
        i3 += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_zero_frame_is_silent() {
        let mut frame = [0u16; FRAME_BUFFER_LEN];
        let mut overlap = [0u16; 16];
        let mut output = [0xAAu16; 240];
        transform_frame_94(&mut frame, &mut overlap, &mut output, 0);
        assert!(output.iter().all(|&s| s == 0));
        assert!(overlap.iter().all(|&s| s == 0));

        let mut frame = [0u16; FRAME_BUFFER_LEN];
        let mut overlap = [0u16; 16];
        let mut output = [0xAAu16; 240];
        transform_frame_93(&mut frame, &mut overlap, &mut output, 0);
        assert!(output.iter().all(|&s| s == 0));
        assert!(overlap.iter().all(|&s| s == 0));
    }

    // The two dialects implement the same mathematical transform with
    // different rounding sites; on a moderate-amplitude input their outputs
    // agree to within a few LSBs per sample.
    #[test]
    fn verify_dialects_agree_up_to_rounding() {
        let mut freq = [0u16; FRAME_BUFFER_LEN];
        freq[20] = ((0.05f32 * 32768.0) as i32) as u16;
        freq[37] = ((-0.03f32 * 32768.0) as i32) as i16 as u16;
        freq[130] = ((0.02f32 * 32768.0) as i32) as u16;

        let mut f94 = freq;
        let mut ov94 = [0u16; 16];
        let mut out94 = [0u16; 240];
        transform_frame_94(&mut f94, &mut ov94, &mut out94, 0);

        let mut f93 = freq;
        let mut ov93 = [0u16; 16];
        let mut out93 = [0u16; 240];
        transform_frame_93(&mut f93, &mut ov93, &mut out93, 0);

        for t in 0..240 {
            let a = out94[t] as i16 as i32;
            let b = out93[t] as i16 as i32;
            assert!((a - b).abs() <= 64, "sample {}: {} vs {}", t, a, b);
        }
    }

    #[test]
    fn verify_transform_is_deterministic() {
        let mut freq = [0u16; FRAME_BUFFER_LEN];
        for (i, s) in freq.iter_mut().enumerate().take(0x100) {
            *s = ((i as u32).wrapping_mul(2654435761) >> 22) as u16 & 0x03FF;
        }
        freq[1] = 0;

        let run = |vol_shift: i32| {
            let mut f = freq;
            let mut ov = [0u16; 16];
            let mut out = [0u16; 240];
            transform_frame_94(&mut f, &mut ov, &mut out, vol_shift);
            (out, ov)
        };
        assert_eq!(run(2), run(2));
    }

    #[test]
    fn verify_overlap_carries_between_frames() {
        // a frame of silence following a tone must still emit the tone's
        // windowed tail through the overlap buffer
        let mut frame = [0u16; FRAME_BUFFER_LEN];
        frame[2 * 10] = ((0.05 * 32768.0) as i32) as u16;
        let mut overlap = [0u16; 16];
        let mut output = [0u16; 240];
        transform_frame_94(&mut frame, &mut overlap, &mut output, 0);
        assert!(overlap.iter().any(|&s| s != 0));

        let mut silent = [0u16; FRAME_BUFFER_LEN];
        let mut out2 = [0u16; 240];
        transform_frame_94(&mut silent, &mut overlap, &mut out2, 0);
        assert!(out2[..16].iter().any(|&s| s != 0));
        assert!(out2[16..].iter().all(|&s| s == 0));
    }
}
