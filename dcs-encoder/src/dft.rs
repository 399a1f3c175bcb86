// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `dft` module transforms a 256-sample PCM window into the
//! frequency-domain layout the DCS frame formats store.
//!
//! Two implementations are provided. [`dft_frame`] is the exact algebraic
//! inversion of the decoder's 1994+ inverse transform: a dual-halves FFT
//! followed by the inverse of the decoder's twiddle passes. It preserves
//! the edge-sample invariants the decoder assumes (samples [1] and [0x81]
//! come out zero). [`dft_frame_generic`] computes the same transform with a
//! textbook complex FFT and split pass; it is simpler but rounds the edge
//! samples slightly differently, so the inversion variant is the one the
//! encoder uses.

use lazy_static::lazy_static;

use std::f64::consts::PI;

/// Window applied to the first and last 16 samples of each 256-sample
/// input window; successive windows overlap by 16 samples and the decoder
/// blends them with the reciprocal overlap coefficients.
#[rustfmt::skip]
pub const WINDOW_FUNC: [f32; 16] = [
    0.010179, 0.040507, 0.090368, 0.158746, 0.244250, 0.345139, 0.459359, 0.584585,
    0.647178, 0.752018, 0.829799, 0.888221, 0.932184, 0.964581, 0.986700, 0.998439,
];

/// Twiddle coefficients for the inverse of the decoder's "twiddle with
/// half-set coefficients" pass: cos/sin pairs of 2*PI*(i - 128)/256.
#[rustfmt::skip]
const TWIDDLE_COEFFICIENTS: [f32; 128] = [
    -1.0000000, 0.0000000, -0.9996948, -0.0245361, -0.9988098, -0.0490723, -0.9972839, -0.0735779,
    -0.9951782, -0.0980225, -0.9924927, -0.1224060, -0.9891663, -0.1467285, -0.9852905, -0.1709595,
    -0.9807739, -0.1950989, -0.9757080, -0.2191162, -0.9700317, -0.2429810, -0.9637756, -0.2667236,
    -0.9569397, -0.2902832, -0.9495239, -0.3136902, -0.9415588, -0.3368835, -0.9329834, -0.3598938,
    -0.9238892, -0.3826904, -0.9142151, -0.4052429, -0.9039917, -0.4275513, -0.8932190, -0.4496155,
    -0.8819275, -0.4714050, -0.8700867, -0.4928894, -0.8577271, -0.5140991, -0.8448486, -0.5350037,
    -0.8314819, -0.5555725, -0.8175964, -0.5758057, -0.8032227, -0.5957031, -0.7883606, -0.6152344,
    -0.7730103, -0.6343994, -0.7572021, -0.6531677, -0.7409363, -0.6715698, -0.7242432, -0.6895447,
    -0.7070923, -0.7070923, -0.6895447, -0.7242432, -0.6715698, -0.7409363, -0.6531677, -0.7572021,
    -0.6343994, -0.7730103, -0.6152344, -0.7883606, -0.5957031, -0.8032227, -0.5758057, -0.8175964,
    -0.5555725, -0.8314819, -0.5350037, -0.8448486, -0.5140991, -0.8577271, -0.4928894, -0.8700867,
    -0.4714050, -0.8819275, -0.4496155, -0.8932190, -0.4275513, -0.9039917, -0.4052429, -0.9142151,
    -0.3826904, -0.9238892, -0.3598938, -0.9329834, -0.3368835, -0.9415588, -0.3136902, -0.9495239,
    -0.2902832, -0.9569397, -0.2667236, -0.9637756, -0.2429810, -0.9700317, -0.2191162, -0.9757080,
    -0.1950989, -0.9807739, -0.1709595, -0.9852905, -0.1467285, -0.9891663, -0.1224060, -0.9924927,
    -0.0980225, -0.9951782, -0.0735779, -0.9972839, -0.0490723, -0.9988098, -0.0245361, -0.9996948,
];

lazy_static! {
    /// 9-bit bit-reversal table for loading the FFT inputs.
    static ref BIT_REV9: [usize; 512] = {
        let mut table = [0usize; 512];
        for (i, t) in table.iter_mut().enumerate() {
            let mut rev = 0usize;
            let mut addr = i;
            for _ in 0..9 {
                rev = (rev << 1) | (addr & 1);
                addr >>= 1;
            }
            *t = rev;
        }
        table
    };

    /// Cooley-Tukey coefficients for all seven iterations of a 128-point
    /// FFT, flattened in iteration order: w[j,m] = exp(-2*PI*i*j/m).
    static ref FFT_COEFFICIENTS: [f32; 896] = {
        let mut table = [0f32; 896];
        let mut cp = 0usize;
        for s in 1..=7u32 {
            let m = 1usize << s;
            let mut k = 0usize;
            while k < 128 {
                for j in 0..m / 2 {
                    let theta = -2.0 * PI * (j as f64) / (m as f64);
                    table[cp] = theta.cos() as f32;
                    table[cp + 1] = theta.sin() as f32;
                    cp += 2;
                }
                k += m;
            }
        }
        table
    };
}

/// Dual-halves FFT: two independent 64-point DFTs, one over the
/// even-numbered inputs and one over the odd-numbered inputs, matching the
/// layout the decoder's six-iteration IFFT consumes.
fn dual_fft(buf: &mut [f32; 256], inbuf: &[f32; 256]) {
    // load the real/imaginary pairs in bit-reversed order
    let mut idx = 0usize;
    for _ in 0..128 {
        let bi = BIT_REV9[idx];
        buf[bi] = inbuf[idx];
        buf[bi + 1] = inbuf[idx + 1];
        idx += 2;
    }

    // Cooley-Tukey, stopping one iteration short of the full transform so
    // the two halves remain separate
    let mut coeff = 0usize;
    for s in 1..=6u32 {
        let m = 1usize << s;
        let mut k = 0usize;
        while k < 128 {
            for j in 0..m / 2 {
                let costh = FFT_COEFFICIENTS[coeff];
                let sinth = FFT_COEFFICIENTS[coeff + 1];
                coeff += 2;

                let t_idx = (k + j + m / 2) * 2;
                let ar = buf[t_idx];
                let ai = buf[t_idx + 1];

                let tr = ar * costh - ai * sinth;
                let ti = ar * sinth + ai * costh;

                let u_idx = (k + j) * 2;
                let ur = buf[u_idx];
                let ui = buf[u_idx + 1];

                buf[u_idx] = tr + ur;
                buf[u_idx + 1] = ti + ui;
                buf[t_idx] = ur - tr;
                buf[t_idx + 1] = ui - ti;
            }
            k += m;
        }
    }

    // The skipped final iteration would merge the halves with the
    // odd-numbered coefficients; instead, apply those coefficients to the
    // second half so it becomes the independent DFT of the odd inputs.
    let mut coeff = FFT_COEFFICIENTS.len() - 63 * 2;
    for j in 1..64usize {
        let costh = FFT_COEFFICIENTS[coeff];
        let sinth = FFT_COEFFICIENTS[coeff + 1];
        coeff += 2;

        let t_idx = 128 + j * 2;
        let ar = buf[t_idx];
        let ai = buf[t_idx + 1];
        buf[t_idx] = ar * costh - ai * sinth;
        buf[t_idx + 1] = ar * sinth + ai * costh;
    }

    // 1/N normalization, N being the 64 complex elements of each half
    for s in buf.iter_mut() {
        *s *= 1.0 / 64.0;
    }
}

/// Transform a windowed 256-sample PCM buffer into a DCS frequency-domain
/// frame, as the inverse of the decoder's transform. The result occupies
/// `fbuf[0..256]`; two extra trailing elements are working space.
pub fn dft_frame(fbuf: &mut [f32; 258], input: &[f32; 256]) {
    let mut work = [0f32; 256];
    dual_fft(&mut work, input);
    fbuf[..256].copy_from_slice(&work);

    // The decoder assumes element [1] is zero after decompression, and
    // element [0x81] is zero in all original recordings. Both are inputs
    // to the twiddle passes, so they are solved for the values that yield
    // zero at the decoder rather than zeroed after the fact.
    fbuf[0x1] = (fbuf[0x0] + fbuf[0x80]) / 2.0;
    fbuf[0x81] = fbuf[0x1];

    // phantom wrap-around pair shared with the loop bounds
    fbuf[0x100] = fbuf[0x1];
    fbuf[0x101] = fbuf[0x1];

    // even/odd folding
    {
        let mut p0 = 0usize;
        let mut p1 = 0x80usize;
        for _ in 0..0x40 {
            let x0 = fbuf[p0];
            let y0 = fbuf[p0 + 1];
            let x1 = fbuf[p1];
            let y1 = fbuf[p1 + 1];

            fbuf[p0] = (x0 + x1) / 2.0;
            fbuf[p0 + 1] = (y0 + y1) / 2.0;
            fbuf[p1] = (x0 - x1) / 2.0;
            fbuf[p1 + 1] = (y0 - y1) / 2.0;

            p0 += 2;
            p1 += 2;
        }
    }

    // twiddling: the inverse of the decoder's half-set coefficient pass
    {
        let mut tw = 0usize;
        let mut p0 = 0usize;
        let mut p1 = 0x100usize;
        for _ in 0..0x40 {
            let x0 = fbuf[p0];
            let y0 = fbuf[p0 + 1];
            let x1 = fbuf[p1];
            let y1 = fbuf[p1 + 1];

            // sum = (a0 - conj(a1)) / 2
            let xsum = (x0 - x1) / 2.0;
            let ysum = (y0 + y1) / 2.0;

            let costh = TWIDDLE_COEFFICIENTS[tw];
            let sinth = TWIDDLE_COEFFICIENTS[tw + 1];
            tw += 2;

            // buf[2i] = (a0 + conj(a1)) / 2
            fbuf[p0] = (x0 + x1) / 2.0;
            fbuf[p0 + 1] = (y0 - y1) / 2.0;

            // buf[256 - 2i] = (a0 - conj(a1)) / 2 * exp(i*theta)
            fbuf[p1] = xsum * sinth - ysum * costh;
            fbuf[p1 + 1] = xsum * costh + ysum * sinth;

            p0 += 2;
            p1 -= 2;
        }
    }

    // high/low folding
    {
        let mut p0 = 0usize;
        let mut p1 = 0x100usize;
        for _ in 0..0x40 {
            let x0 = -fbuf[p0];
            let y0 = -fbuf[p0 + 1];
            let x1 = -fbuf[p1];
            let y1 = -fbuf[p1 + 1];

            fbuf[p0] = (x0 + x1) / 2.0;
            fbuf[p0 + 1] = (y0 + y1) / 2.0;
            fbuf[p1] = (x0 - x1) / 2.0;
            fbuf[p1 + 1] = (y0 - y1) / 2.0;

            p0 += 2;
            p1 -= 2;
        }
        fbuf[0x80] = -fbuf[0x80];
        fbuf[0x81] = -fbuf[0x81];
    }

    // fix the signs of the second-half odd elements
    let mut i = 129usize;
    while i < 256 {
        fbuf[i] = -fbuf[i];
        i += 2;
    }
}

/// Generic split-radix formulation of the same transform. Kept as an
/// alternative reference; its rounding at the edge samples differs
/// slightly from the inversion variant.
pub fn dft_frame_generic(outbuf: &mut [f32; 258], input: &[f32; 256]) {
    // load the bit-reversed inputs in double precision
    let mut buf = [0f64; 258];
    let mut idx = 0usize;
    for _ in 0..128 {
        let bi = BIT_REV9[idx];
        buf[bi] = f64::from(input[idx]);
        buf[bi + 1] = f64::from(input[idx + 1]);
        idx += 2;
    }

    // full 128-point complex DFT
    for s in 1..=7u32 {
        let m = 1usize << s;
        let mut k = 0usize;
        while k < 128 {
            for j in 0..m / 2 {
                let theta = -2.0 * PI * (j as f64) / (m as f64);
                let costh = theta.cos();
                let sinth = theta.sin();

                let t_idx = (k + j + m / 2) * 2;
                let ar = buf[t_idx];
                let ai = buf[t_idx + 1];
                let tr = ar * costh - ai * sinth;
                let ti = ar * sinth + ai * costh;

                let u_idx = (k + j) * 2;
                let ur = buf[u_idx];
                let ui = buf[u_idx + 1];

                buf[u_idx] = tr + ur;
                buf[u_idx + 1] = ti + ui;
                buf[t_idx] = ur - tr;
                buf[t_idx + 1] = ui - ti;
            }
            k += m;
        }
    }

    // split the packed real/imaginary sums into the real DFT coefficients
    buf[256] = buf[0];
    buf[257] = buf[1];
    buf[128] += buf[129];
    buf[129] = 0.0;
    buf[0] += buf[128];
    for k in 0..128usize {
        let th = PI * (k as f64) / 128.0;
        let ai = -th.cos();
        let ar = 1.0 - th.sin();
        let bi = -ai;
        let br = 1.0 + th.sin();

        const FNORM: f64 = -1.0 / 512.0;
        let kr = k * 2;
        let ki = kr + 1;
        outbuf[kr] = ((buf[kr] * ar - buf[ki] * ai + buf[256 - kr] * br + buf[258 - ki] * bi)
            * FNORM) as f32;
        outbuf[ki] = ((buf[ki] * ar + buf[kr] * ai + buf[256 - kr] * bi - buf[258 - ki] * br)
            * FNORM) as f32;
    }
    outbuf[129] = 0.0;
    outbuf[256] = 0.0;
    outbuf[257] = 0.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Encode a window with the forward transform and run it through the
    // decoder's inverse; the middle of the window must reproduce the input.
    #[test]
    fn verify_forward_inverts_decoder_transform() {
        use dcs_decoder::transform::{transform_frame_94, FRAME_BUFFER_LEN};

        // a couple of tones, away from full scale
        let mut input = [0f32; 256];
        for (t, s) in input.iter_mut().enumerate() {
            let th = 2.0 * std::f32::consts::PI * (t as f32) / 256.0;
            *s = 0.15 * (th * 5.0).sin() + 0.08 * (th * 41.0).cos();
        }

        // window the edges as the encoder does
        let mut windowed = input;
        for i in 0..16 {
            windowed[i] *= WINDOW_FUNC[i];
            windowed[255 - i] *= WINDOW_FUNC[i];
        }

        let mut fbuf = [0f32; 258];
        dft_frame(&mut fbuf, &windowed);

        // the edge invariants the frame formats rely on
        assert!(fbuf[1].abs() < 1e-4, "fbuf[1] = {}", fbuf[1]);
        assert!(fbuf[0x81].abs() < 1e-4, "fbuf[0x81] = {}", fbuf[0x81]);

        // quantize to 1.15 and run the decoder's inverse transform
        let mut frame = [0u16; FRAME_BUFFER_LEN];
        for i in 0..256 {
            let v = (f64::from(fbuf[i]) * 32768.0).round() as i32;
            frame[i] = v.clamp(-32768, 32767) as i16 as u16;
        }
        let mut overlap = [0u16; 16];
        let mut output = [0u16; 240];
        transform_frame_94(&mut frame, &mut overlap, &mut output, 0);

        // The decoder emits 240 samples per 256-sample window; the first 16
        // are overlap-blended, so compare the unblended body. Quantization
        // bounds the error to a few LSB.
        for t in 16..240 {
            let got = f64::from(output[t] as i16) / 32768.0;
            let want = f64::from(input[t]);
            assert!(
                (got - want).abs() < 0.004,
                "sample {}: got {} want {}",
                t,
                got,
                want
            );
        }
    }

    // The generic formulation must agree with the inversion variant away
    // from the edge samples.
    #[test]
    fn verify_generic_variant_agrees() {
        let mut input = [0f32; 256];
        for (t, s) in input.iter_mut().enumerate() {
            let th = 2.0 * std::f32::consts::PI * (t as f32) / 256.0;
            *s = 0.1 * (th * 13.0).sin();
        }

        let mut a = [0f32; 258];
        let mut b = [0f32; 258];
        dft_frame(&mut a, &input);
        dft_frame_generic(&mut b, &input);

        for i in 2..256 {
            if i == 0x80 || i == 0x81 {
                continue;
            }
            assert!(
                (f64::from(a[i]) - f64::from(b[i])).abs() < 1e-3,
                "element {}: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }
}
