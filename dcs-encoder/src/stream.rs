// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `stream` module buffers PCM input and accumulates the per-band
//! analysis that drives the compression parameter search.
//!
//! Input samples collect in a 256-sample window (the first 16 samples of
//! every window are the previous window's tail, mirroring the decoder's
//! overlap-add). Each full window is windowed, transformed to the frequency
//! domain, and stored with its per-band dynamic range and power; the
//! compressor picks its scaling codes and band cutoff only after the whole
//! stream has been analyzed.

use crate::dft::{dft_frame, WINDOW_FUNC};
use crate::CompressionParams;
use crate::codebooks::{BAND_SAMPLE_COUNTS_93, BAND_SAMPLE_COUNTS_94};

/// Per-band minimum/maximum of the frequency-domain samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct Range {
    pub lo: f32,
    pub hi: f32,
}

/// One uncompressed frequency-domain frame with its band analysis.
pub struct Frame {
    /// The 256 frequency-domain samples, in stream storage order.
    pub f: [f32; 256],
    pub range: [Range; 16],
    pub power: [f32; 16],
}

impl Frame {
    fn new(src: &[f32], params: &CompressionParams) -> Frame {
        let mut f = [0f32; 256];
        f.copy_from_slice(&src[..256]);

        let band_sample_counts = if params.format_version == 0x9400 {
            &BAND_SAMPLE_COUNTS_94
        }
        else {
            &BAND_SAMPLE_COUNTS_93
        };

        let mut range = [Range::default(); 16];
        let mut power = [0f32; 16];
        let mut src_idx = 0usize;
        for band in 0..16 {
            let mut lo = f[src_idx];
            let mut hi = lo;
            let mut pw = lo * lo;
            for _ in 1..band_sample_counts[band] {
                src_idx += 1;
                let s = f[src_idx];
                pw += s * s;
                if s < lo {
                    lo = s;
                }
                if s > hi {
                    hi = s;
                }
            }
            src_idx += 1;
            range[band] = Range { lo, hi };
            power[band] = pw;
        }

        Frame { f, range, power }
    }
}

/// A stream of PCM input being collected for encoding. The input must
/// already be at the DCS rate of 31250 Hz; rate conversion is the caller's
/// concern.
pub struct EncoderStream {
    pub(crate) params: CompressionParams,
    input_buf: [f32; 256],
    n_input: usize,
    pub(crate) frames: Vec<Frame>,
    pub(crate) range: [Range; 16],
    pub(crate) power_sum: [f32; 16],
}

impl EncoderStream {
    pub(crate) fn new(params: CompressionParams) -> EncoderStream {
        EncoderStream {
            params,
            input_buf: [0f32; 256],
            // the first window starts with 16 samples of phantom overlap
            // from the non-existent prior frame
            n_input: 16,
            frames: Vec::new(),
            range: [Range::default(); 16],
            power_sum: [0f32; 16],
        }
    }

    /// Append normalized float samples (-1.0 to 1.0).
    pub fn write(&mut self, pcm: &[f32]) {
        for &s in pcm {
            self.input_buf[self.n_input] = s;
            self.n_input += 1;
            if self.n_input == 256 {
                self.transform_window();
            }
        }
    }

    /// Append signed 16-bit samples.
    pub fn write_i16(&mut self, pcm: &[i16]) {
        for &s in pcm {
            self.input_buf[self.n_input] = f32::from(s) / 32768.0;
            self.n_input += 1;
            if self.n_input == 256 {
                self.transform_window();
            }
        }
    }

    /// Number of frames collected so far.
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Pad the final partial window with silence and transform it. A
    /// window holding only the 16 overlap samples is considered empty.
    pub(crate) fn finish(&mut self) {
        if self.n_input != 16 {
            while self.n_input < 256 {
                self.input_buf[self.n_input] = 0.0;
                self.n_input += 1;
            }
            self.transform_window();
        }
    }

    /// Transform the current window into a frequency-domain frame and fold
    /// its analysis into the running totals.
    fn transform_window(&mut self) {
        // the last 16 samples seed the next window's overlap
        let mut overlap = [0f32; 16];
        overlap.copy_from_slice(&self.input_buf[240..256]);

        // window the edges
        for i in 0..16 {
            self.input_buf[i] *= WINDOW_FUNC[i];
            self.input_buf[255 - i] *= WINDOW_FUNC[i];
        }

        let mut fbuf = [0f32; 258];
        dft_frame(&mut fbuf, &self.input_buf);

        // Sample [1] is omitted from the stored layout (it is zero by the
        // transform's construction); the frame storage starts at [1] with
        // the DC term folded in.
        fbuf[1] = fbuf[0];
        let frame = Frame::new(&fbuf[1..257], &self.params);

        let is_first = self.frames.is_empty();
        for band in 0..16 {
            self.power_sum[band] += frame.power[band];
            if is_first || frame.range[band].lo < self.range[band].lo {
                self.range[band].lo = frame.range[band].lo;
            }
            if is_first || frame.range[band].hi > self.range[band].hi {
                self.range[band].hi = frame.range[band].hi;
            }
        }
        self.frames.push(frame);

        self.input_buf[..16].copy_from_slice(&overlap);
        self.n_input = 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_window_framing() {
        let mut stream = EncoderStream::new(CompressionParams::default());

        // the first frame needs only 240 new samples thanks to the phantom
        // overlap seed
        stream.write_i16(&[0i16; 240]);
        assert_eq!(stream.n_frames(), 1);

        // each further 240 samples adds one frame
        stream.write_i16(&[0i16; 480]);
        assert_eq!(stream.n_frames(), 3);

        // a trailing partial window pads out with silence
        stream.write_i16(&[1000i16; 100]);
        stream.finish();
        assert_eq!(stream.n_frames(), 4);
    }

    #[test]
    fn verify_band_analysis_accumulates() {
        let mut stream = EncoderStream::new(CompressionParams::default());
        let tone: Vec<i16> = (0..480)
            .map(|t| {
                let th = 2.0 * std::f32::consts::PI * (t as f32) / 32.0;
                (th.sin() * 8000.0) as i16
            })
            .collect();
        stream.write_i16(&tone);
        stream.finish();

        assert!(stream.n_frames() >= 2);
        let total: f32 = stream.power_sum.iter().sum();
        assert!(total > 0.0);
        // a 1/32-cycle tone at 31250 Hz sits near 977 Hz, i.e. in the
        // lowest bands; the top half of the spectrum stays quiet
        let low: f32 = stream.power_sum[..4].iter().sum();
        let high: f32 = stream.power_sum[8..].iter().sum();
        assert!(low > high * 10.0);
    }
}
