// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mixer` module derives the per-channel and master volume
//! multipliers.
//!
//! Both curves are roughly logarithmic, computed the way the DSP computes
//! them: eight rounds of squaring a 1.15 base, conditionally multiplying
//! the accumulator when the corresponding bit of the exponent byte is zero.
//! A floating-point `powf` would land within a few ppm of these values and
//! still break bit-exact comparison, so the iterative form is mandatory.

use crate::channel::{Channel, MixingControl};
use dcs_core::rom::OsVersion;
use dcs_core::MAX_CHANNELS;

/// Advance every fade by one step: decrement the counter, add the delta,
/// clamp to +/-8191, and snap to the target on the final step.
pub fn advance_fades(channels: &mut [Channel; MAX_CHANNELS]) {
    for ch in channels.iter_mut() {
        for mixer in ch.mixer.iter_mut() {
            if mixer.fade_steps == 1 {
                mixer.fade_steps = 0;
                mixer.cur_level = mixer.fade_target_level;
            }
            else if mixer.fade_steps > 1 {
                mixer.fade_steps -= 1;
                mixer.cur_level += mixer.fade_delta;
                mixer.cur_level = mixer.cur_level.clamp(-8191, 8191);
            }
        }
    }
}

/// Sum a channel's mixing contributions into the exponent byte used by the
/// attenuation curve.
pub fn mixer_exponent(mixer: &[MixingControl; MAX_CHANNELS]) -> u16 {
    let mut sum: i32 = mixer.iter().map(|m| m.cur_level).sum();
    sum = sum.clamp(-8191, 8191);
    (((sum >> 6) & 0x3FF) + 0x80) as u16
}

/// Compute a channel's aggregate mixing multiplier from its exponent byte.
///
/// This evaluates `start * 0.9733^(255 - mixer_exp)` in 1.15 arithmetic:
/// eight iterations squaring the factor 0x7C94, multiplying the running
/// value on each zero bit of the exponent.
pub fn mixing_multiplier(mixer_exp: u16, start: u16) -> u16 {
    let mut multiplier = u32::from(start);
    let mut prod: u32 = 0x7C94;
    for j in 0..8 {
        if (mixer_exp & (1 << j)) == 0 {
            multiplier = (multiplier * prod) >> 15;
        }
        prod = (prod * prod) >> 15;
    }
    ((multiplier as u16) << 1) as u16
}

/// Recompute every channel's aggregate mixing multiplier. The starting
/// multiplier is 0x7FFF for OS93a, the channel volume shifted into 1.15
/// range for later firmware, and the fixed maximum when the override flag
/// is set.
pub fn update_mixing_multipliers(channels: &mut [Channel; MAX_CHANNELS], os: OsVersion) {
    for ch in channels.iter_mut() {
        let mixer_exp = mixer_exponent(&ch.mixer);

        let mut start = if os == OsVersion::Os93a {
            0x7FFF
        }
        else {
            ch.channel_volume << 7
        };
        if ch.max_mixing_level_override {
            start = 0xFF << 7;
        }

        ch.mixing_multiplier = mixing_multiplier(mixer_exp, start);
    }
}

/// Compute the master volume multiplier for a nominal volume byte. Volume
/// zero mutes completely; 255 plays at the reference PCM level. The curve
/// is `0.5 * 0.981201^(255 - vol)`, evaluated with the DSP's constants
/// x = 0x3FFF and y = 0x7D98.
pub fn master_volume_multiplier(vol: u8) -> u16 {
    if vol == 0 {
        return 0;
    }

    let mut s = u32::from(vol);
    let mut x: u32 = 0x3FFF;
    let mut y: u32 = 0x7D98;
    for _ in 0..8 {
        if (s & 1) == 0 {
            x = ((x * y) >> 15) & 0xFFFF;
        }
        y = ((y * y) >> 15) & 0xFFFF;
        s >>= 1;
    }
    (x << 1) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_master_volume_endpoints() {
        // volume 0 mutes
        assert_eq!(master_volume_multiplier(0), 0);

        // volume 255 has every exponent bit set, so the seed passes through
        // unattenuated and the result is 2 * 0x3FFF
        assert_eq!(master_volume_multiplier(255), 0x7FFE);

        assert_eq!(master_volume_multiplier(0x67), 0x0722);
        assert_eq!(master_volume_multiplier(1), 0x0106);
    }

    #[test]
    fn verify_master_volume_monotonic() {
        let mut last = 0u16;
        for vol in 1..=255u16 {
            let cur = master_volume_multiplier(vol as u8);
            assert!(cur >= last, "volume {} multiplier {} < {}", vol, cur, last);
            last = cur;
        }
    }

    #[test]
    fn verify_mixing_multiplier_attenuation() {
        // a full-scale mixer sum (+8191) gives exponent 0xFF: no exponent
        // bit is clear, so the starting multiplier passes straight through
        let full = mixing_multiplier(mixer_exponent(&{
            let mut m: [MixingControl; MAX_CHANNELS] = Default::default();
            m[0].cur_level = 8191;
            m
        }), 0x7FFF);
        assert_eq!(full, 0x7FFE);

        // a zero sum (exponent 0x80) sits about 30 dB down
        let idle = mixing_multiplier(0x80, 0x7FFF);
        assert_eq!(idle, 0x082C);

        // a floor-level sum attenuates to near silence
        let floor = mixing_multiplier(mixer_exponent(&{
            let mut m: [MixingControl; MAX_CHANNELS] = Default::default();
            m[0].cur_level = -8191;
            m
        }), 0x7FFF);
        assert_eq!(floor, 0x0040);
    }

    #[test]
    fn verify_fade_reaches_target_without_overshoot() {
        let mut channels: [Channel; MAX_CHANNELS] = Default::default();
        let target = 4000;
        let steps = 7;
        {
            let m = &mut channels[2].mixer[1];
            m.cur_level = 1000;
            m.fade_target_level = target;
            m.fade_delta = (target - 1000) / steps;
            m.fade_steps = steps;
        }

        let mut levels = Vec::new();
        for _ in 0..steps {
            advance_fades(&mut channels);
            levels.push(channels[2].mixer[1].cur_level);
        }

        // monotonically rising, landing exactly on the target at step N
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*levels.last().unwrap(), target);
        assert!(levels.iter().all(|&l| l <= target));

        // further passes leave the level pinned
        advance_fades(&mut channels);
        assert_eq!(channels[2].mixer[1].cur_level, target);
    }
}
