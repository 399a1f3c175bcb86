// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `channel` module defines the per-channel decoder state.
//!
//! Channels exist purely for mixing: each can play one audio stream at a
//! time, and all active channels are summed into a single monophonic output.
//! A channel also hosts the byte-code track program that drives its stream,
//! a stack of loop points for that program, and one mixing-control slot per
//! *source* channel, since every channel's program may independently set a
//! mixing level on every other channel.

use std::sync::Arc;

use bitflags::bitflags;

use dcs_core::io::BitReader;
use dcs_core::rom::RomPointer;
use dcs_core::MAX_CHANNELS;

bitflags! {
    /// Bits carried in the high bits of stream header bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderBits: u8 {
        /// In byte 0, selects the Type 1 major format. In bytes 1 and 2 it
        /// contributes to the 2-bit sub-type code.
        const TYPE1 = 0x80;
        /// Half-density band: half as many inputs as outputs, mapped to
        /// every other output slot.
        const HALF_DENSITY = 0x40;
    }
}

/// Mixing level control for one (target, source) channel pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct MixingControl {
    /// Current mixing level, -8191..+8191.
    pub cur_level: i32,
    /// Final level of a fade in progress.
    pub fade_target_level: i32,
    /// Increment applied to `cur_level` on each fade step.
    pub fade_delta: i32,
    /// Number of fade steps remaining.
    pub fade_steps: i32,
}

impl MixingControl {
    pub fn reset(&mut self) {
        self.cur_level = 0;
        self.fade_target_level = 0;
        self.fade_steps = 0;
    }
}

/// Host event timer. A track program can arrange for a byte to be written
/// to the host data port at a fixed interval, in units of main-loop passes.
/// Only the OS93a opcode set can arm it, but the mechanism exists in every
/// firmware generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostEventTimer {
    pub data: u8,
    pub interval: u16,
    pub counter: u16,
}

impl HostEventTimer {
    pub fn set(&mut self, data: u8, interval: u16) {
        self.data = data;
        self.interval = interval;
        self.counter = interval;
    }

    pub fn clear(&mut self) {
        self.interval = 0;
        self.counter = 0;
    }

    /// Advance the countdown by one main-loop pass. Returns true when the
    /// timer fires; the counter reloads from the interval.
    pub fn update(&mut self) -> bool {
        if self.interval != 0 {
            self.counter = self.counter.wrapping_sub(1);
            if self.counter == 0 {
                self.counter = self.interval;
                return true;
            }
        }
        false
    }
}

/// Parameter block written by track opcodes 0x10-0x12 and data-port commands
/// 0x55BA..0x55C1. The firmware stores these values but never reads them
/// back anywhere that matters; the operands must still be accepted.
#[derive(Debug, Clone, Copy)]
pub struct ShadowParams {
    pub current: u16,
    pub target: u16,
    pub command: u32,
    pub step_counter: u16,
    pub step_size: f32,
}

impl Default for ShadowParams {
    fn default() -> Self {
        ShadowParams {
            current: 0x007F,
            target: 0x007F,
            command: 0x0000_007F,
            step_counter: 0xFFFF,
            step_size: 0.0,
        }
    }
}

impl ShadowParams {
    pub fn set(&mut self, new_target: u16) {
        self.current = new_target;
        self.target = new_target;
        self.command = 0;
        self.step_counter = 0xFFFF;
        self.step_size = 0.0;
    }

    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// The audio stream playing in a channel.
#[derive(Default, Clone)]
pub struct AudioStream {
    /// Backing bytes: a ROM chip image or an externally supplied buffer.
    pub data: Option<Arc<[u8]>>,
    /// Offset of the stream header within `data`.
    pub header_pos: usize,
    /// Header length: 16 bytes, or 1 for OS93a Type 1 streams.
    pub header_len: usize,
    /// Offset of the packed bit section, immediately after the header.
    pub start_pos: usize,
    /// Current playback position. `None` when the channel is idle.
    pub playback: Option<BitReader>,
    /// Local copy of the stream header, zero padded to 16 bytes.
    pub header: [u8; 16],
    /// Running per-band band-type codes. Frame headers encode these as
    /// deltas from the previous frame.
    pub band_type_buf: [u16; 16],
    /// Frames remaining in the current pass over the stream.
    pub frame_counter: u16,
    /// Total frames in the stream.
    pub num_frames: u16,
    /// Remaining repeats; zero means loop forever.
    pub loop_counter: u16,
}

impl AudioStream {
    pub fn clear(&mut self) {
        self.data = None;
        self.playback = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }
}

/// A loop point pushed by track opcode 0x0E.
#[derive(Debug, Clone, Copy)]
pub struct LoopPos {
    pub counter: u16,
    pub pos: RomPointer,
}

/// State of one mixing channel.
pub struct Channel {
    /// Byte-code program counter; `None` when no track program is active.
    pub track_ptr: Option<RomPointer>,
    /// Wait counter compared against each opcode's count prefix.
    pub track_counter: u16,
    /// Type of the deferred track link (2 or 3; 0 when none is pending).
    pub next_track_type: u8,
    /// Deferred track link operand.
    pub next_track_link: u16,
    /// Set on a stream error; the next main-loop pass tears the channel down.
    pub stop: bool,
    pub audio_stream: AudioStream,
    /// Channel whose program loaded the current stream, or -1.
    pub source_channel: i32,
    /// Mixing contributions to this channel, indexed by source channel.
    pub mixer: [MixingControl; MAX_CHANNELS],
    /// Forces the maximum mixing level, bypassing the normal calculation.
    /// Only firmware 1.05 can toggle this, and only on channel 5.
    pub max_mixing_level_override: bool,
    /// Aggregate mixing multiplier for the channel, 1.15 format.
    pub mixing_multiplier: u16,
    pub host_event_timer: HostEventTimer,
    /// Per-channel volume set by data-port commands 55AB..55B2.
    pub channel_volume: u16,
    pub loop_stack: Vec<LoopPos>,
    pub shadow_params: ShadowParams,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            track_ptr: None,
            track_counter: 0,
            next_track_type: 0,
            next_track_link: 0,
            stop: false,
            audio_stream: Default::default(),
            source_channel: -1,
            mixer: Default::default(),
            max_mixing_level_override: false,
            mixing_multiplier: 0x7FFF,
            host_event_timer: Default::default(),
            channel_volume: 0xFF,
            loop_stack: Vec::new(),
            shadow_params: Default::default(),
        }
    }
}

impl Channel {
    /// Push a loop point for opcode 0x0E.
    pub fn push_pos(&mut self, counter: u16, pos: RomPointer) {
        self.loop_stack.push(LoopPos { counter, pos });
    }

    /// Pop or iterate the loop stack for opcode 0x0F. A saved counter of
    /// zero loops forever; a counter of one ends the loop.
    pub fn pop_pos(&mut self, pos: &mut RomPointer) {
        if let Some(top) = self.loop_stack.last_mut() {
            if top.counter == 0 {
                *pos = top.pos;
            }
            else if top.counter == 1 {
                self.loop_stack.pop();
            }
            else {
                top.counter -= 1;
                *pos = top.pos;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_loop_stack() {
        let mut ch = Channel::default();
        let start = RomPointer(0x100);
        let mut pos = RomPointer(0x200);

        // a finite loop of 3 iterates twice then pops
        ch.push_pos(3, start);
        ch.pop_pos(&mut pos);
        assert_eq!(pos, start);
        pos = RomPointer(0x200);
        ch.pop_pos(&mut pos);
        assert_eq!(pos, start);
        pos = RomPointer(0x200);
        ch.pop_pos(&mut pos);
        assert_eq!(pos, RomPointer(0x200));
        assert!(ch.loop_stack.is_empty());

        // counter zero loops forever
        ch.push_pos(0, start);
        for _ in 0..10 {
            let mut p = RomPointer(0x300);
            ch.pop_pos(&mut p);
            assert_eq!(p, start);
        }
        assert_eq!(ch.loop_stack.len(), 1);
    }

    #[test]
    fn verify_host_event_timer() {
        let mut t = HostEventTimer::default();
        assert!(!t.update());

        t.set(0x42, 3);
        assert!(!t.update());
        assert!(!t.update());
        assert!(t.update());
        // reloads and runs again
        assert!(!t.update());
        assert!(!t.update());
        assert!(t.update());

        t.clear();
        assert!(!t.update());
    }
}
