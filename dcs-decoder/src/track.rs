// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `track` module implements the byte-code track interpreter.
//!
//! A track is a small program stored in ROM, one per track number. Each
//! opcode is preceded by a 16-bit wait count compared against the channel's
//! track counter; a mismatch (or the sentinel 0xFFFF, wait forever) parks
//! the program at the current position until a later main-loop pass.
//! Opcodes load streams, adjust mixing levels, loop, queue further
//! commands, and trigger deferred tracks on other channels. An unknown
//! opcode is fatal: the decoder requests a reset.

use log::warn;

use dcs_core::errors::{DcsError, Result};
use dcs_core::rom::OsVersion;
use dcs_core::MAX_CHANNELS;

use crate::catalog::RomCursor;
use crate::Decoder;

impl Decoder {
    /// Execute the active track program on `cur_channel` until it parks or
    /// terminates.
    pub(crate) fn exec_track(&mut self, cur_channel: usize) -> Result<()> {
        let Some(start) = self.channels[cur_channel].track_ptr else {
            return Ok(());
        };
        let mut p = RomCursor::new(start);

        loop {
            // Each opcode carries a wait-count prefix. Until the channel's
            // counter matches it, execution stays parked here. 0xFFFF
            // parks the program forever.
            let count_prefix = {
                let Some(roms) = &self.roms else { return Ok(()) };
                p.get_u16(roms)?
            };
            if count_prefix == 0xFFFF || self.channels[cur_channel].track_counter != count_prefix {
                p.rewind(2);
                self.channels[cur_channel].track_ptr = Some(p.ptr);
                return Ok(());
            }

            self.channels[cur_channel].track_counter = 0;

            let opcode = {
                let Some(roms) = &self.roms else { return Ok(()) };
                p.get_u8(roms)?
            };

            match opcode {
                0x00 => {
                    // end of track: clear the channel state
                    let c = &mut self.channels[cur_channel];
                    c.track_ptr = None;
                    c.audio_stream.playback = None;
                    c.loop_stack.clear();
                    c.host_event_timer.clear();
                    self.reset_mixing_levels(cur_channel);
                    return Ok(());
                }

                0x01 => {
                    // load an audio stream (possibly into another channel)
                    let (stream_channel, stream_addr, loop_counter) = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        let ch = p.get_u8(roms)? as usize;
                        let addr = p.get_u24(roms)?;
                        let lc = p.get_u8(roms)?;
                        (ch, addr, lc)
                    };
                    if stream_channel >= MAX_CHANNELS {
                        return Err(DcsError::ResetRequired);
                    }

                    // loading channel 5 clears its max-mixing-level override
                    if stream_channel == 5 {
                        self.channels[5].max_mixing_level_override = false;
                    }

                    let resolved = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        roms.resolve(dcs_core::rom::RomPointer(stream_addr))
                    };
                    match resolved {
                        Ok((data, offset)) => {
                            self.load_stream_internal(
                                stream_channel,
                                cur_channel as i32,
                                u16::from(loop_counter),
                                data,
                                offset,
                            )?;
                        }
                        Err(err) => {
                            warn!("track: bad stream pointer {:06x}: {}", stream_addr, err);
                            return Err(DcsError::ResetRequired);
                        }
                    }
                }

                0x02 => {
                    // stop playback on a channel
                    let target = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        p.get_u8(roms)? as usize
                    };
                    if target >= MAX_CHANNELS {
                        return Err(DcsError::ResetRequired);
                    }

                    if self.channels[target].audio_stream.is_playing() {
                        self.channels[target].audio_stream.playback = None;
                        self.reset_mixing_levels(target);
                    }
                    self.channels[target].track_ptr = None;
                    self.channels[target].host_event_timer.clear();

                    // stopping our own channel terminates this program
                    if self.channels[cur_channel].track_ptr.is_none() {
                        return Ok(());
                    }
                }

                0x03 => {
                    // queue a track command
                    let cmd = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        p.get_u16(roms)?
                    };
                    self.command_queue.push_back(cmd);
                }

                0x04 => {
                    if self.os_version == Some(OsVersion::Os93a) {
                        // OS93a: arm the channel's host event timer. A zero
                        // command byte disarms it; otherwise the byte is
                        // sent immediately and repeats on the interval.
                        let (cmd_byte, counter) = {
                            let Some(roms) = &self.roms else { return Ok(()) };
                            (p.get_u8(roms)?, p.get_u16(roms)?)
                        };
                        let timer = &mut self.channels[cur_channel].host_event_timer;
                        if cmd_byte == 0 {
                            timer.clear();
                        }
                        else {
                            self.host.receive_data_port(cmd_byte);
                            let timer = &mut self.channels[cur_channel].host_event_timer;
                            if counter != 0 {
                                timer.set(cmd_byte, counter);
                            }
                            else {
                                timer.clear();
                            }
                        }
                    }
                    else {
                        // all later firmware: write the byte to the host
                        let byte_val = {
                            let Some(roms) = &self.roms else { return Ok(()) };
                            p.get_u8(roms)?
                        };
                        self.host.receive_data_port(byte_val);

                        // firmware 1.05 overloads two byte values to toggle
                        // the channel-5 maximum mixing level
                        if self.firmware_version == 0x0105 {
                            if byte_val == 0x69 {
                                self.channels[5].max_mixing_level_override = true;
                            }
                            else if byte_val == 0x6A {
                                self.channels[5].max_mixing_level_override = false;
                            }
                        }
                    }
                }

                0x05 => {
                    // trigger a deferred track link on another channel
                    let target = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        p.get_u8(roms)? as usize
                    };
                    if target >= MAX_CHANNELS {
                        return Err(DcsError::ResetRequired);
                    }

                    let link_type = self.channels[target].next_track_type;
                    if link_type == 0 {
                        // nothing pending on the target channel
                    }
                    else {
                        // triggering consumes the pending link
                        self.channels[target].next_track_type = 0;
                        let link = self.channels[target].next_track_link;

                        if link_type == 2 {
                            // the link is a plain command code
                            self.command_queue.push_back(link);
                        }
                        else if link_type == 3 {
                            // the link packs (variable id << 8) | table id;
                            // the variable's value indexes the table to
                            // produce the command
                            let table_id = (link & 0x00FF) as u8;
                            let var_id = ((link >> 8) & 0x00FF) as usize;
                            let var_val = self.variables[var_id];

                            let cmd = {
                                let (Some(roms), Some(cat)) = (&self.roms, &self.catalog) else {
                                    return Ok(());
                                };
                                cat.indirect_track(roms, table_id, var_val)?
                            };
                            self.command_queue.push_back(cmd);
                        }
                    }
                }

                0x06 => {
                    // set a track program variable; a no-op on the 1993
                    // firmware, which doesn't read the operands either
                    if self.os_version != Some(OsVersion::Os93a)
                        && self.os_version != Some(OsVersion::Os93b)
                    {
                        let (idx, val) = {
                            let Some(roms) = &self.roms else { return Ok(()) };
                            (p.get_u8(roms)? as usize, p.get_u8(roms)?)
                        };
                        self.variables[idx] = val;
                    }
                }

                0x07..=0x09 => {
                    self.mixing_level_op(cur_channel, &mut p, i32::from(opcode) - 0x07, false)?;
                }

                0x0A..=0x0C => {
                    self.mixing_level_op(cur_channel, &mut p, i32::from(opcode) - 0x0A, true)?;
                }

                0x0D => {
                    // NOP
                }

                0x0E => {
                    // push a loop point; the byte operand is the iteration
                    // count, zero meaning forever
                    let loop_counter = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        p.get_u8(roms)?
                    };
                    self.channels[cur_channel].push_pos(u16::from(loop_counter), p.ptr);
                }

                0x0F => {
                    // jump back to the most recent loop point
                    let mut pos = p.ptr;
                    self.channels[cur_channel].pop_pos(&mut pos);
                    p.ptr = pos;
                }

                0x10 => {
                    // Shadow parameter set. The stored values have no
                    // observable effect, but the operands must be consumed.
                    let (ch, val) = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        (p.get_u8(roms)? as usize, p.get_u8(roms)?)
                    };
                    if ch < MAX_CHANNELS {
                        self.channels[ch].shadow_params.set(u16::from(val));
                    }
                }

                0x11 | 0x12 => {
                    // shadow parameter increase/decrease with a step ramp
                    let (ch, delta, step_counter) = {
                        let Some(roms) = &self.roms else { return Ok(()) };
                        (p.get_u8(roms)? as usize, p.get_u8(roms)? as i32, p.get_u16(roms)?)
                    };
                    if ch >= 6 {
                        continue;
                    }

                    let delta = if opcode == 0x12 { -delta } else { delta };
                    let params = &mut self.channels[ch].shadow_params;
                    let new_val = (i32::from(params.target) + delta).clamp(0, 0xFF) as u16;
                    params.target = new_val;

                    if params.current == params.target || step_counter == 0 {
                        let cur = params.current;
                        params.set(cur);
                    }
                    else {
                        params.step_counter = step_counter;
                        params.step_size = delta as f32 / f32::from(step_counter);
                    }
                }

                _ => {
                    // invalid opcode: fatal, reset the decoder
                    warn!("track: invalid opcode {:#04x} on channel {}", opcode, cur_channel);
                    return Err(DcsError::ResetRequired);
                }
            }
        }
    }

    /// Mixing level control, opcodes 0x07-0x0C. `mode` selects set (0),
    /// increase (1), or decrease (2); `fade` adds a 16-bit step count.
    fn mixing_level_op(
        &mut self,
        cur_channel: usize,
        p: &mut RomCursor,
        mode: i32,
        fade: bool,
    ) -> Result<()> {
        let (target_channel, param, steps) = {
            let Some(roms) = &self.roms else { return Ok(()) };
            let target = p.get_u8(roms)? as usize;
            // the level operand is a signed byte scaled by 64
            let param = i32::from(p.get_u8(roms)? as i8) << 6;
            let steps = if fade { i32::from(p.get_u16(roms)?) } else { 0 };
            (target, param, steps)
        };
        if target_channel >= MAX_CHANNELS {
            return Err(DcsError::ResetRequired);
        }

        // the level applies to the target channel's slot for the channel
        // whose program issued the opcode
        let mixer = &mut self.channels[target_channel].mixer[cur_channel];
        mixer.fade_steps = steps;

        // Deltas and ramps start from the CURRENT level, even mid-fade,
        // and the per-step delta divides the unclamped difference. Both
        // choices follow the firmware; changing either shifts the fade
        // trajectory.
        let old_level = mixer.cur_level;
        let new_level = match mode {
            0 => param,
            1 => old_level + param,
            _ => old_level - param,
        };

        let delta = new_level - old_level;
        let new_level = new_level.clamp(-8191, 8191);
        mixer.fade_target_level = new_level;

        if steps != 0 {
            mixer.fade_delta = delta / steps;
        }
        else {
            mixer.cur_level = new_level;
        }
        Ok(())
    }
}
