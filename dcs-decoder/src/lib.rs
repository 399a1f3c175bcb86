// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-exact decoder for the DCS pinball sound board audio format.
//!
//! The decoder replicates the ADSP-2105 firmware of the Williams/Bally/
//! Midway DCS sound boards: a command queue drives per-channel byte-code
//! track programs, which load compressed audio streams; each main-loop pass
//! decompresses one frame per active channel into a shared frequency-domain
//! buffer, transforms it to 240 PCM samples, and advances mixing fades and
//! host event timers. Given identical ROM contents, command sequence, and
//! data-port input, the PCM output matches the original DSP byte for byte.
//!
//! The host drives the decoder through [`Decoder`]: deliver data-port bytes
//! with [`Decoder::irq2`], pull samples with [`Decoder::get_next_sample`],
//! and receive bytes sent back by the firmware through the [`Host`] trait.
//! A fatal condition in the track interpreter surfaces as
//! [`DcsError::ResetRequired`]; the host recovers by calling
//! [`Decoder::soft_boot`].

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all dcs-rs crates. Please see the
// workspace Cargo.toml for their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::Arc;

use log::{debug, info, warn};

use dcs_core::errors::{decode_error, Result};
pub use dcs_core::errors::DcsError;
use dcs_core::fixed::calc_exp32;
use dcs_core::io::BitReader;
pub use dcs_core::rom::{HwVersion, OsVersion, RomPointer};
use dcs_core::rom::RomSet;
use dcs_core::{MAX_CHANNELS, SAMPLES_PER_FRAME};

pub mod catalog;
pub mod channel;
pub mod frame;
pub mod mixer;
pub mod tables;
pub mod transform;

mod dataport;
mod track;

use catalog::Catalog;
use channel::Channel;
use frame::Dialect;
use transform::FRAME_BUFFER_LEN;

/// Receiver for bytes the decoder writes toward the host.
pub trait Host {
    fn receive_data_port(&mut self, byte: u8);
}

/// A host that discards everything the decoder sends.
#[derive(Default)]
pub struct NullHost;

impl Host for NullHost {
    fn receive_data_port(&mut self, _byte: u8) {}
}

/// Title-specific firmware quirks keyed from the loaded ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameId {
    Unknown,
    /// Tales of the Arabian Nights: the data-port handler intercepts
    /// command 0x03E7 and answers 0x11 directly.
    Totan,
}

/// Source of an audio stream: a pointer into the loaded ROM set, or an
/// external byte buffer (standalone playback).
#[derive(Clone)]
pub enum StreamSource {
    Rom(RomPointer),
    Buffer(Arc<[u8]>),
}

impl From<RomPointer> for StreamSource {
    fn from(ptr: RomPointer) -> StreamSource {
        StreamSource::Rom(ptr)
    }
}

impl From<Arc<[u8]>> for StreamSource {
    fn from(data: Arc<[u8]>) -> StreamSource {
        StreamSource::Buffer(data)
    }
}

impl From<Vec<u8>> for StreamSource {
    fn from(data: Vec<u8>) -> StreamSource {
        StreamSource::Buffer(Arc::from(data))
    }
}

/// Description of a compressed stream, recovered by decoding it end to end.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Length in DCS frames (240 samples, 7.68 ms each).
    pub n_frames: u16,
    /// Length in bytes, including the frame-count prefix and header.
    pub n_bytes: usize,
    /// Major format type (0 or 1).
    pub format_type: u8,
    /// Sub-type 0-3; meaningful for OS94+ streams only.
    pub format_sub_type: u8,
    /// The stream header, zero padded to 16 bytes.
    pub header: [u8; 16],
}

/// The DCS decoder.
pub struct Decoder {
    pub(crate) host: Box<dyn Host>,
    pub(crate) os_version: Option<OsVersion>,
    pub(crate) dialect: Option<Dialect>,
    pub(crate) roms: Option<RomSet>,
    pub(crate) catalog: Option<Catalog>,
    pub(crate) game_id: GameId,
    /// Firmware revision the loaded ROM behaves as (enables the 1.05
    /// channel-5 override quirk when 0x0105).
    pub(crate) firmware_version: u16,
    /// Version reported by the 55C2/55C3 data-port queries.
    pub(crate) reported_version: u16,
    pub(crate) channels: [Channel; MAX_CHANNELS],
    /// Per-pass "channel done" bits for the track execution loop.
    pub(crate) channel_mask: u32,
    /// Track program variables, written by opcode 0x06 and read through
    /// deferred-indirect links.
    pub(crate) variables: [u8; 256],
    pub(crate) command_queue: VecDeque<u16>,
    pub(crate) frame_buffer: [u16; FRAME_BUFFER_LEN],
    pub(crate) output_buffer: [u16; SAMPLES_PER_FRAME],
    pub(crate) overlap_buffer: [u16; 16],
    pub(crate) nominal_volume: u8,
    pub(crate) volume_multiplier: u16,
    // data port byte assembler
    pub(crate) data_port_word: u16,
    pub(crate) data_port_ext: u16,
    pub(crate) n_data_port_bytes: u8,
    pub(crate) data_port_timeout: u32,
    // sample pull position within the output buffer
    autobuffer_pos: usize,
}

impl Decoder {
    /// Construct a decoder. It must be initialized with [`Decoder::load_rom`]
    /// or [`Decoder::init_standalone`] before the main loop can run.
    pub fn new(host: Box<dyn Host>) -> Decoder {
        Decoder {
            host,
            os_version: None,
            dialect: None,
            roms: None,
            catalog: None,
            game_id: GameId::Unknown,
            firmware_version: 0,
            reported_version: 0x0106,
            channels: Default::default(),
            channel_mask: 0,
            variables: [0; 256],
            command_queue: VecDeque::new(),
            frame_buffer: [0; FRAME_BUFFER_LEN],
            output_buffer: [0; SAMPLES_PER_FRAME],
            overlap_buffer: [0; 16],
            nominal_volume: 0x67,
            volume_multiplier: 0x0391,
            data_port_word: 0,
            data_port_ext: 0,
            n_data_port_bytes: 0,
            data_port_timeout: 0,
            autobuffer_pos: SAMPLES_PER_FRAME,
        }
    }

    /// Initialize without a ROM set. Track programs are unavailable, but
    /// streams can be played back directly from external buffers.
    pub fn init_standalone(&mut self, os_version: OsVersion) {
        self.os_version = Some(os_version);
        self.roms = None;
        self.catalog = None;
    }

    /// Load a ROM set from a PinMame-style ZIP archive. Chip images are
    /// recognized by the `u<n>`/`s<n>` designator in their file names. The
    /// hardware generation is probed from the U2 catalog; the firmware
    /// generation defaults to OS94/OS95 by era and can be overridden with
    /// [`Decoder::set_os_version`] before booting.
    pub fn load_rom(&mut self, zip_bytes: &[u8]) -> Result<()> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))
            .map_err(|_| DcsError::DecodeError("rom: not a zip archive"))?;

        let mut images: Vec<(usize, Vec<u8>)> = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|_| DcsError::DecodeError("rom: bad zip entry"))?;
            let Some(chip_num) = chip_number_from_name(file.name()) else {
                continue;
            };
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            images.push((chip_num, data));
        }

        let u2 = match images.iter().find(|(n, _)| *n == 2) {
            Some((_, data)) => data,
            None => return decode_error("rom: no U2 image in archive"),
        };

        let hw = catalog::probe_hw_version(u2)?;
        self.game_id = detect_game(u2);

        let mut roms = RomSet::new(hw);
        for (chip_num, data) in images {
            roms.insert_chip(chip_num, Arc::from(data))?;
        }

        // honor a caller-selected firmware generation if it matches the
        // probed hardware; otherwise fall back to the era default
        let os = match self.os_version {
            Some(os) if os.hw_version() == hw => os,
            _ => match hw {
                HwVersion::Dcs93 => OsVersion::Os94,
                HwVersion::Dcs95 => OsVersion::Os95,
            },
        };
        self.os_version = Some(os);

        info!("rom: loaded {:?} set, firmware {:?}, game {:?}", hw, os, self.game_id);

        self.catalog = Some(Catalog::parse(&roms)?);
        self.roms = Some(roms);
        Ok(())
    }

    /// Override the firmware generation. Takes effect at the next boot.
    pub fn set_os_version(&mut self, os: OsVersion) {
        self.os_version = Some(os);
    }

    /// Set the firmware revision the decoder mimics. Revision 0x0105
    /// enables the data-port 0x69/0x6A channel-5 override bytes.
    pub fn set_firmware_version(&mut self, version: u16) {
        self.firmware_version = version;
    }

    /// Set the version reported by the 55C2/55C3 data-port queries.
    pub fn set_reported_version(&mut self, version: u16) {
        self.reported_version = version;
    }

    /// The firmware generation in effect, if initialized.
    pub fn os_version(&self) -> Option<OsVersion> {
        self.os_version
    }

    /// (Re-)initialize the decoder state: select the frame dialect for the
    /// firmware generation, clear all channels, and reset the data port.
    /// This is also the recovery path after [`DcsError::ResetRequired`].
    pub fn soft_boot(&mut self) -> Result<()> {
        let os = match self.os_version {
            Some(os) => os,
            None => return decode_error("decoder: not initialized"),
        };
        self.dialect = Some(Dialect::for_os_version(os));

        self.channels = Default::default();
        self.channel_mask = 0;
        self.variables = [0; 256];
        self.command_queue.clear();
        self.frame_buffer = [0; FRAME_BUFFER_LEN];
        self.output_buffer = [0; SAMPLES_PER_FRAME];
        self.overlap_buffer = [0; 16];
        self.autobuffer_pos = SAMPLES_PER_FRAME;

        self.set_master_volume(self.nominal_volume);

        self.n_data_port_bytes = 0;
        self.data_port_word = 0;
        self.data_port_ext = 0;
        self.data_port_timeout = 0;

        debug!("decoder: soft boot ({:?})", os);
        Ok(())
    }

    /// Set the master volume, 0 (mute) to 255 (reference level).
    pub fn set_master_volume(&mut self, vol: u8) {
        self.nominal_volume = vol;
        self.volume_multiplier = mixer::master_volume_multiplier(vol);
    }

    /// Current nominal master volume.
    pub fn master_volume(&self) -> u8 {
        self.nominal_volume
    }

    /// Set a channel's volume, 0 to 255 (data-port commands 55AB..55B2).
    pub fn set_channel_volume(&mut self, channel: usize, level: u8) {
        if channel < MAX_CHANNELS {
            self.channels[channel].channel_volume = u16::from(level);
        }
    }

    /// Queue a track command, exactly as if it arrived on the data port.
    pub fn add_track_command(&mut self, track_num: u16) {
        self.command_queue.push_back(track_num);
    }

    /// Stop every channel and clear all track state.
    pub fn clear_tracks(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.track_ptr = None;
            ch.audio_stream.clear();
        }
    }

    /// Is a stream currently playing in the channel?
    pub fn is_stream_playing(&self, channel: usize) -> bool {
        self.channels[channel].audio_stream.is_playing()
    }

    /// Deliver one byte from the host to the sound data port.
    pub fn irq2(&mut self, byte: u8) {
        self.data_port_write(byte);
    }

    /// Pull the next PCM sample, advancing the decoder by one frame
    /// whenever the output buffer runs dry.
    pub fn get_next_sample(&mut self) -> Result<i16> {
        if self.autobuffer_pos >= SAMPLES_PER_FRAME {
            self.main_loop()?;
            self.autobuffer_pos = 0;
        }
        let sample = self.output_buffer[self.autobuffer_pos] as i16;
        self.autobuffer_pos += 1;
        Ok(sample)
    }

    /// Directly load an audio stream into a channel, bypassing the track
    /// program mechanism. The mixing level has the same meaning as the
    /// one-byte level in track opcodes 0x07-0x0C.
    pub fn load_audio_stream(
        &mut self,
        channel: usize,
        source: impl Into<StreamSource>,
        mixing_level: i32,
    ) -> Result<()> {
        if channel >= MAX_CHANNELS {
            return decode_error("decoder: channel number out of range");
        }

        let (data, offset) = self.resolve_stream_source(source.into())?;

        self.channels[channel].track_ptr = None;
        self.load_stream_internal(channel, channel as i32, 1, data, offset)?;

        let m = &mut self.channels[channel].mixer[channel];
        m.reset();
        m.cur_level = mixing_level << 6;
        m.fade_target_level = m.cur_level;
        Ok(())
    }

    /// Describe a stream by decoding it end to end.
    pub fn get_stream_info(&mut self, source: impl Into<StreamSource>) -> Result<StreamInfo> {
        let dialect = match self.dialect {
            Some(d) => d,
            None => return decode_error("decoder: not initialized"),
        };
        let (data, offset) = self.resolve_stream_source(source.into())?;

        let mut stream = channel::AudioStream::default();
        self.init_channel_stream(&mut stream, data, offset)?;
        init_stream_playback(&mut stream);

        let mut scratch = [0u16; FRAME_BUFFER_LEN];
        for _ in 0..stream.num_frames {
            dialect.decompress_frame(&mut stream, &mut scratch, 0)?;
        }

        let n_bytes = match &stream.playback {
            Some(p) => p.byte_pos() - offset,
            None => 0,
        };

        let format_type = (stream.header[0] & 0x80) >> 7;
        let format_sub_type = match self.os_version {
            Some(OsVersion::Os94) | Some(OsVersion::Os95) => {
                ((stream.header[1] & 0x80) >> 6) | ((stream.header[2] & 0x80) >> 7)
            }
            _ => 0,
        };

        let mut header = [0u8; 16];
        header[..stream.header_len].copy_from_slice(&stream.header[..stream.header_len]);

        Ok(StreamInfo {
            n_frames: stream.num_frames,
            n_bytes,
            format_type,
            format_sub_type,
            header,
        })
    }

    /// Advance the decoder by one frame: drain the command queue, run the
    /// track programs, decompress and transform the active streams, and
    /// update the mixing state. Produces 240 PCM samples in the output
    /// buffer.
    pub fn main_loop(&mut self) -> Result<()> {
        let dialect = match self.dialect {
            Some(d) => d,
            None => return decode_error("decoder: not initialized"),
        };

        self.frame_buffer = [0; FRAME_BUFFER_LEN];

        // honor stop flags raised by decode errors on the previous pass
        for ch in 0..MAX_CHANNELS {
            if self.channels[ch].stop {
                self.channels[ch].stop = false;
                if self.channels[ch].audio_stream.is_playing() {
                    self.channels[ch].audio_stream.playback = None;
                    self.reset_mixing_levels(ch);
                }
                self.channels[ch].host_event_timer.clear();
                self.channels[ch].track_ptr = None;
            }
        }

        // Drain pending commands. Each is an index into the track list;
        // the target's first byte selects immediate load vs deferred store.
        while let Some(cmd) = self.command_queue.pop_front() {
            let parsed = {
                let (Some(roms), Some(cat)) = (&self.roms, &self.catalog) else {
                    continue;
                };
                let Some(track_ptr) = cat.track_pointer(roms, cmd)? else {
                    continue;
                };

                let mut p = catalog::RomCursor::new(track_ptr);
                let track_type = p.get_u8(roms)?;
                let ch = p.get_u8(roms)? as usize;
                let link =
                    if track_type == 2 || track_type == 3 { p.get_u16(roms)? } else { 0 };
                (track_type, ch, p.ptr, link)
            };

            let (track_type, ch, body, link) = parsed;
            if ch >= MAX_CHANNELS {
                return Err(DcsError::ResetRequired);
            }

            if track_type == 1 {
                self.load_track(ch, body);
            }
            else if track_type <= 3 {
                self.channels[ch].next_track_type = track_type;
                self.channels[ch].next_track_link = link;
            }
            else {
                warn!("decoder: invalid track type {}", track_type);
                return Err(DcsError::ResetRequired);
            }
        }

        // Run the track programs until every channel reports done. A
        // program can create new work on a channel already visited, so the
        // loop walks round-robin against a done mask rather than making a
        // single pass.
        let all_done = (1u32 << MAX_CHANNELS) - 1;
        self.channel_mask = 0;
        let mut ch = 0usize;
        while self.channel_mask != all_done {
            if (self.channel_mask & (1 << ch)) == 0 {
                self.exec_track(ch)?;
                self.channel_mask |= 1 << ch;
            }
            ch = (ch + 1) % MAX_CHANNELS;
        }

        // Sum the effective volume of all active channels as a 5.30 value,
        // then choose the fixed-point scale (volShift) that keeps the mixed
        // samples in 1.15 range with at least 8 bits of final precision.
        let mut mixing_sum: u64 = 0;
        for c in self.channels.iter() {
            if c.max_mixing_level_override {
                mixing_sum += u64::from(c.mixing_multiplier) * 0x7FFE;
            }
            else if c.audio_stream.is_playing() {
                mixing_sum += u64::from(c.mixing_multiplier) * u64::from(self.volume_multiplier);
            }
        }
        mixing_sum >>= 2;
        let vol_shift = (-(calc_exp32(mixing_sum as u32) + 3)).clamp(0, 8);

        // rescale each channel's multiplier into the chosen working scale
        for c in self.channels.iter_mut() {
            let v = if c.max_mixing_level_override { 0x7FFE } else { self.volume_multiplier };
            let m = (u64::from(c.mixing_multiplier) * u64::from(v)) << 1;
            c.mixing_multiplier = ((m << vol_shift) >> 16) as u16;
        }

        // decompress one frame per active channel into the shared buffer
        for ch in 0..MAX_CHANNELS {
            self.decode_stream(ch, dialect);
        }

        // transform to PCM
        dialect.transform_frame(
            &mut self.frame_buffer,
            &mut self.overlap_buffer,
            &mut self.output_buffer,
            vol_shift,
        );

        self.update_mixing_levels();

        // The data-port timeout counts main-loop passes since the last
        // byte arrived; it saturates at 13 (about 100 ms).
        self.data_port_timeout = (self.data_port_timeout + 1).min(13);

        Ok(())
    }

    /// One frame's worth of decoded samples, as produced by the last
    /// [`Decoder::main_loop`] pass.
    pub fn output(&self) -> &[u16; SAMPLES_PER_FRAME] {
        &self.output_buffer
    }

    // ------------------------------------------------------------------
    // internals

    fn resolve_stream_source(&self, source: StreamSource) -> Result<(Arc<[u8]>, usize)> {
        match source {
            StreamSource::Rom(ptr) => match &self.roms {
                Some(roms) => roms.resolve(ptr),
                None => decode_error("decoder: no ROM set loaded"),
            },
            StreamSource::Buffer(data) => Ok((data, 0)),
        }
    }

    /// Select a track as the active program for a channel.
    pub(crate) fn load_track(&mut self, ch: usize, body: RomPointer) {
        let c = &mut self.channels[ch];
        c.track_ptr = Some(body);
        c.audio_stream.playback = None;
        c.track_counter = 0;
        c.host_event_timer.clear();
        c.loop_stack.clear();

        // the channel has pending work again
        self.channel_mask &= !(1 << ch);

        self.reset_mixing_levels(ch);
    }

    /// Reset channel `ch`'s mixing contribution to every channel.
    pub(crate) fn reset_mixing_levels(&mut self, ch: usize) {
        for c in self.channels.iter_mut() {
            c.mixer[ch].reset();
        }
    }

    /// Load a stream into a channel on behalf of a track program (or the
    /// direct-load API).
    pub(crate) fn load_stream_internal(
        &mut self,
        stream_channel: usize,
        source_channel: i32,
        loop_counter: u16,
        data: Arc<[u8]>,
        offset: usize,
    ) -> Result<()> {
        let mut stream = channel::AudioStream::default();
        self.init_channel_stream(&mut stream, data, offset)?;

        if stream.num_frames == 0 {
            stream.playback = None;
            self.channels[stream_channel].audio_stream = stream;
            return Ok(());
        }

        stream.loop_counter = loop_counter;
        self.channels[stream_channel].audio_stream = stream;

        // a channel claimed by a new source sheds the old source's level
        let old_source = self.channels[stream_channel].source_channel;
        if old_source >= 0 && old_source != source_channel {
            self.channels[stream_channel].mixer[old_source as usize].reset();
        }
        self.channels[stream_channel].source_channel = source_channel;
        Ok(())
    }

    /// Parse a stream preamble: frame count, header location and length,
    /// and the start of the packed bit section.
    fn init_channel_stream(
        &self,
        stream: &mut channel::AudioStream,
        data: Arc<[u8]>,
        offset: usize,
    ) -> Result<()> {
        if offset + 3 > data.len() {
            return decode_error("stream: truncated preamble");
        }
        let n_frames = (u16::from(data[offset]) << 8) | u16::from(data[offset + 1]);

        stream.num_frames = n_frames;
        stream.frame_counter = n_frames;
        stream.header_pos = offset + 2;

        // the header is 16 bytes, except OS93a Type 1 streams, which carry
        // a single header byte
        stream.header_len = if self.os_version == Some(OsVersion::Os93a)
            && (data[offset + 2] & 0x80) != 0
        {
            1
        }
        else {
            16
        };
        stream.start_pos = stream.header_pos + stream.header_len;

        if stream.start_pos > data.len() {
            return decode_error("stream: truncated header");
        }

        stream.playback = Some(BitReader::new(Arc::clone(&data), stream.start_pos));
        stream.data = Some(data);
        Ok(())
    }

    /// Decompress the next frame of a channel's stream into the frame
    /// buffer, handling loop and end-of-stream bookkeeping.
    fn decode_stream(&mut self, ch: usize, dialect: Dialect) {
        let channel = &mut self.channels[ch];
        let mixing_multiplier = channel.mixing_multiplier;

        let at_start = match &channel.audio_stream.playback {
            Some(playback) => playback.is_at(channel.audio_stream.start_pos),
            None => return,
        };

        // at the very start of the stream, (re)initialize the header copy
        // and the band-type state
        if at_start {
            init_stream_playback(&mut channel.audio_stream);
        }

        let status = dialect.decompress_frame(
            &mut channel.audio_stream,
            &mut self.frame_buffer,
            mixing_multiplier,
        );
        match status {
            Ok(status) => {
                if status.stop {
                    channel.stop = true;
                }
            }
            Err(err) => {
                // corrupt stream data: stop the channel; the next pass
                // tears it down
                warn!("channel {}: frame decode failed: {}", ch, err);
                channel.stop = true;
                return;
            }
        }

        channel.audio_stream.frame_counter = channel.audio_stream.frame_counter.wrapping_sub(1);
        if channel.audio_stream.frame_counter != 0 {
            return;
        }

        // end of stream: rewind for a possible loop
        channel.audio_stream.frame_counter = channel.audio_stream.num_frames;
        if let Some(data) = channel.audio_stream.data.clone() {
            let start = channel.audio_stream.start_pos;
            channel.audio_stream.playback = Some(BitReader::new(data, start));
        }

        // loop counter zero means repeat forever
        if channel.audio_stream.loop_counter == 0 {
            return;
        }
        channel.audio_stream.loop_counter -= 1;
        if channel.audio_stream.loop_counter != 0 {
            return;
        }

        // playback is finished
        channel.audio_stream.playback = None;
        channel.source_channel = -1;
    }

    /// Advance fades and aggregate multipliers, bump the track counters,
    /// and fire host event timers.
    fn update_mixing_levels(&mut self) {
        mixer::advance_fades(&mut self.channels);

        let os = self.os_version.unwrap_or(OsVersion::Os95);
        mixer::update_mixing_multipliers(&mut self.channels, os);

        for ch in self.channels.iter_mut() {
            ch.track_counter = ch.track_counter.wrapping_add(1);
            if ch.host_event_timer.update() {
                self.host.receive_data_port(ch.host_event_timer.data);
            }
        }
    }
}

/// Copy the stream header out of the backing bytes and reset the per-band
/// differential state. Runs whenever playback is at the very start of the
/// stream data.
fn init_stream_playback(stream: &mut channel::AudioStream) {
    if let Some(data) = &stream.data {
        let mut header = [0u8; 16];
        for (i, h) in header.iter_mut().take(stream.header_len).enumerate() {
            *h = data[stream.header_pos + i];
        }
        stream.header = header;
    }
    stream.band_type_buf = [0; 16];
}

/// Extract the chip number from a ROM file name: the digit following the
/// last `u` or `s` designator, e.g. `mm_s2.rom` or `totan_u7.rom`.
fn chip_number_from_name(name: &str) -> Option<usize> {
    let lower = name.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    for i in (0..bytes.len().saturating_sub(1)).rev() {
        if (bytes[i] == b'u' || bytes[i] == b's') && bytes[i + 1].is_ascii_digit() {
            let n = (bytes[i + 1] - b'0') as usize;
            if n >= 2 && n <= 9 {
                return Some(n);
            }
        }
    }
    None
}

/// Identify title-specific quirks from the U2 signature text.
fn detect_game(u2: &[u8]) -> GameId {
    let sig_end = u2.len().min(80);
    let sig = &u2[4..sig_end];
    let text: String =
        sig.iter().take_while(|&&b| b != 0).map(|&b| b.to_ascii_uppercase() as char).collect();
    if text.contains("ARABIAN") {
        GameId::Totan
    }
    else {
        GameId::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_chip_number_from_name() {
        assert_eq!(chip_number_from_name("mm_s2.rom"), Some(2));
        assert_eq!(chip_number_from_name("TOTAN_U7.ROM"), Some(7));
        assert_eq!(chip_number_from_name("su9.bin"), Some(9));
        assert_eq!(chip_number_from_name("sound1.bin"), None);
        assert_eq!(chip_number_from_name("readme.txt"), None);
    }

    #[test]
    fn verify_uninitialized_decoder_errors() {
        let mut dec = Decoder::new(Box::new(NullHost));
        assert!(dec.main_loop().is_err());
        assert!(dec.soft_boot().is_err());
    }

    #[test]
    fn verify_standalone_boot_produces_silence() {
        let mut dec = Decoder::new(Box::new(NullHost));
        dec.init_standalone(OsVersion::Os94);
        dec.soft_boot().unwrap();
        for _ in 0..480 {
            assert_eq!(dec.get_next_sample().unwrap(), 0);
        }
    }
}
