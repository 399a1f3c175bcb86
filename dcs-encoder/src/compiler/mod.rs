// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `compiler` module builds the in-memory representation of a ROM set:
//! tracks, streams, deferred-indirect tables, and variables.
//!
//! Compilation is two-pass. The parsing pass collects definitions and
//! records stream references by name (tracks may reference streams defined
//! later, and scripts may replace material imported from the prototype
//! ROM). The link pass resolves names to stream records and bounds-checks
//! deferred-indirect references; diagnostics accumulate across both passes
//! so cascading problems surface in one run. Emission is skipped whenever
//! an error was logged.

pub mod script;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use log::info;

use dcs_core::errors::{decode_error, DcsError, Result};
use dcs_core::rom::{HwVersion, OsVersion, RomPointer, RomSet};
use dcs_decoder::catalog::{Catalog, RomCursor};

use crate::{CompressionParams, DcsAudio};

/// A stream is referenced through its arena index; names resolve to
/// indices in the link pass.
pub type StreamId = usize;

/// Source position for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One compile-time diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Option<SourceLoc>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.loc {
            Some(loc) => write!(f, "{}: {}: {}", loc, kind, self.message),
            None => write!(f, "{}: {}", kind, self.message),
        }
    }
}

/// How a program step's wait count is specified. Stream-relative waits
/// resolve after the link pass, when stream lengths are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSpec {
    Count(u16),
    Forever,
    /// Wait for the program's most recently played stream, shortened by
    /// the given number of frames.
    Stream { minus: u16 },
}

/// One step of a track program: a wait prefix, an opcode, and its operand
/// bytes. Stream-pointer operands carry a symbolic reference until the
/// link pass fills in the ROM address.
#[derive(Debug, Clone)]
pub struct ProgramStep {
    pub wait: WaitSpec,
    pub opcode: u8,
    pub operands: Vec<u8>,
    /// Resolved stream reference for opcode 0x01.
    pub stream: Option<StreamId>,
    /// Unresolved stream name for opcode 0x01.
    pub stream_name: Option<String>,
    /// Source position, for link-pass diagnostics.
    pub loc: SourceLoc,
}

/// One track definition.
#[derive(Debug, Clone)]
pub struct Track {
    /// True for tracks imported from the prototype ROM, which scripts may
    /// redefine without complaint.
    pub from_proto: bool,
    pub track_no: u16,
    pub channel: u8,
    /// 1 = byte-code program, 2 = deferred command, 3 = deferred indirect.
    pub track_type: u8,
    /// Deferred link operand for types 2 and 3.
    pub deferred_track: u16,
    pub steps: Vec<ProgramStep>,
    /// Compiled byte code (type 1 tracks only).
    pub byte_code: Vec<u8>,
}

impl Track {
    /// Compile the program steps to byte code. Stream addresses come from
    /// the stream arena; before the ROM layout assigns them this still
    /// produces correctly sized output, which is what the first layout
    /// pass needs.
    pub fn compile(&mut self, streams: &[StreamRecord]) {
        self.byte_code.clear();
        self.byte_code.reserve(self.steps.len() * 8);

        for step in &self.steps {
            let wait = match step.wait {
                WaitSpec::Count(n) => n,
                WaitSpec::Forever => 0xFFFF,
                WaitSpec::Stream { minus } => {
                    let frames = step
                        .stream
                        .and_then(|id| streams.get(id))
                        .map_or(0, |s| s.n_frames);
                    frames.saturating_sub(minus)
                }
            };
            self.byte_code.extend_from_slice(&wait.to_be_bytes());
            self.byte_code.push(step.opcode);

            let mut operands = step.operands.clone();
            if step.opcode == 0x01 {
                if let Some(s) = step.stream.and_then(|id| streams.get(id)) {
                    let addr = s.rom_addr;
                    operands[1] = (addr >> 16) as u8;
                    operands[2] = (addr >> 8) as u8;
                    operands[3] = addr as u8;
                }
            }
            self.byte_code.extend_from_slice(&operands);
        }
    }
}

/// One audio stream in the arena: imported from the prototype ROM or
/// encoded from script material.
pub struct StreamRecord {
    /// Scripting name (synthesized for imports and anonymous streams).
    pub name: String,
    /// Linear address in the prototype ROM, for imported streams.
    pub proto_addr: Option<u32>,
    /// Encoded stream bytes.
    pub data: Vec<u8>,
    pub n_frames: u16,
    /// Set during track compilation; unreferenced streams are dropped
    /// from the built ROM.
    pub referenced: bool,
    /// Linear address in the generated ROM, assigned during layout.
    pub rom_addr: u32,
}

/// A deferred-indirect table: track numbers selected at run time by a
/// variable's value.
#[derive(Debug, Clone)]
pub struct DiTable {
    pub name: String,
    pub index: u8,
    pub from_proto: bool,
    pub track_numbers: Vec<u16>,
}

/// An opcode 0x06 variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub id: u8,
    /// Highest value assigned anywhere in the script.
    pub max_val: i32,
}

/// Supplies encoded stream data for `stream` statements. The compiler
/// itself performs no file IO; the host resolves file names to encoded
/// audio (typically by loading a WAV or raw DCS file and running the
/// encoder).
pub trait StreamResolver {
    fn encode_file(&mut self, file: &str, params: &CompressionParams) -> Result<DcsAudio>;
}

/// The ROM compiler.
pub struct Compiler {
    pub hw_version: HwVersion,
    pub os_version: OsVersion,
    /// Prototype chip images by chip number (2-9).
    pub proto_images: Vec<(usize, Vec<u8>)>,
    /// Prototype chip file names by chip number.
    pub proto_names: Vec<(usize, String)>,
    /// Non-ROM files from the prototype archive, passed through to the
    /// output archive.
    pub proto_extra_files: Vec<(String, Vec<u8>)>,
    /// Replacement U2 signature text, if the script set one.
    pub signature: Option<String>,
    pub default_params: CompressionParams,
    pub tracks: BTreeMap<u16, Track>,
    pub streams: Vec<StreamRecord>,
    streams_by_name: HashMap<String, StreamId>,
    streams_by_proto_addr: HashMap<u32, StreamId>,
    pub di_tables: BTreeMap<u8, DiTable>,
    pub variables: BTreeMap<u8, Variable>,
    vars_by_name: HashMap<String, u8>,
    pub diagnostics: Vec<Diagnostic>,
    pub max_track_number: u16,
    anon_stream_id: u32,
}

impl Compiler {
    /// Load a prototype ROM set from a ZIP archive. The prototype supplies
    /// the DSP control program, fixes the target dialect, and (in patch
    /// mode) seeds the track, stream, and table arenas with the ROM's own
    /// material.
    pub fn load_prototype(zip_bytes: &[u8], patch_mode: bool) -> Result<Compiler> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes))
            .map_err(|_| DcsError::DecodeError("prototype: not a zip archive"))?;

        let mut proto_images = Vec::new();
        let mut proto_names = Vec::new();
        let mut proto_extra_files = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|_| DcsError::DecodeError("prototype: bad zip entry"))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            match chip_number(file.name()) {
                Some(n) => {
                    proto_names.push((n, file.name().to_string()));
                    proto_images.push((n, data));
                }
                None => proto_extra_files.push((file.name().to_string(), data)),
            }
        }

        let u2 = match proto_images.iter().find(|(n, _)| *n == 2) {
            Some((_, data)) => data,
            None => return decode_error("prototype: no U2 image in archive"),
        };
        let hw_version = dcs_decoder::catalog::probe_hw_version(u2)?;

        // The generated streams must use the dialect of the prototype's
        // control program; there is no cross-dialect playback.
        let os_version = match hw_version {
            HwVersion::Dcs93 => OsVersion::Os94,
            HwVersion::Dcs95 => OsVersion::Os95,
        };
        let format_version = match os_version {
            OsVersion::Os93a => 0x9301,
            OsVersion::Os93b => 0x9302,
            OsVersion::Os94 | OsVersion::Os95 => 0x9400,
        };

        let mut compiler = Compiler {
            hw_version,
            os_version,
            proto_images,
            proto_names,
            proto_extra_files,
            signature: None,
            default_params: CompressionParams { format_version, ..Default::default() },
            tracks: BTreeMap::new(),
            streams: Vec::new(),
            streams_by_name: HashMap::new(),
            streams_by_proto_addr: HashMap::new(),
            di_tables: BTreeMap::new(),
            variables: BTreeMap::new(),
            vars_by_name: HashMap::new(),
            diagnostics: Vec::new(),
            max_track_number: 0,
            anon_stream_id: 0,
        };

        if patch_mode {
            compiler.import_prototype_contents()?;
        }

        info!(
            "prototype: {:?} hardware, {} chips, {} tracks imported",
            hw_version,
            compiler.proto_images.len(),
            compiler.tracks.len()
        );
        Ok(compiler)
    }

    /// The firmware generation targeted by this compilation.
    pub fn set_os_version(&mut self, os: OsVersion) {
        self.os_version = os;
        self.default_params.format_version = match os {
            OsVersion::Os93a => 0x9301,
            OsVersion::Os93b => 0x9302,
            OsVersion::Os94 | OsVersion::Os95 => 0x9400,
        };
    }

    pub fn warn(&mut self, loc: Option<SourceLoc>, message: String) {
        self.diagnostics.push(Diagnostic { severity: Severity::Warning, loc, message });
    }

    pub fn error(&mut self, loc: Option<SourceLoc>, message: String) {
        self.diagnostics.push(Diagnostic { severity: Severity::Error, loc, message });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Look up a stream by name, case-insensitively.
    pub fn find_stream(&self, name: &str) -> Option<StreamId> {
        self.streams_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Add a stream to the arena under a scripting name, replacing any
    /// stream previously imported at `replaces_proto_addr`.
    pub fn add_stream(
        &mut self,
        name: Option<&str>,
        replaces_proto_addr: Option<u32>,
        audio: DcsAudio,
    ) -> StreamId {
        let id = match replaces_proto_addr.and_then(|a| self.streams_by_proto_addr.get(&a).copied())
        {
            Some(existing) => {
                // overwrite the imported stream in place; it is no longer
                // a prototype stream
                let rec = &mut self.streams[existing];
                rec.proto_addr = None;
                rec.n_frames = audio.n_frames;
                rec.data = audio.data;
                existing
            }
            None => {
                let name = match name {
                    Some(n) => n.to_string(),
                    None => {
                        self.anon_stream_id += 1;
                        format!("$stream{:04}", self.anon_stream_id)
                    }
                };
                self.streams.push(StreamRecord {
                    name,
                    proto_addr: None,
                    n_frames: audio.n_frames,
                    data: audio.data,
                    referenced: false,
                    rom_addr: 0,
                });
                self.streams.len() - 1
            }
        };

        if let Some(n) = name {
            self.streams_by_name.insert(n.to_ascii_uppercase(), id);
        }
        id
    }

    /// Define a named variable at a fixed index.
    pub fn define_variable(&mut self, name: &str, id: u8, loc: SourceLoc) {
        // Indices at 0x50 and above fall outside the memory the original
        // firmware reserves; they decode here, but not on the hardware.
        if id >= 0x50 {
            self.warn(
                Some(loc),
                format!(
                    "variable '{}' uses index {:#04x}, which is unsafe on original hardware",
                    name, id
                ),
            );
        }
        self.vars_by_name.insert(name.to_ascii_uppercase(), id);
        self.variables
            .entry(id)
            .or_insert_with(|| Variable { name: name.to_string(), id, max_val: -1 });
    }

    pub fn find_variable(&self, name: &str) -> Option<u8> {
        self.vars_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn find_di_table(&self, name: &str) -> Option<u8> {
        self.di_tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.index)
    }

    /// Define a track, checking for redefinition. Tracks imported from the
    /// prototype ROM may be redefined freely.
    pub fn define_track(&mut self, track: Track, loc: SourceLoc) {
        if let Some(old) = self.tracks.get(&track.track_no) {
            if !old.from_proto {
                self.error(
                    Some(loc),
                    format!("track {:#06x} is already defined by this script", track.track_no),
                );
                return;
            }
        }
        self.max_track_number = self.max_track_number.max(track.track_no);
        self.tracks.insert(track.track_no, track);
    }

    /// The link pass: resolve stream names, propagate stream lengths into
    /// stream-relative waits, and bounds-check deferred-indirect
    /// references.
    pub fn link(&mut self) {
        // resolve stream name references
        let mut resolutions: Vec<(u16, usize, StreamId)> = Vec::new();
        for (&track_no, track) in self.tracks.iter() {
            for (step_no, step) in track.steps.iter().enumerate() {
                if step.stream.is_some() {
                    continue;
                }
                if let Some(name) = &step.stream_name {
                    match self.streams_by_name.get(&name.to_ascii_uppercase()) {
                        Some(&id) => resolutions.push((track_no, step_no, id)),
                        None => {
                            let msg = format!("stream '{}' is not defined", name);
                            let loc = step.loc;
                            self.diagnostics.push(Diagnostic {
                                severity: Severity::Error,
                                loc: Some(loc),
                                message: msg,
                            });
                        }
                    }
                }
            }
        }
        for (track_no, step_no, id) in resolutions {
            if let Some(track) = self.tracks.get_mut(&track_no) {
                track.steps[step_no].stream = Some(id);
            }
        }

        // attach each stream-relative wait to the program's most recent
        // Play, so the wait count can take that stream's length
        for track in self.tracks.values_mut() {
            let mut last_play: Option<StreamId> = None;
            for step in track.steps.iter_mut() {
                if step.opcode == 0x01 && step.stream.is_some() {
                    last_play = step.stream;
                }
                if matches!(step.wait, WaitSpec::Stream { .. }) && step.stream.is_none() {
                    step.stream = last_play;
                }
            }
        }

        // Bounds-check every SetVariable value against the tables the
        // variable indexes through type 3 tracks.
        let mut checks: Vec<(SourceLoc, String)> = Vec::new();
        for track in self.tracks.values() {
            if track.track_type != 1 {
                continue;
            }
            for step in &track.steps {
                if step.opcode != 0x06 || self.os_version.is_os93() {
                    continue;
                }
                let var_num = step.operands[0];
                let var_val = step.operands[1];
                for target in self.tracks.values() {
                    if target.track_type != 3 {
                        continue;
                    }
                    let table_num = (target.deferred_track & 0xFF) as u8;
                    let step_var = ((target.deferred_track >> 8) & 0xFF) as u8;
                    if step_var != var_num {
                        continue;
                    }
                    let max_index = self
                        .di_tables
                        .get(&table_num)
                        .map_or(-1, |t| t.track_numbers.len() as i32);
                    if i32::from(var_val) >= max_index {
                        checks.push((
                            step.loc,
                            format!(
                                "track {:#06x} indexes deferred indirect table {} entry [{}] \
                                 through variable {}; the table holds {} entries",
                                target.track_no,
                                table_num,
                                var_val,
                                var_num,
                                max_index.max(0)
                            ),
                        ));
                    }
                }
            }
        }
        for (loc, msg) in checks {
            self.error(Some(loc), msg);
        }

        // stream-relative waits need a resolved stream reference
        for track in self.tracks.values() {
            for step in &track.steps {
                if matches!(step.wait, WaitSpec::Stream { .. }) && step.stream.is_none() {
                    self.diagnostics.push(Diagnostic {
                        severity: Severity::Error,
                        loc: Some(step.loc),
                        message: "Wait(stream) requires a Play step with a resolved stream"
                            .to_string(),
                    });
                }
            }
        }
    }

    /// Import every track, stream, and deferred-indirect table from the
    /// prototype ROM, as the starting state for a patch build.
    fn import_prototype_contents(&mut self) -> Result<()> {
        let mut roms = RomSet::new(self.hw_version);
        for (n, data) in &self.proto_images {
            roms.insert_chip(*n, Arc::from(data.as_slice()))?;
        }
        let catalog = Catalog::parse(&roms)?;

        // a standalone decoder extracts stream metadata
        let mut decoder = dcs_decoder::Decoder::new(Box::new(dcs_decoder::NullHost));
        decoder.init_standalone(self.os_version);
        decoder.soft_boot()?;

        for track_no in 0..catalog.n_tracks {
            let Some(ptr) = catalog.track_pointer(&roms, track_no)? else {
                continue;
            };

            let mut p = RomCursor::new(ptr);
            let track_type = p.get_u8(&roms)?;
            let channel = p.get_u8(&roms)?;

            let mut track = Track {
                from_proto: true,
                track_no,
                channel,
                track_type,
                deferred_track: 0,
                steps: Vec::new(),
                byte_code: Vec::new(),
            };

            if track_type == 1 {
                track.steps = self.decompile_track(&roms, &mut p, &mut decoder)?;
            }
            else if track_type == 2 || track_type == 3 {
                track.deferred_track = p.get_u16(&roms)?;
            }
            else {
                return decode_error("prototype: invalid track type");
            }

            self.max_track_number = self.max_track_number.max(track_no);
            self.tracks.insert(track_no, track);
        }

        // import the deferred-indirect tables referenced by type 3 tracks
        let mut table_ids: Vec<u8> = self
            .tracks
            .values()
            .filter(|t| t.track_type == 3)
            .map(|t| (t.deferred_track & 0xFF) as u8)
            .collect();
        table_ids.sort_unstable();
        table_ids.dedup();
        for id in table_ids {
            let table_ptr =
                RomPointer(roms.read_u24(catalog.indirect_index.offset_by(u32::from(id) * 3))?);
            if table_ptr.is_null() {
                continue;
            }
            // Tables have no length marker in ROM; entries run to the next
            // table's start. Import a conservative fixed span.
            let mut tracks = Vec::new();
            for i in 0..16u32 {
                match roms.read_u16(table_ptr.offset_by(i * 2)) {
                    Ok(tn) if tn < catalog.n_tracks => tracks.push(tn),
                    _ => break,
                }
            }
            self.di_tables.insert(
                id,
                DiTable { name: format!("${:02x}", id), index: id, from_proto: true,
                    track_numbers: tracks },
            );
        }

        Ok(())
    }

    /// Walk a track byte-code program in the prototype ROM back into
    /// program steps, importing the streams it plays.
    fn decompile_track(
        &mut self,
        roms: &RomSet,
        p: &mut RomCursor,
        decoder: &mut dcs_decoder::Decoder,
    ) -> Result<Vec<ProgramStep>> {
        let mut steps = Vec::new();

        // a generous cap; real programs run tens of bytes
        for _ in 0..1024 {
            let wait = p.get_u16(roms)?;
            let opcode = p.get_u8(roms)?;

            let n_operands = match opcode {
                0x00 | 0x0D | 0x0F => 0,
                0x01 => 5,
                0x02 | 0x05 | 0x0E => 1,
                0x03 => 2,
                0x04 => {
                    if self.os_version == OsVersion::Os93a {
                        3
                    }
                    else {
                        1
                    }
                }
                0x06 => {
                    if self.os_version.is_os93() {
                        0
                    }
                    else {
                        2
                    }
                }
                0x07..=0x09 => 2,
                0x0A..=0x0C => 4,
                0x10 => 2,
                0x11 | 0x12 => 4,
                _ => return decode_error("prototype: invalid opcode in track program"),
            };

            let mut operands = Vec::with_capacity(n_operands);
            for _ in 0..n_operands {
                operands.push(p.get_u8(roms)?);
            }

            let mut step = ProgramStep {
                wait: if wait == 0xFFFF { WaitSpec::Forever } else { WaitSpec::Count(wait) },
                opcode,
                operands,
                stream: None,
                stream_name: None,
                loc: SourceLoc::default(),
            };

            // import the stream played by opcode 0x01
            if opcode == 0x01 {
                let addr = (u32::from(step.operands[1]) << 16)
                    | (u32::from(step.operands[2]) << 8)
                    | u32::from(step.operands[3]);

                let id = match self.streams_by_proto_addr.get(&addr) {
                    Some(&id) => id,
                    None => {
                        // Hand the stream bytes to a standalone decoder to
                        // size it; the decoder walks every frame, so the
                        // byte length comes out exact.
                        let (chip, ofs) = roms.resolve(RomPointer(addr))?;
                        let tail: Arc<[u8]> = Arc::from(&chip[ofs..]);
                        let info = decoder.get_stream_info(Arc::clone(&tail))?;
                        let data = tail[..info.n_bytes.min(tail.len())].to_vec();

                        let id = self.streams.len();
                        self.streams.push(StreamRecord {
                            name: format!("${:06X}", addr),
                            proto_addr: Some(addr),
                            n_frames: info.n_frames,
                            data,
                            referenced: false,
                            rom_addr: 0,
                        });
                        self.streams_by_name.insert(format!("${:06X}", addr), id);
                        self.streams_by_proto_addr.insert(addr, id);
                        id
                    }
                };
                step.stream = Some(id);
            }

            let is_end = opcode == 0x00;
            let is_parked = step.wait == WaitSpec::Forever;
            steps.push(step);
            if is_end || is_parked {
                return Ok(steps);
            }
        }

        decode_error("prototype: track program exceeds the decompiler limit")
    }
}

/// Extract the chip number from a ROM file name (e.g. `mm_s2.rom`).
fn chip_number(name: &str) -> Option<usize> {
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
