// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rom_builder` module lays compiled material out into ROM chip
//! images and packages them as a PinMame-style ZIP archive.
//!
//! U2 starts with a copy of the prototype's DSP program, then the catalog:
//! the 8-entry ROM table, the checksum balancer pair, pointers to the track
//! index and deferred-indirect index, and the track count. Track programs
//! compile twice: once to size their reservations, again after stream
//! placement resolves the play addresses. Streams pack into the chips by
//! best-fit-decreasing, each entirely within one chip, aligned so the
//! packed-bit section always begins on an even offset. The two balancer
//! bytes close U2's even- and odd-offset byte sums to zero mod 256.

use std::io::Write;

use log::info;

use dcs_core::errors::{build_error, Result};
use dcs_core::rom::{checksum, HwVersion, OsVersion, RomPointer};

use crate::compiler::Compiler;

/// Per-chip size policy for the generated images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomSize {
    /// All chips at a fixed size (512K or 1M on real boards).
    Bytes(u32),
    /// Each chip at the size of the corresponding prototype chip.
    SameAsPrototype,
}

/// Naming policy for the image files inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomPrefix {
    /// `<prefix><designator><n>.rom`.
    Literal(String),
    /// Reuse the prototype's file names chip for chip.
    SameAsPrototype,
}

pub struct RomBuildOptions {
    pub rom_size: RomSize,
    pub rom_prefix: RomPrefix,
    /// Short date text stamped into each chip's signature area.
    pub date: String,
}

impl Default for RomBuildOptions {
    fn default() -> Self {
        RomBuildOptions {
            rom_size: RomSize::SameAsPrototype,
            rom_prefix: RomPrefix::SameAsPrototype,
            date: String::new(),
        }
    }
}

/// Description of one generated chip image.
#[derive(Debug, Clone)]
pub struct RomDesc {
    pub chip_num: usize,
    pub filename: String,
    pub size: u32,
    pub bytes_free: u32,
}

/// The product of a build: the output archive and its chip inventory.
pub struct RomBuildOutput {
    pub zip_bytes: Vec<u8>,
    pub roms: Vec<RomDesc>,
}

struct RomImage {
    chip_num: usize,
    data: Vec<u8>,
    /// Next free byte.
    p: usize,
    filename: String,
}

impl RomImage {
    fn new(chip_num: usize, size: usize, hw: HwVersion, date: &str) -> RomImage {
        // 0xFF fill matches the original ROMs' convention for unused space,
        // which the firmware also leans on for end markers
        let mut data = vec![0xFFu8; size];

        // each chip leads with a readable signature
        let sig = format!(
            "{}{} {}",
            hw.chip_designator().to_ascii_uppercase(),
            chip_num,
            date
        );
        let sig_bytes = sig.as_bytes();
        let n = sig_bytes.len().min(size - 1);
        data[..n].copy_from_slice(&sig_bytes[..n]);
        data[n] = 0;

        RomImage { chip_num, data, p: n + 1, filename: String::new() }
    }

    fn bytes_free(&self) -> u32 {
        (self.data.len() - self.p) as u32
    }

    fn even_align(&mut self) {
        if self.p & 1 != 0 {
            self.p += 1;
        }
    }

    fn put_u16(&mut self, ofs: usize, val: u16) {
        self.data[ofs] = (val >> 8) as u8;
        self.data[ofs + 1] = val as u8;
    }

    fn put_u24(&mut self, ofs: usize, val: u32) {
        self.data[ofs] = (val >> 16) as u8;
        self.data[ofs + 1] = (val >> 8) as u8;
        self.data[ofs + 2] = val as u8;
    }
}

/// Build the ROM set. Track byte code must already be linked; the
/// compiler's diagnostics gate the call.
pub fn build(compiler: &mut Compiler, options: &RomBuildOptions) -> Result<RomBuildOutput> {
    if compiler.has_errors() {
        return build_error("the compilation reported errors; no ROM was built".to_string());
    }

    let hw = compiler.hw_version;

    // per-chip size selection; sizes are snapshotted so the closure does
    // not pin the compiler borrow
    let proto_sizes: Vec<(usize, usize)> =
        compiler.proto_images.iter().map(|(n, d)| (*n, d.len())).collect();
    let rom_size = options.rom_size;
    let new_rom_size = move |chip_num: usize| -> usize {
        match rom_size {
            RomSize::Bytes(n) => n as usize,
            RomSize::SameAsPrototype => proto_sizes
                .iter()
                .find(|(n, _)| *n == chip_num)
                .map(|(_, len)| *len)
                // past the prototype set, use the 1M maximum
                .unwrap_or(1024 * 1024),
        }
    };

    let max_rom_size = (2..=9).map(|chip_num| new_rom_size(chip_num)).max().unwrap_or(512 * 1024);

    // a stream must fit in one chip, less the signature overhead
    let max_contiguous_object = max_rom_size - 16;

    let mut images: Vec<RomImage> = Vec::new();
    let add_chip = |images: &mut Vec<RomImage>, chip_num: usize, date: &str| -> Result<usize> {
        if images.len() == 8 {
            return build_error(
                "out of space in the ROM layout: the DCS sound boards are limited to 8 \
                 ROM chips (U2-U9), and this build needs more at the current chip size"
                    .to_string(),
            );
        }
        images.push(RomImage::new(chip_num, new_rom_size(chip_num), hw, date));
        Ok(images.len() - 1)
    };

    // ------------------------------------------------------------------
    // U2: prototype program copy, signature, catalog

    let cat = hw.catalog_offset();
    add_chip(&mut images, 2, &options.date)?;
    {
        let u2 = &mut images[0];
        if let Some((_, proto_u2)) = compiler.proto_images.iter().find(|(n, _)| *n == 2) {
            let n = cat.min(proto_u2.len()).min(u2.data.len());
            u2.data[..n].copy_from_slice(&proto_u2[..n]);
        }

        // replace the signature text if the script supplied one
        if let Some(sig) = &compiler.signature {
            for i in 4..80 {
                if u2.data[i] == 0 {
                    break;
                }
                u2.data[i] = 0;
            }
            let bytes = sig.as_bytes();
            let n = bytes.len().min(75);
            u2.data[4..4 + n].copy_from_slice(&bytes[..n]);
            u2.data[4 + n] = 0;
        }
    }

    let n_tracks = usize::from(compiler.max_track_number) + 1;
    let track_index_ofs = cat + 0x48;
    let deferred_index_ofs = track_index_ofs + n_tracks * 3;

    // The balancer pair sits in the unused space between the ROM table's
    // terminator and the index pointers, at an even offset so one byte
    // lands in each checksum stream. Zero placeholders keep them out of
    // the tentative sum.
    let balancer_ofs = (cat + 0x32 + 1) & !1;
    images[0].put_u16(balancer_ofs, 0);

    images[0].put_u24(cat + 0x40, track_index_ofs as u32);
    images[0].put_u24(cat + 0x43, deferred_index_ofs as u32);
    images[0].put_u16(cat + 0x46, n_tracks as u16);

    // reserve the track index, then the deferred-indirect index
    let max_di_index = compiler.di_tables.keys().next_back().map_or(-1, |&k| i32::from(k));
    let di_index_len = ((max_di_index + 1) as usize) * 3;
    let mut free = deferred_index_ofs + di_index_len;

    // emit the deferred-indirect tables inline after their index
    for idx in 0..=max_di_index {
        let slot = deferred_index_ofs + (idx as usize) * 3;
        match compiler.di_tables.get(&(idx as u8)) {
            Some(table) => {
                let addr = RomPointer::from_parts(0, free, hw).0;
                images[0].put_u24(slot, addr);
                for &tn in &table.track_numbers {
                    images[0].put_u16(free, tn);
                    free += 2;
                }
            }
            None => images[0].put_u24(slot, 0xFF_FFFF),
        }
    }

    // ------------------------------------------------------------------
    // track programs, first pass: size the reservations

    // mark the streams reachable from track programs; nothing else makes
    // it into the ROM
    let referenced: Vec<usize> = compiler
        .tracks
        .values()
        .flat_map(|t| t.steps.iter().filter_map(|s| s.stream))
        .collect();
    for id in referenced {
        if let Some(s) = compiler.streams.get_mut(id) {
            s.referenced = true;
        }
    }

    let streams_snapshot = std::mem::take(&mut compiler.streams);
    let mut track_body_ofs: Vec<(u16, usize)> = Vec::new();

    for track_num in 0..n_tracks as u16 {
        let index_slot = track_index_ofs + usize::from(track_num) * 3;
        let Some(track) = compiler.tracks.get_mut(&track_num) else {
            images[0].put_u24(index_slot, 0xFF_FFFF);
            continue;
        };

        track.compile(&streams_snapshot);
        let body_len = if track.track_type == 1 { track.byte_code.len() } else { 2 };

        if free + 2 + body_len > images[0].data.len() {
            return build_error(
                "the track programs overflow U2; reduce the track count or sizes".to_string(),
            );
        }

        images[0].put_u24(index_slot, RomPointer::from_parts(0, free, hw).0);
        images[0].data[free] = track.track_type;
        images[0].data[free + 1] = track.channel;

        if track.track_type == 1 {
            track_body_ofs.push((track_num, free + 2));
            free += 2 + body_len;
        }
        else {
            images[0].put_u16(free + 2, track.deferred_track);
            free += 4;
        }
    }

    images[0].p = images[0].p.max(free);

    // ------------------------------------------------------------------
    // stream placement: best-fit decreasing

    let mut streams = streams_snapshot;

    // refuse any stream that cannot fit in one chip
    let oversized: Vec<String> = streams
        .iter()
        .filter(|s| s.referenced && s.data.len() > max_contiguous_object)
        .map(|s| format!("{} ({} bytes)", s.name, s.data.len()))
        .collect();
    if !oversized.is_empty() {
        return build_error(format!(
            "one or more audio streams are too large to fit within a single ROM chip \
             ({} bytes maximum): {}",
            max_contiguous_object,
            oversized.join(", ")
        ));
    }

    let mut order: Vec<usize> = (0..streams.len()).collect();
    order.sort_by(|&a, &b| streams[b].data.len().cmp(&streams[a].data.len()));

    for img in images.iter_mut() {
        img.even_align();
    }

    for id in order {
        if !streams[id].referenced {
            continue;
        }
        // The packed-bit section must start on an even offset. Every
        // dialect carries an even-length preamble except OS93a Type 1
        // (3 bytes), whose stream start therefore lands on an odd offset.
        let odd_aligned = compiler.os_version == OsVersion::Os93a
            && streams[id].data.len() > 2
            && (streams[id].data[2] & 0x80) != 0;
        let size_needed = streams[id].data.len() + usize::from(odd_aligned);

        // best fit: the chip with the least free space that still takes it
        let mut best: Option<usize> = None;
        for (i, img) in images.iter().enumerate() {
            let cur_free = img.bytes_free() as usize;
            if cur_free >= size_needed
                && best.map_or(true, |b| cur_free < images[b].bytes_free() as usize)
            {
                best = Some(i);
            }
        }

        // allocate new chips until one takes the stream
        let best = loop {
            match best {
                Some(b) => break b,
                None => {
                    let next_chip = images.last().map_or(2, |i| i.chip_num + 1);
                    let idx = add_chip(&mut images, next_chip, &options.date)?;
                    images[idx].even_align();
                    if size_needed <= images[idx].bytes_free() as usize {
                        best = Some(idx);
                    }
                }
            }
        };

        let img = &mut images[best];
        if odd_aligned {
            img.p += 1;
        }

        streams[id].rom_addr = RomPointer::from_parts(img.chip_num - 2, img.p, hw).0;
        let p = img.p;
        let stream_len = streams[id].data.len();
        img.data[p..p + stream_len].copy_from_slice(&streams[id].data);
        img.p += stream_len;
        img.even_align();
    }

    // ------------------------------------------------------------------
    // track programs, second pass: re-emit with resolved stream addresses

    for (track_num, body_ofs) in track_body_ofs {
        if let Some(track) = compiler.tracks.get_mut(&track_num) {
            track.compile(&streams);
            let end = body_ofs + track.byte_code.len();
            images[0].data[body_ofs..end].copy_from_slice(&track.byte_code);
        }
    }

    compiler.streams = streams;

    // ------------------------------------------------------------------
    // ROM table, checksums, balancers

    let select_shift = hw.chip_select_code_shift();
    let entries: Vec<(u16, u16, u16)> = (0..8usize)
        .map(|slot| match images.get(slot) {
            Some(img) => {
                // U2's checksum is fixed at zero by fiat; the balancer
                // bytes will make the real sum agree
                let sum = if slot == 0 { 0x0000 } else { checksum(&img.data) };
                let size_4k = (img.data.len() / 4096) as u16;
                let select = ((img.chip_num - 2) as u16) << select_shift;
                (size_4k, select, sum)
            }
            None => (0, 0, 0),
        })
        .collect();
    for (slot, &(size_4k, select, sum)) in entries.iter().enumerate() {
        let entry_ofs = cat + slot * 6;
        images[0].put_u16(entry_ofs, size_4k);
        images[0].put_u16(entry_ofs + 2, select);
        images[0].put_u16(entry_ofs + 4, sum);
    }
    // zero terminator closing the ROM table
    images[0].put_u16(cat + 0x30, 0);

    // With the balancers still zero, the tentative sums tell us exactly
    // what the balancers must hold: the two's-complement negatives close
    // both byte streams to zero.
    let tentative = checksum(&images[0].data);
    images[0].data[balancer_ofs] = (tentative >> 8) as u8;
    images[0].data[balancer_ofs] = images[0].data[balancer_ofs].wrapping_neg();
    images[0].data[balancer_ofs + 1] = (tentative & 0xFF) as u8;
    images[0].data[balancer_ofs + 1] = images[0].data[balancer_ofs + 1].wrapping_neg();

    // ------------------------------------------------------------------
    // archive

    for img in images.iter_mut() {
        img.filename = match &options.rom_prefix {
            RomPrefix::Literal(prefix) => {
                format!("{}{}{}.rom", prefix, hw.chip_designator(), img.chip_num)
            }
            RomPrefix::SameAsPrototype => compiler
                .proto_names
                .iter()
                .find(|(n, _)| *n == img.chip_num)
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| {
                    format!("snd_{}{}.rom", hw.chip_designator(), img.chip_num)
                }),
        };
    }

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zw = zip::ZipWriter::new(&mut cursor);
        let opts = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for img in images.iter() {
            zw.start_file(&img.filename, opts)
                .map_err(|e| dcs_core::errors::DcsError::BuildError(e.to_string()))?;
            zw.write_all(&img.data)?;
        }

        // pass the prototype's non-ROM files through unchanged
        for (name, data) in compiler.proto_extra_files.iter() {
            zw.start_file(name, opts)
                .map_err(|e| dcs_core::errors::DcsError::BuildError(e.to_string()))?;
            zw.write_all(data)?;
        }

        zw.finish().map_err(|e| dcs_core::errors::DcsError::BuildError(e.to_string()))?;
    }

    let roms: Vec<RomDesc> = images
        .iter()
        .map(|img| RomDesc {
            chip_num: img.chip_num,
            filename: img.filename.clone(),
            size: img.data.len() as u32,
            bytes_free: img.bytes_free(),
        })
        .collect();

    for r in roms.iter() {
        info!("rom: {} ({}K, {}K free)", r.filename, r.size / 1024, r.bytes_free / 1024);
    }

    Ok(RomBuildOutput { zip_bytes: cursor.into_inner(), roms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ProgramStep, SourceLoc, Track, WaitSpec};
    use crate::{CompressionParams, Encoder};

    /// A synthetic prototype: a 64K U2 whose catalog describes itself.
    fn proto_zip(u2_size: usize) -> Vec<u8> {
        let mut u2 = vec![0xFFu8; u2_size];
        u2[..3].copy_from_slice(b"U2 ");
        u2[3] = 0;
        let cat = 0x4000;
        u2[cat] = ((u2_size / 4096) >> 8) as u8;
        u2[cat + 1] = (u2_size / 4096) as u8;
        u2[cat + 2] = 0;
        u2[cat + 3] = 0;

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zw = zip::ZipWriter::new(&mut cursor);
            let opts = zip::write::FileOptions::default();
            zw.start_file("test_u2.rom", opts).unwrap();
            std::io::Write::write_all(&mut zw, &u2).unwrap();
            zw.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn play_track(track_no: u16, stream: usize, n_frames: u16) -> Track {
        Track {
            from_proto: false,
            track_no,
            channel: 0,
            track_type: 1,
            deferred_track: 0,
            steps: vec![
                ProgramStep {
                    wait: WaitSpec::Count(0),
                    opcode: 0x01,
                    operands: vec![0, 0, 0, 0, 1],
                    stream: Some(stream),
                    stream_name: None,
                    loc: SourceLoc::default(),
                },
                ProgramStep {
                    wait: WaitSpec::Count(n_frames),
                    opcode: 0x00,
                    operands: Vec::new(),
                    stream: None,
                    stream_name: None,
                    loc: SourceLoc::default(),
                },
            ],
            byte_code: Vec::new(),
        }
    }

    #[test]
    fn verify_checksum_closure_and_catalog() {
        let zip = proto_zip(0x10000);
        let mut compiler = Compiler::load_prototype(&zip, false).unwrap();

        let audio =
            Encoder::new(CompressionParams::default()).encode_pcm(&[0i16; 480]).unwrap();
        let n_frames = audio.n_frames;
        let id = compiler.add_stream(Some("SILENCE"), None, audio);
        compiler.define_track(play_track(0x10, id, n_frames), SourceLoc::default());
        compiler.link();

        let out = build(
            &mut compiler,
            &RomBuildOptions {
                rom_size: RomSize::SameAsPrototype,
                rom_prefix: RomPrefix::Literal("t_".into()),
                date: "0801".into(),
            },
        )
        .unwrap();

        // pull U2 back out of the archive
        let mut archive =
            zip::ZipArchive::new(std::io::Cursor::new(&out.zip_bytes[..])).unwrap();
        let mut u2 = Vec::new();
        std::io::Read::read_to_end(&mut archive.by_name("t_u2.rom").unwrap(), &mut u2).unwrap();

        // checksum closure: both byte streams sum to zero mod 256
        assert_eq!(dcs_core::rom::checksum(&u2), 0x0000);

        // the built ROM decodes: boot it, queue the track, and pull a
        // frame of samples
        let mut dec = dcs_decoder::Decoder::new(Box::new(dcs_decoder::NullHost));
        dec.load_rom(&out.zip_bytes).unwrap();
        dec.soft_boot().unwrap();
        dec.add_track_command(0x10);
        dec.main_loop().unwrap();
        assert!(dec.is_stream_playing(0));

        // stream placement is even-aligned
        let stream_addr = compiler.streams[id].rom_addr;
        assert_eq!(stream_addr & 1, 0);
    }

    #[test]
    fn verify_best_fit_decreasing_packing() {
        let zip = proto_zip(0x10000);
        let mut compiler = Compiler::load_prototype(&zip, false).unwrap();

        // four big streams against 1M chips: 600K and 400K share U2 with
        // the catalog, 500K and 200K land in U3
        let k = 1024usize;
        let sizes = [600 * k, 500 * k, 400 * k, 200 * k];
        for (i, &size) in sizes.iter().enumerate() {
            let mut data = vec![0u8; size];
            data[0] = 0;
            data[1] = 1;
            let id = compiler.add_stream(
                Some(&format!("S{}", i)),
                None,
                crate::DcsAudio { n_frames: 1, data },
            );
            compiler.streams[id].referenced = true;
        }
        compiler.link();

        let out = build(
            &mut compiler,
            &RomBuildOptions {
                rom_size: RomSize::Bytes(1024 * 1024),
                rom_prefix: RomPrefix::Literal("p_".into()),
                date: String::new(),
            },
        )
        .unwrap();

        assert_eq!(out.roms.len(), 2);
        let hw = compiler.hw_version;
        let chip_of = |name: &str| {
            let addr = RomPointer(compiler.streams[compiler.find_stream(name).unwrap()].rom_addr);
            addr.chip_index(hw)
        };
        assert_eq!(chip_of("S0"), 0); // 600K -> U2
        assert_eq!(chip_of("S2"), 0); // 400K -> U2
        assert_eq!(chip_of("S1"), 1); // 500K -> U3
        assert_eq!(chip_of("S3"), 1); // 200K -> U3

        // no chip overflows, and the whole set wastes at most 16K plus
        // the catalog area
        for r in &out.roms {
            assert!(r.bytes_free < 1024 * 1024);
        }

        // every stream sits fully inside its chip
        for s in compiler.streams.iter() {
            let addr = RomPointer(s.rom_addr);
            assert!(addr.chip_offset(hw) + s.data.len() <= 1024 * 1024);
        }
    }

    // Scenario: variable SEL = 2 and table T = [100, 200, 300, 400]; a
    // type 3 track on channel 1 defers through T[SEL], and a program on
    // channel 0 triggers it. The command that ends up queued is T[2] =
    // 300, observable because track 300 writes a marker byte to the host.
    #[test]
    fn verify_deferred_indirect_lookup() {
        use std::cell::RefCell;
        use std::rc::Rc;

        use crate::compiler::script::Parser;
        use crate::compiler::StreamResolver;
        use dcs_core::errors::Result as DcsResult;

        struct NoFiles;
        impl StreamResolver for NoFiles {
            fn encode_file(
                &mut self,
                _file: &str,
                _params: &CompressionParams,
            ) -> DcsResult<crate::DcsAudio> {
                dcs_core::errors::decode_error("no stream files in this test")
            }
        }

        struct RecordingHost {
            bytes: Rc<RefCell<Vec<u8>>>,
        }
        impl dcs_decoder::Host for RecordingHost {
            fn receive_data_port(&mut self, byte: u8) {
                self.bytes.borrow_mut().push(byte);
            }
        }

        let script = r#"
            var SEL: 5;
            deferred indirect table T: 0 (100, 200, 300, 400);

            track 0x10 channel 0 {
                Wait(0) SetVariable(SEL, 2);
                Wait(0) StartDeferred(1);
                Wait(0) End();
            }
            track 0x11 channel 1 defer indirect (T[SEL]);
            track 300 channel 2 {
                Wait(0) WriteDataPort(0x42);
                Wait(0) End();
            }
        "#;

        let zip = proto_zip(0x10000);
        let mut compiler = Compiler::load_prototype(&zip, false).unwrap();
        let mut resolver = NoFiles;
        Parser::new(&mut compiler, &mut resolver).parse(script);
        compiler.link();
        assert!(!compiler.has_errors(), "diagnostics: {:?}", compiler.diagnostics);

        let out = build(
            &mut compiler,
            &RomBuildOptions {
                rom_size: RomSize::SameAsPrototype,
                rom_prefix: RomPrefix::Literal("di_".into()),
                date: String::new(),
            },
        )
        .unwrap();

        let bytes = Rc::new(RefCell::new(Vec::new()));
        let mut dec =
            dcs_decoder::Decoder::new(Box::new(RecordingHost { bytes: Rc::clone(&bytes) }));
        dec.load_rom(&out.zip_bytes).unwrap();
        dec.soft_boot().unwrap();

        // the type 3 track stores the deferred link; the program on
        // channel 0 then fires it
        dec.add_track_command(0x11);
        dec.add_track_command(0x10);
        dec.main_loop().unwrap();

        // the queued command 300 loads on the next pass and emits the
        // marker byte on the one after its program runs
        dec.main_loop().unwrap();
        assert_eq!(*bytes.borrow(), vec![0x42]);
    }

    #[test]
    fn verify_oversized_stream_fails() {
        let zip = proto_zip(0x10000);
        let mut compiler = Compiler::load_prototype(&zip, false).unwrap();
        let id = compiler.add_stream(
            Some("HUGE"),
            None,
            crate::DcsAudio { n_frames: 1, data: vec![0u8; 600 * 1024] },
        );
        compiler.streams[id].referenced = true;

        let result = build(
            &mut compiler,
            &RomBuildOptions {
                rom_size: RomSize::Bytes(512 * 1024),
                rom_prefix: RomPrefix::Literal("x_".into()),
                date: String::new(),
            },
        );
        assert!(result.is_err());
    }
}
