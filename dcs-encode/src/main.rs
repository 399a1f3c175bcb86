// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command line front end for the DCS encoder: compiles a track script
//! against a prototype ROM and writes a new ROM archive.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::error;

use dcs_core::errors::{decode_error, DcsError, Result};
use dcs_core::raw;
use dcs_encoder::compiler::script::Parser;
use dcs_encoder::compiler::{Compiler, StreamResolver};
use dcs_encoder::rom_builder::{self, RomBuildOptions, RomPrefix, RomSize};
use dcs_encoder::{CompressionParams, DcsAudio, Encoder};

#[derive(ClapParser)]
#[command(name = "dcs-encode", about = "Build DCS pinball sound ROMs from a track script")]
struct Args {
    /// Prototype ROM set (.zip) supplying the DSP control program
    prototype: PathBuf,

    /// Track script to compile
    script: PathBuf,

    /// Output ROM archive path
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Import all tracks and streams from the prototype ROM
    #[arg(long = "patch")]
    patch: bool,

    /// Chip size: 512k, 1M, or * to match the prototype
    #[arg(long = "rom-size", default_value = "*")]
    rom_size: String,

    /// Image file name prefix, or * to reuse the prototype's names
    #[arg(long = "rom-prefix", default_value = "*")]
    rom_prefix: String,

    /// Directory to search for stream files (repeatable)
    #[arg(long = "stream-dir")]
    stream_dirs: Vec<PathBuf>,

    /// Suppress progress output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Resolves `stream` statements: finds the file in the search path and
/// encodes it. WAV input must already be at 31250 Hz; raw DCS streams
/// (.dcs) import directly.
struct FileResolver {
    search_dirs: Vec<PathBuf>,
    quiet: bool,
}

impl FileResolver {
    fn find(&self, file: &str) -> PathBuf {
        let direct = PathBuf::from(file);
        if direct.exists() || direct.is_absolute() {
            return direct;
        }
        for dir in &self.search_dirs {
            let candidate = dir.join(file);
            if candidate.exists() {
                return candidate;
            }
        }
        direct
    }
}

impl StreamResolver for FileResolver {
    fn encode_file(&mut self, file: &str, params: &CompressionParams) -> Result<DcsAudio> {
        let path = self.find(file);
        let bytes = std::fs::read(&path)?;
        let encoder = Encoder::new(*params);

        if !self.quiet {
            eprintln!("encoding {}", path.display());
        }

        if bytes.len() >= 4 && &bytes[0..4] == raw::SIGNATURE {
            encoder.encode_raw_file(&bytes)
        }
        else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            let pcm = read_wav(&bytes)?;
            encoder.encode_pcm(&pcm)
        }
        else {
            decode_error("stream file is neither a WAV file nor a raw DCS stream")
        }
    }
}

/// Minimal WAV reader: uncompressed PCM, 8 or 16 bits, mono or stereo
/// (averaged), 31250 Hz only. Rate conversion belongs to an external tool.
fn read_wav(bytes: &[u8]) -> Result<Vec<i16>> {
    let u16_at = |ofs: usize| -> u32 { u32::from(bytes[ofs]) | (u32::from(bytes[ofs + 1]) << 8) };
    let u32_at = |ofs: usize| -> u32 { u16_at(ofs) | (u16_at(ofs + 2) << 16) };

    if bytes.len() < 44 || &bytes[12..16] != b"fmt " {
        return decode_error("wav: missing fmt chunk");
    }
    let format_type = u16_at(20);
    let n_channels = u16_at(22) as usize;
    let sample_rate = u32_at(24);
    let bits_per_sample = u16_at(34) as usize;

    if format_type != 1 {
        return decode_error("wav: only uncompressed PCM is supported");
    }
    if n_channels != 1 && n_channels != 2 {
        return decode_error("wav: only mono or stereo input is supported");
    }
    if sample_rate != dcs_core::SAMPLE_RATE {
        return decode_error("wav: input must be resampled to 31250 Hz first");
    }
    if bits_per_sample != 8 && bits_per_sample != 16 {
        return decode_error("wav: only 8- and 16-bit samples are supported");
    }

    // find the data chunk
    let mut ofs = 36usize;
    let (mut data_ofs, mut data_len) = (0usize, 0usize);
    while ofs + 8 <= bytes.len() {
        let id = &bytes[ofs..ofs + 4];
        let len = u32_at(ofs + 4) as usize;
        if id == b"data" {
            data_ofs = ofs + 8;
            data_len = len.min(bytes.len() - data_ofs);
            break;
        }
        ofs += 8 + len + (len & 1);
    }
    if data_ofs == 0 {
        return decode_error("wav: no data chunk found");
    }

    let bytes_per_sample = bits_per_sample / 8;
    let frame_size = bytes_per_sample * n_channels;
    let n_frames = data_len / frame_size;

    let mut pcm = Vec::with_capacity(n_frames);
    for f in 0..n_frames {
        let base = data_ofs + f * frame_size;
        let mut acc = 0i32;
        for ch in 0..n_channels {
            let p = base + ch * bytes_per_sample;
            let s = if bits_per_sample == 8 {
                (i32::from(bytes[p]) - 128) * 256
            }
            else {
                i32::from(i16::from_le_bytes([bytes[p], bytes[p + 1]]))
            };
            acc += s;
        }
        // average the channels into a mono signal
        pcm.push(((acc + (n_channels as i32 - 1)) / n_channels as i32) as i16);
    }
    Ok(pcm)
}

fn parse_rom_size(text: &str) -> Option<RomSize> {
    match text.to_ascii_lowercase().as_str() {
        "*" => Some(RomSize::SameAsPrototype),
        "512k" => Some(RomSize::Bytes(512 * 1024)),
        "1m" => Some(RomSize::Bytes(1024 * 1024)),
        _ => None,
    }
}

fn run(args: &Args) -> std::result::Result<(), String> {
    let rom_size = parse_rom_size(&args.rom_size)
        .ok_or_else(|| format!("invalid --rom-size '{}'", args.rom_size))?;
    let rom_prefix = if args.rom_prefix == "*" {
        RomPrefix::SameAsPrototype
    }
    else {
        RomPrefix::Literal(args.rom_prefix.clone())
    };

    let zip_bytes =
        std::fs::read(&args.prototype).map_err(|e| format!("reading prototype ROM: {}", e))?;
    let script =
        std::fs::read_to_string(&args.script).map_err(|e| format!("reading script: {}", e))?;

    let mut compiler = Compiler::load_prototype(&zip_bytes, args.patch)
        .map_err(|e| format!("loading prototype ROM: {}", e))?;

    let mut resolver = FileResolver {
        search_dirs: {
            let mut dirs = args.stream_dirs.clone();
            if let Some(parent) = args.script.parent() {
                dirs.push(parent.to_path_buf());
            }
            dirs
        },
        quiet: args.quiet,
    };

    Parser::new(&mut compiler, &mut resolver).parse(&script);
    compiler.link();

    // report every diagnostic; errors suppress emission
    for d in &compiler.diagnostics {
        eprintln!("{}: {}", args.script.display(), d);
    }
    if compiler.has_errors() {
        return Err("compilation failed".to_string());
    }

    let date = chrono_free_date();
    let output = rom_builder::build(&mut compiler, &RomBuildOptions { rom_size, rom_prefix, date })
        .map_err(|e| match e {
            DcsError::BuildError(msg) => msg,
            other => other.to_string(),
        })?;

    let out_path = args.output.clone().unwrap_or_else(|| {
        Path::new(&args.script).with_extension("zip")
    });
    std::fs::write(&out_path, &output.zip_bytes)
        .map_err(|e| format!("writing {}: {}", out_path.display(), e))?;

    if !args.quiet {
        for r in &output.roms {
            println!(
                "  {} : {}K image, {}K free",
                r.filename,
                r.size / 1024,
                r.bytes_free / 1024
            );
        }
        println!("wrote {}", out_path.display());
    }
    Ok(())
}

/// A compact date string for the chip signatures, derived from the system
/// clock without pulling in a date-time dependency.
fn chrono_free_date() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let days = secs / 86400;
    format!("d{}", days)
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    // usage problems exit 1; compile and build failures exit 2
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // help and version requests are not errors
            if err.use_stderr() {
                let _ = err.print();
                return ExitCode::from(1);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            eprintln!("dcs-encode: {}", msg);
            ExitCode::from(2)
        }
    }
}
