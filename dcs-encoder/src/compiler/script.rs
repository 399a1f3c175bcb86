// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `script` module parses track scripts.
//!
//! The script language declares the contents of a ROM build: a signature,
//! encoding parameter defaults, named streams, variables, deferred-indirect
//! tables, and track programs. Identifiers are case-insensitive and
//! statements end with `;`. Parsing continues past errors so one run
//! reports as many problems as possible; the caller checks
//! [`Compiler::has_errors`] before building.
//!
//! ```text
//! signature "My Patched ROM";
//! default encoding parameters (type=1, subtype=3);
//! stream THEME "theme.wav" (bitrate=96000);
//! var SONGSEL: 3;
//! deferred indirect table JUKEBOX: 2 (0x10, 0x11, 0x12);
//! track 0x0010 channel 0 {
//!     Wait(0) SetMixingLevel(0, 0x64);
//!     Wait(0) Play(stream=THEME, channel=0, repeat=1);
//!     Wait(stream) End();
//! }
//! track 0x0011 channel 1 defer (0x0010);
//! track 0x0012 channel 1 defer indirect (JUKEBOX[SONGSEL]);
//! ```

use super::{Compiler, ProgramStep, SourceLoc, StreamResolver, Track, WaitSpec};
use crate::CompressionParams;

/// Frames per second of track time: one frame is 7.68 ms.
const FRAMES_PER_SEC: f64 = 31250.0 / 240.0;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(i64),
    Str(String),
    Punct(char),
    Eof,
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src: src.as_bytes(), pos: 0, line: 1, col: 1 }
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.src.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        }
        else {
            self.col += 1;
        }
        Some(b)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc { line: self.line, col: self.col }
    }

    fn next_token(&mut self) -> (SourceLoc, Tok, Option<String>) {
        loop {
            // skip whitespace and comments
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                    continue;
                }
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.bump() {
                        if b == b'\n' {
                            break;
                        }
                    }
                    continue;
                }
                Some(b'#') => {
                    while let Some(b) = self.bump() {
                        if b == b'\n' {
                            break;
                        }
                    }
                    continue;
                }
                _ => break,
            }
        }

        let loc = self.loc();
        let Some(b) = self.peek() else {
            return (loc, Tok::Eof, None);
        };

        // string literal
        if b == b'"' {
            self.bump();
            let mut s = String::new();
            loop {
                match self.bump() {
                    Some(b'"') | None => break,
                    Some(c) => s.push(c as char),
                }
            }
            return (loc, Tok::Str(s), None);
        }

        // number: decimal, 0x hex, or $ hex
        if b.is_ascii_digit() || b == b'$' {
            let mut text = String::new();
            if b == b'$' {
                self.bump();
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() {
                        text.push(self.bump().unwrap() as char);
                    }
                    else {
                        break;
                    }
                }
                let v = i64::from_str_radix(&text, 16).unwrap_or(0);
                return (loc, Tok::Number(v), None);
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() {
                    text.push(self.bump().unwrap() as char);
                }
                else {
                    break;
                }
            }
            let lower = text.to_ascii_lowercase();
            let v = if let Some(hex) = lower.strip_prefix("0x") {
                i64::from_str_radix(hex, 16).ok()
            }
            else {
                lower.parse::<i64>().ok()
            };
            let err = if v.is_none() { Some(format!("malformed number '{}'", text)) } else { None };
            return (loc, Tok::Number(v.unwrap_or(0)), err);
        }

        // identifier
        if b.is_ascii_alphabetic() || b == b'_' {
            let mut s = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == b'_' {
                    s.push(self.bump().unwrap() as char);
                }
                else {
                    break;
                }
            }
            return (loc, Tok::Ident(s), None);
        }

        self.bump();
        (loc, Tok::Punct(b as char), None)
    }
}

/// Parser over the token stream, accumulating definitions and diagnostics
/// into the compiler.
pub struct Parser<'a> {
    compiler: &'a mut Compiler,
    resolver: &'a mut dyn StreamResolver,
    tokens: Vec<(SourceLoc, Tok)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(compiler: &'a mut Compiler, resolver: &'a mut dyn StreamResolver) -> Self {
        Parser { compiler, resolver, tokens: Vec::new(), pos: 0 }
    }

    /// Parse a whole script. Diagnostics collect in the compiler; parsing
    /// recovers at statement boundaries.
    pub fn parse(&mut self, source: &str) {
        let mut lexer = Lexer::new(source);
        loop {
            let (loc, tok, err) = lexer.next_token();
            if let Some(msg) = err {
                self.compiler.error(Some(loc), msg);
            }
            let eof = tok == Tok::Eof;
            self.tokens.push((loc, tok));
            if eof {
                break;
            }
        }
        self.pos = 0;

        while !self.at_eof() {
            self.parse_statement();
        }
    }

    // ------------------------------------------------------------------
    // token plumbing

    fn at_eof(&self) -> bool {
        matches!(self.tokens[self.pos].1, Tok::Eof)
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].1
    }

    fn loc(&self) -> SourceLoc {
        self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].1.clone();
        if !matches!(t, Tok::Eof) {
            self.pos += 1;
        }
        t
    }

    /// Consume an identifier matching `kw`, case-insensitively.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Tok::Ident(s) = self.peek() {
            if s.eq_ignore_ascii_case(kw) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn eat_punct(&mut self, p: char) -> bool {
        if self.peek() == &Tok::Punct(p) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_punct(&mut self, p: char) -> bool {
        if self.eat_punct(p) {
            return true;
        }
        let loc = self.loc();
        self.compiler.error(Some(loc), format!("expected '{}'", p));
        false
    }

    fn expect_ident(&mut self) -> Option<String> {
        let loc = self.loc();
        match self.advance() {
            Tok::Ident(s) => Some(s),
            _ => {
                self.compiler.error(Some(loc), "expected an identifier".to_string());
                None
            }
        }
    }

    fn expect_number(&mut self) -> Option<i64> {
        let loc = self.loc();
        match self.advance() {
            Tok::Number(v) => Some(v),
            _ => {
                self.compiler.error(Some(loc), "expected a number".to_string());
                None
            }
        }
    }

    fn expect_string(&mut self) -> Option<String> {
        let loc = self.loc();
        match self.advance() {
            Tok::Str(s) => Some(s),
            _ => {
                self.compiler.error(Some(loc), "expected a quoted string".to_string());
                None
            }
        }
    }

    /// Skip to just past the next ';' (or matching close brace) to recover
    /// from a malformed statement.
    fn synchronize(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.advance() {
                Tok::Eof => return,
                Tok::Punct('{') => depth += 1,
                Tok::Punct('}') if depth > 0 => depth -= 1,
                Tok::Punct('}') => return,
                Tok::Punct(';') if depth == 0 => return,
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // statements

    fn parse_statement(&mut self) {
        let loc = self.loc();

        if self.eat_keyword("signature") {
            if let Some(text) = self.expect_string() {
                // the U2 layout reserves 75 characters plus a terminator
                let text = if text.len() > 75 {
                    self.compiler.warn(
                        Some(loc),
                        format!("signature is {} bytes; truncated to 75", text.len()),
                    );
                    text[..75].to_string()
                }
                else {
                    text
                };
                self.compiler.signature = Some(text);
            }
            self.expect_punct(';');
        }
        else if self.eat_keyword("default") {
            // default encoding parameters (k=v, ...);
            self.eat_keyword("encoding");
            self.eat_keyword("parameters");
            let mut params = self.compiler.default_params;
            self.parse_param_list(&mut params);
            self.compiler.default_params = params;
            self.expect_punct(';');
        }
        else if self.eat_keyword("stream") {
            self.parse_stream_statement(loc);
        }
        else if self.eat_keyword("var") {
            self.parse_var_statement();
        }
        else if self.eat_keyword("deferred") {
            self.parse_di_table_statement(loc);
        }
        else if self.eat_keyword("track") {
            self.parse_track_statement(loc);
        }
        else if self.eat_punct(';') {
            // stray semicolon
        }
        else {
            let tok = self.advance();
            self.compiler.error(Some(loc), format!("unexpected token {:?}", tok));
            self.synchronize();
        }
    }

    /// `stream <name> "file" [replaces <addr>] [(params)];`
    fn parse_stream_statement(&mut self, loc: SourceLoc) {
        let Some(name) = self.expect_ident() else {
            self.synchronize();
            return;
        };
        let Some(file) = self.expect_string() else {
            self.synchronize();
            return;
        };

        let mut replaces = None;
        if self.eat_keyword("replaces") {
            replaces = self.expect_number().map(|v| v as u32);
        }

        let mut params = self.compiler.default_params;
        if self.peek() == &Tok::Punct('(') {
            self.parse_param_list(&mut params);
        }
        self.expect_punct(';');

        match self.resolver.encode_file(&file, &params) {
            Ok(audio) => {
                self.compiler.add_stream(Some(&name), replaces, audio);
            }
            Err(err) => {
                self.compiler
                    .error(Some(loc), format!("error encoding stream '{}': {}", file, err));
            }
        }
    }

    /// `var <name> [: index] [, <name> [: index]]*;`
    fn parse_var_statement(&mut self) {
        let mut next_free: i64 = self
            .compiler
            .variables
            .keys()
            .map(|&k| i64::from(k) + 1)
            .max()
            .unwrap_or(0);
        loop {
            let loc = self.loc();
            let Some(name) = self.expect_ident() else {
                self.synchronize();
                return;
            };
            let index = if self.eat_punct(':') {
                self.expect_number().unwrap_or(next_free)
            }
            else {
                next_free
            };
            if index < 0 || index > 0xFF {
                self.compiler.error(Some(loc), format!("variable index {} out of range", index));
            }
            else {
                self.compiler.define_variable(&name, index as u8, loc);
                next_free = next_free.max(index + 1);
            }

            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(';');
    }

    /// `deferred indirect table <name> [: index] (<trackNum>, ...);`
    fn parse_di_table_statement(&mut self, loc: SourceLoc) {
        self.eat_keyword("indirect");
        self.eat_keyword("table");
        let Some(name) = self.expect_ident() else {
            self.synchronize();
            return;
        };
        let index = if self.eat_punct(':') {
            self.expect_number().unwrap_or(0)
        }
        else {
            self.compiler.di_tables.keys().map(|&k| i64::from(k) + 1).max().unwrap_or(0)
        };

        let mut tracks = Vec::new();
        if self.expect_punct('(') {
            loop {
                match self.expect_number() {
                    Some(v) => tracks.push(v as u16),
                    None => break,
                }
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(')');
        }
        self.expect_punct(';');

        if index < 0 || index > 0xFF {
            self.compiler.error(Some(loc), format!("table index {} out of range", index));
            return;
        }
        let index = index as u8;

        if let Some(old) = self.compiler.di_tables.get(&index) {
            if !old.from_proto {
                self.compiler
                    .error(Some(loc), format!("deferred indirect table {} already defined", index));
                return;
            }
        }
        self.compiler.di_tables.insert(
            index,
            super::DiTable { name, index, from_proto: false, track_numbers: tracks },
        );
    }

    /// `track <n> channel <c> { program }` and the `defer` forms.
    fn parse_track_statement(&mut self, loc: SourceLoc) {
        let Some(track_no) = self.expect_number() else {
            self.synchronize();
            return;
        };
        if !self.eat_keyword("channel") {
            self.compiler.error(Some(self.loc()), "expected 'channel'".to_string());
            self.synchronize();
            return;
        }
        let Some(channel) = self.expect_number() else {
            self.synchronize();
            return;
        };

        let mut track = Track {
            from_proto: false,
            track_no: track_no as u16,
            channel: channel as u8,
            track_type: 1,
            deferred_track: 0,
            steps: Vec::new(),
            byte_code: Vec::new(),
        };

        if self.eat_keyword("defer") {
            if self.eat_keyword("indirect") {
                // defer indirect (<table>[<var>]);
                track.track_type = 3;
                self.expect_punct('(');
                let table = match self.expect_ident() {
                    Some(n) => {
                        let t = self.compiler.find_di_table(&n);
                        if t.is_none() {
                            self.compiler.error(
                                Some(loc),
                                format!("deferred indirect table '{}' not defined", n),
                            );
                        }
                        t
                    }
                    None => None,
                };
                self.expect_punct('[');
                let var = match self.expect_ident() {
                    Some(n) => {
                        let v = self.compiler.find_variable(&n);
                        if v.is_none() {
                            self.compiler
                                .error(Some(loc), format!("variable '{}' not defined", n));
                        }
                        v
                    }
                    None => None,
                };
                self.expect_punct(']');
                self.expect_punct(')');
                track.deferred_track =
                    (u16::from(var.unwrap_or(0)) << 8) | u16::from(table.unwrap_or(0));
            }
            else {
                // defer (<track>);
                track.track_type = 2;
                self.expect_punct('(');
                track.deferred_track = self.expect_number().unwrap_or(0) as u16;
                self.expect_punct(')');
            }
            self.expect_punct(';');
        }
        else if self.expect_punct('{') {
            self.parse_program(&mut track);
        }

        self.compiler.define_track(track, loc);
    }

    // ------------------------------------------------------------------
    // track programs

    /// Parse program statements up to the closing brace.
    fn parse_program(&mut self, track: &mut Track) {
        let mut ended = false;
        loop {
            if self.eat_punct('}') || self.at_eof() {
                break;
            }
            let loc = self.loc();

            if ended {
                self.compiler
                    .warn(Some(loc), "unreachable step after End or Wait(forever)".to_string());
                ended = false;
            }

            if self.eat_keyword("loop") {
                // Loop[(count)] { ... } -> 0x0E ... 0x0F
                let count = if self.eat_punct('(') {
                    let v = self.expect_number().unwrap_or(0);
                    self.expect_punct(')');
                    v
                }
                else {
                    0
                };
                track.steps.push(ProgramStep {
                    wait: WaitSpec::Count(0),
                    opcode: 0x0E,
                    operands: vec![count as u8],
                    stream: None,
                    stream_name: None,
                    loc,
                });
                if self.expect_punct('{') {
                    self.parse_program_until_close(track);
                }
                track.steps.push(ProgramStep {
                    wait: WaitSpec::Count(0),
                    opcode: 0x0F,
                    operands: Vec::new(),
                    stream: None,
                    stream_name: None,
                    loc,
                });
                continue;
            }

            if !self.eat_keyword("wait") {
                self.compiler.error(Some(loc), "expected Wait(...) or Loop".to_string());
                self.synchronize();
                continue;
            }

            let wait = self.parse_wait_spec();
            match self.parse_op(wait, loc) {
                Some(step) => {
                    let is_end = step.opcode == 0x00;
                    let parked = step.wait == WaitSpec::Forever;
                    track.steps.push(step);
                    ended = is_end || parked;
                }
                None => self.synchronize(),
            }
        }
    }

    /// Parse a nested Loop body (shares the step list).
    fn parse_program_until_close(&mut self, track: &mut Track) {
        loop {
            if self.eat_punct('}') || self.at_eof() {
                return;
            }
            let loc = self.loc();
            if self.eat_keyword("wait") {
                let wait = self.parse_wait_spec();
                match self.parse_op(wait, loc) {
                    Some(step) => track.steps.push(step),
                    None => self.synchronize(),
                }
            }
            else {
                self.compiler.error(Some(loc), "expected Wait(...) inside Loop".to_string());
                self.synchronize();
            }
        }
    }

    /// `Wait(<n> | <t> sec | <t> ms | forever | stream [- <t>])`
    fn parse_wait_spec(&mut self) -> WaitSpec {
        if !self.expect_punct('(') {
            return WaitSpec::Count(0);
        }

        let spec = if self.eat_keyword("forever") {
            WaitSpec::Forever
        }
        else if self.eat_keyword("stream") {
            let minus = if self.eat_punct('-') {
                self.expect_number().unwrap_or(0) as u16
            }
            else {
                0
            };
            WaitSpec::Stream { minus }
        }
        else {
            let v = self.expect_number().unwrap_or(0);
            if self.eat_keyword("sec") {
                WaitSpec::Count((v as f64 * FRAMES_PER_SEC).round() as u16)
            }
            else if self.eat_keyword("ms") {
                WaitSpec::Count((v as f64 / 1000.0 * FRAMES_PER_SEC).round() as u16)
            }
            else {
                WaitSpec::Count(v as u16)
            }
        };
        self.expect_punct(')');
        spec
    }

    /// Parse one `<Op>(args);` and build its program step.
    fn parse_op(&mut self, wait: WaitSpec, loc: SourceLoc) -> Option<ProgramStep> {
        let name = self.expect_ident()?;
        let mut step = ProgramStep {
            wait,
            opcode: 0,
            operands: Vec::new(),
            stream: None,
            stream_name: None,
            loc,
        };

        self.expect_punct('(');
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "END" => {
                step.opcode = 0x00;
            }
            "STOP" => {
                step.opcode = 0x02;
                step.operands.push(self.expect_number()? as u8);
            }
            "PLAY" => {
                // Play(stream=<name>, channel=<n>, repeat=<n>)
                step.opcode = 0x01;
                let mut channel = 0u8;
                let mut repeat = 1u8;
                loop {
                    let key = self.expect_ident()?;
                    self.expect_punct('=');
                    match key.to_ascii_uppercase().as_str() {
                        "STREAM" => {
                            let sn = self.expect_ident()?;
                            step.stream = self.compiler.find_stream(&sn);
                            step.stream_name = Some(sn);
                        }
                        "CHANNEL" => channel = self.expect_number()? as u8,
                        "REPEAT" => repeat = self.expect_number()? as u8,
                        other => {
                            self.compiler
                                .error(Some(loc), format!("unknown Play argument '{}'", other));
                            return None;
                        }
                    }
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                // channel, 24-bit placeholder for the stream address, loop
                // count; the link pass patches the address
                step.operands = vec![channel, 0, 0, 0, repeat];
            }
            "QUEUE" => {
                step.opcode = 0x03;
                let t = self.expect_number()? as u16;
                step.operands.extend_from_slice(&t.to_be_bytes());
            }
            "WRITEDATAPORT" => {
                step.opcode = 0x04;
                step.operands.push(self.expect_number()? as u8);
            }
            "SETCHANNELTIMER" => {
                // OS93a only
                step.opcode = 0x04;
                if self.compiler.os_version != dcs_core::rom::OsVersion::Os93a {
                    self.compiler.error(
                        Some(loc),
                        "SetChannelTimer is only available on OS93a firmware".to_string(),
                    );
                }
                let byte = self.expect_number()? as u8;
                self.expect_punct(',');
                let interval = self.expect_number()? as u16;
                step.operands.push(byte);
                step.operands.extend_from_slice(&interval.to_be_bytes());
            }
            "STARTDEFERRED" => {
                step.opcode = 0x05;
                step.operands.push(self.expect_number()? as u8);
            }
            "SETVARIABLE" => {
                step.opcode = 0x06;
                let var = self.expect_ident()?;
                let id = match self.compiler.find_variable(&var) {
                    Some(id) => id,
                    None => {
                        self.compiler
                            .error(Some(loc), format!("variable '{}' not defined", var));
                        0
                    }
                };
                self.expect_punct(',');
                let value = self.expect_number()?;
                step.operands.push(id);
                step.operands.push(value as u8);
                if let Some(v) = self.compiler.variables.get_mut(&id) {
                    v.max_val = v.max_val.max(value as i32);
                }
            }
            "SETMIXINGLEVEL" => {
                // SetMixingLevel(channel, [increase|decrease] level [, steps])
                let channel = self.expect_number()? as u8;
                self.expect_punct(',');
                let mode: u8 = if self.eat_keyword("increase") {
                    1
                }
                else if self.eat_keyword("decrease") {
                    2
                }
                else {
                    0
                };
                let level = self.expect_number()?;
                let steps = if self.eat_punct(',') { Some(self.expect_number()? as u16) } else { None };

                step.opcode = match steps {
                    None => 0x07 + mode,
                    Some(_) => 0x0A + mode,
                };
                step.operands.push(channel);
                step.operands.push(level as u8);
                if let Some(s) = steps {
                    step.operands.extend_from_slice(&s.to_be_bytes());
                }
            }
            other => {
                self.compiler.error(Some(loc), format!("unknown operation '{}'", other));
                return None;
            }
        }
        self.expect_punct(')');
        self.expect_punct(';');
        Some(step)
    }

    /// `(k=v, ...)` compression parameter list.
    fn parse_param_list(&mut self, params: &mut CompressionParams) {
        if !self.expect_punct('(') {
            return;
        }
        if self.eat_punct(')') {
            return;
        }
        loop {
            let loc = self.loc();
            let Some(key) = self.expect_ident() else {
                self.synchronize();
                return;
            };
            self.expect_punct('=');
            let Some(value) = self.expect_number() else {
                self.synchronize();
                return;
            };

            match key.to_ascii_uppercase().as_str() {
                "TYPE" => params.stream_format_type = value as i32,
                "SUBTYPE" => params.stream_format_sub_type = value as i32,
                "BITRATE" => params.target_bit_rate = value as i32,
                // per-mille of total power retained by the band cutoff
                "POWERCUTOFF" => params.power_band_cutoff = value as f32 / 1000.0,
                // quantization error ceiling in 1.15 LSBs
                "MAXERROR" => params.maximum_quantization_error = value as f32 / 32768.0,
                "MINRANGE" => params.minimum_dynamic_range = value as f32 / 32768.0,
                other => {
                    self.compiler
                        .warn(Some(loc), format!("unknown encoding parameter '{}'", other));
                }
            }
            if !self.eat_punct(',') {
                break;
            }
        }
        self.expect_punct(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Severity;
    use crate::{DcsAudio, Encoder};
    use dcs_core::errors::Result;
    use dcs_core::rom::{HwVersion, OsVersion};

    struct FakeResolver;

    impl StreamResolver for FakeResolver {
        fn encode_file(&mut self, _file: &str, params: &CompressionParams) -> Result<DcsAudio> {
            // a short silent stream in the requested dialect
            Encoder::new(*params).encode_pcm(&[0i16; 480])
        }
    }

    fn empty_compiler() -> Compiler {
        Compiler {
            hw_version: HwVersion::Dcs93,
            os_version: OsVersion::Os94,
            proto_images: Vec::new(),
            proto_names: Vec::new(),
            proto_extra_files: Vec::new(),
            signature: None,
            default_params: CompressionParams::default(),
            tracks: Default::default(),
            streams: Vec::new(),
            streams_by_name: Default::default(),
            streams_by_proto_addr: Default::default(),
            di_tables: Default::default(),
            variables: Default::default(),
            vars_by_name: Default::default(),
            diagnostics: Vec::new(),
            max_track_number: 0,
            anon_stream_id: 0,
        }
    }

    const SCRIPT: &str = r#"
        signature "Test Build";
        default encoding parameters (type=1, subtype=3);
        stream THEME "theme.wav";
        var SONGSEL: 3;
        deferred indirect table JUKEBOX: 2 (0x10, 0x11);

        track 0x0010 channel 0 {
            Wait(0) SetMixingLevel(0, 0x64);
            Wait(0) Play(stream=THEME, channel=0, repeat=1);
            Wait(stream) End();
        }
        track 0x0011 channel 1 defer (0x0010);
        track 0x0012 channel 1 defer indirect (JUKEBOX[SONGSEL]);
    "#;

    #[test]
    fn verify_script_definitions() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r).parse(SCRIPT);
        c.link();

        assert!(!c.has_errors(), "diagnostics: {:?}", c.diagnostics);
        assert_eq!(c.signature.as_deref(), Some("Test Build"));
        assert_eq!(c.tracks.len(), 3);
        assert_eq!(c.max_track_number, 0x0012);

        let t = &c.tracks[&0x0010];
        assert_eq!(t.track_type, 1);
        assert_eq!(t.steps.len(), 3);
        assert_eq!(t.steps[1].opcode, 0x01);
        assert!(t.steps[1].stream.is_some());
        // Wait(stream) resolves to the played stream's frame count
        assert_eq!(t.steps[2].wait, WaitSpec::Stream { minus: 0 });

        let t2 = &c.tracks[&0x0011];
        assert_eq!(t2.track_type, 2);
        assert_eq!(t2.deferred_track, 0x0010);

        let t3 = &c.tracks[&0x0012];
        assert_eq!(t3.track_type, 3);
        assert_eq!(t3.deferred_track, (3 << 8) | 2);
    }

    #[test]
    fn verify_compiled_byte_code() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r).parse(SCRIPT);
        c.link();
        assert!(!c.has_errors());

        let streams = std::mem::take(&mut c.streams);
        let t = c.tracks.get_mut(&0x0010).unwrap();
        t.compile(&streams);

        // step 1: wait 0, SetMixingLevel -> 07 00 64
        assert_eq!(&t.byte_code[0..5], &[0x00, 0x00, 0x07, 0x00, 0x64]);
        // step 2: wait 0, Play -> 01 ch ptr24 repeat
        assert_eq!(&t.byte_code[5..8], &[0x00, 0x00, 0x01]);
        // step 3: wait = the 2-frame stream length, End
        let tail = &t.byte_code[13..];
        assert_eq!(tail, &[0x00, 0x02, 0x00]);
    }

    #[test]
    fn verify_undefined_stream_is_an_error() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r).parse(
            "track 1 channel 0 { Wait(0) Play(stream=NOSUCH, channel=0, repeat=1); Wait(0) End(); }",
        );
        c.link();
        assert!(c.has_errors());
    }

    #[test]
    fn verify_unreachable_code_warns() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r)
            .parse("track 1 channel 0 { Wait(0) End(); Wait(0) Stop(1); }");
        assert!(c
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("unreachable")));
    }

    #[test]
    fn verify_unsafe_variable_index_warns() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r).parse("var HIGH: 0x60;");
        assert!(c.diagnostics.iter().any(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn verify_parse_recovers_after_error() {
        let mut c = empty_compiler();
        let mut r = FakeResolver;
        Parser::new(&mut c, &mut r).parse("bogus statement; var OK: 1;");
        assert!(c.has_errors());
        assert!(c.find_variable("OK").is_some());
    }
}
