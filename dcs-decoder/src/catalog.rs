// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `catalog` module parses the ROM catalog in U2.
//!
//! The catalog sits at a fixed offset in U2 (0x4000 on the original boards,
//! 0x6000 on DCS-95): an 8-entry ROM table of (size in 4K units, chip-select
//! code, checksum) closed by a two-byte zero terminator, then, at +0x40, a
//! pointer to the Track Index, a pointer to the Deferred-Indirect Table
//! Index, and the track count. The Track Index is an array of 24-bit
//! pointers; entries with high byte 0xFF are unpopulated.

use log::{debug, info};

use dcs_core::errors::{decode_error, Result};
use dcs_core::rom::{HwVersion, RomPointer, RomSet};

/// Parsed catalog pointers.
pub struct Catalog {
    /// Pointer to the track index array.
    pub track_index: RomPointer,
    /// Pointer to the deferred-indirect table index array.
    pub indirect_index: RomPointer,
    /// Number of track index slots.
    pub n_tracks: u16,
}

impl Catalog {
    /// Parse the catalog from a loaded ROM set.
    pub fn parse(roms: &RomSet) -> Result<Catalog> {
        let hw = roms.hw_version();
        let base = RomPointer::from_parts(0, hw.catalog_offset(), hw);

        let track_index = RomPointer(roms.read_u24(base.offset_by(0x40))?);
        let indirect_index = RomPointer(roms.read_u24(base.offset_by(0x43))?);
        let n_tracks = roms.read_u16(base.offset_by(0x46))?;

        if track_index.is_null() {
            return decode_error("catalog: no track index");
        }

        info!("catalog: {} track slots, track index at {:06x}", n_tracks, track_index.0);
        Ok(Catalog { track_index, indirect_index, n_tracks })
    }

    /// Look up a track by number. Returns `None` for out-of-range numbers
    /// and unpopulated slots.
    pub fn track_pointer(&self, roms: &RomSet, track_num: u16) -> Result<Option<RomPointer>> {
        if track_num >= self.n_tracks {
            return Ok(None);
        }
        let entry = RomPointer(
            roms.read_u24(self.track_index.offset_by(u32::from(track_num) * 3))?,
        );
        Ok(if entry.is_null() { None } else { Some(entry) })
    }

    /// Resolve a deferred-indirect reference: table `table_id`, entry
    /// `index`. The result is a track command code.
    pub fn indirect_track(&self, roms: &RomSet, table_id: u8, index: u8) -> Result<u16> {
        let table = RomPointer(
            roms.read_u24(self.indirect_index.offset_by(u32::from(table_id) * 3))?,
        );
        roms.read_u16(table.offset_by(u32::from(index) * 2))
    }
}

/// Probe the hardware generation of a chip image set by validating the ROM
/// table at each era's catalog offset against the actual U2 size.
pub fn probe_hw_version(u2: &[u8]) -> Result<HwVersion> {
    for hw in [HwVersion::Dcs93, HwVersion::Dcs95] {
        let ofs = hw.catalog_offset();
        if u2.len() < ofs + 0x48 {
            continue;
        }
        // The first ROM table entry describes U2 itself: its size in 4K
        // units must match the image.
        let size_4k = (usize::from(u2[ofs]) << 8) | usize::from(u2[ofs + 1]);
        let select = (u16::from(u2[ofs + 2]) << 8) | u16::from(u2[ofs + 3]);
        if size_4k * 4096 == u2.len() && select == 0 {
            debug!("catalog probe: {:?} (offset {:#x})", hw, ofs);
            return Ok(hw);
        }
    }
    decode_error("catalog: no valid catalog found in U2")
}

/// Forward-reading cursor over ROM bytes, for walking track byte-code
/// programs and other sequential structures.
#[derive(Clone, Copy)]
pub struct RomCursor {
    pub ptr: RomPointer,
}

impl RomCursor {
    pub fn new(ptr: RomPointer) -> RomCursor {
        RomCursor { ptr }
    }

    pub fn get_u8(&mut self, roms: &RomSet) -> Result<u8> {
        let v = roms.read_u8(self.ptr)?;
        self.ptr = self.ptr.offset_by(1);
        Ok(v)
    }

    pub fn get_u16(&mut self, roms: &RomSet) -> Result<u16> {
        let v = roms.read_u16(self.ptr)?;
        self.ptr = self.ptr.offset_by(2);
        Ok(v)
    }

    pub fn get_u24(&mut self, roms: &RomSet) -> Result<u32> {
        let v = roms.read_u24(self.ptr)?;
        self.ptr = self.ptr.offset_by(3);
        Ok(v)
    }

    /// Step the cursor backwards or forwards without reading.
    pub fn rewind(&mut self, n: u32) {
        self.ptr = RomPointer(self.ptr.0 - n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn put_u24(img: &mut [u8], ofs: usize, val: u32) {
        img[ofs] = (val >> 16) as u8;
        img[ofs + 1] = (val >> 8) as u8;
        img[ofs + 2] = val as u8;
    }

    fn build_u2() -> Vec<u8> {
        let mut img = vec![0xFFu8; 0x8000];
        let cat = 0x4000;
        // ROM table entry 0: 0x8000 bytes = 8 units of 4K, select 0
        img[cat] = 0x00;
        img[cat + 1] = 0x08;
        img[cat + 2] = 0x00;
        img[cat + 3] = 0x00;
        // track index pointer, DI index pointer, track count
        put_u24(&mut img, cat + 0x40, 0x4100);
        put_u24(&mut img, cat + 0x43, 0x4200);
        img[cat + 0x46] = 0x00;
        img[cat + 0x47] = 0x02;
        // track 0 -> 0x4300, track 1 unpopulated
        put_u24(&mut img, 0x4100, 0x4300);
        put_u24(&mut img, 0x4103, 0xFF_FFFF);
        // DI table 0 at 0x4210, entry[2] = 300
        put_u24(&mut img, 0x4200, 0x4210);
        img[0x4214] = (300u16 >> 8) as u8;
        img[0x4215] = 300u16 as u8;
        img
    }

    #[test]
    fn verify_probe_and_parse() {
        let img = build_u2();
        assert_eq!(probe_hw_version(&img).unwrap(), HwVersion::Dcs93);

        let mut roms = RomSet::new(HwVersion::Dcs93);
        roms.insert_chip(2, Arc::from(img.as_slice())).unwrap();
        let cat = Catalog::parse(&roms).unwrap();
        assert_eq!(cat.n_tracks, 2);
        assert_eq!(cat.track_pointer(&roms, 0).unwrap(), Some(RomPointer(0x4300)));
        assert_eq!(cat.track_pointer(&roms, 1).unwrap(), None);
        assert_eq!(cat.track_pointer(&roms, 5).unwrap(), None);
        assert_eq!(cat.indirect_track(&roms, 0, 2).unwrap(), 300);
    }
}
