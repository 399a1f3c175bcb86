// dcs-rs
// Copyright (c) 2023-2026 The dcs-rs Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rom` module implements the DCS ROM address model.
//!
//! A DCS board carries up to eight ROM chips, designated U2 through U9 (S2
//! through S9 on the DCS-95 audio/video board). Pointers stored in ROM are
//! 24-bit logical addresses: the high bits select the chip and the remaining
//! bits index into the chip's image. The two hardware generations split the
//! address differently, so every pointer translation is parameterized by the
//! hardware version.

use std::sync::Arc;

use crate::errors::{decode_error, Result};

/// Hardware generation of a DCS sound board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwVersion {
    /// The original audio-only board (1993-1995).
    Dcs93,
    /// The DCS-95 audio/video board (1995-1998).
    Dcs95,
}

impl HwVersion {
    /// Bit position of the chip-select field within a 24-bit linear address.
    pub fn chip_select_shift(self) -> u32 {
        match self {
            HwVersion::Dcs93 => 20,
            HwVersion::Dcs95 => 21,
        }
    }

    /// Bit position of the chip-select code within a catalog ROM table entry.
    pub fn chip_select_code_shift(self) -> u32 {
        match self {
            HwVersion::Dcs93 => 8,
            HwVersion::Dcs95 => 9,
        }
    }

    /// Offset of the catalog within the U2 image.
    pub fn catalog_offset(self) -> usize {
        match self {
            HwVersion::Dcs93 => 0x4000,
            HwVersion::Dcs95 => 0x6000,
        }
    }

    /// ROM chip designator letter used in image file names.
    pub fn chip_designator(self) -> char {
        match self {
            HwVersion::Dcs93 => 'u',
            HwVersion::Dcs95 => 's',
        }
    }
}

/// DCS firmware generation. Each firmware version runs on exactly one
/// hardware platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsVersion {
    /// 1993 software, first revision (Indiana Jones, Judge Dredd).
    Os93a,
    /// 1993 software, second revision (Star Trek: The Next Generation).
    Os93b,
    /// 1994-1995 software on the original board.
    Os94,
    /// 1995-1998 software on the DCS-95 board.
    Os95,
}

impl OsVersion {
    pub fn hw_version(self) -> HwVersion {
        match self {
            OsVersion::Os93a | OsVersion::Os93b | OsVersion::Os94 => HwVersion::Dcs93,
            OsVersion::Os95 => HwVersion::Dcs95,
        }
    }

    /// True for the two 1993 firmware revisions.
    pub fn is_os93(self) -> bool {
        matches!(self, OsVersion::Os93a | OsVersion::Os93b)
    }
}

/// A 24-bit logical ROM address. The null pointer convention is a value with
/// the high byte set to 0xFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomPointer(pub u32);

impl RomPointer {
    pub const NULL: RomPointer = RomPointer(0xFF_FFFF);

    pub fn is_null(self) -> bool {
        (self.0 & 0xFF_0000) == 0xFF_0000
    }

    /// Chip index (0 for U2) selected by the address.
    pub fn chip_index(self, hw: HwVersion) -> usize {
        ((self.0 & 0xFF_FFFF) >> hw.chip_select_shift()) as usize
    }

    /// Byte offset within the selected chip's image.
    pub fn chip_offset(self, hw: HwVersion) -> usize {
        (self.0 & ((1 << hw.chip_select_shift()) - 1)) as usize
    }

    /// Compose a linear address from a chip index (0 for U2) and offset.
    pub fn from_parts(chip_index: usize, offset: usize, hw: HwVersion) -> RomPointer {
        RomPointer(((chip_index as u32) << hw.chip_select_shift()) | offset as u32)
    }

    /// The address `delta` bytes further along.
    pub fn offset_by(self, delta: u32) -> RomPointer {
        RomPointer(self.0 + delta)
    }
}

/// Compute the checksum of a ROM image: the mod-256 sum of the even-offset
/// bytes in the high byte, and of the odd-offset bytes in the low byte.
pub fn checksum(data: &[u8]) -> u16 {
    let mut even = 0u8;
    let mut odd = 0u8;
    for pair in data.chunks(2) {
        even = even.wrapping_add(pair[0]);
        if let Some(&b) = pair.get(1) {
            odd = odd.wrapping_add(b);
        }
    }
    (u16::from(even) << 8) | u16::from(odd)
}

/// A loaded set of ROM chip images.
///
/// Chip images are reference counted so that bit readers and stream handles
/// can point into them without borrowing the set; the decoder never mutates
/// image bytes.
pub struct RomSet {
    hw: HwVersion,
    chips: [Option<Arc<[u8]>>; 8],
}

impl RomSet {
    pub fn new(hw: HwVersion) -> Self {
        RomSet { hw, chips: Default::default() }
    }

    pub fn hw_version(&self) -> HwVersion {
        self.hw
    }

    /// Install the image for chip U`n` (n = 2..9).
    pub fn insert_chip(&mut self, chip_num: usize, data: Arc<[u8]>) -> Result<()> {
        if chip_num < 2 || chip_num > 9 {
            return decode_error("rom: chip number out of range");
        }
        self.chips[chip_num - 2] = Some(data);
        Ok(())
    }

    /// Get the image for chip index `idx` (0 for U2).
    pub fn chip(&self, idx: usize) -> Option<&Arc<[u8]>> {
        self.chips.get(idx).and_then(|c| c.as_ref())
    }

    /// Resolve a linear pointer to its chip image and byte offset.
    pub fn resolve(&self, ptr: RomPointer) -> Result<(Arc<[u8]>, usize)> {
        if ptr.is_null() {
            return decode_error("rom: null pointer dereference");
        }
        let chip = match self.chip(ptr.chip_index(self.hw)) {
            Some(chip) => chip,
            None => return decode_error("rom: pointer into unpopulated chip"),
        };
        let offset = ptr.chip_offset(self.hw);
        if offset >= chip.len() {
            return decode_error("rom: pointer beyond chip image");
        }
        Ok((Arc::clone(chip), offset))
    }

    pub fn read_u8(&self, ptr: RomPointer) -> Result<u8> {
        let (chip, ofs) = self.resolve(ptr)?;
        Ok(chip[ofs])
    }

    pub fn read_u16(&self, ptr: RomPointer) -> Result<u16> {
        let (chip, ofs) = self.resolve(ptr)?;
        if ofs + 2 > chip.len() {
            return decode_error("rom: u16 read beyond chip image");
        }
        Ok((u16::from(chip[ofs]) << 8) | u16::from(chip[ofs + 1]))
    }

    pub fn read_u24(&self, ptr: RomPointer) -> Result<u32> {
        let (chip, ofs) = self.resolve(ptr)?;
        if ofs + 3 > chip.len() {
            return decode_error("rom: u24 read beyond chip image");
        }
        Ok((u32::from(chip[ofs]) << 16) | (u32::from(chip[ofs + 1]) << 8) | u32::from(chip[ofs + 2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_pointer_mapping_dcs93() {
        let hw = HwVersion::Dcs93;
        let p = RomPointer::from_parts(3, 0x1234, hw);
        assert_eq!(p.0, (3 << 20) | 0x1234);
        assert_eq!(p.chip_index(hw), 3);
        assert_eq!(p.chip_offset(hw), 0x1234);
    }

    #[test]
    fn verify_pointer_mapping_dcs95() {
        let hw = HwVersion::Dcs95;
        let p = RomPointer::from_parts(5, 0x1F_FFFF, hw);
        assert_eq!(p.chip_index(hw), 5);
        assert_eq!(p.chip_offset(hw), 0x1F_FFFF);
    }

    #[test]
    fn verify_null_pointer() {
        assert!(RomPointer::NULL.is_null());
        assert!(RomPointer(0xFF_0001).is_null());
        assert!(!RomPointer(0x12_3456).is_null());
    }

    #[test]
    fn verify_checksum_split() {
        // even-offset bytes: 0x01, 0x03; odd-offset bytes: 0x02, 0x04
        assert_eq!(checksum(&[0x01, 0x02, 0x03, 0x04]), 0x0406);
        // wrap-around of the per-stream sums
        assert_eq!(checksum(&[0xFF, 0x00, 0x02, 0x00]), 0x0100);
        assert_eq!(checksum(&[]), 0x0000);
    }

    #[test]
    fn verify_romset_resolution() {
        let mut set = RomSet::new(HwVersion::Dcs93);
        set.insert_chip(2, Arc::from(&[0xAA, 0xBB, 0xCC, 0xDD][..])).unwrap();
        set.insert_chip(3, Arc::from(&[0x11, 0x22, 0x33][..])).unwrap();

        assert_eq!(set.read_u8(RomPointer(0x00_0001)).unwrap(), 0xBB);
        assert_eq!(set.read_u16(RomPointer(0x00_0002)).unwrap(), 0xCCDD);
        assert_eq!(set.read_u24(RomPointer(0x10_0000)).unwrap(), 0x11_2233);
        assert!(set.read_u8(RomPointer(0x20_0000)).is_err());
        assert!(set.read_u8(RomPointer::NULL).is_err());
    }
}
