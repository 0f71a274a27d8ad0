//! Fixed-size HID input report and table-driven bit packing
//!
//! Every adapter report is 27 bytes. Layouts are described as tables of
//! [`Field`]s, each one moving a source value into the report through one
//! or more [`BitSlice`]s. Fields that straddle byte boundaries are simply
//! several slices, so each run of bits can be checked on its own.

use std::fmt;

use crate::midi::format_hex;

/// Size of every input report
pub const REPORT_LEN: usize = 27;

/// A contiguous run of bits taken from a source value and placed in one
/// report byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlice {
    /// Lowest bit of the run within the source value
    pub src_shift: u8,
    /// Number of bits in the run (1..=8)
    pub width: u8,
    /// Destination byte within the report
    pub byte: usize,
    /// Position of the run's lowest bit within the destination byte
    pub dst_shift: u8,
}

impl BitSlice {
    pub const fn new(src_shift: u8, width: u8, byte: usize, dst_shift: u8) -> Self {
        Self {
            src_shift,
            width,
            byte,
            dst_shift,
        }
    }

    /// Whole-byte slice: the low 8 bits of the source into `byte`
    pub const fn byte(byte: usize) -> Self {
        Self::new(0, 8, byte, 0)
    }

    /// Single flag into bit `bit` of `byte`
    pub const fn flag(byte: usize, bit: u8) -> Self {
        Self::new(0, 1, byte, bit)
    }

    /// Bits of the destination byte covered by this slice
    pub fn dst_mask(&self) -> u8 {
        let width_mask = ((1u16 << self.width.min(8)) - 1) as u8;
        width_mask << self.dst_shift
    }

    fn place(&self, value: u32) -> u8 {
        let width_mask = (1u32 << self.width.min(8)) - 1;
        let bits = (value >> self.src_shift) & width_mask;
        ((bits << self.dst_shift) & 0xFF) as u8
    }
}

/// How a field combines with what the report already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// OR the bits in; baseline bits stay set
    Or,
    /// Clear the slice's destination bits first, then write
    Assign,
}

/// One named field of a report layout
#[derive(Debug, Clone, Copy)]
pub struct Field<S> {
    pub source: S,
    pub merge: Merge,
    pub slices: &'static [BitSlice],
}

/// A 27-byte HID input report
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Report([u8; REPORT_LEN]);

impl Report {
    pub const fn from_bytes(bytes: [u8; REPORT_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn zeroed() -> Self {
        Self([0; REPORT_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// Byte at `index`, or 0 past the end
    pub fn byte(&self, index: usize) -> u8 {
        self.0.get(index).copied().unwrap_or(0)
    }

    /// Write `value` through every slice of a field
    pub fn apply<S>(&mut self, field: &Field<S>, value: u32) {
        for slice in field.slices {
            let Some(byte) = self.0.get_mut(slice.byte) else {
                continue;
            };
            if field.merge == Merge::Assign {
                *byte &= !slice.dst_mask();
            }
            *byte |= slice.place(value);
        }
    }

    /// Reassemble a value from its slices
    pub fn extract(&self, slices: &[BitSlice]) -> u32 {
        slices.iter().fold(0u32, |acc, slice| {
            let byte = u32::from(self.byte(slice.byte));
            let width_mask = (1u32 << slice.width.min(8)) - 1;
            acc | (((byte >> slice.dst_shift) & width_mask) << slice.src_shift)
        })
    }

    /// Indices of bytes that differ from `other`
    pub fn diff(&self, other: &Report) -> Vec<usize> {
        self.0
            .iter()
            .zip(other.0.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect()
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report[{}]", format_hex(&self.0))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hex(&self.0))
    }
}
