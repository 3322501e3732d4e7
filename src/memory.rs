/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! Memory zone permission checks.
//!
//! The Chip-8's 4 KiB address space is split into two zones: the reserved
//! region below `PROG_START`, which holds the built-in font sprites, and the
//! program-addressable region above it.  Programs may read the reserved
//! region (the font sprites are meant to be drawn from), but writing to it or
//! executing from it is an integrity violation.  Every instruction that
//! touches memory or moves the program counter validates its range here
//! before committing any effect.

use std::fmt;

use MEM_SIZE;
use PROG_START;

/// The lowest address a program may write to or execute from.
pub const MIN_PROGRAM_ADDRESS: u16 = PROG_START as u16;
/// The highest address a program may touch.
pub const MAX_PROGRAM_ADDRESS: u16 = (MEM_SIZE - 1) as u16;

/// An error resulting from an access outside the permitted memory zone.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "illegal {} of {} byte(s) at {:#05X}", usage, len, addr)]
pub struct MemoryAccessError {
    /// The base address of the offending range.
    pub addr: u16,
    /// The length of the offending range, in bytes.
    pub len: u16,
    /// The intent behind the access.
    pub usage: MemoryUsage,
}

/// The intent behind a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    Read,
    Write,
    Execute,
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MemoryUsage::Read => write!(f, "read"),
            MemoryUsage::Write => write!(f, "write"),
            MemoryUsage::Execute => write!(f, "execute"),
        }
    }
}

/// Returns whether the `len`-byte range starting at `addr` is legal for the
/// given usage.
///
/// Reads may start anywhere in memory; writes and jumps must stay within the
/// program-addressable zone.  Ranges whose end would wrap past 0xFFFF are
/// always rejected.  `len` must be nonzero.
pub fn is_valid_range(addr: u16, len: u16, usage: MemoryUsage) -> bool {
    debug_assert!(len > 0);

    let end = addr as u32 + len as u32 - 1;
    if end > 0xFFFF {
        return false;
    }
    let end = end as u16;

    match usage {
        MemoryUsage::Read => end <= MAX_PROGRAM_ADDRESS,
        MemoryUsage::Write | MemoryUsage::Execute => {
            addr >= MIN_PROGRAM_ADDRESS && end <= MAX_PROGRAM_ADDRESS
        }
    }
}

/// Like `is_valid_range`, but returns the corresponding error for use with
/// `?`.
pub fn check_range(addr: u16, len: u16, usage: MemoryUsage) -> Result<(), MemoryAccessError> {
    if is_valid_range(addr, len, usage) {
        Ok(())
    } else {
        Err(MemoryAccessError { addr, len, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_table_is_readable_but_not_writable() {
        assert!(is_valid_range(0x000, 80, MemoryUsage::Read));
        assert!(!is_valid_range(0x000, 80, MemoryUsage::Write));
        assert!(!is_valid_range(0x000, 2, MemoryUsage::Execute));
        assert!(!is_valid_range(0x1FF, 2, MemoryUsage::Write));
    }

    #[test]
    fn program_zone_allows_all_usages() {
        for &usage in &[MemoryUsage::Read, MemoryUsage::Write, MemoryUsage::Execute] {
            assert!(is_valid_range(MIN_PROGRAM_ADDRESS, 2, usage));
            assert!(is_valid_range(MAX_PROGRAM_ADDRESS, 1, usage));
        }
    }

    #[test]
    fn ranges_past_the_end_of_memory_are_rejected() {
        assert!(!is_valid_range(MAX_PROGRAM_ADDRESS, 2, MemoryUsage::Read));
        assert!(!is_valid_range(0xFFE, 4, MemoryUsage::Execute));
    }

    #[test]
    fn wrapping_ranges_are_rejected() {
        assert!(!is_valid_range(0xFFFF, 2, MemoryUsage::Read));
        assert!(!is_valid_range(0x8000, 0x8001, MemoryUsage::Read));
    }

    #[test]
    fn check_range_reports_the_offending_range() {
        let err = check_range(0x100, 3, MemoryUsage::Write).unwrap_err();
        assert_eq!(
            err,
            MemoryAccessError {
                addr: 0x100,
                len: 3,
                usage: MemoryUsage::Write,
            }
        );
    }
}
