// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader-side flash helpers on top of the shared ROM routines.

use crc::{Crc, CRC_32_ISO_HDLC};
use rollboot_common::protocol::{APP_ADDR, FLASH_PAGE_SIZE, PARTITION_TABLE_ADDR, PARTITION_TABLE_SIZE};

pub use rollboot_common::flash::{addr_to_offset, flash_erase, flash_program, init};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Only the partitions and the metadata sectors may be rewritten, never the bootloader itself.
pub fn is_writable(abs_addr: u32, len: u32) -> bool {
    abs_addr >= APP_ADDR && abs_addr + len <= PARTITION_TABLE_ADDR + PARTITION_TABLE_SIZE
}

/// Read bytes from an absolute XIP flash address via volatile reads.
pub fn flash_read(abs_addr: u32, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = unsafe { ((abs_addr + i as u32) as *const u8).read_volatile() };
    }
}

pub fn read_word(abs_addr: u32) -> u32 {
    unsafe { (abs_addr as *const u32).read_volatile() }
}

/// True if every byte in `[abs_addr, abs_addr + len)` reads back erased.
pub fn is_erased(abs_addr: u32, len: u32) -> bool {
    (abs_addr..abs_addr + len)
        .step_by(4)
        .all(|addr| read_word(addr) == 0xFFFF_FFFF)
}

/// Compute CRC-32 (ISO HDLC) over flash data at the given absolute address.
pub fn compute_crc32(abs_addr: u32, size: u32) -> u32 {
    let mut digest = CRC32.digest();
    let mut remaining = size as usize;
    let mut addr = abs_addr;
    let mut chunk = [0u8; FLASH_PAGE_SIZE as usize];

    while remaining > 0 {
        let n = remaining.min(chunk.len());
        flash_read(addr, &mut chunk[..n]);
        digest.update(&chunk[..n]);
        addr += n as u32;
        remaining -= n;
    }

    digest.finalize()
}
