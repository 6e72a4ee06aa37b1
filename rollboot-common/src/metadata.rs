// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Power-safe persistence of the partition table.
//!
//! The table lives in two metadata sectors that are written alternately.
//! Each image carries a wrapping sequence number and the valid image with the
//! newest sequence wins. A write only ever erases the sector holding the
//! older image, and programs the magic word after the rest of the page, so a
//! reset at any point leaves the previous table readable.

use crate::board::{Block, Flash, FlashError};
use crate::log;
use crate::partition::{PartitionTable, PartitionTableImage};
use crate::protocol::{BLOCK_SIZE, FLASH_SECTOR_SIZE, PARTITION_TABLE_ADDR, PARTITION_TABLE_MAGIC};

/// Start address of each metadata sector.
pub const SLOT_ADDRS: [u32; 2] = [PARTITION_TABLE_ADDR, PARTITION_TABLE_ADDR + FLASH_SECTOR_SIZE];

const MAGIC_LEN: usize = 4;

/// Serial-number comparison: true if `candidate` was written after `current`.
fn is_seq_newer(candidate: u32, current: u32) -> bool {
    candidate != current && candidate.wrapping_sub(current) < 0x8000_0000
}

fn read_slot<F: Flash + ?Sized>(flash: &mut F, addr: u32) -> PartitionTableImage {
    let mut page: Block = [0xFF; BLOCK_SIZE as usize];
    flash.read_block(addr, &mut page);
    PartitionTableImage::from_bytes(&page)
}

fn read_slots<F: Flash + ?Sized>(flash: &mut F) -> [PartitionTableImage; 2] {
    [read_slot(flash, SLOT_ADDRS[0]), read_slot(flash, SLOT_ADDRS[1])]
}

/// Index of the slot holding the newest committed image, if any.
pub fn newest_slot(images: &[PartitionTableImage; 2]) -> Option<usize> {
    match (images[0].is_valid(), images[1].is_valid()) {
        (false, false) => None,
        (true, false) => Some(0),
        (false, true) => Some(1),
        (true, true) if is_seq_newer(images[1].sequence, images[0].sequence) => Some(1),
        (true, true) => Some(0),
    }
}

/// Load the newest committed table. Blank metadata yields the default table.
pub fn load_table<F: Flash + ?Sized>(flash: &mut F) -> PartitionTable {
    let images = read_slots(flash);
    match newest_slot(&images) {
        Some(slot) => PartitionTable::from_image(&images[slot]),
        None => PartitionTable::default(),
    }
}

/// Write `table` into the slot not holding the newest image.
pub fn store_table<F: Flash + ?Sized>(flash: &mut F, table: &PartitionTable) -> Result<(), FlashError> {
    let images = read_slots(flash);
    let (slot, sequence) = match newest_slot(&images) {
        Some(current) => (1 - current, images[current].sequence.wrapping_add(1)),
        None => (0, 1),
    };
    let addr = SLOT_ADDRS[slot];

    let image = table.to_image(sequence);
    let mut page: Block = [0xFF; BLOCK_SIZE as usize];
    page[..PartitionTableImage::SIZE].copy_from_slice(image.as_bytes());

    // Body first, with the magic left erased.
    let mut body = page;
    body[..MAGIC_LEN].fill(0xFF);
    flash.erase_page(addr)?;
    flash.write_block(addr, &body);

    let mut commit: Block = [0xFF; BLOCK_SIZE as usize];
    commit[..MAGIC_LEN].copy_from_slice(&PARTITION_TABLE_MAGIC.to_le_bytes());
    flash.write_block(addr, &commit);

    if flash.verify_block(addr, &page) {
        Ok(())
    } else {
        log::error!("Partition table write failed at 0x{:08x}", addr);
        Err(FlashError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(sequence: u32) -> PartitionTableImage {
        PartitionTable::default().to_image(sequence)
    }

    #[test]
    fn test_seq_newer_handles_wraparound() {
        assert!(is_seq_newer(2, 1));
        assert!(!is_seq_newer(1, 2));
        assert!(!is_seq_newer(5, 5));
        assert!(is_seq_newer(0, u32::MAX));
        assert!(!is_seq_newer(u32::MAX, 0));
    }

    #[test]
    fn test_newest_slot_prefers_higher_sequence() {
        assert_eq!(newest_slot(&[image(3), image(4)]), Some(1));
        assert_eq!(newest_slot(&[image(7), image(6)]), Some(0));
        assert_eq!(newest_slot(&[image(0), image(u32::MAX)]), Some(0));
    }

    #[test]
    fn test_newest_slot_ignores_uncommitted_image() {
        let blank = PartitionTableImage::blank();
        assert_eq!(newest_slot(&[image(3), blank]), Some(0));
        assert_eq!(newest_slot(&[blank, image(3)]), Some(1));
        assert_eq!(newest_slot(&[blank, blank]), None);

        let mut torn = image(9);
        torn.magic = 0xFFFF_FFFF;
        assert_eq!(newest_slot(&[image(8), torn]), Some(0));
    }
}
