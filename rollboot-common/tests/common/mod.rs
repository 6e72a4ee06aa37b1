// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Simulated board for host tests: 2MB of flash in RAM plus recorders for
//! everything the boot core emits.

#![allow(dead_code)]

use rollboot_common::board::{
    Block, Flash, FlashError, Handoff, Indicator, LedPattern, MetadataStore, ReportSink, Watchdog,
};
use rollboot_common::partition::{Partition, PartitionRecord, PartitionStatus, PartitionTable};
use rollboot_common::protocol::{
    ProgressKind, Report, StatusCode, BLOCK_SIZE, FLASH_BASE, FLASH_SECTOR_SIZE, FLASH_SIZE,
};

/// Initial stack pointer used for images that pass the signature check.
pub const GOOD_SP: u32 = 0x2004_2000;

pub struct SimBoard {
    flash: Vec<u8>,
    pub table: PartitionTable,

    /// Erase of the sector at this address fails.
    pub fail_erase_at: Option<u32>,
    /// The next write to this address stores corrupted data (one shot).
    pub corrupt_write_at: Option<u32>,

    pub erased: Vec<u32>,
    pub written: Vec<u32>,
    pub reports: Vec<Report>,
    pub handshakes: Vec<Vec<u8>>,
    pub indicator: Vec<LedPattern>,
    pub refreshes: u32,
    pub metadata_writes: u32,

    pub deinit: bool,
    pub interrupts_disabled: bool,
    pub vector_table: Option<u32>,
    pub jumped: Option<(u32, u32)>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            flash: vec![0xFF; FLASH_SIZE as usize],
            table: PartitionTable::default(),
            fail_erase_at: None,
            corrupt_write_at: None,
            erased: Vec::new(),
            written: Vec::new(),
            reports: Vec::new(),
            handshakes: Vec::new(),
            indicator: Vec::new(),
            refreshes: 0,
            metadata_writes: 0,
            deinit: false,
            interrupts_disabled: false,
            vector_table: None,
            jumped: None,
        }
    }

    fn offset(addr: u32) -> usize {
        (addr - FLASH_BASE) as usize
    }

    pub fn bytes(&self, addr: u32, len: usize) -> &[u8] {
        let at = Self::offset(addr);
        &self.flash[at..at + len]
    }

    pub fn fill(&mut self, addr: u32, data: &[u8]) {
        let at = Self::offset(addr);
        self.flash[at..at + data.len()].copy_from_slice(data);
    }

    /// Write an image of `blocks` blocks with a plausible vector table.
    /// Every other byte is derived from `tag` so images can be told apart.
    pub fn load_image(&mut self, addr: u32, blocks: u32, tag: u8) {
        let len = (blocks * BLOCK_SIZE) as usize;
        let mut image: Vec<u8> = (0..len).map(|i| tag ^ (i as u8)).collect();
        image[0..4].copy_from_slice(&GOOD_SP.to_le_bytes());
        image[4..8].copy_from_slice(&(addr + 0x101).to_le_bytes());
        self.fill(addr, &image);
    }

    pub fn seed_record(&mut self, partition: Partition, status: PartitionStatus, version: u32, block_count: u32) {
        *self.table.record_mut(partition) = PartitionRecord {
            status,
            version,
            block_count,
        };
    }

    pub fn record(&self, partition: Partition) -> PartitionRecord {
        self.table.get(partition)
    }

    pub fn status_codes(&self) -> Vec<StatusCode> {
        self.reports
            .iter()
            .filter(|r| matches!(r, Report::Status { .. }))
            .map(|r| r.code())
            .collect()
    }

    pub fn progress(&self, kind: ProgressKind) -> Vec<(u8, StatusCode)> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                Report::Progress {
                    kind: k,
                    percent,
                    code,
                } if *k == kind => Some((*percent, *code)),
                _ => None,
            })
            .collect()
    }

    pub fn last_indicator(&self) -> Option<LedPattern> {
        self.indicator.last().copied()
    }
}

impl Flash for SimBoard {
    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError> {
        if self.fail_erase_at == Some(addr) {
            return Err(FlashError);
        }
        assert_eq!(addr % FLASH_SECTOR_SIZE, 0, "unaligned erase at 0x{:08x}", addr);
        let at = Self::offset(addr);
        self.flash[at..at + FLASH_SECTOR_SIZE as usize].fill(0xFF);
        self.erased.push(addr);
        Ok(())
    }

    fn read_block(&mut self, addr: u32, buf: &mut Block) {
        buf.copy_from_slice(self.bytes(addr, BLOCK_SIZE as usize));
    }

    fn write_block(&mut self, addr: u32, buf: &Block) {
        let at = Self::offset(addr);
        let dst = &mut self.flash[at..at + BLOCK_SIZE as usize];
        // NOR flash can only clear bits.
        for (d, s) in dst.iter_mut().zip(buf.iter()) {
            *d &= *s;
        }
        if self.corrupt_write_at == Some(addr) {
            self.corrupt_write_at = None;
            dst[0] ^= 0x5A;
            dst[1] ^= 0xA5;
        }
        self.written.push(addr);
    }

    fn verify_block(&mut self, addr: u32, expected: &Block) -> bool {
        self.bytes(addr, BLOCK_SIZE as usize) == &expected[..]
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        let b = self.bytes(addr, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl MetadataStore for SimBoard {
    fn get(&mut self, partition: Partition) -> PartitionRecord {
        self.table.get(partition)
    }

    fn set_record(&mut self, partition: Partition, record: PartitionRecord) {
        *self.table.record_mut(partition) = record;
        self.metadata_writes += 1;
    }
}

impl ReportSink for SimBoard {
    fn report(&mut self, report: &Report) {
        self.reports.push(*report);
    }

    fn handshake(&mut self, token: &[u8]) {
        self.handshakes.push(token.to_vec());
    }
}

impl Indicator for SimBoard {
    fn set_indicator(&mut self, pattern: LedPattern) {
        self.indicator.push(pattern);
    }
}

impl Watchdog for SimBoard {
    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

impl Handoff for SimBoard {
    fn deinit_peripherals(&mut self) {
        self.deinit = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_disabled = true;
    }

    fn relocate_vectors(&mut self, vector_table: u32) {
        self.vector_table = Some(vector_table);
    }

    unsafe fn jump(&mut self, stack_pointer: u32, reset_vector: u32) {
        assert!(self.jumped.is_none(), "jumped twice");
        self.jumped = Some((stack_pointer, reset_vector));
    }
}
