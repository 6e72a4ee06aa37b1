// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Capabilities the boot core needs from the hardware.
//!
//! The bootloader binary implements these on the RP2040; tests implement them
//! over simulated flash. Nothing in here touches registers.

use crate::partition::{Partition, PartitionRecord, PartitionStatus};
use crate::protocol::{Report, BLOCK_SIZE};

/// One transfer block.
pub type Block = [u8; BLOCK_SIZE as usize];

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashError;

/// Block-level flash driver. Addresses are absolute (XIP mapped).
pub trait Flash {
    /// Erase the erase sector starting at `addr`.
    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError>;
    fn read_block(&mut self, addr: u32, buf: &mut Block);
    fn write_block(&mut self, addr: u32, buf: &Block);
    /// Re-read the block at `addr` and compare it against `expected`.
    fn verify_block(&mut self, addr: u32, expected: &Block) -> bool;
    fn read_word(&mut self, addr: u32) -> u32;
}

/// Durable per-partition metadata.
pub trait MetadataStore {
    fn get(&mut self, partition: Partition) -> PartitionRecord;
    /// Replace a whole record in one durable write.
    fn set_record(&mut self, partition: Partition, record: PartitionRecord);

    fn set_status(&mut self, partition: Partition, status: PartitionStatus) {
        let record = self.get(partition);
        self.set_record(partition, PartitionRecord { status, ..record });
    }
}

/// Outward status channel.
pub trait ReportSink {
    fn report(&mut self, report: &Report);
    /// Emit a raw handshake token for the external counterpart.
    fn handshake(&mut self, token: &[u8]);
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Blue,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    On,
    Blinking,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPattern {
    pub color: Color,
    pub mode: LedMode,
    pub on_ms: u16,
    pub off_ms: u16,
}

impl LedPattern {
    /// Fast red blink: stay resident, no usable image.
    pub const FAULT: Self = Self {
        color: Color::Red,
        mode: LedMode::Blinking,
        on_ms: 100,
        off_ms: 100,
    };
    /// Solid red: restoring the rollback image.
    pub const RESTORING: Self = Self {
        color: Color::Red,
        mode: LedMode::On,
        on_ms: 500,
        off_ms: 500,
    };
    /// Solid blue: installing an update.
    pub const UPDATING: Self = Self {
        color: Color::Blue,
        mode: LedMode::On,
        on_ms: 500,
        off_ms: 500,
    };
    /// Slow green blink: resident loader waiting for a host.
    pub const LOADER: Self = Self {
        color: Color::Green,
        mode: LedMode::Blinking,
        on_ms: 500,
        off_ms: 500,
    };
}

/// Fire-and-forget status light.
pub trait Indicator {
    fn set_indicator(&mut self, pattern: LedPattern);
}

pub trait Watchdog {
    fn refresh(&mut self);
}

/// The irreversible part of launching an image.
pub trait Handoff {
    /// Return clocks and the peripherals used by the bootloader to reset state.
    fn deinit_peripherals(&mut self);
    /// Stop the system tick and mask every interrupt.
    fn disable_interrupts(&mut self);
    /// Point the exception vector base at `vector_table`.
    fn relocate_vectors(&mut self, vector_table: u32);
    /// Load `stack_pointer` into MSP and branch to `reset_vector`.
    ///
    /// # Safety
    /// Never returns on hardware. The image at the relocated vector table must be executable.
    unsafe fn jump(&mut self, stack_pointer: u32, reset_vector: u32);
}

/// Everything the dispatcher drives.
pub trait Board: Flash + MetadataStore + ReportSink + Indicator + Watchdog + Handoff {}

impl<T> Board for T where T: Flash + MetadataStore + ReportSink + Indicator + Watchdog + Handoff {}
