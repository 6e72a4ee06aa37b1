// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Application launcher: gate on metadata and image signature, then hand off.

use crate::board::Board;
use crate::boot_fsm::Bootloader;
use crate::log;
use crate::partition::{Partition, PartitionStatus};
use crate::protocol::{StatusCode, APP_ADDR};

/// Coarse "there is code here" check on the first vector table word.
///
/// A Cortex-M image starts with its initial stack pointer, which must land
/// in SRAM. Erased flash (`0xFFFF_FFFF`) and zeroed flash both fail.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSignature {
    pub mask: u32,
    pub expected: u32,
}

impl ImageSignature {
    /// Initial stack pointer within the RP2040 SRAM window (0x2000_0000..0x2008_0000).
    pub const RP2040_SRAM: Self = Self {
        mask: 0xFFF8_0000,
        expected: 0x2000_0000,
    };

    pub fn matches(&self, first_word: u32) -> bool {
        first_word & self.mask == self.expected
    }
}

impl Default for ImageSignature {
    fn default() -> Self {
        Self::RP2040_SRAM
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BootConfig {
    /// Never launch; stay in the bootloader (build-time switch).
    pub stay_in_bootloader: bool,
    pub signature: ImageSignature,
    /// Packed version carried in status reports.
    pub bootloader_version: u32,
}

/// What happened when a launch was attempted.
///
/// On hardware `Jumped` is never observed: control does not come back.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Launch {
    Jumped,
    StayResident,
    Refused,
}

impl<B: Board> Bootloader<'_, B> {
    /// Validate the Application partition and jump into it.
    pub fn start_application(&mut self) -> Launch {
        if self.config.stay_in_bootloader {
            log::info!("Stay-in-bootloader set, not launching");
            return Launch::StayResident;
        }

        if !self.table.application().has_version() {
            log::warn!("No application version recorded");
            self.set_status(Partition::Application, PartitionStatus::Undefined);
            self.fault();
            self.report_status(StatusCode::ImageNotValid);
            return Launch::Refused;
        }

        let initial_sp = self.board.read_word(APP_ADDR);
        if !self.config.signature.matches(initial_sp) {
            log::warn!("No image at 0x{:08x} (sp=0x{:08x})", APP_ADDR, initial_sp);
            self.invalidate(Partition::Application, PartitionStatus::Undefined);
            self.report_status(StatusCode::ImageNotValid);
            self.fault();
            return Launch::Refused;
        }

        let reset_vector = self.board.read_word(APP_ADDR + 4);
        log::info!(
            "Jumping to application v{}: sp=0x{:08x} reset=0x{:08x}",
            self.table.application().version,
            initial_sp,
            reset_vector
        );

        self.board.deinit_peripherals();
        self.board.disable_interrupts();
        self.board.relocate_vectors(APP_ADDR);
        unsafe {
            self.board.jump(initial_sp, reset_vector);
        }

        Launch::Jumped
    }
}
