// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Partition state machine and block copy engine for rollboot.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for embedded targets
//! - `std` feature: Enables `std` support for host tools
//! - `embedded` feature: RP2040 flash routines and the application-side metadata API
//! - `defmt` feature: Routes core logging to defmt

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate alloc;

mod log;

pub mod board;
pub mod boot_fsm;
pub mod copy;
pub mod launch;
pub mod metadata;
pub mod partition;
pub mod protocol;

// RP2040 flash access (requires embedded feature)
#[cfg(feature = "embedded")]
pub mod flash;

// Re-export commonly used types
pub use board::{Board, LedPattern};
pub use boot_fsm::Bootloader;
pub use copy::{copy_blocks, CopyError};
pub use launch::{BootConfig, ImageSignature, Launch};
pub use partition::{Partition, PartitionRecord, PartitionStatus, PartitionTable};
pub use protocol::{AckStatus, BootloaderStatus, Command, LoaderState, Report, Response, StatusCode};
pub use protocol::{APP_ADDR, FLASH_BASE, PARTITION_TABLE_ADDR, ROLLBACK_ADDR, UPDATE_ADDR};
pub use protocol::{BLOCK_SIZE, FLASH_PAGE_SIZE, FLASH_SECTOR_SIZE, MAX_DATA_BLOCK_SIZE, PARTITION_SIZE};

#[cfg(feature = "embedded")]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "embedded")]
use embedded_hal::digital::OutputPin;

/// Blink an LED a specified number of times.
#[cfg(feature = "embedded")]
pub fn blink(led: &mut impl OutputPin, timer: &mut impl DelayNs, count: u32, period_ms: u32) {
    for _ in 0..count {
        led.set_high().ok();
        timer.delay_ms(period_ms);
        led.set_low().ok();
        timer.delay_ms(period_ms);
    }
}
