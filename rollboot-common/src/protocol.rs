// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash layout, boot reports and the loader protocol.
//!
//! This module provides types that work in both `no_std` (embedded) and `std` (host) environments.
//! Use the `std` feature for host tools.

#[cfg(feature = "std")]
extern crate alloc;

use serde::{Deserialize, Serialize};

use crate::partition::PartitionTable;

// --- Flash layout constants ---

pub const FLASH_BASE: u32 = 0x1000_0000;
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;

pub const APP_ADDR: u32 = 0x1001_0000;
pub const UPDATE_ADDR: u32 = 0x100B_0000;
pub const ROLLBACK_ADDR: u32 = 0x1015_0000;
/// Two alternating metadata sectors start here.
pub const PARTITION_TABLE_ADDR: u32 = 0x101F_0000;

pub const PARTITION_SIZE: u32 = 640 * 1024; // 640KB per partition

pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const FLASH_PAGE_SIZE: u32 = 256;

pub const PARTITION_TABLE_SLOTS: u32 = 2;
pub const PARTITION_TABLE_SIZE: u32 = PARTITION_TABLE_SLOTS * FLASH_SECTOR_SIZE;

/// Transfer unit of the copy engine (one program page).
pub const BLOCK_SIZE: u32 = FLASH_PAGE_SIZE;
/// Blocks per erase sector.
pub const BLOCKS_PER_PAGE: u32 = FLASH_SECTOR_SIZE / BLOCK_SIZE;
/// Blocks per partition.
pub const PARTITION_BLOCKS: u32 = PARTITION_SIZE / BLOCK_SIZE;

pub const RAM_UPDATE_FLAG_ADDR: u32 = 0x2003_BFF0;
pub const RAM_UPDATE_MAGIC: u32 = 0x0FDA_7E00;

pub const PARTITION_TABLE_MAGIC: u32 = 0xB007_7AB1;

/// Sent raw on the report channel after an update was installed.
pub const HANDSHAKE_INSTALLED: &[u8] = b"/10A22F101";
/// Sent raw on the report channel after the rollback image was restored.
pub const HANDSHAKE_RESTORED: &[u8] = b"/10A291D01";

// --- Software version ---

/// Pack a version as `(major << 12) + (minor << 8) + bugfix`.
pub const fn pack_software_version(major: u32, minor: u32, bugfix: u32) -> u32 {
    (major << 12) + (minor << 8) + bugfix
}

/// Split a packed version back into `(major, minor, bugfix)`.
pub const fn unpack_software_version(packed: u32) -> (u32, u32, u32) {
    (packed >> 12, (packed >> 8) & 0xF, packed & 0xFF)
}

/// Parse one decimal `CARGO_PKG_VERSION_*` component.
pub const fn parse_version_component(digits: &str) -> u32 {
    let bytes = digits.as_bytes();
    let mut value = 0;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// Packed version of the crate this is expanded in.
#[macro_export]
macro_rules! software_version {
    () => {
        $crate::protocol::pack_software_version(
            $crate::protocol::parse_version_component(env!("CARGO_PKG_VERSION_MAJOR")),
            $crate::protocol::parse_version_component(env!("CARGO_PKG_VERSION_MINOR")),
            $crate::protocol::parse_version_component(env!("CARGO_PKG_VERSION_PATCH")),
        )
    };
}

// --- Boot reports (bootloader -> host) ---

/// In-memory phase of the bootloader. Never persisted.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootloaderStatus {
    /// Dispatch in progress.
    Active,
    /// Image ready, about to jump.
    Idle,
    /// No usable image found this boot.
    UnitError,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    None,
    Success,
    ImageNotValid,
    ErasePageError,
    VerifyError,
    CreateRollBackError,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    BootloaderStatus,
    BackupProgress,
    RestoreProgress,
    UpdateProgress,
}

/// Direction of a block copy, as seen by the host.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Application -> RollBack.
    Backup,
    /// RollBack -> Application.
    Restore,
    /// Update -> Application.
    Update,
}

impl ProgressKind {
    /// Infer the copy direction from the source address.
    pub fn from_source(source: u32) -> Self {
        match source {
            APP_ADDR => ProgressKind::Backup,
            ROLLBACK_ADDR => ProgressKind::Restore,
            _ => ProgressKind::Update,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Status {
        state: BootloaderStatus,
        code: StatusCode,
        /// Packed bootloader version, see [`pack_software_version`].
        bootloader_version: u32,
        partitions: PartitionTable,
    },
    Progress {
        kind: ProgressKind,
        percent: u8,
        code: StatusCode,
    },
}

impl Report {
    pub fn kind(&self) -> MessageKind {
        match self {
            Report::Status { .. } => MessageKind::BootloaderStatus,
            Report::Progress { kind, .. } => match kind {
                ProgressKind::Backup => MessageKind::BackupProgress,
                ProgressKind::Restore => MessageKind::RestoreProgress,
                ProgressKind::Update => MessageKind::UpdateProgress,
            },
        }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            Report::Status { code, .. } | Report::Progress { code, .. } => *code,
        }
    }
}

// --- Command / Response protocol (resident loader) ---

/// Maximum data block size for firmware uploads.
pub const MAX_DATA_BLOCK_SIZE: usize = 1024;

#[derive(Serialize, Deserialize, Debug)]
#[allow(clippy::large_enum_variant)] // no_std, no allocator for Box
pub enum Command {
    GetStatus,
    /// Stage a new image into the Update partition.
    StartUpdate {
        size: u32,
        crc32: u32,
        version: u32,
    },
    #[cfg(not(feature = "std"))]
    DataBlock {
        offset: u32,
        data: heapless::Vec<u8, MAX_DATA_BLOCK_SIZE>,
    },
    #[cfg(feature = "std")]
    DataBlock {
        offset: u32,
        data: alloc::vec::Vec<u8>,
    },
    /// Verify the staged image and schedule the install for the next boot.
    FinishUpdate,
    /// Schedule a restore from the RollBack partition for the next boot.
    RequestRollBack,
    Reboot,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum Response {
    Ack(AckStatus),
    Status {
        state: BootloaderStatus,
        loader: LoaderState,
        bootloader_version: u32,
        partitions: PartitionTable,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    CrcError,
    FlashError,
    BadCommand,
    BadState,
    SizeInvalid,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Receiving,
}
