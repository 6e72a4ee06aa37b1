// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Partition roles, their persisted status, and the partition table.
//!
//! The table is plain data. It is read once at boot and then mutated only by
//! the transition handlers, which keep it in lock-step with the durable
//! metadata store (see [`crate::board::MetadataStore`]).

use serde::{Deserialize, Serialize};

use crate::protocol::{
    APP_ADDR, BLOCK_SIZE, PARTITION_TABLE_MAGIC, ROLLBACK_ADDR, UPDATE_ADDR,
};

/// Logical role of a flash partition.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    /// The currently runnable image.
    Application,
    /// An incoming image staged by the loader.
    Update,
    /// Backup of the previously valid application.
    RollBack,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Application, Partition::Update, Partition::RollBack];

    /// Flash start address of this partition (fixed per role).
    pub const fn base_address(self) -> u32 {
        match self {
            Partition::Application => APP_ADDR,
            Partition::Update => UPDATE_ADDR,
            Partition::RollBack => ROLLBACK_ADDR,
        }
    }

    const fn index(self) -> usize {
        match self {
            Partition::Application => 0,
            Partition::Update => 1,
            Partition::RollBack => 2,
        }
    }
}

/// Persisted lifecycle status of a partition.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PartitionStatus {
    /// Never written (metadata blank).
    Undefined = 0xFF,
    /// Image checked and runnable.
    Valid = 0x01,
    /// A copy into this partition is in progress.
    Updating = 0x02,
    /// Application must be restored from the RollBack partition.
    RollBack = 0x03,
    /// Installed but not yet confirmed by a successful first run.
    Updated = 0x04,
    /// No recovery path available.
    Corrupt = 0x05,
}

impl PartitionStatus {
    /// Decode a persisted status byte.
    ///
    /// Unknown bytes decode to `Corrupt`: a damaged status must never be
    /// mistaken for a launchable one.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0xFF => PartitionStatus::Undefined,
            0x01 => PartitionStatus::Valid,
            0x02 => PartitionStatus::Updating,
            0x03 => PartitionStatus::RollBack,
            0x04 => PartitionStatus::Updated,
            _ => PartitionStatus::Corrupt,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Metadata of a single partition.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRecord {
    pub status: PartitionStatus,
    /// `0` means no valid image was ever recorded.
    pub version: u32,
    /// Number of `BLOCK_SIZE` blocks composing the image.
    pub block_count: u32,
}

impl PartitionRecord {
    pub const BLANK: Self = Self {
        status: PartitionStatus::Undefined,
        version: 0,
        block_count: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.status == PartitionStatus::Valid
    }

    pub fn has_version(&self) -> bool {
        self.version > 0
    }
}

impl Default for PartitionRecord {
    fn default() -> Self {
        Self::BLANK
    }
}

/// Number of blocks needed to hold `size` bytes.
pub fn blocks_for_size(size: u32) -> u32 {
    size.div_ceil(BLOCK_SIZE)
}

/// Status, version and size of all three partitions.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionTable {
    records: [PartitionRecord; 3],
}

impl PartitionTable {
    pub const fn new(
        application: PartitionRecord,
        update: PartitionRecord,
        rollback: PartitionRecord,
    ) -> Self {
        Self {
            records: [application, update, rollback],
        }
    }

    pub fn get(&self, partition: Partition) -> PartitionRecord {
        self.records[partition.index()]
    }

    pub fn record_mut(&mut self, partition: Partition) -> &mut PartitionRecord {
        &mut self.records[partition.index()]
    }

    pub fn application(&self) -> PartitionRecord {
        self.get(Partition::Application)
    }

    pub fn update(&self) -> PartitionRecord {
        self.get(Partition::Update)
    }

    pub fn rollback(&self) -> PartitionRecord {
        self.get(Partition::RollBack)
    }

    /// Encode for persistence as generation `sequence`.
    pub fn to_image(&self, sequence: u32) -> PartitionTableImage {
        let mut image = PartitionTableImage::blank();
        image.magic = PARTITION_TABLE_MAGIC;
        image.sequence = sequence;
        for (slot, record) in image.records.iter_mut().zip(self.records.iter()) {
            *slot = RecordImage {
                status: record.status.as_byte(),
                _reserved: [0; 3],
                version: record.version,
                block_count: record.block_count,
            };
        }
        image
    }

    /// Decode a persisted image. A blank or foreign sector yields the default table.
    pub fn from_image(image: &PartitionTableImage) -> Self {
        if !image.is_valid() {
            return Self::default();
        }

        let mut table = Self::default();
        for (record, slot) in table.records.iter_mut().zip(image.records.iter()) {
            *record = PartitionRecord {
                status: PartitionStatus::from_byte(slot.status),
                version: slot.version,
                block_count: slot.block_count,
            };
        }
        table
    }
}

// --- Persisted layout (repr(C), 44 bytes, little endian) ---

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordImage {
    pub status: u8,
    pub _reserved: [u8; 3],
    pub version: u32,
    pub block_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionTableImage {
    /// Written last; the image does not count until it is present.
    pub magic: u32,
    /// Generation counter, incremented (wrapping) on every write.
    pub sequence: u32,
    pub records: [RecordImage; 3],
}

const _: () = assert!(core::mem::size_of::<PartitionTableImage>() == PartitionTableImage::SIZE);

impl PartitionTableImage {
    pub const SIZE: usize = 44;

    /// An image as read from erased flash.
    pub const fn blank() -> Self {
        let record = RecordImage {
            status: 0xFF,
            _reserved: [0xFF; 3],
            version: 0xFFFF_FFFF,
            block_count: 0xFFFF_FFFF,
        };
        Self {
            magic: 0xFFFF_FFFF,
            sequence: 0xFFFF_FFFF,
            records: [record; 3],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PARTITION_TABLE_MAGIC
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const Self as *const u8,
                core::mem::size_of::<Self>(),
            )
        }
    }

    /// Rebuild an image from bytes read back from storage.
    /// Fewer than [`Self::SIZE`] bytes yield a blank image.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut image = Self::blank();
        if bytes.len() < Self::SIZE {
            return image;
        }

        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        image.magic = word(0);
        image.sequence = word(4);
        for (i, record) in image.records.iter_mut().enumerate() {
            let at = 8 + i * 12;
            record.status = bytes[at];
            record._reserved = [bytes[at + 1], bytes[at + 2], bytes[at + 3]];
            record.version = word(at + 4);
            record.block_count = word(at + 8);
        }
        image
    }
}
