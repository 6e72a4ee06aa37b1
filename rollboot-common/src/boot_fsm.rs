// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot state machine - pure logic over the [`Board`] capabilities.
//!
//! On every reset the dispatcher reads the Application partition status and
//! runs the matching transition handler. Handlers decide between launching
//! the resident image, installing a staged update (after backing up the
//! current one), restoring the rollback image, or staying resident.
//!
//! Every handler leaves the partition metadata self-consistent before it
//! launches or returns. Copy failures never propagate: they are turned into
//! status codes on the report sink and a fault indication.

use crate::board::{Board, LedPattern};
use crate::copy::copy_blocks;
use crate::launch::{BootConfig, Launch};
use crate::log;
use crate::partition::{Partition, PartitionRecord, PartitionStatus, PartitionTable};
use crate::protocol::{
    BootloaderStatus, Report, StatusCode, APP_ADDR, HANDSHAKE_INSTALLED, HANDSHAKE_RESTORED,
    PARTITION_BLOCKS, ROLLBACK_ADDR, UPDATE_ADDR,
};

/// Outcome of backing up the Application before an install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backup {
    /// Nothing worth saving in the Application partition.
    Skipped,
    Done,
    Failed,
}

/// Single-writer boot context: the board, the partition table and the
/// transient bootloader status.
pub struct Bootloader<'a, B: Board> {
    pub(crate) board: &'a mut B,
    pub(crate) table: PartitionTable,
    pub(crate) state: BootloaderStatus,
    pub(crate) config: BootConfig,
}

impl<'a, B: Board> Bootloader<'a, B> {
    /// Load the partition table from the board's metadata store.
    pub fn new(board: &'a mut B, config: BootConfig) -> Self {
        let mut table = PartitionTable::default();
        for partition in Partition::ALL {
            *table.record_mut(partition) = board.get(partition);
        }

        Self {
            board,
            table,
            state: BootloaderStatus::Active,
            config,
        }
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    pub fn state(&self) -> BootloaderStatus {
        self.state
    }

    /// Route on the Application status. Runs once per boot.
    pub fn dispatch(&mut self) -> Launch {
        self.state = BootloaderStatus::Active;
        self.report_status(StatusCode::None);

        let status = self.table.application().status;
        log::info!("Application status: {}", status);

        match status {
            PartitionStatus::Corrupt => self.handle_corrupt(),
            PartitionStatus::Updating => self.handle_updating(),
            PartitionStatus::RollBack => self.handle_rollback(),
            PartitionStatus::Updated => self.handle_updated(),
            PartitionStatus::Valid | PartitionStatus::Undefined => self.start_application(),
        }
    }

    /// No image transfer: stay resident until the loader stages a new update.
    pub fn handle_corrupt(&mut self) -> Launch {
        log::warn!("Application corrupt, staying in bootloader");
        self.fault();
        Launch::Refused
    }

    /// Restore the Application from the RollBack partition.
    pub fn handle_rollback(&mut self) -> Launch {
        let rollback = self.table.rollback();
        if !rollback.is_valid() {
            log::warn!("Rollback requested but rollback image is {}", rollback.status);
            return self.abort_invalid_source();
        }

        self.report_status(StatusCode::None);
        self.board.set_indicator(LedPattern::RESTORING);

        match copy_blocks(&mut *self.board, rollback.block_count, ROLLBACK_ADDR, APP_ADDR) {
            Ok(()) => {
                self.state = BootloaderStatus::Idle;
                self.commit(
                    Partition::Application,
                    PartitionRecord {
                        status: PartitionStatus::Updated,
                        ..rollback
                    },
                );
                self.report_status(StatusCode::Success);
                self.board.handshake(HANDSHAKE_RESTORED);
                self.start_application()
            }
            Err(_e) => {
                log::error!("Restore failed: {}", _e);
                self.mark_corrupt(Partition::Application);
                self.fault();
                Launch::Refused
            }
        }
    }

    /// Back up the current Application, then install the staged update.
    pub fn handle_updating(&mut self) -> Launch {
        let update = self.table.update();
        if !update.is_valid() {
            log::warn!("Update requested but update image is {}", update.status);
            return self.abort_invalid_source();
        }

        self.report_status(StatusCode::None);
        self.board.set_indicator(LedPattern::UPDATING);

        if self.backup_application() == Backup::Failed {
            return self.revert_and_launch(StatusCode::CreateRollBackError);
        }

        match copy_blocks(&mut *self.board, update.block_count, UPDATE_ADDR, APP_ADDR) {
            Ok(()) => {
                self.board.set_indicator(LedPattern::UPDATING);
                self.state = BootloaderStatus::Idle;
                self.commit(
                    Partition::Application,
                    PartitionRecord {
                        status: PartitionStatus::Updated,
                        ..update
                    },
                );
                self.report_status(StatusCode::Success);
                self.board.handshake(HANDSHAKE_INSTALLED);
                self.start_application()
            }
            Err(_e) if self.table.rollback().is_valid() => {
                log::warn!("Install failed ({}), falling back to rollback image", _e);
                self.set_status(Partition::Application, PartitionStatus::RollBack);
                self.handle_rollback()
            }
            Err(_e) => {
                log::error!("Install failed ({}) and no rollback image", _e);
                self.mark_corrupt(Partition::Application);
                self.fault();
                Launch::Refused
            }
        }
    }

    /// The previous install never confirmed itself: restore the rollback image.
    pub fn handle_updated(&mut self) -> Launch {
        let rollback = self.table.rollback();
        if !rollback.is_valid() {
            log::error!("Unconfirmed application and no rollback image");
            self.mark_corrupt(Partition::Application);
            self.fault();
            return Launch::Refused;
        }

        self.board.set_indicator(LedPattern::RESTORING);

        match copy_blocks(&mut *self.board, rollback.block_count, ROLLBACK_ADDR, APP_ADDR) {
            Ok(()) => {
                self.state = BootloaderStatus::Idle;
                self.commit(
                    Partition::Application,
                    PartitionRecord {
                        status: PartitionStatus::Updated,
                        ..rollback
                    },
                );
                self.report_status(StatusCode::None);
                self.start_application()
            }
            Err(_e) => {
                log::error!("Restore failed: {}", _e);
                self.mark_corrupt(Partition::Application);
                self.fault();
                Launch::Refused
            }
        }
    }

    fn backup_application(&mut self) -> Backup {
        let app = self.table.application();
        if !app.has_version() || !self.image_present() {
            log::info!("No application to back up");
            return Backup::Skipped;
        }

        // An earlier attempt backed up this version and was cut off while
        // installing; the Application partition may already be partly overwritten.
        let rollback = self.table.rollback();
        if app.status == PartitionStatus::Updating
            && rollback.is_valid()
            && rollback.version == app.version
        {
            log::info!("Backup of v{} already present", app.version);
            return Backup::Skipped;
        }

        self.set_status(Partition::RollBack, PartitionStatus::Updating);

        match copy_blocks(&mut *self.board, PARTITION_BLOCKS, APP_ADDR, ROLLBACK_ADDR) {
            Ok(()) => {
                self.commit(
                    Partition::RollBack,
                    PartitionRecord {
                        status: PartitionStatus::Valid,
                        version: app.version,
                        block_count: PARTITION_BLOCKS,
                    },
                );
                Backup::Done
            }
            Err(_e) => {
                log::error!("Backup failed: {}", _e);
                self.mark_corrupt(Partition::RollBack);
                self.fault();
                Backup::Failed
            }
        }
    }

    /// The partition we were asked to copy from is not valid.
    fn abort_invalid_source(&mut self) -> Launch {
        self.state = BootloaderStatus::UnitError;
        let launch = self.revert_and_launch(StatusCode::ImageNotValid);
        self.fault();
        launch
    }

    /// Cancel the pending transition so the next boot does not retry it,
    /// then run whatever is in the Application partition.
    fn revert_and_launch(&mut self, code: StatusCode) -> Launch {
        if self.table.application().has_version() {
            self.set_status(Partition::Application, PartitionStatus::Valid);
        }
        self.report_status(code);
        self.start_application()
    }

    pub(crate) fn image_present(&mut self) -> bool {
        let first_word = self.board.read_word(APP_ADDR);
        self.config.signature.matches(first_word)
    }

    pub(crate) fn report_status(&mut self, code: StatusCode) {
        self.board.report(&Report::Status {
            state: self.state,
            code,
            bootloader_version: self.config.bootloader_version,
            partitions: self.table,
        });
    }

    pub(crate) fn fault(&mut self) {
        self.board.set_indicator(LedPattern::FAULT);
    }

    /// Persist a whole record in one metadata write.
    pub(crate) fn commit(&mut self, partition: Partition, record: PartitionRecord) {
        *self.table.record_mut(partition) = record;
        self.board.set_record(partition, record);
    }

    pub(crate) fn set_status(&mut self, partition: Partition, status: PartitionStatus) {
        let record = self.table.get(partition);
        self.commit(partition, PartitionRecord { status, ..record });
    }

    /// Status and version together, e.g. `Corrupt`/0.
    pub(crate) fn invalidate(&mut self, partition: Partition, status: PartitionStatus) {
        let record = self.table.get(partition);
        self.commit(
            partition,
            PartitionRecord {
                status,
                version: 0,
                ..record
            },
        );
    }

    fn mark_corrupt(&mut self, partition: Partition) {
        self.invalidate(partition, PartitionStatus::Corrupt);
    }
}
