// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Resident loader over USB CDC.
//!
//! Stages images into the Update partition and edits the partition table so
//! the boot state machine acts on the next reset:
//! - GetStatus: bootloader phase, loader phase and partition table
//! - StartUpdate: invalidate and erase the Update partition
//! - DataBlock: program sequential image chunks
//! - FinishUpdate: check the CRC, mark Update valid and Application updating
//! - RequestRollBack: mark Application for restore from RollBack
//! - Reboot: restart the device

use crate::board::Rp2040Board;
use crate::flash;
use crate::peripherals::{self, UsbPeripherals};
use crate::usb_transport::UsbTransport;
use rollboot_common::board::{Flash, Indicator, LedPattern, MetadataStore};
use rollboot_common::partition::{blocks_for_size, Partition, PartitionRecord, PartitionStatus};
use rollboot_common::protocol::*;
use rp2040_hal as hal;
use usb_device::class_prelude::UsbBusAllocator;

/// Bring up USB and serve loader commands until a reboot.
pub fn enter_loader_mode(
    board: &mut Rp2040Board,
    mut usb: UsbPeripherals,
    boot_state: BootloaderStatus,
) -> ! {
    defmt::println!("Resident loader, boot state {}", boot_state);

    board.set_indicator(LedPattern::LOADER);

    let usb_bus = peripherals::store_usb_bus(UsbBusAllocator::new(hal::usb::UsbBus::new(
        usb.regs,
        usb.dpram,
        usb.clock,
        true,
        &mut usb.resets,
    )));

    let mut loader = Loader {
        board,
        transport: UsbTransport::new(usb_bus),
        boot_state,
        state: UpdateState::Idle,
    };

    defmt::println!("USB CDC initialized, entering loader loop");
    loader.run()
}

/// Upload session.
#[derive(Clone, Copy)]
enum UpdateState {
    Idle,
    Receiving {
        expected_size: u32,
        expected_crc: u32,
        version: u32,
        bytes_received: u32,
    },
}

struct Loader<'a> {
    board: &'a mut Rp2040Board,
    transport: UsbTransport,
    boot_state: BootloaderStatus,
    state: UpdateState,
}

impl Loader<'_> {
    fn run(&mut self) -> ! {
        loop {
            self.board.service();

            if let Some(cmd) = self.transport.poll_command() {
                self.state = self.handle_command(cmd);
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) -> UpdateState {
        match cmd {
            Command::GetStatus => self.handle_get_status(),
            Command::StartUpdate {
                size,
                crc32,
                version,
            } => self.handle_start_update(size, crc32, version),
            Command::DataBlock { offset, data } => self.handle_data_block(offset, &data),
            Command::FinishUpdate => self.handle_finish_update(),
            Command::RequestRollBack => self.handle_request_rollback(),
            Command::Reboot => self.handle_reboot(),
        }
    }

    fn ack(&mut self, status: AckStatus) {
        self.transport.send(&Response::Ack(status));
    }

    fn handle_get_status(&mut self) -> UpdateState {
        let loader = match self.state {
            UpdateState::Idle => LoaderState::Idle,
            UpdateState::Receiving { .. } => LoaderState::Receiving,
        };
        self.transport.send(&Response::Status {
            state: self.boot_state,
            loader,
            bootloader_version: crate::BOOTLOADER_VERSION,
            partitions: self.board.table(),
        });
        self.state
    }

    fn handle_start_update(&mut self, size: u32, crc32: u32, version: u32) -> UpdateState {
        if !matches!(self.state, UpdateState::Idle) {
            self.ack(AckStatus::BadState);
            return self.state;
        }

        if size == 0 || size > PARTITION_SIZE {
            self.ack(AckStatus::SizeInvalid);
            return self.state;
        }

        // The old content stops being an install candidate before it is erased.
        self.board.set_record(
            Partition::Update,
            PartitionRecord {
                status: PartitionStatus::Updating,
                version: 0,
                block_count: 0,
            },
        );

        let sectors = size.div_ceil(FLASH_SECTOR_SIZE);
        for sector in 0..sectors {
            self.board.service();
            let addr = UPDATE_ADDR + sector * FLASH_SECTOR_SIZE;
            if self.board.erase_page(addr).is_err() {
                defmt::println!("Erase failed at 0x{:08x}", addr);
                self.board.set_status(Partition::Update, PartitionStatus::Corrupt);
                self.ack(AckStatus::FlashError);
                return UpdateState::Idle;
            }
        }

        defmt::println!("Receiving v{}: {} bytes", version, size);
        self.ack(AckStatus::Ok);

        UpdateState::Receiving {
            expected_size: size,
            expected_crc: crc32,
            version,
            bytes_received: 0,
        }
    }

    fn handle_data_block(&mut self, offset: u32, data: &[u8]) -> UpdateState {
        let UpdateState::Receiving {
            expected_size,
            expected_crc,
            version,
            bytes_received,
        } = self.state
        else {
            self.ack(AckStatus::BadState);
            return self.state;
        };

        // Sequential, page aligned, never past the announced size.
        let data_len = data.len() as u32;
        if offset != bytes_received
            || offset % FLASH_PAGE_SIZE != 0
            || bytes_received + data_len > expected_size
        {
            self.ack(AckStatus::BadCommand);
            return self.state;
        }

        for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
            let mut block = [0xFFu8; BLOCK_SIZE as usize];
            block[..chunk.len()].copy_from_slice(chunk);

            let addr = UPDATE_ADDR + offset + i as u32 * BLOCK_SIZE;
            self.board.write_block(addr, &block);
            if !self.board.verify_block(addr, &block) {
                defmt::println!("Program failed at 0x{:08x}", addr);
                self.ack(AckStatus::FlashError);
                return self.state;
            }
        }

        self.ack(AckStatus::Ok);
        UpdateState::Receiving {
            expected_size,
            expected_crc,
            version,
            bytes_received: bytes_received + data_len,
        }
    }

    fn handle_finish_update(&mut self) -> UpdateState {
        let UpdateState::Receiving {
            expected_size,
            expected_crc,
            version,
            bytes_received,
        } = self.state
        else {
            self.ack(AckStatus::BadState);
            return self.state;
        };

        if bytes_received != expected_size {
            self.ack(AckStatus::BadCommand);
            return self.state;
        }

        self.board.service();
        let actual_crc = flash::compute_crc32(UPDATE_ADDR, expected_size);
        if actual_crc != expected_crc {
            defmt::println!(
                "CRC mismatch: expected 0x{:08x}, got 0x{:08x}",
                expected_crc,
                actual_crc
            );
            self.board.set_status(Partition::Update, PartitionStatus::Corrupt);
            self.ack(AckStatus::CrcError);
            return UpdateState::Idle;
        }

        self.board.set_record(
            Partition::Update,
            PartitionRecord {
                status: PartitionStatus::Valid,
                version,
                block_count: blocks_for_size(expected_size),
            },
        );
        self.board.set_status(Partition::Application, PartitionStatus::Updating);

        defmt::println!("Update v{} staged, installs on next reset", version);
        self.ack(AckStatus::Ok);
        UpdateState::Idle
    }

    fn handle_request_rollback(&mut self) -> UpdateState {
        if !matches!(self.state, UpdateState::Idle) || !self.board.table().rollback().is_valid() {
            self.ack(AckStatus::BadState);
            return self.state;
        }

        self.board.set_status(Partition::Application, PartitionStatus::RollBack);
        defmt::println!("Rollback scheduled");
        self.ack(AckStatus::Ok);
        self.state
    }

    fn handle_reboot(&mut self) -> ! {
        self.ack(AckStatus::Ok);
        // Let the ACK reach the host
        self.board.delay_ms(100);
        cortex_m::peripheral::SCB::sys_reset();
    }
}
