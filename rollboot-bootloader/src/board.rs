// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! The RP2040 board behind the boot core's capability traits.

use crate::boot;
use crate::flash;
use crate::peripherals::{LedPin, ReportUart};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use rollboot_common::board::{
    Block, Flash, FlashError, Handoff, Indicator, LedMode, LedPattern, MetadataStore, ReportSink,
    Watchdog,
};
use rollboot_common::metadata;
use rollboot_common::partition::{Partition, PartitionRecord, PartitionTable};
use rollboot_common::protocol::{Report, BLOCK_SIZE, FLASH_SECTOR_SIZE};
use rp2040_hal as hal;
use rp2040_hal::fugit::ExtU32;

/// Reports are a few dozen bytes once COBS-framed.
const REPORT_BUF_SIZE: usize = 128;

pub struct Rp2040Board {
    led_pin: LedPin,
    timer: hal::Timer,
    uart: ReportUart,
    watchdog: hal::Watchdog,
    pattern: LedPattern,
    table: PartitionTable,
}

impl Rp2040Board {
    /// Takes over the peripherals and starts the watchdog.
    /// [`flash::init`] must have run.
    pub fn new(led_pin: LedPin, timer: hal::Timer, uart: ReportUart, mut watchdog: hal::Watchdog) -> Self {
        watchdog.start(2_000_000u32.micros());

        let mut board = Self {
            led_pin,
            timer,
            uart,
            watchdog,
            pattern: LedPattern {
                mode: LedMode::Off,
                ..LedPattern::LOADER
            },
            table: PartitionTable::default(),
        };
        board.table = metadata::load_table(&mut board);
        board
    }

    /// Partition table as last written.
    pub fn table(&self) -> PartitionTable {
        self.table
    }

    /// Feed the watchdog and advance the LED animation. Call often.
    pub fn service(&mut self) {
        self.watchdog.feed();

        let lit = match self.pattern.mode {
            LedMode::Off => false,
            LedMode::On => true,
            LedMode::Blinking => {
                let now_ms = self.timer.get_counter().ticks() / 1000;
                let period = u64::from(self.pattern.on_ms) + u64::from(self.pattern.off_ms);
                period == 0 || now_ms % period < u64::from(self.pattern.on_ms)
            }
        };

        // The Pico has a single LED; the pattern's color is not rendered.
        if lit {
            self.led_pin.set_high().ok();
        } else {
            self.led_pin.set_low().ok();
        }
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.timer.delay_ms(ms);
    }

    fn persist(&mut self) {
        let table = self.table;
        if metadata::store_table(self, &table).is_err() {
            defmt::println!("Partition table not persisted");
        }
    }
}

impl Flash for Rp2040Board {
    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError> {
        if addr % FLASH_SECTOR_SIZE != 0 || !flash::is_writable(addr, FLASH_SECTOR_SIZE) {
            return Err(FlashError);
        }

        unsafe {
            flash::flash_erase(flash::addr_to_offset(addr), FLASH_SECTOR_SIZE);
        }

        if flash::is_erased(addr, FLASH_SECTOR_SIZE) {
            Ok(())
        } else {
            defmt::println!("Sector 0x{:08x} not blank after erase", addr);
            Err(FlashError)
        }
    }

    fn read_block(&mut self, addr: u32, buf: &mut Block) {
        flash::flash_read(addr, buf);
    }

    fn write_block(&mut self, addr: u32, buf: &Block) {
        if !flash::is_writable(addr, BLOCK_SIZE) {
            // Caught by the read-back in verify_block.
            return;
        }
        unsafe {
            flash::flash_program(flash::addr_to_offset(addr), buf.as_ptr(), buf.len());
        }
    }

    fn verify_block(&mut self, addr: u32, expected: &Block) -> bool {
        let mut actual = [0u8; BLOCK_SIZE as usize];
        flash::flash_read(addr, &mut actual);
        actual == *expected
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        flash::read_word(addr)
    }
}

impl MetadataStore for Rp2040Board {
    fn get(&mut self, partition: Partition) -> PartitionRecord {
        self.table.get(partition)
    }

    fn set_record(&mut self, partition: Partition, record: PartitionRecord) {
        *self.table.record_mut(partition) = record;
        self.persist();
    }
}

impl ReportSink for Rp2040Board {
    fn report(&mut self, report: &Report) {
        let mut buf = [0u8; REPORT_BUF_SIZE];
        if let Ok(frame) = postcard::to_slice_cobs(report, &mut buf) {
            self.uart.write_full_blocking(frame);
        }
    }

    fn handshake(&mut self, token: &[u8]) {
        self.uart.write_full_blocking(token);
        self.uart.write_full_blocking(&[0x00]);
    }
}

impl Indicator for Rp2040Board {
    fn set_indicator(&mut self, pattern: LedPattern) {
        self.pattern = pattern;
        self.service();
    }
}

impl Watchdog for Rp2040Board {
    fn refresh(&mut self) {
        self.service();
    }
}

impl Handoff for Rp2040Board {
    fn deinit_peripherals(&mut self) {
        // Let the UART FIFO drain before it is reset.
        self.timer.delay_ms(10);
        self.led_pin.set_low().ok();
        self.watchdog.disable();

        unsafe {
            boot::reset_peripherals();
            boot::reset_clocks_to_power_on_state();
        }
    }

    fn disable_interrupts(&mut self) {
        unsafe {
            boot::disable_interrupts();
        }
    }

    fn relocate_vectors(&mut self, vector_table: u32) {
        unsafe {
            boot::relocate_vector_table(vector_table);
        }
    }

    unsafe fn jump(&mut self, stack_pointer: u32, reset_vector: u32) {
        boot::jump_to_application(stack_pointer, reset_vector);
    }
}
