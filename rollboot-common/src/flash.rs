// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RP2040 flash access shared by the bootloader and applications.
//!
//! Erase and program go through the boot ROM and need XIP torn down:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! Nothing may execute from flash during steps 1-5, so the two entry points
//! live in `.data` (copied to RAM at startup) and only call ROM function
//! pointers resolved beforehand by [`init`]. Both bootloader and application
//! run in place from flash.
//!
//! On top of that, the partition metadata API for applications:
//! - Confirm the first boot after an install (Updated -> Valid)
//! - Ask the bootloader to restore the rollback image
//! - Reboot into the bootloader's resident loader

use crate::board::{Block, Flash, FlashError};
use crate::metadata;
use crate::partition::{Partition, PartitionStatus, PartitionTable};
use crate::protocol::{
    APP_ADDR, BLOCK_SIZE, FLASH_BASE, FLASH_SECTOR_SIZE, PARTITION_TABLE_ADDR,
    PARTITION_TABLE_SIZE, RAM_UPDATE_FLAG_ADDR, RAM_UPDATE_MAGIC,
};

type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// 4K sector erase command of the QSPI flash.
const SECTOR_ERASE_CMD: u8 = 0x20;

/// Look up a ROM function by its two-character tag.
/// ROM table pointer at 0x14 and lookup function at 0x18 are 16-bit halfword pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

/// Resolve the ROM flash routines. Must run while XIP is active, before
/// [`flash_erase`] or [`flash_program`]. Calling it again is harmless.
pub fn init() {
    unsafe {
        ROM_CONNECT_INTERNAL_FLASH =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
        ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
        ROM_FLASH_RANGE_ERASE =
            core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
        ROM_FLASH_RANGE_PROGRAM =
            core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
        ROM_FLASH_FLUSH_CACHE = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
        ROM_FLASH_ENTER_CMD_XIP =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
    }
}

/// Convert an absolute XIP flash address to a flash-relative offset.
pub fn addr_to_offset(abs_addr: u32) -> u32 {
    abs_addr - FLASH_BASE
}

/// Erase `size` bytes (whole sectors) at the given flash-relative offset.
///
/// # Safety
/// [`init`] must have been called first. Must not overlap running code.
#[link_section = ".data"]
#[inline(never)]
pub unsafe fn flash_erase(offset: u32, size: u32) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(offset, size as usize, FLASH_SECTOR_SIZE, SECTOR_ERASE_CMD);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// Program flash at the given flash-relative offset. `len` must be a multiple of 256.
///
/// # Safety
/// [`init`] must have been called first. `data` must be valid for `len` bytes.
#[link_section = ".data"]
#[inline(never)]
pub unsafe fn flash_program(offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_PROGRAM(offset, data, len);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// ROM-backed [`Flash`] over the absolute XIP address space.
///
/// Only sectors from the Application partition up to the end of the metadata
/// sectors may be erased.
pub struct RomFlash(());

impl RomFlash {
    pub fn new() -> Self {
        init();
        Self(())
    }
}

impl Default for RomFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl Flash for RomFlash {
    fn erase_page(&mut self, addr: u32) -> Result<(), FlashError> {
        if addr % FLASH_SECTOR_SIZE != 0
            || addr < APP_ADDR
            || addr + FLASH_SECTOR_SIZE > PARTITION_TABLE_ADDR + PARTITION_TABLE_SIZE
        {
            return Err(FlashError);
        }
        unsafe {
            flash_erase(addr_to_offset(addr), FLASH_SECTOR_SIZE);
        }
        Ok(())
    }

    fn read_block(&mut self, addr: u32, buf: &mut Block) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ((addr + i as u32) as *const u8).read_volatile() };
        }
    }

    fn write_block(&mut self, addr: u32, buf: &Block) {
        if addr < APP_ADDR || addr + BLOCK_SIZE > PARTITION_TABLE_ADDR + PARTITION_TABLE_SIZE {
            return;
        }
        unsafe {
            flash_program(addr_to_offset(addr), buf.as_ptr(), buf.len());
        }
    }

    fn verify_block(&mut self, addr: u32, expected: &Block) -> bool {
        let mut actual = [0u8; BLOCK_SIZE as usize];
        self.read_block(addr, &mut actual);
        actual == *expected
    }

    fn read_word(&mut self, addr: u32) -> u32 {
        unsafe { (addr as *const u32).read_volatile() }
    }
}

/// Read the partition table. Blank or foreign content yields all-`Undefined`.
pub fn read_partition_table() -> PartitionTable {
    metadata::load_table(&mut RomFlash::new())
}

/// Persist the partition table into the older of the two metadata sectors.
pub fn write_partition_table(table: &PartitionTable) -> Result<(), FlashError> {
    metadata::store_table(&mut RomFlash::new(), table)
}

/// Confirm the current boot to the bootloader.
/// Marks an `Updated` application `Valid`, so the next reset does not restore the rollback image.
///
/// Returns true if the application is (now) `Valid` on flash.
pub fn confirm_boot() -> bool {
    let mut table = read_partition_table();

    match table.application().status {
        PartitionStatus::Valid => true,
        PartitionStatus::Updated => {
            table.record_mut(Partition::Application).status = PartitionStatus::Valid;
            write_partition_table(&table).is_ok()
        }
        _ => false,
    }
}

/// Ask the bootloader to restore the rollback image on the next reset.
///
/// Returns false if there is no valid rollback image or the write failed.
pub fn request_rollback() -> bool {
    let mut table = read_partition_table();
    if !table.rollback().is_valid() {
        return false;
    }

    table.record_mut(Partition::Application).status = PartitionStatus::RollBack;
    write_partition_table(&table).is_ok()
}

/// Reboot to the bootloader's resident loader.
///
/// This writes the magic flag to RAM and triggers a system reset.
/// The bootloader will detect the flag and skip the boot state machine.
pub fn reboot_to_bootloader() -> ! {
    unsafe {
        (RAM_UPDATE_FLAG_ADDR as *mut u32).write_volatile(RAM_UPDATE_MAGIC);
    }

    // Small delay to ensure write completes
    cortex_m::asm::delay(100_000);

    cortex_m::peripheral::SCB::sys_reset();
}

/// Reboot normally.
pub fn reboot() -> ! {
    cortex_m::peripheral::SCB::sys_reset();
}
