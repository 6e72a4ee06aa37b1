// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Rollboot bootloader for RP2040: install/backup/restore state machine with
//! a USB CDC resident loader.

#![no_std]
#![no_main]

mod board;
mod boot;
mod flash;
mod peripherals;
mod update;
mod usb_transport;

use defmt_rtt as _;
use embedded_hal::digital::InputPin;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use rollboot_common::{BootConfig, BootloaderStatus, Bootloader};

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

/// This bootloader's version, packed for status reports.
pub(crate) const BOOTLOADER_VERSION: u32 = rollboot_common::software_version!();

fn boot_config() -> BootConfig {
    BootConfig {
        stay_in_bootloader: cfg!(feature = "stay-in-bootloader"),
        bootloader_version: BOOTLOADER_VERSION,
        ..BootConfig::default()
    }
}

#[entry]
fn main() -> ! {
    defmt::println!("Bootloader init");

    let peripherals::Peripherals {
        led_pin,
        mut gp2,
        timer,
        uart,
        watchdog,
        usb,
    } = peripherals::init();

    flash::init();

    let gp2_low = gp2.is_low().unwrap_or(false);
    let loader_requested = boot::check_update_trigger(gp2_low);

    let mut board = board::Rp2040Board::new(led_pin, timer, uart, watchdog);

    let boot_state = if loader_requested {
        defmt::println!("Resident loader requested");
        BootloaderStatus::Active
    } else {
        let mut bootloader = Bootloader::new(&mut board, boot_config());
        let launch = bootloader.dispatch();
        defmt::println!("Not launching: {}", launch);
        bootloader.state()
    };

    update::enter_loader_mode(&mut board, usb, boot_state)
}
