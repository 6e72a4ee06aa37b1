// Copyright (c) 2026 ADNT Sarl <info@adnt.io>
// SPDX-License-Identifier: MIT

//! Sample application for the Application partition.
//!
//! Confirms its own first boot after an install, then offers a small USB
//! serial console to inspect the partition table, request a rollback or
//! reboot into the resident loader.

#![no_std]
#![no_main]

use defmt_rtt as _;
use embedded_hal::digital::OutputPin;
use embedded_hal::digital::StatefulOutputPin;
use panic_probe as _;
use rollboot_common::flash;
use rollboot_common::partition::{Partition, PartitionTable};
use rp2040_hal as hal;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;

/// Static storage for UsbBusAllocator (required by usb-device for 'static lifetime).
static mut USB_BUS: Option<UsbBusAllocator<UsbBus>> = None;

/// What the console loop should do after a command.
enum Action {
    Continue,
    RebootToLoader,
    Reboot,
}

fn process_command(line: &str, serial: &mut SerialPort<UsbBus>) -> Action {
    match line.trim() {
        "help" | "?" => {
            let _ = serial.write(b"Available commands:\r\n");
            let _ = serial.write(b"  help     - Show this help\r\n");
            let _ = serial.write(b"  status   - Show the partition table\r\n");
            let _ = serial.write(b"  rollback - Restore the backup image on reboot\r\n");
            let _ = serial.write(b"  bootload - Reboot into the resident loader\r\n");
            let _ = serial.write(b"  reboot   - Reboot normally\r\n");
        }
        "status" => {
            let mut buf = [0u8; 256];
            let len = format_status(&flash::read_partition_table(), &mut buf);
            let _ = serial.write(&buf[..len]);
        }
        "rollback" => {
            if flash::request_rollback() {
                let _ = serial.write(b"Rollback scheduled, rebooting...\r\n");
                return Action::Reboot;
            }
            let _ = serial.write(b"No valid backup image\r\n");
        }
        "bootload" => {
            let _ = serial.write(b"Rebooting to bootloader...\r\n");
            return Action::RebootToLoader;
        }
        "reboot" => {
            let _ = serial.write(b"Rebooting...\r\n");
            return Action::Reboot;
        }
        "" => {}
        _ => {
            let _ = serial.write(b"Unknown command. Type 'help' for available commands.\r\n");
        }
    }

    Action::Continue
}

fn format_status(table: &PartitionTable, buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    struct BufWriter<'b> {
        buf: &'b mut [u8],
        pos: usize,
    }

    impl Write for BufWriter<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let remaining = self.buf.len() - self.pos;
            let to_write = bytes.len().min(remaining);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = write!(writer, "Partitions:\r\n");
    for partition in Partition::ALL {
        let record = table.get(partition);
        let _ = write!(
            writer,
            "  {:?}: {:?} v{} ({} blocks)\r\n",
            partition, record.status, record.version, record.block_count
        );
    }

    writer.pos
}

#[entry]
fn main() -> ! {
    defmt::println!("Application started");

    let mut pac = unsafe { hal::pac::Peripherals::steal() };

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        12_000_000u32,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut led_pin = pins.gpio25.into_push_pull_output();

    rollboot_common::blink(&mut led_pin, &mut timer, 5, 100);

    // Without this the bootloader restores the backup on the next reset.
    if flash::confirm_boot() {
        defmt::println!("Boot confirmed");
    } else {
        defmt::println!("Application not confirmable (status {})", flash::read_partition_table().application().status);
    }

    let usb_bus: &'static UsbBusAllocator<UsbBus> = unsafe {
        (*core::ptr::addr_of_mut!(USB_BUS)).insert(UsbBusAllocator::new(hal::usb::UsbBus::new(
            pac.USBCTRL_REGS,
            pac.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut pac.RESETS,
        )))
    };

    let mut serial = SerialPort::new(usb_bus);
    let mut usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000B))
        .strings(&[StringDescriptors::default()
            .manufacturer("ADNT")
            .product("Rollboot Sample App")
            .serial_number("APP001")])
        .unwrap()
        .device_class(usbd_serial::USB_CLASS_CDC)
        .build();

    defmt::println!("USB CDC initialized, type 'help' on the serial console");

    let mut cmd_buf = [0u8; 64];
    let mut cmd_pos = 0usize;
    let mut blink_counter = 0u32;

    loop {
        usb_dev.poll(&mut [&mut serial]);

        let mut buf = [0u8; 64];
        if let Ok(count) = serial.read(&mut buf) {
            for &byte in &buf[..count] {
                let _ = serial.write(&[byte]);

                if byte == b'\r' || byte == b'\n' {
                    let _ = serial.write(b"\r\n");

                    if cmd_pos > 0 {
                        let action = match core::str::from_utf8(&cmd_buf[..cmd_pos]) {
                            Ok(line) => process_command(line, &mut serial),
                            Err(_) => Action::Continue,
                        };
                        cmd_pos = 0;

                        if !matches!(action, Action::Continue) {
                            // Flush USB before rebooting
                            for _ in 0..100 {
                                usb_dev.poll(&mut [&mut serial]);
                                cortex_m::asm::delay(10_000);
                            }
                        }
                        match action {
                            Action::Continue => {}
                            Action::RebootToLoader => flash::reboot_to_bootloader(),
                            Action::Reboot => flash::reboot(),
                        }
                    }
                } else if byte == 0x7F || byte == 0x08 {
                    if cmd_pos > 0 {
                        cmd_pos -= 1;
                        let _ = serial.write(b"\x08 \x08");
                    }
                } else if cmd_pos < cmd_buf.len() {
                    cmd_buf[cmd_pos] = byte;
                    cmd_pos += 1;
                }
            }
        }

        blink_counter += 1;
        if blink_counter >= 500_000 {
            blink_counter = 0;
            if led_pin.is_set_high().unwrap_or(false) {
                led_pin.set_low().ok();
            } else {
                led_pin.set_high().ok();
            }
        }
    }
}
