// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! USB CDC transport for the resident loader, COBS-framed postcard messages.

use heapless::Vec;
use rollboot_common::protocol::{Command, Response};
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

/// Largest encoded command: a full data block plus framing overhead.
const RX_BUF_SIZE: usize = 2048;
const TX_BUF_SIZE: usize = 256;

/// Accumulates bytes up to a COBS delimiter.
struct FrameBuffer {
    bytes: Vec<u8, RX_BUF_SIZE>,
    overflowed: bool,
}

impl FrameBuffer {
    const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte. Returns the decoded command when `byte` closes a frame.
    fn push(&mut self, byte: u8) -> Option<Command> {
        if byte != 0x00 {
            if self.bytes.push(byte).is_err() {
                self.overflowed = true;
            }
            return None;
        }

        let command = if self.overflowed || self.bytes.is_empty() {
            None
        } else {
            postcard::from_bytes_cobs::<Command>(&mut self.bytes).ok()
        };
        self.bytes.clear();
        self.overflowed = false;
        command
    }
}

pub struct UsbTransport {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
    frame: FrameBuffer,
}

impl UsbTransport {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Self {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2E8A, 0x000A))
            .strings(&[StringDescriptors::default()
                .manufacturer("ADNT")
                .product("Rollboot Loader")
                .serial_number("0001")])
            .unwrap()
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Self {
            serial,
            usb_dev,
            frame: FrameBuffer::new(),
        }
    }

    /// Poll the USB device and return the next complete command, if any.
    /// Must be called frequently.
    pub fn poll_command(&mut self) -> Option<Command> {
        if !self.usb_dev.poll(&mut [&mut self.serial]) {
            return None;
        }

        let mut tmp = [0u8; 64];
        let count = match self.serial.read(&mut tmp) {
            Ok(count) => count,
            Err(_) => return None,
        };

        // Request/response: the host never has two commands in flight.
        let mut command = None;
        for &byte in &tmp[..count] {
            if let Some(cmd) = self.frame.push(byte) {
                command.get_or_insert(cmd);
            }
        }
        command
    }

    /// Send a response as a COBS-framed postcard message.
    pub fn send(&mut self, resp: &Response) {
        let mut buf = [0u8; TX_BUF_SIZE];
        let Ok(encoded) = postcard::to_slice_cobs(resp, &mut buf) else {
            return;
        };

        let mut offset = 0;
        while offset < encoded.len() {
            match self.serial.write(&encoded[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    self.usb_dev.poll(&mut [&mut self.serial]);
                }
                Err(_) => break,
            }
        }
    }
}
