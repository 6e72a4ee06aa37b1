// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command/response link to the resident loader over its USB CDC port.
//!
//! Both directions are postcard messages in COBS frames ending in `0x00`.

use anyhow::{anyhow, bail, Context, Result};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

use rollboot_common::protocol::{Command, Response};

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Responses are small; anything longer is line noise.
const MAX_RESPONSE_LEN: usize = 512;

/// How long stale bytes are drained before a command.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

pub struct Transport {
    port: Box<dyn SerialPort>,
    frame: Vec<u8>,
}

impl Transport {
    pub fn new(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, 115200)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        Ok(Self {
            port,
            frame: Vec::with_capacity(MAX_RESPONSE_LEN + 1),
        })
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Run `f` with the port timeout temporarily set to `timeout`.
    fn with_port_timeout<T>(&mut self, timeout: Duration, f: impl FnOnce(&mut Self) -> T) -> Result<T> {
        let previous = self.port.timeout();
        self.port
            .set_timeout(timeout)
            .context("Failed to set timeout")?;
        let result = f(self);
        let _ = self.port.set_timeout(previous);
        Ok(result)
    }

    /// Discard anything the loader sent before this exchange.
    fn drain(&mut self) -> Result<()> {
        self.with_port_timeout(DRAIN_TIMEOUT, |link| {
            let mut scratch = [0u8; 64];
            while link.port.read(&mut scratch).unwrap_or(0) > 0 {}
        })
    }

    fn send(&mut self, cmd: &Command) -> Result<()> {
        let encoded = postcard::to_stdvec_cobs(cmd).context("Failed to serialize command")?;
        self.port
            .write_all(&encoded)
            .context("Failed to write to serial port")?;
        self.port.flush()?;
        Ok(())
    }

    /// Collect bytes up to and including the next `0x00` delimiter.
    fn read_frame(&mut self) -> Result<()> {
        self.frame.clear();
        let mut byte = [0u8; 1];

        while self.frame.last() != Some(&0) {
            match self.port.read(&mut byte) {
                Ok(1) => self.frame.push(byte[0]),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    bail!("Timeout waiting for response")
                }
                Err(e) => bail!("Serial read error: {}", e),
            }
            if self.frame.len() > MAX_RESPONSE_LEN {
                bail!("Response frame too long ({} bytes without delimiter)", self.frame.len());
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Response> {
        self.read_frame()?;
        let raw_len = self.frame.len();
        let preview = format!("{:02x?}", &self.frame[..raw_len.min(32)]);
        postcard::from_bytes_cobs(&mut self.frame).map_err(|e| {
            anyhow!("Failed to deserialize response: {} (raw {} bytes: {})", e, raw_len, preview)
        })
    }

    /// One command, one response.
    pub fn send_recv(&mut self, cmd: &Command) -> Result<Response> {
        self.drain()?;
        self.send(cmd)?;
        self.receive()
    }

    /// [`Self::send_recv`] for commands that keep the loader busy longer,
    /// such as erasing the Update partition.
    pub fn send_recv_timeout(&mut self, cmd: &Command, timeout_ms: u64) -> Result<Response> {
        self.with_port_timeout(Duration::from_millis(timeout_ms), |link| link.send_recv(cmd))?
    }
}
