// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for the rollboot bootloader.
//!
//! Usage:
//!   rollboot-upload --port /dev/ttyACM0 status
//!   rollboot-upload --port /dev/ttyACM0 upload firmware.bin --version 4
//!   rollboot-upload --port /dev/ttyACM0 rollback
//!   rollboot-upload --port /dev/ttyACM0 reboot
//!   rollboot-upload --port /dev/ttyUSB0 monitor

mod cli;
mod commands;
mod monitor;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    cli::run(args)
}
