// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::monitor;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "rollboot-upload")]
#[command(about = "Host tool for the rollboot bootloader")]
pub struct Cli {
    /// Serial port: the loader's USB CDC port, or the report UART for `monitor`
    #[arg(short, long)]
    pub port: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the loader state and the partition table
    Status,

    /// Stage a firmware image in the Update partition; it installs on the next reset
    Upload {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Firmware version number (must be non-zero)
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// Restore the backup image on the next reset
    Rollback,

    /// Reboot the device
    Reboot,

    /// Print boot reports and handshakes from the report UART
    Monitor {
        /// Baud rate of the report UART
        #[arg(short, long, default_value = "115200")]
        baud: u32,

        /// Exit after the first install/restore handshake
        #[arg(long)]
        until_handshake: bool,
    },
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Monitor {
        baud,
        until_handshake,
    } = cli.command
    {
        return monitor::run(&cli.port, baud, until_handshake);
    }

    let mut transport = Transport::new(&cli.port)?;

    match cli.command {
        Commands::Status => commands::status(&mut transport),
        Commands::Upload { file, version } => commands::upload(&mut transport, &file, version),
        Commands::Rollback => commands::rollback(&mut transport),
        Commands::Reboot => commands::reboot(&mut transport),
        Commands::Monitor { .. } => unreachable!("handled above"),
    }
}
