// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for resident loader operations.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use rollboot_common::protocol::{AckStatus, Command, Response};
use rollboot_common::{BLOCK_SIZE, MAX_DATA_BLOCK_SIZE, PARTITION_SIZE};

use crate::monitor::{format_version, print_partitions};
use crate::transport::Transport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const CHUNK_SIZE: usize = MAX_DATA_BLOCK_SIZE;

/// Get and display loader status and the partition table.
pub fn status(transport: &mut Transport) -> Result<()> {
    let response = transport.send_recv(&Command::GetStatus)?;

    match response {
        Response::Status {
            state,
            loader,
            bootloader_version,
            partitions,
        } => {
            println!("Bootloader Status:");
            println!("  Version:     {}", format_version(bootloader_version));
            println!("  Boot state:  {:?}", state);
            println!("  Loader:      {:?}", loader);
            println!("Partitions:");
            print_partitions(&partitions);
        }
        Response::Ack(status) => {
            println!("Unexpected ACK response: {:?}", status);
        }
    }

    Ok(())
}

/// Stage a firmware image in the Update partition.
pub fn upload(transport: &mut Transport, file: &Path, version: u32) -> Result<()> {
    if version == 0 {
        bail!("Version 0 is reserved for \"no image\"");
    }

    let firmware = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let size = firmware.len() as u32;
    if firmware.is_empty() || size > PARTITION_SIZE {
        bail!(
            "Firmware is {} bytes; it must be 1..={} bytes",
            size,
            PARTITION_SIZE
        );
    }
    let crc32 = CRC32.checksum(&firmware);

    println!(
        "Firmware: {} ({} bytes, {} blocks, CRC32: 0x{:08x})",
        file.display(),
        size,
        size.div_ceil(BLOCK_SIZE),
        crc32
    );
    println!("Version:  {}", version);
    println!();

    // Erasing up to 640KB can take several seconds
    print!("Starting update (erasing Update partition)... ");
    std::io::stdout().flush()?;

    let response = transport.send_recv_timeout(
        &Command::StartUpdate {
            size,
            crc32,
            version,
        },
        60_000,
    )?;

    match response {
        Response::Ack(AckStatus::Ok) => println!("OK"),
        Response::Ack(AckStatus::SizeInvalid) => bail!("Image does not fit the Update partition"),
        Response::Ack(AckStatus::BadState) => bail!("Loader is busy with another upload"),
        Response::Ack(status) => bail!("StartUpdate failed: {:?}", status),
        _ => bail!("Unexpected response: {:?}", response),
    }

    let pb = ProgressBar::new(size as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut offset = 0u32;
    for chunk in firmware.chunks(CHUNK_SIZE) {
        let response = transport.send_recv(&Command::DataBlock {
            offset,
            data: chunk.to_vec(),
        })?;

        match response {
            Response::Ack(AckStatus::Ok) => {}
            Response::Ack(status) => {
                pb.abandon();
                bail!("DataBlock failed at offset {}: {:?}", offset, status);
            }
            _ => {
                pb.abandon();
                bail!("Unexpected response at offset {}: {:?}", offset, response);
            }
        }

        offset += chunk.len() as u32;
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Upload complete");
    println!();

    print!("Verifying... ");
    std::io::stdout().flush()?;

    let response = transport.send_recv(&Command::FinishUpdate)?;

    match response {
        Response::Ack(AckStatus::Ok) => println!("OK"),
        Response::Ack(AckStatus::CrcError) => {
            bail!("CRC verification failed, the Update partition is marked corrupt")
        }
        Response::Ack(status) => bail!("FinishUpdate failed: {:?}", status),
        _ => bail!("Unexpected response: {:?}", response),
    }

    println!();
    println!("Update staged. The current application is backed up and v{} installed on the next reset.", version);
    println!(
        "Use 'rollboot-upload --port {} reboot' to restart the device.",
        transport.port_name()
    );

    Ok(())
}

/// Schedule a restore of the backup image.
pub fn rollback(transport: &mut Transport) -> Result<()> {
    println!("Requesting rollback...");

    let response = transport.send_recv(&Command::RequestRollBack)?;

    match response {
        Response::Ack(AckStatus::Ok) => {
            println!("Rollback scheduled for the next reset.");
            println!(
                "Use 'rollboot-upload --port {} reboot' to restart the device.",
                transport.port_name()
            );
        }
        Response::Ack(AckStatus::BadState) => {
            bail!("No valid backup image, or an upload is in progress")
        }
        Response::Ack(status) => bail!("RequestRollBack failed: {:?}", status),
        _ => bail!("Unexpected response: {:?}", response),
    }

    Ok(())
}

/// Reboot the device.
pub fn reboot(transport: &mut Transport) -> Result<()> {
    print!("Rebooting device... ");
    std::io::stdout().flush()?;

    let response = transport.send_recv(&Command::Reboot)?;

    match response {
        Response::Ack(AckStatus::Ok) => println!("OK"),
        Response::Ack(status) => bail!("Reboot failed: {:?}", status),
        _ => bail!("Unexpected response: {:?}", response),
    }

    Ok(())
}
