// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot report monitor for the bootloader's report UART.
//!
//! The bootloader writes COBS-framed postcard `Report`s and, after an install
//! or a restore, a raw handshake token. Both are terminated by `0x00`.

use std::io::Read;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use rollboot_common::partition::{Partition, PartitionTable};
use rollboot_common::protocol::{
    unpack_software_version, ProgressKind, Report, StatusCode, HANDSHAKE_INSTALLED,
    HANDSHAKE_RESTORED,
};

/// Frames longer than this are discarded (a report is a few dozen bytes).
const MAX_FRAME_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Installed,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Report(Report),
    Handshake(Handshake),
    /// A delimited frame that is neither a report nor a handshake.
    Garbage(usize),
}

/// Splits the UART byte stream into events.
#[derive(Default)]
pub struct FrameDecoder {
    frame: Vec<u8>,
    overflowed: bool,
}

impl FrameDecoder {
    pub fn push(&mut self, byte: u8) -> Option<Event> {
        if byte != 0x00 {
            if self.frame.len() < MAX_FRAME_LEN {
                self.frame.push(byte);
            } else {
                self.overflowed = true;
            }
            return None;
        }

        let event = if self.overflowed {
            Some(Event::Garbage(MAX_FRAME_LEN))
        } else if self.frame.is_empty() {
            None
        } else {
            Some(decode_frame(&mut self.frame))
        };
        self.frame.clear();
        self.overflowed = false;
        event
    }
}

fn decode_frame(frame: &mut Vec<u8>) -> Event {
    if frame.as_slice() == HANDSHAKE_INSTALLED {
        return Event::Handshake(Handshake::Installed);
    }
    if frame.as_slice() == HANDSHAKE_RESTORED {
        return Event::Handshake(Handshake::Restored);
    }

    let len = frame.len();
    // The decoder wants the delimiter back.
    frame.push(0x00);
    match postcard::from_bytes_cobs::<Report>(frame) {
        Ok(report) => Event::Report(report),
        Err(_) => Event::Garbage(len),
    }
}

/// Render a packed bootloader version as `major.minor.bugfix`.
pub fn format_version(packed: u32) -> String {
    let (major, minor, bugfix) = unpack_software_version(packed);
    format!("{}.{}.{}", major, minor, bugfix)
}

/// Print the partition table, one line per partition.
pub fn print_partitions(table: &PartitionTable) {
    for partition in Partition::ALL {
        let record = table.get(partition);
        println!(
            "  {:<12} {:<10} v{:<6} {} blocks",
            format!("{:?}", partition),
            format!("{:?}", record.status),
            record.version,
            record.block_count
        );
    }
}

/// Follow the report UART until interrupted, or until a handshake with `until_handshake`.
pub fn run(port_name: &str, baud: u32, until_handshake: bool) -> Result<()> {
    let mut port = serialport::new(port_name, baud)
        .timeout(Duration::from_millis(500))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port_name))?;

    println!("Monitoring {} at {} baud (Ctrl-C to stop)", port_name, baud);

    let mut decoder = FrameDecoder::default();
    let mut bar: Option<(ProgressKind, ProgressBar)> = None;
    let mut buf = [0u8; 64];

    loop {
        let count = match port.read(&mut buf) {
            Ok(count) => count,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => bail!("Serial read error: {}", e),
        };

        for &byte in &buf[..count] {
            let Some(event) = decoder.push(byte) else {
                continue;
            };

            match event {
                Event::Report(Report::Status {
                    state,
                    code,
                    bootloader_version,
                    partitions,
                }) => {
                    println!(
                        "Bootloader {} {:?}, code {:?}",
                        format_version(bootloader_version),
                        state,
                        code
                    );
                    print_partitions(&partitions);
                }
                Event::Report(Report::Progress {
                    kind,
                    percent,
                    code,
                }) => show_progress(&mut bar, kind, percent, code),
                Event::Handshake(handshake) => {
                    println!("Handshake: {:?}", handshake);
                    if until_handshake {
                        return Ok(());
                    }
                }
                Event::Garbage(len) => println!("(discarded {} byte frame)", len),
            }
        }
    }
}

/// Copies run one at a time; a new kind replaces the current bar.
fn show_progress(
    current: &mut Option<(ProgressKind, ProgressBar)>,
    kind: ProgressKind,
    percent: u8,
    code: StatusCode,
) {
    if current.as_ref().map(|(k, _)| *k) != Some(kind) {
        if let Some((_, old)) = current.take() {
            old.abandon();
        }
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg:>8} [{bar:40.cyan/blue}] {pos}%") {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("{:?}", kind));
        *current = Some((kind, bar));
    }

    let Some((_, bar)) = current.as_ref() else {
        return;
    };
    bar.set_position(u64::from(percent));

    if code != StatusCode::Success {
        bar.abandon_with_message(format!("{:?} failed: {:?}", kind, code));
        *current = None;
    } else if percent == 100 {
        bar.finish();
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollboot_common::protocol::BootloaderStatus;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| decoder.push(b)).collect()
    }

    #[test]
    fn test_decodes_report_frame() {
        let report = Report::Progress {
            kind: ProgressKind::Backup,
            percent: 37,
            code: StatusCode::Success,
        };
        let frame = postcard::to_stdvec_cobs(&report).unwrap();

        let events = feed(&mut FrameDecoder::default(), &frame);

        assert_eq!(events, vec![Event::Report(report)]);
    }

    #[test]
    fn test_recognizes_handshakes() {
        let mut stream = HANDSHAKE_INSTALLED.to_vec();
        stream.push(0);
        stream.extend_from_slice(HANDSHAKE_RESTORED);
        stream.push(0);

        let events = feed(&mut FrameDecoder::default(), &stream);

        assert_eq!(
            events,
            vec![
                Event::Handshake(Handshake::Installed),
                Event::Handshake(Handshake::Restored)
            ]
        );
    }

    #[test]
    fn test_report_then_handshake_in_one_stream() {
        let report = Report::Status {
            state: BootloaderStatus::Idle,
            code: StatusCode::Success,
            bootloader_version: 0x1203,
            partitions: PartitionTable::default(),
        };
        let mut stream = postcard::to_stdvec_cobs(&report).unwrap();
        stream.extend_from_slice(HANDSHAKE_INSTALLED);
        stream.push(0);

        let events = feed(&mut FrameDecoder::default(), &stream);

        assert_eq!(
            events,
            vec![
                Event::Report(report),
                Event::Handshake(Handshake::Installed)
            ]
        );
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        assert!(feed(&mut FrameDecoder::default(), &[0, 0, 0]).is_empty());
    }

    #[test]
    fn test_oversized_frame_is_discarded_and_decoder_recovers() {
        let mut decoder = FrameDecoder::default();
        let mut stream = vec![0x55u8; MAX_FRAME_LEN + 10];
        stream.push(0);
        stream.extend_from_slice(HANDSHAKE_RESTORED);
        stream.push(0);

        let events = feed(&mut decoder, &stream);

        assert_eq!(
            events,
            vec![
                Event::Garbage(MAX_FRAME_LEN),
                Event::Handshake(Handshake::Restored)
            ]
        );
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(0x1203), "1.2.3");
        assert_eq!(format_version(0), "0.0.0");
    }
}
