// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Block copy/verify engine.
//!
//! Copies a run of `BLOCK_SIZE` blocks between partitions, erasing each
//! destination sector when the copy reaches it, verifying every block after
//! it is written, and reporting progress when the percentage changes.

use crate::board::{Block, Flash, ReportSink, Watchdog};
use crate::log;
use crate::protocol::{ProgressKind, Report, StatusCode, BLOCKS_PER_PAGE, BLOCK_SIZE, PARTITION_BLOCKS};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyError {
    /// Erasing the destination sector at `addr` failed.
    ErasePage { addr: u32 },
    /// The block written at `addr` did not read back identical.
    Verify { addr: u32 },
    /// More blocks requested than a partition holds.
    OutOfRange { count: u32 },
}

/// Percentage tracker that only yields on change.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    last_reported: Option<u8>,
}

impl Progress {
    /// Percentage after `done` of `count` blocks, if it differs from the last one reported.
    fn advance(&mut self, done: u32, count: u32) -> Option<u8> {
        let percent = (done * 100 / count) as u8;
        if self.last_reported == Some(percent) {
            return None;
        }
        self.last_reported = Some(percent);
        Some(percent)
    }

    fn current(&self) -> u8 {
        self.last_reported.unwrap_or(0)
    }
}

/// Copy `count` blocks from `source` to `destination`.
///
/// Stops at the first erase or verify failure; blocks after it are left untouched.
pub fn copy_blocks<B>(board: &mut B, count: u32, source: u32, destination: u32) -> Result<(), CopyError>
where
    B: Flash + ReportSink + Watchdog + ?Sized,
{
    if count > PARTITION_BLOCKS {
        log::error!("copy of {} blocks exceeds partition", count);
        return Err(CopyError::OutOfRange { count });
    }

    let kind = ProgressKind::from_source(source);
    let mut progress = Progress::default();
    let mut buf: Block = [0u8; BLOCK_SIZE as usize];

    log::info!(
        "Copying {} blocks 0x{:08x} -> 0x{:08x}",
        count,
        source,
        destination
    );

    for block in 0..count {
        board.refresh();

        let src = source + block * BLOCK_SIZE;
        let dst = destination + block * BLOCK_SIZE;

        if block % BLOCKS_PER_PAGE == 0 {
            log::debug!("Erasing sector 0x{:08x}", dst);
            if board.erase_page(dst).is_err() {
                log::error!("Erase failed at 0x{:08x}", dst);
                board.report(&Report::Progress {
                    kind,
                    percent: progress.current(),
                    code: StatusCode::ErasePageError,
                });
                return Err(CopyError::ErasePage { addr: dst });
            }
        }

        buf.fill(0);
        board.read_block(src, &mut buf);
        board.write_block(dst, &buf);

        if !board.verify_block(dst, &buf) {
            log::error!("Verify failed at 0x{:08x}", dst);
            board.report(&Report::Progress {
                kind,
                percent: progress.current(),
                code: StatusCode::VerifyError,
            });
            return Err(CopyError::Verify { addr: dst });
        }

        if let Some(percent) = progress.advance(block + 1, count) {
            board.report(&Report::Progress {
                kind,
                percent,
                code: StatusCode::Success,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reports_each_value_once() {
        let mut progress = Progress::default();
        let reported: heapless::Vec<u8, 8> = (1..=3).filter_map(|done| progress.advance(done, 3)).collect();
        assert_eq!(&reported[..], &[33, 66, 100]);
    }

    #[test]
    fn test_progress_skips_repeated_percentages() {
        let mut progress = Progress::default();
        assert_eq!(progress.advance(1, 300), Some(0));
        assert_eq!(progress.advance(2, 300), None);
        assert_eq!(progress.advance(3, 300), Some(1));
    }

    #[test]
    fn test_progress_current_defaults_to_zero() {
        let progress = Progress::default();
        assert_eq!(progress.current(), 0);
    }
}
