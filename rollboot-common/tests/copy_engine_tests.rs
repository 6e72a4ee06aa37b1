// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the block copy/verify engine.

mod common;

use common::SimBoard;
use rollboot_common::copy::{copy_blocks, CopyError};
use rollboot_common::protocol::{
    ProgressKind, StatusCode, APP_ADDR, BLOCKS_PER_PAGE, BLOCK_SIZE, FLASH_SECTOR_SIZE,
    PARTITION_BLOCKS, ROLLBACK_ADDR, UPDATE_ADDR,
};

fn board_with_update(blocks: u32) -> SimBoard {
    let mut board = SimBoard::new();
    board.load_image(UPDATE_ADDR, blocks, 0x3C);
    board
}

// =============================================================================
// Successful copies
// =============================================================================

#[test]
fn test_copy_succeeds_and_destination_matches_source() {
    let mut board = board_with_update(40);

    assert_eq!(copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR), Ok(()));

    let len = (40 * BLOCK_SIZE) as usize;
    assert_eq!(board.bytes(APP_ADDR, len), board.bytes(UPDATE_ADDR, len));
}

#[test]
fn test_copy_erases_each_destination_sector_once() {
    let mut board = board_with_update(40);

    copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR).unwrap();

    assert_eq!(
        board.erased,
        vec![
            APP_ADDR,
            APP_ADDR + FLASH_SECTOR_SIZE,
            APP_ADDR + 2 * FLASH_SECTOR_SIZE
        ]
    );
}

#[test]
fn test_copy_refreshes_watchdog_every_block() {
    let mut board = board_with_update(40);

    copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR).unwrap();

    assert_eq!(board.refreshes, 40);
}

#[test]
fn test_progress_is_monotonic_and_ends_at_100() {
    let mut board = board_with_update(40);

    copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR).unwrap();

    let progress = board.progress(ProgressKind::Update);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(progress.last(), Some(&(100, StatusCode::Success)));
    assert!(progress.iter().all(|(_, code)| *code == StatusCode::Success));
}

#[test]
fn test_progress_first_report_follows_first_block() {
    let mut board = board_with_update(4);

    copy_blocks(&mut board, 4, UPDATE_ADDR, APP_ADDR).unwrap();

    let percents: Vec<u8> = board
        .progress(ProgressKind::Update)
        .iter()
        .map(|(p, _)| *p)
        .collect();
    assert_eq!(percents, vec![25, 50, 75, 100]);
}

#[test]
fn test_progress_reported_once_per_value_on_full_partition() {
    let mut board = board_with_update(PARTITION_BLOCKS);

    copy_blocks(&mut board, PARTITION_BLOCKS, UPDATE_ADDR, APP_ADDR).unwrap();

    let percents: Vec<u8> = board
        .progress(ProgressKind::Update)
        .iter()
        .map(|(p, _)| *p)
        .collect();
    // More blocks than percent steps: every value 0..=100 exactly once.
    assert_eq!(percents, (0..=100).collect::<Vec<u8>>());
}

#[test]
fn test_progress_kind_follows_source() {
    let mut board = SimBoard::new();
    board.load_image(APP_ADDR, 2, 0x11);
    copy_blocks(&mut board, 2, APP_ADDR, ROLLBACK_ADDR).unwrap();
    assert_eq!(board.progress(ProgressKind::Backup).len(), 2);

    copy_blocks(&mut board, 2, ROLLBACK_ADDR, APP_ADDR).unwrap();
    assert_eq!(board.progress(ProgressKind::Restore).len(), 2);
    assert!(board.progress(ProgressKind::Update).is_empty());
}

#[test]
fn test_zero_blocks_is_ok_and_silent() {
    let mut board = SimBoard::new();

    assert_eq!(copy_blocks(&mut board, 0, UPDATE_ADDR, APP_ADDR), Ok(()));
    assert!(board.reports.is_empty());
    assert!(board.erased.is_empty());
}

#[test]
fn test_copy_does_not_reuse_bytes_between_blocks() {
    let mut board = SimBoard::new();
    board.load_image(UPDATE_ADDR, 2, 0x00);
    // Second source block is blank flash.
    board.fill(UPDATE_ADDR + BLOCK_SIZE, &[0xFF; BLOCK_SIZE as usize]);

    copy_blocks(&mut board, 2, UPDATE_ADDR, APP_ADDR).unwrap();

    assert!(board
        .bytes(APP_ADDR + BLOCK_SIZE, BLOCK_SIZE as usize)
        .iter()
        .all(|&b| b == 0xFF));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_verify_failure_aborts_at_failing_block() {
    let mut board = board_with_update(40);
    // Pre-fill the second destination sector so we can tell it was never touched.
    board.fill(APP_ADDR + FLASH_SECTOR_SIZE, &[0u8; FLASH_SECTOR_SIZE as usize]);
    let bad = APP_ADDR + 5 * BLOCK_SIZE;
    board.corrupt_write_at = Some(bad);

    let result = copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR);

    assert_eq!(result, Err(CopyError::Verify { addr: bad }));
    assert_eq!(board.written.len(), 6);
    assert_eq!(board.written.last(), Some(&bad));
    assert_eq!(board.erased, vec![APP_ADDR]);
    assert!(board
        .bytes(APP_ADDR + FLASH_SECTOR_SIZE, FLASH_SECTOR_SIZE as usize)
        .iter()
        .all(|&b| b == 0));
}

#[test]
fn test_verify_failure_reported_once() {
    let mut board = board_with_update(40);
    board.corrupt_write_at = Some(APP_ADDR + 5 * BLOCK_SIZE);

    let _ = copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR);

    let errors: Vec<_> = board
        .progress(ProgressKind::Update)
        .into_iter()
        .filter(|(_, code)| *code != StatusCode::Success)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, StatusCode::VerifyError);
}

#[test]
fn test_verify_failure_leaves_source_untouched() {
    let mut board = board_with_update(40);
    let len = (40 * BLOCK_SIZE) as usize;
    let before = board.bytes(UPDATE_ADDR, len).to_vec();
    board.corrupt_write_at = Some(APP_ADDR + 5 * BLOCK_SIZE);

    let _ = copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR);

    assert_eq!(board.bytes(UPDATE_ADDR, len), &before[..]);
}

#[test]
fn test_erase_failure_aborts_before_writing_sector() {
    let mut board = board_with_update(40);
    let bad_sector = APP_ADDR + FLASH_SECTOR_SIZE;
    board.fail_erase_at = Some(bad_sector);

    let result = copy_blocks(&mut board, 40, UPDATE_ADDR, APP_ADDR);

    assert_eq!(result, Err(CopyError::ErasePage { addr: bad_sector }));
    assert_eq!(board.written.len(), BLOCKS_PER_PAGE as usize);
    assert!(board.written.iter().all(|&addr| addr < bad_sector));
}

#[test]
fn test_erase_failure_reported_once_with_last_progress() {
    let mut board = board_with_update(32);
    board.fail_erase_at = Some(APP_ADDR + FLASH_SECTOR_SIZE);

    let _ = copy_blocks(&mut board, 32, UPDATE_ADDR, APP_ADDR);

    let progress = board.progress(ProgressKind::Update);
    let errors: Vec<_> = progress
        .iter()
        .filter(|(_, code)| *code == StatusCode::ErasePageError)
        .collect();
    assert_eq!(errors.len(), 1);
    // 16 of 32 blocks were done when the second sector failed.
    assert_eq!(errors[0].0, 50);
}

#[test]
fn test_erase_failure_on_first_sector_writes_nothing() {
    let mut board = board_with_update(4);
    board.fail_erase_at = Some(APP_ADDR);

    assert_eq!(
        copy_blocks(&mut board, 4, UPDATE_ADDR, APP_ADDR),
        Err(CopyError::ErasePage { addr: APP_ADDR })
    );
    assert!(board.written.is_empty());
    assert_eq!(
        board.progress(ProgressKind::Update),
        vec![(0, StatusCode::ErasePageError)]
    );
}

#[test]
fn test_oversized_copy_is_rejected_without_touching_flash() {
    let mut board = SimBoard::new();

    assert_eq!(
        copy_blocks(&mut board, PARTITION_BLOCKS + 1, UPDATE_ADDR, APP_ADDR),
        Err(CopyError::OutOfRange {
            count: PARTITION_BLOCKS + 1
        })
    );
    assert!(board.erased.is_empty());
    assert!(board.written.is_empty());
}
