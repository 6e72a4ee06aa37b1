// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for protocol types and constants.

use rollboot_common::partition::{PartitionRecord, PartitionStatus, PartitionTable};
use rollboot_common::protocol::{
    AckStatus, BootloaderStatus, Command, LoaderState, MessageKind, ProgressKind, Report, Response,
    StatusCode, APP_ADDR, BLOCKS_PER_PAGE, BLOCK_SIZE, FLASH_BASE, FLASH_PAGE_SIZE,
    FLASH_SECTOR_SIZE, FLASH_SIZE, HANDSHAKE_INSTALLED, HANDSHAKE_RESTORED, MAX_DATA_BLOCK_SIZE,
    PARTITION_BLOCKS, PARTITION_SIZE, PARTITION_TABLE_ADDR, PARTITION_TABLE_SIZE,
    RAM_UPDATE_FLAG_ADDR, RAM_UPDATE_MAGIC, ROLLBACK_ADDR, UPDATE_ADDR,
};
use rollboot_common::protocol::{
    pack_software_version, parse_version_component, unpack_software_version,
};

// --- Flash layout constants tests ---

#[test]
fn test_flash_base_address() {
    assert_eq!(FLASH_BASE, 0x1000_0000);
}

#[test]
fn test_partition_addresses() {
    assert_eq!(APP_ADDR, 0x1001_0000);
    assert_eq!(UPDATE_ADDR, 0x100B_0000);
    assert_eq!(ROLLBACK_ADDR, 0x1015_0000);
    assert_eq!(PARTITION_TABLE_ADDR, 0x101F_0000);
}

#[test]
fn test_partition_size() {
    assert_eq!(PARTITION_SIZE, 640 * 1024); // 640KB
    assert_eq!(PARTITION_BLOCKS, 2560);
}

#[test]
fn test_block_geometry() {
    assert_eq!(BLOCK_SIZE, FLASH_PAGE_SIZE);
    assert_eq!(BLOCKS_PER_PAGE, 16);
    assert_eq!(BLOCKS_PER_PAGE * BLOCK_SIZE, FLASH_SECTOR_SIZE);
}

#[test]
fn test_ram_update_constants() {
    assert_eq!(RAM_UPDATE_FLAG_ADDR, 0x2003_BFF0);
    assert_eq!(RAM_UPDATE_MAGIC, 0x0FDA_7E00);
}

#[test]
fn test_max_data_block_size() {
    assert_eq!(MAX_DATA_BLOCK_SIZE, 1024);
    assert_eq!(MAX_DATA_BLOCK_SIZE as u32 % BLOCK_SIZE, 0);
}

// --- Memory layout validation ---

#[test]
fn test_partitions_are_sector_aligned() {
    for addr in [APP_ADDR, UPDATE_ADDR, ROLLBACK_ADDR, PARTITION_TABLE_ADDR] {
        assert_eq!(addr % FLASH_SECTOR_SIZE, 0, "0x{:08x}", addr);
    }
}

#[test]
fn test_application_does_not_overlap_bootloader() {
    assert!(APP_ADDR > FLASH_BASE);
}

#[test]
fn test_partitions_do_not_overlap() {
    assert!(UPDATE_ADDR >= APP_ADDR + PARTITION_SIZE);
    assert!(ROLLBACK_ADDR >= UPDATE_ADDR + PARTITION_SIZE);
    assert!(PARTITION_TABLE_ADDR >= ROLLBACK_ADDR + PARTITION_SIZE);
}

#[test]
fn test_partition_table_fits_in_flash() {
    assert_eq!(PARTITION_TABLE_SIZE, 2 * FLASH_SECTOR_SIZE);
    assert!(PARTITION_TABLE_ADDR + PARTITION_TABLE_SIZE <= FLASH_BASE + FLASH_SIZE);
}

// --- Software version ---

#[test]
fn test_software_version_packing() {
    assert_eq!(pack_software_version(1, 2, 3), (1 << 12) + (2 << 8) + 3);
    assert_eq!(unpack_software_version(pack_software_version(1, 2, 3)), (1, 2, 3));
    assert_eq!(unpack_software_version(pack_software_version(0, 15, 255)), (0, 15, 255));
}

#[test]
fn test_parse_version_component() {
    assert_eq!(parse_version_component("0"), 0);
    assert_eq!(parse_version_component("7"), 7);
    assert_eq!(parse_version_component("42"), 42);
}

#[test]
fn test_software_version_macro_uses_crate_version() {
    let expected = pack_software_version(
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap(),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap(),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap(),
    );
    assert_eq!(rollboot_common::software_version!(), expected);
}

// --- Handshake tokens ---

#[test]
fn test_handshake_tokens() {
    assert_eq!(HANDSHAKE_INSTALLED, b"/10A22F101");
    assert_eq!(HANDSHAKE_RESTORED, b"/10A291D01");
    assert!(!HANDSHAKE_INSTALLED.contains(&0));
    assert!(!HANDSHAKE_RESTORED.contains(&0));
}

// --- Report tests ---

#[test]
fn test_progress_kind_from_source() {
    assert_eq!(ProgressKind::from_source(APP_ADDR), ProgressKind::Backup);
    assert_eq!(ProgressKind::from_source(ROLLBACK_ADDR), ProgressKind::Restore);
    assert_eq!(ProgressKind::from_source(UPDATE_ADDR), ProgressKind::Update);
}

#[test]
fn test_report_kind() {
    let status = Report::Status {
        state: BootloaderStatus::Active,
        code: StatusCode::None,
        bootloader_version: 0,
        partitions: PartitionTable::default(),
    };
    assert_eq!(status.kind(), MessageKind::BootloaderStatus);

    let kinds = [
        (ProgressKind::Backup, MessageKind::BackupProgress),
        (ProgressKind::Restore, MessageKind::RestoreProgress),
        (ProgressKind::Update, MessageKind::UpdateProgress),
    ];
    for (kind, expected) in kinds {
        let report = Report::Progress {
            kind,
            percent: 42,
            code: StatusCode::Success,
        };
        assert_eq!(report.kind(), expected);
    }
}

#[test]
fn test_report_code() {
    let report = Report::Progress {
        kind: ProgressKind::Update,
        percent: 3,
        code: StatusCode::VerifyError,
    };
    assert_eq!(report.code(), StatusCode::VerifyError);
}

#[test]
fn test_report_cobs_frame() {
    let report = Report::Status {
        state: BootloaderStatus::Idle,
        code: StatusCode::Success,
        bootloader_version: pack_software_version(0, 1, 0),
        partitions: PartitionTable::new(
            PartitionRecord {
                status: PartitionStatus::Updated,
                version: 4,
                block_count: 10,
            },
            PartitionRecord::BLANK,
            PartitionRecord {
                status: PartitionStatus::Valid,
                version: 3,
                block_count: PARTITION_BLOCKS,
            },
        ),
    };

    let mut frame = postcard::to_stdvec_cobs(&report).unwrap();
    // Exactly one delimiter, at the end.
    assert_eq!(frame.iter().filter(|&&b| b == 0).count(), 1);
    assert_eq!(frame.last(), Some(&0));

    let decoded: Report = postcard::from_bytes_cobs(&mut frame).unwrap();
    assert_eq!(decoded, report);
}

// --- AckStatus tests ---

#[test]
fn test_ack_status_debug() {
    assert_eq!(format!("{:?}", AckStatus::Ok), "Ok");
    assert_eq!(format!("{:?}", AckStatus::CrcError), "CrcError");
    assert_eq!(format!("{:?}", AckStatus::FlashError), "FlashError");
    assert_eq!(format!("{:?}", AckStatus::BadCommand), "BadCommand");
    assert_eq!(format!("{:?}", AckStatus::BadState), "BadState");
    assert_eq!(format!("{:?}", AckStatus::SizeInvalid), "SizeInvalid");
}

// --- Command tests ---

#[test]
fn test_command_start_update_debug() {
    let cmd = Command::StartUpdate {
        size: 1024,
        crc32: 0xDEADBEEF,
        version: 1,
    };
    let debug = format!("{:?}", cmd);
    assert!(debug.contains("StartUpdate"));
    assert!(debug.contains("1024"));
}

#[test]
fn test_command_request_rollback_debug() {
    let cmd = Command::RequestRollBack;
    assert!(format!("{:?}", cmd).contains("RequestRollBack"));
}

// --- Response tests ---

#[test]
fn test_response_status_debug() {
    let resp = Response::Status {
        state: BootloaderStatus::UnitError,
        loader: LoaderState::Idle,
        bootloader_version: pack_software_version(1, 0, 4),
        partitions: PartitionTable::default(),
    };
    let debug = format!("{:?}", resp);
    assert!(debug.contains("Status"));
    assert!(debug.contains("bootloader_version: 4100"));
    assert!(debug.contains("UnitError"));
    assert!(debug.contains("Undefined"));
}
