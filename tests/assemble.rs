// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly runs through the public configuration API.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use mipsforge::assembler::cli::{CliConfig, OutputFormat};
use mipsforge::assembler::run_with_config;
use mipsforge::core::error::Severity;
use mipsforge::core::filemanager::Endianness;

fn unique_temp_dir() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_micros();
    let dir = std::env::temp_dir().join(format!("mipsforge-it-{now}"));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn config_for(dir: &PathBuf, source: &str) -> CliConfig {
    let input_path = dir.join("job.s");
    fs::write(&input_path, source).expect("write source");
    CliConfig {
        output_path: dir.join("job.bin"),
        input_path,
        base_address: 0x8001_0000,
        header_size: 0x8001_0000,
        endianness: Endianness::Little,
        format: OutputFormat::Text,
        quiet: true,
        check_only: false,
        temp_path: None,
    }
}

fn words_of(bytes: &[u8], endianness: Endianness) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
            match endianness {
                Endianness::Little => u32::from_le_bytes(raw),
                Endianness::Big => u32::from_be_bytes(raw),
            }
        })
        .collect()
}

#[test]
fn assembles_a_shrinking_job_to_exact_bytes() {
    let dir = unique_temp_dir();
    let config = config_for(
        &dir,
        ".equ ONE, 1\n\
         start:\n\
         li $v0, ONE\n\
         la $a1, data\n\
         jr $ra\n\
         data:\n\
         .word 0x12345678\n",
    );

    let report = run_with_config(&config).expect("assembly succeeds");
    assert_eq!(report.counts().errors, 0);
    assert_eq!(report.counts().warnings, 0);
    // Pass 1 shrinks li to one opcode, pass 2 confirms the fixpoint.
    assert_eq!(report.counts().passes, 2);

    let bytes = fs::read(&config.output_path).expect("read output");
    assert_eq!(
        words_of(&bytes, Endianness::Little),
        vec![
            0x2402_0001, // addiu v0, zero, 1
            0x3C05_8001, // lui   a1, 0x8001
            0x24A5_0010, // addiu a1, a1, 0x10   (data settled at 0x80010010)
            0x03E0_0008, // jr    ra
            0x1234_5678, // .word
        ]
    );
}

#[test]
fn errors_block_all_output() {
    let dir = unique_temp_dir();
    let config = config_for(
        &dir,
        "li $t0, missing\n\
         li $t1, also_missing\n",
    );

    let err = run_with_config(&config).expect_err("undefined symbols fail the run");
    let errors: Vec<_> = err
        .diagnostics()
        .iter()
        .filter(|d| d.severity() == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].line(), 1);
    assert!(errors[0].message().contains("missing"));
    assert_eq!(errors[1].line(), 2);
    assert!(errors[1].message().contains("also_missing"));
    assert!(!config.output_path.exists(), "no bytes may be written");
}

#[test]
fn check_only_leaves_no_file_behind() {
    let dir = unique_temp_dir();
    let mut config = config_for(&dir, "nop\njr $ra\n");
    config.check_only = true;

    run_with_config(&config).expect("check passes");
    assert!(!config.output_path.exists());
}

#[test]
fn big_endian_output_swaps_byte_order() {
    let dir = unique_temp_dir();
    let mut config = config_for(&dir, "jr $ra\n");
    config.endianness = Endianness::Big;

    run_with_config(&config).expect("assembly succeeds");
    let bytes = fs::read(&config.output_path).expect("read output");
    assert_eq!(bytes, [0x03, 0xE0, 0x00, 0x08]);
}

#[test]
fn delay_slot_hazard_is_a_warning_not_an_error() {
    let dir = unique_temp_dir();
    let config = config_for(
        &dir,
        "beq $v0, $zero, skip\n\
         lw $t0, 0x80020000\n\
         skip: jr $ra\n",
    );

    let report = run_with_config(&config).expect("warnings do not fail the run");
    assert_eq!(report.counts().errors, 0);
    assert_eq!(report.counts().warnings, 1);
    assert!(config.output_path.exists());
}

#[test]
fn org_gap_is_reachable_through_the_header_mapping() {
    let dir = unique_temp_dir();
    let config = config_for(
        &dir,
        "nop\n\
         .org 0x80010010\n\
         .word 0xDEADBEEF\n",
    );

    run_with_config(&config).expect("assembly succeeds");
    let bytes = fs::read(&config.output_path).expect("read output");
    assert_eq!(bytes.len(), 0x14);
    let words = words_of(&bytes, Endianness::Little);
    assert_eq!(words[0], 0);
    assert_eq!(words[4], 0xDEAD_BEEF);
}