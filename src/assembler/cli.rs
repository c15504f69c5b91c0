// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command line definition and validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError};
use crate::core::filemanager::Endianness;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "\
Assembles MIPS source into a flat binary image.

Macro instructions (li, la, abs, absolute-address lw/sw, blt, bge) are \
laid out with a multi-pass fixpoint: each site first reserves its largest \
possible expansion, then shrinks as symbol values settle.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EndianArg {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "mipsforge", version = VERSION, about = "MIPS macro assembler", long_about = LONG_ABOUT)]
pub struct Cli {
    /// Source file to assemble.
    pub input: PathBuf,

    /// Output file. Defaults to the input path with a .bin extension.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Base virtual address of the image, decimal or 0x-hex.
    #[arg(long = "base", value_name = "ADDR", default_value = "0x80010000")]
    pub base: String,

    /// Bytes of virtual address space before physical offset zero.
    /// Defaults to the base address, so the image starts at file offset 0.
    #[arg(long = "header-size", value_name = "SIZE")]
    pub header_size: Option<String>,

    /// Byte order for multi-byte values in the output.
    #[arg(long = "endian", value_enum, default_value_t = EndianArg::Little)]
    pub endian: EndianArg,

    /// Diagnostic output format.
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Suppress the summary line; diagnostics are still printed.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    pub quiet: bool,

    /// Verify the source assembles and the output target can be created,
    /// without writing any bytes.
    #[arg(long = "check", action = ArgAction::SetTrue)]
    pub check_only: bool,

    /// Write a dump of every statement's final expansion to FILE.
    #[arg(long = "temp", value_name = "FILE")]
    pub temp: Option<PathBuf>,
}

/// Validated run configuration derived from the raw arguments.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub base_address: u64,
    pub header_size: u64,
    pub endianness: Endianness,
    pub format: OutputFormat,
    pub quiet: bool,
    pub check_only: bool,
    pub temp_path: Option<PathBuf>,
}

fn parse_address(text: &str) -> Result<u64, AsmError> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|_| AsmError::new(AsmErrorKind::Cli, "Invalid address value", Some(text)))
}

fn cli_error(error: AsmError) -> AsmRunError {
    AsmRunError::new(error, Vec::new(), Vec::new())
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let base_address = parse_address(&cli.base).map_err(cli_error)?;
    let header_size = match &cli.header_size {
        Some(text) => {
            let size = parse_address(text).map_err(cli_error)?;
            if size > base_address {
                return Err(cli_error(AsmError::new(
                    AsmErrorKind::Cli,
                    "Header size exceeds the base address",
                    Some(text),
                )));
            }
            size
        }
        None => base_address,
    };
    let output_path = match &cli.output {
        Some(path) => path.clone(),
        None => cli.input.with_extension("bin"),
    };
    if output_path == cli.input {
        return Err(cli_error(AsmError::new(
            AsmErrorKind::Cli,
            "Output path equals the input path",
            None,
        )));
    }
    Ok(CliConfig {
        input_path: cli.input.clone(),
        output_path,
        base_address,
        header_size,
        endianness: match cli.endian {
            EndianArg::Little => Endianness::Little,
            EndianArg::Big => Endianness::Big,
        },
        format: cli.format,
        quiet: cli.quiet,
        check_only: cli.check_only,
        temp_path: cli.temp.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mipsforge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_fill_in_output_and_header() {
        let config = validate_cli(&cli(&["game.s"])).unwrap();
        assert_eq!(config.output_path, PathBuf::from("game.bin"));
        assert_eq!(config.base_address, 0x8001_0000);
        assert_eq!(config.header_size, 0x8001_0000);
        assert_eq!(config.endianness, Endianness::Little);
    }

    #[test]
    fn addresses_accept_hex_and_decimal() {
        let config = validate_cli(&cli(&["game.s", "--base", "0x8000_0000"])).unwrap();
        assert_eq!(config.base_address, 0x8000_0000);
        let config = validate_cli(&cli(&["game.s", "--base", "4096", "--header-size", "0"])).unwrap();
        assert_eq!(config.base_address, 4096);
        assert_eq!(config.header_size, 0);
    }

    #[test]
    fn header_size_larger_than_base_is_rejected() {
        let err = validate_cli(&cli(&["game.s", "--base", "0x1000", "--header-size", "0x2000"]))
            .unwrap_err();
        assert_eq!(err.error().kind(), AsmErrorKind::Cli);
    }

    #[test]
    fn output_equal_to_input_is_rejected() {
        let err = validate_cli(&cli(&["game.s", "-o", "game.s"])).unwrap_err();
        assert!(err.error().message().contains("Output path"));
    }
}
