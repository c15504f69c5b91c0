// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Top-level assembly run: read source, lay out, write output.

use std::fs::{self, File};
use std::sync::Arc;

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError, AsmRunReport, PassCounts};
use crate::core::filemanager::{FileManager, GenericAssemblerFile};

use super::cli::CliConfig;
use super::engine::Assembler;

fn io_error(detail: &str) -> AsmError {
    AsmError::new(AsmErrorKind::Io, detail, None)
}

/// Run one assembly job end to end. The returned report carries the
/// surviving diagnostics (warnings, since errors fail the run) and the
/// pass statistics.
pub fn run_with_config(config: &CliConfig) -> Result<AsmRunReport, AsmRunError> {
    let source = match fs::read_to_string(&config.input_path) {
        Ok(text) => Arc::new(text.lines().map(str::to_string).collect::<Vec<_>>()),
        Err(err) => {
            return Err(AsmRunError::new(
                io_error(&format!(
                    "Could not read {}: {err}",
                    config.input_path.display()
                )),
                Vec::new(),
                Vec::new(),
            ));
        }
    };

    let mut assembler = Assembler::new(config.base_address);
    if let Err(err) = assembler.parse_source(&source) {
        let diagnostics = assembler.take_diagnostics();
        return Err(AsmRunError::new(err, diagnostics, source));
    }
    let passes = match assembler.run_passes() {
        Ok(passes) => passes,
        Err(err) => {
            let diagnostics = assembler.take_diagnostics();
            return Err(AsmRunError::new(err, diagnostics, source));
        }
    };

    let counts = PassCounts {
        lines: source.len() as u32,
        passes,
        errors: assembler.error_count() as u32,
        warnings: assembler.warning_count() as u32,
    };
    if counts.errors > 0 {
        let diagnostics = assembler.take_diagnostics();
        return Err(AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Assembler,
                "Errors detected; no output written",
                None,
            ),
            diagnostics,
            source,
        ));
    }

    assembler.encode_all_sites();

    let mut fm = FileManager::new();
    fm.set_endianness(config.endianness);
    let output = fm.add_file(Box::new(GenericAssemblerFile::create(
        &config.output_path,
        config.header_size,
    )));
    fm.open_file(output, config.check_only)
        .map_err(|err| fm_error(&err, &mut assembler, &source))?;

    if !config.check_only {
        assembler
            .write_all_sites(&mut fm)
            .map_err(|err| fm_error(&err, &mut assembler, &source))?;
        fm.close_file();
    }

    if let Some(temp_path) = &config.temp_path {
        let result = File::create(temp_path)
            .and_then(|mut file| assembler.write_temp_data(&mut file));
        if let Err(err) = result {
            return Err(AsmRunError::new(
                io_error(&format!("Could not write {}: {err}", temp_path.display())),
                assembler.take_diagnostics(),
                source,
            ));
        }
    }

    Ok(AsmRunReport::new(
        assembler.take_diagnostics(),
        source,
        counts,
    ))
}

fn fm_error(
    err: &crate::core::filemanager::FileError,
    assembler: &mut Assembler,
    source: &Arc<Vec<String>>,
) -> AsmRunError {
    AsmRunError::new(
        io_error(&err.to_string()),
        assembler.take_diagnostics(),
        Arc::clone(source),
    )
}
