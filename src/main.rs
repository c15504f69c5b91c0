// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for mipsforge.

use clap::Parser;
use serde_json::json;

use mipsforge::assembler::cli::{validate_cli, Cli, OutputFormat};
use mipsforge::core::error::{Diagnostic, Severity};

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn format_diagnostic_line(
    diag: &Diagnostic,
    source_lines: &[String],
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Json {
        let source = source_lines
            .get(diag.line().saturating_sub(1) as usize)
            .map(|line| line.trim());
        json!({
            "line": diag.line(),
            "severity": severity_to_str(diag.severity()),
            "message": diag.message(),
            "source": source,
            "help": diag.help(),
        })
        .to_string()
    } else {
        diag.format()
    }
}

fn emit_diagnostics(diagnostics: &[Diagnostic], source_lines: &[String], format: OutputFormat) {
    for diag in diagnostics {
        eprintln!("{}", format_diagnostic_line(diag, source_lines, format));
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match mipsforge::assembler::run_with_config(&config) {
        Ok(report) => {
            emit_diagnostics(report.diagnostics(), report.source_lines(), config.format);
            if !config.quiet {
                let counts = report.counts();
                println!(
                    "Assembled {} lines in {} passes ({} warnings).",
                    counts.lines,
                    counts.passes,
                    counts.warnings
                );
            }
        }
        Err(err) => {
            emit_diagnostics(err.diagnostics(), err.source_lines(), config.format);
            if config.format != OutputFormat::Json {
                eprintln!("{err}");
            }
            std::process::exit(1);
        }
    }
}
