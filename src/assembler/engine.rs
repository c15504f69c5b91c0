// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The multi-pass assembly engine.
//!
//! Parsing assigns every statement a provisional address, with macro sites
//! reserving their declared maximum expansion. Layout then re-validates
//! every statement until no site changes size, redefining labels in place
//! each pass so forward references resolve against the previous pass's
//! addresses. Only a fully converged, error-free job gets written out.

use std::io::{self, Write};

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::expr::eval_expr;
use crate::core::filemanager::{FileError, FileManager};
use crate::core::symbol_table::SymbolTable;
use crate::mips::macro_site::{MacroSite, SiteResult};
use crate::mips::{fits_in_word, LayoutContext, MipsState, INSTRUCTION_WIDTH};

use super::parser::{parse_line, ParsedStatement};
use super::statement::{queue_eval_failure, AsmOption, InstructionStatement, SourceStatement};

/// Bail-out bound for layout; a job that has not converged by now is
/// oscillating.
pub const MAX_PASSES: u32 = 100;

pub struct Assembler {
    base_address: u64,
    symbols: SymbolTable,
    statements: Vec<SourceStatement>,
    /// Findings from parsing; these survive every layout pass.
    parse_diagnostics: Vec<Diagnostic>,
    /// Findings from the most recent layout pass.
    pass_diagnostics: Vec<Diagnostic>,
    state: MipsState,
}

impl Assembler {
    pub fn new(base_address: u64) -> Self {
        Self {
            base_address,
            symbols: SymbolTable::new(),
            statements: Vec::new(),
            parse_diagnostics: Vec::new(),
            pass_diagnostics: Vec::new(),
            state: MipsState::default(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// All surviving diagnostics, merged into source order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut merged: Vec<Diagnostic> = self
            .parse_diagnostics
            .iter()
            .chain(self.pass_diagnostics.iter())
            .cloned()
            .collect();
        merged.sort_by_key(Diagnostic::line);
        merged
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        let mut merged = std::mem::take(&mut self.parse_diagnostics);
        merged.append(&mut self.pass_diagnostics);
        merged.sort_by_key(Diagnostic::line);
        merged
    }

    pub fn error_count(&self) -> usize {
        self.parse_diagnostics
            .iter()
            .chain(self.pass_diagnostics.iter())
            .filter(|d| d.severity() == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.parse_diagnostics
            .iter()
            .chain(self.pass_diagnostics.iter())
            .filter(|d| d.severity() == Severity::Warning)
            .count()
    }

    fn queue_parse_error(&mut self, line: u32, kind: AsmErrorKind, msg: &str, param: Option<&str>) {
        self.parse_diagnostics.push(Diagnostic::new(
            line,
            Severity::Error,
            AsmError::new(kind, msg, param),
        ));
    }

    /// Parse the whole source, assigning provisional addresses as each
    /// statement is constructed. Recoverable problems become diagnostics;
    /// an unknown macro mnemonic aborts the job because no size can be
    /// reserved for it.
    pub fn parse_source(&mut self, lines: &[String]) -> Result<(), AsmError> {
        let mut cursor = self.base_address;
        for (index, text) in lines.iter().enumerate() {
            let line = index as u32 + 1;
            let parsed = match parse_line(text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.parse_diagnostics
                        .push(Diagnostic::new(line, Severity::Error, err));
                    continue;
                }
            };
            if let Some(name) = parsed.label {
                // A conflicting definition is reported by the layout pass,
                // which re-walks every label anyway.
                let _ = self.symbols.define_label(&name, cursor, line);
                // Stored so later passes can move the label in place.
                self.statements.push(SourceStatement::Label { name, line });
            }
            let Some(statement) = parsed.statement else {
                continue;
            };
            match statement {
                ParsedStatement::Org(expr) => {
                    // Evaluation failures surface during layout, which
                    // re-evaluates the target every pass anyway.
                    let ctx = LayoutContext::new(&self.symbols, cursor, false);
                    if let Ok(value) = eval_expr(&expr, &ctx) {
                        cursor = value as u64;
                    }
                    let value = cursor;
                    self.statements
                        .push(SourceStatement::Org { expr, value, line });
                }
                ParsedStatement::Word(exprs) => {
                    cursor += INSTRUCTION_WIDTH * exprs.len() as u64;
                    self.statements.push(SourceStatement::Word {
                        exprs,
                        values: Vec::new(),
                        line,
                    });
                }
                ParsedStatement::Equ { name, expr } => {
                    // Equates bind once, at the point of definition.
                    let ctx = LayoutContext::new(&self.symbols, cursor, false);
                    match eval_expr(&expr, &ctx) {
                        Ok(value) => {
                            if self.symbols.set(&name, value).is_err() {
                                self.queue_parse_error(
                                    line,
                                    AsmErrorKind::Symbol,
                                    "Symbol already defined as a label",
                                    Some(&name),
                                );
                            }
                        }
                        Err(err) => queue_eval_failure(&err, line, &mut self.parse_diagnostics),
                    }
                }
                ParsedStatement::SetOption(option) => {
                    self.state.ignore_load_delay = option == AsmOption::NoLoadDelay;
                }
                ParsedStatement::Instruction {
                    instruction,
                    immediate,
                    branch_target,
                } => {
                    cursor += INSTRUCTION_WIDTH;
                    self.statements
                        .push(SourceStatement::Instruction(InstructionStatement::new(
                            instruction,
                            immediate,
                            branch_target,
                            line,
                        )));
                }
                ParsedStatement::Macro { mnemonic, operands } => {
                    let site =
                        MacroSite::new(&mnemonic, operands, &self.state, &mut cursor, line)?;
                    self.statements.push(SourceStatement::Macro(site));
                }
            }
        }
        Ok(())
    }

    /// Run one layout pass over every statement. Returns whether any macro
    /// site changed size, which forces another pass. Pass diagnostics are
    /// rebuilt from scratch each time so only the final pass's findings
    /// survive.
    pub fn validate_all_sites(&mut self) -> bool {
        let base = self.base_address;
        let Assembler {
            symbols,
            statements,
            pass_diagnostics: diagnostics,
            ..
        } = self;

        diagnostics.clear();
        let mut cursor = base;
        let mut any_changed = false;
        let mut prev_was_branch = false;

        for statement in statements.iter_mut() {
            match statement {
                SourceStatement::Label { name, line } => {
                    if symbols.define_label(name, cursor, *line).is_err() {
                        diagnostics.push(Diagnostic::new(
                            *line,
                            Severity::Error,
                            AsmError::new(
                                AsmErrorKind::Symbol,
                                "Symbol already defined as a constant",
                                Some(name),
                            ),
                        ));
                    }
                }
                SourceStatement::Org { expr, value, line } => {
                    let ctx = LayoutContext::new(symbols, cursor, false);
                    match eval_expr(expr, &ctx) {
                        Ok(target) => {
                            *value = target as u64;
                            cursor = *value;
                        }
                        Err(err) => queue_eval_failure(&err, *line, diagnostics),
                    }
                    prev_was_branch = false;
                }
                SourceStatement::Word {
                    exprs,
                    values,
                    line,
                } => {
                    values.clear();
                    let ctx = LayoutContext::new(symbols, cursor, false);
                    for expr in exprs.iter() {
                        match eval_expr(expr, &ctx) {
                            Ok(value) if fits_in_word(value) => values.push(value as u32),
                            Ok(value) => diagnostics.push(Diagnostic::new(
                                *line,
                                Severity::Error,
                                AsmError::new(
                                    AsmErrorKind::Expression,
                                    "Value does not fit in 32 bits",
                                    Some(&format!("0x{value:X}")),
                                ),
                            )),
                            Err(err) => queue_eval_failure(&err, *line, diagnostics),
                        }
                    }
                    cursor += INSTRUCTION_WIDTH * exprs.len() as u64;
                    prev_was_branch = false;
                }
                SourceStatement::Instruction(ins) => {
                    let ctx = LayoutContext::new(symbols, cursor, prev_was_branch);
                    ins.validate(&ctx, diagnostics);
                    prev_was_branch = ins.is_branch();
                    cursor += INSTRUCTION_WIDTH;
                }
                SourceStatement::Macro(site) => {
                    let ctx = LayoutContext::new(symbols, cursor, prev_was_branch);
                    if site.validate(&ctx, diagnostics) == SiteResult::SizeChanged {
                        any_changed = true;
                    }
                    cursor += site.space_needed();
                    // A branch macro ends in a real branch, so the next
                    // statement sits in that branch's delay slot.
                    prev_was_branch = site
                        .instructions()
                        .last()
                        .is_some_and(|ins| ins.opcode().is_branch());
                }
            }
        }
        any_changed
    }

    /// Iterate layout passes to a fixpoint. Returns the number of passes
    /// run, or an error if the layout keeps oscillating.
    pub fn run_passes(&mut self) -> Result<u32, AsmError> {
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > MAX_PASSES {
                return Err(AsmError::new(
                    AsmErrorKind::Assembler,
                    "Internal error: layout failed to converge",
                    None,
                ));
            }
            if !self.validate_all_sites() {
                return Ok(passes);
            }
        }
    }

    /// Encode every converged instruction to its final machine word.
    pub fn encode_all_sites(&mut self) {
        for statement in &mut self.statements {
            match statement {
                SourceStatement::Instruction(ins) => ins.encode(),
                SourceStatement::Macro(site) => site.encode(),
                _ => {}
            }
        }
    }

    /// Write the encoded job through the file manager. The caller must
    /// have opened an output file and verified there are no errors.
    pub fn write_all_sites(&self, fm: &mut FileManager) -> Result<(), FileError> {
        fm.seek_virtual(self.base_address)?;
        for statement in &self.statements {
            match statement {
                SourceStatement::Label { .. } => {}
                SourceStatement::Org { value, .. } => fm.seek_virtual(*value)?,
                SourceStatement::Word { values, .. } => {
                    for value in values {
                        fm.write_u32(*value)?;
                    }
                }
                SourceStatement::Instruction(ins) => ins.write_output(fm)?,
                SourceStatement::Macro(site) => site.write_output(fm)?,
            }
        }
        Ok(())
    }

    /// Dump the final expansion of every statement, for debugging layout.
    pub fn write_temp_data<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for statement in &self.statements {
            match statement {
                SourceStatement::Label { name, .. } => writeln!(out, "{name}:")?,
                SourceStatement::Org { value, .. } => writeln!(out, ".org {value:#010X}")?,
                SourceStatement::Word { values, .. } => {
                    for value in values {
                        writeln!(out, "{value:08X}  .word")?;
                    }
                }
                SourceStatement::Instruction(ins) => ins.write_temp_data(out)?,
                SourceStatement::Macro(site) => site.write_temp_data(out)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &str) -> Vec<String> {
        source.lines().map(str::to_string).collect()
    }

    fn assembled(source: &str) -> Assembler {
        let mut asm = Assembler::new(0x8001_0000);
        asm.parse_source(&lines(source)).unwrap();
        asm.run_passes().unwrap();
        asm
    }

    #[test]
    fn forward_reference_resolves_against_the_previous_pass() {
        // `after` only exists with a provisional address on the first
        // pass; layout still converges on its settled value.
        let asm = assembled(
            "start: li $t0, after\n\
             after: jr $ra",
        );
        assert_eq!(asm.error_count(), 0);
        // li of 0x80010008 needs lui+ori: the site keeps both slots.
        assert_eq!(asm.symbols().get("after"), Some(0x8001_0008));
    }

    #[test]
    fn labels_move_as_sites_shrink() {
        // li 5 collapses to one instruction, pulling `end` back by four.
        let asm = assembled(
            "li $v0, 5\n\
             end: jr $ra",
        );
        assert_eq!(asm.error_count(), 0);
        assert_eq!(asm.symbols().get("end"), Some(0x8001_0004));
    }

    #[test]
    fn unknown_macro_aborts_parsing() {
        let mut asm = Assembler::new(0x8001_0000);
        let err = asm.parse_source(&lines("rol $v0, $v0, 3")).unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Macro);
        assert!(err.message().contains("rol"));
    }

    #[test]
    fn undefined_symbols_produce_one_error_per_site_in_order() {
        let mut asm = Assembler::new(0x8001_0000);
        asm.parse_source(&lines("li $t0, missing\nli $t1, also_missing\n"))
            .unwrap();
        asm.run_passes().unwrap();
        let diags = asm.diagnostics();
        assert_eq!(asm.error_count(), 2);
        assert_eq!(diags[0].line(), 1);
        assert!(diags[0].message().contains("missing"));
        assert_eq!(diags[1].line(), 2);
        assert!(diags[1].message().contains("also_missing"));
    }

    #[test]
    fn load_in_delay_slot_warns_unless_suppressed() {
        let warned = assembled(
            "beq $v0, $zero, skip\n\
             lw $t0, 0x80020000\n\
             skip: jr $ra",
        );
        assert_eq!(warned.warning_count(), 1);

        let silent = assembled(
            ".set noloaddelay\n\
             beq $v0, $zero, skip\n\
             lw $t0, 0x80020000\n\
             skip: jr $ra",
        );
        assert_eq!(silent.warning_count(), 0);
    }

    #[test]
    fn statement_after_branch_macro_sits_in_its_delay_slot() {
        // blt ends in a bne, so the following multi-opcode load is
        // hazardous just like after a plain branch.
        let asm = assembled(
            "blt $a0, $a1, skip\n\
             lw $t0, 0x80020000\n\
             skip: jr $ra",
        );
        assert_eq!(asm.error_count(), 0);
        assert_eq!(asm.warning_count(), 1);
    }

    #[test]
    fn org_moves_the_cursor_for_following_labels() {
        let asm = assembled(
            ".org 0x80020000\n\
             here: nop",
        );
        assert_eq!(asm.symbols().get("here"), Some(0x8002_0000));
    }

    #[test]
    fn word_value_wider_than_32_bits_is_an_error() {
        let asm = assembled(".word 1, 0x100000000");
        assert_eq!(asm.error_count(), 1);
        assert!(asm.diagnostics()[0].message().contains("32 bits"));
    }

    #[test]
    fn label_cannot_shadow_an_equate() {
        let asm = assembled(
            ".equ SIZE, 8\n\
             SIZE: nop",
        );
        assert!(asm.error_count() >= 1);
        assert!(asm
            .diagnostics()
            .iter()
            .any(|d| d.kind() == AsmErrorKind::Symbol));
    }

    #[test]
    fn pass_count_is_small_for_a_shrinking_job() {
        let mut asm = Assembler::new(0x8001_0000);
        asm.parse_source(&lines("li $v0, 5\nend: jr $ra")).unwrap();
        let passes = asm.run_passes().unwrap();
        // Pass 1 shrinks the site, pass 2 confirms the fixpoint.
        assert_eq!(passes, 2);
    }
}
