// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! One macro invocation site and its per-pass validation.
//!
//! A site is created when the statement is first parsed. It immediately
//! reserves address space for its declared maximum expansion so that later
//! statements get placeholder addresses, then shrinks toward its real size
//! as layout passes re-run its expansion with better symbol values.

use std::io::{self, Write};

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::expr::{eval_expr, EvalError, Expression};
use crate::core::filemanager::{FileError, FileManager};

use super::instruction::MipsInstruction;
use super::macros::{registry, MacroDef, MacroValues};
use super::{LayoutContext, MipsState, Register, INSTRUCTION_WIDTH};

/// Raw operand slots captured from the source statement: up to two
/// expressions and up to three register fields.
#[derive(Debug, Clone, Default)]
pub struct MacroOperands {
    pub expr1: Option<Expression>,
    pub expr2: Option<Expression>,
    pub rd: Option<Register>,
    pub rs: Option<Register>,
    pub rt: Option<Register>,
}

/// Result of one validation pass over a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteResult {
    /// Expansion size unchanged; the site has converged for this pass.
    Unchanged,
    /// Expansion size changed; every later address is now stale.
    SizeChanged,
    /// Operand evaluation failed; diagnostics were queued and the site's
    /// instructions are left unresolved for this pass.
    Failed,
}

#[derive(Debug)]
pub struct MacroSite {
    def: &'static MacroDef,
    line: u32,
    operands: MacroOperands,
    ignore_load_delay: bool,
    opcode_count: usize,
    space_needed: u64,
    instructions: Vec<MipsInstruction>,
}

impl MacroSite {
    /// Create a site for `mnemonic`, reserving `max_opcodes` instruction
    /// slots of address space by advancing `cursor`. Unknown mnemonics are
    /// fatal: without a definition the expansion size is unknowable.
    pub fn new(
        mnemonic: &str,
        operands: MacroOperands,
        state: &MipsState,
        cursor: &mut u64,
        line: u32,
    ) -> Result<Self, AsmError> {
        let def = registry()
            .get(mnemonic)
            .ok_or_else(|| AsmError::new(AsmErrorKind::Macro, "Unknown macro", Some(mnemonic)))?;
        let opcode_count = def.max_opcodes;
        let space_needed = opcode_count as u64 * INSTRUCTION_WIDTH;
        *cursor += space_needed;
        Ok(Self {
            def,
            line,
            operands,
            ignore_load_delay: state.ignore_load_delay,
            opcode_count,
            space_needed,
            instructions: vec![MipsInstruction::nop(); opcode_count],
        })
    }

    pub fn mnemonic(&self) -> &'static str {
        self.def.mnemonic
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn opcode_count(&self) -> usize {
        self.opcode_count
    }

    /// Bytes of address space currently reserved for this site.
    pub fn space_needed(&self) -> u64 {
        self.space_needed
    }

    pub fn instructions(&self) -> &[MipsInstruction] {
        &self.instructions
    }

    /// Operand values wider than 32 bits cannot be expressed by any
    /// expansion; reject them instead of silently wrapping.
    fn check_word_range(&self, value: i64, diagnostics: &mut Vec<Diagnostic>) -> Option<i64> {
        if super::fits_in_word(value) {
            return Some(value);
        }
        diagnostics.push(Diagnostic::new(
            self.line,
            Severity::Error,
            AsmError::new(
                AsmErrorKind::Expression,
                "Value does not fit in 32 bits",
                Some(&format!("0x{value:X}")),
            ),
        ));
        None
    }

    fn queue_eval_failure(&self, err: &EvalError, diagnostics: &mut Vec<Diagnostic>) {
        if err.messages().is_empty() {
            diagnostics.push(Diagnostic::new(
                self.line,
                Severity::Error,
                AsmError::new(AsmErrorKind::Expression, "Invalid expression", None),
            ));
            return;
        }
        for message in err.messages() {
            diagnostics.push(Diagnostic::new(
                self.line,
                Severity::Error,
                AsmError::new(AsmErrorKind::Expression, message, None),
            ));
        }
    }

    /// Run one layout pass over this site.
    ///
    /// Evaluates operands, re-runs the expansion rule, checks the delay
    /// slot hazard, validates each produced instruction, and reports
    /// whether the expansion size changed. Failures queue diagnostics and
    /// leave the previous size in place so the rest of the pass can
    /// continue collecting errors.
    pub fn validate(&mut self, ctx: &LayoutContext, diagnostics: &mut Vec<Diagnostic>) -> SiteResult {
        let mut values = MacroValues {
            i1: 0,
            i2: 0,
            rd: self.operands.rd.unwrap_or(Register::ZERO),
            rs: self.operands.rs.unwrap_or(Register::ZERO),
            rt: self.operands.rt.unwrap_or(Register::ZERO),
            position: ctx.position,
        };
        if let Some(expr) = &self.operands.expr1 {
            match eval_expr(expr, ctx) {
                Ok(value) => match self.check_word_range(value, diagnostics) {
                    Some(value) => values.i1 = value,
                    None => return SiteResult::Failed,
                },
                Err(err) => {
                    self.queue_eval_failure(&err, diagnostics);
                    return SiteResult::Failed;
                }
            }
        }
        if let Some(expr) = &self.operands.expr2 {
            match eval_expr(expr, ctx) {
                Ok(value) => match self.check_word_range(value, diagnostics) {
                    Some(value) => values.i2 = value,
                    None => return SiteResult::Failed,
                },
                Err(err) => {
                    self.queue_eval_failure(&err, diagnostics);
                    return SiteResult::Failed;
                }
            }
        }
        if self.def.flags.branch {
            // Offset is taken relative to the address after the branch's
            // delay slot; anything not word-aligned cannot be encoded.
            let delay_end = values.position as i64 + 2 * INSTRUCTION_WIDTH as i64;
            if (values.i1 - delay_end) % 4 != 0 {
                diagnostics.push(Diagnostic::new(
                    self.line,
                    Severity::Error,
                    AsmError::new(
                        AsmErrorKind::Instruction,
                        "Branch target is not word-aligned",
                        None,
                    ),
                ));
                return SiteResult::Failed;
            }
        }

        // Expansion always gets a maximum-sized buffer; the site buffer is
        // replaced exactly-sized below, keeping len == opcode_count.
        let mut produced = vec![MipsInstruction::nop(); self.def.max_opcodes];
        let count = (self.def.expand)(&values, self.def.flags, &mut produced);
        debug_assert!(
            count >= 1 && count <= self.def.max_opcodes,
            "expansion rule for {} broke its declared maximum",
            self.def.mnemonic
        );
        produced.truncate(count);

        if !self.ignore_load_delay && ctx.in_delay_slot && count > 1 {
            diagnostics.push(
                Diagnostic::new(
                    self.line,
                    Severity::Warning,
                    AsmError::new(
                        AsmErrorKind::Instruction,
                        "Macro with multiple opcodes used inside a delay slot",
                        None,
                    ),
                )
                .with_help("use `.set noloaddelay` to disable load delay checking"),
            );
        }

        // Per-instruction problems are queued but do not hide a size
        // change; layout still has to converge on the new size.
        for instruction in &produced {
            if let Err(messages) = instruction.validate() {
                for message in messages {
                    diagnostics.push(Diagnostic::new(
                        self.line,
                        Severity::Error,
                        AsmError::new(AsmErrorKind::Instruction, &message, None),
                    ));
                }
            }
        }

        let changed = count != self.opcode_count;
        self.opcode_count = count;
        self.space_needed = count as u64 * INSTRUCTION_WIDTH;
        self.instructions = produced;
        if changed {
            SiteResult::SizeChanged
        } else {
            SiteResult::Unchanged
        }
    }

    /// Encode every instruction in place. Only meaningful after the layout
    /// fixpoint has been reached; earlier calls produce stale encodings.
    pub fn encode(&mut self) {
        for instruction in &mut self.instructions {
            instruction.encode();
        }
    }

    /// Stream the encoded words through the file manager, in order.
    pub fn write_output(&self, fm: &mut FileManager) -> Result<(), FileError> {
        for instruction in &self.instructions {
            fm.write_u32(instruction.encoded())?;
        }
        Ok(())
    }

    /// Dump the current expansion for intermediate/debug output.
    pub fn write_temp_data<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for instruction in &self.instructions {
            instruction.write_temp_data(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::SymbolTable;

    fn site(mnemonic: &str, expr: &str) -> (MacroSite, u64) {
        let operands = MacroOperands {
            expr1: Some(Expression::parse(expr).unwrap()),
            rt: Register::parse("a0"),
            rs: Register::parse("a1"),
            ..MacroOperands::default()
        };
        let mut cursor = 0x8001_0000;
        let state = MipsState::default();
        let site = MacroSite::new(mnemonic, operands, &state, &mut cursor, 1).unwrap();
        (site, cursor)
    }

    #[test]
    fn construction_reserves_maximum_space() {
        let (site, cursor) = site("li", "1");
        assert_eq!(site.opcode_count(), 2);
        assert_eq!(site.space_needed(), 8);
        assert_eq!(cursor, 0x8001_0008);
    }

    #[test]
    fn unknown_macro_fails_construction() {
        let mut cursor = 0;
        let err = MacroSite::new(
            "rol",
            MacroOperands::default(),
            &MipsState::default(),
            &mut cursor,
            1,
        )
        .unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Macro);
        assert_eq!(cursor, 0, "failed construction must not reserve space");
    }

    #[test]
    fn shrinking_expansion_reports_change_then_converges() {
        let (mut site, _) = site("li", "5");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();

        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        assert_eq!(site.validate(&ctx, &mut diagnostics), SiteResult::SizeChanged);
        assert_eq!(site.opcode_count(), 1);
        assert_eq!(site.space_needed(), 4);
        assert_eq!(site.instructions().len(), site.opcode_count());

        assert_eq!(site.validate(&ctx, &mut diagnostics), SiteResult::Unchanged);
        assert_eq!(site.instructions().len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn buffer_length_tracks_count_after_every_validate() {
        let (mut site, _) = site("li", "0x12345678");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        for _ in 0..3 {
            site.validate(&ctx, &mut diagnostics);
            assert_eq!(site.instructions().len(), site.opcode_count());
            assert_eq!(
                site.space_needed(),
                site.opcode_count() as u64 * INSTRUCTION_WIDTH
            );
        }
        assert_eq!(site.opcode_count(), 2);
    }

    #[test]
    fn evaluation_failure_queues_error_and_blocks_nothing_else() {
        let (mut site, _) = site("li", "missing");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        assert_eq!(site.validate(&ctx, &mut diagnostics), SiteResult::Failed);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity(), Severity::Error);
        assert!(diagnostics[0].message().contains("missing"));
    }

    #[test]
    fn operand_wider_than_a_word_is_rejected() {
        let (mut site, _) = site("li", "0x100000000");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        assert_eq!(site.validate(&ctx, &mut diagnostics), SiteResult::Failed);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity(), Severity::Error);
        assert!(diagnostics[0].message().contains("32 bits"));
    }

    #[test]
    fn branch_macro_rejects_misaligned_target() {
        let (mut site, _) = site("blt", "0x80010009");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        assert_eq!(site.validate(&ctx, &mut diagnostics), SiteResult::Failed);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message().contains("word-aligned"));
    }

    #[test]
    fn multi_opcode_macro_in_delay_slot_warns_once_without_failing() {
        let (mut site, _) = site("blt", "0x8001_0100");
        let mut symbols = SymbolTable::new();
        symbols.set("target", 0x8001_0100).unwrap();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, true);

        let result = site.validate(&ctx, &mut diagnostics);
        assert_ne!(result, SiteResult::Failed);
        let warnings: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message().contains("delay slot"));
        assert!(warnings[0].help()[0].contains("noloaddelay"));
    }

    #[test]
    fn delay_slot_warning_suppressed_by_mode_flag() {
        let operands = MacroOperands {
            expr1: Some(Expression::parse("0x8001_0100").unwrap()),
            rs: Register::parse("a0"),
            rt: Register::parse("a1"),
            ..MacroOperands::default()
        };
        let mut cursor = 0x8001_0000;
        let state = MipsState {
            ignore_load_delay: true,
        };
        let mut site = MacroSite::new("blt", operands, &state, &mut cursor, 1).unwrap();
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, true);
        site.validate(&ctx, &mut diagnostics);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn encode_then_write_temp_data_lists_each_opcode() {
        let (mut site, _) = site("li", "0x12345678");
        let symbols = SymbolTable::new();
        let mut diagnostics = Vec::new();
        let ctx = LayoutContext::new(&symbols, 0x8001_0000, false);
        site.validate(&ctx, &mut diagnostics);
        site.validate(&ctx, &mut diagnostics);
        site.encode();

        let mut out = Vec::new();
        site.write_temp_data(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("3C041234")); // lui a0, 0x1234
        assert!(lines[1].starts_with("34845678")); // ori a0, a0, 0x5678
    }
}
