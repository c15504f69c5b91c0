// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source statements as the engine walks them each pass.

use std::io::{self, Write};

use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::expr::{eval_expr, EvalError, Expression};
use crate::core::filemanager::{FileError, FileManager};
use crate::mips::instruction::MipsInstruction;
use crate::mips::macro_site::MacroSite;
use crate::mips::LayoutContext;

/// `.set` options recognized by the MIPS target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmOption {
    LoadDelay,
    NoLoadDelay,
}

/// A plain (non-macro) instruction statement. Fixed four-byte size, but its
/// immediate operand is re-resolved on every pass because symbols move.
#[derive(Debug, Clone)]
pub struct InstructionStatement {
    line: u32,
    instruction: MipsInstruction,
    immediate: Option<Expression>,
    /// The immediate is a branch target address rather than a raw value.
    branch_target: bool,
}

impl InstructionStatement {
    pub fn new(
        instruction: MipsInstruction,
        immediate: Option<Expression>,
        branch_target: bool,
        line: u32,
    ) -> Self {
        Self {
            line,
            instruction,
            immediate,
            branch_target,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn is_branch(&self) -> bool {
        self.instruction.opcode().is_branch()
    }

    pub fn instruction(&self) -> &MipsInstruction {
        &self.instruction
    }

    /// Re-resolve the immediate against this pass's symbol values and
    /// validate the resulting fields.
    pub fn validate(&mut self, ctx: &LayoutContext, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(expr) = &self.immediate {
            match eval_expr(expr, ctx) {
                Ok(value) => {
                    if self.branch_target {
                        let next = ctx.position as i64 + 4;
                        if (value - next) % 4 != 0 {
                            diagnostics.push(Diagnostic::new(
                                self.line,
                                Severity::Error,
                                AsmError::new(
                                    AsmErrorKind::Instruction,
                                    "Branch target is not word-aligned",
                                    None,
                                ),
                            ));
                            return;
                        }
                        self.instruction.set_immediate((value - next) / 4);
                    } else {
                        self.instruction.set_immediate(value);
                    }
                }
                Err(err) => {
                    queue_eval_failure(&err, self.line, diagnostics);
                    return;
                }
            }
        }
        if let Err(messages) = self.instruction.validate() {
            for message in messages {
                diagnostics.push(Diagnostic::new(
                    self.line,
                    Severity::Error,
                    AsmError::new(AsmErrorKind::Instruction, &message, None),
                ));
            }
        }
    }

    pub fn encode(&mut self) {
        self.instruction.encode();
    }

    pub fn write_output(&self, fm: &mut FileManager) -> Result<(), FileError> {
        fm.write_u32(self.instruction.encoded())
    }

    pub fn write_temp_data<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.instruction.write_temp_data(out)
    }
}

/// One statement of the assembly job, in source order.
pub enum SourceStatement {
    Label {
        name: String,
        line: u32,
    },
    Org {
        expr: Expression,
        /// Evaluated target, refreshed each pass and used when writing.
        value: u64,
        line: u32,
    },
    Word {
        exprs: Vec<Expression>,
        /// Evaluated words, refreshed each pass.
        values: Vec<u32>,
        line: u32,
    },
    Instruction(InstructionStatement),
    Macro(MacroSite),
}

/// Map an evaluator failure onto Error diagnostics, substituting the
/// generic message when the evaluator has no detail.
pub(crate) fn queue_eval_failure(err: &EvalError, line: u32, diagnostics: &mut Vec<Diagnostic>) {
    if err.messages().is_empty() {
        diagnostics.push(Diagnostic::new(
            line,
            Severity::Error,
            AsmError::new(AsmErrorKind::Expression, "Invalid expression", None),
        ));
        return;
    }
    for message in err.messages() {
        diagnostics.push(Diagnostic::new(
            line,
            Severity::Error,
            AsmError::new(AsmErrorKind::Expression, message, None),
        ));
    }
}
