// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line-oriented source parser.
//!
//! Each line is at most one optional label followed by one optional
//! statement. The parser classifies mnemonics structurally: anything with
//! an entry in the plain-opcode table is a fixed-size instruction, and
//! every other mnemonic is handed to the macro layer, which is the one
//! place that knows which macros exist.

use crate::core::error::{AsmError, AsmErrorKind};
use crate::core::expr::Expression;
use crate::mips::instruction::{MipsInstruction, Opcode};
use crate::mips::macro_site::MacroOperands;
use crate::mips::Register;

use super::statement::AsmOption;

/// Statement shape as parsed, before the engine assigns addresses.
#[derive(Debug)]
pub enum ParsedStatement {
    Org(Expression),
    Word(Vec<Expression>),
    Equ {
        name: String,
        expr: Expression,
    },
    SetOption(AsmOption),
    Instruction {
        instruction: MipsInstruction,
        immediate: Option<Expression>,
        branch_target: bool,
    },
    Macro {
        mnemonic: String,
        operands: MacroOperands,
    },
}

#[derive(Debug, Default)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub statement: Option<ParsedStatement>,
}

/// The operand layouts of the fixed-size instruction set.
enum PlainForm {
    /// `op rd, rs, rt`
    ThreeReg,
    /// `op rd, rt, shamt`
    Shift,
    /// `op rs`
    JumpReg,
    /// `op rt, rs, imm`
    RegRegImm,
    /// `op rt, off(base)`
    Memory,
    /// `op rs, rt, target`
    Branch,
    /// `op rt, imm`
    LoadUpper,
    /// `op`
    Bare,
}

fn plain_form(mnemonic: &str) -> Option<(Opcode, PlainForm)> {
    let entry = match mnemonic {
        "addu" => (Opcode::Addu, PlainForm::ThreeReg),
        "subu" => (Opcode::Subu, PlainForm::ThreeReg),
        "and" => (Opcode::And, PlainForm::ThreeReg),
        "or" => (Opcode::Or, PlainForm::ThreeReg),
        "xor" => (Opcode::Xor, PlainForm::ThreeReg),
        "nor" => (Opcode::Nor, PlainForm::ThreeReg),
        "slt" => (Opcode::Slt, PlainForm::ThreeReg),
        "sltu" => (Opcode::Sltu, PlainForm::ThreeReg),
        "sll" => (Opcode::Sll, PlainForm::Shift),
        "srl" => (Opcode::Srl, PlainForm::Shift),
        "sra" => (Opcode::Sra, PlainForm::Shift),
        "jr" => (Opcode::Jr, PlainForm::JumpReg),
        "addiu" => (Opcode::Addiu, PlainForm::RegRegImm),
        "slti" => (Opcode::Slti, PlainForm::RegRegImm),
        "sltiu" => (Opcode::Sltiu, PlainForm::RegRegImm),
        "andi" => (Opcode::Andi, PlainForm::RegRegImm),
        "ori" => (Opcode::Ori, PlainForm::RegRegImm),
        "xori" => (Opcode::Xori, PlainForm::RegRegImm),
        "lb" => (Opcode::Lb, PlainForm::Memory),
        "lbu" => (Opcode::Lbu, PlainForm::Memory),
        "lh" => (Opcode::Lh, PlainForm::Memory),
        "lhu" => (Opcode::Lhu, PlainForm::Memory),
        "lw" => (Opcode::Lw, PlainForm::Memory),
        "sb" => (Opcode::Sb, PlainForm::Memory),
        "sh" => (Opcode::Sh, PlainForm::Memory),
        "sw" => (Opcode::Sw, PlainForm::Memory),
        "beq" => (Opcode::Beq, PlainForm::Branch),
        "bne" => (Opcode::Bne, PlainForm::Branch),
        "lui" => (Opcode::Lui, PlainForm::LoadUpper),
        "nop" => (Opcode::Sll, PlainForm::Bare),
        _ => return None,
    };
    Some(entry)
}

fn parse_error(msg: &str, param: Option<&str>) -> AsmError {
    AsmError::new(AsmErrorKind::Parser, msg, param)
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c| c == '#' || c == ';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_register(text: &str) -> Result<Register, AsmError> {
    Register::parse(text.trim()).ok_or_else(|| parse_error("Invalid register", Some(text.trim())))
}

fn parse_expression(text: &str) -> Result<Expression, AsmError> {
    let text = text.trim();
    Expression::parse(text).map_err(|err| match err.messages().first() {
        Some(msg) => parse_error(msg, Some(text)),
        None => parse_error("Invalid expression", Some(text)),
    })
}

/// Split `off(base)` into its offset expression and base register. An
/// empty offset means zero.
fn parse_mem_operand(text: &str) -> Result<(Expression, Register), AsmError> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| parse_error("Expected offset(base) operand", Some(text)))?;
    let close = text
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| parse_error("Unterminated base register", Some(text)))?;
    let offset = text[..open].trim();
    let base = parse_register(&text[open + 1..close])?;
    let offset = if offset.is_empty() {
        Expression::Number(0)
    } else {
        parse_expression(offset)?
    };
    Ok((offset, base))
}

fn split_operands(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.split(',').map(str::trim).collect()
}

fn expect_operands<'a>(
    mnemonic: &str,
    operands: &'a [&'a str],
    count: usize,
) -> Result<&'a [&'a str], AsmError> {
    if operands.len() != count {
        return Err(parse_error("Wrong operand count", Some(mnemonic)));
    }
    Ok(operands)
}

fn parse_plain(
    opcode: Opcode,
    form: PlainForm,
    mnemonic: &str,
    operands: &[&str],
) -> Result<ParsedStatement, AsmError> {
    let (instruction, immediate, branch_target) = match form {
        PlainForm::ThreeReg => {
            let ops = expect_operands(mnemonic, operands, 3)?;
            let rd = parse_register(ops[0])?;
            let rs = parse_register(ops[1])?;
            let rt = parse_register(ops[2])?;
            (MipsInstruction::r_type(opcode, rd, rs, rt), None, false)
        }
        PlainForm::Shift => {
            let ops = expect_operands(mnemonic, operands, 3)?;
            let rd = parse_register(ops[0])?;
            let rt = parse_register(ops[1])?;
            let shamt = match parse_expression(ops[2])? {
                Expression::Number(n) if (0..32).contains(&n) => n as u8,
                _ => return Err(parse_error("Shift amount must be a constant 0..31", None)),
            };
            (MipsInstruction::shift(opcode, rd, rt, shamt), None, false)
        }
        PlainForm::JumpReg => {
            let ops = expect_operands(mnemonic, operands, 1)?;
            (MipsInstruction::jr(parse_register(ops[0])?), None, false)
        }
        PlainForm::RegRegImm => {
            let ops = expect_operands(mnemonic, operands, 3)?;
            let rt = parse_register(ops[0])?;
            let rs = parse_register(ops[1])?;
            let imm = parse_expression(ops[2])?;
            (
                MipsInstruction::i_type(opcode, rt, rs, 0),
                Some(imm),
                false,
            )
        }
        PlainForm::Memory => {
            let ops = expect_operands(mnemonic, operands, 2)?;
            let rt = parse_register(ops[0])?;
            let (offset, base) = parse_mem_operand(ops[1])?;
            (
                MipsInstruction::i_type(opcode, rt, base, 0),
                Some(offset),
                false,
            )
        }
        PlainForm::Branch => {
            let ops = expect_operands(mnemonic, operands, 3)?;
            let rs = parse_register(ops[0])?;
            let rt = parse_register(ops[1])?;
            let target = parse_expression(ops[2])?;
            (
                MipsInstruction::i_type(opcode, rt, rs, 0),
                Some(target),
                true,
            )
        }
        PlainForm::LoadUpper => {
            let ops = expect_operands(mnemonic, operands, 2)?;
            let rt = parse_register(ops[0])?;
            let imm = parse_expression(ops[1])?;
            (
                MipsInstruction::i_type(opcode, rt, Register::ZERO, 0),
                Some(imm),
                false,
            )
        }
        PlainForm::Bare => {
            expect_operands(mnemonic, operands, 0)?;
            (MipsInstruction::nop(), None, false)
        }
    };
    Ok(ParsedStatement::Instruction {
        instruction,
        immediate,
        branch_target,
    })
}

/// Build the operand slots for a macro mnemonic. Mnemonics without a
/// known layout pass through with empty operands; the macro layer rejects
/// them by name.
fn parse_macro(mnemonic: &str, operands: &[&str]) -> Result<ParsedStatement, AsmError> {
    let mut slots = MacroOperands::default();
    match mnemonic {
        "li" | "la" | "lw" | "sw" => {
            let ops = expect_operands(mnemonic, operands, 2)?;
            slots.rt = Some(parse_register(ops[0])?);
            slots.expr1 = Some(parse_expression(ops[1])?);
        }
        "abs" => {
            let ops = expect_operands(mnemonic, operands, 2)?;
            slots.rd = Some(parse_register(ops[0])?);
            slots.rs = Some(parse_register(ops[1])?);
        }
        "blt" | "bge" => {
            let ops = expect_operands(mnemonic, operands, 3)?;
            slots.rs = Some(parse_register(ops[0])?);
            slots.rt = Some(parse_register(ops[1])?);
            slots.expr1 = Some(parse_expression(ops[2])?);
        }
        _ => {}
    }
    Ok(ParsedStatement::Macro {
        mnemonic: mnemonic.to_string(),
        operands: slots,
    })
}

fn parse_directive(name: &str, rest: &str) -> Result<ParsedStatement, AsmError> {
    match name {
        ".org" => Ok(ParsedStatement::Org(parse_expression(rest)?)),
        ".word" | ".dw" => {
            let operands = split_operands(rest);
            if operands.is_empty() {
                return Err(parse_error("Expected at least one value", Some(name)));
            }
            let exprs = operands
                .iter()
                .map(|op| parse_expression(op))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParsedStatement::Word(exprs))
        }
        ".equ" => {
            let operands = split_operands(rest);
            let ops = expect_operands(name, &operands, 2)?;
            if ops[0].is_empty() || !ops[0].chars().all(is_label_char) {
                return Err(parse_error("Invalid symbol name", Some(ops[0])));
            }
            Ok(ParsedStatement::Equ {
                name: ops[0].to_string(),
                expr: parse_expression(ops[1])?,
            })
        }
        ".set" => match rest.trim() {
            "noloaddelay" => Ok(ParsedStatement::SetOption(AsmOption::NoLoadDelay)),
            "loaddelay" => Ok(ParsedStatement::SetOption(AsmOption::LoadDelay)),
            other => Err(parse_error("Unknown .set option", Some(other))),
        },
        _ => Err(parse_error("Unknown directive", Some(name))),
    }
}

/// A `lw`/`sw` with a parenthesized second operand is the real hardware
/// instruction; the flat form is the absolute-address macro.
fn memory_mnemonic_is_plain(operands: &[&str]) -> bool {
    operands.len() == 2 && operands[1].contains('(')
}

pub fn parse_line(line: &str) -> Result<ParsedLine, AsmError> {
    let mut text = strip_comment(line).trim();
    let mut parsed = ParsedLine::default();

    if let Some(colon) = text.find(':') {
        let candidate = text[..colon].trim();
        if !candidate.is_empty() && candidate.chars().all(is_label_char) {
            parsed.label = Some(candidate.to_string());
            text = text[colon + 1..].trim();
        }
    }
    if text.is_empty() {
        return Ok(parsed);
    }

    let (head, rest) = match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim()),
        None => (text, ""),
    };

    let statement = if head.starts_with('.') {
        parse_directive(head, rest)?
    } else {
        let operands = split_operands(rest);
        match plain_form(head) {
            Some((opcode, form))
                if !matches!(form, PlainForm::Memory) || memory_mnemonic_is_plain(&operands) =>
            {
                parse_plain(opcode, form, head, &operands)?
            }
            _ => parse_macro(head, &operands)?,
        }
    };
    parsed.statement = Some(statement);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(line: &str) -> ParsedStatement {
        parse_line(line).unwrap().statement.unwrap()
    }

    #[test]
    fn label_and_instruction_on_one_line() {
        let parsed = parse_line("loop: addiu $v0, $v0, 1  # bump").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("loop"));
        assert!(matches!(
            parsed.statement,
            Some(ParsedStatement::Instruction { .. })
        ));
    }

    #[test]
    fn blank_and_comment_lines_parse_to_nothing() {
        let parsed = parse_line("   ; nothing here").unwrap();
        assert!(parsed.label.is_none());
        assert!(parsed.statement.is_none());
    }

    #[test]
    fn parenthesized_memory_operand_is_a_plain_instruction() {
        match statement("lw $a0, -4($sp)") {
            ParsedStatement::Instruction {
                instruction,
                immediate,
                branch_target,
            } => {
                assert_eq!(instruction.opcode(), Opcode::Lw);
                assert!(immediate.is_some());
                assert!(!branch_target);
            }
            other => panic!("expected plain lw, got {other:?}"),
        }
    }

    #[test]
    fn flat_memory_operand_is_the_absolute_address_macro() {
        match statement("lw $a0, buffer") {
            ParsedStatement::Macro { mnemonic, operands } => {
                assert_eq!(mnemonic, "lw");
                assert!(operands.expr1.is_some());
                assert!(operands.rt.is_some());
            }
            other => panic!("expected lw macro, got {other:?}"),
        }
    }

    #[test]
    fn unknown_mnemonic_falls_through_to_the_macro_layer() {
        match statement("rol $v0, $v0, 3") {
            ParsedStatement::Macro { mnemonic, .. } => assert_eq!(mnemonic, "rol"),
            other => panic!("expected macro passthrough, got {other:?}"),
        }
    }

    #[test]
    fn branch_statement_marks_its_target() {
        match statement("bne $v0, $zero, loop") {
            ParsedStatement::Instruction { branch_target, .. } => assert!(branch_target),
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn directives_parse() {
        assert!(matches!(statement(".org 0x80010000"), ParsedStatement::Org(_)));
        assert!(matches!(
            statement(".word 1, 2, 0x8001_0000"),
            ParsedStatement::Word(ref exprs) if exprs.len() == 3
        ));
        assert!(matches!(
            statement(".set noloaddelay"),
            ParsedStatement::SetOption(AsmOption::NoLoadDelay)
        ));
        assert!(matches!(
            statement(".equ SIZE, 0x40"),
            ParsedStatement::Equ { ref name, .. } if name == "SIZE"
        ));
        assert!(parse_line(".align 4").is_err());
    }

    #[test]
    fn operand_count_errors_name_the_mnemonic() {
        let err = parse_line("addu $v0, $v1").unwrap_err();
        assert!(err.message().contains("addu"));
    }
}
