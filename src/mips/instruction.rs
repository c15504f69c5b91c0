// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! MIPS-I instruction records and their bit-level encoding.
//!
//! Instructions carry resolved operand values; `validate` checks field
//! ranges before `encode` produces the final 32-bit pattern.

use std::fmt;
use std::io::{self, Write};

use super::Register;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // R-type
    Addu,
    And,
    Jr,
    Nor,
    Or,
    Sll,
    Slt,
    Sltu,
    Sra,
    Srl,
    Subu,
    Xor,
    // I-type
    Addiu,
    Andi,
    Beq,
    Bne,
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lui,
    Lw,
    Ori,
    Sb,
    Sh,
    Slti,
    Sltiu,
    Sw,
    Xori,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Register,
    Shift,
    Jump,
    Immediate,
    Memory,
    Branch,
    LoadUpper,
}

impl Opcode {
    fn format(self) -> Format {
        match self {
            Opcode::Addu
            | Opcode::And
            | Opcode::Nor
            | Opcode::Or
            | Opcode::Slt
            | Opcode::Sltu
            | Opcode::Subu
            | Opcode::Xor => Format::Register,
            Opcode::Sll | Opcode::Sra | Opcode::Srl => Format::Shift,
            Opcode::Jr => Format::Jump,
            Opcode::Addiu | Opcode::Andi | Opcode::Ori | Opcode::Slti | Opcode::Sltiu
            | Opcode::Xori => Format::Immediate,
            Opcode::Lb
            | Opcode::Lbu
            | Opcode::Lh
            | Opcode::Lhu
            | Opcode::Lw
            | Opcode::Sb
            | Opcode::Sh
            | Opcode::Sw => Format::Memory,
            Opcode::Beq | Opcode::Bne => Format::Branch,
            Opcode::Lui => Format::LoadUpper,
        }
    }

    /// Primary opcode field for I-type, or the funct field for R-type.
    fn code(self) -> u32 {
        match self {
            Opcode::Sll => 0x00,
            Opcode::Srl => 0x02,
            Opcode::Sra => 0x03,
            Opcode::Jr => 0x08,
            Opcode::Addu => 0x21,
            Opcode::Subu => 0x23,
            Opcode::And => 0x24,
            Opcode::Or => 0x25,
            Opcode::Xor => 0x26,
            Opcode::Nor => 0x27,
            Opcode::Slt => 0x2a,
            Opcode::Sltu => 0x2b,
            Opcode::Beq => 0x04,
            Opcode::Bne => 0x05,
            Opcode::Addiu => 0x09,
            Opcode::Slti => 0x0a,
            Opcode::Sltiu => 0x0b,
            Opcode::Andi => 0x0c,
            Opcode::Ori => 0x0d,
            Opcode::Xori => 0x0e,
            Opcode::Lui => 0x0f,
            Opcode::Lb => 0x20,
            Opcode::Lh => 0x21,
            Opcode::Lw => 0x23,
            Opcode::Lbu => 0x24,
            Opcode::Lhu => 0x25,
            Opcode::Sb => 0x28,
            Opcode::Sh => 0x29,
            Opcode::Sw => 0x2b,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Addu => "addu",
            Opcode::And => "and",
            Opcode::Jr => "jr",
            Opcode::Nor => "nor",
            Opcode::Or => "or",
            Opcode::Sll => "sll",
            Opcode::Slt => "slt",
            Opcode::Sltu => "sltu",
            Opcode::Sra => "sra",
            Opcode::Srl => "srl",
            Opcode::Subu => "subu",
            Opcode::Xor => "xor",
            Opcode::Addiu => "addiu",
            Opcode::Andi => "andi",
            Opcode::Beq => "beq",
            Opcode::Bne => "bne",
            Opcode::Lb => "lb",
            Opcode::Lbu => "lbu",
            Opcode::Lh => "lh",
            Opcode::Lhu => "lhu",
            Opcode::Lui => "lui",
            Opcode::Lw => "lw",
            Opcode::Ori => "ori",
            Opcode::Sb => "sb",
            Opcode::Sh => "sh",
            Opcode::Slti => "slti",
            Opcode::Sltiu => "sltiu",
            Opcode::Sw => "sw",
            Opcode::Xori => "xori",
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Beq | Opcode::Bne | Opcode::Jr)
    }
}

/// One concrete instruction record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipsInstruction {
    opcode: Opcode,
    rs: Register,
    rt: Register,
    rd: Register,
    shamt: u8,
    immediate: i64,
    encoded: u32,
}

impl MipsInstruction {
    fn raw(opcode: Opcode) -> Self {
        Self {
            opcode,
            rs: Register::ZERO,
            rt: Register::ZERO,
            rd: Register::ZERO,
            shamt: 0,
            immediate: 0,
            encoded: 0,
        }
    }

    /// `op rd, rs, rt`
    pub fn r_type(opcode: Opcode, rd: Register, rs: Register, rt: Register) -> Self {
        Self {
            rd,
            rs,
            rt,
            ..Self::raw(opcode)
        }
    }

    /// `op rd, rt, shamt`
    pub fn shift(opcode: Opcode, rd: Register, rt: Register, shamt: u8) -> Self {
        Self {
            rd,
            rt,
            shamt,
            ..Self::raw(opcode)
        }
    }

    /// `jr rs`
    pub fn jr(rs: Register) -> Self {
        Self {
            rs,
            ..Self::raw(Opcode::Jr)
        }
    }

    /// `op rt, rs, imm` — also covers loads/stores (`rt, imm(rs)`),
    /// branches (`rs, rt, offset` in words), and `lui rt, imm`.
    pub fn i_type(opcode: Opcode, rt: Register, rs: Register, immediate: i64) -> Self {
        Self {
            rt,
            rs,
            immediate,
            ..Self::raw(opcode)
        }
    }

    /// `sll zero, zero, 0`
    pub fn nop() -> Self {
        Self::raw(Opcode::Sll)
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn immediate(&self) -> i64 {
        self.immediate
    }

    pub fn set_immediate(&mut self, immediate: i64) {
        self.immediate = immediate;
    }

    /// Pre-encode field validation. Returns all problems, not just the
    /// first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut messages = Vec::new();
        if self.shamt > 31 {
            messages.push(format!("Shift amount {} out of range", self.shamt));
        }
        match self.opcode.format() {
            Format::Immediate | Format::Memory | Format::Branch => {
                let unsigned = matches!(self.opcode, Opcode::Andi | Opcode::Ori | Opcode::Xori);
                let in_range = if unsigned {
                    (0..=0xFFFF).contains(&self.immediate)
                } else {
                    (-0x8000..=0x7FFF).contains(&self.immediate)
                };
                if !in_range {
                    messages.push(format!(
                        "Immediate 0x{:X} does not fit in 16 bits for {}",
                        self.immediate,
                        self.opcode.mnemonic()
                    ));
                }
            }
            Format::LoadUpper => {
                if !(0..=0xFFFF).contains(&self.immediate) {
                    messages.push(format!(
                        "Upper immediate 0x{:X} does not fit in 16 bits",
                        self.immediate
                    ));
                }
            }
            Format::Register | Format::Shift | Format::Jump => {}
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    /// Produce the final bit pattern. Operand values must already be
    /// resolved and validated.
    pub fn encode(&mut self) {
        let rs = u32::from(self.rs.index());
        let rt = u32::from(self.rt.index());
        let rd = u32::from(self.rd.index());
        let shamt = u32::from(self.shamt);
        let imm = (self.immediate as u32) & 0xFFFF;
        self.encoded = match self.opcode.format() {
            Format::Register => (rs << 21) | (rt << 16) | (rd << 11) | self.opcode.code(),
            Format::Shift => (rt << 16) | (rd << 11) | (shamt << 6) | self.opcode.code(),
            Format::Jump => (rs << 21) | self.opcode.code(),
            Format::Immediate | Format::Memory | Format::Branch | Format::LoadUpper => {
                (self.opcode.code() << 26) | (rs << 21) | (rt << 16) | imm
            }
        };
    }

    pub fn encoded(&self) -> u32 {
        self.encoded
    }

    /// Debug dump hook used for intermediate output between passes.
    pub fn write_temp_data<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{:08X}  {}", self.encoded, self)
    }
}

impl fmt::Display for MipsInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode.mnemonic();
        match self.opcode.format() {
            Format::Register => write!(
                f,
                "{mnemonic} {}, {}, {}",
                self.rd.name(),
                self.rs.name(),
                self.rt.name()
            ),
            Format::Shift => write!(
                f,
                "{mnemonic} {}, {}, {}",
                self.rd.name(),
                self.rt.name(),
                self.shamt
            ),
            Format::Jump => write!(f, "{mnemonic} {}", self.rs.name()),
            Format::Immediate => write!(
                f,
                "{mnemonic} {}, {}, 0x{:X}",
                self.rt.name(),
                self.rs.name(),
                self.immediate & 0xFFFF
            ),
            Format::Memory => write!(
                f,
                "{mnemonic} {}, {}({})",
                self.rt.name(),
                self.immediate,
                self.rs.name()
            ),
            Format::Branch => write!(
                f,
                "{mnemonic} {}, {}, {}",
                self.rs.name(),
                self.rt.name(),
                self.immediate
            ),
            Format::LoadUpper => {
                write!(f, "{mnemonic} {}, 0x{:X}", self.rt.name(), self.immediate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Register {
        Register::parse(name).unwrap()
    }

    fn encoded(mut ins: MipsInstruction) -> u32 {
        ins.validate().unwrap();
        ins.encode();
        ins.encoded()
    }

    #[test]
    fn encodes_known_bit_patterns() {
        assert_eq!(
            encoded(MipsInstruction::i_type(
                Opcode::Addiu,
                reg("v0"),
                Register::ZERO,
                1
            )),
            0x2402_0001
        );
        assert_eq!(
            encoded(MipsInstruction::i_type(
                Opcode::Lui,
                reg("t0"),
                Register::ZERO,
                0x8001
            )),
            0x3C08_8001
        );
        assert_eq!(
            encoded(MipsInstruction::i_type(
                Opcode::Ori,
                reg("v0"),
                reg("v0"),
                0x5678
            )),
            0x3442_5678
        );
        assert_eq!(
            encoded(MipsInstruction::i_type(Opcode::Lw, reg("a0"), reg("sp"), -4)),
            0x8FA4_FFFC
        );
        assert_eq!(
            encoded(MipsInstruction::r_type(
                Opcode::Addu,
                reg("a0"),
                reg("a1"),
                reg("a2")
            )),
            0x00A6_2021
        );
        assert_eq!(
            encoded(MipsInstruction::shift(Opcode::Sra, reg("v0"), reg("v0"), 2)),
            0x0002_1083
        );
        assert_eq!(encoded(MipsInstruction::jr(reg("ra"))), 0x03E0_0008);
        assert_eq!(encoded(MipsInstruction::nop()), 0x0000_0000);
    }

    #[test]
    fn validate_checks_immediate_ranges() {
        let too_big = MipsInstruction::i_type(Opcode::Addiu, reg("v0"), Register::ZERO, 0x8000);
        assert!(too_big.validate().is_err());

        let negative_logical = MipsInstruction::i_type(Opcode::Ori, reg("v0"), reg("v0"), -1);
        assert!(negative_logical.validate().is_err());

        let max_logical = MipsInstruction::i_type(Opcode::Ori, reg("v0"), reg("v0"), 0xFFFF);
        assert!(max_logical.validate().is_ok());

        let branch = MipsInstruction::i_type(Opcode::Bne, reg("at"), Register::ZERO, -0x8000);
        assert!(branch.validate().is_ok());
        let far = MipsInstruction::i_type(Opcode::Bne, reg("at"), Register::ZERO, 0x8000);
        assert!(far.validate().is_err());
    }

    #[test]
    fn temp_data_contains_encoding_and_mnemonic() {
        let mut ins = MipsInstruction::i_type(Opcode::Addiu, reg("v0"), Register::ZERO, 1);
        ins.encode();
        let mut out = Vec::new();
        ins.write_temp_data(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("24020001"));
        assert!(text.contains("addiu v0, zero, 0x1"));
    }
}
