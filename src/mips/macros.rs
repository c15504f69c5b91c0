// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! The macro definition registry.
//!
//! Each definition declares the most instructions its expansion can ever
//! produce, an operand-flag set, and the expansion rule itself. The rule
//! writes into the caller's buffer and returns the count actually used,
//! which is what drives the fixpoint layout: a macro may shrink once the
//! symbols it references settle.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::instruction::{MipsInstruction, Opcode};
use super::Register;

/// Operand flags selecting a variant of a shared expansion rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroFlags {
    /// Memory macro writes instead of reads.
    pub store: bool,
    /// Branch macro inverts the comparison (`bge` instead of `blt`).
    pub invert: bool,
    /// Expansion ends in a branch; the target must be word-aligned.
    pub branch: bool,
}

/// Resolved operand values handed to an expansion rule.
#[derive(Debug, Clone, Copy)]
pub struct MacroValues {
    pub i1: i64,
    pub i2: i64,
    pub rd: Register,
    pub rs: Register,
    pub rt: Register,
    /// Virtual address of the site's first instruction this pass.
    pub position: u64,
}

pub type ExpandFn = fn(&MacroValues, MacroFlags, &mut [MipsInstruction]) -> usize;

/// Capability record for one macro kind.
#[derive(Debug)]
pub struct MacroDef {
    pub mnemonic: &'static str,
    pub max_opcodes: usize,
    pub flags: MacroFlags,
    pub expand: ExpandFn,
}

const STORE: MacroFlags = MacroFlags {
    store: true,
    invert: false,
    branch: false,
};
const BRANCH: MacroFlags = MacroFlags {
    store: false,
    invert: false,
    branch: true,
};
const INVERT: MacroFlags = MacroFlags {
    store: false,
    invert: true,
    branch: true,
};
const NONE: MacroFlags = MacroFlags {
    store: false,
    invert: false,
    branch: false,
};

static DEFS: [MacroDef; 7] = [
    MacroDef {
        mnemonic: "li",
        max_opcodes: 2,
        flags: NONE,
        expand: expand_load_immediate,
    },
    MacroDef {
        mnemonic: "la",
        max_opcodes: 2,
        flags: NONE,
        expand: expand_load_address,
    },
    MacroDef {
        mnemonic: "abs",
        max_opcodes: 3,
        flags: NONE,
        expand: expand_abs,
    },
    MacroDef {
        mnemonic: "lw",
        max_opcodes: 2,
        flags: NONE,
        expand: expand_memory,
    },
    MacroDef {
        mnemonic: "sw",
        max_opcodes: 2,
        flags: STORE,
        expand: expand_memory,
    },
    MacroDef {
        mnemonic: "blt",
        max_opcodes: 2,
        flags: BRANCH,
        expand: expand_branch_compare,
    },
    MacroDef {
        mnemonic: "bge",
        max_opcodes: 2,
        flags: INVERT,
        expand: expand_branch_compare,
    },
];

/// Immutable mapping from macro mnemonic to its capability record,
/// resolved once at startup.
pub struct MacroRegistry {
    defs: HashMap<&'static str, &'static MacroDef>,
}

impl MacroRegistry {
    fn new() -> Self {
        Self {
            defs: DEFS.iter().map(|def| (def.mnemonic, def)).collect(),
        }
    }

    pub fn get(&self, mnemonic: &str) -> Option<&'static MacroDef> {
        self.defs.get(mnemonic).copied()
    }

    pub fn mnemonics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.defs.keys().copied()
    }
}

pub fn registry() -> &'static MacroRegistry {
    static REGISTRY: OnceLock<MacroRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MacroRegistry::new)
}

fn fits_i16(value: i64) -> bool {
    (-0x8000..=0x7FFF).contains(&value)
}

fn fits_u16(value: i64) -> bool {
    (0..=0xFFFF).contains(&value)
}

/// High half for a lui/addiu pair, carry-adjusted because the low half is
/// sign-extended by addiu and memory offsets.
fn hi_carry(value: i64) -> i64 {
    ((value + 0x8000) >> 16) & 0xFFFF
}

/// Low half as the sign-extended value addiu will add back.
fn lo_signed(value: i64) -> i64 {
    ((value & 0xFFFF) ^ 0x8000) - 0x8000
}

fn expand_load_immediate(v: &MacroValues, _flags: MacroFlags, ins: &mut [MipsInstruction]) -> usize {
    let imm = v.i1;
    if fits_i16(imm) {
        ins[0] = MipsInstruction::i_type(Opcode::Addiu, v.rt, Register::ZERO, imm);
        1
    } else if fits_u16(imm) {
        ins[0] = MipsInstruction::i_type(Opcode::Ori, v.rt, Register::ZERO, imm);
        1
    } else if imm & 0xFFFF == 0 {
        ins[0] = MipsInstruction::i_type(Opcode::Lui, v.rt, Register::ZERO, (imm >> 16) & 0xFFFF);
        1
    } else {
        ins[0] = MipsInstruction::i_type(Opcode::Lui, v.rt, Register::ZERO, (imm >> 16) & 0xFFFF);
        ins[1] = MipsInstruction::i_type(Opcode::Ori, v.rt, v.rt, imm & 0xFFFF);
        2
    }
}

fn expand_load_address(v: &MacroValues, _flags: MacroFlags, ins: &mut [MipsInstruction]) -> usize {
    let addr = v.i1;
    if fits_i16(addr) {
        ins[0] = MipsInstruction::i_type(Opcode::Addiu, v.rt, Register::ZERO, addr);
        1
    } else {
        ins[0] = MipsInstruction::i_type(Opcode::Lui, v.rt, Register::ZERO, hi_carry(addr));
        ins[1] = MipsInstruction::i_type(Opcode::Addiu, v.rt, v.rt, lo_signed(addr));
        2
    }
}

fn expand_abs(v: &MacroValues, _flags: MacroFlags, ins: &mut [MipsInstruction]) -> usize {
    ins[0] = MipsInstruction::shift(Opcode::Sra, Register::AT, v.rs, 31);
    ins[1] = MipsInstruction::r_type(Opcode::Xor, v.rd, v.rs, Register::AT);
    ins[2] = MipsInstruction::r_type(Opcode::Subu, v.rd, v.rd, Register::AT);
    3
}

fn expand_memory(v: &MacroValues, flags: MacroFlags, ins: &mut [MipsInstruction]) -> usize {
    let addr = v.i1;
    let op = if flags.store { Opcode::Sw } else { Opcode::Lw };
    if fits_i16(addr) {
        ins[0] = MipsInstruction::i_type(op, v.rt, Register::ZERO, addr);
        return 1;
    }
    if flags.store {
        // The destination register must survive, so the address goes
        // through the assembler temporary.
        ins[0] = MipsInstruction::i_type(Opcode::Lui, Register::AT, Register::ZERO, hi_carry(addr));
        ins[1] = MipsInstruction::i_type(op, v.rt, Register::AT, lo_signed(addr));
    } else {
        ins[0] = MipsInstruction::i_type(Opcode::Lui, v.rt, Register::ZERO, hi_carry(addr));
        ins[1] = MipsInstruction::i_type(op, v.rt, v.rt, lo_signed(addr));
    }
    2
}

fn expand_branch_compare(v: &MacroValues, flags: MacroFlags, ins: &mut [MipsInstruction]) -> usize {
    ins[0] = MipsInstruction::r_type(Opcode::Slt, Register::AT, v.rs, v.rt);
    // The branch is the second instruction; its offset is relative to the
    // address following its own delay slot.
    let branch_pc = v.position.wrapping_add(super::INSTRUCTION_WIDTH) as i64;
    let offset = (v.i1 - (branch_pc + 4)) / 4;
    let op = if flags.invert { Opcode::Beq } else { Opcode::Bne };
    ins[1] = MipsInstruction::i_type(op, Register::ZERO, Register::AT, offset);
    2
}
