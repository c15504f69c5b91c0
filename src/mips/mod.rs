// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! MIPS architecture layer: registers, assembler mode state, and the
//! per-pass layout context threaded through validation.

pub mod instruction;
pub mod macro_site;
pub mod macros;

use crate::core::expr::EvalContext;
use crate::core::symbol_table::SymbolTable;

/// Every real MIPS instruction is four bytes.
pub const INSTRUCTION_WIDTH: u64 = 4;

/// Whether a value is representable as a 32-bit word, signed or unsigned.
pub fn fits_in_word(value: i64) -> bool {
    (-0x8000_0000..=0xFFFF_FFFF).contains(&value)
}

/// A general-purpose register, 0..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(u8);

impl Register {
    pub const ZERO: Register = Register(0);
    pub const AT: Register = Register(1);

    pub fn new(index: u8) -> Option<Self> {
        (index < 32).then_some(Register(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Parse a register name, with or without the leading `$`. Accepts
    /// numeric (`$8`) and ABI (`t0`, `v0`, ...) forms.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix('$').unwrap_or(name);
        if let Ok(index) = name.parse::<u8>() {
            return Register::new(index);
        }
        let index = match name {
            "zero" => 0,
            "at" => 1,
            "v0" => 2,
            "v1" => 3,
            "a0" => 4,
            "a1" => 5,
            "a2" => 6,
            "a3" => 7,
            "t0" => 8,
            "t1" => 9,
            "t2" => 10,
            "t3" => 11,
            "t4" => 12,
            "t5" => 13,
            "t6" => 14,
            "t7" => 15,
            "s0" => 16,
            "s1" => 17,
            "s2" => 18,
            "s3" => 19,
            "s4" => 20,
            "s5" => 21,
            "s6" => 22,
            "s7" => 23,
            "t8" => 24,
            "t9" => 25,
            "k0" => 26,
            "k1" => 27,
            "gp" => 28,
            "sp" => 29,
            "fp" | "s8" => 30,
            "ra" => 31,
            _ => return None,
        };
        Some(Register(index))
    }

    pub fn name(self) -> &'static str {
        const NAMES: [&str; 32] = [
            "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
            "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1",
            "gp", "sp", "fp", "ra",
        ];
        NAMES[self.0 as usize]
    }
}

/// Assembler mode state for the MIPS target.
#[derive(Debug, Default, Clone, Copy)]
pub struct MipsState {
    /// Suppress delay-slot hazard checking (`.set noloaddelay`).
    pub ignore_load_delay: bool,
}

/// Per-pass layout state threaded through every site's validation instead
/// of ambient globals: the symbol table as of this pass, the site's
/// assigned virtual address, and whether the site sits in a delay slot.
pub struct LayoutContext<'a> {
    pub symbols: &'a SymbolTable,
    pub position: u64,
    pub in_delay_slot: bool,
}

impl<'a> LayoutContext<'a> {
    pub fn new(symbols: &'a SymbolTable, position: u64, in_delay_slot: bool) -> Self {
        Self {
            symbols,
            position,
            in_delay_slot,
        }
    }
}

impl EvalContext for LayoutContext<'_> {
    fn lookup_symbol(&self, name: &str) -> Option<i64> {
        self.symbols.get(name)
    }

    fn current_address(&self) -> Option<i64> {
        Some(self.position as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_parsing_accepts_both_forms() {
        assert_eq!(Register::parse("$t0"), Register::new(8));
        assert_eq!(Register::parse("t0"), Register::new(8));
        assert_eq!(Register::parse("$8"), Register::new(8));
        assert_eq!(Register::parse("ra"), Register::new(31));
        assert_eq!(Register::parse("s8"), Register::parse("fp"));
        assert_eq!(Register::parse("$32"), None);
        assert_eq!(Register::parse("x0"), None);
    }

    #[test]
    fn layout_context_exposes_position_as_current_address() {
        let symbols = SymbolTable::new();
        let ctx = LayoutContext::new(&symbols, 0x8000_0010, false);
        use crate::core::expr::EvalContext;
        assert_eq!(ctx.current_address(), Some(0x8000_0010));
        assert_eq!(ctx.lookup_symbol("nope"), None);
    }
}
