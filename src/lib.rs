// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! MIPS macro assembler.
//!
//! Pseudo-instructions (`li`, `la`, `blt`, ...) expand to a variable number
//! of real instructions, so layout runs as a fixpoint: every macro site is
//! re-validated until no site changes size, then everything is encoded and
//! written through the virtual/physical address file manager.

pub mod assembler;
pub mod core;
pub mod mips;
