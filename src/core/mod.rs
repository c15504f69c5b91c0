// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Architecture-independent assembler core: diagnostics, expression
//! evaluation, symbol storage, and the output file/address manager.

pub mod error;
pub mod expr;
pub mod filemanager;
pub mod symbol_table;
