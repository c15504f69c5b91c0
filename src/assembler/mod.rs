// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembly job orchestration: parsing, the multi-pass engine, and the
//! command line front end.

pub mod cli;
mod engine;
mod parser;
mod passes;
mod statement;

pub use engine::{Assembler, MAX_PASSES};
pub use parser::{parse_line, ParsedLine, ParsedStatement};
pub use passes::run_with_config;
pub use statement::{AsmOption, InstructionStatement, SourceStatement};
