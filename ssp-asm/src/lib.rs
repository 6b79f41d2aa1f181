//! `ssp-asm`: lexer, parser, assembler and disassembler for the Supersonic
//! Shiny Proton scripting language (spec.md §4.1-§4.3), plus the `asm` CLI
//! binary (`src/main.rs`).
//!
//! Grounded on `original_source/ssp/scripting/{source,assembler}.py`; the
//! opcode set, binary encoding and emulator itself live in the sibling
//! `ssp-vm` crate.

pub mod assembler;
pub mod diagnostics;
pub mod disassembler;
pub mod lexer;
pub mod parser;

pub use assembler::{assemble, AssembleResult, Assembler};
pub use diagnostics::{Diagnostic, Severity};
pub use disassembler::disassemble;
