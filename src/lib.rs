//! `ssp-vm`: the value model, opcode set, binary instruction codec and
//! emulator core of a small multi-tenant stack-machine runtime.
//!
//! A program is a flat [`instruction::Program`] of [`instruction::Instruction`]s,
//! each an [`opcode::Opcode`] plus zero or more [`value::Value`] parameters.
//! [`emulator::Emulator`] executes one instruction at a time and reports
//! every interesting transition — errors, halts, outbound sends, blocking,
//! resumption — through a small set of hooks rather than owning any
//! scheduling or IPC policy itself. That policy lives one layer up, in the
//! `ssp-runtime` crate, which drives many `Emulator`s cooperatively.
//!
//! Programs are assembled from text by the separate `ssp-asm` crate and
//! exchanged as a self-describing binary stream via [`codec`].

pub mod codec;
pub mod emulator;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod value;

pub use emulator::{BlockingReason, Emulator, EmulatorState};
pub use error::RuntimeError;
pub use instruction::{Instruction, Program};
pub use opcode::Opcode;
pub use value::{Value, ValueMap};
