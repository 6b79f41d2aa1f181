//! `ssp-runtime`: the process/IPC scheduler — machines, processes,
//! built-in services and the universe tick loop (spec.md §4.5-§4.7).
//!
//! Grounded on `original_source/ssp/server/universe/*.py`; the emulator
//! each process drives lives in the sibling `ssp-vm` crate.

pub mod error;
pub mod ids;
pub mod machine;
pub mod process;
pub mod services;
pub mod universe;

pub use error::MachineError;
pub use machine::Machine;
pub use process::{EmuProcess, Endpoint, ProcEvent};
pub use universe::Universe;
