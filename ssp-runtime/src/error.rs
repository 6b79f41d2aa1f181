//! Runtime/IPC error taxonomy (spec.md §4.6, §5.2), grounded on the
//! `NoReceiverError` / `MachineNotFoundError` family raised by
//! `original_source/ssp/server/universe/{universe,machine}.py` and on the
//! `thiserror`-based error style of the sibling `ssp-vm` crate's `error.rs`.
//!
//! Address-resolution failures (no such pid, no such service, missing
//! remote machine) are reported as `ssp_vm::RuntimeError::NoReceiver` /
//! `RemoteMachineMissing` so they can be handed directly to
//! `Emulator::trigger_error` from the sending process's `on_send` hook
//! (spec.md §4.5: "if the send fails, `trigger_error` is invoked").

use thiserror::Error;

/// Raised by `Machine` process-lifecycle operations (not IPC routing,
/// which reports through `ssp_vm::RuntimeError` instead).
#[derive(Debug, Error, PartialEq)]
pub enum MachineError {
    #[error("no such process {0}")]
    ProcessNotFound(i64),

    #[error("no such service \"{0}\"")]
    ServiceNotFound(String),

    #[error("a service is already registered under \"{0}\"")]
    ServiceNameTaken(String),
}
