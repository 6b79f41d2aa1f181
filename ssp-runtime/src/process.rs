//! `Process`/`EmuProcess` (spec.md §4.5), grounded on
//! `original_source/ssp/server/universe/process.py`.
//!
//! The Python original drives IPC synchronously through `async`/`await`
//! coroutines. `ssp-runtime` is single-threaded and cooperative (spec.md
//! §5), so the same effect is reached without futures: stepping a process
//! only ever runs its own emulator hooks, which record what happened as
//! `ProcEvent`s into a small queue the process owns; the owning `Machine`
//! drains that queue once the step call returns and performs any routing
//! that requires looking at *other* processes or machines. This keeps the
//! borrow checker happy without a `Process` ever holding a live reference
//! back into its `Machine` (spec.md §9's cyclic-reference note).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::debug;
use ssp_vm::{BlockingReason, Emulator, EmulatorState, Program, RuntimeError, Value};

/// Something that happened while stepping a process, to be handled by the
/// owning `Machine`/`Universe` once the step call has returned.
#[derive(Debug, Clone)]
pub enum ProcEvent {
    /// A `SEND`/`SENDI` whose target has already been resolved to a
    /// string address (literal `"."` rewritten to the parent pid).
    Send {
        target: String,
        payload: Vec<Value>,
        /// Set when `target` equals the sender of this process's most
        /// recent unresolved inbound message (spec.md §4.5's "remembers
        /// the sender... completes the incoming promise directly"
        /// optimization) — a hint the router may use to skip
        /// remote/service resolution and go straight to a same-machine
        /// pid lookup.
        reply_to_last_sender: bool,
    },
    Error { err: RuntimeError, addr: i64 },
    Halted,
    Blocked { reason: BlockingReason },
    Resumed,
}

/// Unifies emulator-backed processes and built-in services (spec.md's
/// "Service" glossary entry) behind one addressable unit a `Machine` can
/// hold in its process table, mirroring `process.py`'s `Process` base
/// class and `machine_services/fs.py`'s `FsService` both answering to
/// `send_ipc`.
pub trait Endpoint {
    fn pid(&self) -> i64;
    fn ppid(&self) -> Option<i64>;

    /// Attempts to deliver an inbound message. Returns whether it was
    /// accepted; a rejection (process not waiting to receive) is a
    /// silent drop, matching `Emulator::receive`'s documented behavior.
    fn deliver(&mut self, sender: &str, values: Vec<Value>) -> bool;

    /// Drains events accumulated since the last drain (populated by
    /// `deliver`/`step` for `EmuProcess`; always empty for synchronous
    /// services, which never block).
    fn drain_events(&mut self) -> Vec<ProcEvent> {
        Vec::new()
    }

    /// Takes the reply a synchronous service computed inline during its
    /// most recent `deliver` (spec.md §4.6: services answer `send_ipc`
    /// without blocking). `None` for endpoints that don't reply this way
    /// (an `EmuProcess`'s replies are `ProcEvent::Send`s, not return
    /// values).
    fn take_reply(&mut self) -> Option<Vec<Value>> {
        None
    }

    /// Whether this endpoint needs a tick registration to make progress
    /// (only true for `EmuProcess`; services answer `send_ipc` inline).
    fn wants_tick(&self) -> bool {
        false
    }

    fn step(&mut self) {}

    /// Loads and starts a program; a no-op for endpoints that don't wrap
    /// an emulator (services).
    fn run_program(&mut self, _program: Program) {}

    /// Reports a routing failure for this endpoint's most recent `SEND`,
    /// invoking `Emulator::trigger_error` for `EmuProcess` (spec.md §4.5:
    /// "if the send fails, `trigger_error` is invoked"). A no-op for
    /// endpoints that never initiate sends.
    fn fail_send(&mut self, _err: RuntimeError) {}

    /// Invoked by `Machine::kill_process`; must fail any pending promise
    /// and leave the endpoint inert.
    fn kill(&mut self) {}

    /// Downcast back to the concrete emulator-backed process, for callers
    /// (tests, introspection) that need to look at its stack/state
    /// directly rather than through the address-book-like `Endpoint`
    /// surface.
    fn as_emu_process(&self) -> Option<&EmuProcess> {
        None
    }
}

/// A process wrapping one `ssp_vm::Emulator` instance (spec.md §4.5).
pub struct EmuProcess {
    pid: i64,
    ppid: Option<i64>,
    emu: Emulator,
    events: Rc<RefCell<VecDeque<ProcEvent>>>,
    /// The sender of the most recent inbound message this process hasn't
    /// yet replied to, used for the reply shortcut described on
    /// `ProcEvent::Send`. Shared with the `on_send` hook closure, which
    /// reads it; `deliver` is the sole writer.
    pending_reply_to: Rc<RefCell<Option<String>>>,
}

impl EmuProcess {
    pub fn new(pid: i64, ppid: Option<i64>) -> Self {
        let events: Rc<RefCell<VecDeque<ProcEvent>>> = Rc::new(RefCell::new(VecDeque::new()));
        let mut emu = Emulator::new(0);

        let ev = events.clone();
        emu.hook_error(Box::new(move |_emu, err, addr| {
            ev.borrow_mut()
                .push_back(ProcEvent::Error { err: err.clone(), addr });
        }));

        let ev = events.clone();
        emu.hook_halted(Box::new(move |_emu| {
            ev.borrow_mut().push_back(ProcEvent::Halted);
        }));

        let pending_reply_to: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

        let ev = events.clone();
        let pending_for_send = pending_reply_to.clone();
        emu.hook_send(Box::new(move |host_emu, target, values| {
            let target_str = match target {
                Value::Str(s) if s == "." => ppid.map(|p| p.to_string()),
                Value::Str(s) => Some(s.clone()),
                Value::Int(i) => Some(i.to_string()),
                _ => None,
            };
            match target_str {
                Some(t) => {
                    let reply_to_last_sender =
                        pending_for_send.borrow().as_deref() == Some(t.as_str());
                    ev.borrow_mut().push_back(ProcEvent::Send {
                        target: t,
                        payload: values.to_vec(),
                        reply_to_last_sender,
                    });
                }
                None => host_emu.trigger_error(RuntimeError::MalformedSendPayload),
            }
        }));

        let ev = events.clone();
        emu.hook_block(Box::new(move |_emu, reason| {
            ev.borrow_mut().push_back(ProcEvent::Blocked {
                reason: reason.clone(),
            });
        }));

        let ev = events.clone();
        emu.hook_resume(Box::new(move |_emu| {
            ev.borrow_mut().push_back(ProcEvent::Resumed);
        }));

        EmuProcess {
            pid,
            ppid,
            emu,
            events,
            pending_reply_to,
        }
    }

    pub fn state(&self) -> EmulatorState {
        self.emu.state()
    }

    pub fn stack(&self) -> &[Value] {
        self.emu.stack()
    }
}

impl Endpoint for EmuProcess {
    fn pid(&self) -> i64 {
        self.pid
    }

    fn ppid(&self) -> Option<i64> {
        self.ppid
    }

    fn deliver(&mut self, sender: &str, values: Vec<Value>) -> bool {
        debug!("process {}: receive from {}: {:?}", self.pid, sender, values);
        let was_blocked = self.emu.state() == EmulatorState::Blocked;
        *self.pending_reply_to.borrow_mut() = Some(sender.to_string());
        self.emu.receive(Value::Str(sender.to_string()), values);
        was_blocked
    }

    fn drain_events(&mut self) -> Vec<ProcEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    fn wants_tick(&self) -> bool {
        self.emu.state() == EmulatorState::Running
    }

    fn step(&mut self) {
        self.emu.single_step();
    }

    fn run_program(&mut self, program: Program) {
        if self.emu.state() == EmulatorState::Halted {
            self.emu.set_program(program);
            self.emu.resume();
        }
    }

    fn fail_send(&mut self, err: RuntimeError) {
        self.emu.trigger_error(err);
    }

    fn kill(&mut self) {
        self.emu.halt();
        *self.pending_reply_to.borrow_mut() = None;
    }

    fn as_emu_process(&self) -> Option<&EmuProcess> {
        Some(self)
    }
}
