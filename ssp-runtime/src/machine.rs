//! `Machine` (spec.md §4.6), grounded on
//! `original_source/ssp/server/universe/machine.py`.
//!
//! Tick registration is owned entirely by `Universe` in this port (see
//! `universe.rs`'s module doc) rather than delegated through `Machine` as
//! `self.register_tick = universe.register_tick` does in the original —
//! `Machine` only needs to hold processes and services and answer local
//! address resolution; `Universe` observes every state transition anyway
//! because it is the one driving `step()` and reading the resulting
//! `ProcEvent`s.

use std::collections::HashMap;

use log::{debug, warn};
use ssp_vm::{Program, RuntimeError, Value};

use crate::error::MachineError;
use crate::ids::{random_id, Counter};
use crate::process::{EmuProcess, Endpoint};
use crate::services::fs::FsService;

/// Fired by `Machine::create_process`/`kill_process`, mirroring the
/// original's `pyee` `process_created`/`process_killed` events. Kept as
/// plain hook slots (the same shape as `ssp_vm::Emulator`'s hooks) rather
/// than pulling in an event-emitter crate neither `ssp-vm` nor the teacher
/// depend on.
pub type ProcessHook = Box<dyn FnMut(i64)>;

pub struct Machine {
    pub id: String,
    pub secret: String,
    processes: HashMap<i64, Box<dyn Endpoint>>,
    services: HashMap<String, i64>,
    pid_counter: Counter,
    on_process_created: Option<ProcessHook>,
    on_process_killed: Option<ProcessHook>,
    /// sender pid -> pid it is `SEND`-blocked waiting on, and the reverse
    /// index, so a `kill_process` on the target can fail every waiter
    /// (spec.md §4.6: "fail any pending promises"). Same-machine sends
    /// only — a wait on a cross-machine target is not tracked here, since
    /// resolving "is this remote process still alive" would need a
    /// liveness protocol the spec doesn't define.
    waiting_on: HashMap<i64, i64>,
    pending_replies: HashMap<i64, Vec<i64>>,
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            id: random_id(20),
            secret: random_id(40),
            processes: HashMap::new(),
            services: HashMap::new(),
            pid_counter: Counter::starting_at(1000),
            on_process_created: None,
            on_process_killed: None,
            waiting_on: HashMap::new(),
            pending_replies: HashMap::new(),
        }
    }

    /// Records that `sender` just issued a blocking `SEND` resolved to
    /// the local pid `target`.
    pub fn register_wait(&mut self, sender: i64, target: i64) {
        self.clear_wait(sender);
        self.waiting_on.insert(sender, target);
        self.pending_replies.entry(target).or_default().push(sender);
    }

    /// Clears `sender`'s wait, if any — called whenever a delivery to
    /// `sender` succeeds, since that always ends whatever it was blocked
    /// on (spec.md §4.4: `receive()` is the sole way out of `BLOCKED`).
    pub fn clear_wait(&mut self, sender: i64) {
        if let Some(target) = self.waiting_on.remove(&sender) {
            if let Some(waiters) = self.pending_replies.get_mut(&target) {
                waiters.retain(|&s| s != sender);
            }
        }
    }

    /// Takes every pid still waiting on `target`, clearing their wait
    /// state. Called from `kill_process` just before tearing `target`
    /// down.
    pub fn take_waiters(&mut self, target: i64) -> Vec<i64> {
        let waiters = self.pending_replies.remove(&target).unwrap_or_default();
        for waiter in &waiters {
            self.waiting_on.remove(waiter);
        }
        waiters
    }

    pub fn hook_process_created(&mut self, hook: ProcessHook) {
        self.on_process_created = Some(hook);
    }

    pub fn hook_process_killed(&mut self, hook: ProcessHook) {
        self.on_process_killed = Some(hook);
    }

    /// `create_process(ppid, factory=EmuProcess)`: allocates a pid and
    /// installs an emulator-backed process.
    pub fn create_process(&mut self, ppid: Option<i64>) -> i64 {
        let pid = self.pid_counter.next_id();
        self.processes.insert(pid, Box::new(EmuProcess::new(pid, ppid)));
        debug!("machine {}: process {} created (ppid={:?})", self.id, pid, ppid);
        if let Some(hook) = self.on_process_created.as_mut() {
            hook(pid);
        }
        pid
    }

    /// `start_process(program)`: spins up a program as a fresh process
    /// whose parent is an ephemeral interface pid, then tears the
    /// interface process down immediately — faithful to the original's
    /// `start_process`, which does exactly this (the interface process
    /// exists only so `run_program` has *some* ppid to stamp on the new
    /// process; it is not kept alive to field a `"."`-addressed reply).
    pub fn start_process(&mut self, program: Program) -> (i64, i64) {
        let parent_pid = self.pid_counter.next_id();
        self.processes
            .insert(parent_pid, Box::new(crate::services::InterfaceService::new(parent_pid)));

        let pid = self.create_process(Some(parent_pid));
        if let Some(proc) = self.processes.get_mut(&pid) {
            proc.run_program(program);
        }

        self.kill_process(parent_pid);
        (pid, parent_pid)
    }

    /// Removes `pid` from the table and returns every pid that was
    /// `SEND`-blocked waiting on it, so the caller can fail them.
    pub fn kill_process(&mut self, pid: i64) -> Vec<i64> {
        let waiters = self.take_waiters(pid);
        self.waiting_on.remove(&pid);
        if let Some(mut proc) = self.processes.remove(&pid) {
            proc.kill();
            self.services.retain(|_, svc_pid| *svc_pid != pid);
            debug!("machine {}: process {} killed", self.id, pid);
            if let Some(hook) = self.on_process_killed.as_mut() {
                hook(pid);
            }
        }
        waiters
    }

    pub fn register_service(&mut self, name: &str, pid: i64) -> Result<(), MachineError> {
        if self.services.contains_key(name) {
            return Err(MachineError::ServiceNameTaken(name.to_string()));
        }
        self.services.insert(name.to_string(), pid);
        Ok(())
    }

    /// `start_builtin_service(svc)`. Only `fs` (spec.md §4.6, grounded on
    /// `machine_services/fs.py`) is implemented as a demonstration
    /// built-in service; the original's `sys` service has no surviving
    /// source in the retrieved corpus to ground an implementation on.
    pub fn start_builtin_service(&mut self, name: &str) -> Result<i64, MachineError> {
        let pid = match name {
            "fs" => {
                let pid = self.pid_counter.next_id();
                self.processes.insert(pid, Box::new(FsService::new(pid)));
                pid
            }
            other => {
                warn!("machine {}: tried to start non-existent service: {}", self.id, other);
                return Err(MachineError::ServiceNotFound(other.to_string()));
            }
        };
        self.register_service(name, pid)?;
        Ok(pid)
    }

    pub fn process_mut(&mut self, pid: i64) -> Option<&mut Box<dyn Endpoint>> {
        self.processes.get_mut(&pid)
    }

    pub fn process(&self, pid: i64) -> Option<&dyn Endpoint> {
        self.processes.get(&pid).map(|p| p.as_ref())
    }

    pub fn has_process(&self, pid: i64) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn service_pid(&self, name: &str) -> Option<i64> {
        self.services.get(name).copied()
    }

    pub fn runnable_pids(&self) -> Vec<i64> {
        self.processes
            .iter()
            .filter(|(_, p)| p.wants_tick())
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Steps 2 and 3 of spec.md §4.6's routing algorithm: digit-string or
    /// integer pid, then named service, then failure. Step 1 (`HOST:REST`
    /// remote addressing) is handled by `Universe::route`, which owns the
    /// sibling-machines map this step would otherwise need.
    pub fn route_local(
        &mut self,
        sender: &str,
        target: &str,
        values: Vec<Value>,
    ) -> Result<RouteDelivery, RuntimeError> {
        if let Ok(pid) = target.parse::<i64>() {
            if let Some(proc) = self.processes.get_mut(&pid) {
                if proc.deliver(sender, values) {
                    self.clear_wait(pid);
                }
                return Ok(RouteDelivery::Process(pid));
            }
        }

        if let Some(&pid) = self.services.get(target) {
            if let Some(proc) = self.processes.get_mut(&pid) {
                proc.deliver(sender, values);
                return Ok(match proc.take_reply() {
                    Some(reply) => RouteDelivery::ServiceReply(pid, reply),
                    None => RouteDelivery::Silent,
                });
            }
        }

        Err(RuntimeError::NoReceiver(target.to_string()))
    }
}

/// What delivering a message to a local address (spec.md §4.6's steps 2/3)
/// resulted in.
pub enum RouteDelivery {
    /// Delivered into an emulator-backed process at this pid — the caller
    /// must drain and handle its events afterward, since `deliver` may
    /// have just resumed it (spec.md §4.4/§9: the process, not the
    /// machine, owns its tick registration lifecycle, and a resume needs
    /// to be observed to re-register it).
    Process(i64),
    /// Delivered into a synchronous service at this pid, which answered
    /// inline (spec.md §4.6): the reply still needs routing back to
    /// `sender`, exactly like any other send.
    ServiceReply(i64, Vec<Value>),
    /// Delivered into a service that had no reply to give back.
    Silent,
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_process_allocates_increasing_pids_from_1000() {
        let mut m = Machine::new();
        let a = m.create_process(None);
        let b = m.create_process(None);
        assert_eq!(a, 1000);
        assert_eq!(b, 1001);
    }

    #[test]
    fn kill_process_removes_from_table() {
        let mut m = Machine::new();
        let pid = m.create_process(None);
        assert!(m.has_process(pid));
        m.kill_process(pid);
        assert!(!m.has_process(pid));
    }

    #[test]
    fn route_local_to_unknown_target_is_no_receiver() {
        let mut m = Machine::new();
        let err = m.route_local("1000", "9999", vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::NoReceiver(_)));
    }

    #[test]
    fn service_name_taken_rejects_second_registration() {
        let mut m = Machine::new();
        m.start_builtin_service("fs").unwrap();
        let err = m.start_builtin_service("fs").unwrap_err();
        assert!(matches!(err, MachineError::ServiceNameTaken(_)));
    }
}
