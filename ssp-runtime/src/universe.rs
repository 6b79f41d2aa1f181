//! `Universe` (spec.md §4.7), grounded on
//! `original_source/ssp/server/universe/universe.py`.
//!
//! The original's tick table holds arbitrary callbacks (`tickers.add(cb)`);
//! every real caller in the corpus only ever registers "single-step this
//! process" (`process.py`'s `_on_tick`), so this port specializes the
//! table to `(machine_id, pid)` pairs instead of boxed closures. That
//! keeps `tick()` a plain loop over owned data with no closure capturing a
//! reference back into a `HashMap` it doesn't own — see `process.rs`'s
//! module doc for why that indirection exists at all.

use std::collections::HashMap;

use log::{error, warn};
use ssp_vm::{BlockingReason, Program, RuntimeError, Value};

use crate::ids::Counter;
use crate::machine::{Machine, RouteDelivery};
use crate::process::{Endpoint, ProcEvent};

pub struct Universe {
    machines: HashMap<String, Machine>,
    tick_table: HashMap<i64, (String, i64)>,
    tick_by_proc: HashMap<(String, i64), i64>,
    tick_counter: Counter,
}

impl Universe {
    pub fn new() -> Self {
        Universe {
            machines: HashMap::new(),
            tick_table: HashMap::new(),
            tick_by_proc: HashMap::new(),
            tick_counter: Counter::starting_at(1337),
        }
    }

    pub fn create_machine(&mut self) -> String {
        let machine = Machine::new();
        let id = machine.id.clone();
        self.machines.insert(id.clone(), machine);
        id
    }

    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn machine_mut(&mut self, id: &str) -> Option<&mut Machine> {
        self.machines.get_mut(id)
    }

    fn register_tick_for(&mut self, machine_id: &str, pid: i64) -> i64 {
        let key = (machine_id.to_string(), pid);
        if let Some(&existing) = self.tick_by_proc.get(&key) {
            return existing;
        }
        let id = self.tick_counter.next_id();
        self.tick_table.insert(id, key.clone());
        self.tick_by_proc.insert(key, id);
        id
    }

    fn unregister_tick_for(&mut self, machine_id: &str, pid: i64) {
        let key = (machine_id.to_string(), pid);
        if let Some(id) = self.tick_by_proc.remove(&key) {
            self.tick_table.remove(&id);
        }
    }

    /// Runs a process via `start_process` and registers its tick
    /// immediately, since `Machine::start_process` only calls
    /// `Emulator::resume` and relies on the scheduler to actually step it.
    pub fn start_process(&mut self, machine_id: &str, program: Program) -> Option<(i64, i64)> {
        let result = self.machines.get_mut(machine_id)?.start_process(program);
        self.register_tick_for(machine_id, result.0);
        Some(result)
    }

    /// Loads `program` into an already-created process and registers its
    /// tick, the same way `start_process` does for a freshly minted one.
    pub fn run_program(&mut self, machine_id: &str, pid: i64, program: Program) {
        if let Some(machine) = self.machines.get_mut(machine_id) {
            if let Some(proc) = machine.process_mut(pid) {
                proc.run_program(program);
            }
        }
        self.register_tick_for(machine_id, pid);
    }

    /// `tick()`: steps a snapshot of every runnable `(machine, pid)` pair,
    /// guarding each one so a single process's host-callback bug can't
    /// crash the loop (spec.md §5).
    pub fn tick(&mut self) {
        let runnable: Vec<(String, i64)> = self.tick_table.values().cloned().collect();
        for (machine_id, pid) in runnable {
            self.step_one(&machine_id, pid);
        }
    }

    fn step_one(&mut self, machine_id: &str, pid: i64) {
        let events = {
            let machine = match self.machines.get_mut(machine_id) {
                Some(m) => m,
                None => return,
            };
            let proc = match machine.process_mut(pid) {
                Some(p) => p,
                None => return,
            };
            proc.step();
            proc.drain_events()
        };
        self.handle_events(machine_id, pid, events);
    }

    /// Drains and handles events already queued for `pid` without
    /// stepping it — used right after a `deliver` that may have resumed
    /// it, so the resulting `ProcEvent::Resumed` gets observed and the
    /// process's tick re-registered even though it wasn't the process
    /// `tick()` was driving this round.
    fn drain_and_handle(&mut self, machine_id: &str, pid: i64) {
        let events = {
            let machine = match self.machines.get_mut(machine_id) {
                Some(m) => m,
                None => return,
            };
            let proc = match machine.process_mut(pid) {
                Some(p) => p,
                None => return,
            };
            proc.drain_events()
        };
        self.handle_events(machine_id, pid, events);
    }

    fn handle_events(&mut self, machine_id: &str, pid: i64, events: Vec<ProcEvent>) {
        // A `SEND` immediately followed by a `Blocked{SendResp}` event in
        // the same batch is a blocking send (as opposed to `SENDI`, which
        // never blocks) — track its local-pid target so a later
        // `kill_process` on it can fail this sender (see `machine.rs`'s
        // `waiting_on`/`pending_replies`). A send that's itself a reply to
        // this process's own last sender is excluded from that tracking:
        // `handle_event` resolves it immediately via `complete_reply_send`,
        // so it never actually stays blocked waiting on anything.
        let mut last_send_local_target: Option<i64> = None;
        for event in events {
            match &event {
                ProcEvent::Send { target, reply_to_last_sender, .. } => {
                    last_send_local_target = if *reply_to_last_sender { None } else { target.parse::<i64>().ok() };
                }
                ProcEvent::Blocked { reason: BlockingReason::SendResp } => {
                    if let Some(target_pid) = last_send_local_target.take() {
                        if let Some(machine) = self.machines.get_mut(machine_id) {
                            machine.register_wait(pid, target_pid);
                        }
                    }
                }
                _ => {}
            }
            self.handle_event(machine_id, pid, event);
        }
    }

    fn handle_event(&mut self, machine_id: &str, pid: i64, event: ProcEvent) {
        match event {
            ProcEvent::Send { target, payload, reply_to_last_sender } => {
                let sender = pid.to_string();
                match self.route(machine_id, &sender, &target, payload) {
                    Ok(followup) => {
                        if let Some((dest_machine, dest_pid)) = followup {
                            self.drain_and_handle(&dest_machine, dest_pid);
                        }
                        if reply_to_last_sender {
                            self.complete_reply_send(machine_id, pid, &target);
                        }
                    }
                    Err(err) => self.fail_process(machine_id, pid, err),
                }
            }
            ProcEvent::Error { err, addr } => {
                error!("{}:{}: runtime error at 0x{:04X}: {}", machine_id, pid, addr, err);
            }
            ProcEvent::Blocked { .. } | ProcEvent::Resumed | ProcEvent::Halted => {}
        }
        // Rather than toggling the tick table off the `Blocked`/`Resumed`/
        // `Halted` markers directly, sync it to the process's actual
        // current state: a service reply can resume `pid` synchronously
        // while its own (now-stale) `Blocked` event is still later in this
        // same batch, and acting on events in arrival order there would
        // re-unregister a tick that was already legitimately restored.
        self.sync_tick_registration(machine_id, pid);
    }

    fn sync_tick_registration(&mut self, machine_id: &str, pid: i64) {
        let wants_tick = self
            .machines
            .get(machine_id)
            .and_then(|m| m.process(pid))
            .map(|p| p.wants_tick())
            .unwrap_or(false);
        if wants_tick {
            self.register_tick_for(machine_id, pid);
        } else {
            self.unregister_tick_for(machine_id, pid);
        }
    }

    /// Completes a blocking `SEND` that was itself a reply to this
    /// process's most recent unresolved inbound message (spec.md §4.5's
    /// "remembers the sender... completes the incoming promise directly"
    /// shortcut): the delivery to `target` just succeeded, so `pid`'s own
    /// `SEND_RESP` block resolves immediately rather than waiting for a
    /// further inbound message — otherwise two processes replying to each
    /// other with blocking `SEND`s would deadlock forever, since nothing
    /// would ever reply to the reply.
    fn complete_reply_send(&mut self, machine_id: &str, pid: i64, target: &str) {
        let mut resumed = false;
        if let Some(machine) = self.machines.get_mut(machine_id) {
            if let Some(proc) = machine.process_mut(pid) {
                if proc.deliver(target, Vec::new()) {
                    machine.clear_wait(pid);
                    resumed = true;
                }
            }
        }
        if resumed {
            self.drain_and_handle(machine_id, pid);
        }
    }

    fn fail_process(&mut self, machine_id: &str, pid: i64, err: RuntimeError) {
        let more = {
            let machine = match self.machines.get_mut(machine_id) {
                Some(m) => m,
                None => return,
            };
            let proc = match machine.process_mut(pid) {
                Some(p) => p,
                None => return,
            };
            proc.fail_send(err);
            proc.drain_events()
        };
        self.handle_events(machine_id, pid, more);
    }

    /// Spec.md §4.6's three-step routing algorithm. Step 1 (`HOST:REST`)
    /// needs the sibling-machines map, so it lives here rather than on
    /// `Machine`; steps 2 and 3 are `Machine::route_local`. On success,
    /// reports which `(machine, pid)` needs its events drained as a
    /// result — a delivery into an emulator process reports that pid
    /// directly; a delivery into a service that replies inline chases the
    /// reply back to its original sender first and reports whichever pid
    /// that reply actually lands on (`None` if it lands on another
    /// service, or nothing has a reply to give).
    pub fn route(
        &mut self,
        from_machine: &str,
        sender: &str,
        target: &str,
        values: Vec<Value>,
    ) -> Result<Option<(String, i64)>, RuntimeError> {
        if let Some(idx) = target.find(':') {
            let (host, rest) = (&target[..idx], &target[idx + 1..]);
            if !self.machines.contains_key(host) {
                return Err(RuntimeError::RemoteMachineMissing(host.to_string()));
            }
            let rewritten_sender = format!("{}:{}", from_machine, sender);
            return self.route(host, &rewritten_sender, rest, values);
        }

        let machine = self
            .machines
            .get_mut(from_machine)
            .ok_or_else(|| RuntimeError::RemoteMachineMissing(from_machine.to_string()))?;
        match machine.route_local(sender, target, values)? {
            RouteDelivery::Process(pid) => Ok(Some((from_machine.to_string(), pid))),
            RouteDelivery::Silent => Ok(None),
            RouteDelivery::ServiceReply(service_pid, reply) => {
                // The service answered inline, but the original sender is
                // still blocked on `SEND_RESP` until that reply is routed
                // back to it — from the service's own pid, exactly like
                // any other send (spec.md §4.5/§4.6).
                match self.route(from_machine, &service_pid.to_string(), sender, reply) {
                    Ok(followup) => Ok(followup),
                    Err(err) => {
                        warn!(
                            "{}: routing service {}'s reply back to {} failed: {}",
                            from_machine, service_pid, sender, err
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// `kill_process`: tears the process down, then fails every pid that
    /// was blocked waiting on a reply from it (spec.md §4.6).
    pub fn kill_process(&mut self, machine_id: &str, pid: i64) {
        let waiters = match self.machines.get_mut(machine_id) {
            Some(machine) => machine.kill_process(pid),
            None => return,
        };
        self.unregister_tick_for(machine_id, pid);

        for waiter in waiters {
            self.fail_process(machine_id, waiter, RuntimeError::NoReceiver(pid.to_string()));
        }
    }
}

impl Default for Universe {
    fn default() -> Self {
        Universe::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssp_vm::{Instruction, Opcode};

    fn push_send_halt(target: Value, payload: Vec<Value>) -> Program {
        let mut list = vec![target];
        list.extend(payload);
        vec![
            Instruction::new(Opcode::Push, vec![Value::List(list)]),
            Instruction::new(Opcode::Send, vec![]),
        ]
    }

    #[test]
    fn same_machine_pid_addressed_send_reaches_target() {
        let mut universe = Universe::new();
        let machine_id = universe.create_machine();

        let receiver_pid = universe
            .machine_mut(&machine_id)
            .unwrap()
            .create_process(None);
        universe.run_program(&machine_id, receiver_pid, vec![Instruction::new(Opcode::Recv, vec![])]);

        let program = push_send_halt(Value::Int(receiver_pid), vec![Value::Str("ping".into())]);
        let (sender_pid, _iface) = universe.start_process(&machine_id, program).unwrap();

        // Tick the receiver first so it's blocked on RECV before the
        // sender's SEND is routed.
        universe.tick();
        universe.tick();

        let machine = universe.machine_mut(&machine_id).unwrap();
        let receiver = machine.process(receiver_pid).unwrap().as_emu_process().unwrap();
        let stack = receiver.stack();
        assert_eq!(stack.last(), Some(&Value::Str(sender_pid.to_string())));
        assert_eq!(
            stack[stack.len() - 2],
            Value::List(vec![Value::Str("ping".into())])
        );
    }

    #[test]
    fn cross_machine_addressed_send_routes_to_remote_pid() {
        let mut universe = Universe::new();
        let machine_a = universe.create_machine();
        let machine_b = universe.create_machine();

        let target_pid = universe.machine_mut(&machine_b).unwrap().create_process(None);

        let target_addr = format!("{}:{}", machine_b, target_pid);
        let result = universe.route(&machine_a, "1000", &target_addr, vec![Value::Str("ping".into())]);
        assert!(result.is_ok());
    }

    #[test]
    fn routing_to_missing_machine_is_an_error() {
        let mut universe = Universe::new();
        let machine_a = universe.create_machine();
        let err = universe
            .route(&machine_a, "1000", "nope:42", vec![Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::RemoteMachineMissing(_)));
    }
}
