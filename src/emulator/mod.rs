//! Host-facing emulator surface: the mechanical [`core::Core`] plus the
//! five hooks (`on_error`, `on_halted`, `on_send`, `on_block`, `on_resume`)
//! a scheduler uses to drive and observe it.

mod core;

pub use self::core::{BlockingReason, EmulatorState};

use crate::error::RuntimeError;
use crate::instruction::Program;
use crate::value::Value;
use self::core::{Core, StepOutcome};
use log::trace;

pub type ErrorHook<'a> = Box<dyn FnMut(&mut Emulator, &RuntimeError, i64) + 'a>;
pub type HaltedHook<'a> = Box<dyn FnMut(&mut Emulator) + 'a>;
pub type SendHook<'a> = Box<dyn FnMut(&mut Emulator, &Value, &[Value]) + 'a>;
pub type BlockHook<'a> = Box<dyn FnMut(&mut Emulator, &BlockingReason) + 'a>;
pub type ResumeHook<'a> = Box<dyn FnMut(&mut Emulator) + 'a>;

/// A single runnable instance of the stack machine (spec.md §4.4).
///
/// Hooks are installed once and invoked from inside `single_step`/`receive`
/// as the relevant transitions occur; `Emulator` never calls back into
/// itself through a hook it is currently running.
pub struct Emulator {
    core: Core,
    on_error: Option<ErrorHook<'static>>,
    on_halted: Option<HaltedHook<'static>>,
    on_send: Option<SendHook<'static>>,
    on_block: Option<BlockHook<'static>>,
    on_resume: Option<ResumeHook<'static>>,
}

impl Emulator {
    pub fn new(boot_addr: i64) -> Self {
        Emulator {
            core: Core::new(boot_addr),
            on_error: None,
            on_halted: None,
            on_send: None,
            on_block: None,
            on_resume: None,
        }
    }

    pub fn hook_error(&mut self, handler: ErrorHook<'static>) {
        self.on_error = Some(handler);
    }

    pub fn hook_halted(&mut self, handler: HaltedHook<'static>) {
        self.on_halted = Some(handler);
    }

    pub fn hook_send(&mut self, handler: SendHook<'static>) {
        self.on_send = Some(handler);
    }

    pub fn hook_block(&mut self, handler: BlockHook<'static>) {
        self.on_block = Some(handler);
    }

    pub fn hook_resume(&mut self, handler: ResumeHook<'static>) {
        self.on_resume = Some(handler);
    }

    pub fn state(&self) -> EmulatorState {
        self.core.state()
    }

    pub fn halted(&self) -> bool {
        self.core.state() == EmulatorState::Halted
    }

    pub fn running(&self) -> bool {
        self.core.state() == EmulatorState::Running
    }

    pub fn blocked(&self) -> bool {
        self.core.state() == EmulatorState::Blocked
    }

    pub fn blocking_reason(&self) -> Option<&BlockingReason> {
        self.core.blocking_reason()
    }

    pub fn inst_ptr(&self) -> i64 {
        self.core.inst_ptr()
    }

    pub fn stack(&self) -> &[Value] {
        self.core.stack()
    }

    pub fn set_program(&mut self, program: Program) {
        self.core.set_program(program);
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }

    pub fn resume(&mut self) {
        if self.core.resume() {
            if let Some(hook) = self.on_resume.take() {
                let mut hook = hook;
                hook(self);
                self.on_resume = Some(hook);
            }
        }
    }

    pub fn halt(&mut self) {
        if self.core.halt() {
            if let Some(hook) = self.on_halted.take() {
                let mut hook = hook;
                hook(self);
                self.on_halted = Some(hook);
            }
        }
    }

    /// Delivers `values` from `sender` to a process blocked on
    /// `SEND_RESP`/`RECV`/`LISTEN`, then resumes it. A delivery to a
    /// process not currently blocked is silently dropped (spec.md §4.4).
    pub fn receive(&mut self, sender: Value, values: Vec<Value>) {
        if self.core.receive(sender, values) {
            self.resume();
        } else {
            trace!("receive dropped, emulator not blocked on a receive reason");
        }
    }

    pub fn trigger_error(&mut self, err: RuntimeError) {
        let ip = self.core.inst_ptr();
        self.halt();
        if let Some(hook) = self.on_error.take() {
            let mut hook = hook;
            hook(self, &err, ip);
            self.on_error = Some(hook);
        }
    }

    fn handle_outcome(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Idle | StepOutcome::Advanced => {}
            StepOutcome::Halted => self.halt(),
            StepOutcome::Blocked { reason, followup } => {
                if let Some(hook) = self.on_block.take() {
                    let mut hook = hook;
                    hook(self, &reason);
                    self.on_block = Some(hook);
                }
                self.handle_outcome(*followup);
            }
            StepOutcome::Sent {
                target,
                payload,
                blocking,
                followup,
            } => {
                if let Some(hook) = self.on_send.take() {
                    let mut hook = hook;
                    hook(self, &target, &payload);
                    self.on_send = Some(hook);
                }
                if blocking {
                    if let Some(hook) = self.on_block.take() {
                        let mut hook = hook;
                        hook(self, &BlockingReason::SendResp);
                        self.on_block = Some(hook);
                    }
                }
                self.handle_outcome(*followup);
            }
            StepOutcome::Error(err) => self.trigger_error(err),
        }
    }

    /// Executes at most one instruction; a no-op if halted or blocked.
    pub fn single_step(&mut self) {
        let outcome = self.core.single_step();
        self.handle_outcome(outcome);
    }

    pub fn many_step(&mut self, n: usize) {
        for _ in 0..n {
            self.single_step();
        }
    }

    pub fn run(&mut self) {
        while self.running() {
            self.single_step();
        }
    }
}
